//! Comma-separated progress file
use super::{LogError, SummaryWriter};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Logging backend that appends each row to a CSV file.
///
/// The header is written with the first row.
#[derive(Debug)]
pub struct CsvBackend {
    path: PathBuf,
    writer: ::csv::Writer<File>,
    wrote_header: bool,
}

impl CsvBackend {
    /// Create (or truncate) the file at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        let writer = ::csv::Writer::from_path(&path)?;
        Ok(Self {
            path,
            writer,
            wrote_header: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SummaryWriter for CsvBackend {
    fn write_row(
        &mut self,
        _step: u64,
        row: &[(String, f64)],
        _elapsed: Duration,
    ) -> Result<(), LogError> {
        if !self.wrote_header {
            self.writer.write_record(row.iter().map(|(key, _)| key))?;
            self.wrote_header = true;
        }
        self.writer
            .write_record(row.iter().map(|(_, value)| value.to_string()))?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.csv");
        let mut backend = CsvBackend::new(&path).unwrap();
        let elapsed = Duration::from_secs(0);
        backend
            .write_row(0, &[("a".into(), 1.0), ("b".into(), 2.5)], elapsed)
            .unwrap();
        backend
            .write_row(1, &[("a".into(), 3.0), ("b".into(), f64::NAN)], elapsed)
            .unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "a,b\n1,2.5\n3,NaN\n"
        );
    }

    #[test]
    fn quotes_keys_with_separators() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.csv");
        let mut backend = CsvBackend::new(&path).unwrap();
        backend
            .write_row(
                0,
                &[("Loss/a,b".into(), 1.0), ("Train/KL".into(), 0.5)],
                Duration::from_secs(0),
            )
            .unwrap();

        let mut reader = ::csv::Reader::from_path(&path).unwrap();
        let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(header, vec!["Loss/a,b", "Train/KL"]);
        let rows: Vec<_> = reader.records().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][1], "0.5");
    }
}

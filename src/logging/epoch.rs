//! Per-epoch tabular logger
use super::{LogError, StatsLogger, SummaryWriter};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Aggregates values stored during an epoch and writes one summary row per dump.
///
/// Values are stored under a key with [`store`](EpochLogger::store) any number of times. A row
/// is built with [`log_tabular`](EpochLogger::log_tabular), either from an explicit value or
/// from the mean of the stored values (which are then cleared), and written to every backend
/// by [`dump_tabular`](EpochLogger::dump_tabular). The keys of the first row fix the columns.
pub struct EpochLogger {
    epoch_dict: BTreeMap<String, Vec<f64>>,
    header: Vec<String>,
    current_row: Vec<(String, f64)>,
    first_row: bool,
    /// Whether the most recent data has been dumped.
    logged: bool,
    step: u64,
    writers: Vec<Box<dyn SummaryWriter>>,
    start: coarsetime::Instant,
}

impl fmt::Debug for EpochLogger {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("EpochLogger")
            .field("header", &self.header)
            .field("current_row", &self.current_row)
            .field("logged", &self.logged)
            .field("step", &self.step)
            .field("num_writers", &self.writers.len())
            .finish()
    }
}

impl Default for EpochLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl EpochLogger {
    /// Create a logger without any backend.
    pub fn new() -> Self {
        Self {
            epoch_dict: BTreeMap::new(),
            header: Vec::new(),
            current_row: Vec::new(),
            first_row: true,
            logged: true,
            step: 0,
            writers: Vec::new(),
            start: coarsetime::Instant::now(),
        }
    }

    /// Add a backend that receives every dumped row.
    #[must_use]
    pub fn with_writer<W: SummaryWriter + 'static>(mut self, writer: W) -> Self {
        self.writers.push(Box::new(writer));
        self
    }

    /// Mean of the values stored under `key` since it was last logged.
    pub fn stats(&self, key: &str) -> Option<f64> {
        let values = self.epoch_dict.get(key)?;
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    /// Whether every stored episode statistic has been dumped.
    pub const fn logged(&self) -> bool {
        self.logged
    }

    pub fn set_logged(&mut self, logged: bool) {
        self.logged = logged;
    }

    /// Number of rows dumped so far.
    pub const fn num_rows(&self) -> u64 {
        self.step
    }

    /// Add a value to the current row.
    ///
    /// If `value` is `None` the mean of the values stored under `key` is used and the stored
    /// values are cleared.
    pub fn log_tabular(&mut self, key: &str, value: Option<f64>) -> Result<(), LogError> {
        let value = match value {
            Some(value) => value,
            None => {
                let mean = self
                    .stats(key)
                    .ok_or_else(|| LogError::NoValues(key.into()))?;
                if let Some(values) = self.epoch_dict.get_mut(key) {
                    values.clear();
                }
                mean
            }
        };
        if self.first_row {
            self.header.push(key.into());
        } else if !self.header.iter().any(|k| k == key) {
            return Err(LogError::NewKey(key.into()));
        }
        if self.current_row.iter().any(|(k, _)| k == key) {
            return Err(LogError::DuplicateKey(key.into()));
        }
        self.current_row.push((key.into(), value));
        Ok(())
    }

    /// Write the current row to every backend and start a new one.
    ///
    /// Columns missing from the row are written as NaN.
    pub fn dump_tabular(&mut self) -> Result<(), LogError> {
        let row: Vec<(String, f64)> = self
            .header
            .iter()
            .map(|key| {
                let value = self
                    .current_row
                    .iter()
                    .find(|(k, _)| k == key)
                    .map_or(f64::NAN, |(_, v)| *v);
                (key.clone(), value)
            })
            .collect();
        let elapsed = Duration::from_secs_f64(self.start.elapsed().as_f64());
        for writer in &mut self.writers {
            writer.write_row(self.step, &row, elapsed)?;
        }
        self.current_row.clear();
        self.first_row = false;
        self.logged = true;
        self.step += 1;
        Ok(())
    }
}

impl StatsLogger for EpochLogger {
    fn store(&mut self, key: &str, value: f64) {
        self.epoch_dict.entry(key.into()).or_default().push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Rows = Rc<RefCell<Vec<(u64, Vec<(String, f64)>)>>>;

    #[derive(Debug, Default, Clone)]
    struct Recorder(Rows);

    impl SummaryWriter for Recorder {
        fn write_row(
            &mut self,
            step: u64,
            row: &[(String, f64)],
            _: Duration,
        ) -> Result<(), LogError> {
            self.0.borrow_mut().push((step, row.to_vec()));
            Ok(())
        }
    }

    fn logger() -> (EpochLogger, Rows) {
        let recorder = Recorder::default();
        let rows = Rc::clone(&recorder.0);
        (EpochLogger::new().with_writer(recorder), rows)
    }

    #[test]
    fn logs_mean_of_stored_values() {
        let (mut logger, rows) = logger();
        logger.store("a", 1.0);
        logger.store("a", 3.0);
        assert_eq!(logger.stats("a"), Some(2.0));
        logger.log_tabular("a", None).unwrap();
        logger.log_tabular("b", Some(5.0)).unwrap();
        logger.dump_tabular().unwrap();

        assert_eq!(logger.stats("a"), None);
        assert_eq!(
            rows.borrow()[0],
            (0, vec![("a".into(), 2.0), ("b".into(), 5.0)])
        );
    }

    #[test]
    fn first_row_fixes_columns() {
        let (mut logger, rows) = logger();
        logger.log_tabular("a", Some(1.0)).unwrap();
        logger.log_tabular("b", Some(2.0)).unwrap();
        logger.dump_tabular().unwrap();

        assert!(matches!(
            logger.log_tabular("c", Some(0.0)),
            Err(LogError::NewKey(_))
        ));
        logger.log_tabular("b", Some(4.0)).unwrap();
        logger.dump_tabular().unwrap();
        let rows = rows.borrow();
        assert_eq!(rows[1].0, 1);
        assert!(rows[1].1[0].1.is_nan());
        assert_eq!(rows[1].1[1], ("b".into(), 4.0));
    }

    #[test]
    fn missing_values_are_an_error() {
        let (mut logger, _) = logger();
        assert!(matches!(
            logger.log_tabular("a", None),
            Err(LogError::NoValues(_))
        ));
    }

    #[test]
    fn duplicate_key_is_an_error() {
        let (mut logger, _) = logger();
        logger.log_tabular("a", Some(1.0)).unwrap();
        assert!(matches!(
            logger.log_tabular("a", Some(1.0)),
            Err(LogError::DuplicateKey(_))
        ));
    }

    #[test]
    fn dump_marks_logged() {
        let (mut logger, _) = logger();
        assert!(logger.logged());
        logger.set_logged(false);
        logger.log_tabular("a", Some(1.0)).unwrap();
        logger.dump_tabular().unwrap();
        assert!(logger.logged());
        assert_eq!(logger.num_rows(), 1);
    }
}

//! Tensorboard logger
use super::{LogError, SummaryWriter};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tensorboard_rs::summary_writer::SummaryWriter as TbSummaryWriter;

/// Logging backend that saves rows to a tensorboard event file.
///
/// Each row is written as scalars at a global step equal to the row index.
pub struct TensorBoardBackend {
    writer: TbSummaryWriter,
}

impl fmt::Debug for TensorBoardBackend {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TensorBoardBackend").finish()
    }
}

impl TensorBoardBackend {
    pub fn new<P: AsRef<Path>>(log_dir: P) -> Self {
        Self {
            writer: TbSummaryWriter::new(log_dir),
        }
    }
}

impl SummaryWriter for TensorBoardBackend {
    #[allow(clippy::cast_possible_truncation)]
    fn write_row(
        &mut self,
        step: u64,
        row: &[(String, f64)],
        _elapsed: Duration,
    ) -> Result<(), LogError> {
        for (tag, value) in row {
            if value.is_finite() {
                self.writer.add_scalar(tag, *value as f32, step as usize);
            }
        }
        self.writer.flush();
        Ok(())
    }
}

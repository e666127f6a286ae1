//! Logging statistics from training runs
mod checkpoint;
mod csv;
mod display;
mod epoch;
mod tensorboard;

pub use checkpoint::{CheckpointError, Checkpointer};
pub use self::csv::CsvBackend;
pub use display::DisplayBackend;
pub use epoch::EpochLogger;
pub use tensorboard::TensorBoardBackend;

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Store metric values for aggregation.
pub trait StatsLogger {
    /// Record a value under `key`.
    fn store(&mut self, key: &str, value: f64);
}

/// Logger that does nothing
impl StatsLogger for () {
    fn store(&mut self, _: &str, _: f64) {}
}

impl<T: StatsLogger + ?Sized> StatsLogger for &'_ mut T {
    fn store(&mut self, key: &str, value: f64) {
        T::store(*self, key, value)
    }
}

/// Write out rows of summarized values to a backend.
pub trait SummaryWriter {
    /// Write one row.
    ///
    /// # Args
    /// * `step` - Index of the row. Strictly increasing between calls.
    /// * `row` - Key-value pairs in a fixed order. Every row has the same keys as the first.
    /// * `elapsed` - Time since the logger was created.
    fn write_row(
        &mut self,
        step: u64,
        row: &[(String, f64)],
        elapsed: Duration,
    ) -> Result<(), LogError>;
}

/// Error logging a value.
#[derive(Error, Debug)]
pub enum LogError {
    #[error("key {0:?} was not in the first row")]
    NewKey(String),
    #[error("key {0:?} was already logged in this row")]
    DuplicateKey(String),
    #[error("no values stored for key {0:?}")]
    NoValues(String),
    #[error("io error writing logs")]
    Io(#[from] io::Error),
    #[error("error writing csv")]
    Csv(#[from] ::csv::Error),
}

//! Policy and critic updaters
mod passes;
mod ppo;

pub use passes::{next_phase, run_passes, PassOutcome, UpdatePhase};
pub use ppo::{clipped_surrogate_loss, pointwise_surrogate, PpoConfig, PpoUpdater, UpdateStats};

use super::optimizers::OptimizerStepError;
use tch::TchError;
use thiserror::Error;

/// Error updating the policy or critics.
///
/// Non-finite values abort the update before any optimizer step is taken with them.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("non-finite {0}")]
    NonFinite(&'static str),
    #[error("cannot update from an empty batch")]
    EmptyBatch,
    #[error("optimizer error")]
    Optimizer(#[from] OptimizerStepError),
    #[error("torch error")]
    Torch(#[from] TchError),
}

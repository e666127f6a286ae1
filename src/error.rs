//! Error type
use crate::buffers::BufferError;
use crate::config::ConfigError;
use crate::envs::EnvError;
use crate::logging::{CheckpointError, LogError};
use crate::torch::updaters::UpdateError;
use tch::TchError;
use thiserror::Error;

/// Error from a training run.
///
/// Every variant is fatal: training never retries a failed operation.
#[derive(Error, Debug)]
pub enum TrainError {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),
    #[error("environment error")]
    Env(#[from] EnvError),
    #[error("rollout buffer error")]
    Buffer(#[from] BufferError),
    #[error("policy update error")]
    Update(#[from] UpdateError),
    #[error("logging error")]
    Log(#[from] LogError),
    #[error("checkpoint error")]
    Checkpoint(#[from] CheckpointError),
    #[error("torch error")]
    Torch(#[from] TchError),
}

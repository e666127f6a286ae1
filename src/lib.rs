//! Proximal policy optimization with elastic weight consolidation.
//!
//! Trains a Gaussian actor and two critics (reward and cost) on a vectorized environment whose
//! dynamics cycle through a fixed list of variants. An elastic weight consolidation penalty
//! anchors the actor to the parameters it had at each continual-learning task boundary.
#![warn(clippy::cast_lossless)]
#![warn(clippy::doc_markdown)]
#![warn(clippy::explicit_iter_loop)]
#![warn(clippy::needless_borrow)]
#![warn(clippy::needless_pass_by_value)]
#![warn(clippy::redundant_closure_for_method_calls)]
#![warn(clippy::use_self)] // also triggered by macro expansions
pub mod buffers;
pub mod cli;
pub mod config;
pub mod envs;
mod error;
pub mod logging;
pub mod simulation;
pub mod torch;
pub mod utils;

pub use config::{ConfigError, TrainConfig};
pub use error::TrainError;
pub use simulation::{Trainer, TrainSummary};

/// Pseudo-random number generator type used throughout the crate.
///
/// Every consumer of randomness receives an explicitly seeded instance of this generator.
pub type Prng = rand_chacha::ChaCha8Rng;

//! Simulated environments
mod normalize;
mod step_limit;
mod task_cycle;
#[cfg(test)]
pub mod testing;
mod vec_env;
mod velocity;

pub use normalize::{NormalizeObservation, NormalizerState};
pub use step_limit::StepLimit;
pub use task_cycle::{TaskCycle, Variant, NOMINAL_MASSES, TASK_CYCLE, TASK_LENGTH};
pub use vec_env::{VecEnv, VecStep};
pub use velocity::{RunnerKind, VelocityRunner, VelocityRunnerConfig};

use crate::Prng;
use thiserror::Error;

/// A simulated environment with real-vector observations and actions.
///
/// The environment owns its state. Stepping after an episode has ended without a reset is not
/// an error; the dynamics simply continue.
pub trait Environment {
    /// Length of each observation vector.
    fn observation_dim(&self) -> usize;

    /// Length of each action vector.
    fn action_dim(&self) -> usize;

    /// Start a new episode and return its initial observation.
    fn reset(&mut self, rng: &mut Prng) -> Vec<f32>;

    /// Apply an action and advance the simulation by one step.
    fn step(&mut self, action: &[f32], rng: &mut Prng) -> Result<Step, EnvError>;
}

impl<E: Environment + ?Sized> Environment for Box<E> {
    fn observation_dim(&self) -> usize {
        E::observation_dim(self)
    }
    fn action_dim(&self) -> usize {
        E::action_dim(self)
    }
    fn reset(&mut self, rng: &mut Prng) -> Vec<f32> {
        E::reset(self, rng)
    }
    fn step(&mut self, action: &[f32], rng: &mut Prng) -> Result<Step, EnvError> {
        E::step(self, action, rng)
    }
}

/// The outcome of a single environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Observation after the step.
    pub observation: Vec<f32>,
    pub reward: f64,
    /// Safety cost of the step.
    pub cost: f64,
    /// The episode reached a terminal state; all future rewards are zero.
    pub terminated: bool,
    /// The episode was cut off without reaching a terminal state.
    pub truncated: bool,
}

impl Step {
    /// Whether the episode ended on this step, for either reason.
    #[inline]
    pub const fn episode_done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Error from stepping an environment.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnvError {
    #[error("action has {actual} elements, expected {expected}")]
    ActionDim { expected: usize, actual: usize },
    #[error("non-finite action value {0}")]
    NonFiniteAction(f32),
    #[error("simulation state became non-finite")]
    NonFiniteState,
    #[error("got actions for {actual} environments, expected {expected}")]
    SlotCount { expected: usize, actual: usize },
}

/// Check an action vector against the expected dimension.
pub(crate) fn check_action(action: &[f32], expected: usize) -> Result<(), EnvError> {
    if action.len() != expected {
        return Err(EnvError::ActionDim {
            expected,
            actual: action.len(),
        });
    }
    if let Some(&value) = action.iter().find(|a| !a.is_finite()) {
        return Err(EnvError::NonFiniteAction(value));
    }
    Ok(())
}

use super::{EnvError, Environment, Step};
use crate::Prng;

/// Environment wrapper that cuts off episodes after a set number of steps.
///
/// Cut-off episodes are marked as truncated, not terminated.
#[derive(Debug, Clone, PartialEq)]
pub struct StepLimit<E> {
    inner: E,
    /// Maximum number of steps per episode
    max_steps_per_episode: u64,
    current_steps: u64,
}

impl<E> StepLimit<E> {
    pub const DEFAULT_MAX_STEPS: u64 = 1000;

    pub const fn new(inner: E, max_steps_per_episode: u64) -> Self {
        Self {
            inner,
            max_steps_per_episode,
            current_steps: 0,
        }
    }

    pub const fn inner(&self) -> &E {
        &self.inner
    }

    pub const fn current_steps(&self) -> u64 {
        self.current_steps
    }
}

impl<E: Environment> Environment for StepLimit<E> {
    fn observation_dim(&self) -> usize {
        self.inner.observation_dim()
    }

    fn action_dim(&self) -> usize {
        self.inner.action_dim()
    }

    fn reset(&mut self, rng: &mut Prng) -> Vec<f32> {
        self.current_steps = 0;
        self.inner.reset(rng)
    }

    fn step(&mut self, action: &[f32], rng: &mut Prng) -> Result<Step, EnvError> {
        let mut step = self.inner.step(action, rng)?;
        self.current_steps += 1;
        // A terminal step is never also reported as truncated
        if self.current_steps >= self.max_steps_per_episode && !step.terminated {
            step.truncated = true;
        }
        Ok(step)
    }
}

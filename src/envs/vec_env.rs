//! Vectorized environment
use super::{EnvError, Environment, NormalizeObservation};
use crate::Prng;

/// Result of stepping every slot of a [`VecEnv`].
///
/// Observations are row-major `[num_envs, observation_dim]`.
#[derive(Debug, Clone, PartialEq)]
pub struct VecStep {
    /// Observation to act on next. For slots whose episode ended this is the first observation
    /// of the new episode.
    pub observations: Vec<f32>,
    pub rewards: Vec<f64>,
    pub costs: Vec<f64>,
    pub terminated: Vec<bool>,
    pub truncated: Vec<bool>,
    /// Last observation of the ended episode. `Some` only for slots that ended this step.
    pub final_observations: Vec<Option<Vec<f32>>>,
}

impl VecStep {
    /// Observation of one slot.
    pub fn observation(&self, slot: usize) -> &[f32] {
        let dim = self.observations.len() / self.rewards.len();
        &self.observations[slot * dim..(slot + 1) * dim]
    }
}

/// A fixed set of environments stepped in lockstep with automatic reset.
///
/// Actions are clipped to `[-1, 1]` before they reach the environments.
/// If normalization is enabled, observations (including final observations) are normalized by
/// running statistics shared across all slots.
#[derive(Debug)]
pub struct VecEnv<E> {
    envs: Vec<E>,
    normalizer: Option<NormalizeObservation>,
}

impl<E: Environment> VecEnv<E> {
    /// # Panics
    /// If `envs` is empty or the environments disagree on their dimensions.
    pub fn new(envs: Vec<E>, normalize: bool) -> Self {
        assert!(!envs.is_empty(), "at least one environment is required");
        let observation_dim = envs[0].observation_dim();
        let action_dim = envs[0].action_dim();
        assert!(
            envs.iter()
                .all(|e| e.observation_dim() == observation_dim && e.action_dim() == action_dim),
            "environments have mismatched dimensions"
        );
        let normalizer = if normalize {
            Some(NormalizeObservation::new(observation_dim))
        } else {
            None
        };
        Self { envs, normalizer }
    }

    pub fn num_envs(&self) -> usize {
        self.envs.len()
    }

    pub fn observation_dim(&self) -> usize {
        self.envs[0].observation_dim()
    }

    pub fn action_dim(&self) -> usize {
        self.envs[0].action_dim()
    }

    pub fn envs(&self) -> &[E] {
        &self.envs
    }

    pub const fn normalizer(&self) -> Option<&NormalizeObservation> {
        self.normalizer.as_ref()
    }

    /// Reset every slot. Returns the stacked initial observations.
    pub fn reset(&mut self, rng: &mut Prng) -> Vec<f32> {
        let mut observations = Vec::with_capacity(self.num_envs() * self.observation_dim());
        for env in &mut self.envs {
            let obs = env.reset(rng);
            observations.extend(process(&mut self.normalizer, &obs));
        }
        observations
    }

    /// Step every slot with its row of `actions` (row-major `[num_envs, action_dim]`).
    pub fn step(&mut self, actions: &[f32], rng: &mut Prng) -> Result<VecStep, EnvError> {
        let num_envs = self.num_envs();
        let action_dim = self.action_dim();
        if actions.len() != num_envs * action_dim {
            return Err(EnvError::SlotCount {
                expected: num_envs,
                actual: actions.len() / action_dim.max(1),
            });
        }

        let mut result = VecStep {
            observations: Vec::with_capacity(num_envs * self.observation_dim()),
            rewards: Vec::with_capacity(num_envs),
            costs: Vec::with_capacity(num_envs),
            terminated: Vec::with_capacity(num_envs),
            truncated: Vec::with_capacity(num_envs),
            final_observations: Vec::with_capacity(num_envs),
        };
        for (env, action) in self.envs.iter_mut().zip(actions.chunks_exact(action_dim)) {
            let clipped: Vec<f32> = action.iter().map(|a| a.clamp(-1.0, 1.0)).collect();
            let step = env.step(&clipped, rng)?;
            let observation = process(&mut self.normalizer, &step.observation);
            if step.episode_done() {
                let reset_obs = env.reset(rng);
                result
                    .observations
                    .extend(process(&mut self.normalizer, &reset_obs));
                result.final_observations.push(Some(observation));
            } else {
                result.observations.extend(observation);
                result.final_observations.push(None);
            }
            result.rewards.push(step.reward);
            result.costs.push(step.cost);
            result.terminated.push(step.terminated);
            result.truncated.push(step.truncated);
        }
        Ok(result)
    }
}

fn process(normalizer: &mut Option<NormalizeObservation>, observation: &[f32]) -> Vec<f32> {
    match normalizer {
        Some(n) => n.update_and_normalize(observation),
        None => observation.to_vec(),
    }
}

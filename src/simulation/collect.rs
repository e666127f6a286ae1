//! Rollout collection
use crate::buffers::{RolloutBuffer, Transition};
use crate::envs::{Environment, VecEnv};
use crate::logging::StatsLogger;
use crate::torch::ActorVCritic;
use crate::utils::RecencyWindow;
use crate::{Prng, TrainError};
use tch::{Device, Tensor};

/// Number of recent episodes averaged in the episode metrics.
pub const EPISODE_WINDOW: usize = 20;

/// How the path of a slot ended at a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathEnd {
    /// The episode reached a terminal state.
    Terminated,
    /// The episode was cut off; the final observation has a value.
    Truncated,
    /// The epoch ended mid-episode.
    EpochEnd,
}

impl PathEnd {
    /// Classify a slot after a step. `None` if the path continues.
    pub const fn classify(terminated: bool, truncated: bool, epoch_end: bool) -> Option<Self> {
        if terminated {
            Some(Self::Terminated)
        } else if truncated {
            Some(Self::Truncated)
        } else if epoch_end {
            Some(Self::EpochEnd)
        } else {
            None
        }
    }

    /// Whether the episode itself ended (not just the epoch).
    pub const fn is_episode_end(self) -> bool {
        matches!(self, Self::Terminated | Self::Truncated)
    }
}

/// Summary of one epoch of collection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectSummary {
    /// Environment steps summed over all slots.
    pub steps: usize,
    /// Number of episodes that ended.
    pub episodes: usize,
    /// Number of paths closed in the buffer.
    pub paths: usize,
}

/// Fills a rollout buffer from a vectorized environment with the current policy.
///
/// Tracks the running return, cost and length of each slot's episode. When an episode ends
/// its totals are pushed into recency windows whose means are stored as
/// `Metrics/{EpRet,EpCost,EpLen}`.
#[derive(Debug)]
pub struct RolloutCollector {
    local_steps_per_epoch: usize,
    observation_dim: usize,
    /// Current observations, row-major `[num_envs, observation_dim]`.
    observations: Vec<f32>,
    episode_returns: Vec<f64>,
    episode_costs: Vec<f64>,
    episode_lengths: Vec<u64>,
    return_window: RecencyWindow,
    cost_window: RecencyWindow,
    length_window: RecencyWindow,
}

impl RolloutCollector {
    /// Reset `env` and prepare to collect `local_steps_per_epoch` steps per slot each epoch.
    pub fn new<E: Environment>(
        env: &mut VecEnv<E>,
        local_steps_per_epoch: usize,
        rng: &mut Prng,
    ) -> Self {
        let num_envs = env.num_envs();
        Self {
            local_steps_per_epoch,
            observation_dim: env.observation_dim(),
            observations: env.reset(rng),
            episode_returns: vec![0.0; num_envs],
            episode_costs: vec![0.0; num_envs],
            episode_lengths: vec![0; num_envs],
            return_window: RecencyWindow::new(EPISODE_WINDOW),
            cost_window: RecencyWindow::new(EPISODE_WINDOW),
            length_window: RecencyWindow::new(EPISODE_WINDOW),
        }
    }

    pub const fn local_steps_per_epoch(&self) -> usize {
        self.local_steps_per_epoch
    }

    /// Mean return of the recent episodes.
    pub fn mean_return(&self) -> Option<f64> {
        self.return_window.mean()
    }

    /// Collect one epoch of data into `buffer`.
    ///
    /// Every slot's path is closed at the end of the epoch and at every episode end.
    pub fn collect<E, B, L>(
        &mut self,
        env: &mut VecEnv<E>,
        policy: &ActorVCritic,
        buffer: &mut B,
        logger: &mut L,
        rng: &mut Prng,
    ) -> Result<CollectSummary, TrainError>
    where
        E: Environment,
        B: RolloutBuffer + ?Sized,
        L: StatsLogger + ?Sized,
    {
        let num_envs = env.num_envs();
        let action_dim = env.action_dim();
        let device = policy.device();
        let mut summary = CollectSummary::default();

        for t in 0..self.local_steps_per_epoch {
            let observations = Tensor::of_slice(&self.observations)
                .f_reshape(&[num_envs as i64, self.observation_dim as i64])?
                .f_to_device(device)?;
            let policy_step = policy.step(&observations, false, rng);
            let actions = to_vec(&policy_step.actions)?;
            let log_probs = to_vec(&policy_step.log_probs)?;
            let values_r = to_vec(&policy_step.values_r)?;
            let values_c = to_vec(&policy_step.values_c)?;

            let vec_step = env.step(&actions, rng)?;
            summary.steps += num_envs;

            for slot in 0..num_envs {
                buffer.store(
                    slot,
                    Transition {
                        observation: self.observation(slot).to_vec(),
                        action: actions[slot * action_dim..(slot + 1) * action_dim].to_vec(),
                        reward: vec_step.rewards[slot],
                        cost: vec_step.costs[slot],
                        value_r: values_r[slot].into(),
                        value_c: values_c[slot].into(),
                        log_prob: log_probs[slot].into(),
                    },
                )?;
                self.episode_returns[slot] += vec_step.rewards[slot];
                self.episode_costs[slot] += vec_step.costs[slot];
                self.episode_lengths[slot] += 1;
            }
            self.observations.clone_from(&vec_step.observations);

            let epoch_end = t + 1 >= self.local_steps_per_epoch;
            for slot in 0..num_envs {
                let end = match PathEnd::classify(
                    vec_step.terminated[slot],
                    vec_step.truncated[slot],
                    epoch_end,
                ) {
                    Some(end) => end,
                    None => continue,
                };
                let (last_value_r, last_value_c) = path_end_values(
                    policy,
                    end,
                    vec_step.final_observations[slot].as_deref(),
                    self.observation(slot),
                );
                if end.is_episode_end() {
                    self.end_episode(slot, logger);
                    summary.episodes += 1;
                }
                buffer.finish_path(last_value_r, last_value_c, slot)?;
                summary.paths += 1;
            }
        }
        Ok(summary)
    }

    fn observation(&self, slot: usize) -> &[f32] {
        &self.observations[slot * self.observation_dim..(slot + 1) * self.observation_dim]
    }

    fn end_episode<L: StatsLogger + ?Sized>(&mut self, slot: usize, logger: &mut L) {
        self.return_window.push(self.episode_returns[slot]);
        self.cost_window.push(self.episode_costs[slot]);
        self.length_window.push(self.episode_lengths[slot] as f64);
        for (key, window) in [
            ("Metrics/EpRet", &self.return_window),
            ("Metrics/EpCost", &self.cost_window),
            ("Metrics/EpLen", &self.length_window),
        ] {
            if let Some(mean) = window.mean() {
                logger.store(key, mean);
            }
        }
        self.episode_returns[slot] = 0.0;
        self.episode_costs[slot] = 0.0;
        self.episode_lengths[slot] = 0;
    }
}

/// Flattened contents of a float tensor.
fn to_vec(tensor: &Tensor) -> Result<Vec<f32>, tch::TchError> {
    let flat = tensor.f_flatten(0, -1)?.f_to_device(Device::Cpu)?;
    Ok(Vec::<f32>::from(&flat))
}

/// Reward and cost values that close a path.
///
/// Zero after termination. After truncation the critics evaluate the final observation, or a
/// zero vector if the environment did not supply one. At the end of an epoch they evaluate the
/// current observation.
fn path_end_values(
    policy: &ActorVCritic,
    end: PathEnd,
    final_observation: Option<&[f32]>,
    observation: &[f32],
) -> (f64, f64) {
    match end {
        PathEnd::Terminated => (0.0, 0.0),
        PathEnd::Truncated => match final_observation {
            Some(final_observation) => policy.bootstrap_values(final_observation),
            None => {
                log::warn!("path truncated without a final observation");
                policy.bootstrap_values(&vec![0.0; observation.len()])
            }
        },
        PathEnd::EpochEnd => policy.bootstrap_values(observation),
    }
}

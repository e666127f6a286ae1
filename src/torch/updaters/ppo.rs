//! Proximal policy optimization with an elastic weight consolidation penalty.
use super::passes::{run_passes, PassOutcome};
use super::UpdateError;
use crate::buffers::EpochBatch;
use crate::config::TrainConfig;
use crate::torch::ewc::EwcRegularizer;
use crate::torch::optimizers::{
    AdamConfig, BaseOptimizer, BuildOptimizer, LinearLr, OnceOptimizer,
};
use crate::torch::params::ParamSet;
use crate::torch::policy::ActorVCritic;
use crate::torch::utils::{f_all_finite, f_clip_grad_norm};
use crate::Prng;
use rand::seq::SliceRandom;
use std::fmt;
use tch::{COptimizer, Kind, Reduction, Tensor};

/// Probability-ratio times advantage with the clipped alternative, taking the pessimistic one.
///
/// `min(r * A, clip(r, 1 - eps, 1 + eps) * A)` elementwise.
pub fn pointwise_surrogate(ratio: &Tensor, advantages: &Tensor, clip_ratio: f64) -> Tensor {
    let clipped_ratio = ratio.clip(1.0 - clip_ratio, 1.0 + clip_ratio);
    (ratio * advantages).min_other(&(clipped_ratio * advantages))
}

/// Clipped surrogate loss: the negated mean of [`pointwise_surrogate`].
pub fn clipped_surrogate_loss(
    log_probs: &Tensor,
    initial_log_probs: &Tensor,
    advantages: &Tensor,
    clip_ratio: f64,
) -> Tensor {
    let ratio = (log_probs - initial_log_probs).exp();
    pointwise_surrogate(&ratio, advantages, clip_ratio)
        .mean(Kind::Float)
        .neg()
}

/// Proximal policy optimization configuration.
///
/// # Reference
/// [Proximal Policy Optimization Algorithms][ppo] by Schulman et al.
///
/// [ppo]: https://arxiv.org/abs/1707.06347
#[derive(Debug, Clone, PartialEq)]
pub struct PpoConfig {
    /// Maximum number of passes over the batch per update.
    pub learning_iters: usize,
    pub batch_size: usize,
    pub clip_ratio: f64,
    /// Stop passing over the batch once the mean KL divergence exceeds this value.
    pub target_kl: f64,
    /// Maximum global gradient norm of the actor and critics.
    pub max_grad_norm: f64,
    /// Add an L2 penalty on the critic parameters to each critic loss.
    pub use_critic_norm: bool,
    pub critic_norm_coef: f64,
    /// Weight the reward critic loss by 2.
    pub use_value_coefficient: bool,
    pub actor_learning_rate: f64,
    pub critic_learning_rate: f64,
    /// Number of updates over which the actor learning rate decays to zero.
    pub total_updates: usize,
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self::from(&TrainConfig::default())
    }
}

impl From<&TrainConfig> for PpoConfig {
    fn from(config: &TrainConfig) -> Self {
        Self {
            learning_iters: config.learning_iters,
            batch_size: config.batch_size,
            clip_ratio: config.clip_ratio,
            target_kl: config.target_kl,
            max_grad_norm: config.max_grad_norm,
            use_critic_norm: config.use_critic_norm,
            critic_norm_coef: config.critic_norm_coef,
            use_value_coefficient: config.use_value_coefficient,
            actor_learning_rate: config.actor_learning_rate,
            critic_learning_rate: config.critic_learning_rate,
            total_updates: config.epochs(),
        }
    }
}

/// Statistics of one call to [`PpoUpdater::update`].
///
/// Losses are means over every minibatch step of the update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateStats {
    pub outcome: PassOutcome,
    /// Actor learning rate after the schedule step.
    pub learning_rate: f64,
    pub loss_reward_critic: f64,
    pub loss_cost_critic: f64,
    pub loss_actor: f64,
    /// Penalty scaled by the regularizer weight.
    pub loss_ewc: f64,
}

#[derive(Debug, Default, Clone, Copy)]
struct LossSums {
    reward_critic: f64,
    cost_critic: f64,
    actor: f64,
    ewc: f64,
    count: usize,
}

impl LossSums {
    fn mean(&self, sum: f64) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            sum / self.count as f64
        }
    }
}

/// Updates an [`ActorVCritic`] with the PPO clipped objective.
///
/// The actor and both critics have independent Adam optimizers and are updated from one
/// combined loss per minibatch. Only the actor learning rate follows the linear decay schedule.
pub struct PpoUpdater {
    config: PpoConfig,
    actor_optimizer: COptimizer,
    reward_critic_optimizer: COptimizer,
    cost_critic_optimizer: COptimizer,
    actor_schedule: LinearLr,
}

impl fmt::Debug for PpoUpdater {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PpoUpdater")
            .field("config", &self.config)
            .field("actor_schedule", &self.actor_schedule)
            .finish()
    }
}

impl PpoUpdater {
    pub fn new(config: PpoConfig, policy: &ActorVCritic) -> Result<Self, UpdateError> {
        let actor_optimizer = AdamConfig::with_learning_rate(config.actor_learning_rate)
            .build_optimizer(policy.actor_var_store())?;
        let critic_config = AdamConfig::with_learning_rate(config.critic_learning_rate);
        let reward_critic_optimizer =
            critic_config.build_optimizer(policy.reward_critic_var_store())?;
        let cost_critic_optimizer = critic_config.build_optimizer(policy.cost_critic_var_store())?;
        let actor_schedule = LinearLr::new(config.actor_learning_rate, config.total_updates);
        Ok(Self {
            config,
            actor_optimizer,
            reward_critic_optimizer,
            cost_critic_optimizer,
            actor_schedule,
        })
    }

    pub const fn config(&self) -> &PpoConfig {
        &self.config
    }

    /// Current actor learning rate.
    pub fn learning_rate(&self) -> f64 {
        self.actor_schedule.learning_rate()
    }

    /// Update the policy from a drained epoch batch.
    ///
    /// Runs passes of shuffled minibatch steps until the KL divergence from the pre-update
    /// policy exceeds the target or the pass limit is reached, then steps the learning rate
    /// schedule.
    pub fn update(
        &mut self,
        policy: &ActorVCritic,
        ewc: &EwcRegularizer,
        batch: &EpochBatch,
        rng: &mut Prng,
    ) -> Result<UpdateStats, UpdateError> {
        let num_samples = batch.len();
        if num_samples == 0 {
            return Err(UpdateError::EmptyBatch);
        }
        let initial_distribution = {
            let _no_grad = tch::no_grad_guard();
            policy.actor(&batch.observations).detached()
        };

        let actor_params = policy.actor_params();
        let reward_critic_params = policy.reward_critic_params();
        let cost_critic_params = policy.cost_critic_params();
        let all_params: Vec<&Tensor> = actor_params
            .tensors()
            .chain(reward_critic_params.tensors())
            .chain(cost_critic_params.tensors())
            .collect();

        let device = policy.device();
        let mut indices: Vec<i64> = (0..num_samples as i64).collect();
        let mut sums = LossSums::default();

        let learning_iters = self.config.learning_iters;
        let target_kl = self.config.target_kl;
        let pass = |_pass: usize| -> Result<f64, UpdateError> {
            indices.shuffle(rng);
            for chunk in indices.chunks(self.config.batch_size) {
                let index = Tensor::of_slice(chunk).to_device(device);
                self.minibatch_step(
                    policy,
                    ewc,
                    batch,
                    &index,
                    (&actor_params, &reward_critic_params, &cost_critic_params),
                    &all_params,
                    &mut sums,
                )?;
            }

            let _no_grad = tch::no_grad_guard();
            let kl = initial_distribution
                .kl_divergence_from(&policy.actor(&batch.observations))
                .mean(Kind::Float)
                .f_double_value(&[])?;
            if !kl.is_finite() {
                return Err(UpdateError::NonFinite("KL divergence"));
            }
            Ok(kl)
        };
        let outcome: PassOutcome = run_passes(learning_iters, target_kl, pass)?;

        let learning_rate = self.actor_schedule.step(&mut self.actor_optimizer)?;
        log::debug!(
            "update {} after {} passes; KL {:.5}",
            outcome.phase,
            outcome.passes,
            outcome.final_kl
        );

        Ok(UpdateStats {
            outcome,
            learning_rate,
            loss_reward_critic: sums.mean(sums.reward_critic),
            loss_cost_critic: sums.mean(sums.cost_critic),
            loss_actor: sums.mean(sums.actor),
            loss_ewc: sums.mean(sums.ewc),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn minibatch_step(
        &mut self,
        policy: &ActorVCritic,
        ewc: &EwcRegularizer,
        batch: &EpochBatch,
        index: &Tensor,
        (actor_params, reward_critic_params, cost_critic_params): (
            &ParamSet,
            &ParamSet,
            &ParamSet,
        ),
        all_params: &[&Tensor],
        sums: &mut LossSums,
    ) -> Result<(), UpdateError> {
        let observations = batch.observations.f_index_select(0, index)?;
        let actions = batch.actions.f_index_select(0, index)?;
        let initial_log_probs = batch.log_probs.f_index_select(0, index)?;
        let target_values_r = batch.target_values_r.f_index_select(0, index)?;
        let target_values_c = batch.target_values_c.f_index_select(0, index)?;
        let advantages = batch.advantages_r.f_index_select(0, index)?;

        let mut loss_r = policy
            .reward_values(&observations)
            .f_mse_loss(&target_values_r, Reduction::Mean)?;
        let mut loss_c = policy
            .cost_values(&observations)
            .f_mse_loss(&target_values_c, Reduction::Mean)?;
        if self.config.use_critic_norm {
            loss_r = loss_r + squared_norm(reward_critic_params) * self.config.critic_norm_coef;
            loss_c = loss_c + squared_norm(cost_critic_params) * self.config.critic_norm_coef;
        }

        let log_probs = policy.actor(&observations).log_prob(&actions);
        let loss_pi = clipped_surrogate_loss(
            &log_probs,
            &initial_log_probs,
            &advantages,
            self.config.clip_ratio,
        );
        let loss_ewc = ewc.penalty(actor_params) * ewc.lambda();

        let reward_coef = if self.config.use_value_coefficient {
            2.0
        } else {
            1.0
        };
        let total_loss = &loss_pi + &loss_r * reward_coef + &loss_c + &loss_ewc;
        if !f_all_finite(&loss_ewc)? {
            return Err(UpdateError::NonFinite("EWC penalty"));
        }
        if !f_all_finite(&total_loss)? {
            return Err(UpdateError::NonFinite("loss"));
        }

        BaseOptimizer::zero_grad(&mut self.actor_optimizer)?;
        BaseOptimizer::zero_grad(&mut self.reward_critic_optimizer)?;
        BaseOptimizer::zero_grad(&mut self.cost_critic_optimizer)?;
        total_loss.backward();
        let grad_norm = f_clip_grad_norm(all_params, self.config.max_grad_norm)?;
        if !grad_norm.is_finite() {
            return Err(UpdateError::NonFinite("gradient norm"));
        }
        self.reward_critic_optimizer.step_once()?;
        self.cost_critic_optimizer.step_once()?;
        self.actor_optimizer.step_once()?;

        sums.reward_critic += loss_r.f_double_value(&[])?;
        sums.cost_critic += loss_c.f_double_value(&[])?;
        sums.actor += loss_pi.f_double_value(&[])?;
        sums.ewc += loss_ewc.f_double_value(&[])?;
        sums.count += 1;
        Ok(())
    }
}

/// Sum of squares of every parameter.
fn squared_norm(params: &ParamSet) -> Tensor {
    params
        .tensors()
        .map(|t| t.square().sum(Kind::Float))
        .fold(None, |acc: Option<Tensor>, x| {
            Some(match acc {
                Some(acc) => acc + x,
                None => x,
            })
        })
        .unwrap_or_else(|| Tensor::from(0.0f32))
}

//! Gaussian actor with reward and cost critics
use super::distributions::DiagGaussian;
use super::modules::{Mlp, MlpConfig};
use super::params::ParamSet;
use crate::Prng;
use std::fmt;
use std::path::Path;
use tch::{
    nn::{Init, VarStore},
    Device, TchError, Tensor,
};

/// Initial log standard deviation of the action distribution.
const INITIAL_LOG_STD: f64 = -0.5;

/// Output of [`ActorVCritic::step`] for a batch of observations.
#[derive(Debug)]
pub struct PolicyStep {
    /// `[BATCH_SHAPE.., action_dim]`
    pub actions: Tensor,
    /// `[BATCH_SHAPE..]` log probabilities of `actions`.
    pub log_probs: Tensor,
    /// `[BATCH_SHAPE..]` reward critic values.
    pub values_r: Tensor,
    /// `[BATCH_SHAPE..]` cost critic values.
    pub values_c: Tensor,
}

/// Stochastic Gaussian actor with a state-independent standard deviation together with
/// separate reward and cost state value critics.
///
/// Each of the three networks has its own variable store so that each can be given its own
/// optimizer.
pub struct ActorVCritic {
    actor_vs: VarStore,
    reward_critic_vs: VarStore,
    cost_critic_vs: VarStore,
    mean_fn: Mlp,
    log_std: Tensor,
    reward_critic: Mlp,
    cost_critic: Mlp,
    observation_dim: usize,
    action_dim: usize,
}

impl fmt::Debug for ActorVCritic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ActorVCritic")
            .field("observation_dim", &self.observation_dim)
            .field("action_dim", &self.action_dim)
            .field("mean_fn", &self.mean_fn)
            .field("reward_critic", &self.reward_critic)
            .field("cost_critic", &self.cost_critic)
            .finish()
    }
}

impl ActorVCritic {
    pub fn new(
        observation_dim: usize,
        action_dim: usize,
        hidden_sizes: &[usize],
        device: Device,
    ) -> Self {
        let config = MlpConfig {
            hidden_sizes: hidden_sizes.to_vec(),
            ..MlpConfig::default()
        };

        let actor_vs = VarStore::new(device);
        let mean_fn = config.build_module(&(&actor_vs.root() / "mean"), observation_dim, action_dim);
        let log_std = actor_vs.root().var(
            "log_std",
            &[action_dim as i64],
            Init::Const(INITIAL_LOG_STD),
        );

        let reward_critic_vs = VarStore::new(device);
        let reward_critic = config.build_module(&reward_critic_vs.root(), observation_dim, 1);
        let cost_critic_vs = VarStore::new(device);
        let cost_critic = config.build_module(&cost_critic_vs.root(), observation_dim, 1);

        Self {
            actor_vs,
            reward_critic_vs,
            cost_critic_vs,
            mean_fn,
            log_std,
            reward_critic,
            cost_critic,
            observation_dim,
            action_dim,
        }
    }

    pub const fn observation_dim(&self) -> usize {
        self.observation_dim
    }

    pub const fn action_dim(&self) -> usize {
        self.action_dim
    }

    pub fn device(&self) -> Device {
        self.actor_vs.device()
    }

    /// Action distribution given observations of shape `[BATCH_SHAPE.., observation_dim]`.
    pub fn actor(&self, observations: &Tensor) -> DiagGaussian {
        DiagGaussian::new(
            self.mean_fn.forward(observations),
            self.log_std.shallow_clone(),
        )
    }

    /// Reward critic state values, with the trailing unit dimension removed.
    pub fn reward_values(&self, observations: &Tensor) -> Tensor {
        self.reward_critic.forward(observations).squeeze_dim(-1)
    }

    /// Cost critic state values, with the trailing unit dimension removed.
    pub fn cost_values(&self, observations: &Tensor) -> Tensor {
        self.cost_critic.forward(observations).squeeze_dim(-1)
    }

    /// Select actions without tracking gradients.
    ///
    /// Deterministic selection takes the distribution mode; otherwise actions are sampled with
    /// noise drawn from `rng`.
    pub fn step(&self, observations: &Tensor, deterministic: bool, rng: &mut Prng) -> PolicyStep {
        let _no_grad = tch::no_grad_guard();
        let distribution = self.actor(observations);
        let actions = if deterministic {
            distribution.mode()
        } else {
            distribution.sample(rng)
        };
        let log_probs = distribution.log_prob(&actions);
        PolicyStep {
            actions,
            log_probs,
            values_r: self.reward_values(observations),
            values_c: self.cost_values(observations),
        }
    }

    /// Critic values of one observation vector without tracking gradients.
    pub fn bootstrap_values(&self, observation: &[f32]) -> (f64, f64) {
        let _no_grad = tch::no_grad_guard();
        let observation = Tensor::of_slice(observation).to_device(self.device());
        (
            f64::from(self.reward_values(&observation)),
            f64::from(self.cost_values(&observation)),
        )
    }

    /// Ordered registry of the actor parameters.
    pub fn actor_params(&self) -> ParamSet {
        ParamSet::from_var_store(&self.actor_vs)
    }

    pub fn reward_critic_params(&self) -> ParamSet {
        ParamSet::from_var_store(&self.reward_critic_vs)
    }

    pub fn cost_critic_params(&self) -> ParamSet {
        ParamSet::from_var_store(&self.cost_critic_vs)
    }

    pub const fn actor_var_store(&self) -> &VarStore {
        &self.actor_vs
    }

    pub const fn reward_critic_var_store(&self) -> &VarStore {
        &self.reward_critic_vs
    }

    pub const fn cost_critic_var_store(&self) -> &VarStore {
        &self.cost_critic_vs
    }

    /// Save the actor variables.
    pub fn save_actor<P: AsRef<Path>>(&self, path: P) -> Result<(), TchError> {
        self.actor_vs.save(path)
    }

    /// Load actor variables saved with [`save_actor`](Self::save_actor).
    pub fn load_actor<P: AsRef<Path>>(&mut self, path: P) -> Result<(), TchError> {
        self.actor_vs.load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rstest::{fixture, rstest};
    use tch::Kind;

    #[fixture]
    fn policy() -> ActorVCritic {
        tch::manual_seed(0);
        ActorVCritic::new(3, 2, &[8], Device::Cpu)
    }

    #[rstest]
    fn step_shapes(policy: ActorVCritic) {
        let obs = Tensor::zeros(&[5, 3], (Kind::Float, Device::Cpu));
        let step = policy.step(&obs, false, &mut Prng::seed_from_u64(0));
        assert_eq!(step.actions.size(), vec![5, 2]);
        assert_eq!(step.log_probs.size(), vec![5]);
        assert_eq!(step.values_r.size(), vec![5]);
        assert_eq!(step.values_c.size(), vec![5]);
        assert!(!step.log_probs.requires_grad());
    }

    #[rstest]
    fn deterministic_step_is_mean(policy: ActorVCritic) {
        let obs = Tensor::ones(&[3], (Kind::Float, Device::Cpu));
        let mut rng = Prng::seed_from_u64(0);
        let a = policy.step(&obs, true, &mut rng);
        let b = policy.step(&obs, true, &mut rng);
        assert_eq!(a.actions, b.actions);
        assert_eq!(a.actions, policy.actor(&obs).mean().detach());
    }

    #[rstest]
    fn actor_params_exclude_critics(policy: ActorVCritic) {
        let names: Vec<_> = policy.actor_params().names().map(String::from).collect();
        assert_eq!(
            names,
            vec![
                "log_std",
                "mean.layer_0.bias",
                "mean.layer_0.weight",
                "mean.layer_1.bias",
                "mean.layer_1.weight"
            ]
        );
        assert_eq!(policy.reward_critic_params().len(), 4);
        assert_eq!(policy.cost_critic_params().len(), 4);
    }

    #[rstest]
    fn log_prob_is_differentiable(policy: ActorVCritic) {
        let obs = Tensor::ones(&[4, 3], (Kind::Float, Device::Cpu));
        let actions = Tensor::zeros(&[4, 2], (Kind::Float, Device::Cpu));
        policy.actor(&obs).log_prob(&actions).sum(Kind::Float).backward();
        for (name, t) in policy.actor_params().iter() {
            assert!(t.grad().defined(), "{} has no gradient", name);
        }
    }

    #[rstest]
    fn bootstrap_matches_batch_values(policy: ActorVCritic) {
        let obs = [0.5f32, -1.0, 2.0];
        let (value_r, value_c) = policy.bootstrap_values(&obs);
        let batch = Tensor::of_slice(&obs).reshape(&[1, 3]);
        let expected_r = f64::from(policy.reward_values(&batch).get(0));
        let expected_c = f64::from(policy.cost_values(&batch).get(0));
        assert!((value_r - expected_r).abs() < 1e-6);
        assert!((value_c - expected_c).abs() < 1e-6);
    }

    #[test]
    fn save_and_load_actor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actor.pt");
        tch::manual_seed(1);
        let policy = ActorVCritic::new(3, 2, &[4], Device::Cpu);
        policy.save_actor(&path).unwrap();

        tch::manual_seed(2);
        let mut other = ActorVCritic::new(3, 2, &[4], Device::Cpu);
        other.load_actor(&path).unwrap();
        let obs = Tensor::ones(&[3], (Kind::Float, Device::Cpu));
        assert_eq!(
            policy.actor(&obs).mean().detach(),
            other.actor(&obs).mean().detach()
        );
    }
}

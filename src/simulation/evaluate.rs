//! Reference environment evaluation
use crate::envs::{
    Environment, RunnerKind, StepLimit, VecEnv, VelocityRunner, VelocityRunnerConfig,
};
use crate::logging::StatsLogger;
use crate::torch::ActorVCritic;
use crate::utils::RecencyWindow;
use crate::{Prng, TrainError};
use tch::{Device, Tensor};

/// Number of recent evaluation episodes averaged in the evaluation metrics.
pub const EVAL_WINDOW: usize = 1;

/// Return, cost and length of one evaluation episode.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct EpisodeTotals {
    pub ret: f64,
    pub cost: f64,
    pub len: u64,
}

/// A reference environment that the policy is periodically evaluated on.
#[derive(Debug)]
pub struct EvalProbe<E> {
    name: String,
    env: VecEnv<E>,
    deterministic: bool,
    return_window: RecencyWindow,
    cost_window: RecencyWindow,
    length_window: RecencyWindow,
}

impl<E: Environment> EvalProbe<E> {
    /// # Args
    /// * `name` - Metric key prefix; metrics are stored as `Metrics/{name}EvalEp{Ret,Cost,Len}`.
    /// * `env` - Single-slot environment. Its episodes must end on their own.
    /// * `deterministic` - Act with the action distribution mode instead of sampling.
    pub fn new(name: impl Into<String>, env: VecEnv<E>, deterministic: bool) -> Self {
        Self {
            name: name.into(),
            env,
            deterministic,
            return_window: RecencyWindow::new(EVAL_WINDOW),
            cost_window: RecencyWindow::new(EVAL_WINDOW),
            length_window: RecencyWindow::new(EVAL_WINDOW),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn deterministic(&self) -> bool {
        self.deterministic
    }

    /// Run one episode to termination or truncation.
    pub fn run_episode(
        &mut self,
        policy: &ActorVCritic,
        rng: &mut Prng,
    ) -> Result<EpisodeTotals, TrainError> {
        let observation_dim = self.env.observation_dim() as i64;
        let mut observation = self.env.reset(rng);
        let mut totals = EpisodeTotals::default();
        loop {
            let input = Tensor::of_slice(&observation)
                .f_reshape(&[1, observation_dim])?
                .f_to_device(policy.device())?;
            let actions = policy
                .step(&input, self.deterministic, rng)
                .actions
                .f_flatten(0, -1)?
                .f_to_device(Device::Cpu)?;
            let step = self.env.step(&Vec::<f32>::from(&actions), rng)?;
            totals.ret += step.rewards[0];
            totals.cost += step.costs[0];
            totals.len += 1;
            if step.terminated[0] || step.truncated[0] {
                return Ok(totals);
            }
            observation = step.observations;
        }
    }

    /// Run an episode, record it and store the windowed means.
    pub fn evaluate<L: StatsLogger + ?Sized>(
        &mut self,
        policy: &ActorVCritic,
        logger: &mut L,
        rng: &mut Prng,
    ) -> Result<EpisodeTotals, TrainError> {
        let totals = self.run_episode(policy, rng)?;
        self.return_window.push(totals.ret);
        self.cost_window.push(totals.cost);
        self.length_window.push(totals.len as f64);
        for (suffix, window) in [
            ("Ret", &self.return_window),
            ("Cost", &self.cost_window),
            ("Len", &self.length_window),
        ] {
            if let Some(mean) = window.mean() {
                logger.store(&format!("Metrics/{}EvalEp{}", self.name, suffix), mean);
            }
        }
        Ok(totals)
    }
}

/// Evaluates the policy on fixed reference environments.
///
/// Evaluation results are for monitoring only and never feed into training.
#[derive(Debug)]
pub struct Evaluator<E> {
    probes: Vec<EvalProbe<E>>,
}

impl Evaluator<StepLimit<VelocityRunner>> {
    /// Deterministic evaluation on the nominal runner and stochastic evaluation on the runner
    /// with a heavy back leg.
    pub fn reference(rng: &mut Prng) -> Self {
        let probe = |name: &str, kind, deterministic, rng: &mut Prng| {
            let runner = VelocityRunnerConfig::with_kind(kind).build_env(rng);
            let env = StepLimit::new(runner, StepLimit::<VelocityRunner>::DEFAULT_MAX_STEPS);
            EvalProbe::new(name, VecEnv::new(vec![env], true), deterministic)
        };
        Self::new(vec![
            probe("Nominal", RunnerKind::Nominal, true, rng),
            probe("Leg", RunnerKind::Leg, false, rng),
        ])
    }
}

impl<E: Environment> Evaluator<E> {
    pub fn new(probes: Vec<EvalProbe<E>>) -> Self {
        Self { probes }
    }

    pub fn probes(&self) -> &[EvalProbe<E>] {
        &self.probes
    }

    /// Run one episode on each probe in order.
    pub fn evaluate<L: StatsLogger + ?Sized>(
        &mut self,
        policy: &ActorVCritic,
        logger: &mut L,
        rng: &mut Prng,
    ) -> Result<Vec<EpisodeTotals>, TrainError> {
        self.probes
            .iter_mut()
            .map(|probe| {
                log::debug!("evaluating on {}", probe.name());
                probe.evaluate(policy, logger, rng)
            })
            .collect()
    }
}

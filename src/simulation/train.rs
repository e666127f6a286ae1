//! Training loop
use super::collect::RolloutCollector;
use super::evaluate::Evaluator;
use crate::buffers::{EpochBatch, RolloutBuffer, VectorizedOnPolicyBuffer};
use crate::config::TrainConfig;
use crate::envs::{RunnerKind, StepLimit, VecEnv, VelocityRunner, VelocityRunnerConfig};
use crate::logging::{
    Checkpointer, CsvBackend, DisplayBackend, EpochLogger, StatsLogger, TensorBoardBackend,
};
use crate::torch::updaters::{PpoConfig, UpdateStats};
use crate::torch::{ActorVCritic, EwcRegularizer, PpoUpdater};
use crate::{Prng, TrainError};
use chrono::{DateTime, TimeZone};
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tch::Kind;

/// Environment task name used in run directory paths.
pub const TASK_NAME: &str = "VelocityRunnerCycling";
/// Algorithm name used in run directory paths.
pub const ALGO_NAME: &str = "ppo_ewc";

/// Run directory `log_dir/experiment/task/algo/seed-XXX-<timestamp>`.
pub fn run_dir<Tz>(config: &TrainConfig, time: &DateTime<Tz>) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    config
        .log_dir
        .join(&config.experiment)
        .join(TASK_NAME)
        .join(ALGO_NAME)
        .join(format!(
            "seed-{:03}-{}",
            config.seed,
            time.format("%Y-%m-%d-%H-%M-%S")
        ))
}

/// Summary of a completed training run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainSummary {
    pub epochs: usize,
    /// Environment steps over all slots.
    pub total_steps: usize,
    /// Number of ended training episodes.
    pub episodes: usize,
    /// Number of task switches of the regularizer.
    pub consolidations: usize,
    /// Number of tabular rows written.
    pub rows_logged: u64,
    /// Passes run in the last update.
    pub last_stop_iter: usize,
    /// KL divergence after the last update.
    pub last_kl: f64,
}

/// Proximal policy optimization with elastic weight consolidation on the cycling runner.
///
/// Each epoch collects a full buffer, optionally evaluates on the reference runners, updates
/// the policy and finally advances the regularizer's task clock, consolidating the actor
/// parameters when a task switch is due.
pub struct Trainer {
    config: TrainConfig,
    rng_env: Prng,
    rng_agent: Prng,
    env: VecEnv<StepLimit<VelocityRunner>>,
    evaluator: Option<Evaluator<StepLimit<VelocityRunner>>>,
    policy: ActorVCritic,
    buffer: VectorizedOnPolicyBuffer,
    updater: PpoUpdater,
    ewc: EwcRegularizer,
    collector: RolloutCollector,
    logger: EpochLogger,
    checkpointer: Checkpointer,
    summary: TrainSummary,
}

impl fmt::Debug for Trainer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Trainer")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .field("ewc", &self.ewc)
            .field("summary", &self.summary)
            .finish()
    }
}

impl Trainer {
    /// Validate the configuration and set up every component, writing into `run_dir`.
    pub fn new<P: AsRef<Path>>(config: TrainConfig, run_dir: P) -> Result<Self, TrainError> {
        config.validate()?;
        tch::manual_seed(config.seed as i64);
        let mut rng_env = Prng::seed_from_u64(config.seed);
        let mut rng_agent = Prng::seed_from_u64(rng_env.gen());

        let runner_config = VelocityRunnerConfig::with_kind(RunnerKind::Cycling);
        let envs = (0..config.num_envs)
            .map(|_| {
                StepLimit::new(
                    runner_config.build_env(&mut rng_env),
                    StepLimit::<VelocityRunner>::DEFAULT_MAX_STEPS,
                )
            })
            .collect();
        let mut env = VecEnv::new(envs, true);
        let evaluator = if config.use_eval {
            Some(Evaluator::reference(&mut rng_env))
        } else {
            None
        };

        let policy = ActorVCritic::new(
            env.observation_dim(),
            env.action_dim(),
            &config.hidden_sizes,
            config.device,
        );
        let local_steps_per_epoch = config.local_steps_per_epoch();
        let buffer = VectorizedOnPolicyBuffer::new(
            config.num_envs,
            local_steps_per_epoch,
            env.observation_dim(),
            env.action_dim(),
            config.gamma,
            config.lambda,
            config.device,
        );
        let updater = PpoUpdater::new(PpoConfig::from(&config), &policy)?;
        let ewc = EwcRegularizer::new(
            config.ewc_lambda,
            config.tasks.clone(),
            config.task_length,
        )?;
        let collector = RolloutCollector::new(&mut env, local_steps_per_epoch, &mut rng_agent);

        let checkpointer = Checkpointer::new(run_dir)?;
        checkpointer.save_config(&config)?;
        let mut logger = EpochLogger::new()
            .with_writer(CsvBackend::new(checkpointer.run_dir().join("progress.csv"))?)
            .with_writer(TensorBoardBackend::new(checkpointer.run_dir()));
        if config.write_terminal {
            logger = logger.with_writer(DisplayBackend);
        }
        log::info!(
            "training for {} epochs of {} steps in {:?}",
            config.epochs(),
            config.steps_per_epoch,
            checkpointer.run_dir()
        );

        Ok(Self {
            config,
            rng_env,
            rng_agent,
            env,
            evaluator,
            policy,
            buffer,
            updater,
            ewc,
            collector,
            logger,
            checkpointer,
            summary: TrainSummary::default(),
        })
    }

    pub const fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub const fn policy(&self) -> &ActorVCritic {
        &self.policy
    }

    pub const fn regularizer(&self) -> &EwcRegularizer {
        &self.ewc
    }

    pub const fn checkpointer(&self) -> &Checkpointer {
        &self.checkpointer
    }

    /// Run every epoch.
    pub fn run(&mut self) -> Result<TrainSummary, TrainError> {
        for epoch in 0..self.config.epochs() {
            self.run_epoch(epoch)?;
        }
        log::info!("finished training: {:?}", self.summary);
        Ok(self.summary)
    }

    /// Run one rollout, evaluation and update cycle.
    pub fn run_epoch(&mut self, epoch: usize) -> Result<UpdateStats, TrainError> {
        let rollout_start = coarsetime::Instant::now();
        let collected = self.collector.collect(
            &mut self.env,
            &self.policy,
            &mut self.buffer,
            &mut self.logger,
            &mut self.rng_agent,
        )?;
        if collected.episodes > 0 {
            self.logger.set_logged(false);
        }
        let rollout_time = rollout_start.elapsed().as_f64();

        let eval_start = coarsetime::Instant::now();
        if let Some(evaluator) = &mut self.evaluator {
            evaluator.evaluate(&self.policy, &mut self.logger, &mut self.rng_env)?;
        }
        let eval_time = eval_start.elapsed().as_f64();

        let update_start = coarsetime::Instant::now();
        let batch = self.buffer.get()?;
        let stats = self
            .updater
            .update(&self.policy, &self.ewc, &batch, &mut self.rng_agent)?;
        self.logger.store("Loss/Loss_reward_critic", stats.loss_reward_critic);
        self.logger.store("Loss/Loss_cost_critic", stats.loss_cost_critic);
        self.logger.store("Loss/Loss_actor", stats.loss_actor);
        self.logger.store("Loss/Loss_ewc", stats.loss_ewc);
        let update_time = update_start.elapsed().as_f64();

        if !self.logger.logged() {
            let times = EpochTimes {
                rollout: rollout_time,
                eval: eval_time,
                update: update_time,
                total: rollout_start.elapsed().as_f64(),
            };
            self.log_epoch(epoch, &stats, &batch, times)?;
            if (epoch + 1) % self.config.checkpoint_period == 0 || epoch == 0 {
                self.checkpointer.save_model(&self.policy, epoch)?;
                if let Some(normalizer) = self.env.normalizer() {
                    self.checkpointer.save_state(&normalizer.state(), epoch)?;
                }
            }
        }

        if self.ewc.end_epoch(self.config.steps_per_epoch as u64) {
            self.ewc.consolidate(&self.policy, &batch)?;
            self.summary.consolidations += 1;
        }

        self.summary.epochs += 1;
        self.summary.total_steps += collected.steps;
        self.summary.episodes += collected.episodes;
        self.summary.rows_logged = self.logger.num_rows();
        self.summary.last_stop_iter = stats.outcome.passes;
        self.summary.last_kl = stats.outcome.final_kl;
        Ok(stats)
    }

    fn log_epoch(
        &mut self,
        epoch: usize,
        stats: &UpdateStats,
        batch: &EpochBatch,
        times: EpochTimes,
    ) -> Result<(), TrainError> {
        let logger = &mut self.logger;
        logger.log_tabular("Metrics/EpRet", None)?;
        logger.log_tabular("Metrics/EpCost", None)?;
        logger.log_tabular("Metrics/EpLen", None)?;
        if let Some(evaluator) = &self.evaluator {
            for probe in evaluator.probes() {
                for suffix in ["Ret", "Cost", "Len"] {
                    logger.log_tabular(
                        &format!("Metrics/{}EvalEp{}", probe.name(), suffix),
                        None,
                    )?;
                }
            }
        }
        logger.log_tabular("Train/Epoch", Some((epoch + 1) as f64))?;
        logger.log_tabular(
            "Train/TotalSteps",
            Some(((epoch + 1) * self.config.steps_per_epoch) as f64),
        )?;
        logger.log_tabular("Train/StopIter", Some(stats.outcome.passes as f64))?;
        logger.log_tabular("Train/KL", Some(stats.outcome.final_kl))?;
        logger.log_tabular("Train/LR", Some(stats.learning_rate))?;
        logger.log_tabular("Loss/Loss_reward_critic", None)?;
        logger.log_tabular("Loss/Loss_cost_critic", None)?;
        logger.log_tabular("Loss/Loss_actor", None)?;
        logger.log_tabular("Loss/Loss_ewc", None)?;
        logger.log_tabular("EWC/TaskIndex", Some(self.ewc.current_task_index() as f64))?;
        logger.log_tabular("EWC/SwitchCounter", Some(self.ewc.switch_counter() as f64))?;
        logger.log_tabular("EWC/LiveRecords", Some(self.ewc.num_records() as f64))?;
        logger.log_tabular("Time/Rollout", Some(times.rollout))?;
        if self.evaluator.is_some() {
            logger.log_tabular("Time/Eval", Some(times.eval))?;
        }
        logger.log_tabular("Time/Update", Some(times.update))?;
        logger.log_tabular("Time/Total", Some(times.total))?;
        logger.log_tabular(
            "Value/RewardAdv",
            Some(batch.advantages_r.f_mean(Kind::Float)?.f_double_value(&[])?),
        )?;
        logger.log_tabular(
            "Value/CostAdv",
            Some(batch.advantages_c.f_mean(Kind::Float)?.f_double_value(&[])?),
        )?;
        logger.dump_tabular()?;
        Ok(())
    }
}

/// Wall-clock seconds spent in each phase of an epoch.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct EpochTimes {
    rollout: f64,
    eval: f64,
    update: f64,
    total: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn run_dir_layout() {
        let config = TrainConfig {
            seed: 7,
            log_dir: "runs".into(),
            experiment: "exp".into(),
            ..TrainConfig::default()
        };
        let time = Utc.with_ymd_and_hms(2024, 3, 5, 6, 7, 8).unwrap();
        assert_eq!(
            run_dir(&config, &time),
            PathBuf::from("runs/exp/VelocityRunnerCycling/ppo_ewc/seed-007-2024-03-05-06-07-08")
        );
    }

    fn tiny_config(use_eval: bool) -> TrainConfig {
        TrainConfig {
            num_envs: 2,
            steps_per_epoch: 40,
            total_steps: 120,
            hidden_sizes: vec![8],
            batch_size: 16,
            learning_iters: 2,
            tasks: vec![0, 1],
            task_length: 80,
            use_eval,
            write_terminal: false,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn consolidates_on_regularizer_clock() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = Trainer::new(tiny_config(false), dir.path()).unwrap();
        let summary = trainer.run().unwrap();
        assert_eq!(summary.epochs, 3);
        assert_eq!(summary.total_steps, 120);
        assert_eq!(summary.consolidations, 1);
        assert_eq!(trainer.regularizer().current_task(), 1);
        assert_eq!(trainer.regularizer().switch_counter(), 40);
        assert!(trainer.checkpointer().run_dir().join("config.json").is_file());
    }

    #[test]
    fn invalid_config_fails_before_training() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainConfig {
            tasks: vec![],
            ..tiny_config(false)
        };
        assert!(matches!(
            Trainer::new(config, dir.path()),
            Err(TrainError::Config(_))
        ));
        assert!(!dir.path().join("config.json").exists());
    }
}

//! Command-line options
use crate::config::{parse_device, parse_task_list, ConfigError, TrainConfig};
use clap::Parser;
use std::path::PathBuf;

/// Train a policy with proximal policy optimization and elastic weight consolidation.
///
/// Options given on the command line override the values of `--config`,
/// which in turn override the defaults.
#[derive(Parser, Debug, Default, Clone, PartialEq)]
#[clap(version, author, about)]
pub struct Options {
    #[clap(long)]
    /// JSON configuration file. Missing fields take their default values.
    pub config: Option<PathBuf>,

    // Simulation options
    #[clap(long, help_heading = "SIMULATION OPTIONS")]
    /// Random seed for the experiment
    pub seed: Option<u64>,

    #[clap(long, help_heading = "SIMULATION OPTIONS")]
    /// Device on which the policy runs (cpu or cuda)
    pub device: Option<String>,

    #[clap(long, default_value = "0", help_heading = "SIMULATION OPTIONS")]
    /// Index of the cuda device
    pub device_id: usize,

    #[clap(long, help_heading = "SIMULATION OPTIONS")]
    /// Number of parallel environments
    pub num_envs: Option<usize>,

    #[clap(long, help_heading = "SIMULATION OPTIONS")]
    /// Environment steps (over all environments) per epoch
    pub steps_per_epoch: Option<usize>,

    #[clap(long, help_heading = "SIMULATION OPTIONS")]
    /// Total environment steps
    pub total_steps: Option<usize>,

    #[clap(long, help_heading = "SIMULATION OPTIONS")]
    /// Evaluate on the reference environments every epoch
    pub use_eval: Option<bool>,

    // Policy options
    #[clap(long, help_heading = "POLICY OPTIONS")]
    /// Actor and critic MLP hidden layer sizes
    pub hidden_sizes: Option<Vec<usize>>,

    // Update options
    #[clap(long, help_heading = "UPDATE OPTIONS")]
    /// Discount factor
    pub gamma: Option<f64>,

    #[clap(long, help_heading = "UPDATE OPTIONS")]
    /// GAE lambda
    pub lambda: Option<f64>,

    #[clap(long, help_heading = "UPDATE OPTIONS")]
    /// KL divergence early stopping threshold
    pub target_kl: Option<f64>,

    #[clap(long, help_heading = "UPDATE OPTIONS")]
    /// Minibatch size
    pub batch_size: Option<usize>,

    #[clap(long, help_heading = "UPDATE OPTIONS")]
    /// Maximum number of passes over each epoch batch
    pub learning_iters: Option<usize>,

    #[clap(long, help_heading = "UPDATE OPTIONS")]
    /// Global gradient norm bound
    pub max_grad_norm: Option<f64>,

    #[clap(long, help_heading = "UPDATE OPTIONS")]
    /// Initial actor learning rate
    pub actor_learning_rate: Option<f64>,

    #[clap(long, help_heading = "UPDATE OPTIONS")]
    /// Critic learning rate
    pub critic_learning_rate: Option<f64>,

    #[clap(long, help_heading = "UPDATE OPTIONS")]
    /// Likelihood ratio clip range
    pub clip_ratio: Option<f64>,

    #[clap(long, help_heading = "UPDATE OPTIONS")]
    /// Add an L2 parameter penalty to the critic losses
    pub use_critic_norm: Option<bool>,

    #[clap(long, help_heading = "UPDATE OPTIONS")]
    /// Double the reward critic loss
    pub use_value_coefficient: Option<bool>,

    // Continual learning options
    #[clap(long, help_heading = "CONTINUAL LEARNING OPTIONS")]
    /// EWC penalty weight
    pub ewc_lambda: Option<f64>,

    #[clap(long, help_heading = "CONTINUAL LEARNING OPTIONS")]
    /// Task id list, e.g. "[0, 1, 2, 3, 4]"
    pub tasks: Option<String>,

    #[clap(long, help_heading = "CONTINUAL LEARNING OPTIONS")]
    /// Environment steps between task switches
    pub task_length: Option<u64>,

    // Output options
    #[clap(long, help_heading = "OUTPUT OPTIONS")]
    /// Root directory of the run outputs
    pub log_dir: Option<PathBuf>,

    #[clap(long, help_heading = "OUTPUT OPTIONS")]
    /// Experiment name
    pub experiment: Option<String>,

    #[clap(long, help_heading = "OUTPUT OPTIONS")]
    /// Log to the terminal instead of a file in the run directory
    pub write_terminal: Option<bool>,

    #[clap(long, help_heading = "OUTPUT OPTIONS")]
    /// Epochs between checkpoints
    pub checkpoint_period: Option<usize>,
}

macro_rules! override_fields {
    ($options:expr, $config:expr, [$($field:ident),* $(,)?]) => {
        $(
            if let Some(value) = &$options.$field {
                $config.$field = value.clone();
            }
        )*
    };
}

impl Options {
    /// Build the training configuration and check it for errors.
    pub fn resolve(&self) -> Result<TrainConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => TrainConfig::from_json_file(path)?,
            None => TrainConfig::default(),
        };
        override_fields!(
            self,
            config,
            [
                seed,
                num_envs,
                steps_per_epoch,
                total_steps,
                use_eval,
                hidden_sizes,
                gamma,
                lambda,
                target_kl,
                batch_size,
                learning_iters,
                max_grad_norm,
                actor_learning_rate,
                critic_learning_rate,
                clip_ratio,
                use_critic_norm,
                use_value_coefficient,
                ewc_lambda,
                task_length,
                log_dir,
                experiment,
                write_terminal,
                checkpoint_period,
            ]
        );
        if let Some(device) = &self.device {
            config.device = parse_device(device, self.device_id)?;
        }
        if let Some(tasks) = &self.tasks {
            config.tasks = parse_task_list(tasks)?;
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tch::Device;

    #[test]
    fn defaults_without_arguments() {
        let options = Options::try_parse_from(["ppo-ewc"]).unwrap();
        assert_eq!(options.resolve().unwrap(), TrainConfig::default());
    }

    #[test]
    fn arguments_override_defaults() {
        let options = Options::try_parse_from([
            "ppo-ewc",
            "--seed",
            "3",
            "--tasks",
            "[1, 0]",
            "--task-length",
            "500",
            "--use-eval",
            "false",
            "--device",
            "cpu",
        ])
        .unwrap();
        let config = options.resolve().unwrap();
        assert_eq!(config.seed, 3);
        assert_eq!(config.tasks, vec![1, 0]);
        assert_eq!(config.task_length, 500);
        assert!(!config.use_eval);
        assert_eq!(config.device, Device::Cpu);
    }

    #[test]
    fn arguments_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"seed": 5, "ewc_lambda": 10.0}"#).unwrap();
        let options = Options {
            config: Some(path),
            seed: Some(6),
            ..Options::default()
        };
        let config = options.resolve().unwrap();
        assert_eq!(config.seed, 6);
        assert_eq!(config.ewc_lambda, 10.0);
        assert_eq!(config.num_envs, TrainConfig::default().num_envs);
    }

    #[test]
    fn rejects_malformed_task_list() {
        let options = Options {
            tasks: Some("[0, x]".into()),
            ..Options::default()
        };
        assert!(matches!(
            options.resolve(),
            Err(ConfigError::MalformedTaskList(_))
        ));
    }

    #[test]
    fn rejects_unknown_device() {
        let options = Options {
            device: Some("tpu".into()),
            ..Options::default()
        };
        assert!(matches!(
            options.resolve(),
            Err(ConfigError::UnknownDevice(_))
        ));
    }
}

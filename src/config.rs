//! Training configuration
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tch::Device;
use thiserror::Error;

/// Resolved hyperparameters of a training run.
///
/// Constructed once at startup and passed by reference to every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Seed for the crate [`Prng`](crate::Prng) and the torch generator.
    pub seed: u64,
    /// Device on which the policy tensors are placed.
    #[serde(with = "DeviceDef")]
    pub device: Device,
    /// Number of parallel environment slots.
    pub num_envs: usize,
    /// Total environment steps (over all slots) collected per epoch.
    pub steps_per_epoch: usize,
    /// Total environment steps over the whole run.
    pub total_steps: usize,
    /// Hidden layer sizes of the actor and both critics.
    pub hidden_sizes: Vec<usize>,
    /// Discount factor.
    pub gamma: f64,
    /// Generalized advantage estimation shaping parameter.
    pub lambda: f64,
    /// Stop the update passes once the mean KL divergence from the pre-update policy exceeds this.
    pub target_kl: f64,
    /// Minibatch size.
    pub batch_size: usize,
    /// Maximum number of passes over the epoch batch per update.
    pub learning_iters: usize,
    /// Global gradient norm bound over the actor and both critics.
    pub max_grad_norm: f64,
    /// Initial actor learning rate. Decays linearly to zero over the run.
    pub actor_learning_rate: f64,
    /// Learning rate of both critics.
    pub critic_learning_rate: f64,
    /// Clip the likelihood ratio to `1 ± clip_ratio`.
    pub clip_ratio: f64,
    /// Add an L2 parameter penalty to each critic loss.
    pub use_critic_norm: bool,
    /// Coefficient of the critic L2 parameter penalty.
    pub critic_norm_coef: f64,
    /// Weight the reward critic loss by 2 in the combined loss.
    pub use_value_coefficient: bool,
    /// Weight λ of the elastic weight consolidation penalty.
    pub ewc_lambda: f64,
    /// Continual-learning task ids, visited in order and then cyclically.
    pub tasks: Vec<usize>,
    /// Environment steps between continual-learning task switches.
    pub task_length: u64,
    /// Run the reference-environment evaluation every epoch.
    pub use_eval: bool,
    /// Root directory for run outputs.
    pub log_dir: PathBuf,
    /// Experiment name; a path component of the run directory.
    pub experiment: String,
    /// Write the progress log to the terminal instead of a file in the run directory.
    pub write_terminal: bool,
    /// Save a checkpoint every this many epochs (and after the first).
    pub checkpoint_period: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            device: Device::Cpu,
            num_envs: 10,
            steps_per_epoch: 20_000,
            total_steps: 10_000_000,
            hidden_sizes: vec![64, 64],
            gamma: 0.99,
            lambda: 0.95,
            target_kl: 0.02,
            batch_size: 64,
            learning_iters: 40,
            max_grad_norm: 40.0,
            actor_learning_rate: 3e-4,
            critic_learning_rate: 3e-4,
            clip_ratio: 0.2,
            use_critic_norm: true,
            critic_norm_coef: 0.001,
            use_value_coefficient: false,
            ewc_lambda: 1.0,
            tasks: vec![0, 1, 2, 3, 4],
            task_length: 1_000_000,
            use_eval: true,
            log_dir: PathBuf::from("runs"),
            experiment: "ppo_ewc".into(),
            write_terminal: true,
            checkpoint_period: 100,
        }
    }
}

impl TrainConfig {
    /// Load a configuration from a JSON file. Missing fields take their default values.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Number of steps collected by each environment slot per epoch.
    #[must_use]
    pub const fn local_steps_per_epoch(&self) -> usize {
        self.steps_per_epoch / self.num_envs
    }

    /// Number of epochs in the run.
    #[must_use]
    pub const fn epochs(&self) -> usize {
        self.total_steps / self.steps_per_epoch
    }

    /// Check the configuration for errors that would otherwise surface mid-run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_envs == 0 {
            return Err(ConfigError::Zero("num_envs"));
        }
        if self.steps_per_epoch < self.num_envs {
            return Err(ConfigError::StepsPerEpoch {
                steps_per_epoch: self.steps_per_epoch,
                num_envs: self.num_envs,
            });
        }
        if self.steps_per_epoch % self.num_envs != 0 {
            return Err(ConfigError::Indivisible {
                steps_per_epoch: self.steps_per_epoch,
                num_envs: self.num_envs,
            });
        }
        if self.epochs() == 0 {
            return Err(ConfigError::Zero("total_steps / steps_per_epoch"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Zero("batch_size"));
        }
        if self.learning_iters == 0 {
            return Err(ConfigError::Zero("learning_iters"));
        }
        if self.task_length == 0 {
            return Err(ConfigError::Zero("task_length"));
        }
        if self.checkpoint_period == 0 {
            return Err(ConfigError::Zero("checkpoint_period"));
        }
        if self.hidden_sizes.iter().any(|&size| size == 0) {
            return Err(ConfigError::Zero("hidden_sizes"));
        }
        validate_tasks(&self.tasks)?;
        for (name, value) in [
            ("gamma", self.gamma),
            ("lambda", self.lambda),
            ("target_kl", self.target_kl),
            ("max_grad_norm", self.max_grad_norm),
            ("actor_learning_rate", self.actor_learning_rate),
            ("critic_learning_rate", self.critic_learning_rate),
            ("clip_ratio", self.clip_ratio),
            ("critic_norm_coef", self.critic_norm_coef),
            ("ewc_lambda", self.ewc_lambda),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::InvalidValue { name, value });
            }
        }
        if self.gamma > 1.0 || self.lambda > 1.0 {
            return Err(ConfigError::InvalidValue {
                name: "gamma / lambda",
                value: self.gamma.max(self.lambda),
            });
        }
        if let Device::Cuda(index) = self.device {
            if !tch::Cuda::is_available() || index >= tch::Cuda::device_count() as usize {
                return Err(ConfigError::DeviceUnavailable(self.device));
            }
        }
        Ok(())
    }
}

/// Check that a continual-learning task list is usable.
///
/// Each task id indexes one Fisher / anchor slot and there is one slot per list entry,
/// so every id must be less than the list length.
pub fn validate_tasks(tasks: &[usize]) -> Result<(), ConfigError> {
    if tasks.is_empty() {
        return Err(ConfigError::EmptyTaskList);
    }
    if let Some(&id) = tasks.iter().find(|&&id| id >= tasks.len()) {
        return Err(ConfigError::TaskIdOutOfRange {
            id,
            num_tasks: tasks.len(),
        });
    }
    Ok(())
}

/// Parse a task list literal such as `"[0, 1, 2]"` or `"0,1,2"`.
pub fn parse_task_list(s: &str) -> Result<Vec<usize>, ConfigError> {
    let trimmed = s.trim();
    let inner = match (trimmed.strip_prefix('['), trimmed.strip_suffix(']')) {
        (Some(_), Some(_)) => &trimmed[1..trimmed.len() - 1],
        (None, None) => trimmed,
        _ => return Err(ConfigError::MalformedTaskList(s.into())),
    };
    let tasks = inner
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<usize>()
                .map_err(|_| ConfigError::MalformedTaskList(s.into()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    validate_tasks(&tasks)?;
    Ok(tasks)
}

/// Resolve a device name (`cpu` or `cuda`) and index into a [`Device`].
pub fn parse_device(name: &str, index: usize) -> Result<Device, ConfigError> {
    match name.to_ascii_lowercase().as_str() {
        "cpu" => Ok(Device::Cpu),
        "cuda" | "gpu" => Ok(Device::Cuda(index)),
        _ => Err(ConfigError::UnknownDevice(name.into())),
    }
}

/// Configuration error. Always raised before training starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be positive")]
    Zero(&'static str),
    #[error("steps_per_epoch ({steps_per_epoch}) must be at least num_envs ({num_envs})")]
    StepsPerEpoch {
        steps_per_epoch: usize,
        num_envs: usize,
    },
    #[error("steps_per_epoch ({steps_per_epoch}) is not divisible by num_envs ({num_envs})")]
    Indivisible {
        steps_per_epoch: usize,
        num_envs: usize,
    },
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: f64 },
    #[error("the task list is empty")]
    EmptyTaskList,
    #[error("malformed task list {0:?}")]
    MalformedTaskList(String),
    #[error("task id {id} is out of range for {num_tasks} tasks")]
    TaskIdOutOfRange { id: usize, num_tasks: usize },
    #[error("unknown device {0:?}")]
    UnknownDevice(String),
    #[error("device {0:?} is not available")]
    DeviceUnavailable(Device),
    #[error("failed to read {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse configuration")]
    Parse(#[from] serde_json::Error),
}

/// Serde remote definition for [`Device`].
#[derive(Serialize, Deserialize)]
#[serde(remote = "Device")]
pub enum DeviceDef {
    Cpu,
    Cuda(usize),
}

//! Run directory persistence
use crate::config::TrainConfig;
use crate::envs::NormalizerState;
use crate::torch::ActorVCritic;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tch::TchError;
use thiserror::Error;

/// Saves the configuration and periodic model snapshots into a run directory.
///
/// Layout:
/// * `config.json` - resolved training configuration
/// * `torch_save/model{N}.pt` - actor variables after epoch `N`
/// * `torch_save/state{N}.json` - observation normalizer state after epoch `N`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpointer {
    run_dir: PathBuf,
    save_dir: PathBuf,
}

impl Checkpointer {
    /// Create the run directory (and its `torch_save` subdirectory) if needed.
    pub fn new<P: AsRef<Path>>(run_dir: P) -> Result<Self, CheckpointError> {
        let run_dir = run_dir.as_ref().to_path_buf();
        let save_dir = run_dir.join("torch_save");
        fs::create_dir_all(&save_dir).map_err(|source| CheckpointError::Io {
            path: save_dir.clone(),
            source,
        })?;
        Ok(Self { run_dir, save_dir })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn model_path(&self, itr: usize) -> PathBuf {
        self.save_dir.join(format!("model{}.pt", itr))
    }

    pub fn state_path(&self, itr: usize) -> PathBuf {
        self.save_dir.join(format!("state{}.json", itr))
    }

    pub fn save_config(&self, config: &TrainConfig) -> Result<PathBuf, CheckpointError> {
        let path = self.run_dir.join("config.json");
        write_json(&path, config)?;
        Ok(path)
    }

    pub fn save_model(&self, policy: &ActorVCritic, itr: usize) -> Result<PathBuf, CheckpointError> {
        let path = self.model_path(itr);
        policy.save_actor(&path)?;
        log::debug!("saved model to {:?}", path);
        Ok(path)
    }

    pub fn save_state(
        &self,
        normalizer: &NormalizerState,
        itr: usize,
    ) -> Result<PathBuf, CheckpointError> {
        let path = self.state_path(itr);
        write_json(&path, normalizer)?;
        Ok(path)
    }
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CheckpointError> {
    let io_error = |source: io::Error| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = BufWriter::new(File::create(path).map_err(io_error)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush().map_err(io_error)
}

/// Error saving a checkpoint.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("io error at {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("serialization error")]
    Json(#[from] serde_json::Error),
    #[error("failed to save model")]
    Torch(#[from] TchError),
}

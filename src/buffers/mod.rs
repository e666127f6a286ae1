//! Rollout buffers
mod on_policy;

pub use on_policy::VectorizedOnPolicyBuffer;

use tch::Tensor;
use thiserror::Error;

/// One environment step of one slot, as seen by the learner.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Observation the action was selected from.
    pub observation: Vec<f32>,
    pub action: Vec<f32>,
    pub reward: f64,
    pub cost: f64,
    /// Reward critic estimate of the observation value.
    pub value_r: f64,
    /// Cost critic estimate of the observation value.
    pub value_c: f64,
    /// Log probability of the action under the behaviour policy.
    pub log_prob: f64,
}

/// All data collected in an epoch, drained from a [`RolloutBuffer`].
///
/// Every tensor has first dimension equal to the total number of transitions.
#[derive(Debug)]
pub struct EpochBatch {
    /// `[N, observation_dim]`
    pub observations: Tensor,
    /// `[N, action_dim]`
    pub actions: Tensor,
    /// `[N]` behaviour policy log probabilities.
    pub log_probs: Tensor,
    /// `[N]` discounted reward returns.
    pub target_values_r: Tensor,
    /// `[N]` discounted cost returns.
    pub target_values_c: Tensor,
    /// `[N]` standardized reward advantages.
    pub advantages_r: Tensor,
    /// `[N]` centred cost advantages.
    pub advantages_c: Tensor,
}

impl EpochBatch {
    /// Number of transitions in the batch.
    pub fn len(&self) -> usize {
        self.log_probs.size()[0] as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-epoch transition store for on-policy learning.
///
/// Transitions are stored separately for each environment slot. Each path (the transitions of a
/// slot since its last boundary) is closed by [`finish_path`](RolloutBuffer::finish_path) with
/// bootstrap values. Draining with [`get`](RolloutBuffer::get) yields the whole epoch and clears
/// the storage.
pub trait RolloutBuffer {
    /// Store a transition for an environment slot.
    fn store(&mut self, slot: usize, transition: Transition) -> Result<(), BufferError>;

    /// Close the current path of a slot.
    ///
    /// `last_value_r` and `last_value_c` are the bootstrap values of the state following the
    /// final transition of the path.
    fn finish_path(
        &mut self,
        last_value_r: f64,
        last_value_c: f64,
        slot: usize,
    ) -> Result<(), BufferError>;

    /// Drain the epoch of data and reset the buffer.
    fn get(&mut self) -> Result<EpochBatch, BufferError>;
}

/// Error from a rollout buffer operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("slot {slot} out of range for {num_slots} slots")]
    SlotOutOfRange { slot: usize, num_slots: usize },
    #[error("slot {0} is full")]
    SlotFull(usize),
    #[error("transition has {actual} {what} elements, expected {expected}")]
    Dimension {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("slot {slot} holds {len} of {size} transitions")]
    NotFull { slot: usize, len: usize, size: usize },
    #[error("slot {0} has an unfinished path")]
    UnfinishedPath(usize),
}

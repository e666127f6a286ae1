use super::{BufferError, EpochBatch, RolloutBuffer, Transition};
use tch::{Device, Kind, Tensor};

/// Storage for one environment slot.
#[derive(Debug, Clone, Default)]
struct SlotStorage {
    observations: Vec<f32>,
    actions: Vec<f32>,
    rewards: Vec<f64>,
    costs: Vec<f64>,
    values_r: Vec<f64>,
    values_c: Vec<f64>,
    log_probs: Vec<f64>,
    advantages_r: Vec<f64>,
    advantages_c: Vec<f64>,
    targets_r: Vec<f64>,
    targets_c: Vec<f64>,
    /// Index of the first transition of the current path.
    path_start: usize,
}

impl SlotStorage {
    fn len(&self) -> usize {
        self.rewards.len()
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// On-policy rollout buffer over a fixed number of environment slots.
///
/// Each slot holds exactly `size` transitions per epoch.
/// Advantages are computed with generalized advantage estimation ([Schulman et al.][gae])
/// separately for rewards and costs; critic targets are the discounted returns.
/// When drained, reward advantages are standardized and cost advantages are centred.
///
/// [gae]: https://arxiv.org/abs/1506.02438
#[derive(Debug, Clone)]
pub struct VectorizedOnPolicyBuffer {
    slots: Vec<SlotStorage>,
    size: usize,
    observation_dim: usize,
    action_dim: usize,
    gamma: f64,
    lambda: f64,
    device: Device,
}

impl VectorizedOnPolicyBuffer {
    pub fn new(
        num_slots: usize,
        size: usize,
        observation_dim: usize,
        action_dim: usize,
        gamma: f64,
        lambda: f64,
        device: Device,
    ) -> Self {
        Self {
            slots: vec![SlotStorage::default(); num_slots],
            size,
            observation_dim,
            action_dim,
            gamma,
            lambda,
            device,
        }
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    /// Number of transitions stored in a slot.
    pub fn slot_len(&self, slot: usize) -> usize {
        self.slots.get(slot).map_or(0, SlotStorage::len)
    }

    fn slot_mut(&mut self, slot: usize) -> Result<&mut SlotStorage, BufferError> {
        let num_slots = self.slots.len();
        self.slots
            .get_mut(slot)
            .ok_or(BufferError::SlotOutOfRange { slot, num_slots })
    }

    fn tensor(&self, data: &[f64]) -> Tensor {
        Tensor::of_slice(data)
            .to_kind(Kind::Float)
            .to_device(self.device)
    }
}

impl RolloutBuffer for VectorizedOnPolicyBuffer {
    fn store(&mut self, slot: usize, transition: Transition) -> Result<(), BufferError> {
        let (size, observation_dim, action_dim) = (self.size, self.observation_dim, self.action_dim);
        if transition.observation.len() != observation_dim {
            return Err(BufferError::Dimension {
                what: "observation",
                expected: observation_dim,
                actual: transition.observation.len(),
            });
        }
        if transition.action.len() != action_dim {
            return Err(BufferError::Dimension {
                what: "action",
                expected: action_dim,
                actual: transition.action.len(),
            });
        }
        let storage = self.slot_mut(slot)?;
        if storage.len() >= size {
            return Err(BufferError::SlotFull(slot));
        }
        storage.observations.extend(transition.observation);
        storage.actions.extend(transition.action);
        storage.rewards.push(transition.reward);
        storage.costs.push(transition.cost);
        storage.values_r.push(transition.value_r);
        storage.values_c.push(transition.value_c);
        storage.log_probs.push(transition.log_prob);
        Ok(())
    }

    fn finish_path(
        &mut self,
        last_value_r: f64,
        last_value_c: f64,
        slot: usize,
    ) -> Result<(), BufferError> {
        let (gamma, lambda) = (self.gamma, self.lambda);
        let storage = self.slot_mut(slot)?;
        let path = storage.path_start..storage.len();
        if path.is_empty() {
            return Ok(());
        }

        let (advantages, targets) = gae(
            &storage.rewards[path.clone()],
            &storage.values_r[path.clone()],
            last_value_r,
            gamma,
            lambda,
        );
        storage.advantages_r.extend(advantages);
        storage.targets_r.extend(targets);

        let (advantages, targets) = gae(
            &storage.costs[path.clone()],
            &storage.values_c[path.clone()],
            last_value_c,
            gamma,
            lambda,
        );
        storage.advantages_c.extend(advantages);
        storage.targets_c.extend(targets);

        storage.path_start = path.end;
        Ok(())
    }

    fn get(&mut self) -> Result<EpochBatch, BufferError> {
        for (slot, storage) in self.slots.iter().enumerate() {
            if storage.len() != self.size {
                return Err(BufferError::NotFull {
                    slot,
                    len: storage.len(),
                    size: self.size,
                });
            }
            if storage.path_start != storage.len() {
                return Err(BufferError::UnfinishedPath(slot));
            }
        }

        let mut advantages_r = concat(&self.slots, |s| s.advantages_r.as_slice());
        let mut advantages_c = concat(&self.slots, |s| s.advantages_c.as_slice());
        standardize(&mut advantages_r);
        centre(&mut advantages_c);

        let n = (self.slots.len() * self.size) as i64;
        let observations: Vec<f32> = self
            .slots
            .iter()
            .flat_map(|s| s.observations.iter().copied())
            .collect();
        let actions: Vec<f32> = self
            .slots
            .iter()
            .flat_map(|s| s.actions.iter().copied())
            .collect();

        let batch = EpochBatch {
            observations: Tensor::of_slice(&observations)
                .reshape(&[n, self.observation_dim as i64])
                .to_device(self.device),
            actions: Tensor::of_slice(&actions)
                .reshape(&[n, self.action_dim as i64])
                .to_device(self.device),
            log_probs: self.tensor(&concat(&self.slots, |s| s.log_probs.as_slice())),
            target_values_r: self.tensor(&concat(&self.slots, |s| s.targets_r.as_slice())),
            target_values_c: self.tensor(&concat(&self.slots, |s| s.targets_c.as_slice())),
            advantages_r: self.tensor(&advantages_r),
            advantages_c: self.tensor(&advantages_c),
        };

        for storage in &mut self.slots {
            storage.clear();
        }
        Ok(batch)
    }
}

/// Concatenate a per-slot sequence over all slots.
fn concat<F>(slots: &[SlotStorage], f: F) -> Vec<f64>
where
    F: Fn(&SlotStorage) -> &[f64],
{
    slots.iter().flat_map(|s| f(s).iter().copied()).collect()
}

/// Generalized advantage estimates and discounted returns of a path.
///
/// The bootstrap value `last_value` stands in for the value of the state after the path.
fn gae(
    rewards: &[f64],
    values: &[f64],
    last_value: f64,
    gamma: f64,
    lambda: f64,
) -> (Vec<f64>, Vec<f64>) {
    let n = rewards.len();
    let mut advantages = vec![0.0; n];
    let mut returns = vec![0.0; n];
    let mut next_value = last_value;
    let mut advantage = 0.0;
    let mut ret = last_value;
    for t in (0..n).rev() {
        let delta = rewards[t] + gamma * next_value - values[t];
        advantage = delta + gamma * lambda * advantage;
        ret = rewards[t] + gamma * ret;
        advantages[t] = advantage;
        returns[t] = ret;
        next_value = values[t];
    }
    (advantages, returns)
}

/// Shift to mean 0 and scale to (sample) standard deviation 1.
fn standardize(values: &mut [f64]) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0).max(1.0);
    let scale = var.sqrt() + 1e-8;
    for v in values {
        *v = (*v - mean) / scale;
    }
}

/// Shift to mean 0.
fn centre(values: &mut [f64]) {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    for v in values {
        *v -= mean;
    }
}

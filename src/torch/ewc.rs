//! Elastic weight consolidation
use super::params::ParamSet;
use super::policy::ActorVCritic;
use super::utils::{f_all_finite, f_zero_grads};
use super::updaters::UpdateError;
use crate::buffers::EpochBatch;
use crate::config::{validate_tasks, ConfigError};
use tch::{Kind, Tensor};

/// How a task's Fisher record is refreshed when the task comes around again.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FisherRefresh {
    /// Replace the previous record and anchor with a fresh estimate from the latest batch.
    #[default]
    OverwriteOnRevisit,
}

/// Counts environment steps since the last consolidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchClock {
    steps_per_task: u64,
    counter: u64,
}

impl SwitchClock {
    pub const fn new(steps_per_task: u64) -> Self {
        Self {
            steps_per_task,
            counter: 0,
        }
    }

    /// Add steps to the counter. Returns whether a task switch is due.
    pub fn advance(&mut self, steps: u64) -> bool {
        self.counter += steps;
        self.counter >= self.steps_per_task
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }

    pub const fn counter(&self) -> u64 {
        self.counter
    }
}

/// Diagonal Fisher estimate together with the parameters it was estimated at.
#[derive(Debug)]
struct TaskRecord {
    fisher: ParamSet,
    anchor: ParamSet,
}

/// Elastic weight consolidation regularizer over a fixed circular list of task ids.
///
/// At every task switch the diagonal Fisher information of the actor is estimated from the most
/// recent epoch batch and stored, together with a copy of the actor parameters, in the slot of
/// the active task id. The penalty pulls the parameters towards each recorded anchor weighted by
/// the recorded importance.
#[derive(Debug)]
pub struct EwcRegularizer {
    lambda: f64,
    tasks: Vec<usize>,
    /// Indexed by task id.
    records: Vec<Option<TaskRecord>>,
    current_task_index: usize,
    clock: SwitchClock,
    refresh: FisherRefresh,
}

impl EwcRegularizer {
    /// Create a new regularizer.
    ///
    /// `tasks` must be non-empty and every id must be less than `tasks.len()`.
    pub fn new(
        lambda: f64,
        tasks: Vec<usize>,
        steps_per_task: u64,
    ) -> Result<Self, ConfigError> {
        validate_tasks(&tasks)?;
        let num_slots = tasks.len();
        Ok(Self {
            lambda,
            tasks,
            records: (0..num_slots).map(|_| None).collect(),
            current_task_index: 0,
            clock: SwitchClock::new(steps_per_task),
            refresh: FisherRefresh::default(),
        })
    }

    pub const fn lambda(&self) -> f64 {
        self.lambda
    }

    pub const fn refresh_policy(&self) -> FisherRefresh {
        self.refresh
    }

    /// Position of the active task in the task list.
    pub const fn current_task_index(&self) -> usize {
        self.current_task_index
    }

    /// Id of the active task.
    pub fn current_task(&self) -> usize {
        self.tasks[self.current_task_index]
    }

    pub const fn switch_counter(&self) -> u64 {
        self.clock.counter()
    }

    /// Number of task ids with a live record.
    pub fn num_records(&self) -> usize {
        self.records.iter().filter(|r| r.is_some()).count()
    }

    pub fn has_record(&self, task: usize) -> bool {
        matches!(self.records.get(task), Some(Some(_)))
    }

    /// Unscaled penalty `sum_tasks sum_params F * (theta - theta*)^2`.
    ///
    /// Differentiable with respect to `params`, which must be aligned with the actor parameters
    /// the records were taken from. Exactly zero when no record exists.
    pub fn penalty(&self, params: &ParamSet) -> Tensor {
        let device = params
            .tensors()
            .next()
            .map_or(tch::Device::Cpu, Tensor::device);
        let mut total = Tensor::zeros(&[], (Kind::Float, device));
        for record in self.records.iter().flatten() {
            debug_assert!(record.fisher.is_aligned_with(params));
            for ((param, fisher), anchor) in params
                .tensors()
                .zip(record.fisher.tensors())
                .zip(record.anchor.tensors())
            {
                total = total + (fisher * (param - anchor).square()).sum(Kind::Float);
            }
        }
        total
    }

    /// Account for an epoch of environment steps. Returns whether a task switch is due.
    pub fn end_epoch(&mut self, steps: u64) -> bool {
        self.clock.advance(steps)
    }

    /// Record the Fisher information and anchor of the active task from `batch`,
    /// then advance to the next task and reset the switch clock.
    pub fn consolidate(
        &mut self,
        policy: &ActorVCritic,
        batch: &EpochBatch,
    ) -> Result<(), UpdateError> {
        let params = policy.actor_params();
        let fisher = estimate_fisher(policy, &params, batch)?;
        let anchor = params.snapshot();

        let task = self.current_task();
        match self.refresh {
            FisherRefresh::OverwriteOnRevisit => {
                self.records[task] = Some(TaskRecord { fisher, anchor });
            }
        }
        log::info!(
            "consolidated task {} from {} samples; next task {}",
            task,
            batch.len(),
            self.tasks[(self.current_task_index + 1) % self.tasks.len()]
        );
        self.current_task_index = (self.current_task_index + 1) % self.tasks.len();
        self.clock.reset();
        Ok(())
    }
}

/// Empirical diagonal Fisher information of the actor.
///
/// The mean over the batch of the squared gradient of each action log probability.
/// Gradients of `params` are left zeroed.
pub fn estimate_fisher(
    policy: &ActorVCritic,
    params: &ParamSet,
    batch: &EpochBatch,
) -> Result<ParamSet, UpdateError> {
    let num_samples = batch.len();
    if num_samples == 0 {
        return Err(UpdateError::EmptyBatch);
    }
    let fisher = params.zeros_like();
    for i in 0..num_samples as i64 {
        f_zero_grads(params.tensors())?;
        let observation = batch.observations.f_get(i)?;
        let action = batch.actions.f_get(i)?;
        let log_prob = policy.actor(&observation).log_prob(&action);
        log_prob.backward();

        let _no_grad = tch::no_grad_guard();
        for (accumulator, param) in fisher.tensors().zip(params.tensors()) {
            let grad = param.f_grad()?;
            if grad.defined() {
                let _ = accumulator.shallow_clone().f_add_(&grad.f_square()?)?;
            }
        }
    }
    f_zero_grads(params.tensors())?;

    let _no_grad = tch::no_grad_guard();
    for t in fisher.tensors() {
        let _ = t.shallow_clone().f_div_scalar_(num_samples as f64)?;
        if !f_all_finite(t)? {
            return Err(UpdateError::NonFinite("fisher information"));
        }
    }
    Ok(fisher)
}

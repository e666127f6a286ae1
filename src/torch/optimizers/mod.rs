//! Optimizers
mod coptimizer;
mod schedule;

pub use coptimizer::AdamConfig;
pub use schedule::LinearLr;

use std::error::Error;
use tch::{nn::VarStore, TchError};
use thiserror::Error;

/// Base optimizer interface
pub trait BaseOptimizer {
    /// Zero out the gradients of all optimized tensors
    fn zero_grad(&mut self) -> Result<(), OptimizerStepError>;
}

/// Optimizer that takes a step from gradients that are already stored on its parameters.
///
/// The actor and both critics are trained from one combined loss: the caller zeroes every
/// optimizer, backpropagates once and then steps each optimizer in turn.
pub trait OnceOptimizer: BaseOptimizer {
    /// Update the parameters using their stored gradients.
    fn step_once(&self) -> Result<(), OptimizerStepError>;
}

/// Optimizer with an adjustable learning rate.
pub trait SetLearningRate {
    fn set_learning_rate(&mut self, learning_rate: f64) -> Result<(), OptimizerStepError>;
}

/// Error performing an optimization step.
#[derive(Debug, Error)]
pub enum OptimizerStepError {
    #[error("torch error")]
    Torch(#[from] TchError),
}

/// Build an optimizer over the trainable variables of a variable store.
pub trait BuildOptimizer {
    type Optimizer;
    type Error: Error;

    fn build_optimizer(&self, vs: &VarStore) -> Result<Self::Optimizer, Self::Error>;
}

/// Zero the gradients of every optimizer, backpropagate `loss` once and step each optimizer.
#[cfg(test)]
fn shared_backward_step<O: OnceOptimizer>(
    optimizers: &mut [O],
    loss: &tch::Tensor,
) -> Result<(), OptimizerStepError> {
    for optimizer in optimizers.iter_mut() {
        optimizer.zero_grad()?;
    }
    loss.backward();
    optimizers.iter().try_for_each(OnceOptimizer::step_once)
}

#[cfg(test)]
mod testing {
    use super::*;
    use tch::{Device, Kind, Tensor};

    /// Fit a value and a scale held in separate variable stores to targets with one shared loss.
    pub fn check_fits_shared_loss<OC>(optimizer_config: &OC, num_steps: u64)
    where
        OC: BuildOptimizer,
        OC::Optimizer: OnceOptimizer,
    {
        let value_vs = VarStore::new(Device::Cpu);
        let scale_vs = VarStore::new(Device::Cpu);
        let value = value_vs.root().f_zeros("value", &[3]).unwrap();
        let scale = scale_vs.root().f_ones("scale", &[1]).unwrap();
        let mut optimizers = vec![
            optimizer_config.build_optimizer(&value_vs).unwrap(),
            optimizer_config.build_optimizer(&scale_vs).unwrap(),
        ];

        let value_target = Tensor::of_slice(&[1.0_f32, -2.0, 0.5]);
        let scale_target = Tensor::of_slice(&[3.0_f32]);
        for _ in 0..num_steps {
            let loss = (&value - &value_target).square().sum(Kind::Float)
                + (&scale - &scale_target).square().sum(Kind::Float);
            shared_backward_step(&mut optimizers, &loss).unwrap();
        }

        assert!(f64::from((&value - &value_target).norm()) < 1e-2, "{:?}", value);
        assert!(f64::from((&scale - &scale_target).norm()) < 1e-2, "{:?}", scale);
    }
}

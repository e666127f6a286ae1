//! Adam through the libtorch C++ optimizer
use super::{BaseOptimizer, BuildOptimizer, OnceOptimizer, OptimizerStepError, SetLearningRate};
use tch::{nn::VarStore, COptimizer, TchError};

impl BaseOptimizer for COptimizer {
    fn zero_grad(&mut self) -> Result<(), OptimizerStepError> {
        COptimizer::zero_grad(self)?;
        Ok(())
    }
}

impl OnceOptimizer for COptimizer {
    fn step_once(&self) -> Result<(), OptimizerStepError> {
        COptimizer::step(self)?;
        Ok(())
    }
}

impl SetLearningRate for COptimizer {
    fn set_learning_rate(&mut self, learning_rate: f64) -> Result<(), OptimizerStepError> {
        COptimizer::set_learning_rate(self, learning_rate)?;
        Ok(())
    }
}

/// Adam with the torch default moment coefficients and no weight decay.
///
/// The actor and each critic get their own instance so that the actor learning rate can be
/// scheduled independently of the critics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdamConfig {
    pub learning_rate: f64,
    pub betas: (f64, f64),
    pub weight_decay: f64,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self::with_learning_rate(3e-4)
    }
}

impl AdamConfig {
    pub const fn with_learning_rate(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            betas: (0.9, 0.999),
            weight_decay: 0.0,
        }
    }
}

impl BuildOptimizer for AdamConfig {
    type Optimizer = COptimizer;
    type Error = TchError;

    fn build_optimizer(&self, vs: &VarStore) -> Result<COptimizer, TchError> {
        let (beta1, beta2) = self.betas;
        let mut optimizer = COptimizer::adam(self.learning_rate, beta1, beta2, self.weight_decay)?;
        for var in vs.trainable_variables() {
            optimizer.add_parameters(&var, 0)?;
        }
        Ok(optimizer)
    }
}

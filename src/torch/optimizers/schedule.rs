//! Learning rate schedules
use super::{OptimizerStepError, SetLearningRate};

/// Linearly decays a learning rate from its initial value to zero.
///
/// After `k` calls to [`step`](LinearLr::step) the learning rate is
/// `initial * (1 - min(k, total_iters) / total_iters)`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearLr {
    initial: f64,
    total_iters: usize,
    iters: usize,
}

impl LinearLr {
    pub fn new(initial: f64, total_iters: usize) -> Self {
        Self {
            initial,
            total_iters: total_iters.max(1),
            iters: 0,
        }
    }

    /// Multiplicative factor applied to the initial learning rate.
    pub fn factor(&self) -> f64 {
        1.0 - self.iters.min(self.total_iters) as f64 / self.total_iters as f64
    }

    /// The current learning rate.
    pub fn learning_rate(&self) -> f64 {
        self.initial * self.factor()
    }

    /// Advance the schedule by one iteration and apply the new learning rate.
    pub fn step<O: SetLearningRate + ?Sized>(
        &mut self,
        optimizer: &mut O,
    ) -> Result<f64, OptimizerStepError> {
        self.iters += 1;
        let learning_rate = self.learning_rate();
        optimizer.set_learning_rate(learning_rate)?;
        Ok(learning_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Debug, Default)]
    struct Recorder(Vec<f64>);

    impl SetLearningRate for Recorder {
        fn set_learning_rate(&mut self, learning_rate: f64) -> Result<(), OptimizerStepError> {
            self.0.push(learning_rate);
            Ok(())
        }
    }

    #[test]
    fn decays_to_zero() {
        let mut schedule = LinearLr::new(1.0, 4);
        let mut recorder = Recorder::default();
        assert_eq!(schedule.learning_rate(), 1.0);
        for _ in 0..6 {
            schedule.step(&mut recorder).unwrap();
        }
        assert_eq!(recorder.0, vec![0.75, 0.5, 0.25, 0.0, 0.0, 0.0]);
    }

    #[rstest]
    #[case(3e-4, 10, 5, 1.5e-4)]
    #[case(1.0, 1, 1, 0.0)]
    fn rate_after_steps(
        #[case] initial: f64,
        #[case] total: usize,
        #[case] steps: usize,
        #[case] expected: f64,
    ) {
        let mut schedule = LinearLr::new(initial, total);
        for _ in 0..steps {
            schedule.step(&mut Recorder::default()).unwrap();
        }
        assert!((schedule.learning_rate() - expected).abs() < 1e-12);
    }
}

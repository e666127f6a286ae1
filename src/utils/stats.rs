use num_traits::{real::Real, Zero};
use serde::{Deserialize, Serialize};
use std::iter::{Extend, FromIterator};

/// Online mean and variance calculation using Welford's Algorithm
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OnlineMeanVariance<T> {
    mean: T,
    squared_residual_sum: T,
    count: u64,
}

impl<T: Zero> Default for OnlineMeanVariance<T> {
    fn default() -> Self {
        Self {
            mean: T::zero(),
            squared_residual_sum: T::zero(),
            count: 0,
        }
    }
}

impl<T: Copy> OnlineMeanVariance<T> {
    /// The mean of all accumulated values.
    pub const fn mean(&self) -> T {
        self.mean
    }

    /// The number of accumulated values.
    pub const fn count(&self) -> u64 {
        self.count
    }
}

impl<T: Real> OnlineMeanVariance<T> {
    /// The (population) variance of all accumulated values.
    ///
    /// One if no values have been accumulated.
    pub fn variance(&self) -> T {
        match T::from(self.count) {
            Some(n) if self.count > 0 => self.squared_residual_sum / n,
            _ => T::one(),
        }
    }

    /// The (population) standard deviation of all accumulated values.
    pub fn stddev(&self) -> T {
        self.variance().sqrt()
    }

    /// Add a new value to the calculation.
    pub fn push(&mut self, value: T) {
        let residual_pre = value - self.mean;
        self.count += 1;
        // u64 -> float conversion never fails for the float types
        let n = T::from(self.count).unwrap_or_else(T::one);
        self.mean = self.mean + residual_pre / n;
        let residual_post = value - self.mean;
        self.squared_residual_sum = self.squared_residual_sum + residual_pre * residual_post;
    }
}

impl<T: Real> Extend<T> for OnlineMeanVariance<T> {
    fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = T>,
    {
        for value in iter {
            self.push(value)
        }
    }
}

impl<T: Real> FromIterator<T> for OnlineMeanVariance<T> {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let mut s = Self::default();
        s.extend(iter);
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_f64() {
        let stats: OnlineMeanVariance<f64> = [1.0, 2.0, 3.0, 4.0].into_iter().collect();
        assert!((stats.mean() - 2.5).abs() < 1e-8);
        assert!((stats.variance() - 1.25).abs() < 1e-8);
        assert_eq!(stats.count(), 4);
    }

    #[test]
    fn empty_has_unit_variance() {
        let stats = OnlineMeanVariance::<f32>::default();
        assert_eq!(stats.mean(), 0.0);
        assert_eq!(stats.variance(), 1.0);
    }

    #[test]
    fn serde_round_trip_continues_accumulating() {
        let mut stats: OnlineMeanVariance<f64> = [1.0, 2.0].into_iter().collect();
        let json = serde_json::to_string(&stats).unwrap();
        let mut restored: OnlineMeanVariance<f64> = serde_json::from_str(&json).unwrap();
        stats.push(6.0);
        restored.push(6.0);
        assert_eq!(stats, restored);
    }
}

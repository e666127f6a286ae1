//! Running observation normalization
use crate::utils::OnlineMeanVariance;
use serde::{Deserialize, Serialize};

/// Normalizes observation vectors by a running per-element mean and variance.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeObservation {
    stats: Vec<OnlineMeanVariance<f64>>,
    epsilon: f64,
}

/// Exportable state of a [`NormalizeObservation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizerState {
    pub epsilon: f64,
    pub stats: Vec<OnlineMeanVariance<f64>>,
}

impl NormalizeObservation {
    pub fn new(dim: usize) -> Self {
        Self {
            stats: vec![OnlineMeanVariance::default(); dim],
            epsilon: 1e-8,
        }
    }

    pub fn from_state(state: NormalizerState) -> Self {
        Self {
            stats: state.stats,
            epsilon: state.epsilon,
        }
    }

    pub fn state(&self) -> NormalizerState {
        NormalizerState {
            epsilon: self.epsilon,
            stats: self.stats.clone(),
        }
    }

    pub fn dim(&self) -> usize {
        self.stats.len()
    }

    /// Number of observations accumulated so far.
    pub fn count(&self) -> u64 {
        self.stats.first().map_or(0, OnlineMeanVariance::count)
    }

    /// Update the running statistics with an observation then normalize it.
    pub fn update_and_normalize(&mut self, observation: &[f32]) -> Vec<f32> {
        for (stats, &x) in self.stats.iter_mut().zip(observation) {
            stats.push(f64::from(x));
        }
        self.normalize(observation)
    }

    /// Normalize an observation without updating the statistics.
    pub fn normalize(&self, observation: &[f32]) -> Vec<f32> {
        debug_assert_eq!(observation.len(), self.stats.len());
        self.stats
            .iter()
            .zip(observation)
            .map(|(stats, &x)| {
                ((f64::from(x) - stats.mean()) / (stats.variance() + self.epsilon).sqrt()) as f32
            })
            .collect()
    }
}

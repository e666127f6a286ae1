//! Fixed-capacity recency window
use std::collections::VecDeque;

/// Keeps the most recent `capacity` values, discarding the oldest on overflow.
#[derive(Debug, Clone, PartialEq)]
pub struct RecencyWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl RecencyWindow {
    /// Create an empty window.
    ///
    /// # Panics
    /// If `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "window capacity must be positive");
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Mean of the retained values. `None` if empty.
    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn empty_has_no_mean() {
        assert_eq!(RecencyWindow::new(3).mean(), None);
    }

    #[rstest]
    #[case(1, &[1.0, 2.0, 3.0], 3.0)]
    #[case(2, &[1.0, 2.0, 3.0], 2.5)]
    #[case(20, &[1.0, 2.0, 3.0], 2.0)]
    fn mean_of_most_recent(#[case] capacity: usize, #[case] values: &[f64], #[case] mean: f64) {
        let mut window = RecencyWindow::new(capacity);
        for &v in values {
            window.push(v);
        }
        assert_eq!(window.len(), capacity.min(values.len()));
        assert!((window.mean().unwrap() - mean).abs() < 1e-12);
    }
}

// src/smoother.rs

use std::collections::VecDeque;

/// Fixed-capacity moving average over the most recent samples.
///
/// Eviction is oldest-first. The mean is only defined while at least one
/// sample is held; callers get `None` from an empty window instead of a
/// division by zero.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    history: VecDeque<f32>,
    window_size: usize,
}

impl MovingAverage {
    /// Create a window holding at most `window_size` samples (minimum 1).
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            history: VecDeque::with_capacity(window_size),
            window_size,
        }
    }

    /// Append a sample, returning the one evicted to make room, if any.
    pub fn push(&mut self, value: f32) -> Option<f32> {
        self.history.push_back(value);

        if self.history.len() > self.window_size {
            self.history.pop_front()
        } else {
            None
        }
    }

    /// Arithmetic mean of the current contents.
    pub fn mean(&self) -> Option<f32> {
        if self.history.is_empty() {
            return None;
        }
        let sum: f32 = self.history.iter().sum();
        Some(sum / self.history.len() as f32)
    }

}

#[cfg(test)]
impl MovingAverage {
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.window_size
    }

    /// Samples oldest to newest.
    pub fn samples(&self) -> impl Iterator<Item = f32> + '_ {
        self.history.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_window_has_no_mean() {
        let smoother = MovingAverage::new(5);
        assert!(smoother.is_empty());
        assert_eq!(smoother.mean(), None);
    }

    #[test]
    fn test_mean_over_partial_window() {
        let mut smoother = MovingAverage::new(5);
        smoother.push(3.0);
        smoother.push(2.0);
        smoother.push(4.0);
        assert_eq!(smoother.len(), 3);
        assert_relative_eq!(smoother.mean().unwrap(), 3.0);
    }

    #[test]
    fn test_mean_uses_last_window_samples_only() {
        let samples = [10.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0];

        for count in 1..=samples.len() {
            let mut smoother = MovingAverage::new(5);
            for &s in &samples[..count] {
                smoother.push(s);
            }

            let kept = &samples[count.saturating_sub(5)..count];
            let expected = kept.iter().sum::<f32>() / kept.len() as f32;
            assert_eq!(smoother.len(), count.min(5));
            assert_relative_eq!(smoother.mean().unwrap(), expected);
        }
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut smoother = MovingAverage::new(3);
        assert_eq!(smoother.push(1.0), None);
        assert_eq!(smoother.push(2.0), None);
        assert_eq!(smoother.push(3.0), None);
        assert_eq!(smoother.push(4.0), Some(1.0));
        assert_eq!(smoother.samples().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_zero_window_is_clamped() {
        let mut smoother = MovingAverage::new(0);
        assert_eq!(smoother.capacity(), 1);
        smoother.push(7.0);
        smoother.push(9.0);
        assert_eq!(smoother.mean(), Some(9.0));
    }
}

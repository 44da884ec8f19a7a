use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A trait for incremental trailing-window statistics.
/// Object-safe so callers can hold `Box<dyn StreamingIndicator>`.
pub trait StreamingIndicator: std::fmt::Debug + Send + Sync {
    /// Push the next observation.
    /// Returns `Some(value)` once the window is warm, otherwise `None`.
    fn update(&mut self, value: f64) -> Option<f64>;

    /// Clear history (e.g. when a new series starts).
    fn reset(&mut self);
}

// ================================================================================================
// SMA: Simple Moving Average
// ================================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingSma {
    window_size: usize,
    buffer: VecDeque<f64>,
    sum: f64,
}

impl StreamingSma {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            buffer: VecDeque::with_capacity(window_size),
            sum: 0.0,
        }
    }
}

impl StreamingIndicator for StreamingSma {
    fn update(&mut self, value: f64) -> Option<f64> {
        self.buffer.push_back(value);
        self.sum += value;

        if self.buffer.len() > self.window_size
            && let Some(removed) = self.buffer.pop_front()
        {
            self.sum -= removed;
        }

        (self.buffer.len() >= self.window_size).then(|| self.sum / self.buffer.len() as f64)
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.sum = 0.0;
    }
}

// ================================================================================================
// Rolling standard deviation (population)
// ================================================================================================

/// Trailing-window standard deviation.
///
/// Recomputed two-pass over the buffer on every update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingStd {
    window_size: usize,
    buffer: VecDeque<f64>,
}

impl StreamingStd {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            buffer: VecDeque::with_capacity(window_size),
        }
    }
}

impl StreamingIndicator for StreamingStd {
    fn update(&mut self, value: f64) -> Option<f64> {
        self.buffer.push_back(value);
        if self.buffer.len() > self.window_size {
            self.buffer.pop_front();
        }

        if self.buffer.len() < self.window_size {
            return None;
        }

        let n = self.buffer.len() as f64;
        let mean = self.buffer.iter().sum::<f64>() / n;
        let variance = self.buffer.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(variance.sqrt())
    }

    fn reset(&mut self) {
        self.buffer.clear();
    }
}

// ================================================================================================
// Rolling min / max
// ================================================================================================

/// Trailing-window extrema in amortised O(1) per update.
///
/// Two monotonic deques hold `(index, value)` candidates; the front of each
/// is the current minimum / maximum. Non-finite values are skipped but still
/// advance the window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingMinMax {
    window_size: usize,
    seen: usize,
    mins: VecDeque<(usize, f64)>,
    maxs: VecDeque<(usize, f64)>,
}

impl RollingMinMax {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            seen: 0,
            mins: VecDeque::new(),
            maxs: VecDeque::new(),
        }
    }

    /// Pushes `value` and returns `(min, max)` over the trailing window once
    /// `window_size` observations have been seen.
    pub fn update(&mut self, value: f64) -> Option<(f64, f64)> {
        let idx = self.seen;
        self.seen += 1;

        if value.is_finite() {
            while self.mins.back().is_some_and(|&(_, v)| v >= value) {
                self.mins.pop_back();
            }
            self.mins.push_back((idx, value));

            while self.maxs.back().is_some_and(|&(_, v)| v <= value) {
                self.maxs.pop_back();
            }
            self.maxs.push_back((idx, value));
        }

        let oldest = (idx + 1).saturating_sub(self.window_size);
        while self.mins.front().is_some_and(|&(i, _)| i < oldest) {
            self.mins.pop_front();
        }
        while self.maxs.front().is_some_and(|&(i, _)| i < oldest) {
            self.maxs.pop_front();
        }

        if self.seen < self.window_size {
            return None;
        }

        match (self.mins.front(), self.maxs.front()) {
            (Some(&(_, min)), Some(&(_, max))) => Some((min, max)),
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.seen = 0;
        self.mins.clear();
        self.maxs.clear();
    }
}

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_RMS_ERROR_TOLERANCE, DEFAULT_RMS_ERROR_WINDOW};

/// How many residual samples the monitor keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Retention {
    /// Ring buffer of the most recent `n` samples.
    Window(usize),
    Unbounded,
}

impl Default for Retention {
    fn default() -> Self {
        Retention::Window(DEFAULT_RMS_ERROR_WINDOW)
    }
}

/// Rolling history of per-step solver residuals.
#[derive(Debug, Clone)]
pub struct ConvergenceMonitor {
    samples: VecDeque<f64>,
    retention: Retention,
    tolerance: f64,
}

impl Default for ConvergenceMonitor {
    fn default() -> Self {
        Self::new(Retention::default(), DEFAULT_RMS_ERROR_TOLERANCE)
    }
}

impl ConvergenceMonitor {
    pub fn new(retention: Retention, tolerance: f64) -> Self {
        Self {
            samples: VecDeque::new(),
            retention: sanitize(retention),
            tolerance,
        }
    }

    /// Appends one residual, evicting the oldest sample when the window is full.
    pub fn record_error(&mut self, value: f64) {
        if let Retention::Window(limit) = self.retention {
            while self.samples.len() >= limit {
                self.samples.pop_front();
            }
        }
        self.samples.push_back(value);
    }

    /// Root mean square of the retained samples, zero when empty.
    pub fn rms_error(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|v| v * v).sum();
        (sum / self.samples.len() as f64).sqrt()
    }

    pub fn rms_error_tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn set_rms_error_tolerance(&mut self, tolerance: f64) {
        self.tolerance = tolerance;
    }

    pub fn exceeds_tolerance(&self) -> bool {
        self.rms_error() > self.tolerance
    }

    /// Retained samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn retention(&self) -> Retention {
        self.retention
    }

    /// Switches retention; shrinking a window drops the oldest samples.
    pub fn set_retention(&mut self, retention: Retention) {
        self.retention = sanitize(retention);
        if let Retention::Window(limit) = self.retention {
            while self.samples.len() > limit {
                self.samples.pop_front();
            }
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

fn sanitize(retention: Retention) -> Retention {
    match retention {
        Retention::Window(0) => Retention::Window(1),
        other => other,
    }
}

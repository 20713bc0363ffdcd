use log::{log_enabled, warn, Level};
use std::time::{Duration, Instant};

/// Scoped timer for the collision and dynamics phases.
///
/// Emits trace records on entry and exit, and optionally accumulates the
/// elapsed time into a caller-owned slot.
pub struct ScopedTimer<'a> {
    label: &'a str,
    start: Instant,
    output: Option<&'a mut Duration>,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(label: &'a str) -> Self {
        if log_enabled!(Level::Trace) {
            log::trace!("start {label}");
        }
        Self {
            label,
            start: Instant::now(),
            output: None,
        }
    }

    pub fn recording(label: &'a str, output: &'a mut Duration) -> Self {
        let mut timer = Self::new(label);
        timer.output = Some(output);
        timer
    }
}

impl<'a> Drop for ScopedTimer<'a> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        if let Some(output) = self.output.as_deref_mut() {
            *output += elapsed;
        }
        if log_enabled!(Level::Trace) {
            log::trace!("end {} ({} µs)", self.label, elapsed.as_micros());
        }
    }
}

/// Warns when one tick of wall time took longer than the simulated step it advanced.
///
/// Returns whether the budget was exceeded.
pub fn warn_if_step_budget_exceeded(duration: Duration, step_time: f64) -> bool {
    let spent = duration.as_secs_f64();
    if spent > step_time {
        warn!(
            "physics tick exceeded its budget: {:.2} ms > {:.2} ms",
            spent * 1000.0,
            step_time * 1000.0
        );
        return true;
    }
    false
}

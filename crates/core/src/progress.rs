//! Lock-free conversion progress cell.

use std::sync::atomic::{AtomicU8, Ordering};

/// Integer percentage (0-100) written by the running conversion and read by
/// any number of pollers.
///
/// Single writer, many readers. Writes never move the value backwards within
/// an attempt; [`ProgressMonitor::reset`] starts a new attempt at 0.
#[derive(Debug, Default)]
pub struct ProgressMonitor {
    percent: AtomicU8,
}

impl ProgressMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current percentage.
    pub fn get(&self) -> u8 {
        self.percent.load(Ordering::Acquire)
    }

    /// Starts a new attempt at 0.
    pub fn reset(&self) {
        self.percent.store(0, Ordering::Release);
    }

    /// Records progress, clamped to 100. Lower values than the current one
    /// are ignored.
    pub fn advance(&self, percent: u8) {
        self.percent.fetch_max(percent.min(100), Ordering::AcqRel);
    }

    /// Records progress from a fraction of work done (0.0-1.0).
    ///
    /// Stops at 99 so that only [`ProgressMonitor::complete`] reports 100.
    pub fn advance_fraction(&self, fraction: f64) {
        if !fraction.is_finite() {
            return;
        }
        let percent = (fraction.clamp(0.0, 1.0) * 100.0).floor() as u8;
        self.advance(percent.min(99));
    }

    /// Marks the attempt as finished.
    pub fn complete(&self) {
        self.advance(100);
    }
}

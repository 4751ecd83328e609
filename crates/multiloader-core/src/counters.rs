//! Process-wide run counters.
//!
//! Incremented at the call site, reset when an orchestrator pass starts and
//! emitted once via [`Counters::flush`] when it finishes.

use std::sync::atomic::{AtomicU64, Ordering};

pub static COUNTERS: Counters = Counters::new();

pub struct Counters {
    experiments_run: AtomicU64,
    experiments_failed: AtomicU64,
    attempts_retried: AtomicU64,
    metric_failures: AtomicU64,
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}

impl Counters {
    pub const fn new() -> Self {
        Self {
            experiments_run: AtomicU64::new(0),
            experiments_failed: AtomicU64::new(0),
            attempts_retried: AtomicU64::new(0),
            metric_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_experiments_run(&self) {
        self.experiments_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_experiments_failed(&self) {
        self.experiments_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_attempts_retried(&self) {
        self.attempts_retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_metric_failures(&self) {
        self.metric_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            experiments_run = self.experiments_run(),
            experiments_failed = self.experiments_failed(),
            attempts_retried = self.attempts_retried(),
            metric_failures = self.metric_failures(),
        );
    }

    pub fn experiments_run(&self) -> u64 {
        self.experiments_run.load(Ordering::Relaxed)
    }

    pub fn experiments_failed(&self) -> u64 {
        self.experiments_failed.load(Ordering::Relaxed)
    }

    pub fn attempts_retried(&self) -> u64 {
        self.attempts_retried.load(Ordering::Relaxed)
    }

    pub fn metric_failures(&self) -> u64 {
        self.metric_failures.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.experiments_run.store(0, Ordering::Relaxed);
        self.experiments_failed.store(0, Ordering::Relaxed);
        self.attempts_retried.store(0, Ordering::Relaxed);
        self.metric_failures.store(0, Ordering::Relaxed);
    }
}

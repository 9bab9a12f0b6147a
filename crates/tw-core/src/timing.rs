//! Opt-in wall-clock timing of the rate-evaluation phases.
//!
//! Off by default. The CLI switches it on when `TW_TIMING` is set; library
//! code only ever reads the switch.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

static ENABLED: AtomicBool = AtomicBool::new(false);

pub fn enable_timing() {
    ENABLED.store(true, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Measures one phase; a no-op unless timing was enabled at start.
pub struct Timer {
    start: Option<Instant>,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: is_enabled().then(Instant::now),
        }
    }

    /// Elapsed seconds, `None` when timing is off.
    pub fn stop(self) -> Option<f64> {
        self.start.map(|s| s.elapsed().as_secs_f64())
    }

    pub fn stop_into(self, phase: &PhaseTimer) {
        if let Some(elapsed) = self.stop() {
            phase.record(elapsed);
        }
    }
}

/// Total time and call count of one phase, shared across worker threads.
pub struct PhaseTimer {
    label: &'static str,
    total_ns: AtomicU64,
    count: AtomicU64,
}

impl PhaseTimer {
    pub const fn new(label: &'static str) -> Self {
        Self {
            label,
            total_ns: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn record(&self, duration_s: f64) {
        let nanos = (duration_s * 1e9) as u64;
        self.total_ns.fetch_add(nanos, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_seconds(&self) -> f64 {
        self.total_ns.load(Ordering::Relaxed) as f64 / 1e9
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn average_seconds(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            n => self.total_seconds() / n as f64,
        }
    }

    pub fn reset(&self) {
        self.total_ns.store(0, Ordering::Relaxed);
        self.count.store(0, Ordering::Relaxed);
    }
}

/// Per-phase timers for one rate evaluation.
pub mod loop_timing {
    use super::PhaseTimer;

    pub static BOUNDARY: PhaseTimer = PhaseTimer::new("boundary");
    pub static SOURCES: PhaseTimer = PhaseTimer::new("sources");
    /// Parallel element assembly, accumulation included
    pub static ELEMENT_LOOP: PhaseTimer = PhaseTimer::new("element loop");
    pub static RESULT_WRITE: PhaseTimer = PhaseTimer::new("result write");

    pub static PHASES: [&PhaseTimer; 4] = [&BOUNDARY, &SOURCES, &ELEMENT_LOOP, &RESULT_WRITE];

    pub fn reset_all() {
        PHASES.iter().for_each(|p| p.reset());
    }

    pub fn print_summary() {
        if !super::is_enabled() {
            return;
        }

        println!("\n=== Rate Evaluation Breakdown ===");
        for phase in PHASES.iter().filter(|p| p.count() > 0) {
            println!(
                "{:<14} {:>8} calls, {:.3}s total, {:.4}ms avg",
                phase.label(),
                phase.count(),
                phase.total_seconds(),
                phase.average_seconds() * 1000.0
            );
        }
        println!("=================================\n");
    }
}

/// Performance statistics collector.
#[derive(Default)]
pub struct PerfStats {
    pub setup_time_s: f64,
    pub run_time_s: f64,
    pub sub_steps: usize,
    pub intervals: usize,
}

impl PerfStats {
    /// Print a formatted summary of the statistics.
    pub fn print_summary(&self) {
        if !is_enabled() {
            return;
        }

        println!("\n=== Performance Summary ===");

        if self.setup_time_s > 0.0 {
            println!("Setup time:          {:.3}s", self.setup_time_s);
        }

        if self.run_time_s > 0.0 {
            println!("Run time:            {:.3}s", self.run_time_s);
            if self.sub_steps > 0 {
                println!("  Intervals:         {}", self.intervals);
                println!("  Sub-steps:         {}", self.sub_steps);
                println!(
                    "  Avg sub-step:      {:.4}s",
                    self.run_time_s / self.sub_steps as f64
                );
            }
        }

        println!("==========================\n");

        loop_timing::print_summary();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_timer_averages() {
        let t = PhaseTimer::new("test");
        t.record(0.5);
        t.record(1.5);
        assert_eq!(t.count(), 2);
        assert!((t.average_seconds() - 1.0).abs() < 1e-6);
        t.reset();
        assert_eq!(t.count(), 0);
        assert_eq!(t.average_seconds(), 0.0);
    }

    #[test]
    fn disabled_timer_records_nothing() {
        let t = PhaseTimer::new("test");
        Timer { start: None }.stop_into(&t);
        assert_eq!(t.count(), 0);
    }
}

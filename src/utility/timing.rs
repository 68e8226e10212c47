// ============================================
// TIMING UTILITY
// ============================================
//   let _t = Timer::start("NIFTY cycle");                 // logged on drop
//   let _t = Timer::start_with_threshold("GET ...", 2000); // logged only if slow
//   let csv = timed("bias export", || render(..));
// ============================================

use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Anything at or above this is logged at warn level
pub const SLOW_MS: u128 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Report {
    Always,
    AtLeast(u128),
    Never,
}

/// Wall-clock span that reports itself through `tracing` once, either on
/// `stop()` or when dropped.
pub struct Timer {
    label: String,
    began: Instant,
    report: Report,
}

impl Timer {
    fn with_report(label: impl Into<String>, report: Report) -> Self {
        Self {
            label: label.into(),
            began: Instant::now(),
            report,
        }
    }

    pub fn start(label: impl Into<String>) -> Self {
        Self::with_report(label, Report::Always)
    }

    pub fn start_with_threshold(label: impl Into<String>, threshold_ms: u128) -> Self {
        Self::with_report(label, Report::AtLeast(threshold_ms))
    }

    pub fn elapsed(&self) -> Duration {
        self.began.elapsed()
    }

    pub fn stop(mut self) -> Duration {
        let took = self.elapsed();
        self.emit(took);
        self.report = Report::Never;
        took
    }

    fn emit(&self, took: Duration) {
        let ms = took.as_millis();
        let wanted = match self.report {
            Report::Always => true,
            Report::AtLeast(min) => ms >= min,
            Report::Never => false,
        };
        if !wanted {
            return;
        }

        if ms >= SLOW_MS {
            warn!(elapsed_ms = ms as u64, "{} slow: {:.2}s", self.label, took.as_secs_f64());
        } else {
            info!(elapsed_ms = ms as u64, "{} done in {}ms", self.label, ms);
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.emit(self.elapsed());
    }
}

pub fn timed<R>(label: impl Into<String>, work: impl FnOnce() -> R) -> R {
    let timer = Timer::start(label);
    let out = work();
    timer.stop();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_measures() {
        let timer = Timer::start_with_threshold("sleep", u128::MAX);
        std::thread::sleep(Duration::from_millis(5));
        assert!(timer.elapsed() >= Duration::from_millis(5));
        assert!(timer.stop() >= Duration::from_millis(5));
    }

    #[test]
    fn test_threshold_policy() {
        let timer = Timer::start_with_threshold("fetch", 2_000);
        assert_eq!(timer.report, Report::AtLeast(2_000));
        assert_eq!(Timer::start("cycle").report, Report::Always);
    }

    #[test]
    fn test_timed_returns_value() {
        assert_eq!(timed("sum", || 2 + 2), 4);
    }
}

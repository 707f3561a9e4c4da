use std::time::{Duration, Instant};

/// Logs how long a routing phase took when it goes out of scope.
pub struct ScopedTimer {
    phase: &'static str,
    start: Instant,
    level: log::Level,
}

impl ScopedTimer {
    pub fn new(phase: &'static str) -> Self {
        Self::with_level(phase, log::Level::Info)
    }

    pub fn with_level(phase: &'static str, level: log::Level) -> Self {
        Self {
            phase,
            start: Instant::now(),
            level,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        log::log!(
            self.level,
            "{}: {:.3}s",
            self.phase,
            self.start.elapsed().as_secs_f64()
        );
    }
}

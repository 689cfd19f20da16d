// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::time::{Duration, Instant};

/// Installs the global `tracing` subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

/// Counts presented frames and reports the total once per reporting window.
#[derive(Debug, Clone)]
pub struct FrameCounter {
    window: Duration,
    frames: u32,
    window_start: Instant,
}

impl FrameCounter {
    pub fn new(now: Instant) -> Self {
        Self::with_window(now, Duration::from_secs(1))
    }

    pub fn with_window(now: Instant, window: Duration) -> Self {
        Self {
            window,
            frames: 0,
            window_start: now,
        }
    }

    /// Records one frame. Returns the number of frames drawn in the window that
    /// just closed, if `now` is past its end.
    pub fn tick(&mut self, now: Instant) -> Option<u32> {
        self.frames = self.frames.saturating_add(1);
        if now.duration_since(self.window_start) < self.window {
            return None;
        }
        let drawn = self.frames;
        self.frames = 0;
        self.window_start = now;
        tracing::debug!(drawn, "frame window closed");
        Some(drawn)
    }

    /// Drops the partial count, e.g. while the window is minimised.
    pub fn reset(&mut self, now: Instant) {
        self.frames = 0;
        self.window_start = now;
    }

    pub fn pending(&self) -> u32 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_once_per_window() {
        let t0 = Instant::now();
        let mut counter = FrameCounter::new(t0);

        for i in 1..=59 {
            assert_eq!(counter.tick(t0 + Duration::from_millis(i * 16)), None);
        }
        assert_eq!(counter.tick(t0 + Duration::from_secs(1)), Some(60));
        assert_eq!(counter.pending(), 0);
    }

    #[test]
    fn next_window_starts_at_report_time() {
        let t0 = Instant::now();
        let mut counter = FrameCounter::with_window(t0, Duration::from_millis(100));

        assert_eq!(counter.tick(t0 + Duration::from_millis(150)), Some(1));
        assert_eq!(counter.tick(t0 + Duration::from_millis(200)), None);
        assert_eq!(counter.tick(t0 + Duration::from_millis(250)), Some(2));
    }

    #[test]
    fn reset_discards_partial_window() {
        let t0 = Instant::now();
        let mut counter = FrameCounter::new(t0);
        counter.tick(t0);
        counter.tick(t0);
        assert_eq!(counter.pending(), 2);

        let later = t0 + Duration::from_secs(5);
        counter.reset(later);
        assert_eq!(counter.pending(), 0);
        assert_eq!(counter.tick(later + Duration::from_millis(10)), None);
    }
}

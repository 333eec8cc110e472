//! High-resolution timer for frame timing.

use std::time::{Duration, Instant};

/// High-resolution timer for measuring frame deltas and frame rate.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
    frames: u64,
    window_start: Instant,
    window_frames: u32,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            frames: 0,
            window_start: now,
            window_frames: 0,
        }
    }

    /// Get the total elapsed time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get the time elapsed since the last call to `tick()`.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        self.frames += 1;
        self.window_frames += 1;
        delta
    }

    /// Total number of ticks since creation.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Returns the average frames per second once at least `interval` has
    /// passed since the last report, then starts a new window.
    pub fn fps_report(&mut self, interval: Duration) -> Option<f32> {
        let elapsed = self.window_start.elapsed();
        if elapsed < interval || self.window_frames == 0 {
            return None;
        }
        let fps = self.window_frames as f32 / elapsed.as_secs_f32();
        self.window_start = Instant::now();
        self.window_frames = 0;
        Some(fps)
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_counts_frames() {
        let mut timer = Timer::new();
        timer.tick();
        timer.tick();
        assert_eq!(timer.frame_count(), 2);
    }

    #[test]
    fn test_fps_report_waits_for_interval() {
        let mut timer = Timer::new();
        timer.tick();
        assert!(timer.fps_report(Duration::from_secs(3600)).is_none());
        assert!(timer.fps_report(Duration::ZERO).is_some());
        // window was reset and has no frames yet
        assert!(timer.fps_report(Duration::ZERO).is_none());
    }
}

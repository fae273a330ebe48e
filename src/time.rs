//! Frame clock feeding the per-tick delta.
//!
//! A stalled frame (window drag, debugger break) must not translate into one
//! huge integration step, so every delta handed to a flock is clamped into
//! `[0, MAX_TICK_DELTA]` first. [`Time`] applies the same clamp to wall-clock
//! deltas and adds pause, fixed-step and FPS bookkeeping.
//!
//! ```ignore
//! let mut time = Time::new();
//! loop {
//!     let dt = time.update();
//!     flock.tick(dt);
//! }
//! ```

use std::time::{Duration, Instant};

/// Longest step a single tick may integrate, in seconds.
pub const MAX_TICK_DELTA: f32 = 0.05;

/// Clamp a raw delta into `[0, MAX_TICK_DELTA]`. Non-finite input becomes 0.
#[inline]
pub fn clamp_delta(dt: f32) -> f32 {
    if dt.is_finite() {
        dt.clamp(0.0, MAX_TICK_DELTA)
    } else {
        0.0
    }
}

/// Wall clock with pause, fixed step and FPS tracking.
#[derive(Debug)]
pub struct Time {
    start: Instant,
    last_frame: Instant,
    elapsed_secs: f32,
    /// Clamped delta of the last update.
    delta_secs: f32,
    frame_count: u64,
    fps: f32,
    fps_frame_count: u64,
    fps_update_time: Instant,
    fps_update_interval: Duration,
    paused: bool,
    pause_elapsed: Duration,
    fixed_delta: Option<f32>,
    max_delta: f32,
}

impl Time {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_frame: now,
            elapsed_secs: 0.0,
            delta_secs: 0.0,
            frame_count: 0,
            fps: 0.0,
            fps_frame_count: 0,
            fps_update_time: now,
            fps_update_interval: Duration::from_millis(500),
            paused: false,
            pause_elapsed: Duration::ZERO,
            fixed_delta: None,
            max_delta: MAX_TICK_DELTA,
        }
    }

    /// Advance the clock. Call once per frame; returns the clamped delta.
    pub fn update(&mut self) -> f32 {
        let now = Instant::now();

        if self.paused {
            self.delta_secs = 0.0;
            return 0.0;
        }

        let raw_delta = now.duration_since(self.last_frame).as_secs_f32();
        let delta = self.fixed_delta.unwrap_or(raw_delta);
        self.delta_secs = if delta.is_finite() { delta.clamp(0.0, self.max_delta) } else { 0.0 };
        self.last_frame = now;

        let raw_elapsed = now.duration_since(self.start).saturating_sub(self.pause_elapsed);
        self.elapsed_secs = raw_elapsed.as_secs_f32();

        self.frame_count += 1;

        let fps_elapsed = now.duration_since(self.fps_update_time);
        if fps_elapsed >= self.fps_update_interval {
            let frames_since = self.frame_count - self.fps_frame_count;
            self.fps = frames_since as f32 / fps_elapsed.as_secs_f32();
            self.fps_frame_count = self.frame_count;
            self.fps_update_time = now;
        }

        self.delta_secs
    }

    #[inline]
    pub fn elapsed(&self) -> f32 {
        self.elapsed_secs
    }

    /// Clamped delta of the last update.
    #[inline]
    pub fn delta(&self) -> f32 {
        self.delta_secs
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame_count
    }

    #[inline]
    pub fn fps(&self) -> f32 {
        self.fps
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// While paused, `update()` returns 0 and `elapsed()` stops.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        if self.paused {
            let now = Instant::now();
            self.pause_elapsed += now.duration_since(self.last_frame);
            self.last_frame = now;
            self.paused = false;
        }
    }

    pub fn toggle_pause(&mut self) {
        if self.paused {
            self.resume();
        } else {
            self.pause();
        }
    }

    /// Use a constant step instead of wall-clock time. Still clamped.
    pub fn set_fixed_delta(&mut self, delta: Option<f32>) {
        self.fixed_delta = delta;
    }

    /// Ceiling for a single delta, itself capped at [`MAX_TICK_DELTA`].
    pub fn set_max_delta(&mut self, max_delta: f32) {
        self.max_delta = clamp_delta(max_delta);
    }

    #[inline]
    pub fn max_delta(&self) -> f32 {
        self.max_delta
    }

    pub fn reset(&mut self) {
        *self = Self {
            fixed_delta: self.fixed_delta,
            max_delta: self.max_delta,
            ..Self::new()
        };
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_clamp_delta() {
        assert_eq!(clamp_delta(0.01), 0.01);
        assert_eq!(clamp_delta(1.0), MAX_TICK_DELTA);
        assert_eq!(clamp_delta(-0.5), 0.0);
        assert_eq!(clamp_delta(f32::NAN), 0.0);
        assert_eq!(clamp_delta(f32::INFINITY), 0.0);
    }

    #[test]
    fn test_time_update() {
        let mut time = Time::new();
        thread::sleep(Duration::from_millis(10));
        let delta = time.update();

        assert!(time.elapsed() > 0.0);
        assert!(delta > 0.0);
        assert!(delta <= MAX_TICK_DELTA);
        assert_eq!(time.frame(), 1);
    }

    #[test]
    fn test_stalled_frame_is_clamped() {
        let mut time = Time::new();
        thread::sleep(Duration::from_millis(120));
        assert_eq!(time.update(), MAX_TICK_DELTA);
    }

    #[test]
    fn test_time_pause() {
        let mut time = Time::new();
        time.update();

        time.pause();
        assert!(time.is_paused());

        let elapsed_before = time.elapsed();
        thread::sleep(Duration::from_millis(10));
        time.update();

        assert_eq!(time.elapsed(), elapsed_before);
        assert_eq!(time.delta(), 0.0);

        time.toggle_pause();
        assert!(!time.is_paused());
    }

    #[test]
    fn test_custom_max_delta() {
        let mut time = Time::new();
        time.set_max_delta(0.01);
        time.set_fixed_delta(Some(0.02));
        assert_eq!(time.update(), 0.01);

        time.set_max_delta(3.0);
        assert_eq!(time.max_delta(), MAX_TICK_DELTA);
    }

    #[test]
    fn test_fixed_delta() {
        let mut time = Time::new();
        time.set_fixed_delta(Some(1.0 / 60.0));

        thread::sleep(Duration::from_millis(100));
        time.update();

        assert!((time.delta() - 1.0 / 60.0).abs() < 0.0001);
    }
}

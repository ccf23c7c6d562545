//! Frame pacing and smoothed frame-rate reporting for render loops.

use web_time::{Duration, Instant};

/// Frame timing with FPS calculation and optional frame limiting.
///
/// Hosts without vsync call [`wait_for_next`](Self::wait_for_next) before
/// each frame to hold the loop at the simulation's step rate.
#[derive(Debug)]
pub struct FrameTiming {
    /// Target FPS (0 = unlimited)
    target_fps: u32,
    min_frame_duration: Duration,
    last_frame: Instant,
    /// Exponential moving average of the instantaneous rate
    smoothed_fps: f32,
    /// Weight of each new sample, 0.0-1.0
    smoothing: f32,
    frames: u64,
}

impl FrameTiming {
    /// Create a frame timer with the given FPS target (0 = unlimited).
    pub fn new(target_fps: u32) -> Self {
        let min_frame_duration = if target_fps > 0 {
            Duration::from_secs_f64(1.0 / f64::from(target_fps))
        } else {
            Duration::ZERO
        };

        Self {
            target_fps,
            min_frame_duration,
            last_frame: Instant::now(),
            smoothed_fps: target_fps.max(60) as f32,
            smoothing: 0.05,
            frames: 0,
        }
    }

    /// Timer paced to a simulation step of `time_step` seconds.
    pub fn for_time_step(time_step: f32) -> Self {
        if time_step > 0.0 {
            Self::new((1.0 / time_step).round() as u32)
        } else {
            Self::new(0)
        }
    }

    /// Whether enough time has passed since the last frame to render.
    pub fn should_render(&self) -> bool {
        if self.target_fps == 0 {
            return true;
        }
        self.last_frame.elapsed() >= self.min_frame_duration
    }

    /// Time left until the next frame is due.
    pub fn time_until_next(&self) -> Duration {
        self.min_frame_duration
            .saturating_sub(self.last_frame.elapsed())
    }

    /// Block the calling thread until the next frame is due. Returns at
    /// once for unlimited timers. Native only: wasm cannot sleep.
    pub fn wait_for_next(&self) {
        if !self.should_render() {
            std::thread::sleep(self.time_until_next());
        }
    }

    /// Call after rendering to update timing.
    pub fn end_frame(&mut self) {
        let now = Instant::now();
        self.record(now.duration_since(self.last_frame));
        self.last_frame = now;
    }

    fn record(&mut self, elapsed: Duration) {
        self.frames += 1;
        let frame_time = elapsed.as_secs_f32();
        if frame_time > 0.0 {
            let instant_fps = 1.0 / frame_time;
            self.smoothed_fps = self.smoothed_fps * (1.0 - self.smoothing)
                + instant_fps * self.smoothing;
        }
    }

    /// Current FPS, smoothed.
    pub fn fps(&self) -> f32 {
        self.smoothed_fps
    }

    /// Frames recorded since construction.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_timer_always_renders() {
        let timing = FrameTiming::new(0);
        assert!(timing.should_render());
        assert_eq!(timing.time_until_next(), Duration::ZERO);
    }

    #[test]
    fn time_step_sets_the_target_rate() {
        let timing = FrameTiming::for_time_step(1.0 / 60.0);
        assert_eq!(timing.target_fps, 60);
        assert!(timing.time_until_next() <= Duration::from_secs_f64(1.0 / 60.0));
        assert_eq!(FrameTiming::for_time_step(0.0).target_fps, 0);
    }

    #[test]
    fn waiting_holds_frames_to_the_target_rate() {
        let mut timing = FrameTiming::new(50);
        timing.end_frame();
        assert!(!timing.should_render());
        let start = Instant::now();
        timing.wait_for_next();
        assert!(timing.should_render());
        assert!(start.elapsed() >= Duration::from_millis(15));

        let start = Instant::now();
        FrameTiming::new(0).wait_for_next();
        assert!(start.elapsed() < Duration::from_millis(15));
    }

    #[test]
    fn smoothing_moves_toward_observed_rate() {
        let mut timing = FrameTiming::new(60);
        for _ in 0..200 {
            timing.record(Duration::from_millis(50));
        }
        assert!((timing.fps() - 20.0).abs() < 0.5);
        assert_eq!(timing.frames(), 200);

        timing.record(Duration::ZERO);
        assert!((timing.fps() - 20.0).abs() < 0.5);
    }
}

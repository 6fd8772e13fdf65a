use std::time::{Duration, Instant};

/// Measures wall time between frames and clamps it so a stalled frame (debugger, window
/// drag, suspended process) cannot feed a huge step into the simulation.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    last: Option<Instant>,
    max_dt: Duration,
}

impl FrameClock {
    pub fn new(max_dt: Duration) -> Self {
        Self { last: None, max_dt }
    }

    pub fn max_dt(&self) -> Duration {
        self.max_dt
    }

    /// Returns the clamped time since the previous tick. The first tick returns zero.
    pub fn tick(&mut self, now: Instant) -> Duration {
        let raw = match self.last {
            Some(last) => now.saturating_duration_since(last),
            None => Duration::ZERO,
        };
        self.last = Some(now);
        clamp_dt(raw, self.max_dt)
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

pub fn clamp_dt(dt: Duration, max_dt: Duration) -> Duration {
    if dt > max_dt {
        log::debug!(
            "frame took {:.1}ms; clamped to {:.1}ms",
            dt.as_secs_f64() * 1000.0,
            max_dt.as_secs_f64() * 1000.0
        );
        return max_dt;
    }
    dt
}

/// Frame budget for a target rate. Zero fps means "unpaced".
pub fn frame_interval(fps: u32) -> Duration {
    if fps == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs(1) / fps
}

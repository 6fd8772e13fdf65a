use std::time::Duration;

#[derive(Debug, Clone, Copy, Default)]
pub struct StepTimings {
    /// Wall time spent inside `GameLogic::step`.
    pub step: Duration,
    /// Simulated time advanced by the step.
    pub dt: Duration,
    pub effects: usize,
}

/// Optional hook interface for capturing engine step timings.
///
/// Kept independent of game-specific State/Input types so headless runs and the CLI
/// can share one implementation.
pub trait Profiler {
    fn on_step(&mut self, _frame: usize, _timings: StepTimings) {}
}

/// Running totals over every observed step.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepStats {
    pub frames: usize,
    pub total: Duration,
    pub worst: Duration,
    pub effects: usize,
}

impl StepStats {
    pub fn average(&self) -> Duration {
        if self.frames == 0 {
            return Duration::ZERO;
        }
        self.total / self.frames as u32
    }
}

impl Profiler for StepStats {
    fn on_step(&mut self, _frame: usize, timings: StepTimings) {
        self.frames += 1;
        self.total = self.total.saturating_add(timings.step);
        self.worst = self.worst.max(timings.step);
        self.effects += timings.effects;
    }
}

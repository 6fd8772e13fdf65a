pub mod clock;
pub mod geometry;
pub mod profiling;
pub mod shared;

use std::time::{Duration, Instant};

/// A frame-stepped simulation.
///
/// `step` mutates the state in place and reports side effects (network calls, sounds, ...)
/// as values so the caller decides how and where to run them.
pub trait GameLogic {
    type State;
    type Input;
    type Effect;

    fn initial_state(&self) -> Self::State;
    fn step(
        &self,
        state: &mut Self::State,
        input: Self::Input,
        dt: Duration,
    ) -> Vec<Self::Effect>;
}

#[derive(Debug)]
pub struct HeadlessRunner<G: GameLogic> {
    game: G,
    state: G::State,
    frame: usize,
    elapsed: Duration,
}

impl<G: GameLogic> HeadlessRunner<G> {
    pub fn new(game: G) -> Self {
        let state = game.initial_state();
        Self {
            game,
            state,
            frame: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Total simulated time fed through `step`.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn state(&self) -> &G::State {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut G::State {
        &mut self.state
    }

    pub fn step(&mut self, input: G::Input, dt: Duration) -> Vec<G::Effect> {
        let effects = self.game.step(&mut self.state, input, dt);
        self.frame += 1;
        self.elapsed = self.elapsed.saturating_add(dt);
        effects
    }

    pub fn step_profiled<P: profiling::Profiler>(
        &mut self,
        input: G::Input,
        dt: Duration,
        profiler: &mut P,
    ) -> Vec<G::Effect> {
        let start = Instant::now();
        let effects = self.step(input, dt);
        profiler.on_step(
            self.frame,
            profiling::StepTimings {
                step: start.elapsed(),
                dt,
                effects: effects.len(),
            },
        );
        effects
    }

    /// Steps every input with the same `dt`, returning all effects in emission order.
    pub fn run<I>(&mut self, inputs: I, dt: Duration) -> Vec<G::Effect>
    where
        I: IntoIterator<Item = G::Input>,
    {
        let mut effects = Vec::new();
        for input in inputs {
            effects.extend(self.step(input, dt));
        }
        effects
    }

    pub fn reset(&mut self) {
        self.state = self.game.initial_state();
        self.frame = 0;
        self.elapsed = Duration::ZERO;
    }
}

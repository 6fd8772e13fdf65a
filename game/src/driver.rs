use std::sync::Arc;
use std::time::Duration;

use aero_engine::clock::clamp_dt;
use aero_engine::profiling::StepStats;
use aero_engine::shared::EdgeFlag;
use aero_engine::{GameLogic, HeadlessRunner};

use crate::config::{ConfigError, GameConfig};
use crate::input::{Key, map_key};
use crate::state::{Effect, GameContext, GameEvent};
use crate::sync::{LeaderboardEntry, ScoreSync};

/// What one frame feeds the game: queued local events plus whether a pinch landed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameInput {
    pub events: Vec<GameEvent>,
    pub flap: bool,
}

/// The game as a frame-stepped simulation.
#[derive(Debug, Clone)]
pub struct AeroGame {
    config: GameConfig,
    seed: u64,
}

impl AeroGame {
    pub fn new(config: GameConfig, seed: u64) -> Self {
        Self { config, seed }
    }
}

impl GameLogic for AeroGame {
    type State = GameContext;
    type Input = FrameInput;
    type Effect = Effect;

    fn initial_state(&self) -> GameContext {
        GameContext::new(self.config.clone(), self.seed)
    }

    fn step(&self, state: &mut GameContext, input: FrameInput, dt: Duration) -> Vec<Effect> {
        state.tick(input.events, input.flap, dt)
    }
}

/// Runs the frame loop side of the game: input in, effects out to the scoring service.
#[derive(Debug)]
pub struct FrameDriver {
    runner: HeadlessRunner<AeroGame>,
    flag: Arc<EdgeFlag>,
    sync: ScoreSync,
    max_dt: Duration,
    leaderboard_limit: u32,
    refresh_every: Duration,
    since_refresh: Duration,
    stats: StepStats,
}

impl FrameDriver {
    /// Validates `config` and asks for the leaderboard once up front.
    pub fn new(config: GameConfig, seed: u64, sync: ScoreSync) -> Result<Self, ConfigError> {
        config.validate()?;
        let driver = Self {
            max_dt: config.frame.max_dt,
            leaderboard_limit: config.network.leaderboard_limit,
            refresh_every: config.network.leaderboard_refresh,
            since_refresh: Duration::ZERO,
            runner: HeadlessRunner::new(AeroGame::new(config, seed)),
            flag: Arc::new(EdgeFlag::new()),
            sync,
            stats: StepStats::default(),
        };
        driver.refresh_leaderboard();
        Ok(driver)
    }

    /// The flag a gesture worker should raise.
    pub fn flap_flag(&self) -> Arc<EdgeFlag> {
        Arc::clone(&self.flag)
    }

    pub fn context(&self) -> &GameContext {
        self.runner.state()
    }

    pub fn context_mut(&mut self) -> &mut GameContext {
        self.runner.state_mut()
    }

    pub fn sync(&self) -> &ScoreSync {
        &self.sync
    }

    pub fn stats(&self) -> &StepStats {
        &self.stats
    }

    pub fn frame(&self) -> usize {
        self.runner.frame()
    }

    pub fn elapsed(&self) -> Duration {
        self.runner.elapsed()
    }

    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.sync.leaderboard()
    }

    pub fn refresh_leaderboard(&self) {
        self.sync.dispatch(Effect::FetchLeaderboard {
            limit: self.leaderboard_limit,
        });
    }

    /// Maps keys against the current phase. Keys that mean nothing there are dropped.
    pub fn key_events(&self, keys: &[Key]) -> Vec<GameEvent> {
        let phase = self.context().phase();
        keys.iter().filter_map(|&key| map_key(key, phase)).collect()
    }

    /// Runs one frame and returns the effects it dispatched.
    pub fn tick(&mut self, dt: Duration, events: Vec<GameEvent>) -> Vec<Effect> {
        let dt = clamp_dt(dt, self.max_dt);

        for reg in self.sync.take_registrations() {
            self.runner
                .state_mut()
                .apply_registration(reg.generation, reg.player_id);
        }

        let input = FrameInput {
            events,
            flap: self.flag.take(),
        };
        let effects = self.runner.step_profiled(input, dt, &mut self.stats);
        for effect in &effects {
            log::debug!("frame {}: {effect:?}", self.runner.frame());
            self.sync.dispatch(effect.clone());
        }

        self.since_refresh = self.since_refresh.saturating_add(dt);
        if self.since_refresh >= self.refresh_every {
            self.since_refresh = Duration::ZERO;
            self.refresh_leaderboard();
        }
        effects
    }
}

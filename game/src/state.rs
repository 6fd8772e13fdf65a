use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::collision::{self, Terminal};
use crate::config::GameConfig;
use crate::obstacles::{Obstacle, ObstacleField};
use crate::physics::PhysicsBody;

pub const MAX_NAME_LEN: usize = 12;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    #[default]
    EnteringName,
    Playing,
    GameOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEvent {
    Confirm,
    Cancel,
    Flap,
    Collision(Terminal),
    Char(char),
    Backspace,
}

/// What a phase transition asks the context to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseEffect {
    None,
    StartSession,
    EndSession,
    ReplaySession,
    ReturnToMenu,
    FlapBody,
    EditName,
}

impl GamePhase {
    /// Pure transition function for the game phase.
    ///
    /// `name_ready` says whether a non-blank name has been typed. Inputs that mean nothing in
    /// the current phase leave it unchanged.
    pub fn handle(self, event: GameEvent, name_ready: bool) -> (GamePhase, PhaseEffect) {
        match (self, event) {
            (GamePhase::EnteringName, GameEvent::Confirm | GameEvent::Flap) if name_ready => {
                (GamePhase::Playing, PhaseEffect::StartSession)
            }
            (GamePhase::EnteringName, GameEvent::Char(_) | GameEvent::Backspace) => {
                (GamePhase::EnteringName, PhaseEffect::EditName)
            }

            (GamePhase::Playing, GameEvent::Flap) => (GamePhase::Playing, PhaseEffect::FlapBody),
            (GamePhase::Playing, GameEvent::Collision(_)) => {
                (GamePhase::GameOver, PhaseEffect::EndSession)
            }

            (GamePhase::GameOver, GameEvent::Flap) => {
                (GamePhase::Playing, PhaseEffect::ReplaySession)
            }
            (GamePhase::GameOver, GameEvent::Cancel) => {
                (GamePhase::EnteringName, PhaseEffect::ReturnToMenu)
            }

            (phase, _) => (phase, PhaseEffect::None),
        }
    }
}

/// Work the frame loop hands to the background. Each carries owned data only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    RegisterPlayer {
        generation: u64,
        username: String,
    },
    SubmitScore {
        player_id: Option<i64>,
        score: u32,
        #[serde(with = "crate::serde_duration")]
        duration: Duration,
    },
    FetchLeaderboard {
        limit: u32,
    },
}

/// One playthrough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub player_id: Option<i64>,
    pub username: String,
    pub score: u32,
    pub started_at: SystemTime,
    #[serde(with = "crate::serde_duration")]
    pub elapsed: Duration,
}

impl Session {
    fn new(username: String, player_id: Option<i64>) -> Self {
        Self {
            player_id,
            username,
            score: 0,
            started_at: SystemTime::now(),
            elapsed: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GameSnapshot {
    pub phase: GamePhase,
    pub name_input: String,
    pub session: Option<Session>,
    pub body: PhysicsBody,
    pub obstacles: Vec<Obstacle>,
    pub last_terminal: Option<Terminal>,
}

/// Everything the frame loop owns. Nothing in here is touched from another thread.
#[derive(Debug, Clone)]
pub struct GameContext {
    config: GameConfig,
    phase: GamePhase,
    name_input: String,
    session: Option<Session>,
    body: PhysicsBody,
    field: ObstacleField,
    generation: u64,
    last_terminal: Option<Terminal>,
}

impl GameContext {
    pub fn new(config: GameConfig, seed: u64) -> Self {
        let body = PhysicsBody::spawn(&config.physics, &config.playfield);
        let field = ObstacleField::new(config.obstacles, config.playfield, seed);
        Self {
            config,
            phase: GamePhase::default(),
            name_input: String::new(),
            session: None,
            body,
            field,
            generation: 0,
            last_terminal: None,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn name_input(&self) -> &str {
        &self.name_input
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn score(&self) -> u32 {
        self.session.as_ref().map_or(0, |s| s.score)
    }

    pub fn player_id(&self) -> Option<i64> {
        self.session.as_ref().and_then(|s| s.player_id)
    }

    pub fn body(&self) -> &PhysicsBody {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut PhysicsBody {
        &mut self.body
    }

    pub fn field(&self) -> &ObstacleField {
        &self.field
    }

    pub fn field_mut(&mut self) -> &mut ObstacleField {
        &mut self.field
    }

    /// Bumped whenever a new registration starts or the player leaves to the menu.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_terminal(&self) -> Option<Terminal> {
        self.last_terminal
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            phase: self.phase,
            name_input: self.name_input.clone(),
            session: self.session.clone(),
            body: self.body,
            obstacles: self.field.obstacles().to_vec(),
            last_terminal: self.last_terminal,
        }
    }

    /// Runs one frame: queued input events, then the gesture flap (if any), then the
    /// simulation when playing.
    pub fn tick<I>(&mut self, events: I, flap: bool, dt: Duration) -> Vec<Effect>
    where
        I: IntoIterator<Item = GameEvent>,
    {
        let mut effects = Vec::new();
        for event in events {
            self.handle_event(event, &mut effects);
        }
        if flap {
            self.handle_event(GameEvent::Flap, &mut effects);
        }
        if self.phase == GamePhase::Playing {
            self.simulate(dt, &mut effects);
        }
        effects
    }

    /// Applies a finished registration. Results for a generation that is no longer live
    /// (the player went back to the menu meanwhile) are dropped.
    pub fn apply_registration(&mut self, generation: u64, player_id: Option<i64>) -> bool {
        if generation != self.generation {
            log::debug!(
                "dropping registration for stale generation {generation} (live {})",
                self.generation
            );
            return false;
        }
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        session.player_id = player_id;
        match player_id {
            Some(id) => log::info!("registered {} as player {id}", session.username),
            None => log::info!("registration failed; {} plays offline", session.username),
        }
        true
    }

    pub fn handle_event(&mut self, event: GameEvent, effects: &mut Vec<Effect>) {
        let (next, effect) = self.phase.handle(event, self.name_ready());
        if next == self.phase && effect == PhaseEffect::None {
            if event == GameEvent::Confirm && self.phase == GamePhase::EnteringName {
                log::debug!("ignoring confirm with an empty name");
            }
            return;
        }
        if next != self.phase {
            log::info!("{:?} -> {:?} on {:?}", self.phase, next, event);
        }
        self.phase = next;

        match effect {
            PhaseEffect::None => {}
            PhaseEffect::StartSession => {
                let username = self.name_input.trim().to_string();
                self.generation += 1;
                self.session = Some(Session::new(username.clone(), None));
                self.reset_world();
                effects.push(Effect::RegisterPlayer {
                    generation: self.generation,
                    username,
                });
            }
            PhaseEffect::EndSession => {
                if let GameEvent::Collision(terminal) = event {
                    self.last_terminal = Some(terminal);
                }
                if let Some(session) = &self.session {
                    effects.push(Effect::SubmitScore {
                        player_id: session.player_id,
                        score: session.score,
                        duration: session.elapsed,
                    });
                }
                effects.push(Effect::FetchLeaderboard {
                    limit: self.config.network.leaderboard_limit,
                });
            }
            PhaseEffect::ReplaySession => {
                let (username, player_id) = match &self.session {
                    Some(s) => (s.username.clone(), s.player_id),
                    None => (self.name_input.trim().to_string(), None),
                };
                self.session = Some(Session::new(username, player_id));
                self.reset_world();
            }
            PhaseEffect::ReturnToMenu => {
                self.generation += 1;
                self.session = None;
                self.name_input.clear();
            }
            PhaseEffect::FlapBody => self.body.flap(&self.config.physics),
            PhaseEffect::EditName => self.edit_name(event),
        }
    }

    fn name_ready(&self) -> bool {
        !self.name_input.trim().is_empty()
    }

    fn edit_name(&mut self, event: GameEvent) {
        match event {
            GameEvent::Char(c) if !c.is_control() => {
                // Uppercasing can expand one char into several ('ß' -> "SS").
                let upper = c.to_uppercase();
                if self.name_input.chars().count() + upper.len() <= MAX_NAME_LEN {
                    self.name_input.extend(upper);
                }
            }
            GameEvent::Backspace => {
                self.name_input.pop();
            }
            _ => {}
        }
    }

    fn reset_world(&mut self) {
        self.body = PhysicsBody::spawn(&self.config.physics, &self.config.playfield);
        self.field.reset();
        self.last_terminal = None;
    }

    fn simulate(&mut self, dt: Duration, effects: &mut Vec<Effect>) {
        let step = self
            .body
            .step(dt, &self.config.physics, &self.config.playfield);
        self.field.update(dt);
        let points = self.field.award_points(self.body.leading_edge());

        if let Some(session) = self.session.as_mut() {
            session.elapsed = session.elapsed.saturating_add(dt);
            session.score += points;
        }

        if let Some(terminal) =
            collision::detect(&self.body, step, &self.field, &self.config.playfield)
        {
            self.handle_event(GameEvent::Collision(terminal), effects);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_phase_is_entering_name() {
        assert_eq!(GamePhase::default(), GamePhase::EnteringName);
    }

    #[test]
    fn confirm_without_name_is_ignored() {
        assert_eq!(
            GamePhase::EnteringName.handle(GameEvent::Confirm, false),
            (GamePhase::EnteringName, PhaseEffect::None)
        );
        assert_eq!(
            GamePhase::EnteringName.handle(GameEvent::Flap, false),
            (GamePhase::EnteringName, PhaseEffect::None)
        );
    }

    #[test]
    fn confirm_or_flap_with_name_starts_session() {
        for event in [GameEvent::Confirm, GameEvent::Flap] {
            assert_eq!(
                GamePhase::EnteringName.handle(event, true),
                (GamePhase::Playing, PhaseEffect::StartSession)
            );
        }
    }

    #[test]
    fn collision_only_ends_a_running_session() {
        let hit = GameEvent::Collision(Terminal::Obstacle);
        assert_eq!(
            GamePhase::Playing.handle(hit, true),
            (GamePhase::GameOver, PhaseEffect::EndSession)
        );
        assert_eq!(
            GamePhase::GameOver.handle(hit, true),
            (GamePhase::GameOver, PhaseEffect::None)
        );
        assert_eq!(
            GamePhase::EnteringName.handle(hit, true),
            (GamePhase::EnteringName, PhaseEffect::None)
        );
    }

    #[test]
    fn game_over_can_replay_or_return_to_menu() {
        assert_eq!(
            GamePhase::GameOver.handle(GameEvent::Flap, true),
            (GamePhase::Playing, PhaseEffect::ReplaySession)
        );
        assert_eq!(
            GamePhase::GameOver.handle(GameEvent::Cancel, true),
            (GamePhase::EnteringName, PhaseEffect::ReturnToMenu)
        );
        assert_eq!(
            GamePhase::GameOver.handle(GameEvent::Confirm, true),
            (GamePhase::GameOver, PhaseEffect::None)
        );
    }

    #[test]
    fn cancel_while_playing_is_ignored() {
        assert_eq!(
            GamePhase::Playing.handle(GameEvent::Cancel, true),
            (GamePhase::Playing, PhaseEffect::None)
        );
    }

    #[test]
    fn name_is_uppercased_and_capped() {
        let mut ctx = GameContext::new(GameConfig::default(), 1);
        let events = "abcdefghijklmnop".chars().map(GameEvent::Char);
        ctx.tick(events, false, Duration::ZERO);
        assert_eq!(ctx.name_input(), "ABCDEFGHIJKL");

        ctx.tick([GameEvent::Backspace, GameEvent::Char('\n')], false, Duration::ZERO);
        assert_eq!(ctx.name_input(), "ABCDEFGHIJK");
    }

    #[test]
    fn expanding_uppercase_never_exceeds_the_cap() {
        let mut ctx = GameContext::new(GameConfig::default(), 1);
        let events = "abcdefghijk".chars().chain(['ß']).map(GameEvent::Char);
        ctx.tick(events, false, Duration::ZERO);
        assert_eq!(ctx.name_input(), "ABCDEFGHIJK");

        ctx.tick([GameEvent::Backspace, GameEvent::Char('ß')], false, Duration::ZERO);
        assert_eq!(ctx.name_input(), "ABCDEFGHIJSS");
        assert_eq!(ctx.name_input().chars().count(), MAX_NAME_LEN);
    }

    #[test]
    fn stale_registration_is_dropped() {
        let mut ctx = GameContext::new(GameConfig::default(), 1);
        ctx.tick(
            [GameEvent::Char('A'), GameEvent::Confirm],
            false,
            Duration::ZERO,
        );
        let generation = ctx.generation();

        assert!(!ctx.apply_registration(generation - 1, Some(9)));
        assert_eq!(ctx.player_id(), None);
        assert!(ctx.apply_registration(generation, Some(9)));
        assert_eq!(ctx.player_id(), Some(9));
    }
}

use std::time::Duration;

use aero_engine::geometry::Rect;
use serde::{Deserialize, Serialize};

use crate::config::{ObstacleConfig, PlayfieldConfig};

/// One top/bottom pair. The pair is the scoring unit: it awards at most one point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub x: f32,
    pub width: f32,
    pub gap_top: f32,
    pub gap_height: f32,
    pub scored: bool,
}

impl Obstacle {
    pub fn trailing_edge(&self) -> f32 {
        self.x + self.width
    }

    pub fn gap_bottom(&self) -> f32 {
        self.gap_top + self.gap_height
    }

    pub fn top_rect(&self) -> Rect {
        Rect::new(self.x, 0.0, self.width, self.gap_top)
    }

    pub fn bottom_rect(&self, playfield_height: f32) -> Rect {
        let top = self.gap_bottom();
        Rect::new(self.x, top, self.width, (playfield_height - top).max(0.0))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObstacleField {
    config: ObstacleConfig,
    playfield: PlayfieldConfig,
    obstacles: Vec<Obstacle>,
    #[serde(with = "crate::serde_duration")]
    spawn_timer: Duration,
    rng: Rng,
}

impl ObstacleField {
    pub fn new(config: ObstacleConfig, playfield: PlayfieldConfig, seed: u64) -> Self {
        Self {
            config,
            playfield,
            obstacles: Vec::new(),
            spawn_timer: Duration::ZERO,
            rng: Rng::new(seed),
        }
    }

    /// Starts the field with pairs already on screen, in the given (spawn) order.
    pub fn with_obstacles<I>(mut self, obstacles: I) -> Self
    where
        I: IntoIterator<Item = Obstacle>,
    {
        self.obstacles.extend(obstacles);
        self
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn spawn_timer(&self) -> Duration {
        self.spawn_timer
    }

    pub fn config(&self) -> &ObstacleConfig {
        &self.config
    }

    /// Clears obstacles and the spawn timer. The generator keeps running, so a replay
    /// sees a fresh layout rather than the previous one.
    pub fn reset(&mut self) {
        self.obstacles.clear();
        self.spawn_timer = Duration::ZERO;
    }

    /// Advances the field by `dt`: spawns on the timer, scrolls, and culls off-screen pairs.
    pub fn update(&mut self, dt: Duration) {
        self.spawn_timer = self.spawn_timer.saturating_add(dt);
        if self.spawn_timer > self.config.spawn_interval {
            self.spawn_now();
            self.spawn_timer = Duration::ZERO;
        }

        let dx = self.config.speed * dt.as_secs_f32();
        for obstacle in &mut self.obstacles {
            obstacle.x -= dx;
        }
        self.obstacles.retain(|o| o.trailing_edge() >= 0.0);
    }

    /// Spawns one pair just past the right edge, with the gap placed uniformly at random
    /// between the top and bottom clearances.
    pub fn spawn_now(&mut self) -> Obstacle {
        let c = &self.config;
        let available = (self.playfield.height - c.gap_height - 2.0 * c.min_clearance).max(0.0);
        let gap_top = c.min_clearance + self.rng.next_unit() * available;
        let obstacle = Obstacle {
            x: self.playfield.width + c.spawn_offset,
            width: c.width,
            gap_top,
            gap_height: c.gap_height,
            scored: false,
        };
        self.obstacles.push(obstacle);
        obstacle
    }

    /// Awards at most one point per call: the first unscored pair (in spawn order) whose
    /// trailing edge has passed `leading_edge`.
    pub fn award_points(&mut self, leading_edge: f32) -> u32 {
        let passed = self
            .obstacles
            .iter_mut()
            .find(|o| !o.scored && o.trailing_edge() < leading_edge);
        match passed {
            Some(obstacle) => {
                obstacle.scored = true;
                1
            }
            None => 0,
        }
    }
}

/// xorshift64*. Seedable and stable across platforms.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Rng {
    state: u64,
}

impl Rng {
    fn new(seed: u64) -> Self {
        let seed = if seed == 0 {
            0x9E37_79B9_7F4A_7C15
        } else {
            seed
        };
        Self { state: seed }
    }

    fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        (x.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 32) as u32
    }

    /// Uniform in `[0, 1)`.
    fn next_unit(&mut self) -> f32 {
        // 24 bits keep every value exactly representable and strictly below 1.0.
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }
}

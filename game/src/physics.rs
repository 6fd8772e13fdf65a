use std::time::Duration;

use aero_engine::geometry::{Rect, Vec2};
use serde::{Deserialize, Serialize};

use crate::config::{PhysicsConfig, PlayfieldConfig};

/// Outcome of one integration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyStep {
    Airborne,
    /// The body reached the floor. This is terminal for the session; the body is left
    /// resting on the floor so it renders there on the game-over screen.
    HitFloor,
}

/// The player-controlled body. Position is its center; y grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsBody {
    pub position: Vec2,
    pub velocity_y: f32,
    pub radius: f32,
    pub rotation_deg: f32,
}

impl PhysicsBody {
    pub fn new(position: Vec2, radius: f32) -> Self {
        Self {
            position,
            velocity_y: 0.0,
            radius,
            rotation_deg: 0.0,
        }
    }

    /// A body at rest at its configured column, halfway down the playfield.
    pub fn spawn(physics: &PhysicsConfig, playfield: &PlayfieldConfig) -> Self {
        Self::new(
            Vec2::new(physics.body_x, playfield.height / 2.0),
            physics.body_radius,
        )
    }

    pub fn flap(&mut self, physics: &PhysicsConfig) {
        self.velocity_y = physics.flap_impulse;
    }

    pub fn step(
        &mut self,
        dt: Duration,
        physics: &PhysicsConfig,
        playfield: &PlayfieldConfig,
    ) -> BodyStep {
        let dt = dt.as_secs_f32();

        self.velocity_y = (self.velocity_y + physics.gravity * dt).min(physics.max_fall_speed);
        self.position.y += self.velocity_y * dt;

        let target = if self.velocity_y < 0.0 {
            physics.rise_angle_deg
        } else {
            physics.fall_angle_deg
        };
        self.rotation_deg += (target - self.rotation_deg) * physics.rotation_rate * dt;

        if self.top() <= 0.0 {
            self.position.y = self.radius;
            self.velocity_y = 0.0;
        }
        if self.bottom() >= playfield.height {
            self.position.y = playfield.height - self.radius;
            return BodyStep::HitFloor;
        }
        BodyStep::Airborne
    }

    pub fn top(&self) -> f32 {
        self.position.y - self.radius
    }

    pub fn bottom(&self) -> f32 {
        self.position.y + self.radius
    }

    /// The edge facing incoming obstacles (they scroll right to left).
    pub fn leading_edge(&self) -> f32 {
        self.position.x - self.radius
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(
            self.position.x - self.radius,
            self.top(),
            self.radius * 2.0,
            self.radius * 2.0,
        )
    }
}

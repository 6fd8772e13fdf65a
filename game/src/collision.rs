use serde::{Deserialize, Serialize};

use crate::config::PlayfieldConfig;
use crate::obstacles::ObstacleField;
use crate::physics::{BodyStep, PhysicsBody};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Terminal {
    Floor,
    Obstacle,
}

/// Tests the body against the floor and every obstacle pair.
///
/// Returns a single terminal condition even when several fire in the same frame; the floor
/// wins ties since it is checked first.
pub fn detect(
    body: &PhysicsBody,
    step: BodyStep,
    field: &ObstacleField,
    playfield: &PlayfieldConfig,
) -> Option<Terminal> {
    if step == BodyStep::HitFloor || body.bottom() >= playfield.height {
        return Some(Terminal::Floor);
    }

    let hit = field.obstacles().iter().any(|o| {
        o.top_rect().intersects_circle(body.position, body.radius)
            || o
                .bottom_rect(playfield.height)
                .intersects_circle(body.position, body.radius)
    });
    hit.then_some(Terminal::Obstacle)
}

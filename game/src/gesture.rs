//! Pinch gesture → flap events.
//!
//! The capture pipeline hands us one relative thumb/index distance per camera frame (or
//! nothing when no hand is visible). [`GestureSignalProcessor`] smooths it with an
//! exponential moving average and applies a two-threshold hysteresis so that one physical
//! pinch yields exactly one flap, no matter how many frames it spans.

use aero_engine::geometry::Vec2;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, GestureConfig};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GestureState {
    pub smoothed_distance: f32,
    pub is_pinching: bool,
}

/// Where the smoothed value sits relative to the thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GestureZone {
    Pinched,
    DeadZone,
    Open,
}

#[derive(Debug, Clone)]
pub struct GestureSignalProcessor {
    config: GestureConfig,
    state: GestureState,
}

impl GestureSignalProcessor {
    pub fn new(config: GestureConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            state: GestureState::default(),
        })
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    /// Feeds one sample and returns `true` if it produced a flap event.
    ///
    /// `None` means no hand was detected: the smoothed value and pinch state are kept as-is.
    pub fn process(&mut self, sample: Option<f32>) -> bool {
        let Some(distance) = sample else {
            return false;
        };
        if !distance.is_finite() {
            return false;
        }

        let alpha = self.config.alpha;
        let state = &mut self.state;
        state.smoothed_distance = if state.smoothed_distance == 0.0 {
            distance
        } else {
            alpha * distance + (1.0 - alpha) * state.smoothed_distance
        };

        if state.smoothed_distance < self.config.trigger {
            if !state.is_pinching {
                state.is_pinching = true;
                return true;
            }
        } else if state.smoothed_distance > self.config.release {
            state.is_pinching = false;
        }
        false
    }

    /// Feeds a batch of samples and returns how many flap events they produced.
    pub fn process_all<I>(&mut self, samples: I) -> usize
    where
        I: IntoIterator<Item = Option<f32>>,
    {
        samples
            .into_iter()
            .filter(|&sample| self.process(sample))
            .count()
    }

    pub fn zone(&self) -> GestureZone {
        let d = self.state.smoothed_distance;
        if d < self.config.trigger {
            GestureZone::Pinched
        } else if d > self.config.release {
            GestureZone::Open
        } else {
            GestureZone::DeadZone
        }
    }

    pub fn reset(&mut self) {
        self.state = GestureState::default();
    }
}

/// The four hand landmarks the pinch measurement needs, in normalized image coordinates
/// (`0..1` on both axes) together with the frame size they were detected in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HandLandmarks {
    pub wrist: Vec2,
    pub thumb_tip: Vec2,
    pub index_base: Vec2,
    pub index_tip: Vec2,
    pub frame_width: f32,
    pub frame_height: f32,
}

impl HandLandmarks {
    fn to_pixels(&self, p: Vec2) -> Vec2 {
        Vec2::new(p.x * self.frame_width, p.y * self.frame_height)
    }
}

/// Thumb-to-index distance as a percentage of the wrist-to-index-base length.
///
/// Normalizing by hand size makes the thresholds independent of how far the hand is from
/// the camera. A degenerate (zero) hand size is treated as one pixel.
pub fn pinch_distance(hand: &HandLandmarks) -> f32 {
    let tips = hand
        .to_pixels(hand.thumb_tip)
        .distance(hand.to_pixels(hand.index_tip));
    let mut hand_size = hand
        .to_pixels(hand.wrist)
        .distance(hand.to_pixels(hand.index_base));
    if hand_size == 0.0 {
        hand_size = 1.0;
    }
    tips / hand_size * 100.0
}

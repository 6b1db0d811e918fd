//! Live-tunable locomotion parameters.
//!
//! These are the values a remote operator may push at runtime; the
//! locomotion controller applies them at the next gait step.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::TalusError;
use crate::robot::GaitType;

/// Locomotion tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct LocomotionParams {
    /// Active gait pattern.
    pub gait: GaitType,
    /// Peak foot lift during swing (m).
    pub step_height: f32,
    /// Stride length at full speed (m).
    pub step_length: f32,
    /// Nominal body height above ground (m).
    pub body_height: f32,
    /// Maximum planar body speed (m/s).
    pub max_speed: f32,
    /// Maximum yaw rate (rad/s).
    pub max_yaw_rate: f32,
    /// Desired minimum stability margin in `[0, 1]`.
    pub stability_threshold: f32,
    /// Fixed integration step per gait tick (s).
    pub control_period_s: f32,
    /// Time allowed for the servos to reach a commanded pose (ms).
    pub tick_delay_ms: u64,
}

impl Default for LocomotionParams {
    fn default() -> Self {
        Self {
            gait: GaitType::Tripod,
            step_height: 0.04,
            step_length: 0.08,
            body_height: 0.12,
            max_speed: 0.25,
            max_yaw_rate: 0.6,
            stability_threshold: 0.25,
            control_period_s: 0.05,
            tick_delay_ms: 50,
        }
    }
}

impl LocomotionParams {
    /// Reject physically meaningless values before they reach the gait engine.
    pub fn validate(&self) -> Result<(), TalusError> {
        let positive = [
            ("step_height", self.step_height),
            ("step_length", self.step_length),
            ("body_height", self.body_height),
            ("max_speed", self.max_speed),
            ("max_yaw_rate", self.max_yaw_rate),
            ("control_period_s", self.control_period_s),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(TalusError::Config(format!("{name} must be positive, got {value}")));
            }
        }
        if !(0.0..=1.0).contains(&self.stability_threshold) {
            return Err(TalusError::Config(format!(
                "stability_threshold must be within [0, 1], got {}",
                self.stability_threshold
            )));
        }
        Ok(())
    }
}

/// JSON schema of [`LocomotionParams`], for remote configuration clients.
pub fn locomotion_params_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(LocomotionParams)
}

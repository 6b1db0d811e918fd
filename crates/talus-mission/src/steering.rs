//! Waypoint steering: turns the next waypoint into a body [`Velocity`].
//!
//! Heading is closed with a [`HeadingController`], a PID whose error is the
//! wrapped bearing difference.  Forward speed falls off with heading error
//! and, near the goal, with remaining distance.
//!
//! # Example
//!
//! ```rust
//! use talus_mission::steering::{Steering, SteeringConfig};
//! use talus_types::Pose;
//!
//! let mut steering = Steering::new(SteeringConfig::default());
//! let here = Pose::new(0.0, 0.0, 0.0);
//!
//! // Straight ahead: full speed, no turn.
//! let v = steering.command(&here, &Pose::new(2.0, 0.0, 0.0), 2.0, 0.25, 0.05);
//! assert!((v.linear.x - 0.25).abs() < 1e-4);
//! assert!(v.angular.z.abs() < 1e-4);
//!
//! // Behind us: turn on the spot.
//! let v = steering.command(&here, &Pose::new(-1.0, 0.1, 0.0), 1.0, 0.25, 0.05);
//! assert_eq!(v.linear.x, 0.0);
//! assert!(v.angular.z > 0.0);
//! ```

use serde::{Deserialize, Serialize};
use talus_types::{Pose, Velocity, wrap_angle};

/// PID on heading error.  Errors are wrapped to `[-π, π]` so the robot
/// always turns the short way round.
#[derive(Debug, Clone)]
pub struct HeadingController {
    kp: f32,
    ki: f32,
    kd: f32,
    integral: f32,
    last_error: Option<f32>,
    limit: f32,
}

impl HeadingController {
    /// Output is clamped to `[-limit, limit]` (rad/s).
    pub fn new(kp: f32, ki: f32, kd: f32, limit: f32) -> Self {
        Self {
            kp,
            ki,
            kd,
            integral: 0.0,
            last_error: None,
            limit: limit.abs(),
        }
    }

    pub fn set_limit(&mut self, limit: f32) {
        self.limit = limit.abs();
    }

    /// Yaw rate that turns `heading` towards `target`.  Returns `0.0`
    /// without touching state when `dt` is not positive.
    pub fn update(&mut self, target: f32, heading: f32, dt: f32) -> f32 {
        if dt <= 0.0 {
            return 0.0;
        }
        let error = wrap_angle(target - heading);

        let p = self.kp * error;

        self.integral += error * dt;
        let i = (self.ki * self.integral).clamp(-self.limit, self.limit);
        if self.ki.abs() > f32::EPSILON {
            self.integral = i / self.ki;
        }

        // Derivative on the wrapped difference so a ±π crossing is not a spike.
        let d = match self.last_error {
            Some(prev) => self.kd * wrap_angle(error - prev) / dt,
            None => 0.0,
        };
        self.last_error = Some(error);

        (p + i + d).clamp(-self.limit, self.limit)
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Yaw-rate cap handed to the heading controller (rad/s).
    pub max_yaw_rate: f32,
    /// Heading error above which the robot turns in place (rad).
    pub turn_in_place_rad: f32,
    /// Distance to goal below which speed ramps down (m).
    pub braking_distance: f32,
    /// Floor of the braking ramp, as a fraction of the speed cap.
    pub min_speed_fraction: f32,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            kp: 1.5,
            ki: 0.0,
            kd: 0.05,
            max_yaw_rate: 0.6,
            turn_in_place_rad: std::f32::consts::FRAC_PI_4,
            braking_distance: 0.5,
            min_speed_fraction: 0.2,
        }
    }
}

pub struct Steering {
    config: SteeringConfig,
    heading: HeadingController,
}

impl Steering {
    pub fn new(config: SteeringConfig) -> Self {
        Self {
            heading: HeadingController::new(config.kp, config.ki, config.kd, config.max_yaw_rate),
            config,
        }
    }

    pub fn config(&self) -> &SteeringConfig {
        &self.config
    }

    /// Velocity that drives `pose` towards `waypoint`.
    ///
    /// `goal_distance` is the remaining distance to the final goal and
    /// drives braking; `speed_cap` is the forward speed limit (m/s).
    pub fn command(
        &mut self,
        pose: &Pose,
        waypoint: &Pose,
        goal_distance: f32,
        speed_cap: f32,
        dt: f32,
    ) -> Velocity {
        let bearing = pose.bearing_to(waypoint);
        let error = wrap_angle(bearing - pose.orientation.yaw);
        let yaw_rate = self.heading.update(bearing, pose.orientation.yaw, dt);

        if error.abs() > self.config.turn_in_place_rad {
            return Velocity::planar(0.0, yaw_rate);
        }

        let braking = if self.config.braking_distance > 0.0 {
            (goal_distance / self.config.braking_distance).clamp(self.config.min_speed_fraction, 1.0)
        } else {
            1.0
        };
        let forward = speed_cap.max(0.0) * braking * error.cos().max(0.0);
        Velocity::planar(forward, yaw_rate)
    }

    /// Forget integral and derivative memory, e.g. on a new goal.
    pub fn reset(&mut self) {
        self.heading.reset();
    }
}

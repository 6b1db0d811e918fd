//! Planar/spatial primitives shared by every Talus crate.
//!
//! All quantities are SI: metres, radians, seconds.  The world frame is
//! right-handed with +Z up; yaw is measured counter-clockwise from +X.

use std::f32::consts::PI;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A 3-D vector (position, offset or rate).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Create a new vector.
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean length.
    pub fn norm(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Length of the XY projection.
    pub fn planar_norm(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Component-wise sum.
    pub fn add(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    /// Component-wise difference `self - other`.
    pub fn sub(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    /// Uniform scale.
    pub fn scale(&self, k: f32) -> Vec3 {
        Vec3::new(self.x * k, self.y * k, self.z * k)
    }
}

/// Body attitude as roll/pitch/yaw (radians).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Orientation {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

/// Position plus orientation of the robot body (or of a navigation target).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Orientation,
}

impl Pose {
    /// Pose at `(x, y, z)` with level attitude and zero yaw.
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: Vec3::new(x, y, z),
            orientation: Orientation::default(),
        }
    }

    /// Builder-style yaw override.
    pub fn with_yaw(mut self, yaw: f32) -> Self {
        self.orientation.yaw = yaw;
        self
    }

    /// Distance to `other` ignoring height.
    pub fn planar_distance_to(&self, other: &Pose) -> f32 {
        let dx = other.position.x - self.position.x;
        let dy = other.position.y - self.position.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// World-frame bearing from this pose towards `other`.
    pub fn bearing_to(&self, other: &Pose) -> f32 {
        (other.position.y - self.position.y).atan2(other.position.x - self.position.x)
    }
}

/// Commanded or measured body velocity.
///
/// `linear` is expressed in the body frame (+X forward); `angular.z` is the
/// yaw rate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Velocity {
    pub linear: Vec3,
    pub angular: Vec3,
}

impl Velocity {
    /// All-zero command.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Forward speed plus yaw rate, the usual output of the steering law.
    pub fn planar(forward: f32, yaw_rate: f32) -> Self {
        Self {
            linear: Vec3::new(forward, 0.0, 0.0),
            angular: Vec3::new(0.0, 0.0, yaw_rate),
        }
    }

    /// Horizontal speed magnitude.
    pub fn planar_speed(&self) -> f32 {
        self.linear.planar_norm()
    }

    /// `true` when every component is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.linear == Vec3::ZERO && self.angular == Vec3::ZERO
    }
}

/// Wrap an angle into `[-π, π)`.
pub fn wrap_angle(angle: f32) -> f32 {
    let two_pi = 2.0 * PI;
    let mut a = (angle + PI) % two_pi;
    if a < 0.0 {
        a += two_pi;
    }
    a - PI
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_distance_ignores_height() {
        let a = Pose::new(0.0, 0.0, 0.0);
        let b = Pose::new(3.0, 4.0, 10.0);
        assert!((a.planar_distance_to(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn bearing_points_towards_target() {
        let a = Pose::new(1.0, 1.0, 0.0);
        let b = Pose::new(1.0, 2.0, 0.0);
        assert!((a.bearing_to(&b) - PI / 2.0).abs() < 1e-6);
    }

    #[test]
    fn wrap_angle_stays_in_range() {
        for k in -20..20 {
            let a = wrap_angle(k as f32 * 0.7);
            assert!((-PI..PI).contains(&a), "{a} out of range");
        }
        assert!((wrap_angle(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-5);
    }

    #[test]
    fn planar_velocity_helpers() {
        let v = Velocity::planar(0.2, 0.1);
        assert!((v.planar_speed() - 0.2).abs() < 1e-6);
        assert!(!v.is_zero());
        assert!(Velocity::zero().is_zero());
    }
}

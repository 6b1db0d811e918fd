//! Robot body state: legs, operating mode, sensor pod snapshot.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::geometry::{Pose, Vec3, Velocity};

/// Number of legs on the chassis.
pub const LEG_COUNT: usize = 6;

/// Leg identifiers, numbered 0..5 front-to-rear on the left side, then the
/// right side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LegId {
    FrontLeft,
    MiddleLeft,
    RearLeft,
    FrontRight,
    MiddleRight,
    RearRight,
}

impl LegId {
    /// Every leg in index order.
    pub const ALL: [LegId; LEG_COUNT] = [
        LegId::FrontLeft,
        LegId::MiddleLeft,
        LegId::RearLeft,
        LegId::FrontRight,
        LegId::MiddleRight,
        LegId::RearRight,
    ];

    /// Zero-based index of this leg.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Inverse of [`LegId::index`].
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn is_left(self) -> bool {
        self.index() < 3
    }
}

/// Joint angles of one leg (radians).
///
/// - `coxa`: hip yaw, zero pointing radially outward from the hip mount.
/// - `femur`: thigh elevation above horizontal.
/// - `tibia`: shin angle relative to the femur; 0 is a straight leg,
///   negative folds the foot downward.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JointAngles {
    pub coxa: f32,
    pub femur: f32,
    pub tibia: f32,
}

/// One leg as seen by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub id: LegId,
    pub angles: JointAngles,
    /// Foot position in the body frame (metres).
    pub foot_position: Vec3,
    pub grounded: bool,
}

/// Operational mode of the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotMode {
    #[default]
    Idle,
    Walking,
    Climbing,
    Inspection,
    Deployment,
    Emergency,
}

impl fmt::Display for RobotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RobotMode::Idle => "idle",
            RobotMode::Walking => "walking",
            RobotMode::Climbing => "climbing",
            RobotMode::Inspection => "inspection",
            RobotMode::Deployment => "deployment",
            RobotMode::Emergency => "emergency",
        };
        f.write_str(s)
    }
}

/// Gait pattern selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum GaitType {
    /// Two alternating tripods; fastest, least stable.
    #[default]
    Tripod,
    /// One leg at a time; slowest, most stable.
    Wave,
    /// Diagonal pairs in three phases.
    Ripple,
}

impl fmt::Display for GaitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GaitType::Tripod => write!(f, "tripod"),
            GaitType::Wave => write!(f, "wave"),
            GaitType::Ripple => write!(f, "ripple"),
        }
    }
}

impl FromStr for GaitType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tripod" => Ok(GaitType::Tripod),
            "wave" => Ok(GaitType::Wave),
            "ripple" => Ok(GaitType::Ripple),
            other => Err(format!("unknown gait type: {other}")),
        }
    }
}

/// Latest reading from the on-board sensor pod.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    /// Normalised inclinometer outputs in `[-1, 1]`.
    pub tilt_x: f32,
    pub tilt_y: f32,
    /// Accelerometer (m/s²).
    pub accel: Vec3,
    /// Gyroscope (rad/s).
    pub gyro: Vec3,
    /// Ambient temperature (°C).
    pub temperature_c: f32,
    /// Relative humidity (%).
    pub humidity_percent: f32,
    /// Pack cell voltage (V).
    pub battery_voltage: f32,
    /// State of charge (%).
    pub battery_percent: f32,
    pub timestamp: DateTime<Utc>,
}

impl Default for SensorSnapshot {
    fn default() -> Self {
        Self {
            tilt_x: 0.0,
            tilt_y: 0.0,
            accel: Vec3::new(0.0, 0.0, 9.81),
            gyro: Vec3::ZERO,
            temperature_c: 20.0,
            humidity_percent: 50.0,
            battery_voltage: 3.7,
            battery_percent: 100.0,
            timestamp: Utc::now(),
        }
    }
}

impl SensorSnapshot {
    /// Build a snapshot from a raw cell voltage, deriving the state of charge.
    pub fn with_battery_voltage(mut self, voltage: f32) -> Self {
        self.battery_voltage = voltage;
        self.battery_percent = battery_percent_from_voltage(voltage);
        self
    }
}

/// LiFePO4 discharge curve, stepwise.
pub fn battery_percent_from_voltage(voltage: f32) -> f32 {
    match voltage {
        v if v >= 3.7 => 100.0,
        v if v >= 3.5 => 80.0,
        v if v >= 3.3 => 60.0,
        v if v >= 3.2 => 40.0,
        v if v >= 3.1 => 20.0,
        v if v >= 3.0 => 10.0,
        _ => 0.0,
    }
}

/// Full robot state.  Owned by the locomotion controller; everybody else
/// receives clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotState {
    pub pose: Pose,
    pub velocity: Velocity,
    pub legs: [Leg; LEG_COUNT],
    /// State of charge (%).
    pub battery_level: f32,
    pub mode: RobotMode,
    pub sensors: SensorSnapshot,
    pub timestamp: DateTime<Utc>,
}

impl RobotState {
    /// Number of legs currently in ground contact.
    pub fn grounded_legs(&self) -> usize {
        self.legs.iter().filter(|l| l.grounded).count()
    }
}

//! `talus-types` – shared data model for the Talus hexapod control stack.
//!
//! # Modules
//!
//! - [`geometry`] – [`Vec3`], [`Pose`], [`Velocity`] and angle helpers.
//! - [`robot`] – legs, [`RobotMode`], [`GaitType`], [`SensorSnapshot`] and
//!   the single-writer [`RobotState`].
//! - [`params`] – [`LocomotionParams`], the live-tunable locomotion settings.
//! - [`navigation`] – goals, obstacles and [`NavigationStatus`].
//! - [`mission`] – [`Mission`], inspection areas and findings.
//!
//! The crate root holds the workspace-wide [`TalusError`], the
//! [`SafetyCondition`] taxonomy, and the [`Event`] envelope routed over the
//! middleware bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod geometry;
pub mod mission;
pub mod navigation;
pub mod params;
pub mod robot;

pub use geometry::{Orientation, Pose, Vec3, Velocity, wrap_angle};
pub use mission::{AreaOutcome, Finding, FindingKind, InspectionArea, Mission, MissionStatus, MissionType};
pub use navigation::{
    GoalConstraints, GoalType, NavigationGoal, NavigationState, NavigationStatus, Obstacle,
    ObstacleType,
};
pub use params::{LocomotionParams, locomotion_params_schema};
pub use robot::{
    GaitType, JointAngles, LEG_COUNT, Leg, LegId, RobotMode, RobotState, SensorSnapshot,
    battery_percent_from_voltage,
};

/// A safety condition that forced the mission controller to intervene.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum SafetyCondition {
    /// Battery below the return-to-base threshold (percent).
    CriticalBattery { level: f32 },
    /// Stability margin below the critical threshold.
    StabilityLoss { margin: f32 },
    /// A cliff edge was detected within range (metres from the body).
    CliffEdge { distance: f32 },
}

impl std::fmt::Display for SafetyCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SafetyCondition::CriticalBattery { level } => {
                write!(f, "critical battery ({level:.0}%)")
            }
            SafetyCondition::StabilityLoss { margin } => {
                write!(f, "stability loss (margin {margin:.3})")
            }
            SafetyCondition::CliffEdge { distance } => {
                write!(f, "cliff edge {distance:.2} m away")
            }
        }
    }
}

/// Unified event wrapper for the middleware bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"talus-mission::controller"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp a payload with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Telemetry(TelemetryData),
    SafetyFault(SafetyCondition),
    MissionStatusChanged {
        mission_id: Uuid,
        status: MissionStatus,
    },
    Finding(Finding),
    NavigationFailed {
        reason: String,
    },
}

/// Compact per-iteration telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryData {
    pub pose: Pose,
    pub battery_level: f32,
    pub mode: RobotMode,
    pub stability_margin: f32,
    pub navigation_state: NavigationState,
}

/// Workspace-wide error type.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TalusError {
    #[error("Emergency stop latched; reset required")]
    EmergencyStopLatched,

    #[error("Movement failed: {0}")]
    MovementFailed(String),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("No path found: {0}")]
    NoPathFound(String),

    #[error("Planning timed out after {expansions} expansions")]
    PlanningTimeout { expansions: usize },

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Mission rejected: {0}")]
    MissionRejected(String),

    #[error("{collaborator} timed out after {seconds:.1} s")]
    CollaboratorTimeout { collaborator: String, seconds: f32 },

    #[error("{collaborator} failed: {details}")]
    Collaborator { collaborator: String, details: String },

    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "talus-mission::controller",
            EventPayload::Telemetry(TelemetryData {
                pose: Pose::new(1.0, 2.0, 0.12),
                battery_level: 80.0,
                mode: RobotMode::Walking,
                stability_margin: 0.4,
                navigation_state: NavigationState::Executing,
            }),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.source, back.source);
        match back.payload {
            EventPayload::Telemetry(t) => assert_eq!(t.mode, RobotMode::Walking),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn safety_condition_serialises_with_tag() {
        let json = serde_json::to_string(&SafetyCondition::CliffEdge { distance: 0.4 }).unwrap();
        assert!(json.contains("\"condition\":\"cliff_edge\""));
        let back: SafetyCondition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SafetyCondition::CliffEdge { distance: 0.4 });
    }

    #[test]
    fn talus_error_display() {
        let err = TalusError::HardwareFault {
            component: "leg_3".to_string(),
            details: "servo stall".to_string(),
        };
        assert!(err.to_string().contains("leg_3"));
        assert!(TalusError::EmergencyStopLatched.to_string().contains("Emergency stop"));

        let err = TalusError::CollaboratorTimeout {
            collaborator: "vision".to_string(),
            seconds: 2.0,
        };
        assert_eq!(err.to_string(), "vision timed out after 2.0 s");
    }

    #[test]
    fn safety_condition_display() {
        let s = SafetyCondition::CriticalBattery { level: 15.0 }.to_string();
        assert!(s.contains("15%"));
    }
}

//! Missions, inspection areas and findings.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::Pose;
use crate::robot::SensorSnapshot;

/// What a mission does at each area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionType {
    /// Visit the areas repeatedly, keeping them fresh.
    Patrol,
    /// Visit each area once and record a finding.
    Inspection,
    /// Visit each area and place a sensor there.
    SensorDeployment,
    /// Rush to the first area at full priority and hold position.
    EmergencyResponse,
}

/// Mission lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    #[default]
    Planned,
    Active,
    Paused,
    Completed,
    Aborted,
}

impl MissionStatus {
    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: MissionStatus) -> bool {
        use MissionStatus::*;
        matches!(
            (self, next),
            (Planned, Active)
                | (Active, Paused)
                | (Paused, Active)
                | (Active, Completed)
                | (Planned | Active | Paused, Aborted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MissionStatus::Completed | MissionStatus::Aborted)
    }
}

impl fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MissionStatus::Planned => "planned",
            MissionStatus::Active => "active",
            MissionStatus::Paused => "paused",
            MissionStatus::Completed => "completed",
            MissionStatus::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Per-area result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaOutcome {
    #[default]
    Pending,
    Inspected,
    /// Could not be reached; the mission moved on.
    Skipped,
    /// Reached, but the sensor deployment failed or timed out.
    DeploymentFailed,
}

/// One place on the slope the mission cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionArea {
    pub id: String,
    pub name: String,
    pub centre: Pose,
    /// Arrival radius (m).
    pub radius: f32,
    /// Sensor to place here for deployment missions.
    #[serde(default)]
    pub sensor_type: Option<String>,
    #[serde(default)]
    pub last_inspected: Option<DateTime<Utc>>,
    #[serde(default)]
    pub outcome: AreaOutcome,
}

impl InspectionArea {
    pub fn new(id: impl Into<String>, centre: Pose) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            centre,
            radius: 0.3,
            sensor_type: None,
            last_inspected: None,
            outcome: AreaOutcome::Pending,
        }
    }

    pub fn with_sensor(mut self, sensor_type: impl Into<String>) -> Self {
        self.sensor_type = Some(sensor_type.into());
        self
    }

    /// `true` when the area was inspected within `window_s` seconds of `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, window_s: f64) -> bool {
        match self.last_inspected {
            Some(t) => (now - t).num_milliseconds() as f64 / 1000.0 <= window_s,
            None => false,
        }
    }
}

/// Category of a mission finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    AreaInspected,
    SensorDeployed,
    DeploymentFailed,
    AreaUnreachable,
    SafetyEvent,
}

/// Something the mission observed or did, kept for the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub area_id: Option<String>,
    pub kind: FindingKind,
    pub pose: Pose,
    pub sensors: SensorSnapshot,
    pub note: String,
    pub timestamp: DateTime<Utc>,
}

/// A mission owned by the mission controller for its lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: Uuid,
    pub mission_type: MissionType,
    pub areas: Vec<InspectionArea>,
    pub priority: u8,
    #[serde(default)]
    pub status: MissionStatus,
    #[serde(default)]
    pub progress: f32,
    #[serde(default)]
    pub findings: Vec<Finding>,
    pub created_at: DateTime<Utc>,
}

impl Mission {
    pub fn new(mission_type: MissionType, areas: Vec<InspectionArea>) -> Self {
        Self {
            id: Uuid::new_v4(),
            mission_type,
            areas,
            priority: 1,
            status: MissionStatus::Planned,
            progress: 0.0,
            findings: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Index of the first area still [`AreaOutcome::Pending`].
    pub fn next_pending_area(&self) -> Option<usize> {
        self.areas
            .iter()
            .position(|a| a.outcome == AreaOutcome::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions() {
        use MissionStatus::*;
        assert!(Planned.can_transition_to(Active));
        assert!(Active.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Active));
        assert!(Active.can_transition_to(Completed));
        assert!(Paused.can_transition_to(Aborted));
        assert!(Planned.can_transition_to(Aborted));
    }

    #[test]
    fn illegal_transitions() {
        use MissionStatus::*;
        assert!(!Planned.can_transition_to(Paused));
        assert!(!Completed.can_transition_to(Active));
        assert!(!Aborted.can_transition_to(Active));
        assert!(!Paused.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Aborted));
    }

    #[test]
    fn freshness_window() {
        let mut area = InspectionArea::new("a", Pose::default());
        let now = Utc::now();
        assert!(!area.is_fresh(now, 60.0));
        area.last_inspected = Some(now - chrono::Duration::seconds(30));
        assert!(area.is_fresh(now, 60.0));
        assert!(!area.is_fresh(now, 10.0));
    }

    #[test]
    fn next_pending_skips_handled_areas() {
        let mut mission = Mission::new(
            MissionType::Inspection,
            vec![
                InspectionArea::new("a", Pose::default()),
                InspectionArea::new("b", Pose::default()),
            ],
        );
        assert_eq!(mission.next_pending_area(), Some(0));
        mission.areas[0].outcome = AreaOutcome::Skipped;
        assert_eq!(mission.next_pending_area(), Some(1));
        mission.areas[1].outcome = AreaOutcome::Inspected;
        assert_eq!(mission.next_pending_area(), None);
    }
}

//! Mission description files for `talus run`.
//!
//! ```toml
//! mission_type = "sensor_deployment"
//! priority = 3
//!
//! [[areas]]
//! id = "north-ridge"
//! x = 1.2
//! y = 0.4
//! sensor_type = "geophone"
//!
//! [sim]
//! deployment_polls = 2
//!
//! [[sim.obstacles]]
//! id = "boulder"
//! kind = "rock"
//! x = 0.6
//! y = 0.2
//! ```
//!
//! The optional `[sim]` table scripts the simulated collaborators: the
//! listed obstacles are reported by the simulated camera on every capture.

use std::fs;
use std::path::Path;

use chrono::Utc;
use serde::Deserialize;
use talus_mission::{VisionFeature, VisionFrame};
use talus_types::{InspectionArea, Mission, MissionType, ObstacleType, Pose, Vec3};

#[derive(Debug, Clone, Deserialize)]
pub struct MissionFile {
    pub mission_type: MissionType,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub areas: Vec<AreaSpec>,
    #[serde(default)]
    pub sim: SimSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AreaSpec {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub radius: Option<f32>,
    #[serde(default)]
    pub sensor_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimSpec {
    /// Polls before a simulated deployment reports completion.
    pub deployment_polls: usize,
    pub obstacles: Vec<ObstacleSpec>,
}

impl Default for SimSpec {
    fn default() -> Self {
        Self {
            deployment_polls: 1,
            obstacles: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObstacleSpec {
    pub id: String,
    #[serde(default = "default_kind")]
    pub kind: ObstacleType,
    pub x: f32,
    pub y: f32,
    /// Square footprint edge (m).
    #[serde(default = "default_size")]
    pub size: f32,
    #[serde(default)]
    pub severity: f32,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_priority() -> u8 {
    1
}

fn default_kind() -> ObstacleType {
    ObstacleType::Rock
}

fn default_size() -> f32 {
    0.2
}

fn default_confidence() -> f32 {
    1.0
}

pub fn load(path: &Path) -> Result<MissionFile, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read mission file {}: {e}", path.display()))?;
    parse(&raw)
}

pub fn parse(raw: &str) -> Result<MissionFile, String> {
    let file: MissionFile =
        toml::from_str(raw).map_err(|e| format!("Failed to parse mission file: {e}"))?;
    if file.areas.is_empty() {
        return Err("Mission file lists no areas".to_string());
    }
    if let Some(area) = file.areas.iter().find(|a| !a.x.is_finite() || !a.y.is_finite()) {
        return Err(format!("Area '{}' has a non-finite position", area.id));
    }
    Ok(file)
}

impl MissionFile {
    pub fn to_mission(&self) -> Mission {
        let areas = self.areas.iter().map(AreaSpec::to_area).collect();
        let mut mission = Mission::new(self.mission_type, areas);
        mission.priority = self.priority;
        mission
    }

    /// The frame the simulated camera repeats on every capture.
    pub fn sim_frame(&self) -> VisionFrame {
        VisionFrame {
            features: self.sim.obstacles.iter().map(ObstacleSpec::to_feature).collect(),
            timestamp: Some(Utc::now()),
        }
    }
}

impl AreaSpec {
    fn to_area(&self) -> InspectionArea {
        let mut area = InspectionArea::new(self.id.clone(), Pose::new(self.x, self.y, 0.0));
        if let Some(name) = &self.name {
            area.name = name.clone();
        }
        if let Some(radius) = self.radius.filter(|r| *r > 0.0) {
            area.radius = radius;
        }
        if let Some(sensor) = &self.sensor_type {
            area = area.with_sensor(sensor.clone());
        }
        area
    }
}

impl ObstacleSpec {
    fn to_feature(&self) -> VisionFeature {
        VisionFeature {
            id: self.id.clone(),
            kind: self.kind,
            position: Some(Vec3::new(self.x, self.y, 0.0)),
            size: Vec3::new(self.size, self.size, self.size),
            severity: self.severity,
            confidence: self.confidence,
        }
    }
}

//! Seams towards the vision pipeline and the sensor-deployment subsystem.
//!
//! Both collaborators are slow and can hang, so the mission controller
//! never awaits them directly: every call goes through [`with_timeout`],
//! which turns an overrun into [`TalusError::CollaboratorTimeout`].
//!
//! The vision seam only matters here for two things: obstacles to feed the
//! planner ([`extract_obstacles`]) and cliff edges to stop for
//! ([`nearest_cliff`]).

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use talus_types::{Obstacle, ObstacleType, Pose, TalusError, Vec3};

// ────────────────────────────────────────────────────────────────────────────
// Vision
// ────────────────────────────────────────────────────────────────────────────

/// One detected terrain feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionFeature {
    pub id: String,
    pub kind: ObstacleType,
    /// World position, when the detector could range the feature.
    pub position: Option<Vec3>,
    /// Full extents (m).
    pub size: Vec3,
    /// How dangerous the feature is, `[0, 1]`.
    pub severity: f32,
    pub confidence: f32,
}

/// Everything the vision pipeline saw in one cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VisionFrame {
    pub features: Vec<VisionFeature>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait VisionSource: Send {
    fn name(&self) -> &str;

    /// Latest detections around `pose`.
    async fn capture(&mut self, pose: &Pose) -> Result<VisionFrame, TalusError>;
}

/// Features with a world position and enough confidence, as planner
/// obstacles.  Features without a position cannot be placed on the grid and
/// are dropped.
pub fn extract_obstacles(frame: &VisionFrame, min_confidence: f32) -> Vec<Obstacle> {
    let timestamp = frame.timestamp.unwrap_or_else(Utc::now);
    frame
        .features
        .iter()
        .filter(|f| f.confidence >= min_confidence)
        .filter_map(|f| {
            f.position.map(|position| Obstacle {
                id: f.id.clone(),
                position,
                size: f.size,
                obstacle_type: f.kind,
                confidence: f.confidence,
                timestamp,
            })
        })
        .collect()
}

/// Planar distance to the nearest cliff edge at least `min_severity` severe
/// and within `range` of `pose`.
///
/// A severe cliff edge the detector could not range is assumed to be right
/// here (distance 0).
pub fn nearest_cliff(frame: &VisionFrame, pose: &Pose, min_severity: f32, range: f32) -> Option<f32> {
    frame
        .features
        .iter()
        .filter(|f| f.kind == ObstacleType::CliffEdge && f.severity >= min_severity)
        .map(|f| match f.position {
            Some(p) => pose.planar_distance_to(&Pose::new(p.x, p.y, p.z)),
            None => 0.0,
        })
        .filter(|d| *d <= range)
        .min_by(f32::total_cmp)
}

// ────────────────────────────────────────────────────────────────────────────
// Sensor deployment
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStatus {
    InProgress,
    Completed,
    Failed(String),
}

#[async_trait]
pub trait DeploymentSubsystem: Send {
    fn name(&self) -> &str;

    /// Begin placing a `sensor_type` sensor at `location`.
    async fn start(&mut self, sensor_type: &str, location: &Pose) -> Result<(), TalusError>;

    /// Progress of the deployment started last.
    async fn poll(&mut self) -> Result<DeploymentStatus, TalusError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Timeout wrapper
// ────────────────────────────────────────────────────────────────────────────

/// Await `call`, failing closed after `limit`.
pub async fn with_timeout<T, F>(collaborator: &str, limit: Duration, call: F) -> Result<T, TalusError>
where
    F: Future<Output = Result<T, TalusError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(TalusError::CollaboratorTimeout {
            collaborator: collaborator.to_string(),
            seconds: limit.as_secs_f32(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(kind: ObstacleType, position: Option<Vec3>, severity: f32, confidence: f32) -> VisionFeature {
        VisionFeature {
            id: format!("{kind:?}"),
            kind,
            position,
            size: Vec3::new(0.3, 0.3, 0.2),
            severity,
            confidence,
        }
    }

    #[test]
    fn obstacles_need_position_and_confidence() {
        let frame = VisionFrame {
            features: vec![
                feature(ObstacleType::Rock, Some(Vec3::new(1.0, 0.0, 0.0)), 0.2, 0.9),
                feature(ObstacleType::Debris, None, 0.2, 0.9),
                feature(ObstacleType::Vegetation, Some(Vec3::new(2.0, 0.0, 0.0)), 0.1, 0.2),
            ],
            timestamp: None,
        };
        let obstacles = extract_obstacles(&frame, 0.5);
        assert_eq!(obstacles.len(), 1);
        assert_eq!(obstacles[0].obstacle_type, ObstacleType::Rock);
    }

    #[test]
    fn cliff_detection_respects_severity_and_range() {
        let pose = Pose::new(0.0, 0.0, 0.0);
        let frame = VisionFrame {
            features: vec![
                feature(ObstacleType::CliffEdge, Some(Vec3::new(3.0, 0.0, 0.0)), 0.9, 0.9),
                feature(ObstacleType::CliffEdge, Some(Vec3::new(0.5, 0.0, 0.0)), 0.3, 0.9),
                feature(ObstacleType::Rock, Some(Vec3::new(0.2, 0.0, 0.0)), 1.0, 0.9),
            ],
            timestamp: None,
        };
        assert_eq!(nearest_cliff(&frame, &pose, 0.7, 1.0), None);
        assert_eq!(nearest_cliff(&frame, &pose, 0.7, 5.0), Some(3.0));
        assert_eq!(nearest_cliff(&frame, &pose, 0.2, 5.0), Some(0.5));
    }

    #[test]
    fn unranged_severe_cliff_is_immediate() {
        let frame = VisionFrame {
            features: vec![feature(ObstacleType::CliffEdge, None, 0.95, 0.8)],
            timestamp: None,
        };
        assert_eq!(nearest_cliff(&frame, &Pose::default(), 0.7, 1.0), Some(0.0));
    }

    #[tokio::test]
    async fn timeout_fails_closed() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, TalusError>(())
        };
        let err = with_timeout("vision", Duration::from_millis(20), slow)
            .await
            .unwrap_err();
        assert!(matches!(err, TalusError::CollaboratorTimeout { ref collaborator, .. } if collaborator == "vision"));
    }

    #[tokio::test]
    async fn timeout_passes_results_through() {
        let fast = async { Ok::<_, TalusError>(7) };
        assert_eq!(with_timeout("x", Duration::from_secs(1), fast).await.unwrap(), 7);

        let failing = async {
            Err::<(), _>(TalusError::Collaborator {
                collaborator: "x".to_string(),
                details: "boom".to_string(),
            })
        };
        assert!(matches!(
            with_timeout("x", Duration::from_secs(1), failing).await,
            Err(TalusError::Collaborator { .. })
        ));
    }
}

//! Navigation goals, obstacles and planner status.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::{Pose, Vec3};

/// Why the robot is travelling somewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    InspectionArea,
    SensorDeployment,
    ReturnHome,
    Emergency,
    Waypoint,
}

/// Limits attached to a navigation goal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalConstraints {
    /// Speed cap for this goal (m/s).
    pub max_speed: f32,
    /// Steepest slope the robot should attempt without climb mode (rad).
    pub max_slope_rad: f32,
    /// Clearance kept around obstacles when rasterising the grid (m).
    pub avoidance_radius: f32,
    /// Abandon the goal if it is still executing after this long (s).
    pub timeout_s: f32,
}

impl Default for GoalConstraints {
    fn default() -> Self {
        Self {
            max_speed: 0.25,
            max_slope_rad: 0.35,
            avoidance_radius: 0.3,
            timeout_s: 600.0,
        }
    }
}

/// A destination handed to the path planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationGoal {
    pub target: Pose,
    pub goal_type: GoalType,
    /// Higher is more urgent.
    pub priority: u8,
    pub constraints: GoalConstraints,
    /// Intermediate poses the path must pass, in order.
    pub waypoints: Vec<Pose>,
}

impl NavigationGoal {
    /// Goal with default constraints and no intermediate waypoints.
    pub fn new(target: Pose, goal_type: GoalType) -> Self {
        Self {
            target,
            goal_type,
            priority: 1,
            constraints: GoalConstraints::default(),
            waypoints: Vec::new(),
        }
    }

    pub fn with_constraints(mut self, constraints: GoalConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_waypoints(mut self, waypoints: Vec<Pose>) -> Self {
        self.waypoints = waypoints;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

/// Path planner lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationState {
    #[default]
    Idle,
    Planning,
    Executing,
    Paused,
    Completed,
    Failed,
}

impl fmt::Display for NavigationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NavigationState::Idle => "idle",
            NavigationState::Planning => "planning",
            NavigationState::Executing => "executing",
            NavigationState::Paused => "paused",
            NavigationState::Completed => "completed",
            NavigationState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Obstacle classes reported by perception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObstacleType {
    Rock,
    Debris,
    Vegetation,
    CliffEdge,
    Crack,
    Unknown,
}

/// An obstacle in the world frame.  `size` is the full extent per axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub id: String,
    pub position: Vec3,
    pub size: Vec3,
    pub obstacle_type: ObstacleType,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of the planner, mutated on every plan and waypoint advance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NavigationStatus {
    pub goal: Option<NavigationGoal>,
    pub state: NavigationState,
    /// Fraction of path waypoints already reached, `[0, 1]`.
    pub progress: f32,
    /// Straight-line distance from the last known pose to the goal (m).
    pub distance_to_goal: f32,
    /// Estimated time to arrival at the goal's speed cap (s).
    pub eta_s: f32,
    pub obstacles: Vec<Obstacle>,
    pub path: Vec<Pose>,
}

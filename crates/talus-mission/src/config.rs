//! Tunables of the mission controller, loaded from the `[mission]` section
//! of the CLI config.  Every field has a default so partial tables are fine.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use talus_types::Pose;

use crate::steering::SteeringConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    /// Base station position (world frame, m).
    pub home_x: f32,
    pub home_y: f32,
    /// Below this charge (%) the mission is aborted and the robot walks home.
    pub battery_return_percent: f32,
    /// Stability margin below which the robot is emergency-stopped.
    pub critical_stability: f32,
    /// Cliff features at least this severe count as hazards.
    pub cliff_severity: f32,
    /// Cliff features further than this are ignored (m).
    pub cliff_range_m: f32,
    /// Vision features below this confidence never reach the planner.
    pub min_obstacle_confidence: f32,
    /// Control loop period (ms).
    pub loop_period_ms: u64,
    /// Per-call limit on the vision source (s).
    pub vision_timeout_s: f32,
    /// Consecutive failed captures that abort the mission.
    pub max_vision_failures: usize,
    /// Per-call limit on the deployment subsystem (s).
    pub deployment_call_timeout_s: f32,
    /// Overall time allowed for one deployment (s).
    pub deployment_timeout_s: f32,
    /// Consecutive planning failures towards one area before it is skipped.
    pub max_plan_failures: usize,
    /// Slope (rad) above which climb mode is engaged.
    pub climb_slope_rad: f32,
    /// Climb mode is released once the slope drops this far below
    /// `climb_slope_rad`.
    pub climb_hysteresis_rad: f32,
    /// How recently an area must have been inspected to count towards
    /// progress (s).
    pub freshness_window_s: f64,
    /// Full passes over the areas before a patrol completes.
    pub patrol_laps: u32,
    pub steering: SteeringConfig,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            home_x: 0.0,
            home_y: 0.0,
            battery_return_percent: 20.0,
            critical_stability: 0.1,
            cliff_severity: 0.7,
            cliff_range_m: 1.0,
            min_obstacle_confidence: 0.5,
            loop_period_ms: 100,
            vision_timeout_s: 2.0,
            max_vision_failures: 3,
            deployment_call_timeout_s: 5.0,
            deployment_timeout_s: 120.0,
            max_plan_failures: 3,
            climb_slope_rad: 0.35,
            climb_hysteresis_rad: 0.05,
            freshness_window_s: 3600.0,
            patrol_laps: 1,
            steering: SteeringConfig::default(),
        }
    }
}

impl MissionConfig {
    pub fn home_pose(&self) -> Pose {
        Pose::new(self.home_x, self.home_y, 0.0)
    }

    pub fn loop_period(&self) -> Duration {
        Duration::from_millis(self.loop_period_ms)
    }

    pub fn vision_timeout(&self) -> Duration {
        secs(self.vision_timeout_s)
    }

    pub fn deployment_call_timeout(&self) -> Duration {
        secs(self.deployment_call_timeout_s)
    }

    pub fn deployment_timeout(&self) -> Duration {
        secs(self.deployment_timeout_s)
    }
}

/// Negative or non-finite values collapse to zero.
fn secs(s: f32) -> Duration {
    Duration::try_from_secs_f32(s).unwrap_or(Duration::ZERO)
}

//! The path planner: goal in, waypoints out.
//!
//! ```text
//!   idle ──plan_path──▶ planning ──ok──▶ executing ──▶ completed
//!                          │              │    ▲
//!                          └──err──▶ failed   pause/resume
//!                                         ▼    │
//!                                         paused
//!   any ──cancel──▶ idle
//! ```
//!
//! [`PathPlanner::plan_path`] rebuilds the grid from the tracked obstacles,
//! searches, smooths, and splices in the goal's own waypoints.
//! [`PathPlanner::get_next_waypoint`] is then polled once per control
//! iteration with the current pose.
//!
//! Obstacle updates never re-plan by themselves.  When new obstacles cut
//! the remaining path, [`PathPlanner::is_path_blocked`] turns `true` and the
//! caller decides when to plan again.
//!
//! # Example
//!
//! ```rust
//! use talus_nav::{PathPlanner, PlannerConfig};
//! use talus_types::{GoalType, NavigationGoal, NavigationState, Pose};
//!
//! let mut planner = PathPlanner::new(PlannerConfig::default());
//! let goal = NavigationGoal::new(Pose::new(2.0, 1.0, 0.0), GoalType::Waypoint);
//! let path = planner.plan_path(goal, &Pose::default()).unwrap();
//!
//! assert_eq!(planner.status().state, NavigationState::Executing);
//! assert_eq!(path.last().map(|p| p.position.x), Some(2.0));
//! ```

use serde::{Deserialize, Serialize};
use talus_types::{NavigationGoal, NavigationState, NavigationStatus, Obstacle, Pose, TalusError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::astar;
use crate::grid::{Cell, OccupancyGrid};
use crate::smoothing;

/// Grid geometry and following tolerances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Cell edge length (m).
    pub resolution: f32,
    /// Cells along X.
    pub width: usize,
    /// Cells along Y.
    pub height: usize,
    /// World X of the grid's lower-left corner (m).
    pub origin_x: f32,
    /// World Y of the grid's lower-left corner (m).
    pub origin_y: f32,
    /// Obstacle inflation used when no goal supplies its own (m).
    pub default_inflation: f32,
    /// Distance at which a waypoint counts as reached (m).
    pub waypoint_tolerance: f32,
    /// A* expansion budget before giving up.
    pub max_expansions: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            resolution: 0.1,
            width: 200,
            height: 200,
            origin_x: -10.0,
            origin_y: -10.0,
            default_inflation: 0.3,
            waypoint_tolerance: 0.2,
            max_expansions: 40_000,
        }
    }
}

pub struct PathPlanner {
    config: PlannerConfig,
    grid: OccupancyGrid,
    obstacles: Vec<Obstacle>,
    status: NavigationStatus,
    cursor: usize,
    started: Option<Instant>,
    /// Pose passed to the latest plan or waypoint query.
    last_pose: Pose,
    path_blocked: bool,
}

impl PathPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            grid: OccupancyGrid::new(
                config.width,
                config.height,
                config.resolution,
                config.origin_x,
                config.origin_y,
            ),
            config,
            obstacles: Vec::new(),
            status: NavigationStatus::default(),
            cursor: 0,
            started: None,
            last_pose: Pose::default(),
            path_blocked: false,
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn grid(&self) -> &OccupancyGrid {
        &self.grid
    }

    pub fn status(&self) -> &NavigationStatus {
        &self.status
    }

    pub fn state(&self) -> NavigationState {
        self.status.state
    }

    /// `true` while a path is being executed or is paused.
    pub fn is_navigating(&self) -> bool {
        matches!(
            self.status.state,
            NavigationState::Executing | NavigationState::Paused
        )
    }

    /// Whether the last obstacle update cut the remaining path.
    pub fn is_path_blocked(&self) -> bool {
        self.path_blocked
    }

    // ────────────────────────────────────────────────────────────────────────
    // Planning
    // ────────────────────────────────────────────────────────────────────────

    /// Plan from `current` to `goal.target`.
    ///
    /// On success the returned poses end exactly at the goal target and the
    /// status is `Executing` with the cursor reset.  On failure the status is
    /// `Failed` and the error says why.
    pub fn plan_path(
        &mut self,
        goal: NavigationGoal,
        current: &Pose,
    ) -> Result<Vec<Pose>, TalusError> {
        self.status.state = NavigationState::Planning;
        self.status.goal = Some(goal.clone());
        self.status.path.clear();
        self.status.progress = 0.0;
        self.cursor = 0;
        self.started = None;
        self.last_pose = *current;
        self.path_blocked = false;

        if !is_finite(current) || !is_finite(&goal.target) {
            warn!(goal_type = ?goal.goal_type, "non-finite start or goal pose, refusing to plan");
            self.status.state = NavigationState::Failed;
            return Err(TalusError::NoPathFound(
                "start or goal pose is not finite".to_string(),
            ));
        }

        self.grid
            .rebuild(&self.obstacles, goal.constraints.avoidance_radius);

        let start = self.cell_of(current);
        let target = self.cell_of(&goal.target);
        let cells = match astar::search(&self.grid, start, target, self.config.max_expansions) {
            Ok(cells) => cells,
            Err(e) => {
                warn!(error = %e, goal_type = ?goal.goal_type, "path planning failed");
                self.status.state = NavigationState::Failed;
                return Err(e);
            }
        };

        let smoothed = smoothing::smooth(&self.grid, &cells);
        let path = self.to_poses(&smoothed, &goal);
        let path = splice_waypoints(path, &goal.waypoints);

        info!(
            raw_cells = cells.len(),
            waypoints = path.len(),
            obstacles = self.obstacles.len(),
            "path planned"
        );

        self.status.path = path.clone();
        self.status.state = NavigationState::Executing;
        self.started = Some(Instant::now());
        self.refresh_distance(current);
        Ok(path)
    }

    /// Current waypoint to steer for, advancing past it once `current` is
    /// within tolerance.
    ///
    /// Returns `None` when not executing.  The call that exhausts the path
    /// sets `Completed`; every later call just returns `None`.  A goal whose
    /// `timeout_s` has elapsed is marked `Failed`.
    pub fn get_next_waypoint(&mut self, current: &Pose) -> Option<Pose> {
        if self.status.state != NavigationState::Executing {
            return None;
        }

        if let (Some(started), Some(goal)) = (self.started, &self.status.goal) {
            let timeout = goal.constraints.timeout_s;
            if started.elapsed().as_secs_f32() >= timeout {
                warn!(timeout_s = timeout, "navigation goal timed out");
                self.status.state = NavigationState::Failed;
                return None;
            }
        }

        self.last_pose = *current;
        self.refresh_distance(current);
        let total = self.status.path.len();
        if let Some(target) = self.status.path.get(self.cursor)
            && current.planar_distance_to(target) <= self.config.waypoint_tolerance
        {
            self.cursor += 1;
            debug!(cursor = self.cursor, total, "waypoint reached");
        }
        self.status.progress = if total == 0 {
            1.0
        } else {
            self.cursor as f32 / total as f32
        };

        match self.status.path.get(self.cursor) {
            Some(next) => Some(*next),
            None => {
                info!("navigation goal completed");
                self.status.state = NavigationState::Completed;
                self.status.eta_s = 0.0;
                None
            }
        }
    }

    /// Replace the tracked obstacles and rebuild the grid.
    ///
    /// Never re-plans.  If a path is active, checks whether the remaining
    /// segments still have line of sight and records the answer for
    /// [`is_path_blocked`][Self::is_path_blocked].
    pub fn update_obstacles(&mut self, obstacles: Vec<Obstacle>) {
        self.obstacles = obstacles;
        let inflation = self
            .status
            .goal
            .as_ref()
            .map_or(self.config.default_inflation, |g| g.constraints.avoidance_radius);
        self.grid.rebuild(&self.obstacles, inflation);
        self.status.obstacles = self.obstacles.clone();

        if !self.is_navigating() {
            self.path_blocked = false;
            return;
        }

        let remaining: Vec<Cell> = std::iter::once(&self.last_pose)
            .chain(self.status.path.iter().skip(self.cursor))
            .map(|p| self.cell_of(p))
            .collect();
        let blocked = remaining
            .windows(2)
            .any(|w| !smoothing::line_of_sight(&self.grid, w[0], w[1]))
            || remaining
                .last()
                .is_some_and(|c| self.grid.is_occupied(*c));

        if blocked && !self.path_blocked {
            warn!(obstacles = self.obstacles.len(), "obstacles now block the active path; re-plan required");
        }
        self.path_blocked = blocked;
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    // ────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ────────────────────────────────────────────────────────────────────────

    pub fn pause(&mut self) -> Result<(), TalusError> {
        self.transition(NavigationState::Executing, NavigationState::Paused)
    }

    pub fn resume(&mut self) -> Result<(), TalusError> {
        self.transition(NavigationState::Paused, NavigationState::Executing)
    }

    /// Drop the goal and path from any state.
    pub fn cancel(&mut self) {
        if self.status.state != NavigationState::Idle {
            debug!(from = %self.status.state, "navigation cancelled");
        }
        self.status.state = NavigationState::Idle;
        self.status.goal = None;
        self.status.path.clear();
        self.status.progress = 0.0;
        self.status.distance_to_goal = 0.0;
        self.status.eta_s = 0.0;
        self.cursor = 0;
        self.started = None;
        self.path_blocked = false;
    }

    fn transition(&mut self, from: NavigationState, to: NavigationState) -> Result<(), TalusError> {
        if self.status.state != from {
            return Err(TalusError::InvalidTransition {
                from: self.status.state.to_string(),
                to: to.to_string(),
            });
        }
        self.status.state = to;
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────────────
    // Helpers
    // ────────────────────────────────────────────────────────────────────────

    fn cell_of(&self, pose: &Pose) -> Cell {
        self.grid
            .world_to_cell(pose.position.x, pose.position.y)
    }

    /// Cell centres → poses.  The start cell is dropped (the robot is
    /// already there) and the last entry is the exact goal target.
    fn to_poses(&self, cells: &[Cell], goal: &NavigationGoal) -> Vec<Pose> {
        let z = goal.target.position.z;
        let mut poses: Vec<Pose> = cells
            .iter()
            .skip(1)
            .map(|c| {
                let (x, y) = self.grid.cell_centre(*c);
                Pose::new(x, y, z)
            })
            .collect();
        match poses.last_mut() {
            Some(last) => *last = goal.target,
            None => poses.push(goal.target),
        }
        poses
    }

    fn refresh_distance(&mut self, current: &Pose) {
        if let Some(goal) = &self.status.goal {
            let distance = current.planar_distance_to(&goal.target);
            self.status.distance_to_goal = distance;
            self.status.eta_s = if goal.constraints.max_speed > 0.0 {
                distance / goal.constraints.max_speed
            } else {
                f32::INFINITY
            };
        }
    }
}

/// Insert caller waypoints, in order, right after the path pose nearest to
/// each.  The search for each waypoint starts where the previous one was
/// inserted, and nothing is placed after the final goal pose.
fn splice_waypoints(mut path: Vec<Pose>, waypoints: &[Pose]) -> Vec<Pose> {
    let mut floor = 0;
    for wp in waypoints {
        // Candidates exclude the final goal pose.
        let last_candidate = path.len().saturating_sub(1);
        let insert_at = path[floor..last_candidate]
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                wp.planar_distance_to(a)
                    .total_cmp(&wp.planar_distance_to(b))
            })
            .map_or(floor, |(i, _)| floor + i + 1);
        path.insert(insert_at, *wp);
        floor = insert_at + 1;
    }
    path
}

fn is_finite(pose: &Pose) -> bool {
    pose.position.x.is_finite() && pose.position.y.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use talus_types::{GoalConstraints, GoalType, ObstacleType, Vec3};

    fn small_config() -> PlannerConfig {
        PlannerConfig {
            resolution: 0.1,
            width: 50,
            height: 50,
            origin_x: 0.0,
            origin_y: 0.0,
            default_inflation: 0.0,
            ..Default::default()
        }
    }

    fn tight_goal(x: f32, y: f32) -> NavigationGoal {
        NavigationGoal::new(Pose::new(x, y, 0.0), GoalType::Waypoint).with_constraints(
            GoalConstraints {
                avoidance_radius: 0.0,
                ..Default::default()
            },
        )
    }

    fn block(id: &str, x: f32, y: f32, size: f32) -> Obstacle {
        Obstacle {
            id: id.to_string(),
            position: Vec3::new(x, y, 0.0),
            size: Vec3::new(size, size, 0.3),
            obstacle_type: ObstacleType::Rock,
            confidence: 1.0,
            timestamp: Utc::now(),
        }
    }

    /// Every grid cell a polyline touches, start pose included.
    fn touched_cells(planner: &PathPlanner, start: &Pose, path: &[Pose]) -> bool {
        let mut prev = *start;
        for p in path {
            if !smoothing::line_of_sight(planner.grid(), planner.cell_of(&prev), planner.cell_of(p)) {
                return false;
            }
            prev = *p;
        }
        true
    }

    #[test]
    fn path_avoids_three_by_three_block() {
        let mut planner = PathPlanner::new(small_config());
        // Cells (20..23, 20..23), right on the straight line (0,0) → (4,4).
        planner.update_obstacles(vec![block("rock", 2.15, 2.15, 0.3)]);
        assert_eq!(planner.grid().occupied_count(), 9);

        let start = Pose::new(0.0, 0.0, 0.0);
        let path = planner.plan_path(tight_goal(4.0, 4.0), &start).unwrap();

        for p in &path {
            assert!(!planner.grid().is_occupied(planner.cell_of(p)));
        }
        assert!(touched_cells(&planner, &start, &path));
        assert!(path.len() >= 2, "a detour needs at least one corner");
        assert_eq!(*path.last().unwrap(), Pose::new(4.0, 4.0, 0.0));
        assert_eq!(planner.state(), NavigationState::Executing);
    }

    #[test]
    fn occupied_goal_sets_failed() {
        let mut planner = PathPlanner::new(small_config());
        planner.update_obstacles(vec![block("boulder", 3.05, 3.05, 0.5)]);
        let err = planner
            .plan_path(tight_goal(3.05, 3.05), &Pose::default())
            .unwrap_err();
        assert!(matches!(err, TalusError::NoPathFound(_)));
        assert_eq!(planner.state(), NavigationState::Failed);
        assert!(planner.get_next_waypoint(&Pose::default()).is_none());
    }

    #[test]
    fn goal_outside_map_fails_closed() {
        let mut planner = PathPlanner::new(small_config());
        assert!(planner.plan_path(tight_goal(9.0, 1.0), &Pose::default()).is_err());
        assert_eq!(planner.state(), NavigationState::Failed);
    }

    #[test]
    fn non_finite_poses_fail_closed() {
        let mut planner = PathPlanner::new(small_config());
        let lost = Pose::new(f32::NAN, f32::NAN, 0.0);
        let err = planner.plan_path(tight_goal(1.0, 1.0), &lost).unwrap_err();
        assert!(matches!(err, TalusError::NoPathFound(_)));
        assert_eq!(planner.state(), NavigationState::Failed);
        assert!(planner.status().path.is_empty());

        let goal = tight_goal(f32::INFINITY, 1.0);
        assert!(planner.plan_path(goal, &Pose::new(1.0, 1.0, 0.0)).is_err());
        assert_eq!(planner.state(), NavigationState::Failed);
    }

    #[test]
    fn expansion_budget_becomes_planning_timeout() {
        let mut planner = PathPlanner::new(PlannerConfig {
            max_expansions: 3,
            ..small_config()
        });
        let err = planner
            .plan_path(tight_goal(4.5, 0.05), &Pose::new(0.05, 0.05, 0.0))
            .unwrap_err();
        assert!(matches!(err, TalusError::PlanningTimeout { .. }));
        assert_eq!(planner.state(), NavigationState::Failed);
    }

    #[test]
    fn following_visits_every_waypoint_and_completes_once() {
        let mut planner = PathPlanner::new(small_config());
        planner.update_obstacles(vec![block("rock", 2.15, 2.15, 0.3)]);
        let mut pose = Pose::new(0.05, 0.05, 0.0);
        let path = planner.plan_path(tight_goal(4.0, 4.0), &pose).unwrap();

        let mut visited = Vec::new();
        let mut completions = 0;
        for _ in 0..(path.len() * 2 + 5) {
            let before = planner.state();
            let next = planner.get_next_waypoint(&pose);
            if before != NavigationState::Completed && planner.state() == NavigationState::Completed {
                completions += 1;
            }
            match next {
                Some(wp) => {
                    if visited.last() != Some(&wp) {
                        visited.push(wp);
                    }
                    pose = wp;
                }
                None => continue,
            }
        }

        assert_eq!(visited, path);
        assert_eq!(completions, 1);
        assert_eq!(planner.state(), NavigationState::Completed);
        assert_eq!(planner.status().progress, 1.0);
    }

    #[test]
    fn cursor_advances_once_per_call() {
        let mut planner = PathPlanner::new(small_config());
        let waypoints = vec![Pose::new(1.0, 0.05, 0.0), Pose::new(1.05, 0.05, 0.0)];
        let start = Pose::new(0.05, 0.05, 0.0);
        let path = planner
            .plan_path(tight_goal(1.1, 0.05).with_waypoints(waypoints), &start)
            .unwrap();
        assert!(path.len() >= 3);

        // Standing on top of several nearby waypoints still moves one step.
        let first = planner.get_next_waypoint(&path[0]).unwrap();
        assert_eq!(first, path[1]);
    }

    #[test]
    fn waypoints_are_spliced_in_order_before_goal() {
        let mut planner = PathPlanner::new(small_config());
        let a = Pose::new(1.0, 3.0, 0.0);
        let b = Pose::new(3.0, 1.0, 0.0);
        let goal = tight_goal(4.0, 4.0).with_waypoints(vec![a, b]);
        let path = planner.plan_path(goal, &Pose::new(0.05, 0.05, 0.0)).unwrap();

        let ia = path.iter().position(|p| *p == a).unwrap();
        let ib = path.iter().position(|p| *p == b).unwrap();
        assert!(ia < ib);
        assert!(ib < path.len() - 1);
        assert_eq!(*path.last().unwrap(), Pose::new(4.0, 4.0, 0.0));
    }

    #[test]
    fn splice_on_single_pose_path_goes_first() {
        let goal = Pose::new(1.0, 1.0, 0.0);
        let wp = Pose::new(0.5, 0.5, 0.0);
        let spliced = splice_waypoints(vec![goal], &[wp]);
        assert_eq!(spliced, vec![wp, goal]);
    }

    #[test]
    fn pause_resume_cancel() {
        let mut planner = PathPlanner::new(small_config());
        assert!(planner.pause().is_err());

        planner.plan_path(tight_goal(2.0, 2.0), &Pose::default()).unwrap();
        planner.pause().unwrap();
        assert_eq!(planner.state(), NavigationState::Paused);
        assert!(planner.get_next_waypoint(&Pose::default()).is_none());
        assert!(planner.pause().is_err());

        planner.resume().unwrap();
        assert_eq!(planner.state(), NavigationState::Executing);
        assert!(planner.get_next_waypoint(&Pose::default()).is_some());

        planner.cancel();
        assert_eq!(planner.state(), NavigationState::Idle);
        assert!(planner.status().goal.is_none());
        assert!(planner.status().path.is_empty());
    }

    #[test]
    fn goal_timeout_fails_execution() {
        let mut planner = PathPlanner::new(small_config());
        let goal = NavigationGoal::new(Pose::new(2.0, 2.0, 0.0), GoalType::Waypoint).with_constraints(
            GoalConstraints {
                timeout_s: 0.0,
                avoidance_radius: 0.0,
                ..Default::default()
            },
        );
        planner.plan_path(goal, &Pose::default()).unwrap();
        assert!(planner.get_next_waypoint(&Pose::default()).is_none());
        assert_eq!(planner.state(), NavigationState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn goal_timeout_follows_the_runtime_clock() {
        let mut planner = PathPlanner::new(small_config());
        let goal = NavigationGoal::new(Pose::new(4.0, 4.0, 0.0), GoalType::Waypoint).with_constraints(
            GoalConstraints {
                timeout_s: 30.0,
                avoidance_radius: 0.0,
                ..Default::default()
            },
        );
        planner.plan_path(goal, &Pose::default()).unwrap();

        tokio::time::advance(std::time::Duration::from_secs(29)).await;
        assert!(planner.get_next_waypoint(&Pose::default()).is_some());
        assert_eq!(planner.state(), NavigationState::Executing);

        tokio::time::advance(std::time::Duration::from_secs(2)).await;
        assert!(planner.get_next_waypoint(&Pose::default()).is_none());
        assert_eq!(planner.state(), NavigationState::Failed);
    }

    #[test]
    fn obstacle_update_flags_but_never_replans() {
        let mut planner = PathPlanner::new(small_config());
        let start = Pose::new(0.05, 2.05, 0.0);
        let path = planner.plan_path(tight_goal(4.05, 2.05), &start).unwrap();
        assert!(!planner.is_path_blocked());

        planner.update_obstacles(vec![block("slide", 2.05, 2.05, 0.5)]);
        assert!(planner.is_path_blocked());
        assert_eq!(planner.state(), NavigationState::Executing);
        assert_eq!(planner.status().path, path);
        assert_eq!(planner.status().obstacles.len(), 1);

        // Wholesale replacement: an empty list clears the block.
        planner.update_obstacles(Vec::new());
        assert!(!planner.is_path_blocked());
        assert_eq!(planner.grid().occupied_count(), 0);

        // An explicit re-plan routes around it.
        planner.update_obstacles(vec![block("slide", 2.05, 2.05, 0.5)]);
        let replanned = planner.plan_path(tight_goal(4.05, 2.05), &start).unwrap();
        assert_ne!(replanned, path);
        assert!(!planner.is_path_blocked());
    }

    #[test]
    fn status_tracks_distance_and_eta() {
        let mut planner = PathPlanner::new(small_config());
        planner.plan_path(tight_goal(3.0, 0.05), &Pose::new(0.5, 0.05, 0.0)).unwrap();
        let status = planner.status();
        assert!((status.distance_to_goal - 2.5).abs() < 1e-4);
        assert!((status.eta_s - 2.5 / 0.25).abs() < 1e-3);
    }

    #[test]
    fn config_roundtrips_through_json() {
        let json = r#"{"width": 80, "waypoint_tolerance": 0.15}"#;
        let config: PlannerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.width, 80);
        assert_eq!(config.height, 200);
        assert_eq!(config.waypoint_tolerance, 0.15);
    }
}

//! [`MissionController`] – the patrol loop that ties the stack together.
//!
//! Every iteration runs five steps:
//!
//! 1. **Observe** – snapshot the robot state and engage or release climb
//!    mode from the slope under the body.
//! 2. **Perceive** – capture a vision frame (with a timeout), push its
//!    obstacles into the [`PathPlanner`] and note any cliff edge.  A failed
//!    capture holds the robot in place for this iteration; too many in a row
//!    abort the mission.
//! 3. **Act** – advance the mission according to its [`MissionType`]:
//!    travel to the next area, inspect it, deploy a sensor, or hold at the
//!    emergency site.
//! 4. **Progress** – recompute mission progress from area freshness.
//! 5. **Safety** – run the [`SafetyMonitor`]; a fault stops the loop.
//!
//! An error escaping any step aborts the mission and stops locomotion.
//! Nothing is retried automatically.
//!
//! # Control from other tasks
//!
//! [`MissionController::run`] owns the controller.  Other tasks talk to it
//! through a cloneable [`MissionHandle`]: commands go in over an mpsc
//! channel and are applied between iterations, and a [`MissionSnapshot`] is
//! published on a watch channel after each one.
//!
//! # Example
//!
//! ```rust
//! use talus_locomotion::{LocomotionController, SimLegDriver};
//! use talus_middleware::EventBus;
//! use talus_mission::sim::{SimDeployment, SimVision};
//! use talus_mission::{MissionConfig, MissionController};
//! use talus_nav::{PathPlanner, PlannerConfig};
//! use talus_types::{InspectionArea, LocomotionParams, Mission, MissionStatus, MissionType, Pose};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let params = LocomotionParams { tick_delay_ms: 0, ..LocomotionParams::default() };
//! let (driver, _legs) = SimLegDriver::new("legs");
//! let locomotion = LocomotionController::new(params, driver).unwrap();
//! let (vision, _) = SimVision::new("cam");
//! let (deployment, _) = SimDeployment::new("arm", 1);
//!
//! let config = MissionConfig { loop_period_ms: 1, ..MissionConfig::default() };
//! let mut controller = MissionController::new(
//!     config,
//!     locomotion,
//!     PathPlanner::new(PlannerConfig::default()),
//!     vision,
//!     deployment,
//!     EventBus::default(),
//! );
//!
//! let area = InspectionArea::new("ridge", Pose::new(0.6, 0.0, 0.0));
//! controller.start_mission(Mission::new(MissionType::Inspection, vec![area])).unwrap();
//! let status = controller.run().await.unwrap();
//! assert_eq!(status, MissionStatus::Completed);
//! # }
//! ```

use chrono::Utc;
use talus_locomotion::LocomotionController;
use talus_middleware::{EventBus, Topic};
use talus_nav::PathPlanner;
use talus_types::{
    AreaOutcome, Event, EventPayload, Finding, FindingKind, GoalType, LocomotionParams, Mission,
    MissionStatus, MissionType, NavigationGoal, NavigationState, NavigationStatus, Pose,
    RobotMode, RobotState, SafetyCondition, SensorSnapshot, TalusError, TelemetryData,
};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::collaborators::{
    DeploymentStatus, DeploymentSubsystem, VisionSource, extract_obstacles, nearest_cliff,
    with_timeout,
};
use crate::config::MissionConfig;
use crate::guard::RetryGuard;
use crate::safety::{SafetyAction, SafetyContext, SafetyFault, SafetyMonitor};
use crate::steering::Steering;

const SOURCE: &str = "talus-mission::controller";
/// Sensor type used when an area does not name one.
const DEFAULT_SENSOR: &str = "generic";
/// Speed factor applied after a move that ended below the stability
/// threshold.
const CAUTION_FACTOR: f32 = 0.5;

// ────────────────────────────────────────────────────────────────────────────
// Handle types
// ────────────────────────────────────────────────────────────────────────────

/// Operator commands accepted while [`MissionController::run`] is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Pause,
    Resume,
    Abort,
    EmergencyStop,
}

/// What the controller looked like after its latest iteration.
#[derive(Debug, Clone)]
pub struct MissionSnapshot {
    pub robot: RobotState,
    pub navigation: NavigationStatus,
    pub mission: Option<Mission>,
    pub last_fault: Option<SafetyCondition>,
    pub emergency_stopped: bool,
}

/// Cloneable remote control for a running [`MissionController`].
#[derive(Clone)]
pub struct MissionHandle {
    commands: mpsc::UnboundedSender<ControlCommand>,
    snapshots: watch::Receiver<MissionSnapshot>,
}

impl MissionHandle {
    /// Queue `command`; it is applied before the next iteration.
    pub fn send(&self, command: ControlCommand) -> Result<(), TalusError> {
        self.commands
            .send(command)
            .map_err(|e| TalusError::Channel(format!("mission controller gone: {e}")))
    }

    pub fn pause(&self) -> Result<(), TalusError> {
        self.send(ControlCommand::Pause)
    }

    pub fn resume(&self) -> Result<(), TalusError> {
        self.send(ControlCommand::Resume)
    }

    pub fn abort(&self) -> Result<(), TalusError> {
        self.send(ControlCommand::Abort)
    }

    pub fn emergency_stop(&self) -> Result<(), TalusError> {
        self.send(ControlCommand::EmergencyStop)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> MissionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that wakes on every new snapshot.
    pub fn subscribe(&self) -> watch::Receiver<MissionSnapshot> {
        self.snapshots.clone()
    }
}

/// Result of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    Continue,
    /// The loop must stop: the mission ended, was aborted, or there is none.
    Finished,
}

// ────────────────────────────────────────────────────────────────────────────
// Internal bookkeeping
// ────────────────────────────────────────────────────────────────────────────

/// The area currently being worked on, copied out of the mission so the
/// controller can be borrowed mutably while using it.
#[derive(Debug, Clone)]
struct AreaTarget {
    index: usize,
    id: String,
    centre: Pose,
    radius: f32,
    sensor_type: Option<String>,
}

enum Travel {
    EnRoute,
    Arrived,
    Skipped,
}

enum StepOutcome {
    Continue,
    MissionDone,
}

// ────────────────────────────────────────────────────────────────────────────
// MissionController
// ────────────────────────────────────────────────────────────────────────────

pub struct MissionController {
    config: MissionConfig,
    locomotion: LocomotionController,
    planner: PathPlanner,
    vision: Box<dyn VisionSource>,
    deployment: Box<dyn DeploymentSubsystem>,
    safety: SafetyMonitor,
    steering: Steering,
    bus: EventBus,

    mission: Option<Mission>,
    /// Area index the planner's current goal belongs to.
    nav_area: Option<usize>,
    /// Deployment in progress: area index and start time.
    deploying: Option<(usize, Instant)>,
    plan_guard: RetryGuard,
    vision_failures: usize,
    laps_completed: u32,
    last_move_stable: bool,
    cliff_distance: Option<f32>,
    last_fault: Option<SafetyCondition>,
    last_error: Option<TalusError>,

    command_tx: mpsc::UnboundedSender<ControlCommand>,
    commands: mpsc::UnboundedReceiver<ControlCommand>,
    snapshot_tx: watch::Sender<MissionSnapshot>,
}

impl MissionController {
    /// Build a controller with the standard safety rules from `config`.
    pub fn new(
        config: MissionConfig,
        locomotion: LocomotionController,
        planner: PathPlanner,
        vision: Box<dyn VisionSource>,
        deployment: Box<dyn DeploymentSubsystem>,
        bus: EventBus,
    ) -> Self {
        let safety = SafetyMonitor::standard(config.battery_return_percent, config.critical_stability);
        let steering = Steering::new(config.steering);
        let plan_guard = RetryGuard::new(config.max_plan_failures);
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (snapshot_tx, _) = watch::channel(MissionSnapshot {
            robot: locomotion.state(),
            navigation: planner.status().clone(),
            mission: None,
            last_fault: None,
            emergency_stopped: locomotion.is_emergency_stopped(),
        });
        Self {
            config,
            locomotion,
            planner,
            vision,
            deployment,
            safety,
            steering,
            bus,
            mission: None,
            nav_area: None,
            deploying: None,
            plan_guard,
            vision_failures: 0,
            laps_completed: 0,
            last_move_stable: true,
            cliff_distance: None,
            last_fault: None,
            last_error: None,
            command_tx,
            commands,
            snapshot_tx,
        }
    }

    /// Replace the safety rules, e.g. to add site-specific ones.
    pub fn with_safety_monitor(mut self, safety: SafetyMonitor) -> Self {
        self.safety = safety;
        self
    }

    pub fn handle(&self) -> MissionHandle {
        MissionHandle {
            commands: self.command_tx.clone(),
            snapshots: self.snapshot_tx.subscribe(),
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Mission lifecycle
    // ────────────────────────────────────────────────────────────────────────

    /// Take ownership of `mission` and mark it active.
    ///
    /// # Errors
    ///
    /// - [`TalusError::EmergencyStopLatched`] until the stop is reset.
    /// - [`TalusError::MissionRejected`] while another mission is still
    ///   active or paused, or when `mission` has no areas.
    /// - [`TalusError::InvalidTransition`] if `mission` is not `Planned`.
    pub fn start_mission(&mut self, mut mission: Mission) -> Result<(), TalusError> {
        if self.locomotion.is_emergency_stopped() {
            return Err(TalusError::EmergencyStopLatched);
        }
        if let Some(current) = &self.mission
            && !current.status.is_terminal()
        {
            return Err(TalusError::MissionRejected(format!(
                "mission {} is still {}",
                current.id, current.status
            )));
        }
        if mission.areas.is_empty() {
            return Err(TalusError::MissionRejected("mission has no areas".to_string()));
        }
        if !mission.status.can_transition_to(MissionStatus::Active) {
            return Err(TalusError::InvalidTransition {
                from: mission.status.to_string(),
                to: MissionStatus::Active.to_string(),
            });
        }

        self.planner.cancel();
        self.steering.reset();
        self.plan_guard.reset();
        self.nav_area = None;
        self.deploying = None;
        self.vision_failures = 0;
        self.laps_completed = 0;
        self.last_move_stable = true;
        self.cliff_distance = None;
        self.last_fault = None;
        self.last_error = None;

        mission.status = MissionStatus::Active;
        info!(
            mission_id = %mission.id,
            mission_type = ?mission.mission_type,
            areas = mission.areas.len(),
            "mission started"
        );
        let (id, status) = (mission.id, mission.status);
        self.mission = Some(mission);
        self.publish(
            Topic::MissionEvents,
            EventPayload::MissionStatusChanged { mission_id: id, status },
        );
        self.publish_snapshot();
        Ok(())
    }

    /// Active → paused.  The robot stops where it is.
    pub fn pause_mission(&mut self) -> Result<(), TalusError> {
        self.set_status(MissionStatus::Paused)?;
        self.halt();
        if self.planner.state() == NavigationState::Executing {
            self.planner.pause()?;
        }
        Ok(())
    }

    /// Paused → active.
    pub fn resume_mission(&mut self) -> Result<(), TalusError> {
        if self.locomotion.is_emergency_stopped() {
            return Err(TalusError::EmergencyStopLatched);
        }
        self.set_status(MissionStatus::Active)?;
        if self.planner.state() == NavigationState::Paused {
            self.planner.resume()?;
        }
        Ok(())
    }

    /// Abort the current mission.  Findings and area outcomes are kept.
    pub fn abort_mission(&mut self, reason: &str) -> Result<(), TalusError> {
        self.set_status(MissionStatus::Aborted)?;
        warn!(reason, "mission aborted");
        self.release_mission();
        self.planner.cancel();
        Ok(())
    }

    /// Latch the emergency stop and abort any mission in progress.
    pub fn emergency_stop(&mut self) {
        self.locomotion.emergency_stop_sequence();
        self.planner.cancel();
        if self.is_mission_live() {
            self.abort_quietly("emergency stop");
        }
        self.publish_snapshot();
    }

    pub fn reset_emergency_stop(&mut self) {
        self.locomotion.reset_emergency_stop();
        self.publish_snapshot();
    }

    /// Walk back to the home pose, giving up the current mission (if any)
    /// once a path home has been found.
    ///
    /// Returns once the robot is home.  On the way the robot keeps looking:
    /// each tick refreshes vision, re-plans around new obstacles and checks
    /// every safety rule that escalates to an emergency stop.  Commands sent
    /// through a [`MissionHandle`] are still honoured: an emergency stop or
    /// abort ends the trip with an error.
    ///
    /// # Errors
    ///
    /// - [`TalusError::EmergencyStopLatched`] if latched before or during
    ///   the trip.
    /// - Planning errors when no path home exists.  A live mission is left
    ///   untouched in that case.
    /// - Vision errors once captures fail too many times in a row.
    /// - [`TalusError::NoPathFound`] if the trip was cancelled or timed out.
    pub async fn return_to_base(&mut self) -> Result<(), TalusError> {
        if self.locomotion.is_emergency_stopped() {
            return Err(TalusError::EmergencyStopLatched);
        }

        let home = self.config.home_pose();
        let start = self.locomotion.state().pose;
        self.plan_home(&start)?;

        if self.is_mission_live() {
            match self.set_status(MissionStatus::Aborted) {
                Ok(()) => {
                    warn!(reason = "returning to base", "mission aborted");
                    self.release_mission();
                }
                Err(e) => debug!(error = %e, "abort skipped"),
            }
        }
        self.steering.reset();
        info!(x = home.position.x, y = home.position.y, "returning to base");

        loop {
            self.drain_commands();
            if self.locomotion.is_emergency_stopped() {
                return Err(TalusError::EmergencyStopLatched);
            }
            let state = self.locomotion.state();

            let seeing = match self.perceive(&state.pose).await {
                Ok(seeing) => seeing,
                Err(e) => {
                    self.halt();
                    self.planner.cancel();
                    self.publish_snapshot();
                    return Err(e);
                }
            };

            let ctx = SafetyContext {
                battery_level: state.battery_level,
                stability_margin: self.locomotion.calculate_stability_margin(),
                cliff_distance: self.cliff_distance,
            };
            if let Some(fault) = self.safety.evaluate_escalations(&ctx) {
                self.report_fault(&fault);
                self.emergency_stop();
                return Err(TalusError::EmergencyStopLatched);
            }

            if !seeing {
                self.halt();
                self.publish_snapshot();
                tokio::task::yield_now().await;
                continue;
            }
            if self.planner.is_path_blocked() {
                info!("path home blocked by new obstacles, re-planning");
                self.plan_home(&state.pose)?;
                self.steering.reset();
            }

            match self.planner.get_next_waypoint(&state.pose) {
                Some(waypoint) => {
                    self.drive_towards(&state, &waypoint).await?;
                    self.publish_snapshot();
                    tokio::task::yield_now().await;
                }
                None => {
                    self.halt();
                    self.publish_snapshot();
                    return match self.planner.state() {
                        NavigationState::Completed => {
                            info!("arrived at base");
                            Ok(())
                        }
                        other => Err(TalusError::NoPathFound(format!(
                            "return to base ended while {other}"
                        ))),
                    };
                }
            }
        }
    }

    fn plan_home(&mut self, from: &Pose) -> Result<(), TalusError> {
        let goal = NavigationGoal::new(self.config.home_pose(), GoalType::ReturnHome)
            .with_priority(u8::MAX);
        if let Err(e) = self.planner.plan_path(goal, from) {
            error!(error = %e, "no path back to base");
            self.publish(
                Topic::MissionEvents,
                EventPayload::NavigationFailed {
                    reason: format!("return to base: {e}"),
                },
            );
            return Err(e);
        }
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────────────
    // Loop
    // ────────────────────────────────────────────────────────────────────────

    /// Drive the started mission until it completes or is aborted.
    ///
    /// Returns the final mission status.  Errors are only returned when no
    /// mission was started; faults during the run abort the mission and are
    /// available from [`MissionController::last_error`].
    pub async fn run(&mut self) -> Result<MissionStatus, TalusError> {
        if self.mission.is_none() {
            return Err(TalusError::MissionRejected("no mission started".to_string()));
        }
        let period = self.config.loop_period();

        loop {
            self.drain_commands();
            if self.run_iteration().await == IterationOutcome::Finished {
                break;
            }
            let command = tokio::select! {
                _ = tokio::time::sleep(period) => None,
                command = self.commands.recv() => command,
            };
            if let Some(command) = command {
                self.apply_command(command);
            }
        }

        self.publish_snapshot();
        Ok(self.mission.as_ref().map_or(MissionStatus::Aborted, |m| m.status))
    }

    /// One pass of the control loop.  A paused mission does nothing and
    /// returns [`IterationOutcome::Continue`].
    pub async fn run_iteration(&mut self) -> IterationOutcome {
        let outcome = match self.mission.as_ref().map(|m| m.status) {
            Some(MissionStatus::Active) => match self.iterate().await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "mission fault, aborting");
                    self.last_error = Some(e.clone());
                    self.abort_quietly(&e.to_string());
                    IterationOutcome::Finished
                }
            },
            Some(MissionStatus::Paused) => IterationOutcome::Continue,
            _ => IterationOutcome::Finished,
        };
        self.publish_snapshot();
        outcome
    }

    async fn iterate(&mut self) -> Result<IterationOutcome, TalusError> {
        // ── 1. Observe ───────────────────────────────────────────────────────
        let state = self.locomotion.state();
        self.respond_to_slope(&state);

        // ── 2. Perceive ──────────────────────────────────────────────────────
        let step = if self.perceive(&state.pose).await? {
            // ── 3. Act ───────────────────────────────────────────────────────
            self.mission_step(&state).await?
        } else {
            self.halt();
            StepOutcome::Continue
        };

        // ── 4. Progress ──────────────────────────────────────────────────────
        self.update_progress();

        // ── 5. Safety ────────────────────────────────────────────────────────
        let ctx = SafetyContext {
            battery_level: self.locomotion.state().battery_level,
            stability_margin: self.locomotion.calculate_stability_margin(),
            cliff_distance: self.cliff_distance,
        };
        if let Some(fault) = self.safety.evaluate(&ctx) {
            self.handle_fault(fault).await;
            return Ok(IterationOutcome::Finished);
        }

        self.publish_telemetry();

        match step {
            StepOutcome::Continue => Ok(IterationOutcome::Continue),
            StepOutcome::MissionDone => {
                self.halt();
                self.planner.cancel();
                self.set_status(MissionStatus::Completed)?;
                Ok(IterationOutcome::Finished)
            }
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.apply_command(command);
        }
    }

    fn apply_command(&mut self, command: ControlCommand) {
        info!(?command, "operator command");
        let result = match command {
            ControlCommand::Pause => self.pause_mission(),
            ControlCommand::Resume => self.resume_mission(),
            ControlCommand::Abort => {
                // Also ends a return-to-base trip in progress.
                self.planner.cancel();
                if self.is_mission_live() {
                    self.abort_mission("operator abort")
                } else {
                    Ok(())
                }
            }
            ControlCommand::EmergencyStop => {
                self.emergency_stop();
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!(?command, error = %e, "command rejected");
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Steps
    // ────────────────────────────────────────────────────────────────────────

    fn respond_to_slope(&mut self, state: &RobotState) {
        let tilt = state.sensors.tilt_y.clamp(-1.0, 1.0).asin().abs();
        let slope = state.pose.orientation.pitch.abs().max(tilt);
        let climbing = self.locomotion.is_climbing();
        if !climbing && slope > self.config.climb_slope_rad {
            info!(slope, "steep slope, entering climb mode");
            self.locomotion.set_climb_mode(true);
        } else if climbing && slope < self.config.climb_slope_rad - self.config.climb_hysteresis_rad {
            info!(slope, "slope eased, leaving climb mode");
            self.locomotion.set_climb_mode(false);
        }
    }

    /// `Ok(false)` when vision is unavailable this iteration.
    async fn perceive(&mut self, pose: &Pose) -> Result<bool, TalusError> {
        let name = self.vision.name().to_string();
        let limit = self.config.vision_timeout();
        match with_timeout(&name, limit, self.vision.capture(pose)).await {
            Ok(frame) => {
                self.vision_failures = 0;
                self.cliff_distance =
                    nearest_cliff(&frame, pose, self.config.cliff_severity, self.config.cliff_range_m);
                let obstacles = extract_obstacles(&frame, self.config.min_obstacle_confidence);
                self.planner.update_obstacles(obstacles);
                Ok(true)
            }
            Err(e) => {
                self.vision_failures += 1;
                warn!(
                    error = %e,
                    failures = self.vision_failures,
                    "vision unavailable, holding position"
                );
                if self.vision_failures >= self.config.max_vision_failures {
                    return Err(e);
                }
                Ok(false)
            }
        }
    }

    async fn mission_step(&mut self, state: &RobotState) -> Result<StepOutcome, TalusError> {
        let mission_type = self.mission_ref()?.mission_type;
        match mission_type {
            MissionType::Patrol => self.visit_step(state, self.config.patrol_laps.max(1)).await,
            MissionType::Inspection => self.visit_step(state, 1).await,
            MissionType::SensorDeployment => self.deployment_step(state).await,
            MissionType::EmergencyResponse => self.emergency_step(state).await,
        }
    }

    /// Patrol and inspection: visit each pending area in turn, `laps` times.
    async fn visit_step(&mut self, state: &RobotState, laps: u32) -> Result<StepOutcome, TalusError> {
        let Some(target) = self.next_target()? else {
            self.laps_completed += 1;
            info!(lap = self.laps_completed, of = laps, "all areas visited");
            if self.laps_completed >= laps {
                return Ok(StepOutcome::MissionDone);
            }
            let mission = self.mission_mut()?;
            let mut reopened = 0;
            for area in mission
                .areas
                .iter_mut()
                .filter(|a| a.outcome == AreaOutcome::Inspected)
            {
                area.outcome = AreaOutcome::Pending;
                reopened += 1;
            }
            if reopened == 0 {
                return Ok(StepOutcome::MissionDone);
            }
            return Ok(StepOutcome::Continue);
        };

        if let Travel::Arrived = self.travel_to(&target, GoalType::InspectionArea, state).await? {
            self.locomotion.set_mode(RobotMode::Inspection)?;
            self.record_area(&target, AreaOutcome::Inspected, FindingKind::AreaInspected, "area inspected")?;
        }
        Ok(StepOutcome::Continue)
    }

    async fn deployment_step(&mut self, state: &RobotState) -> Result<StepOutcome, TalusError> {
        if let Some((index, started)) = self.deploying {
            self.poll_deployment(index, started).await?;
            return Ok(StepOutcome::Continue);
        }
        let Some(target) = self.next_target()? else {
            return Ok(StepOutcome::MissionDone);
        };
        if let Travel::Arrived = self.travel_to(&target, GoalType::SensorDeployment, state).await? {
            self.begin_deployment(&target).await?;
        }
        Ok(StepOutcome::Continue)
    }

    /// Rush to the first area and hold there.
    async fn emergency_step(&mut self, state: &RobotState) -> Result<StepOutcome, TalusError> {
        let Some(target) = self.target_at(0)? else {
            return Ok(StepOutcome::MissionDone);
        };
        if target_is_done(self.mission_ref()?, 0) {
            return Ok(StepOutcome::MissionDone);
        }
        match self.travel_to(&target, GoalType::Emergency, state).await? {
            Travel::EnRoute => Ok(StepOutcome::Continue),
            Travel::Skipped => Ok(StepOutcome::MissionDone),
            Travel::Arrived => {
                self.halt();
                self.record_area(
                    &target,
                    AreaOutcome::Inspected,
                    FindingKind::AreaInspected,
                    "reached emergency site, holding position",
                )?;
                Ok(StepOutcome::MissionDone)
            }
        }
    }

    async fn begin_deployment(&mut self, target: &AreaTarget) -> Result<(), TalusError> {
        self.locomotion.set_mode(RobotMode::Deployment)?;
        let sensor = target.sensor_type.as_deref().unwrap_or(DEFAULT_SENSOR).to_string();
        let name = self.deployment.name().to_string();
        let limit = self.config.deployment_call_timeout();
        match with_timeout(&name, limit, self.deployment.start(&sensor, &target.centre)).await {
            Ok(()) => {
                info!(area = %target.id, sensor, "deployment started");
                self.deploying = Some((target.index, Instant::now()));
                Ok(())
            }
            Err(e) => {
                warn!(area = %target.id, error = %e, "deployment could not start");
                self.record_area(
                    target,
                    AreaOutcome::DeploymentFailed,
                    FindingKind::DeploymentFailed,
                    &e.to_string(),
                )
            }
        }
    }

    async fn poll_deployment(&mut self, index: usize, started: Instant) -> Result<(), TalusError> {
        let Some(target) = self.target_at(index)? else {
            self.deploying = None;
            return Ok(());
        };
        let name = self.deployment.name().to_string();
        let limit = self.config.deployment_call_timeout();
        let failure = match with_timeout(&name, limit, self.deployment.poll()).await {
            Ok(DeploymentStatus::InProgress) => {
                if started.elapsed() < self.config.deployment_timeout() {
                    return Ok(());
                }
                format!(
                    "deployment exceeded {:.0} s",
                    self.config.deployment_timeout().as_secs_f32()
                )
            }
            Ok(DeploymentStatus::Completed) => {
                self.deploying = None;
                return self.record_area(
                    &target,
                    AreaOutcome::Inspected,
                    FindingKind::SensorDeployed,
                    "sensor deployed",
                );
            }
            Ok(DeploymentStatus::Failed(reason)) => reason,
            Err(e) => e.to_string(),
        };
        warn!(area = %target.id, reason = %failure, "deployment failed");
        self.deploying = None;
        self.record_area(
            &target,
            AreaOutcome::DeploymentFailed,
            FindingKind::DeploymentFailed,
            &failure,
        )
    }

    // ────────────────────────────────────────────────────────────────────────
    // Travel
    // ────────────────────────────────────────────────────────────────────────

    async fn travel_to(
        &mut self,
        target: &AreaTarget,
        goal_type: GoalType,
        state: &RobotState,
    ) -> Result<Travel, TalusError> {
        if state.pose.planar_distance_to(&target.centre) <= target.radius {
            if self.nav_area.is_some() {
                self.planner.cancel();
            }
            self.nav_area = None;
            self.plan_guard.reset();
            return Ok(Travel::Arrived);
        }

        let blocked = self.planner.is_path_blocked();
        let needs_plan =
            self.nav_area != Some(target.index) || !self.planner.is_navigating() || blocked;
        if needs_plan {
            if blocked {
                info!(area = %target.id, "path blocked by new obstacles, re-planning");
            }
            let goal = self.goal_for(target, goal_type)?;
            match self.planner.plan_path(goal, &state.pose) {
                Ok(path) => {
                    debug!(area = %target.id, waypoints = path.len(), "path planned");
                    self.nav_area = Some(target.index);
                    self.steering.reset();
                }
                Err(e) => return self.planning_failed(target, e),
            }
        }

        match self.planner.get_next_waypoint(&state.pose) {
            Some(waypoint) => {
                self.drive_towards(state, &waypoint).await?;
                Ok(Travel::EnRoute)
            }
            None if self.planner.state() == NavigationState::Completed => {
                self.nav_area = None;
                self.plan_guard.reset();
                Ok(Travel::Arrived)
            }
            None => {
                let reason = format!("goal {} ended while {}", target.id, self.planner.state());
                self.planning_failed(target, TalusError::NoPathFound(reason))
            }
        }
    }

    fn planning_failed(&mut self, target: &AreaTarget, err: TalusError) -> Result<Travel, TalusError> {
        self.halt();
        self.nav_area = None;
        warn!(area = %target.id, error = %err, "navigation failed");
        self.publish(
            Topic::MissionEvents,
            EventPayload::NavigationFailed {
                reason: format!("{}: {err}", target.id),
            },
        );
        if !self.plan_guard.record(&target.id) {
            return Ok(Travel::EnRoute);
        }
        let note = format!(
            "unreachable after {} attempts: {err}",
            self.plan_guard.threshold()
        );
        self.plan_guard.reset();
        self.record_area(target, AreaOutcome::Skipped, FindingKind::AreaUnreachable, &note)?;
        Ok(Travel::Skipped)
    }

    async fn drive_towards(&mut self, state: &RobotState, waypoint: &Pose) -> Result<(), TalusError> {
        let status = self.planner.status();
        let goal_cap = status
            .goal
            .as_ref()
            .map_or(f32::INFINITY, |g| g.constraints.max_speed);
        let goal_distance = status.distance_to_goal;
        let params = self.locomotion.params();
        let cap = goal_cap.min(params.max_speed);
        let dt = params.control_period_s;

        let mut velocity = self.steering.command(&state.pose, waypoint, goal_distance, cap, dt);
        if !self.last_move_stable {
            debug!("last move unstable, slowing down");
            velocity.linear = velocity.linear.scale(CAUTION_FACTOR);
            velocity.angular = velocity.angular.scale(CAUTION_FACTOR);
        }

        let report = self.locomotion.move_to_target(velocity).await?;
        self.last_move_stable = report.stable;
        if !report.soft_faults.is_empty() {
            debug!(legs = ?report.soft_faults, "legs fell back to default pose");
        }
        Ok(())
    }

    fn goal_for(&self, target: &AreaTarget, goal_type: GoalType) -> Result<NavigationGoal, TalusError> {
        let priority = match goal_type {
            GoalType::Emergency => u8::MAX,
            _ => self.mission_ref()?.priority,
        };
        let mut goal = NavigationGoal::new(target.centre, goal_type).with_priority(priority);
        if goal_type == GoalType::Emergency {
            goal.constraints.max_speed = self.locomotion.params().max_speed;
        }
        Ok(goal)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Safety
    // ────────────────────────────────────────────────────────────────────────

    async fn handle_fault(&mut self, fault: SafetyFault) {
        self.report_fault(&fault);
        match fault.action {
            SafetyAction::EmergencyStop => self.emergency_stop(),
            SafetyAction::ReturnToBase => {
                self.abort_quietly(&format!("safety: {}", fault.condition));
                if let Err(e) = self.return_to_base().await {
                    error!(error = %e, "return to base failed");
                    self.last_error = Some(e);
                }
            }
        }
    }

    fn report_fault(&mut self, fault: &SafetyFault) {
        error!(condition = %fault.condition, action = ?fault.action, "safety fault");
        self.last_fault = Some(fault.condition);
        self.publish(Topic::SafetyAlerts, EventPayload::SafetyFault(fault.condition));
        if let Err(e) = self.push_finding(None, FindingKind::SafetyEvent, &fault.condition.to_string()) {
            debug!(error = %e, "safety finding not recorded");
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Mission bookkeeping
    // ────────────────────────────────────────────────────────────────────────

    fn mission_ref(&self) -> Result<&Mission, TalusError> {
        self.mission
            .as_ref()
            .ok_or_else(|| TalusError::MissionRejected("no mission in progress".to_string()))
    }

    fn mission_mut(&mut self) -> Result<&mut Mission, TalusError> {
        self.mission
            .as_mut()
            .ok_or_else(|| TalusError::MissionRejected("no mission in progress".to_string()))
    }

    fn is_mission_live(&self) -> bool {
        self.mission.as_ref().is_some_and(|m| !m.status.is_terminal())
    }

    fn set_status(&mut self, next: MissionStatus) -> Result<(), TalusError> {
        let mission = self.mission_mut()?;
        if !mission.status.can_transition_to(next) {
            return Err(TalusError::InvalidTransition {
                from: mission.status.to_string(),
                to: next.to_string(),
            });
        }
        info!(mission_id = %mission.id, from = %mission.status, to = %next, "mission status");
        mission.status = next;
        let mission_id = mission.id;
        self.publish(
            Topic::MissionEvents,
            EventPayload::MissionStatusChanged { mission_id, status: next },
        );
        Ok(())
    }

    /// Stop and forget the per-mission travel state.
    fn release_mission(&mut self) {
        self.halt();
        self.nav_area = None;
        self.deploying = None;
    }

    fn abort_quietly(&mut self, reason: &str) {
        if let Err(e) = self.abort_mission(reason) {
            debug!(error = %e, "abort skipped");
        }
    }

    fn next_target(&self) -> Result<Option<AreaTarget>, TalusError> {
        match self.mission_ref()?.next_pending_area() {
            Some(index) => self.target_at(index),
            None => Ok(None),
        }
    }

    fn target_at(&self, index: usize) -> Result<Option<AreaTarget>, TalusError> {
        Ok(self.mission_ref()?.areas.get(index).map(|a| AreaTarget {
            index,
            id: a.id.clone(),
            centre: a.centre,
            radius: a.radius,
            sensor_type: a.sensor_type.clone(),
        }))
    }

    fn record_area(
        &mut self,
        target: &AreaTarget,
        outcome: AreaOutcome,
        kind: FindingKind,
        note: &str,
    ) -> Result<(), TalusError> {
        let mission = self.mission_mut()?;
        if let Some(area) = mission.areas.get_mut(target.index) {
            area.outcome = outcome;
            if outcome == AreaOutcome::Inspected {
                area.last_inspected = Some(Utc::now());
            }
        }
        info!(area = %target.id, ?outcome, "area handled");
        self.push_finding(Some(target.id.clone()), kind, note)
    }

    fn push_finding(&mut self, area_id: Option<String>, kind: FindingKind, note: &str) -> Result<(), TalusError> {
        let state = self.locomotion.state();
        let finding = Finding {
            area_id,
            kind,
            pose: state.pose,
            sensors: state.sensors,
            note: note.to_string(),
            timestamp: Utc::now(),
        };
        self.mission_mut()?.findings.push(finding.clone());
        self.publish(Topic::MissionEvents, EventPayload::Finding(finding));
        Ok(())
    }

    fn update_progress(&mut self) {
        let window = self.config.freshness_window_s;
        if let Some(mission) = self.mission.as_mut()
            && !mission.areas.is_empty()
        {
            let now = Utc::now();
            let fresh = mission.areas.iter().filter(|a| a.is_fresh(now, window)).count();
            mission.progress = fresh as f32 / mission.areas.len() as f32;
        }
    }

    /// Stop walking unless the emergency stop already planted the body.
    fn halt(&mut self) {
        if !self.locomotion.is_emergency_stopped() {
            self.locomotion.stop_movement();
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Publishing
    // ────────────────────────────────────────────────────────────────────────

    fn publish(&self, topic: Topic, payload: EventPayload) {
        // Best effort: a full or closed bus must not stop the robot.
        if let Err(e) = self.bus.publish_to(topic, Event::new(SOURCE, payload)) {
            debug!(?topic, error = %e, "event dropped");
        }
    }

    fn publish_telemetry(&self) {
        let state = self.locomotion.state();
        self.publish(
            Topic::Telemetry,
            EventPayload::Telemetry(TelemetryData {
                pose: state.pose,
                battery_level: state.battery_level,
                mode: state.mode,
                stability_margin: self.locomotion.calculate_stability_margin(),
                navigation_state: self.planner.state(),
            }),
        );
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }

    // ────────────────────────────────────────────────────────────────────────
    // Queries and external inputs
    // ────────────────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> MissionSnapshot {
        MissionSnapshot {
            robot: self.locomotion.state(),
            navigation: self.planner.status().clone(),
            mission: self.mission.clone(),
            last_fault: self.last_fault,
            emergency_stopped: self.locomotion.is_emergency_stopped(),
        }
    }

    pub fn current_state(&self) -> RobotState {
        self.locomotion.state()
    }

    pub fn navigation_status(&self) -> &NavigationStatus {
        self.planner.status()
    }

    pub fn current_mission(&self) -> Option<&Mission> {
        self.mission.as_ref()
    }

    /// Safety condition behind the latest intervention, if any.
    pub fn last_safety_fault(&self) -> Option<SafetyCondition> {
        self.last_fault
    }

    /// Error that aborted the latest mission, if any.
    pub fn last_error(&self) -> Option<&TalusError> {
        self.last_error.as_ref()
    }

    pub fn is_emergency_stopped(&self) -> bool {
        self.locomotion.is_emergency_stopped()
    }

    pub fn is_climbing(&self) -> bool {
        self.locomotion.is_climbing()
    }

    pub fn locomotion_params(&self) -> &LocomotionParams {
        self.locomotion.params()
    }

    /// Live-tune locomotion; applies from the next move.
    pub fn update_locomotion_params(&mut self, params: LocomotionParams) -> Result<(), TalusError> {
        self.locomotion.update_params(params)
    }

    pub fn update_sensors(&mut self, sensors: SensorSnapshot) {
        self.locomotion.update_sensors(sensors);
    }

    pub fn update_pose_estimate(&mut self, pose: Pose) {
        self.locomotion.update_pose_estimate(pose);
    }
}

fn target_is_done(mission: &Mission, index: usize) -> bool {
    mission
        .areas
        .get(index)
        .is_none_or(|a| a.outcome != AreaOutcome::Pending)
}

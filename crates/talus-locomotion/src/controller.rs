//! The locomotion controller: sole writer of [`RobotState`].
//!
//! Every call to [`LocomotionController::move_to_target`] is one control
//! tick:
//!
//! 1. refuse if the emergency stop is latched,
//! 2. advance the gait engine and collect six foot targets,
//! 3. solve IK per leg (unreachable targets degrade that leg only),
//! 4. push the joint targets through the [`LegDriver`],
//! 5. integrate the pose over the fixed control period,
//! 6. wait out the servo settle time.
//!
//! A driver error is never retried: the controller runs its own
//! [`emergency_stop_sequence`][LocomotionController::emergency_stop_sequence]
//! and reports [`TalusError::MovementFailed`].
//!
//! # Example
//!
//! ```rust
//! use talus_locomotion::{LocomotionController, SimLegDriver};
//! use talus_types::{LocomotionParams, RobotMode, Velocity};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let params = LocomotionParams { tick_delay_ms: 0, ..Default::default() };
//! let (driver, _probe) = SimLegDriver::new("sim");
//! let mut loco = LocomotionController::new(params, driver).unwrap();
//!
//! loco.move_to_target(Velocity::planar(0.1, 0.0)).await.unwrap();
//! assert_eq!(loco.state().mode, RobotMode::Walking);
//! # }
//! ```

use std::time::Duration;

use chrono::Utc;
use talus_gait::{BodyLayout, FootTarget, GaitEngine, IkOutcome, forward_kinematics, solve_leg_ik};
use talus_types::{
    GaitType, JointAngles, LEG_COUNT, Leg, LegId, LocomotionParams, Pose, RobotMode, RobotState,
    SensorSnapshot, TalusError, Velocity, wrap_angle,
};
use tracing::{debug, error, info, warn};

use crate::driver::LegDriver;

/// Body height while the emergency stop is latched, as a fraction of the
/// configured height.
pub const EMERGENCY_BODY_RATIO: f32 = 0.5;
/// Stability threshold imposed by climb mode.
pub const CLIMB_STABILITY_THRESHOLD: f32 = 0.8;
const CLIMB_STEP_HEIGHT_SCALE: f32 = 1.5;
const CLIMB_SPEED_SCALE: f32 = 0.5;

/// Minimum number of planted legs for a non-zero stability margin.
pub const MIN_SUPPORT_LEGS: usize = 3;

/// Normalised tip-over score in `[0, 1]`.
///
/// Zero with fewer than [`MIN_SUPPORT_LEGS`] grounded legs; otherwise the
/// grounded fraction, penalised by up to one half as the horizontal speed
/// approaches `max_speed`.
pub fn stability_margin(legs: &[Leg; LEG_COUNT], velocity: &Velocity, max_speed: f32) -> f32 {
    let grounded = legs.iter().filter(|l| l.grounded).count();
    if grounded < MIN_SUPPORT_LEGS {
        return 0.0;
    }
    let support = grounded as f32 / LEG_COUNT as f32;
    let speed_ratio = if max_speed > 0.0 {
        (velocity.planar_speed() / max_speed).min(1.0)
    } else {
        1.0
    };
    support * (1.0 - 0.5 * speed_ratio)
}

/// Outcome of one successful tick.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveReport {
    /// Velocity actually executed after clamping to the speed limits.
    pub velocity: Velocity,
    pub stability_margin: f32,
    /// `stability_margin >= params.stability_threshold`.
    pub stable: bool,
    pub grounded_legs: usize,
    /// Legs whose IK target was unreachable this tick.
    pub soft_faults: Vec<LegId>,
}

pub struct LocomotionController {
    state: RobotState,
    params: LocomotionParams,
    /// Parameters in force before climb mode was enabled.
    pre_climb: Option<LocomotionParams>,
    engine: GaitEngine,
    layout: BodyLayout,
    driver: Box<dyn LegDriver>,
    estop_latched: bool,
}

impl LocomotionController {
    /// Controller with the default chassis layout, standing at the origin.
    pub fn new(params: LocomotionParams, driver: Box<dyn LegDriver>) -> Result<Self, TalusError> {
        Self::with_layout(params, BodyLayout::default(), driver)
    }

    pub fn with_layout(
        params: LocomotionParams,
        layout: BodyLayout,
        driver: Box<dyn LegDriver>,
    ) -> Result<Self, TalusError> {
        params.validate()?;
        let legs = stance(&layout, params.body_height, &[JointAngles::default(); LEG_COUNT]);
        let state = RobotState {
            pose: Pose::new(0.0, 0.0, params.body_height),
            velocity: Velocity::zero(),
            legs,
            battery_level: 100.0,
            mode: RobotMode::Idle,
            sensors: SensorSnapshot::default(),
            timestamp: Utc::now(),
        };
        info!(driver = driver.id(), gait = %params.gait, "locomotion controller ready");
        Ok(Self {
            state,
            params,
            pre_climb: None,
            engine: GaitEngine::new(params.gait, layout),
            layout,
            driver,
            estop_latched: false,
        })
    }

    // ────────────────────────────────────────────────────────────────────────
    // Movement
    // ────────────────────────────────────────────────────────────────────────

    /// Execute one gait tick at `velocity`.
    ///
    /// # Errors
    ///
    /// - [`TalusError::EmergencyStopLatched`] while latched; state untouched.
    /// - [`TalusError::MovementFailed`] if the leg driver rejected the
    ///   command; the emergency stop is latched before returning.
    pub async fn move_to_target(&mut self, velocity: Velocity) -> Result<MoveReport, TalusError> {
        if self.estop_latched {
            return Err(TalusError::EmergencyStopLatched);
        }

        let velocity = self.clamp_velocity(velocity);
        self.state.mode = if self.pre_climb.is_some() {
            RobotMode::Climbing
        } else {
            RobotMode::Walking
        };

        self.engine.set_gait(self.params.gait);
        let dt = self.params.control_period_s;
        let feet = self.engine.step(dt, &velocity, &self.params);

        let mut soft_faults = Vec::new();
        let mut legs = self.state.legs;
        for (leg, foot) in legs.iter_mut().zip(feet.iter()) {
            if !self.solve_leg(leg, foot) {
                soft_faults.push(leg.id);
            }
        }

        if let Err(e) = self.driver.apply(&legs) {
            error!(error = %e, driver = self.driver.id(), "leg driver failed, stopping");
            self.emergency_stop_sequence();
            return Err(TalusError::MovementFailed(e.to_string()));
        }

        self.state.legs = legs;
        self.integrate_pose(&velocity, dt);
        self.state.velocity = velocity;
        self.state.timestamp = Utc::now();

        let margin = self.calculate_stability_margin();
        let report = MoveReport {
            velocity,
            stability_margin: margin,
            stable: margin >= self.params.stability_threshold,
            grounded_legs: self.state.grounded_legs(),
            soft_faults,
        };
        debug!(
            x = self.state.pose.position.x,
            y = self.state.pose.position.y,
            yaw = self.state.pose.orientation.yaw,
            margin,
            "tick"
        );

        if self.params.tick_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.params.tick_delay_ms)).await;
        }
        Ok(report)
    }

    /// Zero the velocity, plant all six feet in the neutral stance and go
    /// idle.  Safe to call at any time; driver errors are logged.
    pub fn stop_movement(&mut self) {
        self.plant(self.params.body_height);
        self.state.velocity = Velocity::zero();
        self.state.mode = RobotMode::Idle;
        self.state.timestamp = Utc::now();
        debug!("movement stopped");
    }

    /// Latch the emergency stop, stop, and crouch to
    /// [`EMERGENCY_BODY_RATIO`] of the body height.
    pub fn emergency_stop_sequence(&mut self) {
        if !self.estop_latched {
            warn!("emergency stop latched");
        }
        self.estop_latched = true;
        self.stop_movement();
        let lowered = self.params.body_height * EMERGENCY_BODY_RATIO;
        self.plant(lowered);
        self.state.pose.position.z = lowered;
        self.state.mode = RobotMode::Emergency;
    }

    /// Clear the latch and stand back up to the configured body height.
    pub fn reset_emergency_stop(&mut self) {
        if !self.estop_latched {
            return;
        }
        self.estop_latched = false;
        self.stop_movement();
        self.state.pose.position.z = self.params.body_height;
        info!("emergency stop reset");
    }

    pub fn is_emergency_stopped(&self) -> bool {
        self.estop_latched
    }

    // ────────────────────────────────────────────────────────────────────────
    // Configuration
    // ────────────────────────────────────────────────────────────────────────

    /// Enter or leave climb mode.  Leaving restores the exact parameters in
    /// force before entering.  Repeated calls with the same flag are no-ops.
    pub fn set_climb_mode(&mut self, enable: bool) {
        match (enable, self.pre_climb) {
            (true, None) => {
                self.pre_climb = Some(self.params);
                self.params = climb_params(&self.params);
                info!(gait = %self.params.gait, "climb mode enabled");
            }
            (false, Some(saved)) => {
                self.pre_climb = None;
                self.params = saved;
                info!(gait = %self.params.gait, "climb mode disabled");
            }
            _ => return,
        }
        self.engine.set_gait(self.params.gait);
        if self.state.mode == RobotMode::Walking || self.state.mode == RobotMode::Climbing {
            self.state.mode = if enable {
                RobotMode::Climbing
            } else {
                RobotMode::Walking
            };
        }
    }

    pub fn is_climbing(&self) -> bool {
        self.pre_climb.is_some()
    }

    /// Replace the locomotion parameters; they take effect on the next tick.
    ///
    /// While climbing, `params` becomes the baseline restored on exit and the
    /// climb overrides are re-applied on top of it.
    pub fn update_params(&mut self, params: LocomotionParams) -> Result<(), TalusError> {
        params.validate()?;
        if self.pre_climb.is_some() {
            self.pre_climb = Some(params);
            self.params = climb_params(&params);
        } else {
            self.params = params;
        }
        info!(gait = %self.params.gait, max_speed = self.params.max_speed, "locomotion params updated");
        Ok(())
    }

    pub fn params(&self) -> &LocomotionParams {
        &self.params
    }

    /// Switch into a stationary working posture (inspection, deployment) or
    /// back to idle.
    pub fn set_mode(&mut self, mode: RobotMode) -> Result<(), TalusError> {
        if mode == RobotMode::Emergency {
            self.emergency_stop_sequence();
            return Ok(());
        }
        if self.estop_latched {
            return Err(TalusError::EmergencyStopLatched);
        }
        if matches!(mode, RobotMode::Idle | RobotMode::Inspection | RobotMode::Deployment) {
            self.stop_movement();
        }
        self.state.mode = mode;
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────────────
    // State
    // ────────────────────────────────────────────────────────────────────────

    pub fn calculate_stability_margin(&self) -> f32 {
        stability_margin(&self.state.legs, &self.state.velocity, self.params.max_speed)
    }

    /// Overwrite the pose with an external localisation estimate.
    pub fn update_pose_estimate(&mut self, pose: Pose) {
        self.state.pose = pose;
    }

    /// Store the latest sensor-pod snapshot; the battery level follows it.
    pub fn update_sensors(&mut self, sensors: SensorSnapshot) {
        self.state.battery_level = sensors.battery_percent;
        self.state.sensors = sensors;
    }

    /// Copy of the current robot state.
    pub fn state(&self) -> RobotState {
        self.state.clone()
    }

    pub fn gait(&self) -> GaitType {
        self.engine.gait()
    }

    // ────────────────────────────────────────────────────────────────────────
    // Internals
    // ────────────────────────────────────────────────────────────────────────

    fn clamp_velocity(&self, mut velocity: Velocity) -> Velocity {
        let speed = velocity.planar_speed();
        if speed > self.params.max_speed {
            let k = self.params.max_speed / speed;
            velocity.linear.x *= k;
            velocity.linear.y *= k;
        }
        velocity.linear.z = 0.0;
        velocity.angular.z = velocity
            .angular
            .z
            .clamp(-self.params.max_yaw_rate, self.params.max_yaw_rate);
        velocity
    }

    /// Solve IK for one leg in place.  Returns `false` on a soft fault.
    fn solve_leg(&self, leg: &mut Leg, foot: &FootTarget) -> bool {
        let hip_target = self.layout.body_to_hip(leg.id, foot.position);
        let outcome = solve_leg_ik(&self.layout.geometry, hip_target, &leg.angles);
        if let IkOutcome::Fallback { span, .. } = outcome {
            warn!(leg = ?leg.id, span, "leg target unreachable, using fallback pose");
        }
        leg.angles = outcome.angles();
        leg.foot_position = self
            .layout
            .hip_to_body(leg.id, forward_kinematics(&self.layout.geometry, &leg.angles));
        leg.grounded = foot.grounded;
        !outcome.is_fallback()
    }

    fn plant(&mut self, body_height: f32) {
        let current = self.state.legs.map(|l| l.angles);
        let legs = stance(&self.layout, body_height, &current);
        if let Err(e) = self.driver.apply(&legs) {
            warn!(error = %e, "leg driver rejected stance command");
        }
        self.state.legs = legs;
    }

    fn integrate_pose(&mut self, velocity: &Velocity, dt: f32) {
        let pose = &mut self.state.pose;
        let (s, c) = pose.orientation.yaw.sin_cos();
        pose.position.x += (velocity.linear.x * c - velocity.linear.y * s) * dt;
        pose.position.y += (velocity.linear.x * s + velocity.linear.y * c) * dt;
        pose.orientation.yaw = wrap_angle(pose.orientation.yaw + velocity.angular.z * dt);
    }
}

fn climb_params(base: &LocomotionParams) -> LocomotionParams {
    LocomotionParams {
        gait: GaitType::Wave,
        step_height: base.step_height * CLIMB_STEP_HEIGHT_SCALE,
        max_speed: base.max_speed * CLIMB_SPEED_SCALE,
        stability_threshold: CLIMB_STABILITY_THRESHOLD,
        ..*base
    }
}

/// Six planted legs in the neutral stance at `body_height`.
fn stance(layout: &BodyLayout, body_height: f32, current: &[JointAngles; LEG_COUNT]) -> [Leg; LEG_COUNT] {
    LegId::ALL.map(|id| {
        let foot = layout.neutral_foot(id, body_height);
        let hip = layout.body_to_hip(id, foot);
        let angles = solve_leg_ik(&layout.geometry, hip, &current[id.index()]).angles();
        Leg {
            id,
            angles,
            foot_position: layout.hip_to_body(id, forward_kinematics(&layout.geometry, &angles)),
            grounded: true,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{SimLegDriver, SimLegProbe};
    use talus_types::Vec3;

    fn fast_params() -> LocomotionParams {
        LocomotionParams {
            tick_delay_ms: 0,
            ..Default::default()
        }
    }

    fn controller() -> (LocomotionController, SimLegProbe) {
        let (driver, probe) = SimLegDriver::new("sim");
        (LocomotionController::new(fast_params(), driver).unwrap(), probe)
    }

    #[tokio::test]
    async fn tripod_move_sets_walking_and_velocity() {
        let (mut loco, probe) = controller();
        assert_eq!(loco.gait(), GaitType::Tripod);

        let v = Velocity {
            linear: Vec3::new(0.1, 0.0, 0.0),
            angular: Vec3::ZERO,
        };
        let report = loco.move_to_target(v).await.unwrap();

        let state = loco.state();
        assert_eq!(state.mode, RobotMode::Walking);
        assert_eq!(state.velocity.linear.x, 0.1);
        assert!(report.soft_faults.is_empty());
        assert!(report.grounded_legs >= 3);
        assert!(probe.commands() >= 1);
    }

    #[tokio::test]
    async fn pose_integrates_over_control_period() {
        let (mut loco, _) = controller();
        for _ in 0..20 {
            loco.move_to_target(Velocity::planar(0.1, 0.0)).await.unwrap();
        }
        let x = loco.state().pose.position.x;
        // 20 ticks × 0.05 s × 0.1 m/s
        assert!((x - 0.1).abs() < 1e-4, "x = {x}");
    }

    #[tokio::test]
    async fn velocity_is_clamped_to_limits() {
        let (mut loco, _) = controller();
        let report = loco.move_to_target(Velocity::planar(5.0, 10.0)).await.unwrap();
        assert!((report.velocity.planar_speed() - 0.25).abs() < 1e-6);
        assert!((report.velocity.angular.z - 0.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn move_fails_while_latched_until_reset() {
        let (mut loco, probe) = controller();
        loco.emergency_stop_sequence();
        let before = loco.state();
        let sent = probe.commands();

        let err = loco.move_to_target(Velocity::planar(0.1, 0.0)).await.unwrap_err();
        assert_eq!(err, TalusError::EmergencyStopLatched);
        assert_eq!(loco.state().pose, before.pose);
        assert_eq!(loco.state().mode, RobotMode::Emergency);
        assert_eq!(probe.commands(), sent);

        loco.reset_emergency_stop();
        assert!(loco.move_to_target(Velocity::planar(0.1, 0.0)).await.is_ok());
    }

    #[tokio::test]
    async fn emergency_stop_lowers_and_reset_restores_body() {
        let (mut loco, _) = controller();
        loco.move_to_target(Velocity::planar(0.1, 0.0)).await.unwrap();
        loco.emergency_stop_sequence();

        let state = loco.state();
        assert!(state.velocity.is_zero());
        assert_eq!(state.grounded_legs(), 6);
        assert!((state.pose.position.z - 0.06).abs() < 1e-6);
        for leg in state.legs {
            assert!((leg.foot_position.z + 0.06).abs() < 1e-4);
        }

        loco.reset_emergency_stop();
        let state = loco.state();
        assert_eq!(state.mode, RobotMode::Idle);
        for leg in state.legs {
            assert!((leg.foot_position.z + 0.12).abs() < 1e-4);
        }
    }

    #[tokio::test]
    async fn driver_failure_latches_emergency_stop() {
        let (mut loco, probe) = controller();
        probe.inject_fault("bus timeout");

        let err = loco.move_to_target(Velocity::planar(0.1, 0.0)).await.unwrap_err();
        assert!(matches!(err, TalusError::MovementFailed(ref m) if m.contains("bus timeout")));
        assert!(loco.is_emergency_stopped());
        assert_eq!(loco.state().mode, RobotMode::Emergency);

        probe.clear_fault();
        assert_eq!(
            loco.move_to_target(Velocity::planar(0.1, 0.0)).await.unwrap_err(),
            TalusError::EmergencyStopLatched
        );
    }

    #[tokio::test]
    async fn stop_movement_grounds_everything() {
        let (mut loco, _) = controller();
        for _ in 0..3 {
            loco.move_to_target(Velocity::planar(0.2, 0.0)).await.unwrap();
        }
        loco.stop_movement();
        let state = loco.state();
        assert_eq!(state.mode, RobotMode::Idle);
        assert!(state.velocity.is_zero());
        assert_eq!(state.grounded_legs(), 6);
    }

    #[test]
    fn climb_mode_is_symmetric() {
        let (mut loco, _) = controller();
        let before = *loco.params();

        loco.set_climb_mode(true);
        let climbing = *loco.params();
        assert_eq!(loco.gait(), GaitType::Wave);
        assert_eq!(climbing.gait, GaitType::Wave);
        assert!((climbing.step_height - before.step_height * 1.5).abs() < 1e-6);
        assert!((climbing.max_speed - before.max_speed * 0.5).abs() < 1e-6);
        assert_eq!(climbing.stability_threshold, CLIMB_STABILITY_THRESHOLD);

        // Enabling twice must not compound the scaling.
        loco.set_climb_mode(true);
        assert_eq!(*loco.params(), climbing);

        loco.set_climb_mode(false);
        assert_eq!(*loco.params(), before);
        assert_eq!(loco.gait(), GaitType::Tripod);
    }

    #[tokio::test]
    async fn climbing_moves_report_climbing_mode() {
        let (mut loco, _) = controller();
        loco.set_climb_mode(true);
        loco.move_to_target(Velocity::planar(0.05, 0.0)).await.unwrap();
        assert_eq!(loco.state().mode, RobotMode::Climbing);
    }

    #[test]
    fn update_params_while_climbing_updates_baseline() {
        let (mut loco, _) = controller();
        loco.set_climb_mode(true);
        let new_base = LocomotionParams {
            max_speed: 0.4,
            ..fast_params()
        };
        loco.update_params(new_base).unwrap();
        assert!((loco.params().max_speed - 0.2).abs() < 1e-6);

        loco.set_climb_mode(false);
        assert_eq!(*loco.params(), new_base);
    }

    #[test]
    fn invalid_params_are_rejected() {
        let (mut loco, _) = controller();
        let bad = LocomotionParams {
            body_height: -1.0,
            ..fast_params()
        };
        assert!(matches!(loco.update_params(bad), Err(TalusError::Config(_))));
        assert_eq!(loco.params().body_height, 0.12);
    }

    #[test]
    fn margin_is_zero_below_three_grounded_legs() {
        let base = stance(&BodyLayout::default(), 0.12, &[JointAngles::default(); LEG_COUNT]);
        let velocities = [
            Velocity::zero(),
            Velocity::planar(0.1, 0.0),
            Velocity::planar(1.0, 0.5),
        ];
        // Every subset of grounded legs.
        for mask in 0u32..64 {
            let mut legs = base;
            for (i, leg) in legs.iter_mut().enumerate() {
                leg.grounded = mask & (1 << i) != 0;
            }
            let grounded = mask.count_ones() as usize;
            for v in &velocities {
                for max_speed in [0.1, 0.25, 1.0] {
                    let m = stability_margin(&legs, v, max_speed);
                    if grounded < 3 {
                        assert_eq!(m, 0.0);
                    } else {
                        assert!(m > 0.0 && m <= 1.0);
                    }
                }
            }
        }
    }

    #[test]
    fn margin_drops_with_speed() {
        let legs = stance(&BodyLayout::default(), 0.12, &[JointAngles::default(); LEG_COUNT]);
        let still = stability_margin(&legs, &Velocity::zero(), 0.25);
        let moving = stability_margin(&legs, &Velocity::planar(0.25, 0.0), 0.25);
        assert!((still - 1.0).abs() < 1e-6);
        assert!((moving - 0.5).abs() < 1e-6);
    }

    #[test]
    fn set_mode_rejected_while_latched() {
        let (mut loco, _) = controller();
        loco.set_mode(RobotMode::Inspection).unwrap();
        assert_eq!(loco.state().mode, RobotMode::Inspection);

        loco.emergency_stop_sequence();
        assert_eq!(
            loco.set_mode(RobotMode::Deployment),
            Err(TalusError::EmergencyStopLatched)
        );
    }

    #[test]
    fn sensors_drive_battery_level() {
        let (mut loco, _) = controller();
        loco.update_sensors(SensorSnapshot::default().with_battery_voltage(3.1));
        assert_eq!(loco.state().battery_level, 20.0);
    }
}

//! Gait pattern generation.
//!
//! A gait is a phase schedule: every leg owns a phase offset inside a
//! repeating cycle, and spends the first `duty` fraction of its own phase in
//! *swing* (foot lifted, travelling forward) and the rest in *stance* (foot
//! planted, sliding backward relative to the body as the body advances).
//!
//! | Gait | Offsets | Swing duty | Grounded legs |
//! |------|---------|-----------|---------------|
//! | Tripod | two tripods, ½ cycle apart | 0.4 | ≥ 3 |
//! | Wave   | one leg every ⅙ cycle      | ⅙   | ≥ 5 |
//! | Ripple | diagonal pairs every ⅓     | 0.3 | ≥ 4 |
//!
//! [`GaitEngine`] keeps a continuous phase accumulator and turns a velocity
//! command into six body-frame foot targets per tick.
//!
//! # Example
//!
//! ```rust
//! use talus_gait::gait::GaitEngine;
//! use talus_gait::kinematics::BodyLayout;
//! use talus_types::{GaitType, LocomotionParams, Velocity};
//!
//! let params = LocomotionParams::default();
//! let mut engine = GaitEngine::new(GaitType::Tripod, BodyLayout::default());
//! let feet = engine.step(params.control_period_s, &Velocity::planar(0.1, 0.0), &params);
//! assert!(feet.iter().filter(|f| f.grounded).count() >= 3);
//! ```

use std::f32::consts::PI;

use talus_types::{GaitType, LEG_COUNT, LegId, LocomotionParams, Vec3, Velocity};
use tracing::debug;

use crate::kinematics::BodyLayout;

// ────────────────────────────────────────────────────────────────────────────
// GaitPattern
// ────────────────────────────────────────────────────────────────────────────

/// Static description of a gait.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaitPattern {
    pub gait: GaitType,
    /// Cycle length (s).
    pub cycle_s: f32,
    /// Fraction of each leg's cycle spent in swing.
    pub duty: f32,
    /// Normalised phase at which each leg's swing starts, by leg index.
    pub offsets: [f32; LEG_COUNT],
}

impl GaitPattern {
    /// Schedule for `gait`.
    pub fn for_gait(gait: GaitType) -> Self {
        // Leg index order: FL, ML, RL, FR, MR, RR.
        match gait {
            GaitType::Tripod => Self {
                gait,
                cycle_s: 1.0,
                duty: 0.4,
                // {FL, RL, MR} then {ML, FR, RR}.
                offsets: [0.0, 0.5, 0.0, 0.5, 0.0, 0.5],
            },
            GaitType::Wave => Self {
                gait,
                cycle_s: 1.8,
                duty: 1.0 / 6.0,
                // Rear-to-front on the right side, then on the left.
                offsets: [5.0 / 6.0, 4.0 / 6.0, 3.0 / 6.0, 2.0 / 6.0, 1.0 / 6.0, 0.0],
            },
            GaitType::Ripple => Self {
                gait,
                cycle_s: 1.2,
                duty: 0.3,
                // (FL, RR), (ML, MR), (RL, FR).
                offsets: [0.0, 1.0 / 3.0, 2.0 / 3.0, 2.0 / 3.0, 1.0 / 3.0, 0.0],
            },
        }
    }

    /// Leg-local phase in `[0, 1)` for a normalised cycle phase.
    pub fn leg_phase(&self, phase: f32, leg: LegId) -> f32 {
        (phase - self.offsets[leg.index()]).rem_euclid(1.0)
    }

    /// `true` when `leg` is lifted at `phase`.
    pub fn is_swing(&self, phase: f32, leg: LegId) -> bool {
        self.leg_phase(phase, leg) < self.duty
    }

    /// Number of planted legs at `phase`.
    pub fn grounded_count(&self, phase: f32) -> usize {
        LegId::ALL
            .iter()
            .filter(|leg| !self.is_swing(phase, **leg))
            .count()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// GaitEngine
// ────────────────────────────────────────────────────────────────────────────

/// Desired foot placement for one leg at the current tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FootTarget {
    pub leg: LegId,
    /// Body-frame position.
    pub position: Vec3,
    pub grounded: bool,
}

/// Observable gait state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaitState {
    pub pattern: GaitPattern,
    /// Phase accumulator (s), always in `[0, cycle_s)`.
    pub phase_s: f32,
}

impl GaitState {
    /// Phase normalised to `[0, 1)`.
    pub fn normalized_phase(&self) -> f32 {
        self.phase_s / self.pattern.cycle_s
    }
}

/// Continuous gait generator.
#[derive(Debug, Clone)]
pub struct GaitEngine {
    state: GaitState,
    layout: BodyLayout,
}

impl GaitEngine {
    pub fn new(gait: GaitType, layout: BodyLayout) -> Self {
        Self {
            state: GaitState {
                pattern: GaitPattern::for_gait(gait),
                phase_s: 0.0,
            },
            layout,
        }
    }

    pub fn state(&self) -> GaitState {
        self.state
    }

    pub fn gait(&self) -> GaitType {
        self.state.pattern.gait
    }

    pub fn layout(&self) -> &BodyLayout {
        &self.layout
    }

    /// Swap the gait while keeping the normalised phase, so feet do not jump.
    pub fn set_gait(&mut self, gait: GaitType) {
        if gait == self.state.pattern.gait {
            return;
        }
        let phase = self.state.normalized_phase();
        debug!(from = %self.state.pattern.gait, to = %gait, phase, "gait switched");
        let pattern = GaitPattern::for_gait(gait);
        self.state = GaitState {
            phase_s: (phase * pattern.cycle_s).rem_euclid(pattern.cycle_s),
            pattern,
        };
    }

    /// Advance the phase accumulator by `dt` seconds.
    pub fn advance(&mut self, dt: f32) {
        let cycle = self.state.pattern.cycle_s;
        self.state.phase_s = (self.state.phase_s + dt.max(0.0)).rem_euclid(cycle);
    }

    /// Advance by `dt` and return the foot targets for `velocity`.
    pub fn step(
        &mut self,
        dt: f32,
        velocity: &Velocity,
        params: &LocomotionParams,
    ) -> [FootTarget; LEG_COUNT] {
        self.advance(dt);
        self.foot_targets(velocity, params)
    }

    /// Foot targets at the current phase without advancing it.
    pub fn foot_targets(
        &self,
        velocity: &Velocity,
        params: &LocomotionParams,
    ) -> [FootTarget; LEG_COUNT] {
        let phase = self.state.normalized_phase();
        LegId::ALL.map(|leg| self.foot_target(leg, phase, velocity, params))
    }

    fn foot_target(
        &self,
        leg: LegId,
        phase: f32,
        velocity: &Velocity,
        params: &LocomotionParams,
    ) -> FootTarget {
        let pattern = &self.state.pattern;
        let neutral = self.layout.neutral_foot(leg, params.body_height);
        let stride = self.stride(neutral, velocity, params);
        let local = pattern.leg_phase(phase, leg);

        if local < pattern.duty {
            // Swing: rear extreme → front extreme under a half-sine lift.
            let w = local / pattern.duty;
            let offset = stride.scale(w - 0.5);
            FootTarget {
                leg,
                position: Vec3::new(
                    neutral.x + offset.x,
                    neutral.y + offset.y,
                    neutral.z + params.step_height * (PI * w).sin(),
                ),
                grounded: false,
            }
        } else {
            // Stance: foot planted, slides front → rear relative to the body.
            let s = (local - pattern.duty) / (1.0 - pattern.duty);
            let offset = stride.scale(0.5 - s);
            FootTarget {
                leg,
                position: Vec3::new(neutral.x + offset.x, neutral.y + offset.y, neutral.z),
                grounded: true,
            }
        }
    }

    /// Planar stride vector for a foot, combining translation and yaw.
    fn stride(&self, neutral: Vec3, velocity: &Velocity, params: &LocomotionParams) -> Vec3 {
        let mut stride = Vec3::ZERO;

        let speed = velocity.planar_speed();
        if speed > f32::EPSILON {
            let scale = (speed / params.max_speed).min(1.0) * params.step_length / speed;
            stride = Vec3::new(velocity.linear.x * scale, velocity.linear.y * scale, 0.0);
        }

        let yaw_rate = velocity.angular.z;
        let radius = neutral.planar_norm();
        if yaw_rate.abs() > f32::EPSILON && radius > f32::EPSILON {
            let scale = (yaw_rate.abs() / params.max_yaw_rate).min(1.0) * params.step_length
                * yaw_rate.signum()
                / radius;
            stride = stride.add(&Vec3::new(-neutral.y * scale, neutral.x * scale, 0.0));
        }

        let len = stride.planar_norm();
        if len > params.step_length {
            stride = stride.scale(params.step_length / len);
        }
        stride
    }
}

//! Per-leg inverse and forward kinematics.
//!
//! Each leg is a three-joint chain: a coxa (hip yaw) link of fixed length
//! followed by a femur and a tibia moving in the vertical plane selected by
//! the coxa.  Targets are expressed in the *hip frame*: origin at the coxa
//! joint, +X pointing radially outward along the hip mount, +Z up.
//!
//! ```text
//!   hip ──coxa──●  femur
//!                ╲______●
//!                        ╲ tibia
//!                         ╲
//!                          ● foot
//! ```
//!
//! # Example
//!
//! ```rust
//! use talus_gait::kinematics::{forward_kinematics, solve_leg_ik, LegGeometry};
//! use talus_types::{JointAngles, Vec3};
//!
//! let geom = LegGeometry::default();
//! let target = Vec3::new(0.14, 0.02, -0.10);
//! let outcome = solve_leg_ik(&geom, target, &JointAngles::default());
//! assert!(!outcome.is_fallback());
//!
//! let reached = forward_kinematics(&geom, &outcome.angles());
//! assert!(reached.sub(&target).norm() < 1e-4);
//! ```

use std::f32::consts::PI;

use talus_types::{JointAngles, LEG_COUNT, LegId, Vec3};

/// Femur angle used when a target cannot be reached.
pub const DEFAULT_FEMUR_RAD: f32 = 0.35;
/// Tibia angle used when a target cannot be reached.
pub const DEFAULT_TIBIA_RAD: f32 = -1.6;

/// Fixed link lengths of one leg (metres).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegGeometry {
    pub coxa_length: f32,
    pub femur_length: f32,
    pub tibia_length: f32,
}

impl Default for LegGeometry {
    fn default() -> Self {
        Self {
            coxa_length: 0.05,
            femur_length: 0.08,
            tibia_length: 0.12,
        }
    }
}

impl LegGeometry {
    /// Longest femur+tibia span.
    pub fn max_span(&self) -> f32 {
        self.femur_length + self.tibia_length
    }

    /// Shortest femur+tibia span (fully folded).
    pub fn min_span(&self) -> f32 {
        (self.femur_length - self.tibia_length).abs()
    }
}

/// Result of an IK query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IkOutcome {
    /// The target is reachable; these angles place the foot on it.
    Solved(JointAngles),
    /// The target is out of reach.  `angles` keeps the current coxa yaw and
    /// the default femur/tibia pose; `span` is the femur/tibia distance that
    /// was requested.
    Fallback { angles: JointAngles, span: f32 },
}

impl IkOutcome {
    /// Angles to command, whichever branch was taken.
    pub fn angles(&self) -> JointAngles {
        match self {
            IkOutcome::Solved(a) => *a,
            IkOutcome::Fallback { angles, .. } => *angles,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, IkOutcome::Fallback { .. })
    }
}

/// Solve the joint angles that place the foot at `target` (hip frame).
///
/// Never fails: unreachable or degenerate targets yield
/// [`IkOutcome::Fallback`] built from `current.coxa` and the default
/// femur/tibia angles.  The knee-up branch is always chosen.
pub fn solve_leg_ik(geom: &LegGeometry, target: Vec3, current: &JointAngles) -> IkOutcome {
    let coxa = target.y.atan2(target.x);
    let reach = target.planar_norm() - geom.coxa_length;
    let height = target.z;
    let span = (reach * reach + height * height).sqrt();

    let fallback = IkOutcome::Fallback {
        angles: JointAngles {
            coxa: current.coxa,
            femur: DEFAULT_FEMUR_RAD,
            tibia: DEFAULT_TIBIA_RAD,
        },
        span,
    };

    if !span.is_finite() || span <= f32::EPSILON {
        return fallback;
    }
    if span > geom.max_span() + 1e-6 || span < geom.min_span() - 1e-6 {
        return fallback;
    }

    let f = geom.femur_length;
    let t = geom.tibia_length;

    // Angle between the hip→foot line and the femur.
    let cos_alpha = ((f * f + span * span - t * t) / (2.0 * f * span)).clamp(-1.0, 1.0);
    // Interior knee angle.
    let cos_beta = ((f * f + t * t - span * span) / (2.0 * f * t)).clamp(-1.0, 1.0);

    let femur = height.atan2(reach) + cos_alpha.acos();
    let tibia = cos_beta.acos() - PI;

    IkOutcome::Solved(JointAngles { coxa, femur, tibia })
}

/// Foot position (hip frame) produced by `angles`.
pub fn forward_kinematics(geom: &LegGeometry, angles: &JointAngles) -> Vec3 {
    let knee_angle = angles.femur + angles.tibia;
    let reach = geom.coxa_length
        + geom.femur_length * angles.femur.cos()
        + geom.tibia_length * knee_angle.cos();
    let height = geom.femur_length * angles.femur.sin() + geom.tibia_length * knee_angle.sin();
    Vec3::new(reach * angles.coxa.cos(), reach * angles.coxa.sin(), height)
}

// ────────────────────────────────────────────────────────────────────────────
// Body layout
// ────────────────────────────────────────────────────────────────────────────

/// Where a leg attaches to the body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HipMount {
    /// Coxa joint position in the body frame.
    pub position: Vec3,
    /// Direction the hip frame's +X axis points, measured from body +X.
    pub mount_angle: f32,
}

/// Chassis geometry: six hip mounts plus the shared leg geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyLayout {
    pub hips: [HipMount; LEG_COUNT],
    pub geometry: LegGeometry,
    /// Horizontal hip-to-foot distance of the neutral stance.
    pub neutral_reach: f32,
}

impl Default for BodyLayout {
    fn default() -> Self {
        let mount = |x: f32, y: f32, deg: f32| HipMount {
            position: Vec3::new(x, y, 0.0),
            mount_angle: deg.to_radians(),
        };
        Self {
            // Index order follows `LegId::ALL`.
            hips: [
                mount(0.12, 0.08, 45.0),
                mount(0.0, 0.10, 90.0),
                mount(-0.12, 0.08, 135.0),
                mount(0.12, -0.08, -45.0),
                mount(0.0, -0.10, -90.0),
                mount(-0.12, -0.08, -135.0),
            ],
            geometry: LegGeometry::default(),
            neutral_reach: 0.14,
        }
    }
}

impl BodyLayout {
    /// Neutral stance foot position (body frame) for `leg` at `body_height`.
    pub fn neutral_foot(&self, leg: LegId, body_height: f32) -> Vec3 {
        let hip = &self.hips[leg.index()];
        Vec3::new(
            hip.position.x + self.neutral_reach * hip.mount_angle.cos(),
            hip.position.y + self.neutral_reach * hip.mount_angle.sin(),
            -body_height,
        )
    }

    /// Express a body-frame foot position in the leg's hip frame.
    pub fn body_to_hip(&self, leg: LegId, foot: Vec3) -> Vec3 {
        let hip = &self.hips[leg.index()];
        let v = foot.sub(&hip.position);
        let (s, c) = (-hip.mount_angle).sin_cos();
        Vec3::new(v.x * c - v.y * s, v.x * s + v.y * c, v.z)
    }

    /// Inverse of [`BodyLayout::body_to_hip`].
    pub fn hip_to_body(&self, leg: LegId, foot: Vec3) -> Vec3 {
        let hip = &self.hips[leg.index()];
        let (s, c) = hip.mount_angle.sin_cos();
        Vec3::new(foot.x * c - foot.y * s, foot.x * s + foot.y * c, foot.z).add(&hip.position)
    }
}

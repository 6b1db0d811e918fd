//! `talus-gait` – Kinematics & Gait Engine
//!
//! Pure geometry: turns a body velocity command into six foot placements and
//! the joint angles that reach them.  Nothing here blocks, allocates per tick,
//! or returns an error.
//!
//! # Modules
//!
//! - [`kinematics`] – [`solve_leg_ik`][kinematics::solve_leg_ik] and
//!   [`forward_kinematics`][kinematics::forward_kinematics] for one
//!   three-joint leg, plus the [`BodyLayout`][kinematics::BodyLayout] that
//!   maps between the body frame and each leg's hip frame.  Unreachable
//!   targets degrade to a fallback pose instead of failing.
//! - [`gait`] – [`GaitPattern`][gait::GaitPattern] schedules for the tripod,
//!   wave and ripple gaits and the [`GaitEngine`][gait::GaitEngine] phase
//!   accumulator that produces per-leg swing/stance foot targets.

pub mod gait;
pub mod kinematics;

pub use gait::{FootTarget, GaitEngine, GaitPattern, GaitState};
pub use kinematics::{
    BodyLayout, HipMount, IkOutcome, LegGeometry, forward_kinematics, solve_leg_ik,
};

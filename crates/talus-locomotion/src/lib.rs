//! `talus-locomotion` – Locomotion Controller
//!
//! Owns the one mutable [`RobotState`][talus_types::RobotState], drives the
//! gait engine each tick, and enforces the emergency stop.
//!
//! # Modules
//!
//! - [`controller`] – [`LocomotionController`][controller::LocomotionController]:
//!   velocity-commanded gait ticks, stop / emergency-stop / climb mode, live
//!   parameter updates and the [`stability_margin`][controller::stability_margin]
//!   score.
//! - [`driver`] – [`LegDriver`][driver::LegDriver]: the trait servo drivers
//!   implement, plus the recording [`SimLegDriver`][driver::SimLegDriver] used
//!   in headless runs.

pub mod controller;
pub mod driver;

pub use controller::{LocomotionController, MoveReport, stability_margin};
pub use driver::{LegDriver, SimLegDriver, SimLegProbe};

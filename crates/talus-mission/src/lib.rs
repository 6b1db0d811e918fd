//! `talus-mission` – mission control for the Talus slope-patrol hexapod.
//!
//! # Modules
//!
//! - [`controller`] – [`MissionController`], its control loop and the
//!   [`MissionHandle`] used to command it from other tasks.
//! - [`safety`] – [`SafetyMonitor`] rule engine (battery, stability, cliff).
//! - [`steering`] – heading PID and waypoint steering law.
//! - [`collaborators`] – [`VisionSource`] and [`DeploymentSubsystem`] seams
//!   plus the timeout wrapper every call goes through.
//! - [`sim`] – scripted stand-ins for both collaborators.
//! - [`guard`] – [`RetryGuard`] for areas that keep failing to plan.
//! - [`config`] – [`MissionConfig`].
//! - [`telemetry`] – tracing subscriber and optional OTLP export.

pub mod collaborators;
pub mod config;
pub mod controller;
pub mod guard;
pub mod safety;
pub mod sim;
pub mod steering;
pub mod telemetry;

pub use collaborators::{DeploymentStatus, DeploymentSubsystem, VisionFeature, VisionFrame, VisionSource};
pub use config::MissionConfig;
pub use controller::{ControlCommand, IterationOutcome, MissionController, MissionHandle, MissionSnapshot};
pub use guard::RetryGuard;
pub use safety::{SafetyAction, SafetyContext, SafetyFault, SafetyMonitor, SafetyRule};
pub use steering::{Steering, SteeringConfig};

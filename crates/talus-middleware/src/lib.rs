//! `talus-middleware` – event routing
//!
//! Carries telemetry, safety alerts and mission events from the control
//! loop to whoever is listening (the CLI, a base-station bridge, tests)
//! without the loop ever waiting on a consumer.
//!
//! # Modules
//!
//! - [`bus`] – [`EventBus`][bus::EventBus]: one Tokio broadcast channel per
//!   [`Topic`][bus::Topic].

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};

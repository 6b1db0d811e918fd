//! `talus-nav` – Path Planner
//!
//! Turns a navigation goal and the current obstacle list into a short list
//! of waypoints, then hands them out one at a time as the robot reaches
//! them.
//!
//! # Modules
//!
//! - [`grid`] – [`OccupancyGrid`][grid::OccupancyGrid]: flat bounds-checked
//!   occupancy buffer; off-map cells read as blocked.
//! - [`astar`] – [`search`][astar::search]: 8-connected A* with stable
//!   tie-breaking and an expansion budget.
//! - [`smoothing`] – [`line_of_sight`][smoothing::line_of_sight] and
//!   [`smooth`][smoothing::smooth]: shortcut pass over the raw cell path.
//! - [`planner`] – [`PathPlanner`][planner::PathPlanner]: the navigation
//!   state machine, waypoint cursor and obstacle bookkeeping.

pub mod astar;
pub mod grid;
pub mod planner;
pub mod smoothing;

pub use grid::{Cell, OccupancyGrid};
pub use planner::{PathPlanner, PlannerConfig};

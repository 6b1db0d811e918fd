//! [`SafetyMonitor`] – per-iteration safety rule engine.
//!
//! After the mission step has moved the robot, the controller builds a
//! [`SafetyContext`] from the latest state and passes it through
//! [`SafetyMonitor::evaluate`].  Rules run in insertion order and the first
//! one that trips wins; later rules are not consulted.
//!
//! The standard ordering ([`SafetyMonitor::standard`]) is battery, then
//! stability, then cliff.
//!
//! # Example
//!
//! ```
//! use talus_mission::safety::{SafetyAction, SafetyContext, SafetyMonitor};
//! use talus_types::SafetyCondition;
//!
//! let monitor = SafetyMonitor::standard(20.0, 0.1);
//!
//! let healthy = SafetyContext { battery_level: 80.0, stability_margin: 0.5, cliff_distance: None };
//! assert!(monitor.evaluate(&healthy).is_none());
//!
//! let low = SafetyContext { battery_level: 12.0, ..healthy };
//! let fault = monitor.evaluate(&low).unwrap();
//! assert_eq!(fault.action, SafetyAction::ReturnToBase);
//! assert!(matches!(fault.condition, SafetyCondition::CriticalBattery { .. }));
//! ```

use talus_types::SafetyCondition;

/// What the controller observed this iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyContext {
    /// Percent, `[0, 100]`.
    pub battery_level: f32,
    pub stability_margin: f32,
    /// Distance to the nearest severe cliff edge in range, if any.
    pub cliff_distance: Option<f32>,
}

/// Response the controller must carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyAction {
    /// Abort the mission and walk home.
    ReturnToBase,
    /// Latch the emergency stop where we stand.
    EmergencyStop,
}

/// A tripped rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyFault {
    pub condition: SafetyCondition,
    pub action: SafetyAction,
}

// ────────────────────────────────────────────────────────────────────────────
// Rule trait
// ────────────────────────────────────────────────────────────────────────────

/// A single safety invariant checked every iteration.
pub trait SafetyRule: Send + Sync {
    fn name(&self) -> &str;

    /// `Some` when the invariant is violated.
    fn check(&self, ctx: &SafetyContext) -> Option<SafetyFault>;
}

// ────────────────────────────────────────────────────────────────────────────
// SafetyMonitor
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct SafetyMonitor {
    rules: Vec<Box<dyn SafetyRule>>,
}

impl SafetyMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Battery, stability and cliff rules, in that order.
    pub fn standard(battery_return_percent: f32, critical_stability: f32) -> Self {
        let mut monitor = Self::new();
        monitor.add_rule(Box::new(BatteryRule {
            min_percent: battery_return_percent,
        }));
        monitor.add_rule(Box::new(StabilityRule {
            min_margin: critical_stability,
        }));
        monitor.add_rule(Box::new(CliffRule));
        monitor
    }

    /// Register a rule.  Rules are evaluated in insertion order.
    pub fn add_rule(&mut self, rule: Box<dyn SafetyRule>) {
        self.rules.push(rule);
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// First fault raised by any rule.
    pub fn evaluate(&self, ctx: &SafetyContext) -> Option<SafetyFault> {
        self.rules.iter().find_map(|rule| rule.check(ctx))
    }

    /// First fault whose action is an emergency stop.  Used on the way home,
    /// where a return-to-base fault is already being acted on.
    pub fn evaluate_escalations(&self, ctx: &SafetyContext) -> Option<SafetyFault> {
        self.rules
            .iter()
            .filter_map(|rule| rule.check(ctx))
            .find(|fault| fault.action == SafetyAction::EmergencyStop)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in rules
// ────────────────────────────────────────────────────────────────────────────

/// Sends the robot home when the battery drops below `min_percent`.
pub struct BatteryRule {
    pub min_percent: f32,
}

impl SafetyRule for BatteryRule {
    fn name(&self) -> &str {
        "battery"
    }

    fn check(&self, ctx: &SafetyContext) -> Option<SafetyFault> {
        (ctx.battery_level < self.min_percent).then_some(SafetyFault {
            condition: SafetyCondition::CriticalBattery {
                level: ctx.battery_level,
            },
            action: SafetyAction::ReturnToBase,
        })
    }
}

/// Stops the robot when the stability margin falls below `min_margin`.
pub struct StabilityRule {
    pub min_margin: f32,
}

impl SafetyRule for StabilityRule {
    fn name(&self) -> &str {
        "stability"
    }

    fn check(&self, ctx: &SafetyContext) -> Option<SafetyFault> {
        (ctx.stability_margin < self.min_margin).then_some(SafetyFault {
            condition: SafetyCondition::StabilityLoss {
                margin: ctx.stability_margin,
            },
            action: SafetyAction::EmergencyStop,
        })
    }
}

/// Stops the robot when vision reported a severe cliff edge in range.
pub struct CliffRule;

impl SafetyRule for CliffRule {
    fn name(&self) -> &str {
        "cliff"
    }

    fn check(&self, ctx: &SafetyContext) -> Option<SafetyFault> {
        ctx.cliff_distance.map(|distance| SafetyFault {
            condition: SafetyCondition::CliffEdge { distance },
            action: SafetyAction::EmergencyStop,
        })
    }
}

//! The seam between the locomotion controller and the servo hardware.
//!
//! Servo drivers live outside this workspace.  They implement [`LegDriver`]
//! and are handed to the
//! [`LocomotionController`][crate::controller::LocomotionController] as a
//! boxed trait object, so the gait and safety logic never depend on a bus
//! protocol.  [`SimLegDriver`] records commands for headless runs and tests.

use std::sync::{Arc, Mutex};

use talus_types::{JointAngles, LEG_COUNT, Leg, TalusError};

/// Applies one tick's worth of joint targets to the six legs.
pub trait LegDriver: Send {
    /// Stable identifier, e.g. `"servo_bus_0"`.
    fn id(&self) -> &str;

    /// Command all six legs at once.
    ///
    /// # Errors
    ///
    /// Returns [`TalusError::HardwareFault`] if any servo rejects the
    /// command.  The controller treats every error as fatal for the current
    /// movement and latches its emergency stop.
    fn apply(&mut self, legs: &[Leg; LEG_COUNT]) -> Result<(), TalusError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated driver
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SimLog {
    commands: usize,
    last: Option<[JointAngles; LEG_COUNT]>,
    fail_with: Option<String>,
}

/// Records commanded angles.  Succeeds unless a failure was injected through
/// its [`SimLegProbe`].
pub struct SimLegDriver {
    id: String,
    log: Arc<Mutex<SimLog>>,
}

/// Shared view into a [`SimLegDriver`] that stays usable after the driver
/// has been boxed and moved into a controller.
#[derive(Clone)]
pub struct SimLegProbe {
    log: Arc<Mutex<SimLog>>,
}

impl SimLegDriver {
    /// Create a driver and the probe that observes it.
    pub fn new(id: impl Into<String>) -> (Box<Self>, SimLegProbe) {
        let log = Arc::new(Mutex::new(SimLog::default()));
        let driver = Box::new(Self {
            id: id.into(),
            log: Arc::clone(&log),
        });
        (driver, SimLegProbe { log })
    }
}

impl LegDriver for SimLegDriver {
    fn id(&self) -> &str {
        &self.id
    }

    fn apply(&mut self, legs: &[Leg; LEG_COUNT]) -> Result<(), TalusError> {
        let mut log = self.log.lock().map_err(|_| TalusError::HardwareFault {
            component: self.id.clone(),
            details: "sim log poisoned".to_string(),
        })?;
        if let Some(details) = log.fail_with.clone() {
            return Err(TalusError::HardwareFault {
                component: self.id.clone(),
                details,
            });
        }
        log.commands += 1;
        log.last = Some(legs.map(|leg| leg.angles));
        Ok(())
    }
}

impl SimLegProbe {
    /// Number of successful `apply` calls so far.
    pub fn commands(&self) -> usize {
        self.log.lock().map(|l| l.commands).unwrap_or(0)
    }

    /// Angles sent by the last successful `apply`.
    pub fn last_angles(&self) -> Option<[JointAngles; LEG_COUNT]> {
        self.log.lock().ok().and_then(|l| l.last)
    }

    /// Make every following `apply` fail with `details`.
    pub fn inject_fault(&self, details: impl Into<String>) {
        if let Ok(mut log) = self.log.lock() {
            log.fail_with = Some(details.into());
        }
    }

    pub fn clear_fault(&self) {
        if let Ok(mut log) = self.log.lock() {
            log.fail_with = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use talus_types::{LegId, Vec3};

    fn legs() -> [Leg; LEG_COUNT] {
        LegId::ALL.map(|id| Leg {
            id,
            angles: JointAngles {
                coxa: 0.1,
                femur: 0.2,
                tibia: -1.0,
            },
            foot_position: Vec3::ZERO,
            grounded: true,
        })
    }

    #[test]
    fn records_commands() {
        let (mut driver, probe) = SimLegDriver::new("sim");
        assert_eq!(driver.id(), "sim");
        assert_eq!(probe.commands(), 0);
        driver.apply(&legs()).unwrap();
        assert_eq!(probe.commands(), 1);
        assert_eq!(probe.last_angles().unwrap()[3].femur, 0.2);
    }

    #[test]
    fn injected_fault_surfaces_as_hardware_fault() {
        let (mut driver, probe) = SimLegDriver::new("sim");
        probe.inject_fault("servo 4 stalled");
        let err = driver.apply(&legs()).unwrap_err();
        assert!(matches!(err, TalusError::HardwareFault { .. }));
        assert_eq!(probe.commands(), 0);

        probe.clear_fault();
        assert!(driver.apply(&legs()).is_ok());
    }
}

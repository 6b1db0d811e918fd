//! Simulated collaborators for headless runs and tests.
//!
//! Each sim is created together with a probe sharing its script, so a test
//! (or the CLI) can change its behaviour after the sim has been boxed and
//! handed to the [`MissionController`](crate::MissionController).
//!
//! ```rust
//! use talus_mission::sim::SimVision;
//! use talus_mission::collaborators::{VisionFrame, VisionSource};
//! use talus_types::Pose;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (mut vision, probe) = SimVision::new("cam0");
//! probe.push_frame(VisionFrame::default());
//! vision.capture(&Pose::default()).await.unwrap();
//! assert_eq!(probe.captures(), 1);
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use talus_types::{Pose, TalusError};

use crate::collaborators::{DeploymentStatus, DeploymentSubsystem, VisionFrame, VisionSource};

fn poisoned(collaborator: &str) -> TalusError {
    TalusError::Collaborator {
        collaborator: collaborator.to_string(),
        details: "sim script poisoned".to_string(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Vision
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct VisionScript {
    frames: VecDeque<VisionFrame>,
    /// Returned once the scripted frames run out.
    steady: VisionFrame,
    latency: Option<Duration>,
    fail_with: Option<String>,
    captures: usize,
}

/// Plays back scripted frames, then repeats a steady frame (empty unless
/// set).
pub struct SimVision {
    name: String,
    script: Arc<Mutex<VisionScript>>,
}

#[derive(Clone)]
pub struct SimVisionProbe {
    script: Arc<Mutex<VisionScript>>,
}

impl SimVision {
    pub fn new(name: impl Into<String>) -> (Box<Self>, SimVisionProbe) {
        let script = Arc::new(Mutex::new(VisionScript::default()));
        let sim = Box::new(Self {
            name: name.into(),
            script: Arc::clone(&script),
        });
        (sim, SimVisionProbe { script })
    }
}

#[async_trait]
impl VisionSource for SimVision {
    fn name(&self) -> &str {
        &self.name
    }

    async fn capture(&mut self, _pose: &Pose) -> Result<VisionFrame, TalusError> {
        let (latency, outcome) = {
            let mut script = self.script.lock().map_err(|_| poisoned(&self.name))?;
            script.captures += 1;
            let outcome = match script.fail_with.clone() {
                Some(details) => Err(TalusError::Collaborator {
                    collaborator: self.name.clone(),
                    details,
                }),
                None => Ok(match script.frames.pop_front() {
                    Some(frame) => frame,
                    None => script.steady.clone(),
                }),
            };
            (script.latency, outcome)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        outcome
    }
}

impl SimVisionProbe {
    /// Queue a frame for an upcoming capture.
    pub fn push_frame(&self, frame: VisionFrame) {
        if let Ok(mut script) = self.script.lock() {
            script.frames.push_back(frame);
        }
    }

    /// Frame returned whenever the queue is empty.
    pub fn set_steady_frame(&self, frame: VisionFrame) {
        if let Ok(mut script) = self.script.lock() {
            script.steady = frame;
        }
    }

    /// Delay every capture; use a delay above the controller timeout to
    /// simulate a hung camera.
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut script) = self.script.lock() {
            script.latency = latency;
        }
    }

    pub fn inject_fault(&self, details: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.fail_with = Some(details.into());
        }
    }

    pub fn clear_fault(&self) {
        if let Ok(mut script) = self.script.lock() {
            script.fail_with = None;
        }
    }

    pub fn captures(&self) -> usize {
        self.script.lock().map(|s| s.captures).unwrap_or(0)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Deployment
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct DeploymentScript {
    polls_to_complete: usize,
    polls_since_start: usize,
    active: bool,
    fail_with: Option<String>,
    hang: bool,
    started: Vec<(String, Pose)>,
    completed: usize,
}

/// Completes each deployment after a fixed number of polls.
pub struct SimDeployment {
    name: String,
    script: Arc<Mutex<DeploymentScript>>,
}

#[derive(Clone)]
pub struct SimDeploymentProbe {
    script: Arc<Mutex<DeploymentScript>>,
}

impl SimDeployment {
    /// `polls_to_complete` polls after `start`, the deployment reports
    /// [`DeploymentStatus::Completed`].
    pub fn new(name: impl Into<String>, polls_to_complete: usize) -> (Box<Self>, SimDeploymentProbe) {
        let script = Arc::new(Mutex::new(DeploymentScript {
            polls_to_complete,
            ..DeploymentScript::default()
        }));
        let sim = Box::new(Self {
            name: name.into(),
            script: Arc::clone(&script),
        });
        (sim, SimDeploymentProbe { script })
    }

    /// Wait long enough for the caller's timeout to fire.
    async fn stall(&self) {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }

    fn is_hung(&self) -> Result<bool, TalusError> {
        Ok(self.script.lock().map_err(|_| poisoned(&self.name))?.hang)
    }
}

#[async_trait]
impl DeploymentSubsystem for SimDeployment {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self, sensor_type: &str, location: &Pose) -> Result<(), TalusError> {
        if self.is_hung()? {
            self.stall().await;
        }
        let mut script = self.script.lock().map_err(|_| poisoned(&self.name))?;
        script.active = true;
        script.polls_since_start = 0;
        script.started.push((sensor_type.to_string(), *location));
        Ok(())
    }

    async fn poll(&mut self) -> Result<DeploymentStatus, TalusError> {
        if self.is_hung()? {
            self.stall().await;
        }
        let mut script = self.script.lock().map_err(|_| poisoned(&self.name))?;
        if !script.active {
            return Err(TalusError::Collaborator {
                collaborator: self.name.clone(),
                details: "no deployment in progress".to_string(),
            });
        }
        if let Some(reason) = script.fail_with.take() {
            script.active = false;
            return Ok(DeploymentStatus::Failed(reason));
        }
        script.polls_since_start += 1;
        if script.polls_since_start >= script.polls_to_complete {
            script.active = false;
            script.completed += 1;
            return Ok(DeploymentStatus::Completed);
        }
        Ok(DeploymentStatus::InProgress)
    }
}

impl SimDeploymentProbe {
    /// Fail the deployment in progress on its next poll.
    pub fn fail_next(&self, reason: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.fail_with = Some(reason.into());
        }
    }

    /// Make every call block until the caller gives up.
    pub fn set_hang(&self, hang: bool) {
        if let Ok(mut script) = self.script.lock() {
            script.hang = hang;
        }
    }

    pub fn set_polls_to_complete(&self, polls: usize) {
        if let Ok(mut script) = self.script.lock() {
            script.polls_to_complete = polls;
        }
    }

    /// Sensor types and locations of every `start` call.
    pub fn started(&self) -> Vec<(String, Pose)> {
        self.script.lock().map(|s| s.started.clone()).unwrap_or_default()
    }

    pub fn completed(&self) -> usize {
        self.script.lock().map(|s| s.completed).unwrap_or(0)
    }
}

//! `talus` – operator CLI for the slope-patrol robot.
//!
//! ```text
//! talus run <mission.toml>   run a mission against the simulated hardware
//! talus config               print the effective configuration
//! talus config init          write a default config file if none exists
//! talus schema               print the locomotion parameter JSON schema
//! ```
//!
//! Configuration comes from `~/.talus/config.toml` with `TALUS_*`
//! environment overrides (see [`config`]).  During `run`, **Ctrl-C** sends
//! an emergency stop through the mission handle and the run ends once the
//! controller has halted the legs.

mod config;
mod mission_file;

use std::path::PathBuf;
use std::process::ExitCode;

use colored::Colorize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use talus_locomotion::{LocomotionController, SimLegDriver};
use talus_middleware::{EventBus, Topic, TopicReceiver};
use talus_mission::sim::{SimDeployment, SimVision};
use talus_mission::telemetry::init_tracing;
use talus_mission::{MissionController, MissionSnapshot};
use talus_nav::PathPlanner;
use talus_types::{EventPayload, FindingKind, MissionStatus, locomotion_params_schema};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("run") => match args.get(1) {
            Some(path) => run(PathBuf::from(path)),
            None => {
                eprintln!("{} talus run <mission.toml>", "usage:".red());
                ExitCode::FAILURE
            }
        },
        Some("config") if args.get(1).map(String::as_str) == Some("init") => init_config(),
        Some("config") => print_config(),
        Some("schema") => print_schema(),
        Some("help") | Some("--help") | Some("-h") | None => {
            print_usage();
            ExitCode::SUCCESS
        }
        Some(other) => {
            eprintln!("{} unknown command '{other}'", "error:".red());
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_banner() {
    println!("{}", "  ▲ T A L U S".bold().cyan());
    println!("{}", "  hexapod slope patrol".dimmed());
    println!();
}

fn print_usage() {
    print_banner();
    println!("  {}", "Commands".bold());
    println!("    {}  run a mission against simulated hardware", "run <mission.toml>".green());
    println!("    {}              print the effective configuration", "config".green());
    println!("    {}         write a default config file", "config init".green());
    println!("    {}              print the locomotion parameter schema", "schema".green());
    println!();
    println!("  Config file: {}", config::config_path().display().to_string().dimmed());
}

fn print_config() -> ExitCode {
    let cfg = match config::effective() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {e}", "Config error".red());
            return ExitCode::FAILURE;
        }
    };
    match config::to_toml(&cfg) {
        Ok(raw) => {
            print!("{raw}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {e}", "Config error".red());
            ExitCode::FAILURE
        }
    }
}

fn init_config() -> ExitCode {
    let path = config::config_path();
    match config::load() {
        Ok(Some(_)) => {
            println!("  Config already exists at {}", path.display().to_string().bold());
            return ExitCode::SUCCESS;
        }
        Ok(None) => {}
        Err(e) => {
            eprintln!("{}: {e}", "Config error".red());
            return ExitCode::FAILURE;
        }
    }
    match config::save(&config::TalusConfig::default()) {
        Ok(()) => {
            println!("{} {}", "  ✓ Wrote".green(), path.display().to_string().bold());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {e}", "Config error".red());
            ExitCode::FAILURE
        }
    }
}

fn print_schema() -> ExitCode {
    match serde_json::to_string_pretty(&locomotion_params_schema()) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {e}", "Schema error".red());
            ExitCode::FAILURE
        }
    }
}

fn run(mission_path: PathBuf) -> ExitCode {
    // ── Structured logging ────────────────────────────────────────────────
    // Before the runtime: the OTLP exporter must exist before any span does.
    let _tracing = init_tracing("talus");

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            println!("  No config file; using defaults.");
            let mut cfg = config::TalusConfig::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            eprintln!("{}: {e}", "Config error".red());
            return ExitCode::FAILURE;
        }
    };

    let file = match mission_file::load(&mission_path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("{}: {e}", "Mission error".red());
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: failed to start runtime: {e}", "error".red());
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(drive_mission(cfg, file))
}

async fn drive_mission(cfg: config::TalusConfig, file: mission_file::MissionFile) -> ExitCode {
    // ── Simulated hardware ────────────────────────────────────────────────
    let (legs, _leg_probe) = SimLegDriver::new("sim_legs");
    let locomotion = match LocomotionController::new(cfg.locomotion, legs) {
        Ok(loco) => loco,
        Err(e) => {
            eprintln!("{}: {e}", "Locomotion error".red());
            return ExitCode::FAILURE;
        }
    };
    let (vision, vision_probe) = SimVision::new("sim_camera");
    vision_probe.set_steady_frame(file.sim_frame());
    let (deployment, deployment_probe) = SimDeployment::new("sim_arm", file.sim.deployment_polls);

    let bus = EventBus::default();
    let mission_events = bus.subscribe_to(Topic::MissionEvents);
    let safety_alerts = bus.subscribe_to(Topic::SafetyAlerts);

    let mut controller = MissionController::new(
        cfg.mission,
        locomotion,
        PathPlanner::new(cfg.planner),
        vision,
        deployment,
        bus,
    );

    let mission = file.to_mission();
    println!(
        "  Mission {} ({:?}, {} area(s), priority {})",
        mission.id.to_string().bold(),
        mission.mission_type,
        mission.areas.len(),
        mission.priority
    );
    println!();

    if let Err(e) = controller.start_mission(mission) {
        eprintln!("{}: {e}", "Mission rejected".red());
        return ExitCode::FAILURE;
    }

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let handle = controller.handle();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – emergency stop".yellow().bold());
        match handle.emergency_stop() {
            Ok(()) => println!("{}", "  ✓ EmergencyStop sent to mission controller.".green()),
            Err(e) => println!("{} {e}", "  ✗ Could not reach mission controller:".red()),
        }
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; emergency stop on Ctrl-C will not be available");
    }

    let printer = tokio::spawn(print_events(mission_events, safety_alerts));

    let result = controller.run().await;
    printer.abort();

    println!();
    print_summary(&controller.snapshot());
    info!(completed = deployment_probe.completed(), "sensor deployments finished");

    match result {
        Ok(MissionStatus::Completed) => ExitCode::SUCCESS,
        Ok(status) => {
            if let Some(e) = controller.last_error() {
                println!("  {} {e}", "Last error:".red());
            }
            println!("  Mission ended {}", status.to_string().yellow());
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{}: {e}", "Mission error".red());
            ExitCode::FAILURE
        }
    }
}

/// Echo mission events and safety alerts until the bus closes.
async fn print_events(mut missions: TopicReceiver, mut alerts: TopicReceiver) {
    loop {
        let received = tokio::select! {
            r = missions.recv() => r,
            r = alerts.recv() => r,
        };
        let event = match received {
            Ok(event) => event,
            Err(RecvError::Lagged(n)) => {
                warn!(skipped = n, "event printer lagged");
                continue;
            }
            Err(RecvError::Closed) => return,
        };
        let stamp = event.timestamp.format("%H:%M:%S").to_string().dimmed();
        match event.payload {
            EventPayload::MissionStatusChanged { status, .. } => {
                println!("  {stamp} mission {}", status.to_string().bold());
            }
            EventPayload::Finding(finding) => {
                let area = finding.area_id.as_deref().unwrap_or("-");
                let label = match finding.kind {
                    FindingKind::AreaInspected | FindingKind::SensorDeployed => {
                        format!("{:?}", finding.kind).green()
                    }
                    FindingKind::DeploymentFailed | FindingKind::AreaUnreachable => {
                        format!("{:?}", finding.kind).yellow()
                    }
                    FindingKind::SafetyEvent => format!("{:?}", finding.kind).red(),
                };
                println!("  {stamp} {label} [{area}] {}", finding.note);
            }
            EventPayload::SafetyFault(condition) => {
                println!("  {stamp} {} {condition}", "SAFETY".red().bold());
            }
            EventPayload::NavigationFailed { reason } => {
                println!("  {stamp} {} {reason}", "no path".yellow());
            }
            EventPayload::Telemetry(_) => {}
        }
    }
}

fn print_summary(snapshot: &MissionSnapshot) {
    println!("  {}", "Summary".bold());
    let robot = &snapshot.robot;
    println!(
        "    pose      ({:.2}, {:.2})  battery {:.0}%  mode {}",
        robot.pose.position.x, robot.pose.position.y, robot.battery_level, robot.mode
    );
    if snapshot.emergency_stopped {
        println!("    {}", "emergency stop latched".red().bold());
    }
    if let Some(fault) = snapshot.last_fault {
        println!("    last fault  {fault}");
    }
    let Some(mission) = &snapshot.mission else {
        return;
    };
    println!(
        "    mission   {}  progress {:.0}%  findings {}",
        mission.status,
        mission.progress * 100.0,
        mission.findings.len()
    );
    for area in &mission.areas {
        println!("      {:<16} {:?}", area.id, area.outcome);
    }
}

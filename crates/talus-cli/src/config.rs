//! Reads and writes `~/.talus/config.toml`.
//!
//! ```toml
//! [locomotion]
//! gait = "tripod"
//! max_speed = 0.2
//!
//! [planner]
//! resolution = 0.05
//!
//! [mission]
//! home_x = 1.5
//! battery_return_percent = 25.0
//! ```
//!
//! Missing sections and fields fall back to their defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use talus_mission::MissionConfig;
use talus_nav::PlannerConfig;
use talus_types::{GaitType, LocomotionParams};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TalusConfig {
    pub locomotion: LocomotionParams,
    pub planner: PlannerConfig,
    pub mission: MissionConfig,
}

/// `~/.talus/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".talus").join("config.toml")
}

/// Load the config, or `None` when there is no file yet.
pub fn load() -> Result<Option<TalusConfig>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<TalusConfig>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {e}", path.display()))?;
    let mut cfg: TalusConfig =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {e}"))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Config on disk (or defaults) with environment overrides applied.
pub fn effective() -> Result<TalusConfig, String> {
    match load()? {
        Some(cfg) => Ok(cfg),
        None => {
            let mut cfg = TalusConfig::default();
            apply_env_overrides(&mut cfg);
            Ok(cfg)
        }
    }
}

/// Apply `TALUS_*` overrides.  Unparseable values are ignored.
///
/// | Variable | Field |
/// |---|---|
/// | `TALUS_GAIT` | `locomotion.gait` |
/// | `TALUS_MAX_SPEED` | `locomotion.max_speed` |
/// | `TALUS_BATTERY_RETURN_PERCENT` | `mission.battery_return_percent` |
/// | `TALUS_HOME_X` | `mission.home_x` |
/// | `TALUS_HOME_Y` | `mission.home_y` |
pub fn apply_env_overrides(cfg: &mut TalusConfig) {
    if let Some(gait) = env_parse::<GaitType>("TALUS_GAIT") {
        cfg.locomotion.gait = gait;
    }
    if let Some(speed) = env_parse::<f32>("TALUS_MAX_SPEED")
        && speed.is_finite()
        && speed > 0.0
    {
        cfg.locomotion.max_speed = speed;
    }
    if let Some(percent) = env_parse::<f32>("TALUS_BATTERY_RETURN_PERCENT")
        && (0.0..=100.0).contains(&percent)
    {
        cfg.mission.battery_return_percent = percent;
    }
    if let Some(x) = env_parse::<f32>("TALUS_HOME_X").filter(|v| v.is_finite()) {
        cfg.mission.home_x = x;
    }
    if let Some(y) = env_parse::<f32>("TALUS_HOME_Y").filter(|v| v.is_finite()) {
        cfg.mission.home_y = y;
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

pub fn save(cfg: &TalusConfig) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Write `cfg`, creating the directory.  On Unix the directory is `0o700`
/// and the file `0o600`.
pub(crate) fn save_to(cfg: &TalusConfig, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {e}"))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {e}"))?;
        }
    }
    let raw = to_toml(cfg)?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {e}", path.display()))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {e}", path.display()))?;
    Ok(())
}

pub fn to_toml(cfg: &TalusConfig) -> Result<String, String> {
    toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Env-var tests share process state; run them under one lock.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn with_env(vars: &[(&str, &str)], f: impl FnOnce()) {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        // SAFETY: guarded by ENV_LOCK; no other test reads these variables.
        unsafe {
            for (k, v) in vars {
                std::env::set_var(k, v);
            }
        }
        f();
        unsafe {
            for (k, _) in vars {
                std::env::remove_var(k);
            }
        }
    }

    #[test]
    fn config_path_points_to_talus_dir() {
        let p = config_path_for_home("/home/operator");
        assert!(p.to_string_lossy().contains(".talus"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[locomotion]\ngait = \"wave\"\nmax_speed = 0.15\n\n[mission]\nhome_x = 2.0\n",
        )
        .expect("write");

        let cfg = load_from(&path).expect("load").expect("some");
        assert_eq!(cfg.locomotion.gait, GaitType::Wave);
        assert_eq!(cfg.locomotion.max_speed, 0.15);
        assert_eq!(cfg.locomotion.body_height, LocomotionParams::default().body_height);
        assert_eq!(cfg.planner, PlannerConfig::default());
        assert_eq!(cfg.mission.home_x, 2.0);
        assert_eq!(cfg.mission.battery_return_percent, 20.0);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[locomotion\nmax_speed = ").expect("write");
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        let mut cfg = TalusConfig::default();
        cfg.mission.patrol_laps = 4;
        cfg.planner.waypoint_tolerance = 0.15;
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load").expect("some");
        assert_eq!(loaded.mission.patrol_laps, 4);
        assert_eq!(loaded.planner.waypoint_tolerance, 0.15);
        assert_eq!(loaded.locomotion, LocomotionParams::default());
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&TalusConfig::default(), &path).expect("save");

        let file_mode = fs::metadata(&path).expect("meta").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let parent = path.parent().expect("parent");
        let dir_mode = fs::metadata(parent).expect("meta").permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn env_overrides_apply() {
        with_env(
            &[
                ("TALUS_GAIT", "ripple"),
                ("TALUS_MAX_SPEED", "0.18"),
                ("TALUS_BATTERY_RETURN_PERCENT", "30"),
                ("TALUS_HOME_X", "-1.5"),
                ("TALUS_HOME_Y", "2.25"),
            ],
            || {
                let mut cfg = TalusConfig::default();
                apply_env_overrides(&mut cfg);
                assert_eq!(cfg.locomotion.gait, GaitType::Ripple);
                assert_eq!(cfg.locomotion.max_speed, 0.18);
                assert_eq!(cfg.mission.battery_return_percent, 30.0);
                assert_eq!(cfg.mission.home_x, -1.5);
                assert_eq!(cfg.mission.home_y, 2.25);
            },
        );
    }

    #[test]
    fn env_overrides_ignore_invalid_values() {
        with_env(
            &[
                ("TALUS_GAIT", "gallop"),
                ("TALUS_MAX_SPEED", "-3"),
                ("TALUS_BATTERY_RETURN_PERCENT", "150"),
                ("TALUS_HOME_X", "north"),
            ],
            || {
                let mut cfg = TalusConfig::default();
                apply_env_overrides(&mut cfg);
                assert_eq!(cfg, TalusConfig::default());
            },
        );
    }
}

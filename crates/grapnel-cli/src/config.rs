//! Configuration vault – reads/writes `~/.grapnel/config.toml`.

use grapnel_types::GripperConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Persisted session configuration stored in `~/.grapnel/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Where the telemetry CSV is written at session close.
    #[serde(default = "default_export_path")]
    pub export_path: String,

    /// Gripper calibration and control policy.
    #[serde(default)]
    pub gripper: GripperConfig,
}

fn default_export_path() -> String {
    "load_data.csv".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            export_path: default_export_path(),
            gripper: GripperConfig::default(),
        }
    }
}

/// Return the path to `~/.grapnel/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".grapnel").join("config.toml")
}

/// Load the config from disk. Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `GRAPNEL_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `GRAPNEL_EXPORT_PATH` | `export_path` |
/// | `GRAPNEL_TICK_PERIOD_MS` | `gripper.tick_period_ms` |
/// | `GRAPNEL_SAMPLE_PERIOD_MS` | `gripper.sample_period_ms` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("GRAPNEL_EXPORT_PATH") {
        cfg.export_path = v;
    }
    if let Ok(v) = std::env::var("GRAPNEL_TICK_PERIOD_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.gripper.tick_period_ms = ms;
    }
    if let Ok(v) = std::env::var("GRAPNEL_SAMPLE_PERIOD_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.gripper.sample_period_ms = ms;
    }
}

/// Save the config to disk, creating `~/.grapnel/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{env, fs, path::Path, path::PathBuf};

use crate::alerts::{AlertThresholds, NotifyConfig};
use crate::correlation::DoorConfig;
use crate::inference::InferenceConfig;
use crate::sensing::{CaptureConfig, GateConfig};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

pub const CONFIG_ENV: &str = "CRIBWATCH_CONFIG";

pub fn home_dir() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// `$CRIBWATCH_CONFIG`, or `~/.cribwatch/settings.json`.
pub fn config_path() -> PathBuf {
    env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| home_dir().join(".cribwatch").join("settings.json"))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub capture_dir: PathBuf,
    pub state_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        let base = home_dir().join(".cribwatch");
        Self {
            capture_dir: env::temp_dir().join("cribwatch_captures"),
            state_dir: base.join("state"),
            log_dir: base.join("logs"),
        }
    }
}

/// Local hours during which runs do anything. `end_hour` is exclusive.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            start_hour: 7,
            end_hour: 22,
        }
    }
}

impl ScheduleSettings {
    pub fn is_active(&self, hour: u32) -> bool {
        hour >= self.start_hour && hour < self.end_hour
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub subject_name: String,
    pub paths: PathSettings,
    pub schedule: ScheduleSettings,
    pub gate: GateConfig,
    pub inference: InferenceConfig,
    pub alerts: AlertThresholds,
    pub notify: NotifyConfig,
    pub door: DoorConfig,
    pub capture: CaptureConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            subject_name: "Baby".into(),
            paths: PathSettings::default(),
            schedule: ScheduleSettings::default(),
            gate: GateConfig::default(),
            inference: InferenceConfig::default(),
            alerts: AlertThresholds::default(),
            notify: NotifyConfig::default(),
            door: DoorConfig::default(),
            capture: CaptureConfig::default(),
        }
    }
}

impl Settings {
    /// Reads settings from `path`. A missing file yields defaults; an
    /// unparsable one is logged and also yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let settings = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log_warn!("Ignoring unparsable settings {}: {err}", path.display());
                Settings::default()
            })
        } else {
            Settings::default()
        };
        Ok(settings)
    }

    /// Loads from the configured path and applies environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::load(&config_path())?;
        settings.apply_overrides(|key| env::var(key).ok());
        Ok(settings)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(dir) = get("CRIBWATCH_CAPTURE_DIR") {
            self.paths.capture_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("CRIBWATCH_STATE_DIR") {
            self.paths.state_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("CRIBWATCH_LOG_DIR") {
            self.paths.log_dir = PathBuf::from(dir);
        }
        if let Some(url) = get("CRIBWATCH_WEBHOOK_URL") {
            self.notify.webhook_url = Some(url);
        }
        if let Some(token) = get("CRIBWATCH_WEBHOOK_TOKEN") {
            self.notify.webhook_token = Some(token);
        }
        if let Some(url) = get("CRIBWATCH_GATEWAY_URL") {
            self.capture.gateway_url = url;
        }
    }
}

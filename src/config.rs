use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LadderError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub credits: CreditsConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Defaults, then global and per-root files (or one explicit file), then `GL_*` env.
    pub fn load(explicit_path: Option<&Path>, root: &Path) -> Result<Self> {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var("GL_CONFIG").ok().map(PathBuf::from));

        if let Some(path) = explicit {
            if let Some(patch) = Self::load_patch(&path)? {
                config.merge_patch(patch)?;
            }
        } else {
            if let Some(global) = Self::load_global()? {
                config.merge_patch(global)?;
            }
            if let Some(local) = Self::load_patch(&root.join("config.toml"))? {
                config.merge_patch(local)?;
            }
        }

        config.apply_env_overrides()?;

        Ok(config)
    }

    /// `~/.config/guild-ladder/config.toml`, when a config directory exists.
    pub fn global_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("guild-ladder/config.toml"))
    }

    pub fn db_path(&self, root: &Path) -> PathBuf {
        root.join(&self.storage.db_file)
    }

    pub fn event_log_path(&self, root: &Path) -> PathBuf {
        root.join(&self.events.log_file)
    }

    fn load_global() -> Result<Option<ConfigPatch>> {
        match Self::global_path() {
            Some(path) => Self::load_patch(&path),
            None => Ok(None),
        }
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| LadderError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| LadderError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) -> Result<()> {
        if let Some(patch) = patch.storage {
            self.storage.merge(patch);
        }
        if let Some(patch) = patch.verification {
            self.verification.merge(patch)?;
        }
        if let Some(patch) = patch.credits {
            self.credits.merge(patch);
        }
        if let Some(patch) = patch.events {
            self.events.merge(patch);
        }
        if let Some(patch) = patch.output {
            self.output.merge(patch);
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(value) = env_bool("GL_ROBOT") {
            self.output.robot = value;
        }

        if let Some(value) = env_string("GL_DB_FILE") {
            self.storage.db_file = value;
        }
        if let Some(value) = env_u64("GL_BUSY_TIMEOUT_MS")? {
            self.storage.busy_timeout_ms = value;
        }

        if let Some(value) = env_string("GL_FEEDBACK_DELIMITER") {
            self.verification.feedback_delimiter = parse_delimiter(value)?;
        }
        if let Some(value) = env_u32("GL_DEFER_ESCALATION_THRESHOLD")? {
            self.verification.defer_escalation_threshold = threshold(value);
        }
        if let Some(value) = env_string("GL_EXPIRE_AFTER") {
            self.verification.expire_after = parse_expiry(&value)?;
        }

        if let Some(value) = env_bool("GL_ALLOW_CORRECTIONS") {
            self.credits.allow_corrections = value;
        }
        if let Some(value) = env_u64("GL_HISTORY_LIMIT")? {
            self.credits.history_limit = usize::try_from(value)
                .map_err(|err| LadderError::Config(format!("invalid GL_HISTORY_LIMIT: {err}")))?;
        }

        if let Some(value) = env_bool("GL_EVENT_LOG") {
            self.events.log_enabled = value;
        }
        if let Some(value) = env_string("GL_EVENT_LOG_FILE") {
            self.events.log_file = value;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file, relative to the data root
    pub db_file: String,
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_file: "ladder.db".to_string(),
            busy_timeout_ms: 5_000,
        }
    }
}

impl StorageConfig {
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    fn merge(&mut self, patch: StoragePatch) {
        if let Some(value) = patch.db_file {
            self.db_file = value;
        }
        if let Some(value) = patch.busy_timeout_ms {
            self.busy_timeout_ms = value;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Separator between feedback trail entries
    pub feedback_delimiter: String,
    /// Defer tally that raises a stalled event; unset disables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defer_escalation_threshold: Option<u32>,
    /// Age after which the sweep expires a pending request; unset disables
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub expire_after: Option<Duration>,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            feedback_delimiter: "\n---\n".to_string(),
            defer_escalation_threshold: Some(3),
            expire_after: None,
        }
    }
}

impl VerificationConfig {
    fn merge(&mut self, patch: VerificationPatch) -> Result<()> {
        if let Some(value) = patch.feedback_delimiter {
            self.feedback_delimiter = parse_delimiter(value)?;
        }
        if let Some(value) = patch.defer_escalation_threshold {
            self.defer_escalation_threshold = threshold(value);
        }
        if let Some(value) = patch.expire_after {
            self.expire_after = parse_expiry(&value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditsConfig {
    /// Accept negative manual/migration entries
    pub allow_corrections: bool,
    /// Default row count for history queries
    pub history_limit: usize,
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            allow_corrections: true,
            history_limit: 50,
        }
    }
}

impl CreditsConfig {
    fn merge(&mut self, patch: CreditsPatch) {
        if let Some(value) = patch.allow_corrections {
            self.allow_corrections = value;
        }
        if let Some(value) = patch.history_limit {
            self.history_limit = value;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsConfig {
    pub log_enabled: bool,
    /// JSONL event log, relative to the data root
    pub log_file: String,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            log_enabled: true,
            log_file: "events.jsonl".to_string(),
        }
    }
}

impl EventsConfig {
    fn merge(&mut self, patch: EventsPatch) {
        if let Some(value) = patch.log_enabled {
            self.log_enabled = value;
        }
        if let Some(value) = patch.log_file {
            self.log_file = value;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// JSON output by default
    pub robot: bool,
}

impl OutputConfig {
    fn merge(&mut self, patch: OutputPatch) {
        if let Some(value) = patch.robot {
            self.robot = value;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigPatch {
    pub storage: Option<StoragePatch>,
    pub verification: Option<VerificationPatch>,
    pub credits: Option<CreditsPatch>,
    pub events: Option<EventsPatch>,
    pub output: Option<OutputPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StoragePatch {
    pub db_file: Option<String>,
    pub busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct VerificationPatch {
    pub feedback_delimiter: Option<String>,
    /// 0 disables
    pub defer_escalation_threshold: Option<u32>,
    /// Humantime duration, or "off"
    pub expire_after: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CreditsPatch {
    pub allow_corrections: Option<bool>,
    pub history_limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct EventsPatch {
    pub log_enabled: Option<bool>,
    pub log_file: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct OutputPatch {
    pub robot: Option<bool>,
}

const fn threshold(value: u32) -> Option<u32> {
    if value == 0 { None } else { Some(value) }
}

fn parse_delimiter(value: String) -> Result<String> {
    if value.trim().is_empty() {
        return Err(LadderError::Config(
            "feedback_delimiter needs at least one visible character".to_string(),
        ));
    }
    Ok(value)
}

/// Longest accepted `expire_after` (100 years).
const MAX_EXPIRE_AFTER: Duration = Duration::from_secs(100 * 365 * 86_400);

fn parse_expiry(value: &str) -> Result<Option<Duration>> {
    match value.trim().to_lowercase().as_str() {
        "" | "off" | "never" | "none" => Ok(None),
        raw => {
            let duration = humantime_serde::re::humantime::parse_duration(raw)
                .map_err(|err| LadderError::Config(format!("invalid expire_after {value}: {err}")))?;
            if duration > MAX_EXPIRE_AFTER {
                return Err(LadderError::Config(format!(
                    "expire_after {value} exceeds the 100 year limit"
                )));
            }
            Ok(Some(duration))
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|value| {
        matches!(
            value.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u32(key: &str) -> Result<Option<u32>> {
    match std::env::var(key) {
        Ok(value) => value.parse::<u32>().map(Some).map_err(|err| {
            LadderError::Config(format!("invalid {key} value {value}: {err}"))
        }),
        Err(_) => Ok(None),
    }
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(value) => value.parse::<u64>().map(Some).map_err(|err| {
            LadderError::Config(format!("invalid {key} value {value}: {err}"))
        }),
        Err(_) => Ok(None),
    }
}

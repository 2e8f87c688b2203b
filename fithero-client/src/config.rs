//! Configuration loading for the FitHero client.
//!
//! Connection settings are required. The `[sync]` and `[log]` sections are
//! optional and fall back to the sync layer's defaults.

use fithero_sync::{SyncConfig, ViewTtls};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Largest leaderboard page the backend serves.
pub const MAX_LEADERBOARD_LIMIT: usize = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub auth: AuthConfig,
    pub request_timeout_ms: u64,
    pub leaderboard_limit: usize,
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub log: LogConfig,
}

/// Credentials are opaque to the client: the token is sent as a bearer
/// header and never inspected.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub token: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncSection {
    pub reconciliation_delay_ms: u64,
    pub notification_dismiss_ms: u64,
    #[serde(default)]
    pub ttl: TtlSection,
}

impl Default for SyncSection {
    fn default() -> Self {
        let defaults = SyncConfig::default();
        Self {
            reconciliation_delay_ms: millis(defaults.reconciliation_delay),
            notification_dismiss_ms: millis(defaults.notification_dismiss),
            ttl: TtlSection::default(),
        }
    }
}

/// Per-view freshness windows, in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TtlSection {
    pub profile_ms: u64,
    pub daily_tasks_ms: u64,
    pub unlocked_achievements_ms: u64,
    pub achievement_catalog_ms: u64,
    pub leaderboard_ms: u64,
}

impl Default for TtlSection {
    fn default() -> Self {
        let ttls = ViewTtls::default();
        Self {
            profile_ms: millis(ttls.profile),
            daily_tasks_ms: millis(ttls.daily_tasks),
            unlocked_achievements_ms: millis(ttls.unlocked_achievements),
            achievement_catalog_ms: millis(ttls.achievement_catalog),
            leaderboard_ms: millis(ttls.leaderboard),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directives. `RUST_LOG` wins when set.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "fithero_sync=info,fithero_client=info,warn".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or FITHERO_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ClientConfig {
    /// Load and validate the file at `path`. `None` means neither
    /// `--config` nor `FITHERO_CONFIG` named one.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.api_base_url.trim();
        if base.is_empty() {
            return Err(invalid("api_base_url", "must not be empty"));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(invalid("api_base_url", "must start with http:// or https://"));
        }
        if self.auth.token.trim().is_empty() {
            return Err(invalid("auth.token", "must not be empty"));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms", "must be > 0"));
        }
        if self.leaderboard_limit == 0 || self.leaderboard_limit > MAX_LEADERBOARD_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "leaderboard_limit",
                reason: format!("must be between 1 and {}", MAX_LEADERBOARD_LIMIT),
            });
        }
        if self.sync.reconciliation_delay_ms == 0 {
            return Err(invalid("sync.reconciliation_delay_ms", "must be > 0"));
        }
        let ttl = &self.sync.ttl;
        let ttls = [
            ("sync.ttl.profile_ms", ttl.profile_ms),
            ("sync.ttl.daily_tasks_ms", ttl.daily_tasks_ms),
            ("sync.ttl.unlocked_achievements_ms", ttl.unlocked_achievements_ms),
            ("sync.ttl.achievement_catalog_ms", ttl.achievement_catalog_ms),
            ("sync.ttl.leaderboard_ms", ttl.leaderboard_ms),
        ];
        for (field, value) in ttls {
            if value == 0 {
                return Err(invalid(field, "must be > 0"));
            }
        }
        if self.log.filter.trim().is_empty() {
            return Err(invalid("log.filter", "must not be empty"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Runtime knobs for the synchronization session.
    pub fn sync_config(&self) -> SyncConfig {
        let ttl = &self.sync.ttl;
        SyncConfig::new()
            .with_ttls(ViewTtls {
                profile: Duration::from_millis(ttl.profile_ms),
                daily_tasks: Duration::from_millis(ttl.daily_tasks_ms),
                unlocked_achievements: Duration::from_millis(ttl.unlocked_achievements_ms),
                achievement_catalog: Duration::from_millis(ttl.achievement_catalog_ms),
                leaderboard: Duration::from_millis(ttl.leaderboard_ms),
            })
            .with_reconciliation_delay(Duration::from_millis(self.sync.reconciliation_delay_ms))
            .with_notification_dismiss(Duration::from_millis(self.sync.notification_dismiss_ms))
            .with_leaderboard_limit(self.leaderboard_limit)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

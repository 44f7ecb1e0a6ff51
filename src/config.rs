//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::{AppError, Result};

/// Environment variable consulted when `bot_token` is absent from the file.
pub const BOT_TOKEN_ENV: &str = "SWITCHBOARD_BOT_TOKEN";

/// Allowed shape for `agent_name`: a bare binary name, no path separators.
#[allow(clippy::expect_used)]
static AGENT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[A-Za-z0-9_-]{3,}$").expect("static regex"));

/// Log verbosity levels accepted by the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Everything, including per-frame wire traffic.
    Debug,
    /// Normal operational messages.
    Info,
    /// Recoverable anomalies only.
    Warning,
    /// Failures only.
    Error,
}

impl LogLevel {
    /// The `tracing` filter directive for this level.
    #[must_use]
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error => "error",
        }
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Telegram bot token. May instead come from `SWITCHBOARD_BOT_TOKEN`.
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Root directory under which per-thread workspaces are provisioned.
    #[serde(default = "default_workspace_base")]
    pub workspace_base_path: PathBuf,
    /// Maximum number of concurrent agent subprocesses.
    #[serde(default = "default_max_workers")]
    pub max_workers: u32,
    /// Seconds an idle worker survives before the reaper kills it.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
    /// Agent binary name, resolved on `PATH` at startup.
    pub agent_name: String,
    /// Extra arguments passed to the agent binary.
    #[serde(default)]
    pub agent_args: Vec<String>,
    /// Log verbosity.
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
    /// Directory of template files synced into each new workspace.
    #[serde(default = "default_agent_config_path")]
    pub agent_config_path: PathBuf,
    /// Telegram user ids allowed to talk to the gateway.
    ///
    /// An empty list denies everyone — the gateway fails closed.
    #[serde(default)]
    pub allowed_user_ids: Vec<i64>,
}

fn default_workspace_base() -> PathBuf {
    PathBuf::from("./workspaces/")
}

fn default_max_workers() -> u32 {
    5
}

fn default_idle_timeout() -> u64 {
    30
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_agent_config_path() -> PathBuf {
    PathBuf::from("./agent-config/")
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read, contains
    /// invalid TOML, or fails validation.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref()).map_err(|err| {
            AppError::Config(format!(
                "cannot read config file '{}': {err}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.resolve_bot_token();
        config.validate()?;
        Ok(config)
    }

    /// The resolved bot token.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when neither the file nor the environment
    /// supplied a token. `validate` already enforces presence, so this only
    /// fails on a hand-constructed config.
    pub fn bot_token(&self) -> Result<&str> {
        self.bot_token
            .as_deref()
            .ok_or_else(|| AppError::Config("bot_token is not set".into()))
    }

    /// Idle timeout as a [`std::time::Duration`].
    #[must_use]
    pub fn idle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.idle_timeout_seconds)
    }

    /// Whether `user_id` may talk to the gateway. Empty allowlist denies all.
    #[must_use]
    pub fn is_user_allowed(&self, user_id: i64) -> bool {
        self.allowed_user_ids.contains(&user_id)
    }

    /// Path of the `SQLite` binding store, derived from the workspace base.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.workspace_base_path
            .join(".switchboard")
            .join("bindings.db")
    }

    fn resolve_bot_token(&mut self) {
        if self.bot_token.as_deref().is_none_or(str::is_empty) {
            if let Ok(token) = std::env::var(BOT_TOKEN_ENV) {
                if !token.is_empty() {
                    self.bot_token = Some(token);
                }
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.bot_token.as_deref().is_none_or(str::is_empty) {
            return Err(AppError::Config(format!(
                "bot_token is required (set it in the config file or via {BOT_TOKEN_ENV})"
            )));
        }

        if self.max_workers == 0 {
            return Err(AppError::Config(
                "max_workers must be greater than zero".into(),
            ));
        }

        if !AGENT_NAME_RE.is_match(&self.agent_name) {
            return Err(AppError::Config(format!(
                "agent_name '{}' is invalid: expected ^[A-Za-z0-9_-]{{3,}}$",
                self.agent_name
            )));
        }

        Ok(())
    }
}

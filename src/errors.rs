//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or startup validation failure.
    Config(String),
    /// Agent subprocess could not be spawned.
    Spawn(String),
    /// Malformed JSON, unexpected id, or other wire-protocol violation.
    Protocol(String),
    /// The agent process died while a request was outstanding.
    ConnectionLost(String),
    /// `session/load` refused because another process holds the session lock.
    ///
    /// `pid` is the holder process id when the agent named one; the caller
    /// probes it to distinguish a stale lock from a live one.
    SessionLocked {
        /// Holder process id extracted from the error payload, if any.
        pid: Option<u32>,
        /// Original error text from the agent.
        message: String,
    },
    /// Agent returned a JSON-RPC error for a request.
    Agent(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// Telegram API failure.
    Telegram(String),
    /// File path failed validation against the workspace boundary.
    PathViolation(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Sender is not in the allowlist.
    Unauthorized(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::ConnectionLost(msg) => write!(f, "connection lost: {msg}"),
            Self::SessionLocked { pid, message } => match pid {
                Some(pid) => write!(f, "session locked by pid {pid}: {message}"),
                None => write!(f, "session locked: {message}"),
            },
            Self::Agent(msg) => write!(f, "agent: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Telegram(msg) => write!(f, "telegram: {msg}"),
            Self::PathViolation(msg) => write!(f, "path violation: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

use shared::{PlayerId, ProtocolError};
use std::fmt;
use thiserror::Error;

/// Why a session is being torn down.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DisconnectCause {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("timed out after {0} silent ticks")]
    Timeout(u64),
    #[error("peer left: {0}")]
    Requested(String),
    #[error("server full")]
    ServerFull,
    #[error("server shutting down")]
    Shutdown,
}

impl DisconnectCause {
    /// Whether a `Disconnect` frame can still reach the peer.
    pub fn can_notify(&self) -> bool {
        !matches!(self, DisconnectCause::Transport(_))
    }
}

/// Rejected admin command. Logged and dropped; never fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("no such player: {0:?}")]
    UnknownTarget(Option<PlayerId>),
    #[error("invalid value for {verb}: {reason}")]
    InvalidCommand { verb: &'static str, reason: String },
    #[error("no bot slot available")]
    NoCapacity,
}

impl CommandError {
    pub fn invalid(verb: &'static str, reason: impl fmt::Display) -> Self {
        CommandError::InvalidCommand {
            verb,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to access save file: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt save file: {0}")]
    Format(#[from] serde_json::Error),
}

/// Fatal server errors. Only resource exhaustion ends the loop.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("save task failed: {0}")]
    SaveTask(#[from] tokio::task::JoinError),
}

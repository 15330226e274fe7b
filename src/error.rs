//! Crate error types.
//!
//! Only host failures live here. Expected conditions (an unloaded body, a mirror
//! without a render target, out-of-range input) are clamped or skipped at the
//! point of use and never surface as errors.

use std::path::PathBuf;

use thiserror::Error;

/// Configuration could not be loaded.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for `SimConfig`.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The graphics host refused a resource.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// An off-screen color target could not be allocated.
    #[error("render target allocation failed ({width}x{height}): {reason}")]
    TargetAllocation {
        width: u32,
        height: u32,
        reason: String,
    },
}

/// WebSocket server failures.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),

    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] tungstenite::Error),

    /// The accept loop panicked or was cancelled.
    #[error("server task failed: {0}")]
    Task(#[source] tokio::task::JoinError),
}

/// Top-level error for the binary.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

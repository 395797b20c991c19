use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::ipc::{ProtocolError, SocketRole};

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running the bridge
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to bind {role} socket at {path}: {source}")]
    Bind {
        role: SocketRole,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("protocol violation: {0}")]
    ProtocolViolation(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to spawn transport thread: {0}")]
    Spawn(#[source] io::Error),
}

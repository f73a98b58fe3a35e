use std::path::PathBuf;

use thiserror::Error;

use super::proto::ProtoError;

/// Errors from talking to the telldusd sockets.
#[derive(Debug, Error)]
pub enum TelldusError {
    #[error("failed to reach telldusd at {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Proto(#[from] ProtoError),

    #[error("daemon closed the connection mid-response")]
    TruncatedResponse,

    #[error("daemon returned error status {0}")]
    Status(i32),

    #[error("unknown event type \"{0}\"")]
    UnknownEvent(String),
}

use std::fmt;

use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    Io,
    Timeout,
    Cancelled,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportKind::Io => "I/O",
            TransportKind::Timeout => "timeout",
            TransportKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Errors raised while talking to a device or forwarding its data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TagError {
    #[error("connection unavailable: {0}")]
    ConnectionUnavailable(String),
    #[error("transport error ({kind}): {message}")]
    Transport { kind: TransportKind, message: String },
    #[error("batch decode error: {0}")]
    BatchDecode(String),
    #[error("could not resolve write-back tag '{0}'")]
    AddressResolution(String),
    #[error("forwarder returned status {status_code}: {message}")]
    Forwarder { status_code: i64, message: String },
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

impl TagError {
    pub fn io(message: impl Into<String>) -> Self {
        TagError::Transport {
            kind: TransportKind::Io,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        TagError::Transport {
            kind: TransportKind::Timeout,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        TagError::Transport {
            kind: TransportKind::Cancelled,
            message: "operation cancelled".to_string(),
        }
    }

    /// Errors after which the connection that produced them must not be reused.
    pub fn poisons_connection(&self) -> bool {
        matches!(
            self,
            TagError::Transport {
                kind: TransportKind::Io | TransportKind::Timeout,
                ..
            }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            TagError::Transport {
                kind: TransportKind::Cancelled,
                ..
            }
        )
    }
}

//! OBD-II Error Types

use thiserror::Error;

/// Errors raised while framing or decoding a single inbound message.
///
/// Every variant is recoverable: the offending message is dropped and the
/// session carries on with the next one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// Accumulated more than the framing limit without a terminator
    #[error("Framing error: {len} bytes buffered without a terminator")]
    Framing { len: usize },

    /// Hex token or field could not be parsed
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Well-formed response for a PID this decoder does not know
    #[error("PID {0:02X} not supported by decoder")]
    UnsupportedPid(u8),

    /// Response mode marker outside the supported modes
    #[error("Response mode {0:02X} not supported")]
    UnsupportedMode(u8),

    /// Fewer data bytes than the PID formula needs
    #[error("PID {pid:02X} expects {expected} data bytes, got {actual}")]
    TruncatedPayload {
        pid: u8,
        expected: usize,
        actual: usize,
    },

    /// AT reply with a prefix we do not track
    #[error("Unrecognized interface message: {0}")]
    UnrecognizedInterfaceMessage(String),

    /// Interpreter reported a condition instead of data (NO DATA, ERROR, ...)
    #[error("Interpreter status: {0}")]
    InterpreterStatus(String),
}

/// Session-level failures (request sequencing and timeouts)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// A request is already in flight
    #[error("Request already in flight")]
    Busy,

    /// The interpreter has not signalled readiness yet
    #[error("Interpreter not ready")]
    NotReady,

    /// Framing fault, session must be reset
    #[error("Session faulted, reset required")]
    Faulted,

    /// No ready prompt within the caller's deadline
    #[error("No response after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// Recoverable decode failure
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Errors that can occur while talking to an interpreter over a transport
#[derive(Debug, Error)]
pub enum ObdError {
    /// Serial port or socket failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Timeout waiting for response
    #[error("Timeout waiting for OBD response after {0}ms")]
    Timeout(u64),

    /// Peer closed the stream
    #[error("Transport closed")]
    Closed,

    /// Request rejected by the session state machine
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

impl From<std::io::Error> for ObdError {
    fn from(err: std::io::Error) -> Self {
        ObdError::Transport(err.to_string())
    }
}

impl From<tokio_serial::Error> for ObdError {
    fn from(err: tokio_serial::Error) -> Self {
        ObdError::Transport(err.to_string())
    }
}

/// Errors loading a description store
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Failed to read description file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid description file: {0}")]
    Json(#[from] serde_json::Error),
}

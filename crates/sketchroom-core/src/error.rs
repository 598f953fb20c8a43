//! Error taxonomy for the engine.
//!
//! Networking and protocol failures never cross the public API as `Err`;
//! the session reports them on its event stream and keeps operating in a
//! disconnected mode. Only misuse of the engine itself is returned as an
//! error value.

use thiserror::Error;

/// Failures of the realtime channel or the auth handshake.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("connection closed unexpectedly")]
    ConnectionLost,
    #[error("no pong received within {0}s")]
    LivenessTimeout(u64),
    #[error("auth rejected with status {status}: {message}")]
    AuthRejected { status: u16, message: String },
}

/// Malformed or unrecognized wire traffic. Dropped after logging.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Failures while loading or releasing media resources.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("image decode failed: {0}")]
    Decode(String),
    #[error("artifact disposal failed: {0}")]
    Dispose(String),
}

/// Misuse of the engine's lifecycle by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("already in room {0}")]
    AlreadyInRoom(String),
    #[error("room id must not be empty")]
    EmptyRoomId,
}

/// Any engine failure, grouped by category.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    State(#[from] StateError),
}

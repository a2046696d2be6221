//! Error types for skiff-core

use thiserror::Error;

/// Main error type for the skiff-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Realtime channel is not connected; callers should use the fallback
    #[error("realtime channel unavailable")]
    TransportUnavailable,

    /// Fallback request failed (non-2xx status or network failure)
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Inbound realtime frame did not parse into a known shape
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Mutation attempted with no resolvable session
    #[error("no active session; create one before appending messages")]
    NoActiveSession,

    /// Session state accessed before hydration completed
    #[error("session state not hydrated yet")]
    NotHydrated,

    /// Empty or whitespace-only turn submitted
    #[error("empty message")]
    EmptyTurn,

    /// A turn is already in flight for this state
    #[error("a turn is already in flight")]
    TurnInFlight,

    /// Session not found
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for skiff-core
pub type Result<T> = std::result::Result<T, Error>;

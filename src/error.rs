//! Error types shared across the client

use thiserror::Error;

/// Failure classes surfaced by the chat client.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Connection-level failure before or during streaming
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with something that is not the stream contract
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Explicit error event carried by the stream from the model backend
    #[error("backend error: {0}")]
    Backend(String),

    /// A programming invariant was violated; not user-recoverable
    #[error("logic error: {0}")]
    Logic(String),

    /// Settings could not be loaded, parsed or validated
    #[error("config error: {0}")]
    Config(String),

    /// Chat history database failure
    #[error("storage error: {0}")]
    Storage(String),
}

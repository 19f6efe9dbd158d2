//! Client-level error types.

use thiserror::Error;

use archive_protocol::ProtocolError;

/// Errors raised by query, ordering, and download operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Input validation failed before any request was made.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Operation needs an authenticated session that has not been created.
    #[error("Authentication required: {0}")]
    AuthRequired(String),

    /// The authentication collaborator rejected the login.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// An archive request failed at the transport level.
    #[error("Archive request failed: {0}")]
    Http(String),

    /// The archive returned a response the client could not interpret.
    #[error("Unexpected archive response: {0}")]
    BadResponse(String),

    /// Order submission or status retrieval failed.
    #[error("Order failed: {0}")]
    Order(String),

    /// The capabilities document could not be fetched or parsed.
    #[error("Capabilities error: {0}")]
    Capabilities(String),

    /// Fetched order output could not be written to disk.
    #[error("Download failed: {0}")]
    Download(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Http(err.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Download(err.to_string())
    }
}

//! Error types for outbound round trips.

use std::fmt;

use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while performing a round trip or reading a
/// response body.
///
/// Every error is terminal for the call that produced it. Nothing is
/// retried and no partial response is ever returned.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid request headers: {0}")]
    Headers(SubstrateError),

    #[error("failed to set {0} on outgoing request")]
    RequestField(&'static str),

    #[error("failed to read request body: {0}")]
    RequestBody(#[source] std::io::Error),

    #[error("failed to write request body: {0}")]
    BodyWrite(String),

    #[error("failed to finish request body: {0}")]
    BodyFinish(SubstrateError),

    #[error("failed to send request: {0}")]
    Send(SubstrateError),

    #[error("failed to get response")]
    ResponseUnavailable(#[source] ResponseFailure),

    #[error("invalid response status code: {0}")]
    InvalidStatus(u16),

    #[error("invalid response header {name:?}")]
    ResponseHeader { name: String },

    #[error("malformed content-length header value: {0:?}")]
    MalformedContentLength(String),

    #[error("invalid content-length header value: {0:?}")]
    InvalidContentLength(String),

    #[error("failed to consume response body: {0}")]
    Consume(SubstrateError),

    #[error("failed to get response body stream: {0}")]
    BodyStream(SubstrateError),

    #[error("failed to read response body: {0}")]
    BodyRead(String),
}

/// The layer at which a pending response failed to resolve.
///
/// All three collapse to the same user-facing message; the layer is kept
/// as the error source for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseFailure {
    /// The future was read before it held a value.
    #[error("response future has no value")]
    Pending,
    /// The future's value was already taken.
    #[error("response already taken from future")]
    Taken,
    /// The substrate reported a protocol-level error code.
    #[error("{0}")]
    Protocol(String),
}

/// Opaque diagnostic returned by a substrate operation.
///
/// Wraps a human-readable message describing the failure, typically the
/// substrate's own debug rendering of its error code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstrateError {
    message: String,
}

impl SubstrateError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for SubstrateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SubstrateError {}

impl From<String> for SubstrateError {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SubstrateError {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Result of a failed stream read or write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The stream is closed: end-of-stream for reads.
    #[error("closed")]
    Closed,
    /// The last operation failed; carries the substrate's debug string.
    #[error("{0}")]
    LastOperationFailed(String),
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::RequestBody(io) => io,
            other => std::io::Error::other(other),
        }
    }
}

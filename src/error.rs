//! Backend-agnostic error types shared by the signal bus and queue broker.
//!
//! Every backend implementation maps its internal errors to [`TransportError`]
//! so callers can handle failures uniformly regardless of the underlying store.
//! This layer performs no retries and no backoff: errors surface synchronously
//! to the immediate caller, and retry policy belongs to the worker layer.

use thiserror::Error;

/// Errors that can occur while talking to a bus or broker backend.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Backend unreachable or transport failure during an operation.
    #[error("connection error: {0}")]
    Connection(String),

    /// Unrecognized connection-string scheme or invalid backend URL.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Backend returned a malformed response (e.g. a non-integer queue length).
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Returns true if this error is potentially recoverable with a retry.
    ///
    /// Only connection failures are worth retrying; configuration and protocol
    /// errors will not go away on their own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Connection(_))
    }
}

impl From<redis::RedisError> for TransportError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::TypeError | redis::ErrorKind::ResponseError => {
                TransportError::Protocol(err.to_string())
            }
            redis::ErrorKind::InvalidClientConfig => {
                TransportError::Configuration(err.to_string())
            }
            _ => TransportError::Connection(err.to_string()),
        }
    }
}

impl From<bb8_redis::bb8::RunError<redis::RedisError>> for TransportError {
    fn from(err: bb8_redis::bb8::RunError<redis::RedisError>) -> Self {
        TransportError::Connection(format!("failed to get connection from pool: {}", err))
    }
}

impl From<lapin::Error> for TransportError {
    fn from(err: lapin::Error) -> Self {
        TransportError::Connection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_is_retryable() {
        assert!(TransportError::Connection("down".into()).is_retryable());
        assert!(!TransportError::Configuration("bad scheme".into()).is_retryable());
        assert!(!TransportError::Protocol("not an integer".into()).is_retryable());
    }
}

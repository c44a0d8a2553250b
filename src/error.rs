// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the sync client.
//!
//! Errors are categorized by their source (transport, document shape,
//! cursor store) and carry enough context for the retry policy to make
//! decisions without re-parsing messages.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Transport` | Yes (except 401) | HTTP failure, timeout, non-2xx status |
//! | `Aborted` | No | Request cancelled by `disconnect()` |
//! | `InvalidDocument` | No | Local object missing `type` or `id` |
//! | `BadResponse` | No | Remote answered with unexpected JSON |
//! | `PushRejected` | No | Bulk write rejected one or more documents |
//! | `CursorStore` | No | Local SQLite errors (needs operator attention) |
//! | `Config` | No | Configuration invalid |
//!
//! The continuous pull loop never surfaces retryable errors to the caller;
//! it feeds [`RemoteError::status()`] into [`crate::retry::classify`] and
//! keeps going.

use thiserror::Error;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, RemoteError>;

/// Errors that can occur while talking to the remote database.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// HTTP request failure.
    ///
    /// `status` is `None` when the failure happened before a response
    /// arrived (connection refused, DNS, timeout).
    #[error("transport error{}: {message}", status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// The request was cancelled because `disconnect()` was called while
    /// it was in flight.
    #[error("request aborted by disconnect")]
    Aborted,

    /// A local object cannot be encoded for the remote.
    ///
    /// Occurs when `type` or `id` is missing or not a string.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// The remote answered with JSON we cannot interpret.
    #[error("malformed remote response: {0}")]
    BadResponse(String),

    /// The bulk write endpoint rejected one or more documents.
    ///
    /// With `new_edits: false` the endpoint normally answers an empty
    /// array; any per-document error entry fails the whole push.
    #[error("bulk push rejected: {0}")]
    PushRejected(String),

    /// SQLite error during cursor persistence.
    #[error("cursor store error: {0}")]
    CursorStore(#[from] sqlx::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RemoteError {
    /// Build a transport error from an optional HTTP status and a message.
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        RemoteError::Transport {
            status,
            message: message.into(),
        }
    }

    /// The HTTP status behind this error, if any.
    ///
    /// This is what the pull retry policy keys on.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether a retry of the same operation could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Transport { status, .. } => *status != Some(401),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_carries_status() {
        let err = RemoteError::transport(Some(404), "missing");
        assert_eq!(err.status(), Some(404));
        assert!(err.is_retryable());
    }

    #[test]
    fn unauthenticated_is_not_retryable() {
        let err = RemoteError::transport(Some(401), "unauthorized");
        assert!(!err.is_retryable());
    }

    #[test]
    fn non_transport_errors_have_no_status() {
        assert_eq!(RemoteError::Aborted.status(), None);
        assert_eq!(
            RemoteError::InvalidDocument("no type".into()).status(),
            None
        );
        assert!(!RemoteError::PushRejected("conflict".into()).is_retryable());
    }

    #[test]
    fn display_includes_status_when_present() {
        let err = RemoteError::transport(Some(500), "boom");
        assert!(err.to_string().contains("500"));
        let err = RemoteError::transport(None, "refused");
        assert!(!err.to_string().contains("status"));
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Pull failure policy.
//!
//! The continuous pull loop keeps running through transient failures:
//! a fixed delay before the next attempt, no backoff, no retry cap. Only
//! an authentication failure stops it. The mapping from HTTP status to
//! action:
//!
//! | Condition | Action |
//! |-----------|--------|
//! | not connected | suppress, stop the loop quietly |
//! | 401 | emit `error:unauthenticated`, disconnect |
//! | 404 | retry after the fixed delay |
//! | 500 | emit `error:server`, connectivity check, retry after delay |
//! | anything else | connectivity check, retry after delay |
//!
//! Watchdog expiry never reaches this policy; the loop drops the stale
//! long poll and reissues immediately.

/// What the pull loop does with a failed pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// Not connected anymore; drop the error and stop.
    Suppress,

    /// Authentication is gone. Surface `error:unauthenticated` and force
    /// a disconnect.
    Disconnect,

    /// Schedule the next pull after the fixed delay.
    RetryAfter {
        /// Emit `error:server` before retrying.
        server_error: bool,
        /// Run the connectivity check before retrying.
        check_connection: bool,
    },
}

/// Classify a pull failure into a [`RetryAction`].
pub fn classify(status: Option<u16>, connected: bool) -> RetryAction {
    if !connected {
        return RetryAction::Suppress;
    }
    match status {
        Some(401) => RetryAction::Disconnect,
        Some(404) => RetryAction::RetryAfter {
            server_error: false,
            check_connection: false,
        },
        Some(500) => RetryAction::RetryAfter {
            server_error: true,
            check_connection: true,
        },
        _ => RetryAction::RetryAfter {
            server_error: false,
            check_connection: true,
        },
    }
}

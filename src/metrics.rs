//! Metrics for observability.
//!
//! All metrics are prefixed with `remote_sync_` and follow Prometheus
//! conventions: counters end in `_total`, gauges represent current state.
//! Wire up any `metrics` exporter in the host application to collect
//! them.

use metrics::{counter, gauge};

use crate::events::ChangeKind;

/// Record the current connection state.
pub fn record_connection_state(state: &str) {
    gauge!("remote_sync_connection_state", "state" => state.to_string()).set(1.0);
}

/// Record one completed pull and the number of change rows it delivered.
pub fn record_pull(changes: usize) {
    counter!("remote_sync_pulls_total").increment(1);
    counter!("remote_sync_changes_received_total").increment(changes as u64);
}

/// Record one classified change.
pub fn record_change(kind: ChangeKind) {
    counter!("remote_sync_changes_classified_total", "kind" => kind.as_str()).increment(1);
}

/// Record one bulk push and the number of documents it carried.
pub fn record_push(documents: usize) {
    counter!("remote_sync_pushes_total").increment(1);
    counter!("remote_sync_documents_pushed_total").increment(documents as u64);
}

/// Record a pull failure that was scheduled for retry.
pub fn record_pull_retry() {
    counter!("remote_sync_pull_retries_total").increment(1);
}

/// Record a long poll dropped by the watchdog.
pub fn record_watchdog_restart() {
    counter!("remote_sync_watchdog_restarts_total").increment(1);
}

//! Configuration for the sync client.
//!
//! Configuration is passed to [`RemoteStore::new()`](crate::RemoteStore::new)
//! and can be constructed programmatically or deserialized from YAML/JSON.
//!
//! # Quick Start
//!
//! ```rust
//! use remote_sync::config::{RemoteConfig, ObjectRef};
//!
//! let config = RemoteConfig {
//!     name: Some("user-4b9d".into()),
//!     prefix: "app/".into(),
//!     since: 42,
//!     known_objects: vec![ObjectRef::new("task", "abc4567")],
//!     ..Default::default()
//! };
//! ```
//!
//! # YAML Example
//!
//! ```yaml
//! name: "user-4b9d"
//! prefix: "app/"
//! since: 42
//! known_objects:
//!   - type: "task"
//!     id: "abc4567"
//! timing:
//!   watchdog_secs: 25
//!   retry_delay_secs: 3
//!   heartbeat_ms: 10000
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The top-level config object passed to `RemoteStore::new()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Name of the remote database.
    ///
    /// Doubles as the leading URL path segment for every request and as
    /// the namespace prefix for emitted event names. `None` means the
    /// transport base URL already points at the database root and events
    /// use bare names.
    #[serde(default)]
    pub name: Option<String>,

    /// Document id prefix.
    ///
    /// Outgoing `_id`s are `{prefix}{type}/{id}`; incoming documents whose
    /// `_id` does not start with the prefix are ignored by the puller.
    #[serde(default)]
    pub prefix: String,

    /// Change-feed sequence to start pulling from.
    ///
    /// Seeds the in-memory cursor; ignored when a custom
    /// [`SequenceCursor`](crate::cursor::SequenceCursor) is supplied.
    #[serde(default)]
    pub since: u64,

    /// Objects already present locally.
    ///
    /// Seeds the known-objects tracker so the first pull classifies
    /// existing documents as updates rather than adds.
    #[serde(default)]
    pub known_objects: Vec<ObjectRef>,

    /// Timing knobs for the continuous pull loop.
    #[serde(default)]
    pub timing: TimingConfig,
}

impl RemoteConfig {
    /// A config suitable for tests: unnamed, unprefixed, starting at 0.
    pub fn for_testing() -> Self {
        Self::default()
    }
}

/// A `type`/`id` pair identifying one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    /// The object type, e.g. `"task"`.
    #[serde(rename = "type")]
    pub object_type: String,

    /// The object id. May itself contain `/`.
    pub id: String,
}

impl ObjectRef {
    pub fn new(object_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            id: id.into(),
        }
    }
}

/// Timing knobs for the continuous pull loop.
///
/// The defaults match the protocol: a 25s watchdog on held-open long
/// polls, a fixed 3s delay before re-pulling after a failure (no backoff,
/// no retry cap), and a 10s server-side heartbeat on the feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Seconds a long poll may stay in flight before it is dropped and
    /// reissued.
    #[serde(default = "default_watchdog_secs")]
    pub watchdog_secs: u64,

    /// Seconds to wait before re-pulling after a recoverable failure.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// `heartbeat` query parameter sent on long-poll requests, in
    /// milliseconds.
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            watchdog_secs: default_watchdog_secs(),
            retry_delay_secs: default_retry_delay_secs(),
            heartbeat_ms: default_heartbeat_ms(),
        }
    }
}

impl TimingConfig {
    pub fn watchdog(&self) -> Duration {
        Duration::from_secs(self.watchdog_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

fn default_watchdog_secs() -> u64 {
    25
}

fn default_retry_delay_secs() -> u64 {
    3
}

fn default_heartbeat_ms() -> u64 {
    10_000
}

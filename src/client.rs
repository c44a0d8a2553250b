// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The sync client.
//!
//! [`RemoteStore`] ties the pieces together: the document codec, the
//! change-feed cursor, the known-objects tracker, the event bus, and the
//! transport. It owns the connection state machine and the spawned
//! continuous-pull task.
//!
//! # State Transitions
//!
//! ```text
//!                connect()
//! Disconnected ─────────────→ Connecting
//!      ↑                          │
//!      │ disconnect(),            │ (bootstrap pull done,
//!      │ 401 on any pull          │  or failed recoverably)
//!      │                          ↓
//!      └────────────────────── Connected
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use remote_sync::{HttpTransport, RemoteConfig, RemoteStore};
//!
//! # async fn example() -> remote_sync::Result<()> {
//! let transport = Arc::new(HttpTransport::new("http://localhost:5984")?);
//! let store = RemoteStore::new(RemoteConfig::default(), transport);
//!
//! let mut events = store.subscribe();
//! store.connect(Some("user-4b9d")).await?;
//! while let Ok(event) = events.recv().await {
//!     println!("{}", event.name);
//! }
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, watch, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, trace, warn};

use crate::codec::{Document, DocumentCodec};
use crate::config::{RemoteConfig, TimingConfig};
use crate::cursor::{MemoryCursor, SequenceCursor};
use crate::error::{RemoteError, Result};
use crate::events::{EventBus, EventPayload, RemoteEvent};
use crate::known::KnownObjects;
use crate::puller::Puller;
use crate::pusher::{BulkPusher, NoPending, PushQueue};
use crate::retry::{self, RetryAction};
use crate::transport::{segment_refs, Method, Transport};

/// Connection state of a [`RemoteStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected. One-shot `pull()`/`push()` still work.
    Disconnected,

    /// `connect()` called, bootstrap pull in flight.
    Connecting,

    /// Continuous pulling active (or retrying per the failure policy).
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

/// Hook run before a failed pull is retried when the failure suggests
/// the network might be gone (see [`crate::retry::classify`]).
///
/// Implementations typically hit a health endpoint and flip an
/// application-level online/offline flag. The pull loop only awaits
/// completion; it retries regardless of what the check concludes.
pub trait ConnectivityCheck: Send + Sync {
    fn check(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// A connectivity check that does nothing. The default.
#[derive(Debug, Default)]
pub struct NoopConnectivityCheck;

impl ConnectivityCheck for NoopConnectivityCheck {
    fn check(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }
}

/// Resolve when the state transitions to `Disconnected` (or the sender
/// is gone). The current value does not count: a store that is already
/// disconnected can still run one-shot operations.
pub(crate) async fn wait_disconnected(state: &mut watch::Receiver<ConnectionState>) {
    loop {
        if state.changed().await.is_err() {
            return;
        }
        if *state.borrow() == ConnectionState::Disconnected {
            return;
        }
    }
}

/// Client for one remote database.
pub struct RemoteStore {
    codec: DocumentCodec,
    transport: Arc<dyn Transport>,
    bus: EventBus,
    cursor: Arc<dyn SequenceCursor>,
    known: Arc<Mutex<KnownObjects>>,
    push_queue: Arc<dyn PushQueue>,
    connectivity: Arc<dyn ConnectivityCheck>,
    timing: TimingConfig,
    name: Arc<RwLock<Option<String>>>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    state_rx: watch::Receiver<ConnectionState>,
    pull_gate: Arc<Mutex<()>>,
    pull_nudge: Arc<Notify>,
    push_gate: Mutex<()>,
    pull_task: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteStore {
    /// Build a store from config and a transport.
    ///
    /// The cursor defaults to an in-memory one seeded from
    /// `config.since`; the push queue defaults to empty; the
    /// connectivity check defaults to a no-op. Swap any of them with the
    /// `with_*` builders before calling [`connect`](Self::connect).
    pub fn new(config: RemoteConfig, transport: Arc<dyn Transport>) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let mut known = KnownObjects::new();
        for object in &config.known_objects {
            known.insert(&object.object_type, &object.id);
        }

        Self {
            codec: DocumentCodec::new(config.prefix),
            bus: EventBus::new(config.name.clone()),
            cursor: Arc::new(MemoryCursor::new(config.since)),
            known: Arc::new(Mutex::new(known)),
            push_queue: Arc::new(NoPending),
            connectivity: Arc::new(NoopConnectivityCheck),
            timing: config.timing,
            name: Arc::new(RwLock::new(config.name)),
            state_tx: Arc::new(state_tx),
            state_rx,
            transport,
            pull_gate: Arc::new(Mutex::new(())),
            pull_nudge: Arc::new(Notify::new()),
            push_gate: Mutex::new(()),
            pull_task: Mutex::new(None),
        }
    }

    /// Replace the change-feed cursor (e.g. with a
    /// [`SqliteCursor`](crate::cursor::SqliteCursor)).
    pub fn with_cursor(mut self, cursor: Arc<dyn SequenceCursor>) -> Self {
        self.cursor = cursor;
        self
    }

    /// Replace the provider of objects for argument-less pushes.
    pub fn with_push_queue(mut self, queue: Arc<dyn PushQueue>) -> Self {
        self.push_queue = queue;
        self
    }

    /// Replace the connectivity check hook.
    pub fn with_connectivity_check(mut self, check: Arc<dyn ConnectivityCheck>) -> Self {
        self.connectivity = check;
        self
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<RemoteEvent> {
        self.bus.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Connect: bootstrap with one snapshot pull, push pending local
    /// objects, then keep pulling continuously in a background task.
    ///
    /// `name` overrides the configured database name (the leading URL
    /// path segment). A recoverable bootstrap failure still returns the
    /// error, but the background loop is spawned anyway and keeps
    /// retrying on the fixed-delay schedule; a 401 disconnects instead.
    pub async fn connect(&self, name: Option<&str>) -> Result<()> {
        if let Some(name) = name {
            *self.name.write().await = Some(name.to_string());
        }

        let _ = self.state_tx.send(ConnectionState::Connecting);
        crate::metrics::record_connection_state("connecting");
        self.bus.emit("connect", EventPayload::None);
        info!("connecting to remote");

        self.bus.emit("bootstrap:start", EventPayload::None);
        let puller = self.make_puller();
        let bootstrap = {
            let _serial = self.pull_gate.lock().await;
            self.race_disconnect(puller.pull_once(false)).await
        };

        match bootstrap {
            Ok(()) => {
                self.bus.emit("bootstrap:end", EventPayload::None);
                let _ = self.state_tx.send(ConnectionState::Connected);
                crate::metrics::record_connection_state("connected");
                info!("bootstrap complete, remote connected");

                let pushed = self.push(None).await;
                if let Err(err) = &pushed {
                    warn!(error = %err, "pending push after bootstrap failed");
                }
                if self.state() != ConnectionState::Disconnected {
                    self.spawn_puller(puller, None).await;
                }
                pushed.map(|_| ())
            }
            Err(err) => {
                self.bus
                    .emit("bootstrap:error", EventPayload::Error(err.to_string()));
                warn!(error = %err, "bootstrap failed");

                let still_active = self.state() != ConnectionState::Disconnected;
                match retry::classify(err.status(), still_active) {
                    RetryAction::Suppress => {}
                    RetryAction::Disconnect => {
                        self.bus.emit(
                            "error:unauthenticated",
                            EventPayload::Error(err.to_string()),
                        );
                        self.disconnect().await;
                    }
                    RetryAction::RetryAfter {
                        server_error,
                        check_connection,
                    } => {
                        if server_error {
                            self.bus
                                .emit("error:server", EventPayload::Error(err.to_string()));
                        }
                        if check_connection {
                            self.connectivity.check().await;
                        }
                        // liveness over ceremony: keep trying in the
                        // background on the fixed-delay schedule
                        let _ = self.state_tx.send(ConnectionState::Connected);
                        crate::metrics::record_connection_state("connected");
                        self.spawn_puller(puller, Some(self.timing.retry_delay()))
                            .await;
                    }
                }
                Err(err)
            }
        }
    }

    /// Disconnect. Idempotent: only the first call emits `disconnect`.
    ///
    /// The continuous loop and any in-flight `pull()`/`push()` observe
    /// the state change; in-flight callers get [`RemoteError::Aborted`].
    pub async fn disconnect(&self) {
        if self.state() == ConnectionState::Disconnected {
            return;
        }
        let _ = self.state_tx.send(ConnectionState::Disconnected);
        crate::metrics::record_connection_state("disconnected");
        self.bus.emit("disconnect", EventPayload::None);
        info!("disconnected from remote");

        if let Some(task) = self.pull_task.lock().await.take() {
            task.abort();
        }
    }

    /// One snapshot pull. Unlike the continuous loop, failures surface
    /// directly to the caller.
    pub async fn pull(&self) -> Result<()> {
        let puller = self.make_puller();
        // the continuous loop may be holding the gate inside a quiet
        // long poll; ask it to drop the poll instead of waiting it out
        self.pull_nudge.notify_one();
        let _serial = self.pull_gate.lock().await;
        self.race_disconnect(puller.pull_once(false)).await
    }

    /// Push objects in one bulk write. `None` consults the configured
    /// [`PushQueue`]. Pushing nothing resolves without a request.
    pub async fn push(&self, objects: Option<Vec<Document>>) -> Result<Vec<Document>> {
        let objects = match objects {
            Some(objects) => objects,
            None => self.push_queue.pending(),
        };
        if objects.is_empty() {
            trace!("nothing to push");
            return Ok(Vec::new());
        }

        let _serial = self.push_gate.lock().await;
        let pusher = BulkPusher::new(
            Arc::clone(&self.transport),
            self.codec.clone(),
            self.bus.clone(),
        );
        let db = self.db_segments().await;
        self.race_disconnect(pusher.push(&db, objects)).await
    }

    /// Push, then pull. The pull runs regardless of the push outcome;
    /// a push error takes precedence in the returned result.
    pub async fn sync(&self, objects: Option<Vec<Document>>) -> Result<Vec<Document>> {
        let pushed = self.push(objects).await;
        let pulled = self.pull().await;
        let pushed = pushed?;
        pulled?;
        Ok(pushed)
    }

    /// Fetch one object by type and id.
    pub async fn find(&self, object_type: &str, id: &str) -> Result<Document> {
        let mut path = self.db_segments().await;
        path.push(self.codec.remote_id(object_type, id));
        let raw = self
            .transport
            .request(Method::Get, &segment_refs(&path), &[], None)
            .await?;
        self.codec.from_remote(into_document(raw)?)
    }

    /// Fetch all objects, optionally restricted to one type.
    ///
    /// Uses a key range over `_all_docs`: from the id prefix up to the
    /// prefix with its last character bumped one code point.
    pub async fn find_all(&self, object_type: Option<&str>) -> Result<Vec<Document>> {
        let mut path = self.db_segments().await;
        path.push("_all_docs".to_string());

        let mut query: Vec<(&str, String)> = vec![("include_docs", "true".to_string())];
        let startkey = match (object_type, self.codec.prefix()) {
            (Some(object_type), prefix) => format!("{prefix}{object_type}/"),
            (None, prefix) => prefix.to_string(),
        };
        if !startkey.is_empty() {
            // keys are JSON values on the wire, so strings travel quoted
            query.push(("startkey", format!("\"{startkey}\"")));
            query.push(("endkey", format!("\"{}\"", bump_last_char(&startkey))));
        }

        let raw = self
            .transport
            .request(Method::Get, &segment_refs(&path), &query, None)
            .await?;
        let rows = raw
            .get("rows")
            .and_then(Value::as_array)
            .ok_or_else(|| RemoteError::BadResponse("_all_docs without rows".to_string()))?;

        let mut objects = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(doc) = row.get("doc").and_then(Value::as_object) else {
                continue;
            };
            objects.push(self.codec.from_remote(doc.clone())?);
        }
        Ok(objects)
    }

    /// Write one object directly (outside the bulk/revision machinery).
    ///
    /// The object must already carry `type` and `id`. Returns the
    /// server's response (`{ok, id, rev}`).
    pub async fn save(&self, object: Document) -> Result<Value> {
        let object_type = object
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| RemoteError::InvalidDocument("save requires `type`".to_string()))?;
        let id = object
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| RemoteError::InvalidDocument("save requires `id`".to_string()))?;

        let mut path = self.db_segments().await;
        path.push(self.codec.remote_id(object_type, id));
        let doc = self.codec.to_remote(&object)?;
        self.transport
            .request(Method::Put, &segment_refs(&path), &[], Some(Value::Object(doc)))
            .await
    }

    /// Delete one object: fetch it, flag it `_deleted`, save it back.
    pub async fn remove(&self, object_type: &str, id: &str) -> Result<Value> {
        let mut object = self.find(object_type, id).await?;
        object.insert("_deleted".to_string(), Value::Bool(true));
        self.save(object).await
    }

    fn make_puller(&self) -> Arc<Puller> {
        Arc::new(Puller {
            transport: Arc::clone(&self.transport),
            codec: self.codec.clone(),
            bus: self.bus.clone(),
            cursor: Arc::clone(&self.cursor),
            known: Arc::clone(&self.known),
            connectivity: Arc::clone(&self.connectivity),
            state_tx: Arc::clone(&self.state_tx),
            state_rx: self.state_rx.clone(),
            db: Arc::clone(&self.name),
            timing: self.timing.clone(),
            gate: Arc::clone(&self.pull_gate),
            nudge: Arc::clone(&self.pull_nudge),
        })
    }

    async fn spawn_puller(&self, puller: Arc<Puller>, initial_delay: Option<std::time::Duration>) {
        let task = tokio::spawn(puller.run(initial_delay));
        if let Some(old) = self.pull_task.lock().await.replace(task) {
            old.abort();
        }
    }

    async fn race_disconnect<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        let mut state = self.state_rx.clone();
        tokio::select! {
            result = operation => result,
            _ = wait_disconnected(&mut state) => Err(RemoteError::Aborted),
        }
    }

    async fn db_segments(&self) -> Vec<String> {
        match self.name.read().await.as_ref() {
            Some(name) => vec![name.clone()],
            None => Vec::new(),
        }
    }
}

fn into_document(value: Value) -> Result<Document> {
    match value {
        Value::Object(doc) => Ok(doc),
        other => Err(RemoteError::BadResponse(format!(
            "expected a document, got: {other}"
        ))),
    }
}

/// Upper bound for a key range scan: the key with its last character
/// bumped one code point. A key ending just below the surrogate range
/// skips to U+E000. Only U+10FFFF has no successor at all; such a key
/// comes back unchanged, collapsing the range to exact matches of the
/// start key.
fn bump_last_char(key: &str) -> String {
    let mut out = key.to_string();
    if let Some(last) = out.pop() {
        let bumped = match char::from_u32(last as u32 + 1) {
            Some(next) => next,
            None if last == '\u{D7FF}' => '\u{E000}',
            None => last,
        };
        out.push(bumped);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_last_char_advances_one_code_point() {
        assert_eq!(bump_last_char("task/"), "task0");
        assert_eq!(bump_last_char("app/"), "app0");
        assert_eq!(bump_last_char("a"), "b");
        assert_eq!(bump_last_char(""), "");
    }

    #[test]
    fn bump_last_char_skips_the_surrogate_gap() {
        assert_eq!(bump_last_char("a\u{D7FF}"), "a\u{E000}");
        assert_eq!(bump_last_char("a\u{10FFFF}"), "a\u{10FFFF}");
    }

    #[test]
    fn connection_state_names() {
        assert_eq!(ConnectionState::Disconnected.as_str(), "disconnected");
        assert_eq!(ConnectionState::Connecting.as_str(), "connecting");
        assert_eq!(ConnectionState::Connected.as_str(), "connected");
    }

    #[test]
    fn into_document_rejects_non_objects() {
        assert!(into_document(serde_json::json!({"a": 1})).is_ok());
        assert!(matches!(
            into_document(serde_json::json!([1, 2])),
            Err(RemoteError::BadResponse(_))
        ));
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Change-feed puller.
//!
//! One-shot pulls take a plain snapshot of `{db}/_changes`. The
//! continuous loop holds a long poll open (`feed=longpoll` with a server
//! heartbeat) and races it against a watchdog and the disconnect signal:
//!
//! ```text
//! loop {
//!     select! {
//!         result = pull     => classify / apply,
//!         _ = watchdog(25s) => drop the poll, re-pull immediately,
//!         _ = disconnected  => stop,
//!     }
//! }
//! ```
//!
//! Every successful pull advances the cursor to the response's
//! `last_seq` before any change is applied, so a crash mid-apply never
//! replays from an older sequence than the server already reported.
//! Failures go through [`crate::retry::classify`]; the loop sleeps the
//! fixed delay and pulls again, indefinitely, until disconnected or
//! unauthenticated.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{watch, Mutex, Notify, RwLock};
use tokio::time::sleep;
use tracing::{debug, trace, warn};

use crate::client::{wait_disconnected, ConnectionState, ConnectivityCheck};
use crate::codec::{Document, DocumentCodec};
use crate::config::TimingConfig;
use crate::cursor::SequenceCursor;
use crate::error::{RemoteError, Result};
use crate::events::{ChangeKind, EventBus, EventPayload};
use crate::known::KnownObjects;
use crate::retry::{self, RetryAction};
use crate::transport::{segment_refs, Method, Transport};

#[derive(Debug, Deserialize)]
struct ChangesResponse {
    last_seq: u64,
    #[serde(default)]
    results: Vec<ChangeRow>,
}

#[derive(Debug, Deserialize)]
struct ChangeRow {
    #[serde(default)]
    doc: Option<Document>,
}

pub(crate) struct Puller {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) codec: DocumentCodec,
    pub(crate) bus: EventBus,
    pub(crate) cursor: Arc<dyn SequenceCursor>,
    pub(crate) known: Arc<Mutex<KnownObjects>>,
    pub(crate) connectivity: Arc<dyn ConnectivityCheck>,
    pub(crate) state_tx: Arc<watch::Sender<ConnectionState>>,
    pub(crate) state_rx: watch::Receiver<ConnectionState>,
    pub(crate) db: Arc<RwLock<Option<String>>>,
    pub(crate) timing: TimingConfig,
    /// Serializes pulls: at most one `_changes` request in flight,
    /// shared with the client's one-shot `pull()`.
    pub(crate) gate: Arc<Mutex<()>>,
    /// Asks the loop to drop a held long poll so a snapshot pull can
    /// take the gate without waiting out the watchdog.
    pub(crate) nudge: Arc<Notify>,
}

impl Puller {
    /// One `_changes` request: read the cursor, fetch, advance the
    /// cursor, classify and publish the changes.
    pub(crate) async fn pull_once(&self, longpoll: bool) -> Result<()> {
        let since = self.cursor.get();
        let mut query: Vec<(&str, String)> = vec![
            ("include_docs", "true".to_string()),
            ("since", since.to_string()),
        ];
        if longpoll {
            query.push(("heartbeat", self.timing.heartbeat_ms.to_string()));
            query.push(("feed", "longpoll".to_string()));
        }

        let mut path = Vec::new();
        if let Some(name) = self.db.read().await.as_ref() {
            path.push(name.clone());
        }
        path.push("_changes".to_string());

        trace!(since, longpoll, "pulling changes");
        let raw = self
            .transport
            .request(Method::Get, &segment_refs(&path), &query, None)
            .await?;
        let response: ChangesResponse = serde_json::from_value(raw)
            .map_err(|err| RemoteError::BadResponse(format!("_changes: {err}")))?;

        debug!(
            last_seq = response.last_seq,
            rows = response.results.len(),
            "pull completed"
        );
        self.cursor.set(response.last_seq);
        crate::metrics::record_pull(response.results.len());
        self.apply_changes(response.results, longpoll).await;
        Ok(())
    }

    /// Classify and publish pulled changes.
    ///
    /// A long-poll result landing after disconnect keeps its cursor
    /// advance (already applied) but publishes nothing. Rows without a
    /// document, documents outside the id prefix, and undecodable
    /// documents are skipped.
    async fn apply_changes(&self, rows: Vec<ChangeRow>, from_continuous: bool) {
        if from_continuous && *self.state_rx.borrow() == ConnectionState::Disconnected {
            debug!("dropping change events that arrived after disconnect");
            return;
        }

        for row in rows {
            let Some(doc) = row.doc else {
                warn!("change row without document, skipping");
                continue;
            };
            let in_prefix = doc
                .get("_id")
                .and_then(Value::as_str)
                .map(|raw_id| self.codec.matches_prefix(raw_id));
            match in_prefix {
                Some(true) => {}
                Some(false) => continue,
                None => {
                    warn!("change document without _id, skipping");
                    continue;
                }
            }

            let object = match self.codec.from_remote(doc) {
                Ok(object) => object,
                Err(err) => {
                    warn!(error = %err, "undecodable change document, skipping");
                    continue;
                }
            };
            let deleted = object
                .get("_deleted")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let object_type = object
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let id = object
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            // membership is read before it is mutated: a remove deletes
            // the key so a later re-creation classifies as add
            let kind = {
                let mut known = self.known.lock().await;
                let was_known = known.contains(&object_type, &id);
                if deleted {
                    if was_known {
                        known.remove(&object_type, &id);
                        Some(ChangeKind::Remove)
                    } else {
                        None
                    }
                } else if was_known {
                    Some(ChangeKind::Update)
                } else {
                    known.insert(&object_type, &id);
                    Some(ChangeKind::Add)
                }
            };
            let Some(kind) = kind else {
                trace!(object_type = %object_type, id = %id, "deletion of unknown object, ignored");
                continue;
            };

            trace!(kind = %kind, object_type = %object_type, id = %id, "classified change");
            crate::metrics::record_change(kind);
            self.bus.emit_change(kind, &object);
        }
    }

    /// Continuous pull loop. Runs until disconnected or unauthenticated.
    pub(crate) async fn run(self: Arc<Self>, initial_delay: Option<Duration>) {
        let mut state = self.state_rx.clone();

        if let Some(delay) = initial_delay {
            tokio::select! {
                _ = sleep(delay) => {}
                _ = wait_disconnected(&mut state) => return,
            }
        }

        debug!("continuous pull loop started");
        loop {
            if *state.borrow() == ConnectionState::Disconnected {
                break;
            }

            let outcome = {
                let _serial = self.gate.lock().await;
                let pull = self.pull_once(true);
                tokio::pin!(pull);
                tokio::select! {
                    result = &mut pull => Some(result),
                    _ = sleep(self.timing.watchdog()) => {
                        crate::metrics::record_watchdog_restart();
                        trace!("watchdog expired, restarting long poll");
                        None
                    }
                    _ = self.nudge.notified() => {
                        trace!("long poll released for a snapshot pull");
                        None
                    }
                    _ = wait_disconnected(&mut state) => break,
                }
            };

            match outcome {
                // poll dropped (watchdog or snapshot-pull nudge): the
                // next iteration reissues it immediately
                None => {}
                Some(Ok(())) => {}
                Some(Err(err)) => {
                    let connected = *state.borrow() != ConnectionState::Disconnected;
                    match retry::classify(err.status(), connected) {
                        RetryAction::Suppress => {
                            debug!(error = %err, "pull failed after disconnect, suppressing");
                            break;
                        }
                        RetryAction::Disconnect => {
                            warn!(error = %err, "authentication lost, disconnecting");
                            self.bus.emit(
                                "error:unauthenticated",
                                EventPayload::Error(err.to_string()),
                            );
                            let _ = self.state_tx.send(ConnectionState::Disconnected);
                            crate::metrics::record_connection_state("disconnected");
                            self.bus.emit("disconnect", EventPayload::None);
                            break;
                        }
                        RetryAction::RetryAfter {
                            server_error,
                            check_connection,
                        } => {
                            crate::metrics::record_pull_retry();
                            warn!(
                                error = %err,
                                delay_secs = self.timing.retry_delay_secs,
                                "pull failed, retrying"
                            );
                            if server_error {
                                self.bus
                                    .emit("error:server", EventPayload::Error(err.to_string()));
                            }
                            if check_connection {
                                self.connectivity.check().await;
                            }
                            tokio::select! {
                                _ = sleep(self.timing.retry_delay()) => {}
                                _ = wait_disconnected(&mut state) => break,
                            }
                        }
                    }
                }
            }
        }
        debug!("continuous pull loop stopped");
    }
}

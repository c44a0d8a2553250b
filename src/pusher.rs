// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bulk pusher.
//!
//! Pushing takes local objects, mints a revision for each, encodes them,
//! and delivers the whole batch in one `POST {db}/_bulk_docs` with
//! `new_edits: false` (the server stores the client-minted revisions
//! as-is). Input objects are never mutated; revisions are assigned to
//! clones. On success one `push` event is emitted per object, in input
//! order.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::codec::{Document, DocumentCodec};
use crate::error::{RemoteError, Result};
use crate::events::{EventBus, EventPayload};
use crate::revision;
use crate::transport::{segment_refs, Method, Transport};

/// Supplies the objects to push when `push()` is called without an
/// explicit list (typically: the local store's dirty objects).
pub trait PushQueue: Send + Sync {
    fn pending(&self) -> Vec<Document>;
}

/// A queue with nothing in it. The default.
#[derive(Debug, Default)]
pub struct NoPending;

impl PushQueue for NoPending {
    fn pending(&self) -> Vec<Document> {
        Vec::new()
    }
}

/// A fixed set of pending objects. Useful in tests and for one-off
/// migrations.
#[derive(Debug)]
pub struct StaticQueue {
    objects: Vec<Document>,
}

impl StaticQueue {
    pub fn new(objects: Vec<Document>) -> Self {
        Self { objects }
    }
}

impl PushQueue for StaticQueue {
    fn pending(&self) -> Vec<Document> {
        self.objects.clone()
    }
}

pub(crate) struct BulkPusher {
    transport: Arc<dyn Transport>,
    codec: DocumentCodec,
    bus: EventBus,
}

impl BulkPusher {
    pub(crate) fn new(transport: Arc<dyn Transport>, codec: DocumentCodec, bus: EventBus) -> Self {
        Self {
            transport,
            codec,
            bus,
        }
    }

    /// Push `objects` in one bulk write.
    ///
    /// An empty input resolves immediately without touching the network.
    /// Encoding failures reject the whole batch before any request.
    /// Returns the original objects on success.
    pub(crate) async fn push(&self, db: &[String], objects: Vec<Document>) -> Result<Vec<Document>> {
        if objects.is_empty() {
            return Ok(objects);
        }

        let mut docs = Vec::with_capacity(objects.len());
        for object in &objects {
            let mut copy = object.clone();
            revision::assign_revision(&mut copy);
            docs.push(Value::Object(self.codec.to_remote(&copy)?));
        }

        let body = json!({ "docs": docs, "new_edits": false });
        let mut path = segment_refs(db);
        path.push("_bulk_docs");

        debug!(count = objects.len(), "pushing bulk write");
        let response = self
            .transport
            .request(Method::Post, &path, &[], Some(body))
            .await?;
        reject_partial_failures(&response)?;

        crate::metrics::record_push(objects.len());
        for object in &objects {
            self.bus.emit("push", EventPayload::Object(object.clone()));
        }
        Ok(objects)
    }
}

/// With `new_edits: false` the endpoint answers `[]` unless a document
/// was rejected; any entry with an `error` field fails the push.
fn reject_partial_failures(response: &Value) -> Result<()> {
    let Some(rows) = response.as_array() else {
        return Ok(());
    };
    for row in rows {
        if let Some(error) = row.get("error").and_then(Value::as_str) {
            let id = row.get("id").and_then(Value::as_str).unwrap_or("<unknown>");
            let reason = row
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("no reason given");
            return Err(RemoteError::PushRejected(format!(
                "{id}: {error} ({reason})"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_bulk_response_is_success() {
        assert!(reject_partial_failures(&json!([])).is_ok());
        assert!(reject_partial_failures(&json!({"ok": true})).is_ok());
    }

    #[test]
    fn error_entries_reject_the_push() {
        let response = json!([
            {"id": "task/abc", "error": "conflict", "reason": "Document update conflict."}
        ]);
        let err = reject_partial_failures(&response).unwrap_err();
        assert!(matches!(err, RemoteError::PushRejected(_)));
        assert!(err.to_string().contains("task/abc"));
        assert!(err.to_string().contains("conflict"));
    }

    #[test]
    fn rows_without_errors_pass() {
        let response = json!([
            {"ok": true, "id": "task/abc", "rev": "1-x"}
        ]);
        assert!(reject_partial_failures(&response).is_ok());
    }

    #[test]
    fn static_queue_hands_out_its_objects() {
        let object = json!({"type": "task", "id": "a"})
            .as_object()
            .unwrap()
            .clone();
        let queue = StaticQueue::new(vec![object.clone()]);
        assert_eq!(queue.pending(), vec![object]);
        assert!(NoPending.pending().is_empty());
    }
}

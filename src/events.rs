// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Event fan-out.
//!
//! Consumers subscribe to a broadcast channel and filter on event names.
//! Every classified change produces six events, from most to least
//! specific:
//!
//! ```text
//! add                    change
//! task:add               task:change
//! task:abc4567:add       task:abc4567:change
//! ```
//!
//! Lifecycle events (`connect`, `disconnect`, `bootstrap:start`,
//! `bootstrap:end`, `bootstrap:error`, `push`, `error:unauthenticated`,
//! `error:server`) are single emits. When the remote has a name, every
//! event name is prefixed `"{name}:"`.
//!
//! Emission is non-blocking; events published with no subscribers are
//! dropped.

use tokio::sync::broadcast;
use tracing::trace;

use crate::codec::Document;

const CHANNEL_CAPACITY: usize = 256;

/// Classification of a pulled change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Document not seen before.
    Add,
    /// Document already known locally.
    Update,
    /// Known document deleted on the remote.
    Remove,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Add => "add",
            ChangeKind::Update => "update",
            ChangeKind::Remove => "remove",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One published event.
#[derive(Debug, Clone)]
pub struct RemoteEvent {
    pub name: String,
    pub payload: EventPayload,
}

/// What an event carries.
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// Lifecycle signal with no data.
    None,
    /// A document, in local object form.
    Object(Document),
    /// A classified change (`change` family events).
    Change { kind: ChangeKind, object: Document },
    /// An error description (`error:*` and `bootstrap:error`).
    Error(String),
}

/// Broadcast event bus with an optional name prefix.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RemoteEvent>,
    namespace: Option<String>,
}

impl EventBus {
    pub fn new(namespace: Option<String>) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx, namespace }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RemoteEvent> {
        self.tx.subscribe()
    }

    /// Publish one event. Lossy when nobody is subscribed.
    pub fn emit(&self, name: impl Into<String>, payload: EventPayload) {
        let mut name = name.into();
        if let Some(namespace) = &self.namespace {
            name = format!("{namespace}:{name}");
        }
        trace!(event = %name, "emit");
        let _ = self.tx.send(RemoteEvent { name, payload });
    }

    /// Publish the six-event fan-out for one classified change.
    pub fn emit_change(&self, kind: ChangeKind, object: &Document) {
        let object_type = object
            .get("type")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        let id = object
            .get("id")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();

        self.emit(kind.as_str(), EventPayload::Object(object.clone()));
        self.emit(
            format!("{object_type}:{kind}"),
            EventPayload::Object(object.clone()),
        );
        self.emit(
            format!("{object_type}:{id}:{kind}"),
            EventPayload::Object(object.clone()),
        );

        let change = EventPayload::Change {
            kind,
            object: object.clone(),
        };
        self.emit("change", change.clone());
        self.emit(format!("{object_type}:change"), change.clone());
        self.emit(format!("{object_type}:{id}:change"), change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn drain(rx: &mut broadcast::Receiver<RemoteEvent>) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name);
        }
        names
    }

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new(None);
        bus.emit("connect", EventPayload::None);
    }

    #[test]
    fn change_fans_out_six_events() {
        let bus = EventBus::new(None);
        let mut rx = bus.subscribe();

        let object = json!({"type": "task", "id": "abc", "title": "x"})
            .as_object()
            .unwrap()
            .clone();
        bus.emit_change(ChangeKind::Add, &object);

        assert_eq!(
            drain(&mut rx),
            vec![
                "add",
                "task:add",
                "task:abc:add",
                "change",
                "task:change",
                "task:abc:change",
            ]
        );
    }

    #[test]
    fn change_payload_carries_kind_and_object() {
        let bus = EventBus::new(None);
        let mut rx = bus.subscribe();

        let object = json!({"type": "task", "id": "abc"})
            .as_object()
            .unwrap()
            .clone();
        bus.emit_change(ChangeKind::Remove, &object);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.name, "remove");
        match first.payload {
            EventPayload::Object(doc) => assert_eq!(doc, object),
            other => panic!("unexpected payload: {other:?}"),
        }

        let change = std::iter::from_fn(|| rx.try_recv().ok())
            .find(|e| e.name == "change")
            .unwrap();
        match change.payload {
            EventPayload::Change { kind, object: doc } => {
                assert_eq!(kind, ChangeKind::Remove);
                assert_eq!(doc, object);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn named_buses_prefix_event_names() {
        let bus = EventBus::new(Some("db-1".into()));
        let mut rx = bus.subscribe();

        bus.emit("connect", EventPayload::None);
        let object = json!({"type": "task", "id": "a"})
            .as_object()
            .unwrap()
            .clone();
        bus.emit_change(ChangeKind::Update, &object);

        let names = drain(&mut rx);
        assert_eq!(names[0], "db-1:connect");
        assert_eq!(names[1], "db-1:update");
        assert_eq!(names[4], "db-1:change");
    }
}

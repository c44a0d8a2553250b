//! Mock Transport for testing.
//!
//! Records every request (method, path segments, query, body) for
//! assertions and answers from a scripted queue of responses. When the
//! queue runs out, requests hang forever, which is exactly what a held
//! long poll with no changes looks like to the puller.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::broadcast;

use remote_sync::{BoxFuture, Method, RemoteError, RemoteEvent, Transport};

/// A recorded request() call.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: Vec<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RecordedRequest {
    /// `true` when the query contains exactly this pair.
    pub fn has_query(&self, key: &str, value: &str) -> bool {
        self.query.iter().any(|(k, v)| k == key && v == value)
    }
}

enum Scripted {
    Ok(Value),
    Err(Option<u16>, String),
}

/// Mock implementation of Transport that records all calls.
///
/// Responses are served in FIFO order. An exhausted queue makes the
/// request pend forever (a quiet long poll); tests that expect a bounded
/// number of requests rely on this.
#[derive(Default)]
pub struct MockTransport {
    requests: Mutex<Vec<RecordedRequest>>,
    responses: Mutex<VecDeque<Scripted>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful JSON response.
    pub fn respond_ok(&self, body: Value) {
        self.responses.lock().unwrap().push_back(Scripted::Ok(body));
    }

    /// Queue a transport failure with an HTTP status.
    pub fn respond_status(&self, status: u16, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Scripted::Err(Some(status), message.to_string()));
    }

    /// Queue a transport failure without a status (connection refused).
    pub fn respond_network_error(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Scripted::Err(None, message.to_string()));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Transport for MockTransport {
    fn request(
        &self,
        method: Method,
        path: &[&str],
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> BoxFuture<'_, Value> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method,
            path: path.iter().map(|s| s.to_string()).collect(),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            body,
        });

        let scripted = self.responses.lock().unwrap().pop_front();
        Box::pin(async move {
            match scripted {
                Some(Scripted::Ok(value)) => Ok(value),
                Some(Scripted::Err(status, message)) => {
                    Err(RemoteError::transport(status, message))
                }
                // no script left: hold the request open like a quiet
                // long poll
                None => std::future::pending().await,
            }
        })
    }
}

/// Drain every event already delivered to `rx` and return their names.
pub fn drain_event_names(rx: &mut broadcast::Receiver<RemoteEvent>) -> Vec<String> {
    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        names.push(event.name);
    }
    names
}

/// An empty `_changes` response with the given sequence.
pub fn empty_changes(last_seq: u64) -> Value {
    serde_json::json!({ "last_seq": last_seq, "results": [] })
}

/// A `_changes` response carrying the given documents.
pub fn changes_with(last_seq: u64, docs: Vec<Value>) -> Value {
    let results: Vec<Value> = docs
        .into_iter()
        .map(|doc| serde_json::json!({ "doc": doc }))
        .collect();
    serde_json::json!({ "last_seq": last_seq, "results": results })
}

//! # Remote Sync
//!
//! An offline-first sync client for CouchDB-style document databases.
//! The local application keeps working against its own store; this crate
//! keeps that store and a remote database converging.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          RemoteStore                             │
//! │                                                                  │
//! │  ┌────────────┐   ┌───────────────┐   ┌───────────────────────┐  │
//! │  │ BulkPusher │──►│ DocumentCodec │──►│ Transport (HTTP/mock) │  │
//! │  │ (_bulk_docs│   │ + revisions   │   └───────────┬───────────┘  │
//! │  │  batches)  │   └───────────────┘               │              │
//! │  └────────────┘                                   ▼              │
//! │  ┌────────────┐   ┌───────────────┐   ┌───────────────────────┐  │
//! │  │ Puller     │◄──│ SequenceCursor│   │ remote _changes feed  │  │
//! │  │ (long poll │   │ (memory or    │   │ (long poll, heartbeat)│  │
//! │  │  + watchdog│   │  SQLite)      │   └───────────────────────┘  │
//! │  └─────┬──────┘   └───────────────┘                              │
//! │        ▼                                                         │
//! │  ┌────────────┐   ┌───────────────┐                              │
//! │  │ KnownObjs  │──►│ EventBus      │──► add / update / remove /   │
//! │  │ (classify) │   │ (broadcast)   │    change / push / lifecycle │
//! │  └────────────┘   └───────────────┘                              │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Protocol
//!
//! - **Pull**: tail `{db}/_changes?include_docs=true&since=<cursor>` as a
//!   held-open long poll, watchdogged at 25s; classify every changed
//!   document against the known-objects set and fan out events.
//! - **Push**: mint client-side revisions and deliver batches via
//!   `POST {db}/_bulk_docs` with `new_edits: false`.
//! - **Failures**: fixed-delay retry, no backoff, forever; only a 401
//!   stops the loop (see [`retry`]).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use remote_sync::{HttpTransport, RemoteConfig, RemoteStore};
//!
//! #[tokio::main]
//! async fn main() -> remote_sync::Result<()> {
//!     let transport = Arc::new(HttpTransport::new("http://localhost:5984")?);
//!     let store = RemoteStore::new(RemoteConfig::default(), transport);
//!
//!     let mut events = store.subscribe();
//!     store.connect(Some("user-4b9d")).await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("{}: {:?}", event.name, event.payload);
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod cursor;
pub mod error;
pub mod events;
pub mod known;
pub mod metrics;
mod puller;
pub mod pusher;
pub mod retry;
pub mod revision;
pub mod transport;

// Re-exports for convenience
pub use client::{ConnectionState, ConnectivityCheck, NoopConnectivityCheck, RemoteStore};
pub use codec::{Document, DocumentCodec, RESERVED_ATTRIBUTES};
pub use config::{ObjectRef, RemoteConfig, TimingConfig};
pub use cursor::{MemoryCursor, SequenceCursor, SqliteCursor};
pub use error::{RemoteError, Result};
pub use events::{ChangeKind, EventBus, EventPayload, RemoteEvent};
pub use known::KnownObjects;
pub use pusher::{NoPending, PushQueue, StaticQueue};
pub use retry::RetryAction;
pub use revision::{next_revision, parse_rev, RevisionAncestry, LOCAL_WRITE_MARKER};
pub use transport::{BoxFuture, HttpTransport, Method, Transport};

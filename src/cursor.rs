// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Change-feed cursor: the `since` sequence the next pull resumes from.
//!
//! The puller reads the cursor before every `_changes` request and
//! advances it with the `last_seq` of every successful response. Two
//! implementations are provided:
//!
//! - [`MemoryCursor`]: an atomic, process-local cursor (the default).
//! - [`SqliteCursor`]: persisted to SQLite for crash recovery. Reads are
//!   served from a cached value; writes mark the cursor dirty and are
//!   flushed on demand (callers typically flush on a timer and on close).
//!
//! Both keep the cursor monotonic: `set` never moves it backwards, so a
//! late long-poll result cannot undo a newer snapshot pull.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Where the next pull resumes from.
///
/// Implementations must be cheap to call from the pull hot path; `set`
/// must keep the sequence monotonic.
pub trait SequenceCursor: Send + Sync {
    /// Current sequence.
    fn get(&self) -> u64;

    /// Advance to `seq`. Calls with a smaller value are ignored.
    fn set(&self, seq: u64);
}

/// Process-local cursor backed by an atomic.
#[derive(Debug)]
pub struct MemoryCursor {
    seq: AtomicU64,
}

impl MemoryCursor {
    pub fn new(seed: u64) -> Self {
        Self {
            seq: AtomicU64::new(seed),
        }
    }
}

impl SequenceCursor for MemoryCursor {
    fn get(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    fn set(&self, seq: u64) {
        self.seq.fetch_max(seq, Ordering::SeqCst);
    }
}

/// Cursor persisted to SQLite, one row per binding.
///
/// Reads come from an in-memory cache seeded at open. Writes update the
/// cache and set a dirty flag; [`flush`](Self::flush) writes the cached
/// value through to SQLite. [`close`](Self::close) flushes before
/// shutting the pool down.
pub struct SqliteCursor {
    pool: SqlitePool,
    binding: String,
    cached: AtomicU64,
    dirty: AtomicBool,
}

impl SqliteCursor {
    /// Open (creating if needed) the cursor database at `path` and load
    /// the sequence stored for `binding`.
    pub async fn open(path: impl AsRef<Path>, binding: impl Into<String>) -> Result<Self> {
        let binding = binding.into();
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sync_cursors (
                binding TEXT PRIMARY KEY,
                seq INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        let stored: Option<(i64,)> =
            sqlx::query_as("SELECT seq FROM sync_cursors WHERE binding = ?")
                .bind(&binding)
                .fetch_optional(&pool)
                .await?;
        let seed = stored.map(|(seq,)| seq as u64).unwrap_or(0);

        info!(binding = %binding, seq = seed, "cursor store opened");

        Ok(Self {
            pool,
            binding,
            cached: AtomicU64::new(seed),
            dirty: AtomicBool::new(false),
        })
    }

    /// Write the cached sequence through to SQLite if it changed since
    /// the last flush. Returns whether a write happened.
    pub async fn flush(&self) -> Result<bool> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(false);
        }

        let seq = self.cached.load(Ordering::SeqCst);
        let result = sqlx::query(
            "INSERT INTO sync_cursors (binding, seq, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(binding) DO UPDATE SET seq = excluded.seq,
                                                updated_at = excluded.updated_at",
        )
        .bind(&self.binding)
        .bind(seq as i64)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(binding = %self.binding, seq, "cursor flushed");
                Ok(true)
            }
            Err(err) => {
                // keep the data marked dirty so the next flush retries
                self.dirty.store(true, Ordering::SeqCst);
                Err(err.into())
            }
        }
    }

    /// Flush and shut the pool down.
    pub async fn close(&self) {
        if let Err(err) = self.flush().await {
            warn!(binding = %self.binding, error = %err, "final cursor flush failed");
        }
        self.pool.close().await;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }
}

impl SequenceCursor for SqliteCursor {
    fn get(&self) -> u64 {
        self.cached.load(Ordering::SeqCst)
    }

    fn set(&self, seq: u64) {
        let prev = self.cached.fetch_max(seq, Ordering::SeqCst);
        if seq > prev {
            self.dirty.store(true, Ordering::SeqCst);
        }
    }
}

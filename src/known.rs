// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Known-objects tracker.
//!
//! Pulled changes are classified against a membership set of objects the
//! client has already seen: unknown documents become `add`, known ones
//! `update`, and deletions of known objects become `remove` (deletions of
//! unknown objects are dropped silently). A `remove` deletes the
//! membership key, so a later re-creation of the same object is observed
//! as a fresh `add`.

use std::collections::HashSet;

/// Membership set keyed by `"type/id"`.
#[derive(Debug, Default)]
pub struct KnownObjects {
    keys: HashSet<String>,
}

impl KnownObjects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tracker seeded from `(type, id)` pairs.
    pub fn seeded<'a>(objects: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut tracker = Self::new();
        for (object_type, id) in objects {
            tracker.insert(object_type, id);
        }
        tracker
    }

    pub fn contains(&self, object_type: &str, id: &str) -> bool {
        self.keys.contains(&key(object_type, id))
    }

    pub fn insert(&mut self, object_type: &str, id: &str) {
        self.keys.insert(key(object_type, id));
    }

    pub fn remove(&mut self, object_type: &str, id: &str) {
        self.keys.remove(&key(object_type, id));
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn key(object_type: &str, id: &str) -> String {
    format!("{object_type}/{id}")
}

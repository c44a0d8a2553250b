// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document codec: local object form <-> remote document form.
//!
//! Local objects carry separate `type` and `id` properties. Remote
//! documents combine them into `_id = {prefix}{type}/{id}` and only allow
//! a fixed set of underscore-prefixed properties on the wire.
//!
//! ```text
//! local                          remote
//! { "type": "task",              { "_id": "app/task/abc4567",
//!   "id": "abc4567",       <->     "_rev": "2-xk92ma01p",
//!   "_rev": "2-xk92ma01p",         "title": "..." }
//!   "_$local": true,        (stripped: not on the allow-list)
//!   "title": "..." }
//! ```
//!
//! Decoding splits the unprefixed `_id` at the FIRST `/` only, so ids may
//! themselves contain slashes.

use serde_json::Value;

use crate::error::{RemoteError, Result};

/// A JSON object, the working representation of a document on both sides
/// of the codec.
pub type Document = serde_json::Map<String, Value>;

/// Underscore-prefixed properties allowed through to the remote.
/// Everything else starting with `_` is private local state and is
/// stripped by [`DocumentCodec::to_remote`].
pub const RESERVED_ATTRIBUTES: [&str; 5] =
    ["_id", "_rev", "_deleted", "_revisions", "_attachments"];

/// Maps objects between their local and remote forms.
#[derive(Debug, Clone)]
pub struct DocumentCodec {
    prefix: String,
}

impl DocumentCodec {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether a raw remote `_id` belongs to this codec's prefix.
    ///
    /// An empty prefix matches everything.
    pub fn matches_prefix(&self, raw_id: &str) -> bool {
        raw_id.starts_with(&self.prefix)
    }

    /// The remote `_id` for a `type`/`id` pair.
    pub fn remote_id(&self, object_type: &str, id: &str) -> String {
        format!("{}{}/{}", self.prefix, object_type, id)
    }

    /// Encode a local object into its remote document form.
    ///
    /// Fails with [`RemoteError::InvalidDocument`] when `type` or `id` is
    /// missing or not a string. The input is not modified.
    pub fn to_remote(&self, object: &Document) -> Result<Document> {
        let object_type = required_str(object, "type")?;
        let id = required_str(object, "id")?;

        let mut doc = Document::new();
        for (key, value) in object {
            if key == "id" {
                continue;
            }
            if key.starts_with('_') && !RESERVED_ATTRIBUTES.contains(&key.as_str()) {
                continue;
            }
            doc.insert(key.clone(), value.clone());
        }
        doc.insert(
            "_id".to_string(),
            Value::String(self.remote_id(object_type, id)),
        );
        Ok(doc)
    }

    /// Decode a remote document into its local object form.
    ///
    /// Strips the configured prefix from `_id` and splits the remainder
    /// at the first `/` into `type` and `id`.
    pub fn from_remote(&self, mut doc: Document) -> Result<Document> {
        let raw_id = match doc.remove("_id") {
            Some(Value::String(s)) => s,
            Some(other) => {
                return Err(RemoteError::BadResponse(format!(
                    "document _id is not a string: {other}"
                )))
            }
            None => {
                return Err(RemoteError::BadResponse(
                    "document without _id".to_string(),
                ))
            }
        };

        let unprefixed = raw_id.strip_prefix(&self.prefix).unwrap_or(&raw_id);
        let (object_type, id) = unprefixed.split_once('/').ok_or_else(|| {
            RemoteError::BadResponse(format!("document _id without type separator: {raw_id}"))
        })?;

        doc.insert("type".to_string(), Value::String(object_type.to_string()));
        doc.insert("id".to_string(), Value::String(id.to_string()));
        Ok(doc)
    }
}

fn required_str<'a>(object: &'a Document, key: &str) -> Result<&'a str> {
    object
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| RemoteError::InvalidDocument(format!("missing or non-string `{key}`")))
}

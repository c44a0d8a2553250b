// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Client-side revision allocation.
//!
//! Because bulk writes go out with `new_edits: false`, the client mints
//! its own revisions instead of letting the server assign them. A
//! revision is `"{counter}-{token}"`: the counter increments by one per
//! push, the token is 9 random lowercase-alphanumeric characters. The
//! `_revisions` ancestry object tells the server where the new revision
//! attaches in the document's history.
//!
//! Writes flagged with the [`LOCAL_WRITE_MARKER`] property get a `-local`
//! token suffix; such revisions are never replicated outside the owning
//! database.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::Document;

/// Alphabet for revision tokens. Lowercase only to stay friendly with
/// remote naming rules.
const TOKEN_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of a generated revision token.
const TOKEN_LENGTH: usize = 9;

/// Property marking an object as a local-only write.
///
/// Truthy values request a `-local` revision token. The property itself
/// never reaches the wire (the codec strips it).
pub const LOCAL_WRITE_MARKER: &str = "_$local";

/// Revision ancestry sent alongside a minted revision.
///
/// `start` is the new revision's counter; `ids` lists tokens from newest
/// to oldest (the new token, then the replaced one if any).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionAncestry {
    pub start: u64,
    pub ids: Vec<String>,
}

/// Split a revision string into its counter and token.
///
/// A counter that fails to parse is treated as 0, so a garbage `_rev`
/// degrades to a fresh `1-` revision instead of an error.
pub fn parse_rev(rev: &str) -> (u64, Option<&str>) {
    let (counter, token) = match rev.split_once('-') {
        Some((counter, token)) => (counter, Some(token)),
        None => (rev, None),
    };
    (
        counter.parse().unwrap_or(0),
        token.filter(|t| !t.is_empty()),
    )
}

/// Generate a random revision token.
pub fn generate_token(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| TOKEN_CHARS[rng.gen_range(0..TOKEN_CHARS.len())] as char)
        .collect()
}

/// Mint the next revision after `prev`.
///
/// Returns the new revision string and the ancestry linking it to the
/// previous one.
pub fn next_revision(prev: Option<&str>, local_only: bool) -> (String, RevisionAncestry) {
    let (counter, prev_token) = match prev {
        Some(rev) => parse_rev(rev),
        None => (0, None),
    };

    let mut token = generate_token(TOKEN_LENGTH);
    if local_only {
        token.push_str("-local");
    }
    let rev = format!("{}-{}", counter + 1, token);

    let mut ancestry = RevisionAncestry {
        start: 1,
        ids: vec![token],
    };
    if let Some(prev_token) = prev_token {
        ancestry.start += counter;
        ancestry.ids.push(prev_token.to_string());
    }

    (rev, ancestry)
}

/// Assign a freshly minted `_rev` and `_revisions` pair to an object,
/// reading the previous `_rev` and the local-write marker off the object
/// itself.
pub fn assign_revision(object: &mut Document) {
    let prev = object
        .get("_rev")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let local_only = object
        .get(LOCAL_WRITE_MARKER)
        .map(|v| v.as_bool().unwrap_or(true))
        .unwrap_or(false);

    let (rev, ancestry) = next_revision(prev.as_deref(), local_only);

    let ids = ancestry.ids.into_iter().map(Value::String).collect();
    let mut revisions = Document::new();
    revisions.insert("start".to_string(), Value::from(ancestry.start));
    revisions.insert("ids".to_string(), Value::Array(ids));

    object.insert("_rev".to_string(), Value::String(rev));
    object.insert("_revisions".to_string(), Value::Object(revisions));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_revision_starts_at_one() {
        let (rev, ancestry) = next_revision(None, false);
        let (counter, token) = parse_rev(&rev);
        assert_eq!(counter, 1);
        assert_eq!(token.unwrap().len(), TOKEN_LENGTH);
        assert_eq!(ancestry.start, 1);
        assert_eq!(ancestry.ids, vec![token.unwrap().to_string()]);
    }

    #[test]
    fn next_revision_links_to_previous_token() {
        let (rev, ancestry) = next_revision(Some("3-oldtoken9"), false);
        let (counter, token) = parse_rev(&rev);
        assert_eq!(counter, 4);
        assert_eq!(ancestry.start, 4);
        assert_eq!(
            ancestry.ids,
            vec![token.unwrap().to_string(), "oldtoken9".to_string()]
        );
    }

    #[test]
    fn local_writes_get_suffixed_tokens() {
        let (rev, ancestry) = next_revision(None, true);
        assert!(rev.ends_with("-local"));
        assert!(ancestry.ids[0].ends_with("-local"));
        // counter still parses: the token is everything after the first dash
        assert_eq!(parse_rev(&rev).0, 1);
    }

    #[test]
    fn garbage_counters_reset_to_zero() {
        assert_eq!(parse_rev("not-a-rev"), (0, Some("a-rev")));
        assert_eq!(parse_rev("nodash"), (0, None));
        assert_eq!(parse_rev("7-abc"), (7, Some("abc")));
        assert_eq!(parse_rev("2-"), (2, None));
    }

    #[test]
    fn tokens_use_the_lowercase_alphabet() {
        let token = generate_token(64);
        assert!(token
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
    }

    #[test]
    fn assign_revision_reads_marker_and_previous_rev() {
        let mut object = json!({"type": "task", "id": "a", "_rev": "1-first0000"})
            .as_object()
            .unwrap()
            .clone();
        assign_revision(&mut object);

        let rev = object["_rev"].as_str().unwrap();
        assert!(rev.starts_with("2-"));
        let revisions = object["_revisions"].as_object().unwrap();
        assert_eq!(revisions["start"], json!(2));
        assert_eq!(revisions["ids"].as_array().unwrap().len(), 2);
        assert_eq!(revisions["ids"][1], json!("first0000"));

        let mut local = json!({"type": "task", "id": "b", "_$local": true})
            .as_object()
            .unwrap()
            .clone();
        assign_revision(&mut local);
        assert!(local["_rev"].as_str().unwrap().ends_with("-local"));
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Property-based tests for the codec and revision formats.

use proptest::prelude::*;
use serde_json::json;

use remote_sync::revision::generate_token;
use remote_sync::{next_revision, parse_rev, DocumentCodec};

proptest! {
    /// Encoding then decoding any well-formed object gives it back,
    /// whatever the prefix and however many slashes the id contains.
    #[test]
    fn codec_round_trip(
        prefix in "[a-z/]{0,5}",
        object_type in "[a-z]{1,8}",
        id in "[a-z0-9/]{1,12}",
        title in "[a-zA-Z0-9 ]{0,16}",
    ) {
        let codec = DocumentCodec::new(prefix);
        let mut object = serde_json::Map::new();
        object.insert("type".to_string(), json!(object_type));
        object.insert("id".to_string(), json!(id));
        object.insert("title".to_string(), json!(title));

        let encoded = codec.to_remote(&object).unwrap();
        prop_assert!(!encoded.contains_key("id"));
        let decoded = codec.from_remote(encoded).unwrap();
        prop_assert_eq!(decoded, object);
    }

    /// Every encoded id passes the codec's own prefix filter.
    #[test]
    fn encoded_ids_match_their_prefix(
        prefix in "[a-z/]{0,5}",
        object_type in "[a-z]{1,8}",
        id in "[a-z0-9]{1,8}",
    ) {
        let codec = DocumentCodec::new(prefix);
        prop_assert!(codec.matches_prefix(&codec.remote_id(&object_type, &id)));
    }

    /// Counters increment by exactly one per push and the ancestry
    /// always points at the replaced token.
    #[test]
    fn revision_counters_increment(pushes in 1usize..20) {
        let mut rev: Option<String> = None;
        for i in 1..=pushes as u64 {
            let (next, ancestry) = next_revision(rev.as_deref(), false);
            let (counter, token) = parse_rev(&next);

            prop_assert_eq!(counter, i);
            prop_assert_eq!(ancestry.start, i);
            prop_assert_eq!(ancestry.ids[0].as_str(), token.unwrap());

            match &rev {
                Some(prev) => {
                    let (_, prev_token) = parse_rev(prev);
                    prop_assert_eq!(ancestry.ids.len(), 2);
                    prop_assert_eq!(ancestry.ids[1].as_str(), prev_token.unwrap());
                }
                None => prop_assert_eq!(ancestry.ids.len(), 1),
            }
            rev = Some(next);
        }
    }

    /// Arbitrary `_rev` strings never panic the parser; garbage
    /// degrades to counter 0.
    #[test]
    fn parse_rev_never_panics(rev in ".{0,32}") {
        let (_counter, token) = parse_rev(&rev);
        if let Some(token) = token {
            prop_assert!(!token.is_empty());
        }
    }

    /// Tokens only ever use the lowercase alphanumeric alphabet.
    #[test]
    fn tokens_stay_in_the_alphabet(len in 0usize..64) {
        let token = generate_token(len);
        prop_assert_eq!(token.len(), len);
        prop_assert!(token.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
    }

    /// Local-only writes always get the `-local` token suffix, whatever
    /// revision they follow.
    #[test]
    fn local_writes_suffix_the_token(
        prev in proptest::option::of("[1-9][0-9]{0,3}-[a-z0-9]{9}"),
    ) {
        let (rev, ancestry) = next_revision(prev.as_deref(), true);
        prop_assert!(rev.ends_with("-local"));
        prop_assert!(ancestry.ids[0].ends_with("-local"));
    }
}

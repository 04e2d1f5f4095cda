// Copyright 2022 Oxide Computer Company

//! Pattern parsing and insertion (C5): turns a pattern body into a hash
//! sequence and walks it into the trie, one edge per concrete token and
//! one skip-edge per `$skipN` placeholder.

use crate::diagnostics;
use crate::ignore::IgnoredTokens;
use crate::limits::MAX_SKIP;
use crate::token::{tokenize, Token};
use crate::trie::{Trie, TrieNodeId};

/// One entry of a parsed pattern body: either a concrete token hash to
/// match exactly, or a `$skipN` placeholder allowing up to `N` arbitrary
/// tokens in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternToken {
    Concrete(u64),
    Skip(u8),
}

/// Tokenizes a pattern body (`line == 0`, so `$skipN` is recognized) and
/// strips any leading or trailing skip markers: a pattern must begin and
/// end on a concrete token so the matcher has something to anchor on.
/// Patterns consisting entirely of skip markers parse to an empty
/// sequence, which [`PatternIndex::add`] refuses.
pub fn pattern_parse(ignored: &IgnoredTokens, text: &str) -> Vec<PatternToken> {
    let mut buf = text.as_bytes().to_vec();
    let mut tokens: Vec<Token> = Vec::new();
    tokenize(&mut tokens, ignored, &mut buf, 0);

    let mut start = 0;
    let mut end = tokens.len();
    while start < end && tokens[start].hash.is_skip() {
        start += 1;
    }
    while end > start && tokens[end - 1].hash.is_skip() {
        end -= 1;
    }

    tokens[start..end]
        .iter()
        .map(|t| {
            if t.hash.is_skip() {
                PatternToken::Skip(t.hash.value() as u8)
            } else {
                PatternToken::Concrete(t.hash.value())
            }
        })
        .collect()
}

/// The prefix trie of every pattern inserted so far, plus the bookkeeping
/// the matcher needs: the longest pattern (by entry count — a `$skipN`
/// counts as one entry regardless of `N`) seen so far, used to size the
/// scan window. A pattern with few entries but a large `N` can still span
/// far more input tokens than `longest_pattern` suggests; this mirrors
/// the original's own bound and is a known, accepted imprecision rather
/// than something this port corrects.
pub struct PatternIndex {
    trie: Trie,
    longest_pattern: usize,
}

impl PatternIndex {
    pub fn new() -> Self {
        PatternIndex {
            trie: Trie::new(),
            longest_pattern: 0,
        }
    }

    pub fn trie(&self) -> &Trie {
        &self.trie
    }

    /// Rebuilds a `PatternIndex` from an already-deserialized trie, used
    /// by `pattern_load` (C7).
    pub(crate) fn from_parts(trie: Trie, longest_pattern: usize) -> Self {
        PatternIndex { trie, longest_pattern }
    }

    pub fn longest_pattern(&self) -> usize {
        self.longest_pattern
    }

    /// Inserts a parsed pattern under `id`, returning `true` if this was a
    /// new path through the trie and `false` if it exactly duplicated an
    /// existing pattern (in which case the previous id is overwritten and
    /// a diagnostic is printed, matching the original's silent-overwrite
    /// behavior except for the added stderr note).
    pub fn add(&mut self, id: u32, entries: &[PatternToken]) -> bool {
        if entries.is_empty() {
            diagnostics::warn(format!(
                "pattern {} is empty after stripping skip markers, ignored",
                id
            ));
            return false;
        }

        self.longest_pattern = self.longest_pattern.max(entries.len());

        let mut node = self.trie.root();
        for entry in entries {
            node = match *entry {
                PatternToken::Concrete(hash) => {
                    debug_assert!(hash > MAX_SKIP as u64);
                    self.trie.child_or_insert(node, hash)
                }
                PatternToken::Skip(n) => self.trie.skip_child_or_insert(node, n),
            };
        }

        match self.trie.set_pattern_id(node, id) {
            Some(previous) if previous != id => {
                diagnostics::report_overwrite(id, previous);
                false
            }
            Some(_) => false,
            None => true,
        }
    }

    pub fn root(&self) -> TrieNodeId {
        self.trie.root()
    }
}

impl Default for PatternIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_and_trailing_skips_are_stripped() {
        let ignored = IgnoredTokens::new();
        let entries = pattern_parse(&ignored, "$skip5 copyright notice $skip3");
        assert_eq!(entries.len(), 1);
        assert!(matches!(entries[0], PatternToken::Concrete(_)));
    }

    #[test]
    fn interior_skip_is_kept() {
        let ignored = IgnoredTokens::new();
        let entries = pattern_parse(&ignored, "copyright $skip10 reserved");
        assert_eq!(entries.len(), 3);
        assert!(matches!(entries[1], PatternToken::Skip(10)));
    }

    #[test]
    fn all_skip_pattern_is_empty_after_strip() {
        let ignored = IgnoredTokens::new();
        let entries = pattern_parse(&ignored, "$skip5 $skip3");
        assert!(entries.is_empty());
    }

    #[test]
    fn add_rejects_empty_pattern() {
        let mut idx = PatternIndex::new();
        assert!(!idx.add(1, &[]));
        assert_eq!(idx.longest_pattern(), 0);
    }

    #[test]
    fn add_tracks_longest_entry_count() {
        let mut idx = PatternIndex::new();
        idx.add(1, &[PatternToken::Concrete(100)]);
        idx.add(
            2,
            &[
                PatternToken::Concrete(200),
                PatternToken::Skip(20),
                PatternToken::Concrete(300),
            ],
        );
        assert_eq!(idx.longest_pattern(), 3);
    }

    #[test]
    fn duplicate_path_overwrites_pattern_id() {
        let mut idx = PatternIndex::new();
        let entries = [PatternToken::Concrete(42)];
        assert!(idx.add(1, &entries));
        assert!(!idx.add(2, &entries));
        let node = idx
            .trie()
            .child(idx.root(), 42)
            .expect("child exists");
        assert_eq!(idx.trie().pattern_id(node), Some(2));
    }

    #[test]
    fn distinct_patterns_produce_distinct_nodes() {
        let mut idx = PatternIndex::new();
        idx.add(1, &[PatternToken::Concrete(1)]);
        idx.add(2, &[PatternToken::Concrete(2)]);
        let n1 = idx.trie().child(idx.root(), 1).unwrap();
        let n2 = idx.trie().child(idx.root(), 2).unwrap();
        assert_ne!(n1, n2);
    }
}

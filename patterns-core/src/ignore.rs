// Copyright 2022 Oxide Computer Company

//! The ignored-token set (C3): a fixed list of punctuation-only tokens
//! (comment leaders, separators, fence markers) dropped by the tokenizer
//! before they ever reach a pattern or a scan. Stored in the same AA-tree
//! the pattern trie uses for ordered children, since both are small
//! in-memory sets keyed by a hash with no need for a `HashMap`'s randomized
//! iteration order (spec §4.2).

use crate::hash::hash64;
use crate::trie::AaTree;

/// Text of every token the tokenizer drops outright.
const IGNORED_TOKEN_TEXT: &[&str] = &[
    "/", "//", "%", "%%", "dnl", "#~", ";;", "\"\"", "--", "#:", "\\", ">", "==", "::", "##",
];

pub struct IgnoredTokens {
    hashes: AaTree,
}

impl IgnoredTokens {
    pub fn new() -> Self {
        let mut hashes = AaTree::new();
        for text in IGNORED_TOKEN_TEXT {
            hashes.insert(hash64(text.as_bytes(), 1));
        }
        IgnoredTokens { hashes }
    }

    /// Cheap pre-hash check: is `text` one of the known ignored spellings?
    /// Lets the tokenizer skip hashing a token it is about to drop anyway.
    pub fn contains_text(&self, text: &[u8]) -> bool {
        IGNORED_TOKEN_TEXT.iter().any(|t| t.as_bytes() == text)
    }

    /// Post-hash check, the authoritative membership test.
    pub fn contains_hash(&self, hash: u64) -> bool {
        self.hashes.contains(hash)
    }
}

impl Default for IgnoredTokens {
    fn default() -> Self {
        Self::new()
    }
}

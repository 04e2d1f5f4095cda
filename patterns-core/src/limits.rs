// Copyright 2022 Oxide Computer Company

// Compiled-in algorithmic bounds. Not deployment configuration: these mirror
// the original C implementation's `char line[MAX_LINE_SIZE]` stack buffer and
// its `MAX_TOKEN_LENGTH` guard on token text, so a Rust file scan and the
// original fgets-driven one truncate at the same points.

/// Maximum number of bytes read for a single line before it is truncated.
pub const MAX_LINE_SIZE: usize = 8000;

/// Maximum number of bytes of token text kept before hashing; longer tokens
/// are truncated to this length first so two tokens that agree on their
/// first `MAX_TOKEN_LENGTH` bytes always hash identically.
pub const MAX_TOKEN_LENGTH: usize = 100;

/// Token hashes at or below this value are reserved as `$skipN` markers.
/// Every concrete token hash produced by the tokenizer must exceed it.
pub const MAX_SKIP: u8 = 99;

/// When the pending token vector for a file scan grows beyond
/// `SCAN_WINDOW_FACTOR * longest_pattern` tokens, the oldest tokens are
/// drained as scan starts and dropped from memory (see `matcher::find_matches`).
pub const SCAN_WINDOW_FACTOR: usize = 100;

//! Core license/boilerplate pattern matching: tokenizer, prefix trie,
//! matching engine, and binary index serialization.

pub mod diagnostics;
pub mod error;
pub mod hash;
pub mod ignore;
pub mod limits;
pub mod matcher;
pub mod pattern;
pub mod serialize;
pub mod token;
pub mod trie;

pub use error::{Error, Result};
pub use ignore::IgnoredTokens;
pub use matcher::{pattern_distance, pattern_normalize, pattern_read_lines, Match, Matcher};
pub use pattern::{pattern_parse, PatternIndex, PatternToken};
pub use token::{Token, TokenHash};

// Copyright 2022 Oxide Computer Company

//! The tokenizer (C2): splits raw bytes into a lower-cased, hashed token
//! stream, folding in the ignored-token set (C3) and the `$skipN`
//! placeholder syntax used when parsing pattern bodies.

use crate::ignore::IgnoredTokens;
use crate::limits::{MAX_SKIP, MAX_TOKEN_LENGTH};

/// A 64-bit token hash. Values `<= MAX_SKIP` are reserved skip markers;
/// every hash produced for real token text must exceed it (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenHash(pub u64);

impl TokenHash {
    #[inline]
    pub fn is_skip(&self) -> bool {
        self.0 <= MAX_SKIP as u64
    }

    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TokenHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One token: the line it came from, its hash, and (only when debug/display
/// output needs it) its literal text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub line: u32,
    pub hash: TokenHash,
    pub text: Option<Box<str>>,
}

/// Bytes that terminate the current token and are themselves discarded.
const IGNORE_SEPARATORS: &[u8] = b" \r\n\t*;,:!#{}()[]|><";

/// Bytes that terminate the current token AND are emitted as their own
/// one-byte token (so a pattern can insist on a literal `=`, for instance).
const SINGLE_SEPARATORS: &[u8] = b"-.+?\"'`=";

fn is_ignore_separator(b: u8) -> bool {
    IGNORE_SEPARATORS.contains(&b)
}

fn is_single_separator(b: u8) -> bool {
    SINGLE_SEPARATORS.contains(&b)
}

/// Append one `Token` for `raw` (already separator-delimited) to `out`,
/// applying the trailing-dot peel, the ignored-token filter, and the
/// `$skipN` placeholder recognition (only active when `line == 0`, i.e.
/// while parsing a pattern body rather than scanning a file).
fn add_token(out: &mut Vec<Token>, ignored: &IgnoredTokens, raw: &[u8], line: u32, keep_text: bool) {
    if raw.is_empty() {
        return;
    }

    let mut text = raw;
    if text.len() > MAX_TOKEN_LENGTH {
        text = &text[..MAX_TOKEN_LENGTH];
    }
    if text.last() == Some(&b'.') {
        text = &text[..text.len() - 1];
    }
    if text.is_empty() {
        return;
    }

    if line == 0 {
        if let Some(n) = parse_skip(text) {
            out.push(Token {
                line,
                hash: TokenHash(n as u64),
                text: keep_text.then(|| text_to_box(text)),
            });
            return;
        }
    }

    if ignored.contains_text(text) {
        return;
    }

    let hash = crate::hash::hash64(text, 1);
    assert!(
        hash > MAX_SKIP as u64,
        "token hash {} collides with the skip-marker range",
        hash
    );
    if ignored.contains_hash(hash) {
        return;
    }

    out.push(Token {
        line,
        hash: TokenHash(hash),
        text: keep_text.then(|| text_to_box(text)),
    });
}

fn text_to_box(text: &[u8]) -> Box<str> {
    String::from_utf8_lossy(text).into_owned().into_boxed_str()
}

/// Parses a `$skipN` placeholder (1-3 decimal digits, `N <= MAX_SKIP`).
/// Any other `$skip*` suffix (non-numeric, or out of range) is not a
/// placeholder and falls through to ordinary hashing.
fn parse_skip(text: &[u8]) -> Option<u8> {
    let rest = text.strip_prefix(b"$skip")?;
    if rest.is_empty() || rest.len() > 3 {
        return None;
    }
    if !rest.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let n: u32 = std::str::from_utf8(rest).ok()?.parse().ok()?;
    if n > MAX_SKIP as u32 {
        return None;
    }
    Some(n as u8)
}

/// Tokenizes `buf` in place (control bytes become spaces, letters are
/// lower-cased) appending one `Token` per extracted word to `out`.
/// `line == 0` means "this is a pattern body", enabling `$skipN`
/// recognition; any other value is a 1-based source line number.
pub fn tokenize(out: &mut Vec<Token>, ignored: &IgnoredTokens, buf: &mut [u8], line: u32) {
    tokenize_inner(out, ignored, buf, line, true)
}

/// Like [`tokenize`] but does not retain token text, for the hot scanning
/// path where only the hash is needed.
pub fn tokenize_hashes_only(
    out: &mut Vec<Token>,
    ignored: &IgnoredTokens,
    buf: &mut [u8],
    line: u32,
) {
    tokenize_inner(out, ignored, buf, line, false)
}

fn tokenize_inner(
    out: &mut Vec<Token>,
    ignored: &IgnoredTokens,
    buf: &mut [u8],
    line: u32,
    keep_text: bool,
) {
    for b in buf.iter_mut() {
        if *b < 0x20 {
            *b = b' ';
        }
        *b = b.to_ascii_lowercase();
    }

    let mut start = 0usize;
    for i in 0..buf.len() {
        let b = buf[i];
        let ignore = is_ignore_separator(b);
        let single = is_single_separator(b);
        if ignore || single {
            add_token(out, ignored, &buf[start..i], line, keep_text);
            if !ignore {
                add_token(out, ignored, &buf[i..i + 1], line, keep_text);
            }
            start = i + 1;
        }
    }
    add_token(out, ignored, &buf[start..], line, keep_text);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str, line: u32) -> Vec<Token> {
        let ignored = IgnoredTokens::new();
        let mut buf = s.as_bytes().to_vec();
        let mut out = Vec::new();
        tokenize(&mut out, &ignored, &mut buf, line);
        out
    }

    #[test]
    fn deterministic() {
        assert_eq!(toks("Copyright (c) 2020", 1), toks("Copyright (c) 2020", 1));
    }

    #[test]
    fn lowercases() {
        let t = toks("HELLO World", 1);
        assert_eq!(t[0].text.as_deref(), Some("hello"));
        assert_eq!(t[1].text.as_deref(), Some("world"));
    }

    #[test]
    fn drops_ignore_separators() {
        let t = toks("a, b; c: d!", 1);
        let words: Vec<_> = t.iter().map(|t| t.text.as_deref().unwrap()).collect();
        assert_eq!(words, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn keeps_single_separators_as_tokens() {
        let t = toks("key=value", 1);
        let words: Vec<_> = t.iter().map(|t| t.text.as_deref().unwrap()).collect();
        assert_eq!(words, vec!["key", "=", "value"]);
    }

    #[test]
    fn skip_placeholder_only_recognized_for_patterns() {
        let pattern = toks("a $skip5 b", 0);
        assert!(pattern[1].hash.is_skip());
        assert_eq!(pattern[1].hash.value(), 5);

        let file = toks("a $skip5 b", 1);
        assert!(!file[1].hash.is_skip());
    }

    #[test]
    fn non_numeric_skip_suffix_falls_through() {
        let t = toks("$skipfoo", 0);
        assert!(!t[0].hash.is_skip());
    }

    #[test]
    fn hashes_exceed_max_skip() {
        for t in toks("copyright free software foundation", 1) {
            assert!(t.hash.value() > crate::limits::MAX_SKIP as u64);
        }
    }

    #[test]
    fn ignored_tokens_are_dropped() {
        let t = toks("// copyright", 1);
        let words: Vec<_> = t.iter().map(|t| t.text.as_deref().unwrap()).collect();
        assert_eq!(words, vec!["copyright"]);
    }

    #[test]
    fn ignore_idempotence() {
        let first = toks("// dnl copyright notice", 1);
        let reassembled: String = first
            .iter()
            .map(|t| t.text.as_deref().unwrap())
            .collect::<Vec<_>>()
            .join(" ");
        let second = toks(&reassembled, 1);
        let a: Vec<_> = first.iter().map(|t| t.hash).collect();
        let b: Vec<_> = second.iter().map(|t| t.hash).collect();
        assert_eq!(a, b);
    }
}

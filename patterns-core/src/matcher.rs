// Copyright 2022 Oxide Computer Company

//! The matching engine (C6): scans a file's token stream against the
//! pattern trie, producing non-overlapping `(pattern_id, start_line,
//! end_line)` matches, plus the small text-utility functions that share
//! its tokenizer (`pattern_read_lines`, `pattern_normalize`,
//! `pattern_distance`).

use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::diagnostics;
use crate::ignore::IgnoredTokens;
use crate::limits::{MAX_LINE_SIZE, SCAN_WINDOW_FACTOR};
use crate::pattern::PatternIndex;
use crate::token::{tokenize, tokenize_hashes_only, Token};
use crate::trie::{Trie, TrieNodeId};

/// One reduced, non-overlapping match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub pattern_id: u32,
    pub start_line: u32,
    pub end_line: u32,
}

struct Candidate {
    /// Absolute token index (i.e. `token_offset`-adjusted), so candidates
    /// from different drained chunks compare correctly in one global
    /// overlap reduction.
    start: usize,
    end: usize,
    pattern_id: u32,
    start_line: u32,
    end_line: u32,
}

pub struct Matcher<'a> {
    index: &'a PatternIndex,
    ignored: &'a IgnoredTokens,
}

impl<'a> Matcher<'a> {
    pub fn new(index: &'a PatternIndex, ignored: &'a IgnoredTokens) -> Self {
        Matcher { index, ignored }
    }

    /// Scans `path` line by line, returning every reduced match. On any
    /// I/O failure this logs a diagnostic and returns an empty result
    /// rather than propagating, matching §7's "log and return empty"
    /// taxonomy for input errors.
    pub fn find_matches(&self, path: &Path) -> Vec<Match> {
        let file = match std::fs::File::open(path) {
            Ok(f) => f,
            Err(e) => {
                diagnostics::report_io_error(path, &e);
                return Vec::new();
            }
        };
        match self.find_matches_in(BufReader::new(file)) {
            Ok(matches) => matches,
            Err(e) => {
                diagnostics::report_io_error(path, &e);
                Vec::new()
            }
        }
    }

    /// Same as [`find_matches`](Self::find_matches) but reads from an
    /// arbitrary `BufRead`, for testing without touching the filesystem.
    ///
    /// Every chunk drained along the way (see `scan_chunk`) feeds the same
    /// `candidates` vector, keyed by an absolute token index via
    /// `token_offset`; overlap reduction runs exactly once over the whole
    /// file, matching the original's single `reduce()` pass over its `ms`
    /// vector rather than reducing each drained chunk in isolation (which
    /// would let two matches straddling a chunk boundary both survive).
    pub fn find_matches_in<R: BufRead>(&self, reader: R) -> io::Result<Vec<Match>> {
        let longest = self.index.longest_pattern().max(1);
        let window_limit = SCAN_WINDOW_FACTOR * longest;
        let retain = longest + 1;

        let mut window: Vec<Token> = Vec::new();
        let mut token_offset: usize = 0;
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut line_no: u32 = 0;

        for line in reader.lines() {
            let line = line?;
            line_no += 1;
            // Truncate on bytes, not `String::truncate`, which panics if
            // byte `MAX_LINE_SIZE` isn't a char boundary.
            let mut buf = line.into_bytes();
            buf.truncate(MAX_LINE_SIZE);
            tokenize_hashes_only(&mut window, self.ignored, &mut buf, line_no);

            if window.len() > window_limit {
                let safe_len = window.len() - retain;
                self.scan_chunk(&mut window, safe_len, token_offset, &mut candidates);
                token_offset += safe_len;
            }
        }
        let full = window.len();
        self.scan_chunk(&mut window, full, token_offset, &mut candidates);

        Ok(reduce_overlaps(candidates)
            .into_iter()
            .map(|c| Match {
                pattern_id: c.pattern_id,
                start_line: c.start_line,
                end_line: c.end_line,
            })
            .collect())
    }

    /// Walks every scan start in `window[0..safe_len)`, appending raw
    /// candidates (absolute token indices, `token_offset`-adjusted) to
    /// `out`, then drops the scanned prefix from `window`. Does not reduce
    /// overlaps itself — see [`find_matches_in`](Self::find_matches_in).
    fn scan_chunk(
        &self,
        window: &mut Vec<Token>,
        safe_len: usize,
        token_offset: usize,
        out: &mut Vec<Candidate>,
    ) {
        if safe_len == 0 {
            return;
        }

        let trie = self.index.trie();
        let n = window.len();
        for start in 0..safe_len {
            if let Some(child) = trie.child(trie.root(), window[start].hash.value()) {
                self.walk(trie, window, n, start, start + 1, token_offset, child, out);
            }
        }

        window.drain(0..safe_len);
    }

    /// Implements the walker exactly as specified: at `offset >= n` emit
    /// a terminal match if `node` carries a pattern id and stop; else try
    /// every skip-edge width before checking this node's own pattern id,
    /// then descend on the concrete token at `offset` if one exists.
    /// `start`/`offset` index into `window` (chunk-local); `token_offset`
    /// shifts a match's recorded `start`/`end` back to the absolute token
    /// index they'd have in the whole file's stream.
    #[allow(clippy::too_many_arguments)]
    fn walk(
        &self,
        trie: &Trie,
        window: &[Token],
        n: usize,
        start: usize,
        offset: usize,
        token_offset: usize,
        node: TrieNodeId,
        out: &mut Vec<Candidate>,
    ) {
        if offset >= n {
            if let Some(pid) = trie.pattern_id(node) {
                out.push(Candidate {
                    start: token_offset + start,
                    end: token_offset + offset - 1,
                    pattern_id: pid,
                    start_line: window[start].line,
                    end_line: window[offset - 1].line,
                });
            }
            return;
        }

        for (skip_len, child) in trie.skip_edges(node) {
            for i in 1..=skip_len as usize {
                let next = offset + i;
                if next <= n {
                    self.walk(trie, window, n, start, next, token_offset, child, out);
                }
            }
        }

        if let Some(pid) = trie.pattern_id(node) {
            out.push(Candidate {
                start: token_offset + start,
                end: token_offset + offset - 1,
                pattern_id: pid,
                start_line: window[start].line,
                end_line: window[offset - 1].line,
            });
        }

        if let Some(child) = trie.child(node, window[offset].hash.value()) {
            self.walk(trie, window, n, start, offset + 1, token_offset, child, out);
        }
    }
}

/// Greedy non-overlapping reduction: repeatedly take the remaining
/// candidate with the largest span (ties broken by larger pattern id),
/// then discard every other candidate overlapping its token range.
fn reduce_overlaps(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        let len_a = a.end - a.start;
        let len_b = b.end - b.start;
        len_b.cmp(&len_a).then(b.pattern_id.cmp(&a.pattern_id))
    });

    let mut chosen: Vec<Candidate> = Vec::new();
    'outer: for c in candidates {
        for s in &chosen {
            if c.start <= s.end && s.start <= c.end {
                continue 'outer;
            }
        }
        chosen.push(c);
    }
    chosen.sort_by_key(|c| c.start);
    chosen
}

/// Random-access retrieval of specific, caller-tagged line numbers from a
/// file, stopping as soon as every requested line has been read.
pub fn pattern_read_lines<T>(
    path: &Path,
    mut wanted: Vec<(u32, T)>,
) -> Vec<(u32, T, String)> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) => {
            diagnostics::report_io_error(path, &e);
            return Vec::new();
        }
    };
    let mut out = Vec::new();
    let reader = BufReader::new(file);
    let mut line_no: u32 = 0;
    for line in reader.lines() {
        if wanted.is_empty() {
            break;
        }
        line_no += 1;
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                diagnostics::report_io_error(path, &e);
                break;
            }
        };
        if let Some(pos) = wanted.iter().position(|(n, _)| *n == line_no) {
            let (_, tag) = wanted.remove(pos);
            out.push((line_no, tag, line));
        }
    }
    out
}

/// Tokenizes `text` for display/debug purposes, retaining each token's
/// text and originating line.
pub fn pattern_normalize(ignored: &IgnoredTokens, text: &str) -> Vec<(u32, String, u64)> {
    let mut buf = text.as_bytes().to_vec();
    let mut tokens = Vec::new();
    tokenize(&mut tokens, ignored, &mut buf, 1);
    tokens
        .into_iter()
        .map(|t| {
            (
                t.line,
                t.text.map(|b| b.to_string()).unwrap_or_default(),
                t.hash.value(),
            )
        })
        .collect()
}

/// Classic two-row (space-optimized) Levenshtein distance between two
/// hash sequences. Insert, delete, and substitute all cost 1.
pub fn pattern_distance(a: &[u64], b: &[u64]) -> usize {
    let (a, b) = if a.len() < b.len() { (b, a) } else { (a, b) };
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0usize; b.len() + 1];

    for i in 1..=a.len() {
        cur[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            cur[j] = (prev[j] + 1).min(cur[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{pattern_parse, PatternIndex};
    use std::io::Cursor;

    fn build_index(ignored: &IgnoredTokens, patterns: &[(u32, &str)]) -> PatternIndex {
        let mut idx = PatternIndex::new();
        for (id, text) in patterns {
            let entries = pattern_parse(ignored, text);
            idx.add(*id, &entries);
        }
        idx
    }

    #[test]
    fn exact_match_found() {
        let ignored = IgnoredTokens::new();
        let idx = build_index(&ignored, &[(1, "all rights reserved")]);
        let matcher = Matcher::new(&idx, &ignored);
        let text = "this file has all rights reserved here\n";
        let matches = matcher
            .find_matches_in(Cursor::new(text))
            .expect("scan succeeds");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].pattern_id, 1);
    }

    #[test]
    fn skip_pattern_matches_with_arbitrary_gap() {
        let ignored = IgnoredTokens::new();
        let idx = build_index(&ignored, &[(1, "copyright $skip5 reserved")]);
        let matcher = Matcher::new(&idx, &ignored);
        let text = "copyright 2020 acme corporation all rights reserved\n";
        let matches = matcher
            .find_matches_in(Cursor::new(text))
            .expect("scan succeeds");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].pattern_id, 1);
    }

    #[test]
    fn overlap_reduction_is_global_across_drained_chunks() {
        // "a b" and "b c" share token "b". Pad the line with enough filler
        // tokens that the pending window exceeds the scan limit exactly
        // while "a" is the last scanned anchor and "b"/"c" fall in the
        // retained tail, so "a b" is found in the drain triggered mid-line
        // and "b c" is only found once that retained tail is rescanned in
        // the final pass. A correct implementation reduces overlaps once
        // over both chunks, keeping exactly one of the two.
        let ignored = IgnoredTokens::new();
        let idx = build_index(&ignored, &[(1, "a b"), (2, "b c")]);
        let matcher = Matcher::new(&idx, &ignored);

        let mut words: Vec<String> = (0..197).map(|i| format!("w{i}")).collect();
        words.push("a".to_string());
        words.push("b".to_string());
        words.push("c".to_string());
        words.push("w197".to_string());
        let text = format!("{}\n", words.join(" "));

        let matches = matcher
            .find_matches_in(Cursor::new(text))
            .expect("scan succeeds");

        assert_eq!(matches.len(), 1, "overlapping matches across a chunk boundary must reduce to one: {:?}", matches);
        assert_eq!(matches[0].pattern_id, 2);
    }

    #[test]
    fn long_line_with_multibyte_char_at_truncation_boundary_does_not_panic() {
        let ignored = IgnoredTokens::new();
        let idx = build_index(&ignored, &[(1, "all rights reserved")]);
        let matcher = Matcher::new(&idx, &ignored);

        // Byte 8000 lands on the second (continuation) byte of this 'é',
        // which is not a char boundary; `String::truncate` would panic
        // here, so the scan must truncate at the byte level instead.
        let mut line = "a".repeat(7999);
        line.push('é');
        line.push_str(" rest of line\n");

        let result = matcher.find_matches_in(Cursor::new(line));
        assert!(result.is_ok());
    }

    #[test]
    fn no_match_when_absent() {
        let ignored = IgnoredTokens::new();
        let idx = build_index(&ignored, &[(1, "all rights reserved")]);
        let matcher = Matcher::new(&idx, &ignored);
        let matches = matcher
            .find_matches_in(Cursor::new("nothing interesting here\n"))
            .expect("scan succeeds");
        assert!(matches.is_empty());
    }

    #[test]
    fn longer_overlapping_pattern_wins() {
        let ignored = IgnoredTokens::new();
        let idx = build_index(
            &ignored,
            &[(1, "all rights reserved"), (2, "all rights reserved worldwide")],
        );
        let matcher = Matcher::new(&idx, &ignored);
        let matches = matcher
            .find_matches_in(Cursor::new("all rights reserved worldwide\n"))
            .expect("scan succeeds");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].pattern_id, 2);
    }

    #[test]
    fn tie_broken_by_larger_pattern_id() {
        let ignored = IgnoredTokens::new();
        let idx = build_index(&ignored, &[(5, "all rights reserved"), (9, "all rights reserved")]);
        let matcher = Matcher::new(&idx, &ignored);
        let matches = matcher
            .find_matches_in(Cursor::new("all rights reserved\n"))
            .expect("scan succeeds");
        assert_eq!(matches[0].pattern_id, 9);
    }

    #[test]
    fn levenshtein_identity_and_symmetry() {
        let a = [1u64, 2, 3];
        let b = [1u64, 9, 3, 4];
        assert_eq!(pattern_distance(&a, &a), 0);
        assert_eq!(pattern_distance(&a, &b), pattern_distance(&b, &a));
    }

    #[test]
    fn levenshtein_triangle_inequality() {
        let a = [1u64, 2, 3, 4];
        let b = [1u64, 5, 3, 4];
        let c = [9u64, 5, 3, 6];
        assert!(pattern_distance(&a, &c) <= pattern_distance(&a, &b) + pattern_distance(&b, &c));
    }

    #[test]
    fn read_lines_stops_once_all_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.txt");
        std::fs::write(&path, "one\ntwo\nthree\nfour\n").unwrap();
        let got = pattern_read_lines(&path, vec![(2, "b"), (4, "d")]);
        assert_eq!(got, vec![(2, "b", "two".to_string()), (4, "d", "four".to_string())]);
    }

    #[test]
    fn normalize_retains_text_and_line() {
        let ignored = IgnoredTokens::new();
        let out = pattern_normalize(&ignored, "Hello World");
        assert_eq!(out[0].1, "hello");
        assert_eq!(out[1].1, "world");
        assert_eq!(out[0].0, 1);
    }
}

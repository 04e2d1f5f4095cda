//! Bag-of-patterns (C8): a TF-IDF cosine top-k retriever over the same
//! tokenization `patterns-core` uses, offered as a "nearest patterns"
//! suggestor for text that didn't match any pattern exactly.

use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::path::Path;

use patterns_core::ignore::IgnoredTokens;
use patterns_core::token::tokenize;
use patterns_core::{Error, Result};

/// One pattern's TF-IDF vector, sorted by hash ascending so dump/load is
/// deterministic and a dot product can be computed with a linear merge.
struct PatternVector {
    id: u32,
    values: Vec<(u64, f64)>,
    norm: f64,
}

/// A scored suggestion returned by [`BagOfPatterns::best_for`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Suggestion {
    pub pattern_id: u32,
    /// The raw, asymmetric cosine-like score: `(q . v_p) / ||v_p||`. The
    /// query vector is intentionally left unnormalized here — see
    /// [`Suggestion::display_score`].
    pub score: f64,
    /// `round(score * 10000 / ||q||) / 10000`, the normalized figure
    /// meant for display. Divides by the query norm rather than by the
    /// product of both norms; this matches the original's own asymmetric
    /// scoring rather than a textbook cosine similarity.
    pub display_score: f64,
}

pub struct BagOfPatterns {
    ignored: IgnoredTokens,
    idf: BTreeMap<u64, f64>,
    patterns: Vec<PatternVector>,
}

impl BagOfPatterns {
    pub fn new() -> Self {
        BagOfPatterns {
            ignored: IgnoredTokens::new(),
            idf: BTreeMap::new(),
            patterns: Vec::new(),
        }
    }

    /// (Re)builds the whole TF-IDF model from scratch over `patterns`.
    pub fn set_patterns(&mut self, patterns: &[(u32, &str)]) {
        let term_freqs: Vec<(u32, BTreeMap<u64, f64>)> = patterns
            .iter()
            .map(|(id, text)| (*id, term_frequencies(&self.ignored, text)))
            .collect();

        let n = term_freqs.len() as f64;
        let mut df: BTreeMap<u64, u32> = BTreeMap::new();
        for (_, tf) in &term_freqs {
            for h in tf.keys() {
                *df.entry(*h).or_insert(0) += 1;
            }
        }

        self.idf = df
            .into_iter()
            .map(|(h, count)| (h, (n / count as f64).ln()))
            .collect();

        self.patterns = term_freqs
            .into_iter()
            .map(|(id, tf)| {
                let values: Vec<(u64, f64)> = tf
                    .into_iter()
                    .map(|(h, count)| (h, count * self.idf[&h]))
                    .collect();
                let norm = values.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
                PatternVector { id, values, norm }
            })
            .collect();
    }

    /// Scores every pattern against `text` and returns the top `count` by
    /// score, highest first.
    pub fn best_for(&self, text: &str, count: usize) -> Vec<Suggestion> {
        let mut buf = text.as_bytes().to_vec();
        let mut tokens = Vec::new();
        tokenize(&mut tokens, &self.ignored, &mut buf, 1);

        let mut query_tf: BTreeMap<u64, f64> = BTreeMap::new();
        for t in &tokens {
            *query_tf.entry(t.hash.value()).or_insert(0.0) += 1.0;
        }

        let query: BTreeMap<u64, f64> = query_tf
            .into_iter()
            .filter_map(|(h, tf)| self.idf.get(&h).map(|idf| (h, tf * idf)))
            .collect();
        let query_norm = query.values().map(|v| v * v).sum::<f64>().sqrt();

        let mut scored: Vec<Suggestion> = self
            .patterns
            .iter()
            .map(|p| {
                let dot = dot_product(&query, &p.values);
                let score = if p.norm > 0.0 { dot / p.norm } else { 0.0 };
                let display_score = if query_norm > 0.0 {
                    (score * 10000.0 / query_norm).round() / 10000.0
                } else {
                    0.0
                };
                Suggestion {
                    pattern_id: p.id,
                    score,
                    display_score,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.pattern_id.cmp(&b.pattern_id))
        });
        scored.truncate(count);
        scored
    }

    pub fn dump(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut w = BufWriter::new(file);
        write_all(&mut w, path, &(self.idf.len() as u64).to_le_bytes())?;
        for (h, idf) in &self.idf {
            write_all(&mut w, path, &h.to_le_bytes())?;
            write_all(&mut w, path, &idf.to_le_bytes())?;
        }

        write_all(&mut w, path, &(self.patterns.len() as u64).to_le_bytes())?;
        for p in &self.patterns {
            write_all(&mut w, path, &(p.id as u64).to_le_bytes())?;
            write_all(&mut w, path, &p.norm.to_le_bytes())?;
            write_all(&mut w, path, &(p.values.len() as u64).to_le_bytes())?;
            for (h, v) in &p.values {
                write_all(&mut w, path, &h.to_le_bytes())?;
                write_all(&mut w, path, &v.to_le_bytes())?;
            }
        }
        w.flush().map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        // SAFETY: read-only, same rationale as patterns-core's index loader.
        let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut r = Reader::new(&mmap);
        let idf_count = r.read_u64()?;
        let mut idf = BTreeMap::new();
        for _ in 0..idf_count {
            let h = r.read_u64()?;
            let v = r.read_f64()?;
            idf.insert(h, v);
        }

        let pattern_count = r.read_u64()?;
        let mut patterns = Vec::with_capacity(pattern_count as usize);
        for _ in 0..pattern_count {
            let id = r.read_u64()?;
            if id > u32::MAX as u64 {
                return Err(Error::CorruptIndex("pattern id out of range".into()));
            }
            let norm = r.read_f64()?;
            let value_count = r.read_u64()?;
            let mut values = Vec::with_capacity(value_count as usize);
            for _ in 0..value_count {
                let h = r.read_u64()?;
                let v = r.read_f64()?;
                values.push((h, v));
            }
            patterns.push(PatternVector {
                id: id as u32,
                values,
                norm,
            });
        }

        Ok(BagOfPatterns {
            ignored: IgnoredTokens::new(),
            idf,
            patterns,
        })
    }
}

impl Default for BagOfPatterns {
    fn default() -> Self {
        Self::new()
    }
}

/// Term frequency per unique hash, after collapsing adjacent equal
/// hashes so long glyph runs (`======`) don't dominate the vector.
fn term_frequencies(ignored: &IgnoredTokens, text: &str) -> BTreeMap<u64, f64> {
    let mut buf = text.as_bytes().to_vec();
    let mut tokens = Vec::new();
    tokenize(&mut tokens, ignored, &mut buf, 1);

    let mut tf = BTreeMap::new();
    let mut previous: Option<u64> = None;
    for t in tokens {
        let hash = t.hash.value();
        if previous == Some(hash) {
            continue;
        }
        previous = Some(hash);
        *tf.entry(hash).or_insert(0.0) += 1.0;
    }
    tf
}

fn dot_product(query: &BTreeMap<u64, f64>, pattern: &[(u64, f64)]) -> f64 {
    pattern
        .iter()
        .filter_map(|(h, v)| query.get(h).map(|q| q * v))
        .sum()
}

fn write_all(w: &mut impl Write, path: &Path, bytes: &[u8]) -> Result<()> {
    w.write_all(bytes).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.bytes.len() - self.pos < n {
            return Err(Error::CorruptIndex("unexpected end of file".into()));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_pattern_scores_highest() {
        let mut bag = BagOfPatterns::new();
        bag.set_patterns(&[
            (1, "permission is hereby granted free of charge"),
            (2, "all rights reserved worldwide"),
            (3, "distributed under the apache license"),
        ]);

        let top = bag.best_for("permission is hereby granted, free of charge", 1);
        assert_eq!(top[0].pattern_id, 1);
    }

    #[test]
    fn scores_are_non_increasing() {
        let mut bag = BagOfPatterns::new();
        bag.set_patterns(&[
            (1, "permission is hereby granted"),
            (2, "all rights reserved"),
            (3, "distributed under the apache license version two"),
        ]);
        let top = bag.best_for("permission granted under the apache license", 3);
        for pair in top.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn glyph_run_does_not_dominate_vector() {
        let mut bag = BagOfPatterns::new();
        bag.set_patterns(&[
            (1, "===================== license ====================="),
            (2, "permission is hereby granted"),
        ]);
        // The collapsed run contributes one term, not dozens; a query
        // about permissions should still prefer pattern 2.
        let top = bag.best_for("hereby granted permission to use", 2);
        assert_eq!(top[0].pattern_id, 2);
    }

    #[test]
    fn round_trips_through_disk() {
        let mut bag = BagOfPatterns::new();
        bag.set_patterns(&[
            (1, "permission is hereby granted"),
            (2, "all rights reserved worldwide"),
        ]);
        let before = bag.best_for("permission hereby granted", 2);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bag.bin");
        bag.dump(&path).expect("dump succeeds");
        let loaded = BagOfPatterns::load(&path).expect("load succeeds");
        let after = loaded.best_for("permission hereby granted", 2);

        assert_eq!(before, after);
    }

    #[test]
    fn rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.bin");
        std::fs::write(&path, 3u64.to_le_bytes()).unwrap();
        assert!(matches!(
            BagOfPatterns::load(&path),
            Err(Error::CorruptIndex(_))
        ));
    }
}

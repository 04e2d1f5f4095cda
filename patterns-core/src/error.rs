// Copyright 2022 Oxide Computer Company

use std::path::PathBuf;

/// The single error type returned by fallible public operations.
///
/// Per the taxonomy this crate follows (missing file, corrupt on-disk
/// index), these are the *recoverable* faults: callers log them and carry
/// on with an empty result, they never unwind past `patterns-core`'s own
/// API. Invariant violations (a token hash colliding with the skip-marker
/// range) are not represented here — they `panic!` at the point of
/// discovery, same as the original's `assert()`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("hash collision with skip marker: {hash}")]
    HashCollisionWithSkipMarker { hash: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;

// Copyright 2022 Oxide Computer Company

//! Binary index serialization (C7): a deterministic, little-endian,
//! pointer-free dump of a [`PatternIndex`]'s trie, loadable by a single
//! `mmap` plus one linear validating pass.

use std::io::{BufWriter, Write};
use std::path::Path;

use memmap2::Mmap;

use crate::error::{Error, Result};
use crate::pattern::PatternIndex;
use crate::trie::Trie;

/// Written before the versioned body so a loader can reject a file that
/// is truncated, corrupt, or simply not one of ours (§4.6.1).
const MAGIC: &[u8; 8] = b"PATTNV02";

pub fn dump(index: &PatternIndex, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut w = BufWriter::new(file);
    write_all(&mut w, path, MAGIC)?;
    write_all(&mut w, path, &(index.longest_pattern() as i64).to_le_bytes())?;

    let trie = index.trie();
    write_all(&mut w, path, &trie.tree_count().to_le_bytes())?;
    write_all(&mut w, path, &trie.node_count().to_le_bytes())?;

    for i in 1..trie.tree_count() {
        let (pid, skips, root_node_index) = trie.tree_raw(i);
        write_all(&mut w, path, &pid.to_le_bytes())?;
        write_all(&mut w, path, &(skips.len() as u8).to_le_bytes())?;
        for (n, child) in skips {
            write_all(&mut w, path, &n.to_le_bytes())?;
            write_all(&mut w, path, &child.0.to_le_bytes())?;
        }
        write_all(&mut w, path, &root_node_index.to_le_bytes())?;
    }

    for i in 1..trie.node_count() {
        let (element, left, right, level, next_tree_index) = trie.cell_raw(i);
        write_all(&mut w, path, &element.to_le_bytes())?;
        write_all(&mut w, path, &left.to_le_bytes())?;
        write_all(&mut w, path, &right.to_le_bytes())?;
        write_all(&mut w, path, &level.to_le_bytes())?;
        write_all(&mut w, path, &next_tree_index.to_le_bytes())?;
    }

    write_all(&mut w, path, &trie.root().0.to_le_bytes())?;
    w.flush().map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn write_all(w: &mut impl Write, path: &Path, bytes: &[u8]) -> Result<()> {
    w.write_all(bytes).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load(path: &Path) -> Result<PatternIndex> {
    let file = std::fs::File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    // SAFETY: the mapped file is treated as read-only data; patterns-core
    // never writes through this mapping and the process does not rely on
    // the backing file remaining unmodified for longer than the mapping's
    // lifetime, matching the read-only-after-dump usage described in §5.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut r = Reader::new(&mmap);
    let magic = r.take(8)?;
    if magic != MAGIC {
        return Err(Error::CorruptIndex("bad magic number".into()));
    }
    let longest_pattern = r.read_i64()?;
    if longest_pattern < 0 {
        return Err(Error::CorruptIndex("negative longest_pattern".into()));
    }
    let tree_count = r.read_u32()?;
    let node_count = r.read_u32()?;
    if tree_count == 0 || node_count == 0 {
        return Err(Error::CorruptIndex(
            "tree/node arena must include the sentinel".into(),
        ));
    }

    let mut trees = Vec::with_capacity(tree_count as usize);
    trees.push((0u32, Vec::new(), 0u32));
    for _ in 1..tree_count {
        let pid = r.read_u32()?;
        let skip_count = r.read_u8()?;
        let mut skips = Vec::with_capacity(skip_count as usize);
        for _ in 0..skip_count {
            let n = r.read_u8()?;
            let child = r.read_u32()?;
            if child >= tree_count {
                return Err(Error::CorruptIndex("skip-edge child out of range".into()));
            }
            skips.push((n, child));
        }
        let root_node_index = r.read_u32()?;
        if root_node_index >= node_count {
            return Err(Error::CorruptIndex("root_node_index out of range".into()));
        }
        trees.push((pid, skips, root_node_index));
    }

    let mut cells = Vec::with_capacity(node_count as usize);
    cells.push((0u64, 0u32, 0u32, 0u16, 0u32));
    for _ in 1..node_count {
        let element = r.read_u64()?;
        let left = r.read_u32()?;
        let right = r.read_u32()?;
        let level = r.read_u16()?;
        let next_tree_index = r.read_u32()?;
        if left >= node_count || right >= node_count || next_tree_index >= tree_count {
            return Err(Error::CorruptIndex("AA-cell reference out of range".into()));
        }
        cells.push((element, left, right, level, next_tree_index));
    }

    let pattern_tree_root_index = r.read_u32()?;
    if pattern_tree_root_index >= tree_count {
        return Err(Error::CorruptIndex(
            "pattern_tree_root_index out of range".into(),
        ));
    }

    let trie: Trie = Trie::from_raw(trees, cells, pattern_tree_root_index);
    Ok(PatternIndex::from_parts(trie, longest_pattern as usize))
}

/// A tiny bounds-checked cursor over the mmap'd bytes. Every read that
/// would run past the end of the file returns `Error::CorruptIndex`
/// rather than panicking or reading out of bounds.
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

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }
}

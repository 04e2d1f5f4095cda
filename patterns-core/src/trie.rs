// Copyright 2022 Oxide Computer Company

//! The arena-allocated prefix trie (C4).
//!
//! Every trie node lives in a flat `Vec` (`trees`), addressed by a 32-bit
//! [`TrieNodeId`] rather than a pointer, so the whole structure is `Sync`
//! and can be serialized byte-for-byte (C7) and later `mmap`'d back in
//! without any pointer fix-up. A node's children (keyed by token hash) are
//! stored in a second flat `Vec` (`nodes`) shared by every trie node: each
//! cell is `(element, left, right, level, next_tree_index)`, an AA-tree
//! (Arne Andersson's balanced BST) cell whose `next_tree_index` names the
//! child `TrieNode` that hash leads to. A node's own position in that
//! shared arena is recorded as its `root_node_index`. Skip edges
//! (`$skip1`..`$skip99`) are far fewer per node and are kept as a small
//! sorted list inline on the node itself rather than in the AA-tree arena.
//!
//! The original's AA-tree `find()` compared against a sentinel cell whose
//! key field it overwrote with the search key for each lookup
//! (`nullNode->element = x`) so the loop body could use one comparison
//! without a separate bounds check. That trick makes the sentinel cell
//! shared, mutable, global state — fine for a single-threaded C program,
//! fatal for a structure we want `Sync` behind an `mmap`. `find` here
//! keeps the search key in a local instead and never touches the sentinel.

/// Index into the shared AA-cell arena. `0` is the null sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AaNodeId(u32);

const AA_NULL: AaNodeId = AaNodeId(0);

struct AaCell {
    element: u64,
    left: AaNodeId,
    right: AaNodeId,
    level: u16,
    next_tree_index: TrieNodeId,
}

/// Index into a [`Trie`]'s node arena. `0` is a reserved sentinel, never a
/// real node; the trie's root lives at index `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrieNodeId(pub u32);

const TRIE_NULL: TrieNodeId = TrieNodeId(0);

struct TrieNode {
    /// `0` means "no pattern terminates here"; real pattern ids are
    /// assigned starting at 1, matching the original's pid-as-sentinel
    /// convention (`pattern_add` logs an overwrite whenever this is
    /// already non-zero).
    pid: u32,
    root_node_index: AaNodeId,
    /// Sorted ascending by skip length, scanned linearly — skip edges per
    /// node are few, so a balanced tree would be overkill.
    skips: Vec<(u8, TrieNodeId)>,
}

/// The arena-allocated prefix trie. Concrete tokens move to a child found
/// through the shared AA-tree arena, keyed by token hash; a `$skipN`
/// placeholder instead records a skip-edge on the node itself, so the
/// walker can try every skip length recorded at that point without the
/// trie needing to materialize `N` intermediate nodes.
pub struct Trie {
    trees: Vec<TrieNode>,
    nodes: Vec<AaCell>,
    root: TrieNodeId,
}

impl Trie {
    pub fn new() -> Self {
        let sentinel_tree = TrieNode {
            pid: 0,
            root_node_index: AA_NULL,
            skips: Vec::new(),
        };
        let root_tree = TrieNode {
            pid: 0,
            root_node_index: AA_NULL,
            skips: Vec::new(),
        };
        let sentinel_cell = AaCell {
            element: 0,
            left: AA_NULL,
            right: AA_NULL,
            level: 0,
            next_tree_index: TRIE_NULL,
        };
        Trie {
            trees: vec![sentinel_tree, root_tree],
            nodes: vec![sentinel_cell],
            root: TrieNodeId(1),
        }
    }

    pub fn root(&self) -> TrieNodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.trees.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pattern_id(&self, node: TrieNodeId) -> Option<u32> {
        let pid = self.trees[node.0 as usize].pid;
        (pid != 0).then_some(pid)
    }

    /// Sets `node`'s pattern id, returning the previous one (if any) so
    /// the caller can log an overwrite.
    pub fn set_pattern_id(&mut self, node: TrieNodeId, id: u32) -> Option<u32> {
        debug_assert!(id != 0, "pattern ids must be nonzero");
        let slot = &mut self.trees[node.0 as usize].pid;
        let previous = *slot;
        *slot = id;
        (previous != 0).then_some(previous)
    }

    fn alloc_tree(&mut self) -> TrieNodeId {
        self.trees.push(TrieNode {
            pid: 0,
            root_node_index: AA_NULL,
            skips: Vec::new(),
        });
        TrieNodeId((self.trees.len() - 1) as u32)
    }

    pub fn child(&self, node: TrieNodeId, token_hash: u64) -> Option<TrieNodeId> {
        let root = self.trees[node.0 as usize].root_node_index;
        self.find_child(root, token_hash)
    }

    fn find_child(&self, mut cur: AaNodeId, key: u64) -> Option<TrieNodeId> {
        while cur != AA_NULL {
            let cell = &self.nodes[cur.0 as usize];
            if key == cell.element {
                return Some(cell.next_tree_index);
            }
            cur = if key < cell.element { cell.left } else { cell.right };
        }
        None
    }

    pub fn child_or_insert(&mut self, node: TrieNodeId, token_hash: u64) -> TrieNodeId {
        if let Some(existing) = self.child(node, token_hash) {
            return existing;
        }
        let child = self.alloc_tree();
        let old_root = self.trees[node.0 as usize].root_node_index;
        let new_root = self.aa_insert(old_root, token_hash, child);
        self.trees[node.0 as usize].root_node_index = new_root;
        child
    }

    fn aa_insert(&mut self, t: AaNodeId, key: u64, value: TrieNodeId) -> AaNodeId {
        if t == AA_NULL {
            self.nodes.push(AaCell {
                element: key,
                left: AA_NULL,
                right: AA_NULL,
                level: 1,
                next_tree_index: value,
            });
            return AaNodeId((self.nodes.len() - 1) as u32);
        }

        let element = self.nodes[t.0 as usize].element;
        if key < element {
            let left = self.nodes[t.0 as usize].left;
            let new_left = self.aa_insert(left, key, value);
            self.nodes[t.0 as usize].left = new_left;
        } else if key > element {
            let right = self.nodes[t.0 as usize].right;
            let new_right = self.aa_insert(right, key, value);
            self.nodes[t.0 as usize].right = new_right;
        } else {
            self.nodes[t.0 as usize].next_tree_index = value;
            return t;
        }

        let t = self.skew(t);
        self.split(t)
    }

    fn skew(&mut self, t: AaNodeId) -> AaNodeId {
        if t == AA_NULL {
            return t;
        }
        let l = self.nodes[t.0 as usize].left;
        if l == AA_NULL {
            return t;
        }
        if self.nodes[l.0 as usize].level == self.nodes[t.0 as usize].level {
            self.nodes[t.0 as usize].left = self.nodes[l.0 as usize].right;
            self.nodes[l.0 as usize].right = t;
            l
        } else {
            t
        }
    }

    fn split(&mut self, t: AaNodeId) -> AaNodeId {
        if t == AA_NULL {
            return t;
        }
        let r = self.nodes[t.0 as usize].right;
        if r == AA_NULL {
            return t;
        }
        let rr = self.nodes[r.0 as usize].right;
        if rr != AA_NULL && self.nodes[rr.0 as usize].level == self.nodes[t.0 as usize].level {
            self.nodes[t.0 as usize].right = self.nodes[r.0 as usize].left;
            self.nodes[r.0 as usize].left = t;
            self.nodes[r.0 as usize].level += 1;
            r
        } else {
            t
        }
    }

    pub fn skip_child(&self, node: TrieNodeId, skip_len: u8) -> Option<TrieNodeId> {
        self.trees[node.0 as usize]
            .skips
            .iter()
            .find(|(n, _)| *n == skip_len)
            .map(|(_, id)| *id)
    }

    /// `check_or_insert_skip`: linear scan for an equal `N`, returning its
    /// existing child; otherwise allocates a child and inserts it before
    /// the first edge with a larger `N`, keeping the list sorted.
    pub fn skip_child_or_insert(&mut self, node: TrieNodeId, skip_len: u8) -> TrieNodeId {
        if let Some(existing) = self.skip_child(node, skip_len) {
            return existing;
        }
        let child = self.alloc_tree();
        let skips = &mut self.trees[node.0 as usize].skips;
        let pos = skips.partition_point(|(n, _)| *n < skip_len);
        skips.insert(pos, (skip_len, child));
        child
    }

    /// All skip lengths recorded at `node`, in ascending order, paired
    /// with the trie node they lead to. Used by the matcher's
    /// backtracking walker.
    pub fn skip_edges(&self, node: TrieNodeId) -> impl Iterator<Item = (u8, TrieNodeId)> + '_ {
        self.trees[node.0 as usize].skips.iter().copied()
    }

    // --- Raw accessors for the binary serializer (C7). ---

    pub(crate) fn tree_count(&self) -> u32 {
        self.trees.len() as u32
    }

    pub(crate) fn node_count(&self) -> u32 {
        self.nodes.len() as u32
    }

    pub(crate) fn tree_raw(&self, idx: u32) -> (u32, &[(u8, TrieNodeId)], u32) {
        let node = &self.trees[idx as usize];
        (node.pid, &node.skips, node.root_node_index.0)
    }

    pub(crate) fn cell_raw(&self, idx: u32) -> (u64, u32, u32, u16, u32) {
        let cell = &self.nodes[idx as usize];
        (cell.element, cell.left.0, cell.right.0, cell.level, cell.next_tree_index.0)
    }

    /// Rebuilds a trie from the raw records the serializer wrote, without
    /// re-running any insert logic. `idx == 0` in every vector is the
    /// sentinel and must already be present (callers pass the full
    /// `0..tree_count`/`0..node_count` ranges, sentinel included).
    pub(crate) fn from_raw(
        trees: Vec<(u32, Vec<(u8, u32)>, u32)>,
        cells: Vec<(u64, u32, u32, u16, u32)>,
        root: u32,
    ) -> Self {
        let trees = trees
            .into_iter()
            .map(|(pid, skips, root_node_index)| TrieNode {
                pid,
                root_node_index: AaNodeId(root_node_index),
                skips: skips.into_iter().map(|(n, id)| (n, TrieNodeId(id))).collect(),
            })
            .collect();
        let nodes = cells
            .into_iter()
            .map(|(element, left, right, level, next_tree_index)| AaCell {
                element,
                left: AaNodeId(left),
                right: AaNodeId(right),
                level,
                next_tree_index: TrieNodeId(next_tree_index),
            })
            .collect();
        Trie {
            trees,
            nodes,
            root: TrieNodeId(root),
        }
    }
}

impl Default for Trie {
    fn default() -> Self {
        Self::new()
    }
}

/// A standalone membership set keyed by `u64`, using the identical
/// AA-tree algorithm as the trie's per-node children map but with its own
/// small private arena. This is the type [`crate::ignore::IgnoredTokens`]
/// wraps — the original stores its ignored-token set as index 0 of the
/// very same `TokenTree` arena the pattern trie uses (see §C3's grounding
/// note); this port keeps the algorithm but gives the ignored set its own
/// arena rather than sharing index space with the pattern trie, since the
/// two sets are unrelated and the ignored one is rebuilt fresh on every
/// `Matcher::new` rather than ever being serialized.
pub struct AaTree {
    nodes: Vec<SetCell>,
    root: SetNodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SetNodeId(u32);

const SET_NULL: SetNodeId = SetNodeId(0);

struct SetCell {
    element: u64,
    left: SetNodeId,
    right: SetNodeId,
    level: u8,
}

impl AaTree {
    pub fn new() -> Self {
        AaTree {
            nodes: vec![SetCell {
                element: 0,
                left: SET_NULL,
                right: SET_NULL,
                level: 0,
            }],
            root: SET_NULL,
        }
    }

    pub fn insert(&mut self, key: u64) {
        self.root = self.insert_rec(self.root, key);
    }

    fn insert_rec(&mut self, t: SetNodeId, key: u64) -> SetNodeId {
        if t == SET_NULL {
            self.nodes.push(SetCell {
                element: key,
                left: SET_NULL,
                right: SET_NULL,
                level: 1,
            });
            return SetNodeId((self.nodes.len() - 1) as u32);
        }

        let element = self.nodes[t.0 as usize].element;
        if key < element {
            let left = self.nodes[t.0 as usize].left;
            let new_left = self.insert_rec(left, key);
            self.nodes[t.0 as usize].left = new_left;
        } else if key > element {
            let right = self.nodes[t.0 as usize].right;
            let new_right = self.insert_rec(right, key);
            self.nodes[t.0 as usize].right = new_right;
        } else {
            return t;
        }

        let t = self.skew(t);
        self.split(t)
    }

    fn skew(&mut self, t: SetNodeId) -> SetNodeId {
        if t == SET_NULL {
            return t;
        }
        let l = self.nodes[t.0 as usize].left;
        if l == SET_NULL {
            return t;
        }
        if self.nodes[l.0 as usize].level == self.nodes[t.0 as usize].level {
            self.nodes[t.0 as usize].left = self.nodes[l.0 as usize].right;
            self.nodes[l.0 as usize].right = t;
            l
        } else {
            t
        }
    }

    fn split(&mut self, t: SetNodeId) -> SetNodeId {
        if t == SET_NULL {
            return t;
        }
        let r = self.nodes[t.0 as usize].right;
        if r == SET_NULL {
            return t;
        }
        let rr = self.nodes[r.0 as usize].right;
        if rr != SET_NULL && self.nodes[rr.0 as usize].level == self.nodes[t.0 as usize].level {
            self.nodes[t.0 as usize].right = self.nodes[r.0 as usize].left;
            self.nodes[r.0 as usize].left = t;
            self.nodes[r.0 as usize].level += 1;
            r
        } else {
            t
        }
    }

    /// Iterative lookup, no shared mutable sentinel state (§4.3.1).
    pub fn contains(&self, key: u64) -> bool {
        let mut cur = self.root;
        while cur != SET_NULL {
            let cell = &self.nodes[cur.0 as usize];
            if key == cell.element {
                return true;
            }
            cur = if key < cell.element { cell.left } else { cell.right };
        }
        false
    }
}

impl Default for AaTree {
    fn default() -> Self {
        Self::new()
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Per-Target Attribute Cache
//!
//! Precomputed descendant sets that keep constraint evaluation from
//! re-traversing the target tree on every query.
//!
//! ## Key Types
//!
//! - [`TreeCache`] - For every node, the set of leaves and the set of all
//!   nodes in its rooted subtree, as bitmaps over dense node ids
//! - [`AttrSource`] - Either a borrowed cache or the cache-free emulation
//!   that answers the same questions by on-demand traversal
//!
//! The cache is built by a single post-order sweep and never mutated
//! afterwards, so sharing `&TreeCache` across concurrent matchers on the
//! same tree is safe. It is only valid while the target tree stays
//! structurally unchanged.

use crate::tree::{Node, NodeId, Traversal, Tree};

use bit_set::BitSet;

/// Precomputed leaf and subtree sets for one target tree.
#[derive(Debug, Clone)]
pub struct TreeCache {
    leaves: Vec<BitSet>,
    subtree: Vec<BitSet>,
}

impl TreeCache {
    /// Builds the cache with one post-order sweep, accumulating child sets
    /// bottom-up.
    #[must_use]
    pub fn build(tree: &Tree) -> Self {
        let n = tree.len();
        let mut leaves = vec![BitSet::with_capacity(n); n];
        let mut subtree = vec![BitSet::with_capacity(n); n];
        for node in tree.traverse(Traversal::Postorder) {
            let id = node.id();
            subtree[id].insert(id);
            if node.is_leaf() {
                leaves[id].insert(id);
            }
            for child in node.children() {
                union_from(&mut leaves, id, child.id());
                union_from(&mut subtree, id, child.id());
            }
        }
        Self { leaves, subtree }
    }

    /// The set of leaf ids beneath `id` (including `id` if it is a leaf).
    #[must_use]
    pub fn leaves(&self, id: NodeId) -> &BitSet {
        &self.leaves[id]
    }

    /// The set of all node ids in the rooted subtree at `id`.
    #[must_use]
    pub fn subtree(&self, id: NodeId) -> &BitSet {
        &self.subtree[id]
    }
}

// sets[dst] |= sets[src] without cloning either side
fn union_from(sets: &mut [BitSet], dst: usize, src: usize) {
    debug_assert_ne!(dst, src);
    if dst < src {
        let (lo, hi) = sets.split_at_mut(src);
        lo[dst].union_with(&hi[0]);
    } else {
        let (lo, hi) = sets.split_at_mut(dst);
        hi[0].union_with(&lo[src]);
    }
}

/// Builds an attribute cache for a target tree.
#[must_use]
pub fn build_cache(tree: &Tree) -> TreeCache {
    TreeCache::build(tree)
}

/// Uniform access to descendant sets, with or without a prebuilt cache.
///
/// Evaluators never branch on cache presence: `Direct` answers the same
/// queries by traversing the subtree on demand.
#[derive(Clone, Copy)]
pub(crate) enum AttrSource<'c> {
    Cached(&'c TreeCache),
    Direct,
}

impl AttrSource<'_> {
    /// Leaf ids beneath `node`, in ascending id order.
    pub(crate) fn leaf_ids(&self, node: Node<'_>) -> Vec<NodeId> {
        match self {
            Self::Cached(cache) => cache.leaves(node.id()).iter().collect(),
            Self::Direct => {
                let mut ids: Vec<_> = node
                    .descendants()
                    .filter(Node::is_leaf)
                    .map(|n| n.id())
                    .collect();
                ids.sort_unstable();
                ids
            }
        }
    }

    /// All ids in the subtree at `node`, in ascending id order.
    pub(crate) fn subtree_ids(&self, node: Node<'_>) -> Vec<NodeId> {
        match self {
            Self::Cached(cache) => cache.subtree(node.id()).iter().collect(),
            Self::Direct => {
                let mut ids: Vec<_> = node.descendants().map(|n| n.id()).collect();
                ids.sort_unstable();
                ids
            }
        }
    }
}

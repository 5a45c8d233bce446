// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Strict Topology Matching
//!
//! The recursive combinatorial search that decides whether the subtree
//! rooted at a target node satisfies one strict sub-pattern, given the
//! local match matrix.
//!
//! ## Algorithm
//!
//! For a pattern node and a target node:
//!
//! 1. the target must satisfy the pattern node's local constraint (a bit
//!    test against the matrix);
//! 2. a childless pattern node is done;
//! 3. otherwise each pattern child claims target children: a plain child
//!    claims between `min_occur` and `max_occur` of them (each matching
//!    recursively), while a *chain* child (a node with children and an
//!    occurrence metacharacter) claims exactly one target child as the
//!    start of a vertical chain of `min_occur..=max_occur` stacked nodes
//!    whose last element carries the chain's children;
//! 4. per-constraint accumulated caps reject levels where more target
//!    children satisfy one constraint than its summed upper bounds allow;
//! 5. every target child must be claimed by some pattern child - except at
//!    levels involved in a chain, where unmatched siblings are tolerated;
//! 6. the search walks pattern children in order and target selections in
//!    target child order, so the first witness found is deterministic.
//!
//! A chain with `min_occur = 0` may be elided entirely: its children hoist
//! one level up and attach directly (the "direct connection first" case,
//! tried before any chain descent).

mod solve;

use crate::matrix::LocalMatrix;
use crate::pattern::Pattern;
use crate::tree::{NodeId, Tree};

use solve::{Slot, SlotKind, Solver};

pub(crate) struct TopologyMatcher<'a, 't> {
    pub(crate) pattern: &'a Pattern,
    /// Effective children table from the splitter.
    pub(crate) kids: &'a [Vec<usize>],
    pub(crate) matrix: &'a LocalMatrix,
    pub(crate) tree: &'t Tree,
}

impl<'a, 't> TopologyMatcher<'a, 't> {
    /// Whether the subtree rooted at `target` satisfies the sub-pattern
    /// rooted at `pid`.
    pub(crate) fn matches(&self, pid: usize, target: NodeId) -> bool {
        if self.is_chain(pid) {
            // a chain at a part root starts its chain on the target itself
            return self.chain_at(pid, target, 1);
        }
        if !self.matrix.contains(pid, target) {
            return false;
        }
        self.match_children(pid, target, true)
    }

    /// A chain node expands to a vertical run of target nodes; a node with
    /// an occurrence metacharacter but no (effective) children is a sibling
    /// repeat instead.
    pub(crate) fn is_chain(&self, pid: usize) -> bool {
        self.pattern.node(pid).has_bounds && !self.kids[pid].is_empty()
    }

    /// Matches the (effective) children of `pid` against the children of
    /// `target`. `exact` demands that every target child is claimed; it is
    /// dropped at levels that take part in a chain.
    fn match_children(&self, pid: usize, target: NodeId, exact: bool) -> bool {
        let slots = &self.kids[pid];
        if slots.is_empty() {
            return true;
        }
        let exact = exact && !slots.iter().any(|&slot| self.is_chain(slot));
        let t_children: Vec<NodeId> = self
            .tree
            .node(target)
            .children()
            .map(|child| child.id())
            .collect();
        for variant in self.elision_variants(slots) {
            if self.solve_variant(&variant, &t_children, exact) {
                return true;
            }
        }
        false
    }

    /// `target` as the `len`-th node of the chain `pid`: either the chain
    /// is long enough and ends here, or it continues into one child.
    fn chain_at(&self, pid: usize, target: NodeId, len: usize) -> bool {
        let node = self.pattern.node(pid);
        if node.max_occur.is_some_and(|max| len > max) {
            return false;
        }
        if !self.matrix.contains(pid, target) {
            return false;
        }
        if len >= node.min_occur && self.match_children(pid, target, false) {
            return true;
        }
        self.tree
            .node(target)
            .children()
            .any(|child| self.chain_at(pid, child.id(), len + 1))
    }

    /// All ways of eliding zero-minimum chains at this level. Hoisted
    /// children of an elided chain splice in at its position; elision is
    /// tried before chain descent.
    fn elision_variants(&self, slots: &[usize]) -> Vec<Vec<SlotKind>> {
        let mut variants: Vec<Vec<SlotKind>> = vec![Vec::new()];
        for &slot in slots {
            if !self.is_chain(slot) {
                for variant in &mut variants {
                    variant.push(SlotKind::Plain(slot));
                }
                continue;
            }
            let node = self.pattern.node(slot);
            let can_elide = node.min_occur == 0;
            let can_descend = node.max_occur != Some(0);
            let mut next = Vec::new();
            for variant in &variants {
                if can_elide {
                    for hoisted in self.elision_variants(&self.kids[slot]) {
                        let mut extended = variant.clone();
                        extended.extend(hoisted);
                        next.push(extended);
                    }
                }
                if can_descend {
                    let mut extended = variant.clone();
                    extended.push(SlotKind::Chain(slot));
                    next.push(extended);
                }
            }
            variants = next;
        }
        variants
    }

    fn solve_variant(&self, slots: &[SlotKind], t_children: &[NodeId], exact: bool) -> bool {
        let mut resolved = Vec::with_capacity(slots.len());
        for &kind in slots {
            let slot = match kind {
                SlotKind::Plain(pid) => {
                    let node = self.pattern.node(pid);
                    let local: Vec<NodeId> = t_children
                        .iter()
                        .copied()
                        .filter(|&c| self.matrix.contains(pid, c))
                        .collect();
                    if local.len() < node.min_occur {
                        return false;
                    }
                    Slot {
                        pid,
                        kind,
                        min: node.min_occur,
                        max: node.max_occur,
                        local,
                        candidates: Vec::new(),
                    }
                }
                SlotKind::Chain(pid) => Slot {
                    pid,
                    kind,
                    min: 1,
                    max: Some(1),
                    local: Vec::new(),
                    candidates: Vec::new(),
                },
            };
            resolved.push(slot);
        }

        if !self.check_caps(&resolved) {
            return false;
        }

        // deep-filter after the cheap rejections: a candidate stays only if
        // its own subtree matches
        for slot in &mut resolved {
            match slot.kind {
                SlotKind::Plain(pid) => {
                    slot.candidates = slot
                        .local
                        .iter()
                        .copied()
                        .filter(|&c| self.match_children(pid, c, true))
                        .collect();
                }
                SlotKind::Chain(pid) => {
                    slot.candidates = t_children
                        .iter()
                        .copied()
                        .filter(|&c| self.chain_at(pid, c, 1))
                        .collect();
                }
            }
            if slot.candidates.len() < slot.min {
                return false;
            }
        }

        Solver::new(&resolved, t_children, exact).solve()
    }

    /// Per-constraint accumulated upper bounds: target children observed to
    /// satisfy one constraint must not outnumber its summed `max_occur`.
    fn check_caps(&self, slots: &[Slot]) -> bool {
        let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
        for (idx, slot) in slots.iter().enumerate() {
            if matches!(slot.kind, SlotKind::Chain(_)) {
                continue;
            }
            let source = self.pattern.node(slot.pid).source.as_str();
            match groups.iter_mut().find(|(s, _)| *s == source) {
                Some((_, members)) => members.push(idx),
                None => groups.push((source, vec![idx])),
            }
        }
        for (_, members) in groups {
            let mut cap = 0usize;
            let mut bounded = true;
            for &idx in &members {
                match slots[idx].max {
                    Some(max) => cap += max,
                    None => bounded = false,
                }
            }
            if !bounded {
                continue;
            }
            let mut observed = bit_set::BitSet::new();
            for &idx in &members {
                for &c in &slots[idx].local {
                    observed.insert(c);
                }
            }
            if observed.len() > cap {
                return false;
            }
        }
        true
    }
}

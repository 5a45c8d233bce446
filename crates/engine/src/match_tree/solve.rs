// SPDX-License-Identifier: MIT OR Apache-2.0

//! Non-overlapping assignment search for one sibling level.
//!
//! Each slot claims a selection of target children within its occurrence
//! bounds; selections must be pairwise disjoint, and under exact coverage
//! they must together claim every target child. Slots are tried in pattern
//! order, selection sizes ascending, candidates in target child order, so
//! the first witness is deterministic.

use crate::tree::NodeId;

use bit_set::BitSet;

/// How a pattern child claims target children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SlotKind {
    /// Claims `min..=max` target children, each matching recursively.
    Plain(usize),
    /// Claims exactly one target child as the start of a vertical chain.
    Chain(usize),
}

pub(super) struct Slot {
    pub(super) pid: usize,
    pub(super) kind: SlotKind,
    pub(super) min: usize,
    pub(super) max: Option<usize>,
    /// Target children satisfying the local constraint.
    pub(super) local: Vec<NodeId>,
    /// Target children surviving the deep (recursive) check.
    pub(super) candidates: Vec<NodeId>,
}

pub(super) struct Solver<'s> {
    slots: &'s [Slot],
    total: usize,
    exact: bool,
    used: BitSet,
}

impl<'s> Solver<'s> {
    pub(super) fn new(slots: &'s [Slot], t_children: &[NodeId], exact: bool) -> Self {
        Self {
            slots,
            total: t_children.len(),
            exact,
            used: BitSet::new(),
        }
    }

    pub(super) fn solve(mut self) -> bool {
        self.assign(0)
    }

    fn assign(&mut self, idx: usize) -> bool {
        let Some(slot) = self.slots.get(idx) else {
            return !self.exact || self.used.len() == self.total;
        };
        let available = slot.candidates.len();
        let hi = slot.max.map_or(available, |max| max.min(available));
        for k in slot.min..=hi {
            if self.pick(idx, k, 0) {
                return true;
            }
        }
        false
    }

    /// Selects `k` further candidates for slot `idx`, starting at candidate
    /// position `from`.
    fn pick(&mut self, idx: usize, k: usize, from: usize) -> bool {
        if k == 0 {
            return self.assign(idx + 1);
        }
        let slots = self.slots;
        let candidates = &slots[idx].candidates;
        for i in from..candidates.len() {
            if candidates.len() - i < k {
                break;
            }
            let candidate = candidates[i];
            if self.used.contains(candidate) {
                continue;
            }
            self.used.insert(candidate);
            if self.pick(idx, k - 1, i + 1) {
                return true;
            }
            self.used.remove(candidate);
        }
        false
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Pattern Splitting Along Loose Connections
//!
//! A loose connection says "these subpatterns occur somewhere below a common
//! ancestor". The strict topology matcher cannot express that, so the
//! pattern is partitioned: every child of a loose parent becomes the root of
//! its own strict sub-pattern, and the parents record which parts must end
//! up under one common ancestor in the target.
//!
//! The split never copies pattern nodes. Parts are identified by their root
//! node index, and an *effective children* table redirects the matcher: a
//! loose parent keeps its local constraint but loses its children, so inside
//! its own part it degrades to a childless placeholder holding one child
//! slot.

use crate::pattern::Pattern;

/// Sub-patterns that must share a common ancestor in any whole-pattern
/// match, identified by part index.
#[derive(Debug, Clone)]
pub(crate) struct AncestorGroup {
    pub(crate) members: Vec<usize>,
}

/// Result of splitting a pattern along its loose connections.
#[derive(Debug)]
pub(crate) struct SplitPattern {
    /// Effective children per pattern node; loose parents are emptied.
    pub(crate) kids: Vec<Vec<usize>>,
    /// Part roots (pattern node indices), outermost first.
    pub(crate) parts: Vec<usize>,
    /// Ancestor groups ordered by the pattern preorder of their loose
    /// parent, outermost first.
    pub(crate) groups: Vec<AncestorGroup>,
}

pub(crate) fn split(pattern: &Pattern) -> SplitPattern {
    let kids: Vec<Vec<usize>> = (0..pattern.len())
        .map(|pid| {
            let node = pattern.node(pid);
            if node.loose_children {
                Vec::new()
            } else {
                node.children.clone()
            }
        })
        .collect();

    let mut parts = Vec::new();
    let root = pattern.root_id();
    let root_node = pattern.node(root);
    // an unconstrained loose root leaves nothing to match once its children
    // are detached; only its ancestor group survives
    let drop_root = root_node.loose_children
        && root_node.clauses.is_empty()
        && !root_node.require_leaf
        && !root_node.require_root;
    if !drop_root {
        parts.push(root);
    }

    let mut groups = Vec::new();
    // node indices are preorder, so loose parents are discovered outermost
    // first
    for pid in 0..pattern.len() {
        if !pattern.node(pid).loose_children {
            continue;
        }
        let mut members = Vec::new();
        for &child in &pattern.node(pid).children {
            members.push(parts.len());
            parts.push(child);
        }
        groups.push(AncestorGroup { members });
    }

    SplitPattern {
        kids,
        parts,
        groups,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pattern::PatternOptions;

    fn compile(text: &str) -> Pattern {
        Pattern::compile(text, &PatternOptions::default()).expect("should compile")
    }

    #[test]
    fn test_degenerate_no_loose() {
        let pattern = compile("(hello,kk);");
        let split = split(&pattern);
        assert_eq!(split.parts, [pattern.root_id()]);
        assert!(split.groups.is_empty());
        // effective children match the pattern
        assert_eq!(split.kids[pattern.root_id()].len(), 2);
    }

    #[test]
    fn test_single_loose_root() {
        // the unconstrained loose root is dropped, its group stays
        let pattern = compile("((A,B)x,C)^;");
        let split = split(&pattern);
        assert_eq!(split.parts.len(), 2);
        assert_eq!(split.groups.len(), 1);
        assert_eq!(split.groups[0].members, [0, 1]);
        assert!(split.kids[pattern.root_id()].is_empty());
    }

    #[test]
    fn test_constrained_loose_root_is_kept() {
        let pattern = compile("((A,B)x,C)'^n_leaves(@) > 2';");
        let split = split(&pattern);
        // the remnant root plus its two detached children
        assert_eq!(split.parts.len(), 3);
        assert_eq!(split.parts[0], pattern.root_id());
        assert_eq!(split.groups[0].members, [1, 2]);
    }

    #[test]
    fn test_nested_loose() {
        let pattern = compile("(((B,Z)^,G),C)^;");
        let split = split(&pattern);
        // parts: X = ((B,Z)^,G), C, then B and Z from the inner loose node
        assert_eq!(split.parts.len(), 4);
        assert_eq!(split.groups.len(), 2);
        assert_eq!(split.groups[0].members, [0, 1]);
        assert_eq!(split.groups[1].members, [2, 3]);
        // the inner loose node keeps a childless slot inside part X
        let x = split.parts[0];
        let inner = pattern.node(x).children[0];
        assert!(pattern.node(inner).loose_children);
        assert!(split.kids[inner].is_empty());
        assert_eq!(split.kids[x].len(), 2);
    }
}

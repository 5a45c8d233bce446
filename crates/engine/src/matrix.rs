// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Local Match Matrix
//!
//! For every pattern node, the set of target nodes that satisfy its
//! constraint in isolation, as one bitmap row per pattern node.
//!
//! Built by a single `O(|P| * |T|)` sweep; afterwards the topology matcher
//! only tests bits and never re-evaluates constraints. A non-fatal
//! evaluation failure at a node leaves the bit clear; a fatal one aborts
//! the build (and with it the query).

use crate::cache::AttrSource;
use crate::constraint::{Binding, EvalCtx, EvalError};
use crate::pattern::{Pattern, PatternNode};
use crate::tree::{Node, Traversal, Tree};

use bit_set::BitSet;

#[derive(Debug)]
pub(crate) struct LocalMatrix {
    rows: Vec<BitSet>,
}

impl LocalMatrix {
    pub(crate) fn build(
        pattern: &Pattern,
        tree: &Tree,
        ctx: &EvalCtx<'_, '_>,
    ) -> Result<Self, EvalError> {
        let mut rows = vec![BitSet::with_capacity(tree.len()); pattern.len()];
        for node in tree.traverse(Traversal::Preorder) {
            for (pid, pnode) in pattern.nodes() {
                if local_match(pnode, node, ctx)? {
                    rows[pid].insert(node.id());
                }
            }
        }
        Ok(Self { rows })
    }

    pub(crate) fn contains(&self, pattern_node: usize, target: usize) -> bool {
        self.rows[pattern_node].contains(target)
    }
}

fn local_match(
    pnode: &PatternNode,
    node: Node<'_>,
    ctx: &EvalCtx<'_, '_>,
) -> Result<bool, EvalError> {
    // a pattern node with children cannot sit on a target leaf
    if !pnode.children.is_empty() && node.is_leaf() {
        return Ok(false);
    }
    if pnode.require_leaf && !node.is_leaf() {
        return Ok(false);
    }
    if pnode.require_root && !node.is_root() {
        return Ok(false);
    }
    for clause in &pnode.clauses {
        if clause.extremal {
            // judged by the driver's extremal fold, locally unconstrained
            continue;
        }
        match ctx.eval_bool(clause, Binding::target(node.id())) {
            Ok(true) => {}
            Ok(false) => return Ok(false),
            Err(err) if err.is_fatal() => return Err(err),
            Err(_) => return Ok(false),
        }
    }
    Ok(true)
}

/// Builds the evaluation context a matrix (and the driver) works with.
pub(crate) fn eval_ctx<'a, 't>(
    tree: &'t Tree,
    attrs: AttrSource<'a>,
    namer: Option<&'a crate::constraint::TaxonNamer>,
) -> EvalCtx<'a, 't> {
    EvalCtx { tree, attrs, namer }
}

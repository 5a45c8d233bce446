// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Match Driver
//!
//! Orchestrates a query: builds the local match matrix, splits the pattern
//! along loose connections, runs the strict topology matcher, and stitches
//! sub-pattern matches back together.
//!
//! ## Key Types
//!
//! - [`FindOptions`] - Per-query knobs: hit cap, traversal order, optional
//!   prebuilt cache, optional taxon naming function
//! - [`Matches`] - The lazy, pull-based sequence of matching target nodes
//!
//! ## Behavior
//!
//! With a single strict part the driver streams the requested traversal and
//! tests nodes on demand; the caller stops pulling to cancel. With several
//! parts it iterates the Cartesian product of the parts' match sets,
//! keeps the tuples whose ancestor-group LCAs form a nested chain, and
//! reports each tuple's outermost LCA, deduplicated in traversal order.
//! Extremal patterns (`[:all_nodes:]`) collect their candidates eagerly and
//! fold them pairwise down to a single best node.
//!
//! All constraint evaluation happens up front (matrix build and extremal
//! fold), so iteration itself cannot fail: fatal evaluation errors surface
//! from [`find_match`] before the first hit is produced.

use crate::cache::{AttrSource, TreeCache};
use crate::constraint::{Binding, EvalError, TaxonNamer};
use crate::match_tree::TopologyMatcher;
use crate::matrix::{self, LocalMatrix};
use crate::pattern::Pattern;
use crate::split::{self, SplitPattern};
use crate::tree::{Node, NodeId, Traversal, Traverse, Tree};

use bit_set::BitSet;

/// Options for one [`find_match`] query.
#[derive(Clone, Copy, Default)]
pub struct FindOptions<'a> {
    /// Yield at most this many matches; `0` means all. The limit is soft:
    /// the driver may evaluate slightly past it but never yields more.
    pub max_hits: usize,
    /// Traversal order of the target, which fixes result order.
    pub traversal: Traversal,
    /// Prebuilt attribute cache; without one the same queries run by
    /// on-demand traversal.
    pub cache: Option<&'a TreeCache>,
    /// Taxon id to name mapping used by lineage constraints.
    pub namer: Option<&'a TaxonNamer>,
}

/// Finds every target node whose rooted subtree satisfies the pattern.
///
/// Returns a lazy sequence; advancing it does the single-part topology
/// work on demand. Fatal constraint failures (type errors) abort here.
pub fn find_match<'p, 't>(
    pattern: &'p Pattern,
    tree: &'t Tree,
    options: &FindOptions<'_>,
) -> Result<Matches<'p, 't>, EvalError> {
    let attrs = options
        .cache
        .map_or(AttrSource::Direct, AttrSource::Cached);
    let ctx = matrix::eval_ctx(tree, attrs, options.namer);
    let matrix = LocalMatrix::build(pattern, tree, &ctx)?;
    let split = split::split(pattern);
    #[cfg(feature = "tracing")]
    tracing::debug!(
        parts = split.parts.len(),
        groups = split.groups.len(),
        target_nodes = tree.len(),
        "compiled query plan"
    );
    let search = Search {
        pattern,
        tree,
        matrix,
        split,
    };

    if let Some(extremal) = pattern.extremal_node() {
        let ids = extremal_fold(&search, extremal, &ctx, options)?;
        return Ok(Matches::ready(tree, ids, options.max_hits));
    }
    if search.split.parts.len() > 1 {
        let ids = stitch_parts(&search, options);
        return Ok(Matches::ready(tree, ids, options.max_hits));
    }
    Ok(Matches {
        inner: Inner::Stream {
            walk: tree.traverse(options.traversal),
            search,
            remaining: hit_budget(options.max_hits),
        },
    })
}

impl Pattern {
    /// Convenience wrapper around [`find_match`].
    pub fn find_match<'p, 't>(
        &'p self,
        tree: &'t Tree,
        options: &FindOptions<'_>,
    ) -> Result<Matches<'p, 't>, EvalError> {
        find_match(self, tree, options)
    }
}

/// Lazy sequence of matching target nodes.
pub struct Matches<'p, 't> {
    inner: Inner<'p, 't>,
}

struct Search<'p, 't> {
    pattern: &'p Pattern,
    tree: &'t Tree,
    matrix: LocalMatrix,
    split: SplitPattern,
}

impl<'p, 't> Search<'p, 't> {
    fn matcher(&self) -> TopologyMatcher<'_, 't> {
        TopologyMatcher {
            pattern: self.pattern,
            kids: &self.split.kids,
            matrix: &self.matrix,
            tree: self.tree,
        }
    }
}

enum Inner<'p, 't> {
    Stream {
        search: Search<'p, 't>,
        walk: Traverse<'t>,
        remaining: Option<usize>,
    },
    Ready {
        tree: &'t Tree,
        ids: std::vec::IntoIter<NodeId>,
    },
}

impl<'p, 't> Matches<'p, 't> {
    fn ready(tree: &'t Tree, mut ids: Vec<NodeId>, max_hits: usize) -> Self {
        if max_hits > 0 {
            ids.truncate(max_hits);
        }
        Self {
            inner: Inner::Ready {
                tree,
                ids: ids.into_iter(),
            },
        }
    }
}

impl<'p, 't> Iterator for Matches<'p, 't> {
    type Item = Node<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            Inner::Stream {
                search,
                walk,
                remaining,
            } => {
                if *remaining == Some(0) {
                    return None;
                }
                let part = search.split.parts[0];
                for node in walk.by_ref() {
                    if search.matcher().matches(part, node.id()) {
                        if let Some(left) = remaining {
                            *left -= 1;
                        }
                        return Some(node);
                    }
                }
                None
            }
            Inner::Ready { tree, ids } => ids.next().map(|id| tree.node(id)),
        }
    }
}

fn hit_budget(max_hits: usize) -> Option<usize> {
    (max_hits > 0).then_some(max_hits)
}

/// Whole-pattern matches for every part, stitched through the ancestor
/// groups: a tuple holds when the group LCAs form a nested chain, and the
/// outermost LCA is the reported node.
fn stitch_parts(search: &Search<'_, '_>, options: &FindOptions<'_>) -> Vec<NodeId> {
    let tree = search.tree;
    let matcher = search.matcher();
    let parts = &search.split.parts;
    let mut roots: Vec<Vec<NodeId>> = Vec::with_capacity(parts.len());
    for &part in parts {
        let found: Vec<NodeId> = tree
            .traverse(options.traversal)
            .filter(|node| matcher.matches(part, node.id()))
            .map(|node| node.id())
            .collect();
        if found.is_empty() {
            return Vec::new();
        }
        roots.push(found);
    }
    #[cfg(feature = "tracing")]
    tracing::trace!(
        tuples = roots.iter().map(Vec::len).product::<usize>(),
        "stitching sub-pattern matches"
    );

    let mut seen = BitSet::new();
    let mut hits = Vec::new();
    let mut odometer = vec![0usize; roots.len()];
    'tuples: loop {
        let tuple: Vec<NodeId> = odometer
            .iter()
            .enumerate()
            .map(|(part, &idx)| roots[part][idx])
            .collect();
        if distinct(&tuple) {
            if let Some(reported) = stitched_match(search, &tuple) {
                if !seen.contains(reported) {
                    seen.insert(reported);
                    hits.push(reported);
                }
            }
        }
        // advance the odometer
        for pos in (0..odometer.len()).rev() {
            odometer[pos] += 1;
            if odometer[pos] < roots[pos].len() {
                continue 'tuples;
            }
            odometer[pos] = 0;
        }
        break;
    }

    order_by_traversal(tree, hits, options.traversal)
}

fn distinct(tuple: &[NodeId]) -> bool {
    tuple
        .iter()
        .enumerate()
        .all(|(i, a)| tuple[i + 1..].iter().all(|b| a != b))
}

fn stitched_match(search: &Search<'_, '_>, tuple: &[NodeId]) -> Option<NodeId> {
    let tree = search.tree;
    let groups = &search.split.groups;
    if groups.is_empty() {
        return tree.common_ancestor(tuple);
    }
    let mut lcas = Vec::with_capacity(groups.len());
    for group in groups {
        let members: Vec<NodeId> = group.members.iter().map(|&part| tuple[part]).collect();
        lcas.push(tree.common_ancestor(&members)?);
    }
    // outermost first: each LCA must contain the next
    let consistent = lcas
        .windows(2)
        .all(|pair| tree.is_ancestor(pair[0], pair[1]));
    consistent.then(|| lcas[0])
}

fn order_by_traversal(tree: &Tree, mut ids: Vec<NodeId>, traversal: Traversal) -> Vec<NodeId> {
    let mut position = vec![0usize; tree.len()];
    for (index, node) in tree.traverse(traversal).enumerate() {
        position[node.id()] = index;
    }
    ids.sort_by_key(|&id| position[id]);
    ids
}

/// Extremal (`[:all_nodes:]`) driver path: collect full matches, then keep
/// the single candidate that beats every incumbent pairwise.
fn extremal_fold(
    search: &Search<'_, '_>,
    extremal: usize,
    ctx: &crate::constraint::EvalCtx<'_, '_>,
    options: &FindOptions<'_>,
) -> Result<Vec<NodeId>, EvalError> {
    let matcher = search.matcher();
    let part = search.split.parts[0];
    let clauses: Vec<_> = search
        .pattern
        .node(extremal)
        .clauses
        .iter()
        .filter(|clause| clause.extremal)
        .collect();

    let mut best: Option<NodeId> = None;
    for node in search.tree.traverse(options.traversal) {
        if !matcher.matches(part, node.id()) {
            continue;
        }
        let Some(incumbent) = best else {
            best = Some(node.id());
            continue;
        };
        let mut beats = true;
        for clause in &clauses {
            match ctx.eval_bool(clause, Binding::extremal(node.id(), incumbent)) {
                Ok(value) => beats &= value,
                Err(err) if err.is_fatal() => return Err(err),
                Err(_) => beats = false,
            }
            if !beats {
                break;
            }
        }
        if beats {
            best = Some(node.id());
        }
    }
    Ok(best.into_iter().collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cache::build_cache;
    use crate::pattern::PatternOptions;

    fn compile(text: &str) -> Pattern {
        Pattern::compile(text, &PatternOptions::default()).expect("should compile")
    }

    fn names(pattern: &str, tree: &Tree, options: &FindOptions<'_>) -> Vec<String> {
        compile(pattern)
            .find_match(tree, options)
            .expect("should match")
            .map(|node| node.name().to_owned())
            .collect()
    }

    #[test]
    fn test_exact_topology_query() {
        let tree = Tree::from_newick("((hello,(1,2,3)kk)pasa);").expect("should parse");
        assert_eq!(
            names("(hello,kk);", &tree, &FindOptions::default()),
            ["pasa"]
        );
    }

    #[test]
    fn test_intermediate_queries() {
        let matched = |pattern: &str, tree: &str| {
            let tree = Tree::from_newick(tree).expect("should parse");
            !names(pattern, &tree, &FindOptions::default()).is_empty()
        };
        assert!(matched("((c)+)a;", "((d,c)b)a;"));
        assert!(!matched("((c)+)a;", "((c,g)a);"));
        assert!(matched("((c)*)a;", "((c,g)a);"));
    }

    #[test]
    fn test_repeat_counts_query() {
        let tree =
            Tree::from_newick("((a,a,b,c)p1,(b,c)p2)p5;").expect("should parse");
        assert_eq!(
            names("('a{2,2}','b','c')'p1';", &tree, &FindOptions::default()),
            ["p1"]
        );
        assert!(names("('a{3,3}',b,c)p1;", &tree, &FindOptions::default()).is_empty());
    }

    fn species_tree() -> Tree {
        let mut tree = Tree::from_newick(
            "((((Human_1,Chimp_1),(Human_2,(Chimp_2,Chimp_3))),((Fish_1,(Human_3,Fish_3)),Yeast_2)),Yeast_1);",
        )
        .expect("should parse");
        tree.infer_species_from_prefix();
        tree
    }

    #[test]
    fn test_contains_leaves_query() {
        let tree = species_tree();
        let pattern = compile("'contains_leaves(@, [\"Chimp_2\", \"Chimp_3\"])';");
        let hits: Vec<NodeId> = pattern
            .find_match(&tree, &FindOptions::default())
            .expect("should match")
            .map(|node| node.id())
            .collect();
        // the ancestor of both chimps and its ancestors up to the root
        assert_eq!(hits.len(), 5);
        assert_eq!(hits[0], tree.root_id());
        let innermost = tree.node(*hits.last().expect("has hits"));
        let mut leaves: Vec<_> = innermost
            .descendants()
            .filter(|n| n.is_leaf())
            .map(|n| n.name().to_owned())
            .collect();
        leaves.sort();
        assert_eq!(leaves, ["Chimp_2", "Chimp_3"]);
        for hit in &hits {
            assert!(tree.is_ancestor(*hit, innermost.id()));
        }
    }

    #[test]
    fn test_contains_species_query() {
        let tree = species_tree();
        let with_both = names(
            "'contains_species(@, [\"Chimp\", \"Fish\"])';",
            &tree,
            &FindOptions::default(),
        );
        // only the root and the node spanning both sides hold chimp and fish
        assert_eq!(with_both.len(), 2);
    }

    #[test]
    fn test_loose_connection_query() {
        let tree = Tree::from_newick("(((G,((B,Z),A)),(D,G)),C);").expect("should parse");
        let pattern = compile("(((B,Z)^,G),C)^;");
        let hits: Vec<NodeId> = pattern
            .find_match(&tree, &FindOptions::default())
            .expect("should match")
            .map(|node| node.id())
            .collect();
        assert_eq!(hits, [tree.root_id()]);
    }

    #[test]
    fn test_loose_connection_requires_every_part() {
        // without a Z leaf one detached sub-pattern has no match at all
        let tree = Tree::from_newick("(((G,(B,A)),(D,G)),C);").expect("should parse");
        let pattern = compile("(((B,Z)^,G),C)^;");
        let hits: Vec<NodeId> = pattern
            .find_match(&tree, &FindOptions::default())
            .expect("should match")
            .map(|node| node.id())
            .collect();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_extremal_queries() {
        let mut tree = Tree::from_newick("((c,g)b,(d,e)x)a;").expect("should parse");
        let dists = [
            ("a", 1.0),
            ("b", 4.0),
            ("c", 2.5),
            ("g", 0.25),
            ("x", 3.0),
            ("d", 9.5),
            ("e", 0.5),
        ];
        for (name, dist) in dists {
            let id = tree
                .traverse(Traversal::Preorder)
                .find(|n| n.name() == name)
                .expect("should exist")
                .id();
            tree.set_dist(id, dist);
        }
        assert_eq!(
            names("'@.dist > [:all_nodes:].dist';", &tree, &FindOptions::default()),
            ["d"]
        );
        assert_eq!(
            names("'@.dist < [:all_nodes:].dist';", &tree, &FindOptions::default()),
            ["g"]
        );
    }

    #[test]
    fn test_max_hits_truncates() {
        let tree = species_tree();
        let options = FindOptions {
            max_hits: 2,
            ..FindOptions::default()
        };
        let pattern = "'contains_leaves(@, [\"Chimp_2\", \"Chimp_3\"])';";
        assert_eq!(names(pattern, &tree, &options).len(), 2);
        // zero means all
        assert_eq!(names(pattern, &tree, &FindOptions::default()).len(), 5);
    }

    #[test]
    fn test_traversal_orders() {
        let tree = species_tree();
        let pattern = compile("'contains_leaves(@, [\"Chimp_2\", \"Chimp_3\"])';");
        let ids = |traversal: Traversal| -> Vec<NodeId> {
            pattern
                .find_match(
                    &tree,
                    &FindOptions {
                        traversal,
                        ..FindOptions::default()
                    },
                )
                .expect("should match")
                .map(|n| n.id())
                .collect()
        };
        let pre = ids(Traversal::Preorder);
        let mut post = ids(Traversal::Postorder);
        // this chain of ancestors comes out innermost-first under postorder
        post.reverse();
        assert_eq!(pre, post);
        assert_eq!(ids(Traversal::Levelorder), pre);
    }

    #[test]
    fn test_cache_equivalence() {
        let tree = species_tree();
        let cache = build_cache(&tree);
        for pattern in [
            "'contains_leaves(@, [\"Chimp_2\", \"Chimp_3\"])';",
            "'n_species(@) > 2';",
            "(hello,kk);",
        ] {
            let without = names(pattern, &tree, &FindOptions::default());
            let with = names(
                pattern,
                &tree,
                &FindOptions {
                    cache: Some(&cache),
                    ..FindOptions::default()
                },
            );
            assert_eq!(without, with, "cache must not change results of {pattern}");
        }
    }

    #[test]
    fn test_deterministic_repeats() {
        let tree = species_tree();
        let pattern = "'n_leaves(@) > 1';";
        let first = names(pattern, &tree, &FindOptions::default());
        for _ in 0..3 {
            assert_eq!(names(pattern, &tree, &FindOptions::default()), first);
        }
    }

    #[test]
    fn test_type_error_aborts_query() {
        let tree = species_tree();
        let pattern = compile("'@.name > 1';");
        assert!(pattern.find_match(&tree, &FindOptions::default()).is_err());
    }

    #[test]
    fn test_compile_print_recompile_equivalence() {
        let tree = Tree::from_newick("((d,c)b)a;").expect("should parse");
        for text in ["((c)+)a;", "(d,c);", "('c, @.dist == 1')'b';"] {
            let pattern = compile(text);
            let reparsed = compile(&pattern.to_text());
            let original: Vec<NodeId> = pattern
                .find_match(&tree, &FindOptions::default())
                .expect("should match")
                .map(|n| n.id())
                .collect();
            let round_tripped: Vec<NodeId> = reparsed
                .find_match(&tree, &FindOptions::default())
                .expect("should match")
                .map(|n| n.id())
                .collect();
            assert_eq!(original, round_tripped, "round trip changed {text}");
        }
    }

    #[test]
    fn test_matches_come_out_in_traversal_order() {
        let tree = species_tree();
        let pattern = compile("'n_leaves(@) > 1';");
        let hits: Vec<NodeId> = pattern
            .find_match(&tree, &FindOptions::default())
            .expect("should match")
            .map(|n| n.id())
            .collect();
        let order: Vec<NodeId> = tree.traverse(Traversal::Preorder).map(|n| n.id()).collect();
        let positions: Vec<usize> = hits
            .iter()
            .map(|id| order.iter().position(|o| o == id).expect("hit is a node"))
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    }
}

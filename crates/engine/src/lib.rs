// SPDX-License-Identifier: MIT OR Apache-2.0

/*!
This crate is the core matching engine for cladegrep.

It compiles tree patterns - parenthesized trees whose node labels carry
constraint expressions and structural metacharacters - and searches target
phylogenetic trees for subtrees satisfying them:

- [`Tree`] parses and owns a target tree ([`Tree::from_newick`]);
- [`build_cache`] precomputes per-node descendant sets so constraint
  shortcuts avoid re-traversal;
- [`Pattern::compile`] turns pattern text into an executable pattern;
- [`find_match`] streams the target nodes whose rooted subtree satisfies
  the pattern, in a chosen traversal order.

# Example

```rust
use cladegrep_engine::{FindOptions, Pattern, PatternOptions, Tree, find_match};

let tree = Tree::from_newick("((hello,(1,2,3)kk)pasa);").unwrap();
let pattern = Pattern::compile("(hello, kk);", &PatternOptions::default()).unwrap();
let hits: Vec<_> = find_match(&pattern, &tree, &FindOptions::default())
    .unwrap()
    .map(|node| node.name().to_owned())
    .collect();
assert_eq!(hits, ["pasa"]);
```
*/

pub mod cache;
pub mod constraint;
pub mod find;
pub mod newick;
pub mod pattern;
pub mod tree;

pub(crate) mod match_tree;
pub(crate) mod matrix;
pub(crate) mod split;

pub use cache::{TreeCache, build_cache};
pub use constraint::{EvalError, ExprError, TaxonNamer};
pub use find::{FindOptions, Matches, find_match};
pub use newick::NewickError;
pub use pattern::{Pattern, PatternError, PatternOptions};
pub use tree::{EvolEvent, Node, NodeId, Traversal, Traverse, Tree};

#[cfg(test)]
mod test {
    use super::*;

    fn hits(pattern: &str, tree: &str) -> Vec<String> {
        let tree = Tree::from_newick(tree).expect("should parse tree");
        let pattern =
            Pattern::compile(pattern, &PatternOptions::default()).expect("should compile");
        find_match(&pattern, &tree, &FindOptions::default())
            .expect("should match")
            .map(|node| node.name().to_owned())
            .collect()
    }

    #[test]
    fn test_end_to_end_exact() {
        assert_eq!(hits("(hello, kk);", "((hello,(1,2,3)kk)pasa);"), ["pasa"]);
    }

    #[test]
    fn test_end_to_end_intermediates() {
        assert_eq!(hits("((c)+)a;", "((d,c)b)a;"), ["a"]);
        assert!(hits("((c)+)a;", "((c,g)a);").is_empty());
        assert_eq!(hits("((c)*)a;", "((c,g)a);"), ["a"]);
    }

    #[test]
    fn test_end_to_end_constraint() {
        let tree = "((Human_A:1,Human_B:3)x,(Rat_C:2)y)r;";
        assert_eq!(
            hits("'@.is_leaf() and @.dist > 1.5';", tree),
            ["Human_B", "Rat_C"]
        );
    }
}

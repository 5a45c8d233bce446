// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Target Tree Representation and Navigation
//!
//! Core types for representing and navigating the labeled rooted trees that
//! patterns are matched against.
//!
//! ## Key Types
//!
//! - [`Tree`] - Arena that owns every node of one rooted tree
//! - [`Node`] - A lightweight handle to a single node, borrowing the arena
//! - [`Traversal`] - The three supported visit orders
//! - [`EvolEvent`] - Annotated evolutionary event type of a node
//!
//! ## Ownership
//!
//! The tree owns its nodes in a dense `Vec` indexed by [`NodeId`]; everything
//! else (matchers, caches, iterators) borrows. Parent links are a lookup
//! relation inside the arena, not ownership. Node ids are assigned in
//! insertion order and stay dense, which lets caches and match matrices use
//! bitmaps indexed by id.
//!
//! ## Usage
//!
//! ```rust
//! use cladegrep_engine::{Tree, Traversal};
//!
//! let tree = Tree::from_newick("((hello,(1,2,3)kk)pasa);").unwrap();
//! for node in tree.traverse(Traversal::Preorder) {
//!     println!("{} dist={}", node.name(), node.dist());
//! }
//! ```

use std::collections::VecDeque;
use std::str::FromStr;

/// Dense index of a node inside its [`Tree`] arena.
pub type NodeId = usize;

/// Evolutionary event annotated on a node, when known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvolEvent {
    Duplication,
    Speciation,
    Leaf,
}

impl EvolEvent {
    /// One-letter code used in annotations (`D`, `S`, `L`).
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Duplication => "D",
            Self::Speciation => "S",
            Self::Leaf => "L",
        }
    }

    pub(crate) fn from_code(code: &str) -> Option<Self> {
        match code {
            "D" => Some(Self::Duplication),
            "S" => Some(Self::Speciation),
            "L" => Some(Self::Leaf),
            _ => None,
        }
    }
}

/// Visit order for [`Tree::traverse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Traversal {
    #[default]
    Preorder,
    Postorder,
    Levelorder,
}

impl FromStr for Traversal {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preorder" => Ok(Self::Preorder),
            "postorder" => Ok(Self::Postorder),
            "levelorder" => Ok(Self::Levelorder),
            _ => Err("invalid traversal, valid options are: preorder, postorder, levelorder"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NodeData {
    pub(crate) name: String,
    pub(crate) dist: f64,
    pub(crate) support: f64,
    pub(crate) species: Option<String>,
    pub(crate) lineage: Vec<u64>,
    pub(crate) evoltype: Option<EvolEvent>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl NodeData {
    pub(crate) fn named(name: String) -> Self {
        Self {
            name,
            dist: 1.0,
            support: 1.0,
            species: None,
            lineage: Vec::new(),
            evoltype: None,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// A rooted tree of labeled nodes, stored as a dense arena.
///
/// Node ids are assigned in the order nodes are pushed and never change,
/// so a `NodeId` handed out by one tree must not be used with another.
/// The matching engine treats a `Tree` as structurally immutable: every
/// matcher entry point takes `&Tree`, and the attribute annotations
/// (`set_species` etc.) are only meant for the build phase.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl Tree {
    pub(crate) fn from_nodes(nodes: Vec<NodeData>, root: NodeId) -> Self {
        Self { nodes, root }
    }

    /// Number of nodes in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The root node.
    #[must_use]
    pub fn root(&self) -> Node<'_> {
        Node {
            tree: self,
            id: self.root,
        }
    }

    #[must_use]
    pub const fn root_id(&self) -> NodeId {
        self.root
    }

    /// Handle to the node with the given id.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this tree.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Node<'_> {
        assert!(id < self.nodes.len(), "node id out of range");
        Node { tree: self, id }
    }

    pub(crate) fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id]
    }

    /// Iterate all nodes in the requested order.
    pub fn traverse(&self, order: Traversal) -> Traverse<'_> {
        Traverse::new(self, self.root, order)
    }

    /// Iterate the subtree rooted at `id` in the requested order.
    pub fn traverse_from(&self, id: NodeId, order: Traversal) -> Traverse<'_> {
        Traverse::new(self, id, order)
    }

    /// Least common ancestor of the given nodes.
    ///
    /// Returns `None` for an empty slice. A single node is its own ancestor.
    #[must_use]
    pub fn common_ancestor(&self, ids: &[NodeId]) -> Option<NodeId> {
        let (&first, rest) = ids.split_first()?;
        let mut lca = first;
        for &id in rest {
            lca = self.lca_pair(lca, id);
        }
        Some(lca)
    }

    fn depth(&self, mut id: NodeId) -> usize {
        let mut depth = 0;
        while let Some(parent) = self.nodes[id].parent {
            id = parent;
            depth += 1;
        }
        depth
    }

    fn lca_pair(&self, mut a: NodeId, mut b: NodeId) -> NodeId {
        let (mut da, mut db) = (self.depth(a), self.depth(b));
        while da > db {
            a = self.nodes[a].parent.expect("depth accounted for parent");
            da -= 1;
        }
        while db > da {
            b = self.nodes[b].parent.expect("depth accounted for parent");
            db -= 1;
        }
        while a != b {
            a = self.nodes[a].parent.expect("nodes share a root");
            b = self.nodes[b].parent.expect("nodes share a root");
        }
        a
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(id) = cur {
            if id == ancestor {
                return true;
            }
            cur = self.nodes[id].parent;
        }
        false
    }

    /// Annotate the species of one node.
    pub fn set_species(&mut self, id: NodeId, species: impl Into<String>) {
        self.nodes[id].species = Some(species.into());
    }

    /// Derive species labels for all leaves from their names.
    ///
    /// The closure returns `None` to leave a leaf unannotated.
    pub fn infer_species<F>(&mut self, namer: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for data in &mut self.nodes {
            if data.children.is_empty() {
                data.species = namer(&data.name);
            }
        }
    }

    /// Species naming used throughout the test corpus: the part of the leaf
    /// name before the first underscore (`Homo_1` -> `Homo`).
    pub fn infer_species_from_prefix(&mut self) {
        self.infer_species(|name| name.split('_').next().map(str::to_owned));
    }

    pub fn set_evoltype(&mut self, id: NodeId, event: EvolEvent) {
        self.nodes[id].evoltype = Some(event);
    }

    pub fn set_support(&mut self, id: NodeId, support: f64) {
        self.nodes[id].support = support;
    }

    pub fn set_dist(&mut self, id: NodeId, dist: f64) {
        self.nodes[id].dist = dist;
    }

    pub fn set_lineage(&mut self, id: NodeId, lineage: Vec<u64>) {
        self.nodes[id].lineage = lineage;
    }
}

/// A single node of a [`Tree`].
///
/// Handles are `Copy` and borrow the arena, so they are cheap to pass
/// around and cannot outlive their tree.
#[derive(Clone, Copy)]
pub struct Node<'t> {
    tree: &'t Tree,
    id: NodeId,
}

impl<'t> Node<'t> {
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub const fn tree(&self) -> &'t Tree {
        self.tree
    }

    #[must_use]
    pub fn name(&self) -> &'t str {
        &self.tree.data(self.id).name
    }

    #[must_use]
    pub fn dist(&self) -> f64 {
        self.tree.data(self.id).dist
    }

    #[must_use]
    pub fn support(&self) -> f64 {
        self.tree.data(self.id).support
    }

    #[must_use]
    pub fn species(&self) -> Option<&'t str> {
        self.tree.data(self.id).species.as_deref()
    }

    #[must_use]
    pub fn lineage(&self) -> &'t [u64] {
        &self.tree.data(self.id).lineage
    }

    #[must_use]
    pub fn evoltype(&self) -> Option<EvolEvent> {
        self.tree.data(self.id).evoltype
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.tree.data(self.id).children.is_empty()
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.tree.data(self.id).parent.is_none()
    }

    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let parent = self.tree.data(self.id).parent?;
        Some(Node {
            tree: self.tree,
            id: parent,
        })
    }

    pub fn children(&self) -> impl ExactSizeIterator<Item = Node<'t>> + '_ {
        self.tree.data(self.id).children.iter().map(|&id| Node {
            tree: self.tree,
            id,
        })
    }

    #[must_use]
    pub fn child(&self, nth: usize) -> Option<Self> {
        let id = *self.tree.data(self.id).children.get(nth)?;
        Some(Node {
            tree: self.tree,
            id,
        })
    }

    #[must_use]
    pub fn n_children(&self) -> usize {
        self.tree.data(self.id).children.len()
    }

    /// All ancestors of `self`, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = Node<'t>> + '_ {
        let tree = self.tree;
        let mut cur = self.tree.data(self.id).parent;
        std::iter::from_fn(move || {
            let id = cur?;
            cur = tree.data(id).parent;
            Some(Node { tree, id })
        })
    }

    /// Preorder iterator over the subtree rooted at `self`.
    pub fn descendants(&self) -> Traverse<'t> {
        Traverse::new(self.tree, self.id, Traversal::Preorder)
    }
}

impl std::fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node({}, {:?})", self.id, self.name())
    }
}

impl PartialEq for Node<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

impl Eq for Node<'_> {}

/// Demand-driven traversal over a subtree.
///
/// Preorder and postorder keep an explicit stack, level order a queue;
/// no recursion is held across `next` calls.
pub struct Traverse<'t> {
    tree: &'t Tree,
    order: Traversal,
    // preorder/levelorder: pending nodes; postorder: (node, children_emitted)
    stack: Vec<(NodeId, bool)>,
    queue: VecDeque<NodeId>,
}

impl<'t> Traverse<'t> {
    fn new(tree: &'t Tree, start: NodeId, order: Traversal) -> Self {
        let mut stack = Vec::new();
        let mut queue = VecDeque::new();
        match order {
            Traversal::Preorder | Traversal::Postorder => stack.push((start, false)),
            Traversal::Levelorder => queue.push_back(start),
        }
        Self {
            tree,
            order,
            stack,
            queue,
        }
    }
}

impl<'t> Iterator for Traverse<'t> {
    type Item = Node<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = match self.order {
            Traversal::Preorder => {
                let (id, _) = self.stack.pop()?;
                for &child in self.tree.data(id).children.iter().rev() {
                    self.stack.push((child, false));
                }
                id
            }
            Traversal::Postorder => loop {
                let (id, expanded) = self.stack.pop()?;
                if expanded || self.tree.data(id).children.is_empty() {
                    break id;
                }
                self.stack.push((id, true));
                for &child in self.tree.data(id).children.iter().rev() {
                    self.stack.push((child, false));
                }
            },
            Traversal::Levelorder => {
                let id = self.queue.pop_front()?;
                self.queue.extend(self.tree.data(id).children.iter().copied());
                id
            }
        };
        Some(Node {
            tree: self.tree,
            id,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> Tree {
        Tree::from_newick("((d,c)b)a;").expect("should parse")
    }

    fn names<'a>(iter: impl Iterator<Item = Node<'a>>) -> Vec<String> {
        iter.map(|n| n.name().to_owned()).collect()
    }

    #[test]
    fn test_preorder() {
        let tree = sample();
        assert_eq!(names(tree.traverse(Traversal::Preorder)), ["a", "b", "d", "c"]);
    }

    #[test]
    fn test_postorder() {
        let tree = sample();
        assert_eq!(names(tree.traverse(Traversal::Postorder)), ["d", "c", "b", "a"]);
    }

    #[test]
    fn test_levelorder() {
        let tree = Tree::from_newick("((a,b)x,(c)y)r;").expect("should parse");
        assert_eq!(
            names(tree.traverse(Traversal::Levelorder)),
            ["r", "x", "y", "a", "b", "c"]
        );
    }

    #[test]
    fn test_root_and_leaves() {
        let tree = sample();
        let root = tree.root();
        assert!(root.is_root());
        assert!(!root.is_leaf());
        assert_eq!(root.name(), "a");
        let leaves: Vec<_> = tree
            .traverse(Traversal::Preorder)
            .filter(Node::is_leaf)
            .collect();
        assert_eq!(names(leaves.into_iter()), ["d", "c"]);
    }

    #[test]
    fn test_ancestors() {
        let tree = sample();
        let c = tree
            .traverse(Traversal::Preorder)
            .find(|n| n.name() == "c")
            .expect("should exist");
        assert_eq!(names(c.ancestors()), ["b", "a"]);
    }

    #[test]
    fn test_common_ancestor() {
        let tree = Tree::from_newick("(((g1,g2)g,h)x,(i,j)y)r;").expect("should parse");
        let by_name = |name: &str| {
            tree.traverse(Traversal::Preorder)
                .find(|n| n.name() == name)
                .expect("should exist")
                .id()
        };
        let lca = tree
            .common_ancestor(&[by_name("g1"), by_name("h")])
            .expect("should have lca");
        assert_eq!(tree.node(lca).name(), "x");
        let lca = tree
            .common_ancestor(&[by_name("g1"), by_name("j")])
            .expect("should have lca");
        assert_eq!(tree.node(lca).name(), "r");
        assert_eq!(tree.common_ancestor(&[]), None);
        assert_eq!(tree.common_ancestor(&[by_name("g")]), Some(by_name("g")));
    }

    #[test]
    fn test_is_ancestor() {
        let tree = sample();
        let root = tree.root_id();
        let leaf = tree
            .traverse(Traversal::Preorder)
            .find(|n| n.name() == "c")
            .expect("should exist")
            .id();
        assert!(tree.is_ancestor(root, leaf));
        assert!(tree.is_ancestor(leaf, leaf));
        assert!(!tree.is_ancestor(leaf, root));
    }

    #[test]
    fn test_species_inference() {
        let mut tree = Tree::from_newick("((Homo_1,Pan_2)x,Homo_3)r;").expect("should parse");
        tree.infer_species_from_prefix();
        let species: Vec<_> = tree
            .traverse(Traversal::Preorder)
            .filter(|n| n.is_leaf())
            .map(|n| n.species().expect("leaf should have species").to_owned())
            .collect();
        assert_eq!(species, ["Homo", "Pan", "Homo"]);
        assert!(tree.root().species().is_none());
    }

    #[test]
    fn test_traversal_from_str() {
        assert_eq!("preorder".parse(), Ok(Traversal::Preorder));
        assert_eq!("levelorder".parse(), Ok(Traversal::Levelorder));
        assert!("inorder".parse::<Traversal>().is_err());
    }
}

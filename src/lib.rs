//! Cladegrep - structural pattern matching for phylogenetic trees.
//!
//! This is the main library crate that re-exports the matching engine from
//! the workspace.

// Re-export the engine as a module
pub use cladegrep_engine as engine;

// And its everyday surface at the crate root
pub use cladegrep_engine::{
    EvalError, EvolEvent, FindOptions, Matches, NewickError, Node, NodeId, Pattern, PatternError,
    PatternOptions, TaxonNamer, Traversal, Tree, TreeCache, build_cache, find_match,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

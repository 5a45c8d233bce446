// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Pattern Compilation
//!
//! Turns a parenthesized pattern string into a tree of constraint nodes the
//! matcher can execute.
//!
//! ## Key Types
//!
//! - [`Pattern`] - The compiled pattern: a dense arena of [`PatternNode`]s
//! - [`PatternOptions`] - Compile options (`quoted_labels`, informational
//!   tree format)
//! - [`PatternError`] - Compile-time failures
//!
//! ## Labels
//!
//! A node label carries constraint text plus structural metacharacters,
//! stripped during compilation:
//!
//! | symbol    | meaning                                               |
//! |-----------|-------------------------------------------------------|
//! | `+`       | vertical chain / repeat, one or more                  |
//! | `*`       | vertical chain / repeat, zero or more                 |
//! | `?`       | zero or one                                           |
//! | `{m,n}`   | bounded count (`{m}`, `{m,}`, `{,n}` also accepted)   |
//! | `^` lead  | on an internal node: children are loosely connected   |
//! | `^` trail | after a constraint (or on a leaf): require the root   |
//! | `$` trail | require a leaf                                        |
//!
//! On a pattern node with children the bounds describe the length of the
//! vertical chain of target nodes the pattern node may expand to; on a
//! pattern leaf they bound how many sibling target children must match.
//!
//! The remaining text is a comma-separated conjunction of constraint
//! clauses; a clause without `@` or a set reference is shorthand for a name
//! equality test, and an empty label matches any node.

use crate::constraint::{Attr, BinOp, Constraint, Expr, ExprError, NodeRef};
use crate::newick::{self, NewickError, RawNode, quote_label};

use thiserror::Error;

/// Compile options for [`Pattern::compile`].
#[derive(Debug, Clone)]
pub struct PatternOptions {
    /// Whether labels may be quoted with `'...'` (quotes suppress the
    /// structural meaning of parentheses, commas and semicolons).
    pub quoted_labels: bool,
    /// Informational input format tag, kept for compatibility with the
    /// callers that track the subformat of their tree files.
    pub tree_format: u8,
}

impl Default for PatternOptions {
    fn default() -> Self {
        Self {
            quoted_labels: true,
            tree_format: 1,
        }
    }
}

/// Errors produced by [`Pattern::compile`].
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("malformed pattern: {0}")]
    Malformed(String),
    #[error("bad metacharacter in `{0}`: {1}")]
    BadMetacharacter(String, String),
    #[error("empty pattern")]
    Empty,
    #[error("in constraint `{0}`: {1}")]
    Constraint(String, ExprError),
}

impl From<NewickError> for PatternError {
    fn from(err: NewickError) -> Self {
        match err {
            NewickError::Empty => Self::Empty,
            other => Self::Malformed(other.to_string()),
        }
    }
}

/// One compiled node of a pattern.
#[derive(Debug, Clone)]
pub(crate) struct PatternNode {
    /// Label text with metacharacters stripped.
    pub(crate) source: String,
    /// Conjunction of compiled constraint clauses.
    pub(crate) clauses: Vec<Constraint>,
    pub(crate) min_occur: usize,
    /// `None` is unbounded.
    pub(crate) max_occur: Option<usize>,
    /// An occurrence metacharacter was present; with children this makes
    /// the node a vertical chain.
    pub(crate) has_bounds: bool,
    pub(crate) loose_children: bool,
    pub(crate) require_leaf: bool,
    pub(crate) require_root: bool,
    pub(crate) children: Vec<usize>,
}

impl PatternNode {
    /// Whether any clause is an extremal (`[:all_nodes:]`) predicate.
    pub(crate) fn is_extremal(&self) -> bool {
        self.clauses.iter().any(|c| c.extremal)
    }
}

/// A compiled pattern, applicable to many target trees.
///
/// Nodes live in a dense arena indexed in preorder; the matcher and the
/// local match matrix address them by index. Compiled patterns are never
/// mutated by matching.
#[derive(Debug, Clone)]
pub struct Pattern {
    nodes: Vec<PatternNode>,
    root: usize,
}

impl Pattern {
    /// Compiles pattern text.
    pub fn compile(text: &str, options: &PatternOptions) -> Result<Self, PatternError> {
        let raw = newick::parse_raw(text, options.quoted_labels)?;
        let mut nodes = Vec::new();
        let root = build_node(&raw, &mut nodes)?;
        let pattern = Self { nodes, root };
        if pattern.nodes.len() == 1 {
            let only = &pattern.nodes[0];
            let unconstrained = only.clauses.is_empty()
                && !only.has_bounds
                && !only.require_leaf
                && !only.require_root;
            if unconstrained {
                return Err(PatternError::Empty);
            }
        }
        Ok(pattern)
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) const fn root_id(&self) -> usize {
        self.root
    }

    pub(crate) fn node(&self, id: usize) -> &PatternNode {
        &self.nodes[id]
    }

    pub(crate) fn nodes(&self) -> impl Iterator<Item = (usize, &PatternNode)> {
        self.nodes.iter().enumerate()
    }

    /// The node carrying an extremal constraint, if any.
    pub(crate) fn extremal_node(&self) -> Option<usize> {
        self.nodes.iter().position(PatternNode::is_extremal)
    }

    /// Prints the pattern back to canonical text.
    ///
    /// Compiling the output yields a pattern with the same match set.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        self.write_node(self.root, &mut out);
        out.push(';');
        out
    }

    fn write_node(&self, id: usize, out: &mut String) {
        let node = &self.nodes[id];
        if !node.children.is_empty() {
            out.push('(');
            for (i, &child) in node.children.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                self.write_node(child, out);
            }
            out.push(')');
        }
        let mut label = String::new();
        if node.loose_children {
            label.push('^');
        }
        label.push_str(&node.source);
        if node.has_bounds {
            label.push_str(&bounds_text(node.min_occur, node.max_occur));
        }
        if node.require_leaf {
            label.push('$');
        }
        if node.require_root {
            label.push('^');
        }
        out.push_str(&quote_label(&label));
    }
}

fn bounds_text(min: usize, max: Option<usize>) -> String {
    match (min, max) {
        (1, None) => "+".to_owned(),
        (0, None) => "*".to_owned(),
        (0, Some(1)) => "?".to_owned(),
        (m, None) => format!("{{{m},}}"),
        (m, Some(n)) if m == n => format!("{{{m}}}"),
        (m, Some(n)) => format!("{{{m},{n}}}"),
    }
}

fn build_node(raw: &RawNode, nodes: &mut Vec<PatternNode>) -> Result<usize, PatternError> {
    let id = nodes.len();
    let meta = strip_metacharacters(&raw.label)?;
    let internal = !raw.children.is_empty();

    let mut clauses = Vec::new();
    for clause in split_clauses(&meta.text) {
        let clause = clause.trim();
        // a bare `@` (or nothing) constrains nothing
        if clause.is_empty() || clause == "@" {
            continue;
        }
        clauses.push(compile_clause(clause)?);
    }

    let (min_occur, max_occur) = meta.bounds.unwrap_or((1, Some(1)));
    // a caret on an internal node marks loose children; attached to a
    // non-empty constraint, or on a leaf, it demands the root
    let caret_suffix = meta.caret_suffix || (!internal && meta.caret_prefix);
    nodes.push(PatternNode {
        source: meta.text,
        clauses,
        min_occur,
        max_occur,
        has_bounds: meta.bounds.is_some(),
        loose_children: internal && (meta.caret_prefix || (meta.caret_suffix && meta.bare_caret)),
        require_leaf: meta.leaf,
        require_root: caret_suffix && !(internal && meta.bare_caret),
        children: Vec::new(),
    });
    for child in &raw.children {
        let child_id = build_node(child, nodes)?;
        nodes[id].children.push(child_id);
    }
    Ok(id)
}

fn compile_clause(clause: &str) -> Result<Constraint, PatternError> {
    let is_expression = clause.contains('@') || clause.contains("[:");
    if is_expression {
        return Constraint::compile(clause)
            .map_err(|err| PatternError::Constraint(clause.to_owned(), err));
    }
    // bareword shorthand: a plain name equality test
    Ok(Constraint {
        source: clause.to_owned(),
        expr: Expr::Binary(
            BinOp::Eq,
            Box::new(Expr::Attr(NodeRef::This, Attr::Name)),
            Box::new(Expr::Str(clause.to_owned())),
        ),
        extremal: false,
    })
}

struct Meta {
    text: String,
    bounds: Option<(usize, Option<usize>)>,
    leaf: bool,
    caret_prefix: bool,
    caret_suffix: bool,
    /// The label was nothing but metacharacters; a trailing `^` then marks
    /// loose children rather than a root requirement.
    bare_caret: bool,
}

fn strip_metacharacters(label: &str) -> Result<Meta, PatternError> {
    let mut text = label.trim();
    let mut bounds = None;
    let mut leaf = false;
    let mut caret_prefix = false;
    let mut caret_suffix = false;

    if let Some(rest) = text.strip_prefix('^') {
        caret_prefix = true;
        text = rest.trim_start();
    }
    loop {
        let trimmed = text.trim_end();
        if let Some(rest) = trimmed.strip_suffix('+') {
            set_bounds(label, &mut bounds, (1, None))?;
            text = rest;
        } else if let Some(rest) = trimmed.strip_suffix('*') {
            set_bounds(label, &mut bounds, (0, None))?;
            text = rest;
        } else if let Some(rest) = trimmed.strip_suffix('?') {
            set_bounds(label, &mut bounds, (0, Some(1)))?;
            text = rest;
        } else if let Some(rest) = trimmed.strip_suffix('$') {
            leaf = true;
            text = rest;
        } else if let Some(rest) = trimmed.strip_suffix('^') {
            caret_suffix = true;
            text = rest;
        } else if trimmed.ends_with('}') {
            let Some(open) = trimmed.rfind('{') else {
                return Err(PatternError::BadMetacharacter(
                    label.to_owned(),
                    "`}` without matching `{`".into(),
                ));
            };
            let spec = &trimmed[open + 1..trimmed.len() - 1];
            set_bounds(label, &mut bounds, parse_bounds(label, spec)?)?;
            text = &trimmed[..open];
        } else {
            break;
        }
    }

    let text = text.trim().to_owned();
    Ok(Meta {
        bare_caret: text.is_empty() && !leaf && bounds.is_none(),
        text,
        bounds,
        leaf,
        caret_prefix,
        caret_suffix,
    })
}

fn set_bounds(
    label: &str,
    bounds: &mut Option<(usize, Option<usize>)>,
    value: (usize, Option<usize>),
) -> Result<(), PatternError> {
    if bounds.is_some() {
        return Err(PatternError::BadMetacharacter(
            label.to_owned(),
            "conflicting occurrence metacharacters".into(),
        ));
    }
    *bounds = Some(value);
    Ok(())
}

fn parse_bounds(label: &str, spec: &str) -> Result<(usize, Option<usize>), PatternError> {
    let bad = |message: &str| PatternError::BadMetacharacter(label.to_owned(), message.into());
    let parse_num = |text: &str| {
        text.trim()
            .parse::<usize>()
            .map_err(|_| bad("bounds must be non-negative integers"))
    };
    let (min, max) = match spec.split_once(',') {
        None => {
            let exact = parse_num(spec)?;
            (exact, Some(exact))
        }
        Some((min, max)) => {
            let min = if min.trim().is_empty() { 0 } else { parse_num(min)? };
            let max = if max.trim().is_empty() {
                None
            } else {
                Some(parse_num(max)?)
            };
            (min, max)
        }
    };
    if let Some(max) = max {
        if min > max {
            return Err(bad("lower bound exceeds upper bound"));
        }
    }
    Ok((min, max))
}

/// Splits a label into top-level comma-separated clauses, respecting
/// strings, parentheses and brackets.
fn split_clauses(text: &str) -> Vec<&str> {
    let mut clauses = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                clauses.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    clauses.push(&text[start..]);
    clauses
}

#[cfg(test)]
mod test {
    use super::*;

    fn compile(text: &str) -> Pattern {
        Pattern::compile(text, &PatternOptions::default()).expect("should compile")
    }

    #[test]
    fn test_plain_names() {
        let pattern = compile("(hello, kk);");
        let root = pattern.node(pattern.root_id());
        assert!(root.clauses.is_empty());
        assert_eq!(root.children.len(), 2);
        assert_eq!(pattern.node(root.children[0]).source, "hello");
        assert_eq!(pattern.node(root.children[0]).min_occur, 1);
        assert_eq!(pattern.node(root.children[0]).max_occur, Some(1));
        assert!(!pattern.node(root.children[0]).has_bounds);
    }

    #[test]
    fn test_occurrence_metacharacters() {
        let pattern = compile("((c)+)a;");
        let chain = pattern.node(pattern.node(pattern.root_id()).children[0]);
        assert!(chain.has_bounds && !chain.children.is_empty());
        assert_eq!((chain.min_occur, chain.max_occur), (1, None));
        assert!(chain.source.is_empty());

        let pattern = compile("((c)*)a;");
        let chain = pattern.node(pattern.node(pattern.root_id()).children[0]);
        assert_eq!((chain.min_occur, chain.max_occur), (0, None));

        let pattern = compile("((c)?)a;");
        let chain = pattern.node(pattern.node(pattern.root_id()).children[0]);
        assert_eq!((chain.min_occur, chain.max_occur), (0, Some(1)));
    }

    #[test]
    fn test_brace_bounds() {
        let pattern = compile("('a{2,2}', b)p;");
        let repeat = pattern.node(pattern.node(pattern.root_id()).children[0]);
        assert_eq!((repeat.min_occur, repeat.max_occur), (2, Some(2)));
        assert_eq!(repeat.source, "a");
        assert!(repeat.children.is_empty());

        let pattern = compile("((c){3})a;");
        let chain = pattern.node(pattern.node(pattern.root_id()).children[0]);
        assert_eq!((chain.min_occur, chain.max_occur), (3, Some(3)));

        let pattern = compile("((c)'{2,}')a;");
        let chain = pattern.node(pattern.node(pattern.root_id()).children[0]);
        assert_eq!((chain.min_occur, chain.max_occur), (2, None));

        let pattern = compile("((c)'{,2}')a;");
        let chain = pattern.node(pattern.node(pattern.root_id()).children[0]);
        assert_eq!((chain.min_occur, chain.max_occur), (0, Some(2)));
    }

    #[test]
    fn test_bad_metacharacters() {
        let compile = |text: &str| Pattern::compile(text, &PatternOptions::default());
        assert!(matches!(
            compile("('a{2,1}')p;"),
            Err(PatternError::BadMetacharacter(..))
        ));
        assert!(matches!(
            compile("('a{x}')p;"),
            Err(PatternError::BadMetacharacter(..))
        ));
        assert!(matches!(
            compile("('a{}')p;"),
            Err(PatternError::BadMetacharacter(..))
        ));
        assert!(matches!(
            compile("('a+*')p;"),
            Err(PatternError::BadMetacharacter(..))
        ));
    }

    #[test]
    fn test_leaf_and_root_markers() {
        let pattern = compile("((c$)*)a^;");
        let root = pattern.node(pattern.root_id());
        assert!(root.require_root);
        assert!(!root.loose_children);
        let chain = pattern.node(root.children[0]);
        let c = pattern.node(chain.children[0]);
        assert!(c.require_leaf);
        assert!(!c.require_root);
    }

    #[test]
    fn test_loose_marker() {
        // a bare caret on an internal node marks loose children
        let pattern = compile("(((B,Z)^,G), C)^;");
        let root = pattern.node(pattern.root_id());
        assert!(root.loose_children);
        assert!(!root.require_root);
        let x = pattern.node(root.children[0]);
        assert!(!x.loose_children);
        let inner = pattern.node(x.children[0]);
        assert!(inner.loose_children);
        // on a leaf the same character demands the root
        let pattern = compile("((c^)*)a;");
        let chain = pattern.node(pattern.node(pattern.root_id()).children[0]);
        let c = pattern.node(chain.children[0]);
        assert!(c.require_root);
        assert!(!c.loose_children);
    }

    #[test]
    fn test_loose_prefix_with_constraint() {
        let pattern = compile("((B,Z)'^n_leaves(@) > 2',G)x;");
        let inner = pattern.node(pattern.node(pattern.root_id()).children[0]);
        assert!(inner.loose_children);
        assert!(!inner.require_root);
        assert_eq!(inner.clauses.len(), 1);
        assert_eq!(inner.clauses[0].source, "n_leaves(@) > 2");
    }

    #[test]
    fn test_constraint_clauses() {
        let pattern = compile("('c, @.dist == 1')'a, @.dist == 1';");
        let root = pattern.node(pattern.root_id());
        assert_eq!(root.clauses.len(), 2);
        assert_eq!(root.clauses[0].source, "a");
        assert_eq!(root.clauses[1].source, "@.dist == 1");
        let c = pattern.node(root.children[0]);
        assert_eq!(c.clauses.len(), 2);
    }

    #[test]
    fn test_clause_split_respects_nesting() {
        let pattern = compile("'contains_leaves(@, [\"a,b\", \"c\"]), @.dist >= 0';");
        let root = pattern.node(pattern.root_id());
        assert_eq!(root.clauses.len(), 2);
    }

    #[test]
    fn test_constraint_errors() {
        let result = Pattern::compile("'@.bogus == 1';", &PatternOptions::default());
        assert!(matches!(result, Err(PatternError::Constraint(..))));
    }

    #[test]
    fn test_empty_pattern() {
        let options = PatternOptions::default();
        assert!(matches!(
            Pattern::compile("", &options),
            Err(PatternError::Empty)
        ));
        assert!(matches!(
            Pattern::compile(";", &options),
            Err(PatternError::Empty)
        ));
    }

    #[test]
    fn test_malformed_pattern() {
        let options = PatternOptions::default();
        assert!(matches!(
            Pattern::compile("((a,b);", &options),
            Err(PatternError::Malformed(_))
        ));
    }

    #[test]
    fn test_to_text_round_trip() {
        for text in [
            "(hello,kk);",
            "((c)+)a;",
            "((c)*)a;",
            "('a{2,2}',b,c)p1;",
            "((c$)'{2,}')a^;",
            "(((B,Z)^,G),C)^;",
        ] {
            let pattern = compile(text);
            let printed = pattern.to_text();
            let reparsed = compile(&printed);
            assert_eq!(
                printed,
                reparsed.to_text(),
                "canonical text should be stable for {text}"
            );
        }
    }
}

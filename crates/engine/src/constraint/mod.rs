// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Constraint Expression Language
//!
//! The small boolean/arithmetic language attached to pattern nodes and
//! evaluated against one target node at a time.
//!
//! ## Key Types
//!
//! - [`Constraint`] - A compiled clause: source text, typed AST, and whether
//!   it is an extremal (`[:all_nodes:]`) predicate
//! - [`Expr`] - The typed AST with a closed operator set
//! - [`ExprError`] - Compile-time failures (syntax, unknown names)
//! - [`EvalCtx`] / [`EvalError`] - Run-time evaluation against a target node
//!
//! ## Language
//!
//! Terms are attributes of the distinguished target node `@` (`@.name`,
//! `@.dist`, `@.support`, `@.species`, `@.lineage`, `@.named_lineage`,
//! `@.evoltype`, `@.children[i].attr`, `@.is_leaf()`, `@.is_root()`),
//! built-in shortcut predicates (`leaves(@)`, `descendants(@)`,
//! `species(@)`, `contains_species(@, [...])`, `contains_leaves(@, [...])`,
//! `n_species(@)`, `n_leaves(@)`, `n_duplications(@)`, `n_speciations(@)`),
//! and literals (numbers, strings, lists).
//!
//! Operators: `== != < <= > >= in =~ + - * / not and or` plus unary minus.
//! `=~` matches a string attribute against a regular expression given as a
//! string literal, compiled once per pattern.
//!
//! Set references are first-class quantifiers rather than textual rewrites:
//! `[:children:]` quantifies the smallest enclosing comparison universally
//! over the direct children, `[:any_child:]` existentially, and
//! `[:all_nodes:]` turns the clause into an extremal predicate the match
//! driver folds over all candidates.

pub(crate) mod eval;
mod lexer;
mod parser;

pub use eval::{EvalError, TaxonNamer};
pub(crate) use eval::{Binding, EvalCtx};

use regex::Regex;
use thiserror::Error;

/// Errors produced while compiling a constraint clause.
#[derive(Debug, Error)]
pub enum ExprError {
    #[error("syntax error in constraint at byte {0}: {1}")]
    Syntax(usize, String),
    #[error("unknown attribute `{0}`")]
    UnknownAttribute(String),
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("invalid regular expression after `=~`: {0}")]
    BadRegex(#[from] regex::Error),
}

/// Node-valued object an attribute or predicate applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeRef {
    /// `@`, the target node under test.
    This,
    /// `@.children[i]`.
    Child(usize),
    /// The bound variable of an enclosing child quantifier.
    SetElem,
    /// The incumbent best node of an extremal fold.
    Incumbent,
}

/// Attribute of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attr {
    Name,
    Dist,
    Support,
    Species,
    Lineage,
    NamedLineage,
    Evoltype,
}

impl Attr {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "name" => Some(Self::Name),
            "dist" => Some(Self::Dist),
            "support" => Some(Self::Support),
            "species" => Some(Self::Species),
            "lineage" => Some(Self::Lineage),
            "named_lineage" => Some(Self::NamedLineage),
            "evoltype" => Some(Self::Evoltype),
            _ => None,
        }
    }
}

/// Built-in predicate over one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Func {
    IsLeaf,
    IsRoot,
    Leaves,
    Descendants,
    Species,
    NSpecies,
    NLeaves,
    NDuplications,
    NSpeciations,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "is_leaf" => Some(Self::IsLeaf),
            "is_root" => Some(Self::IsRoot),
            "leaves" => Some(Self::Leaves),
            "descendants" => Some(Self::Descendants),
            "species" => Some(Self::Species),
            "n_species" => Some(Self::NSpecies),
            "n_leaves" => Some(Self::NLeaves),
            "n_duplications" => Some(Self::NDuplications),
            "n_speciations" => Some(Self::NSpeciations),
            _ => None,
        }
    }
}

/// Built-in predicate over one node and one set argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Func2 {
    ContainsSpecies,
    ContainsLeaves,
}

impl Func2 {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "contains_species" => Some(Self::ContainsSpecies),
            "contains_leaves" => Some(Self::ContainsLeaves),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Match,
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnOp {
    Not,
    Neg,
}

/// Child-set quantifier introduced by a set reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SetQuant {
    /// `[:children:]` - every direct child (vacuously true on a leaf).
    AllChildren,
    /// `[:any_child:]` - at least one direct child (vacuously false on a leaf).
    AnyChild,
}

/// Typed constraint AST.
#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Bool(bool),
    Num(f64),
    Str(String),
    List(Vec<Expr>),
    /// Precompiled right-hand side of `=~`.
    Regex(Regex),
    Attr(NodeRef, Attr),
    Call(Func, NodeRef),
    CallWith(Func2, NodeRef, Box<Expr>),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// A comparison quantified over the target node's direct children;
    /// `NodeRef::SetElem` inside the body refers to the bound child.
    Quantified(SetQuant, Box<Expr>),
}

/// One compiled constraint clause of a pattern node.
#[derive(Debug, Clone)]
pub(crate) struct Constraint {
    pub(crate) source: String,
    pub(crate) expr: Expr,
    /// References `[:all_nodes:]`: evaluated by the driver's extremal fold
    /// instead of the local match sweep.
    pub(crate) extremal: bool,
}

impl Constraint {
    /// Compiles one clause of constraint text.
    pub(crate) fn compile(source: &str) -> Result<Self, ExprError> {
        let tokens = lexer::lex(source)?;
        let mut parser = parser::Parser::new(source, tokens);
        let expr = parser.parse()?;
        let (expr, extremal) = parser::hoist_extremal(expr);
        Ok(Self {
            source: source.to_owned(),
            expr,
            extremal,
        })
    }
}

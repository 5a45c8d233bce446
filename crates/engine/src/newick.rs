// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Parenthesized Tree Input
//!
//! Reader and writer for the nested parenthesized notation both target trees
//! and pattern skeletons arrive in.
//!
//! Two readers share one scanner:
//!
//! - [`Tree::from_newick`] builds an attributed target tree: labels, branch
//!   lengths (`:dist`), internal support values, and `[&&NHX:...]` annotation
//!   blocks for species / event / support.
//! - [`parse_raw`] builds the raw skeleton used by pattern compilation, where
//!   labels stay opaque strings (a quoted label may contain arbitrary
//!   expression text, including commas and parentheses).
//!
//! Quoting follows the usual convention: inside `'...'` the structural
//! characters `( ) , ;` lose their meaning and `''` escapes a single quote.

use crate::tree::{EvolEvent, NodeData, NodeId, Tree};

use thiserror::Error;

/// Errors produced while reading parenthesized tree text.
#[derive(Debug, Error, PartialEq)]
pub enum NewickError {
    #[error("unbalanced parenthesis at byte {0}")]
    Unbalanced(usize),
    #[error("unterminated quoted label starting at byte {0}")]
    UnterminatedQuote(usize),
    #[error("trailing input after tree at byte {0}")]
    TrailingInput(usize),
    #[error("malformed number `{1}` at byte {0}")]
    BadNumber(usize, String),
    #[error("empty tree text")]
    Empty,
}

/// Raw node of a pattern skeleton: an opaque label plus children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawNode {
    pub(crate) label: String,
    pub(crate) children: Vec<RawNode>,
}

struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
        }
    }

    fn skip_ws(&mut self) {
        while self
            .src
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Reads a quoted label; the opening quote is already consumed.
    /// `''` escapes a quote.
    fn quoted(&mut self, start: usize) -> Result<String, NewickError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(NewickError::UnterminatedQuote(start)),
                Some(b'\'') => {
                    if self.eat(b'\'') {
                        out.push('\'');
                    } else {
                        return Ok(out);
                    }
                }
                Some(b) => out.push(b as char),
            }
        }
    }

    /// Reads a bareword up to any of the given delimiters, trimmed.
    fn bareword(&mut self, delims: &[u8]) -> String {
        let start = self.pos;
        while self.peek().is_some_and(|b| !delims.contains(&b)) {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.src[start..self.pos])
            .trim()
            .to_owned()
    }

    fn number(&mut self) -> Result<f64, NewickError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'))
        {
            self.pos += 1;
        }
        let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        text.parse()
            .map_err(|_| NewickError::BadNumber(start, text))
    }

    /// One or more terminating semicolons, then nothing but whitespace.
    fn finish(&mut self) -> Result<(), NewickError> {
        self.skip_ws();
        while self.eat(b';') {
            self.skip_ws();
        }
        if self.pos < self.src.len() {
            return Err(NewickError::TrailingInput(self.pos));
        }
        Ok(())
    }
}

impl Tree {
    /// Parses a target tree from parenthesized text.
    ///
    /// Node ids are assigned in preorder. Branch lengths default to `1.0`,
    /// support values to `1.0`. A purely numeric label on an internal node is
    /// read as its support value; `[&&NHX:...]` blocks may annotate
    /// `species`/`S`, `evoltype`/`Ev` (`D`, `S`, `L`), `support`/`B` and
    /// `dist`.
    pub fn from_newick(text: &str) -> Result<Self, NewickError> {
        let mut scanner = Scanner::new(text);
        scanner.skip_ws();
        if scanner.peek().is_none() {
            return Err(NewickError::Empty);
        }
        let mut nodes = Vec::new();
        let root = parse_target_node(&mut scanner, &mut nodes, None)?;
        scanner.finish()?;
        Ok(Self::from_nodes(nodes, root))
    }

    /// Writes the tree back to canonical parenthesized text.
    ///
    /// Branch lengths equal to the default are omitted; labels are quoted
    /// when they contain structural characters.
    #[must_use]
    pub fn to_newick(&self) -> String {
        let mut out = String::new();
        write_node(self, self.root_id(), &mut out);
        out.push(';');
        out
    }
}

fn parse_target_node(
    scanner: &mut Scanner<'_>,
    nodes: &mut Vec<NodeData>,
    parent: Option<NodeId>,
) -> Result<NodeId, NewickError> {
    scanner.skip_ws();
    let id = nodes.len();
    nodes.push(NodeData::named(String::new()));
    nodes[id].parent = parent;

    let internal = scanner.peek() == Some(b'(');
    if internal {
        let open = scanner.pos;
        scanner.bump();
        loop {
            let child = parse_target_node(scanner, nodes, Some(id))?;
            nodes[id].children.push(child);
            scanner.skip_ws();
            match scanner.bump() {
                Some(b',') => {}
                Some(b')') => break,
                _ => return Err(NewickError::Unbalanced(open)),
            }
        }
    }

    scanner.skip_ws();
    // label
    let label = match scanner.peek() {
        Some(b'\'') => {
            let start = scanner.pos;
            scanner.bump();
            scanner.quoted(start)?
        }
        Some(b')') if !internal => return Err(NewickError::Unbalanced(scanner.pos)),
        _ => scanner.bareword(b"(),;:["),
    };
    if internal && !label.is_empty() && label.parse::<f64>().is_ok() {
        nodes[id].support = label.parse().expect("checked above");
    } else {
        nodes[id].name = label;
    }
    // branch length
    scanner.skip_ws();
    if scanner.eat(b':') {
        scanner.skip_ws();
        nodes[id].dist = scanner.number()?;
    }
    // NHX annotations
    scanner.skip_ws();
    if scanner.peek() == Some(b'[') {
        parse_nhx(scanner, &mut nodes[id])?;
    }
    Ok(id)
}

fn parse_nhx(scanner: &mut Scanner<'_>, data: &mut NodeData) -> Result<(), NewickError> {
    let open = scanner.pos;
    scanner.bump();
    let body = scanner.bareword(b"]");
    if !scanner.eat(b']') {
        return Err(NewickError::Unbalanced(open));
    }
    let Some(fields) = body.strip_prefix("&&NHX") else {
        // a plain comment block, ignored
        return Ok(());
    };
    for field in fields.split(':').filter(|f| !f.is_empty()) {
        let Some((key, value)) = field.split_once('=') else {
            continue;
        };
        match key {
            "species" | "S" => data.species = Some(value.to_owned()),
            "evoltype" | "Ev" => data.evoltype = EvolEvent::from_code(value),
            "support" | "B" => {
                data.support = value
                    .parse()
                    .map_err(|_| NewickError::BadNumber(open, value.to_owned()))?;
            }
            "dist" => {
                data.dist = value
                    .parse()
                    .map_err(|_| NewickError::BadNumber(open, value.to_owned()))?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn write_node(tree: &Tree, id: NodeId, out: &mut String) {
    let data = tree.data(id);
    if !data.children.is_empty() {
        out.push('(');
        for (i, &child) in data.children.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            write_node(tree, child, out);
        }
        out.push(')');
    }
    out.push_str(&quote_label(&data.name));
    if (data.dist - 1.0).abs() > f64::EPSILON {
        out.push(':');
        out.push_str(&format_float(data.dist));
    }
}

pub(crate) fn quote_label(label: &str) -> String {
    let needs_quotes = label
        .chars()
        .any(|c| matches!(c, '(' | ')' | ',' | ';' | ':' | '[' | ']' | '\'') || c.is_whitespace());
    if needs_quotes {
        format!("'{}'", label.replace('\'', "''"))
    } else {
        label.to_owned()
    }
}

pub(crate) fn format_float(value: f64) -> String {
    // shortest text that still round-trips through f64
    let mut text = format!("{value}");
    if !text.contains('.') && !text.contains('e') {
        text.push_str(".0");
    }
    text
}

/// Parses a pattern skeleton, keeping labels opaque.
///
/// With `quoted_labels` set, `'...'` regions protect structural characters;
/// otherwise quotes are ordinary label characters.
pub(crate) fn parse_raw(text: &str, quoted_labels: bool) -> Result<RawNode, NewickError> {
    let mut scanner = Scanner::new(text);
    scanner.skip_ws();
    if scanner.peek().is_none() {
        return Err(NewickError::Empty);
    }
    let root = parse_raw_node(&mut scanner, quoted_labels)?;
    scanner.finish()?;
    Ok(root)
}

fn parse_raw_node(scanner: &mut Scanner<'_>, quoted: bool) -> Result<RawNode, NewickError> {
    scanner.skip_ws();
    let mut children = Vec::new();
    if scanner.peek() == Some(b'(') {
        let open = scanner.pos;
        scanner.bump();
        loop {
            children.push(parse_raw_node(scanner, quoted)?);
            scanner.skip_ws();
            match scanner.bump() {
                Some(b',') => {}
                Some(b')') => break,
                _ => return Err(NewickError::Unbalanced(open)),
            }
        }
    }
    scanner.skip_ws();
    let label = if quoted && scanner.peek() == Some(b'\'') {
        let start = scanner.pos;
        scanner.bump();
        scanner.quoted(start)?
    } else {
        scanner.bareword(b"(),;")
    };
    Ok(RawNode { label, children })
}

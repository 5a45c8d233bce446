// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pratt parser from constraint tokens to the typed [`Expr`] AST.
//!
//! Operator precedence follows the source language of the original queries:
//! `or` < `and` < `not` < comparisons < `+ -` < `* /` < unary minus.
//! A set reference inside a comparison quantifies that comparison (the
//! smallest enclosing one); `[:all_nodes:]` references survive as
//! [`NodeRef::Incumbent`] and flag the clause as extremal.

use super::lexer::{Spanned, Token};
use super::{Attr, BinOp, Expr, ExprError, Func, Func2, NodeRef, SetQuant, UnOp};

use regex::Regex;

pub(super) struct Parser {
    tokens: Vec<Spanned>,
    idx: usize,
    len: usize,
    pending_quant: Option<SetQuant>,
}

impl Parser {
    pub(super) fn new(src: &str, tokens: Vec<Spanned>) -> Self {
        let len = src.len();
        Self {
            tokens,
            idx: 0,
            len,
            pending_quant: None,
        }
    }

    pub(super) fn parse(&mut self) -> Result<Expr, ExprError> {
        let expr = self.expr_bp(0)?;
        if let Some(spanned) = self.tokens.get(self.idx) {
            return Err(ExprError::Syntax(
                spanned.pos,
                "unexpected trailing input".into(),
            ));
        }
        // a set reference that never met a comparison scopes the whole clause
        Ok(match self.pending_quant.take() {
            Some(quant) => Expr::Quantified(quant, Box::new(expr)),
            None => expr,
        })
    }

    fn pos(&self) -> usize {
        self.tokens.get(self.idx).map_or(self.len, |s| s.pos)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.idx).map(|s| &s.token)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.idx).map(|s| s.token.clone());
        if token.is_some() {
            self.idx += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<(), ExprError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(ExprError::Syntax(self.pos(), format!("expected {what}")))
        }
    }

    fn ident(&mut self) -> Result<String, ExprError> {
        match self.bump() {
            Some(Token::Ident(name)) => Ok(name),
            _ => Err(ExprError::Syntax(self.pos(), "expected identifier".into())),
        }
    }

    fn expr_bp(&mut self, min_bp: u8) -> Result<Expr, ExprError> {
        let mut lhs = self.prefix()?;
        loop {
            let Some((op, lbp, rbp)) = self.peek_op() else {
                break;
            };
            if lbp < min_bp {
                break;
            }
            self.consume_op(op);
            let rhs = if op == BinOp::Match {
                self.regex_literal()?
            } else {
                self.expr_bp(rbp)?
            };
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
            if is_comparison(op) {
                if let Some(quant) = self.pending_quant.take() {
                    lhs = Expr::Quantified(quant, Box::new(lhs));
                }
            }
        }
        Ok(lhs)
    }

    fn peek_op(&self) -> Option<(BinOp, u8, u8)> {
        let op = match self.peek()? {
            Token::Ident(name) if name == "or" => BinOp::Or,
            Token::Ident(name) if name == "and" => BinOp::And,
            Token::Ident(name) if name == "in" => BinOp::In,
            Token::Ident(name) if name == "not" => {
                // `not` here is only the start of `not in`
                match self.tokens.get(self.idx + 1).map(|s| &s.token) {
                    Some(Token::Ident(next)) if next == "in" => BinOp::NotIn,
                    _ => return None,
                }
            }
            Token::EqEq => BinOp::Eq,
            Token::Ne => BinOp::Ne,
            Token::Lt => BinOp::Lt,
            Token::Le => BinOp::Le,
            Token::Gt => BinOp::Gt,
            Token::Ge => BinOp::Ge,
            Token::MatchOp => BinOp::Match,
            Token::Plus => BinOp::Add,
            Token::Minus => BinOp::Sub,
            Token::Star => BinOp::Mul,
            Token::Slash => BinOp::Div,
            _ => return None,
        };
        let (lbp, rbp) = match op {
            BinOp::Or => (1, 2),
            BinOp::And => (3, 4),
            BinOp::Eq
            | BinOp::Ne
            | BinOp::Lt
            | BinOp::Le
            | BinOp::Gt
            | BinOp::Ge
            | BinOp::In
            | BinOp::NotIn
            | BinOp::Match => (7, 8),
            BinOp::Add | BinOp::Sub => (9, 10),
            BinOp::Mul | BinOp::Div => (11, 12),
        };
        Some((op, lbp, rbp))
    }

    fn consume_op(&mut self, op: BinOp) {
        self.idx += if op == BinOp::NotIn { 2 } else { 1 };
    }

    fn regex_literal(&mut self) -> Result<Expr, ExprError> {
        match self.bump() {
            Some(Token::Str(text)) => Ok(Expr::Regex(Regex::new(&text)?)),
            _ => Err(ExprError::Syntax(
                self.pos(),
                "`=~` requires a string literal on the right".into(),
            )),
        }
    }

    fn prefix(&mut self) -> Result<Expr, ExprError> {
        let pos = self.pos();
        match self.bump() {
            Some(Token::Num(value)) => Ok(Expr::Num(value)),
            Some(Token::Str(text)) => Ok(Expr::Str(text)),
            Some(Token::Minus) => {
                let inner = self.expr_bp(13)?;
                Ok(Expr::Unary(UnOp::Neg, Box::new(inner)))
            }
            Some(Token::LParen) => {
                let inner = self.expr_bp(0)?;
                self.expect(&Token::RParen, "`)`")?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        items.push(self.expr_bp(0)?);
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        self.expect(&Token::RBracket, "`]`")?;
                        break;
                    }
                }
                Ok(Expr::List(items))
            }
            Some(Token::At) => {
                let base = self.child_index(NodeRef::This)?;
                self.node_member(base)
            }
            Some(Token::SetChildren) => {
                self.set_quant(SetQuant::AllChildren, pos)?;
                self.node_member(NodeRef::SetElem)
            }
            Some(Token::SetAnyChild) => {
                self.set_quant(SetQuant::AnyChild, pos)?;
                self.node_member(NodeRef::SetElem)
            }
            Some(Token::SetAllNodes) => self.node_member(NodeRef::Incumbent),
            Some(Token::Ident(name)) => match name.as_str() {
                "not" => {
                    let inner = self.expr_bp(5)?;
                    Ok(Expr::Unary(UnOp::Not, Box::new(inner)))
                }
                "True" | "true" => Ok(Expr::Bool(true)),
                "False" | "false" => Ok(Expr::Bool(false)),
                _ => self.function_call(&name, pos),
            },
            _ => Err(ExprError::Syntax(pos, "expected expression".into())),
        }
    }

    fn set_quant(&mut self, quant: SetQuant, pos: usize) -> Result<(), ExprError> {
        if self.pending_quant.is_some() {
            return Err(ExprError::Syntax(
                pos,
                "only one set reference per comparison".into(),
            ));
        }
        self.pending_quant = Some(quant);
        Ok(())
    }

    /// Optional `.children[i]` selector after a node reference.
    fn child_index(&mut self, base: NodeRef) -> Result<NodeRef, ExprError> {
        let is_children = matches!(
            (self.peek(), self.tokens.get(self.idx + 1).map(|s| &s.token)),
            (Some(Token::Dot), Some(Token::Ident(name))) if name == "children"
        );
        if !is_children {
            return Ok(base);
        }
        let pos = self.pos();
        if base != NodeRef::This {
            return Err(ExprError::Syntax(
                pos,
                "`children[..]` only applies to `@`".into(),
            ));
        }
        self.idx += 2;
        self.expect(&Token::LBracket, "`[`")?;
        let index = match self.bump() {
            Some(Token::Num(value)) if value >= 0.0 && value.fract() == 0.0 => value as usize,
            _ => {
                return Err(ExprError::Syntax(
                    self.pos(),
                    "child index must be a non-negative integer".into(),
                ));
            }
        };
        self.expect(&Token::RBracket, "`]`")?;
        Ok(NodeRef::Child(index))
    }

    /// `.attr` or `.is_leaf()` / `.is_root()` after a node reference.
    fn node_member(&mut self, base: NodeRef) -> Result<Expr, ExprError> {
        self.expect(&Token::Dot, "`.attribute` after node reference")?;
        let name = self.ident()?;
        if self.eat(&Token::LParen) {
            self.expect(&Token::RParen, "`)`")?;
            return match name.as_str() {
                "is_leaf" => Ok(Expr::Call(Func::IsLeaf, base)),
                "is_root" => Ok(Expr::Call(Func::IsRoot, base)),
                _ => Err(ExprError::UnknownFunction(name)),
            };
        }
        Attr::from_name(&name)
            .map(|attr| Expr::Attr(base, attr))
            .ok_or(ExprError::UnknownAttribute(name))
    }

    /// `name(@)` / `name(@, expr)` shortcut predicates.
    fn function_call(&mut self, name: &str, pos: usize) -> Result<Expr, ExprError> {
        if self.peek() != Some(&Token::LParen) {
            return Err(ExprError::Syntax(pos, format!("unknown name `{name}`")));
        }
        self.idx += 1;
        let node = self.node_arg()?;
        if let Some(func) = Func::from_name(name) {
            self.expect(&Token::RParen, "`)`")?;
            return Ok(Expr::Call(func, node));
        }
        if let Some(func) = Func2::from_name(name) {
            self.expect(&Token::Comma, "`,`")?;
            let arg = self.expr_bp(0)?;
            self.expect(&Token::RParen, "`)`")?;
            return Ok(Expr::CallWith(func, node, Box::new(arg)));
        }
        Err(ExprError::UnknownFunction(name.to_owned()))
    }

    fn node_arg(&mut self) -> Result<NodeRef, ExprError> {
        let pos = self.pos();
        match self.bump() {
            Some(Token::At) => self.child_index(NodeRef::This),
            Some(Token::SetChildren) => {
                self.set_quant(SetQuant::AllChildren, pos)?;
                Ok(NodeRef::SetElem)
            }
            Some(Token::SetAnyChild) => {
                self.set_quant(SetQuant::AnyChild, pos)?;
                Ok(NodeRef::SetElem)
            }
            Some(Token::SetAllNodes) => Ok(NodeRef::Incumbent),
            _ => Err(ExprError::Syntax(pos, "expected a node reference".into())),
        }
    }
}

/// Whether the expression references the extremal incumbent.
pub(super) fn hoist_extremal(expr: Expr) -> (Expr, bool) {
    let extremal = contains_incumbent(&expr);
    (expr, extremal)
}

fn contains_incumbent(expr: &Expr) -> bool {
    match expr {
        Expr::Attr(node, _) | Expr::Call(_, node) => *node == NodeRef::Incumbent,
        Expr::CallWith(_, node, arg) => *node == NodeRef::Incumbent || contains_incumbent(arg),
        Expr::Unary(_, inner) | Expr::Quantified(_, inner) => contains_incumbent(inner),
        Expr::Binary(_, lhs, rhs) => contains_incumbent(lhs) || contains_incumbent(rhs),
        Expr::List(items) => items.iter().any(contains_incumbent),
        Expr::Bool(_) | Expr::Num(_) | Expr::Str(_) | Expr::Regex(_) => false,
    }
}

fn is_comparison(op: BinOp) -> bool {
    matches!(
        op,
        BinOp::Eq
            | BinOp::Ne
            | BinOp::Lt
            | BinOp::Le
            | BinOp::Gt
            | BinOp::Ge
            | BinOp::In
            | BinOp::NotIn
            | BinOp::Match
    )
}

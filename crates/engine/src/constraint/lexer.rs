// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tokenizer for constraint clause text.
//!
//! Set references (`[:children:]`, `[:any_child:]`, `[:all_nodes:]`) are
//! lexed as single tokens so the parser can treat them as first-class
//! quantifier markers instead of rewriting text.

use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Token {
    Ident(String),
    Num(f64),
    Str(String),
    At,
    SetChildren,
    SetAnyChild,
    SetAllNodes,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    EqEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    MatchOp,
    Plus,
    Minus,
    Star,
    Slash,
}

#[derive(Debug, Clone)]
pub(super) struct Spanned {
    pub(super) token: Token,
    pub(super) pos: usize,
}

pub(super) fn lex(src: &str) -> Result<Vec<Spanned>, ExprError> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let start = pos;
        let b = bytes[pos];
        let token = match b {
            b if b.is_ascii_whitespace() => {
                pos += 1;
                continue;
            }
            b'@' => {
                pos += 1;
                Token::At
            }
            b'(' => {
                pos += 1;
                Token::LParen
            }
            b')' => {
                pos += 1;
                Token::RParen
            }
            b']' => {
                pos += 1;
                Token::RBracket
            }
            b',' => {
                pos += 1;
                Token::Comma
            }
            b'.' => {
                pos += 1;
                Token::Dot
            }
            b'+' => {
                pos += 1;
                Token::Plus
            }
            b'-' => {
                pos += 1;
                Token::Minus
            }
            b'*' => {
                pos += 1;
                Token::Star
            }
            b'/' => {
                pos += 1;
                Token::Slash
            }
            b'[' => {
                if let Some(rest) = src[pos..].strip_prefix("[:") {
                    let Some(end) = rest.find(":]") else {
                        return Err(ExprError::Syntax(pos, "unterminated set reference".into()));
                    };
                    let token = match &rest[..end] {
                        "children" => Token::SetChildren,
                        "any_child" => Token::SetAnyChild,
                        "all_nodes" => Token::SetAllNodes,
                        other => {
                            return Err(ExprError::Syntax(
                                pos,
                                format!("unknown set reference `[:{other}:]`"),
                            ));
                        }
                    };
                    pos += 2 + end + 2;
                    token
                } else {
                    pos += 1;
                    Token::LBracket
                }
            }
            b'=' => {
                if src[pos..].starts_with("==") {
                    pos += 2;
                    Token::EqEq
                } else if src[pos..].starts_with("=~") {
                    pos += 2;
                    Token::MatchOp
                } else {
                    return Err(ExprError::Syntax(pos, "expected `==` or `=~`".into()));
                }
            }
            b'!' => {
                if src[pos..].starts_with("!=") {
                    pos += 2;
                    Token::Ne
                } else {
                    return Err(ExprError::Syntax(pos, "expected `!=`".into()));
                }
            }
            b'<' => {
                if src[pos..].starts_with("<=") {
                    pos += 2;
                    Token::Le
                } else {
                    pos += 1;
                    Token::Lt
                }
            }
            b'>' => {
                if src[pos..].starts_with(">=") {
                    pos += 2;
                    Token::Ge
                } else {
                    pos += 1;
                    Token::Gt
                }
            }
            b'"' | b'\'' => {
                let quote = b;
                pos += 1;
                let lit_start = pos;
                while pos < bytes.len() && bytes[pos] != quote {
                    pos += 1;
                }
                if pos >= bytes.len() {
                    return Err(ExprError::Syntax(start, "unterminated string".into()));
                }
                let text = src[lit_start..pos].to_owned();
                pos += 1;
                Token::Str(text)
            }
            b'0'..=b'9' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                    pos += 1;
                }
                let text = &src[start..pos];
                let value = text
                    .parse()
                    .map_err(|_| ExprError::Syntax(start, format!("bad number `{text}`")))?;
                Token::Num(value)
            }
            b'_' | b'a'..=b'z' | b'A'..=b'Z' => {
                while pos < bytes.len()
                    && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
                {
                    pos += 1;
                }
                Token::Ident(src[start..pos].to_owned())
            }
            other => {
                return Err(ExprError::Syntax(
                    pos,
                    format!("unexpected character `{}`", other as char),
                ));
            }
        };
        out.push(Spanned { token, pos: start });
    }
    Ok(out)
}

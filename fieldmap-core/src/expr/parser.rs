//! Recursive-descent parser producing the expression AST.

use super::lexer::{Token, TokenKind, tokenize};
use crate::error::FieldError;
use crate::path::PathSegment;
use serde_json::Value;
use std::fmt;

/// Where a reference starts looking.
#[derive(Debug, Clone, PartialEq)]
pub enum RefRoot {
    /// An upstream source output, by id.
    Source(String),
    /// `$vars`: the context's global variables.
    Variables,
    /// `$user`: the context's user values.
    User,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefExpr {
    pub root: RefRoot,
    pub segments: Vec<PathSegment>,
}

impl fmt::Display for RefExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root {
            RefRoot::Source(id) => write!(f, "{}", id)?,
            RefRoot::Variables => write!(f, "$vars")?,
            RefRoot::User => write!(f, "$user")?,
        }
        for segment in &self.segments {
            match segment {
                PathSegment::Key(key) => write!(f, ".{}", key)?,
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

/// Parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Reference(RefExpr),
    Call { name: String, args: Vec<Expr> },
}

/// Parse `source` into an expression, rejecting call nesting deeper than `max_depth`.
pub fn parse(source: &str, max_depth: usize) -> Result<Expr, FieldError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        max_depth,
    };
    let expr = parser.parse_expr(0)?;
    let trailing = parser.peek();
    if trailing.kind != TokenKind::Eof {
        return Err(syntax(trailing.offset, "unexpected trailing input"));
    }
    Ok(expr)
}

fn syntax(offset: usize, message: impl Into<String>) -> FieldError {
    FieldError::ExpressionSyntax {
        offset,
        message: message.into(),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    max_depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // tokenize always ends with Eof and advance never moves past it
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: TokenKind, what: &str) -> Result<Token, FieldError> {
        let token = self.advance();
        if token.kind == expected {
            Ok(token)
        } else {
            Err(syntax(token.offset, format!("expected {}", what)))
        }
    }

    fn parse_expr(&mut self, depth: usize) -> Result<Expr, FieldError> {
        let token = self.advance();
        if depth > self.max_depth {
            return Err(syntax(
                token.offset,
                format!("nesting deeper than {} levels", self.max_depth),
            ));
        }

        match token.kind {
            TokenKind::Str(text) => Ok(Expr::Literal(Value::String(text))),
            TokenKind::Num(number) => Ok(Expr::Literal(Value::Number(number))),
            TokenKind::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ if self.peek().kind == TokenKind::LParen => self.parse_call(name, depth),
                _ => self.parse_segments(RefRoot::Source(name)),
            },
            TokenKind::Scope(scope) => match scope.as_str() {
                "vars" => self.parse_segments(RefRoot::Variables),
                "user" => self.parse_segments(RefRoot::User),
                other => Err(syntax(token.offset, format!("unknown scope '${}'", other))),
            },
            TokenKind::Eof => Err(syntax(token.offset, "unexpected end of expression")),
            _ => Err(syntax(token.offset, "expected a literal, reference or call")),
        }
    }

    fn parse_call(&mut self, name: String, depth: usize) -> Result<Expr, FieldError> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if self.peek().kind == TokenKind::RParen {
            self.advance();
            return Ok(Expr::Call { name, args });
        }
        loop {
            args.push(self.parse_expr(depth + 1)?);
            let token = self.advance();
            match token.kind {
                TokenKind::Comma => continue,
                TokenKind::RParen => break,
                _ => return Err(syntax(token.offset, "expected ',' or ')'")),
            }
        }
        Ok(Expr::Call { name, args })
    }

    fn parse_segments(&mut self, root: RefRoot) -> Result<Expr, FieldError> {
        let mut segments = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::Dot => {
                    self.advance();
                    let token = self.advance();
                    match token.kind {
                        TokenKind::Ident(key) => segments.push(PathSegment::Key(key)),
                        _ => return Err(syntax(token.offset, "expected a field name after '.'")),
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    let token = self.advance();
                    let segment = match token.kind {
                        TokenKind::Str(key) => PathSegment::Key(key),
                        TokenKind::Num(number) => match number.as_u64() {
                            Some(index) => PathSegment::Index(index as usize),
                            None => {
                                return Err(syntax(
                                    token.offset,
                                    "index must be a non-negative integer",
                                ));
                            }
                        },
                        _ => return Err(syntax(token.offset, "expected an index or quoted key")),
                    };
                    segments.push(segment);
                    self.expect(TokenKind::RBracket, "']'")?;
                }
                _ => break,
            }
        }
        Ok(Expr::Reference(RefExpr { root, segments }))
    }
}

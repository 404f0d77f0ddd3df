//! Tokenizer for the expression language.

use crate::error::FieldError;
use serde_json::Number;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    /// `$vars` / `$user` style scope roots; holds the name without `$`.
    Scope(String),
    Str(String),
    Num(Number),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token's first character.
    pub offset: usize,
}

fn syntax(offset: usize, message: impl Into<String>) -> FieldError {
    FieldError::ExpressionSyntax {
        offset,
        message: message.into(),
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Split source text into tokens, ending with `Eof`.
pub fn tokenize(source: &str) -> Result<Vec<Token>, FieldError> {
    let bytes: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let (offset, c) = bytes[i];
        let single = match c {
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            ',' => Some(TokenKind::Comma),
            '.' => Some(TokenKind::Dot),
            _ => None,
        };
        if let Some(kind) = single {
            tokens.push(Token { kind, offset });
            i += 1;
            continue;
        }

        if c.is_whitespace() {
            i += 1;
        } else if c == '"' || c == '\'' {
            let (text, next) = lex_string(&bytes, i, c)?;
            tokens.push(Token {
                kind: TokenKind::Str(text),
                offset,
            });
            i = next;
        } else if c.is_ascii_digit()
            || (c == '-' && bytes.get(i + 1).is_some_and(|(_, d)| d.is_ascii_digit()))
        {
            let (number, next) = lex_number(source, &bytes, i)?;
            tokens.push(Token {
                kind: TokenKind::Num(number),
                offset,
            });
            i = next;
        } else if c == '$' {
            let start = i + 1;
            let mut end = start;
            if !bytes.get(start).is_some_and(|(_, ch)| is_ident_start(*ch)) {
                return Err(syntax(offset, "expected a scope name after '$'"));
            }
            while end < bytes.len() && is_ident_continue(bytes[end].1) {
                end += 1;
            }
            let name: String = bytes[start..end].iter().map(|(_, ch)| ch).collect();
            tokens.push(Token {
                kind: TokenKind::Scope(name),
                offset,
            });
            i = end;
        } else if is_ident_start(c) {
            let mut end = i;
            while end < bytes.len() && is_ident_continue(bytes[end].1) {
                end += 1;
            }
            let name: String = bytes[i..end].iter().map(|(_, ch)| ch).collect();
            tokens.push(Token {
                kind: TokenKind::Ident(name),
                offset,
            });
            i = end;
        } else {
            return Err(syntax(offset, format!("unexpected character '{}'", c)));
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        offset: source.len(),
    });
    Ok(tokens)
}

fn lex_string(chars: &[(usize, char)], start: usize, quote: char) -> Result<(String, usize), FieldError> {
    let open_offset = chars[start].0;
    let mut text = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        let (offset, c) = chars[i];
        match c {
            '\\' => {
                let Some(&(_, escaped)) = chars.get(i + 1) else {
                    return Err(syntax(offset, "unterminated escape"));
                };
                let resolved = match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '\\' | '"' | '\'' => escaped,
                    other => {
                        return Err(syntax(offset, format!("unknown escape '\\{}'", other)));
                    }
                };
                text.push(resolved);
                i += 2;
            }
            c if c == quote => return Ok((text, i + 1)),
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    Err(syntax(open_offset, "unterminated string literal"))
}

fn lex_number(source: &str, chars: &[(usize, char)], start: usize) -> Result<(Number, usize), FieldError> {
    let offset = chars[start].0;
    let mut i = start;
    let mut is_float = false;

    if chars[i].1 == '-' {
        i += 1;
    }
    while i < chars.len() && chars[i].1.is_ascii_digit() {
        i += 1;
    }
    if i < chars.len()
        && chars[i].1 == '.'
        && chars.get(i + 1).is_some_and(|(_, d)| d.is_ascii_digit())
    {
        is_float = true;
        i += 1;
        while i < chars.len() && chars[i].1.is_ascii_digit() {
            i += 1;
        }
    }
    if i < chars.len() && (chars[i].1 == 'e' || chars[i].1 == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j].1 == '+' || chars[j].1 == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].1.is_ascii_digit() {
            is_float = true;
            i = j;
            while i < chars.len() && chars[i].1.is_ascii_digit() {
                i += 1;
            }
        }
    }
    if i < chars.len() && is_ident_start(chars[i].1) {
        return Err(syntax(chars[i].0, "unexpected character after number"));
    }

    let end = chars.get(i).map(|(o, _)| *o).unwrap_or(source.len());
    let text = &source[offset..end];
    let number = if is_float {
        text.parse::<f64>().ok().and_then(Number::from_f64)
    } else {
        text.parse::<i64>()
            .ok()
            .map(Number::from)
            .or_else(|| text.parse::<f64>().ok().and_then(Number::from_f64))
    };
    number
        .map(|n| (n, i))
        .ok_or_else(|| syntax(offset, format!("invalid number '{}'", text)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_tokenize_reference_and_call() {
        assert_eq!(
            kinds("coalesce(gmail.from, 'none')"),
            vec![
                TokenKind::Ident("coalesce".into()),
                TokenKind::LParen,
                TokenKind::Ident("gmail".into()),
                TokenKind::Dot,
                TokenKind::Ident("from".into()),
                TokenKind::Comma,
                TokenKind::Str("none".into()),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_numbers() {
        assert_eq!(kinds("42")[0], TokenKind::Num(Number::from(42)));
        assert_eq!(kinds("-7")[0], TokenKind::Num(Number::from(-7)));
        assert_eq!(
            kinds("2.5")[0],
            TokenKind::Num(Number::from_f64(2.5).unwrap())
        );
        assert_eq!(
            kinds("1e3")[0],
            TokenKind::Num(Number::from_f64(1000.0).unwrap())
        );
    }

    #[test]
    fn test_tokenize_index_after_ident() {
        assert_eq!(
            kinds("items[0]"),
            vec![
                TokenKind::Ident("items".into()),
                TokenKind::LBracket,
                TokenKind::Num(Number::from(0)),
                TokenKind::RBracket,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_scope_and_hyphenated_ident() {
        assert_eq!(
            kinds("$vars.region"),
            vec![
                TokenKind::Scope("vars".into()),
                TokenKind::Dot,
                TokenKind::Ident("region".into()),
                TokenKind::Eof,
            ]
        );
        assert_eq!(kinds("node-1")[0], TokenKind::Ident("node-1".into()));
    }

    #[test]
    fn test_tokenize_string_escapes() {
        assert_eq!(kinds(r#""a\"b\n""#)[0], TokenKind::Str("a\"b\n".into()));
        assert_eq!(kinds(r"'it\'s'")[0], TokenKind::Str("it's".into()));
    }

    #[test]
    fn test_tokenize_errors_carry_offset() {
        let err = tokenize("gmail.from + 1").unwrap_err();
        assert_eq!(
            err,
            FieldError::ExpressionSyntax {
                offset: 11,
                message: "unexpected character '+'".into()
            }
        );
        assert!(tokenize("'open").is_err());
        assert!(tokenize("$").is_err());
        assert!(tokenize("12abc").is_err());
        assert!(tokenize(r"'\q'").is_err());
    }
}

//! Token scanner for the constrained expression mini-language.
//!
//! Only the allow-listed token kinds survive scanning: boolean, relational
//! and equality operators, increment/decrement, numeric literals,
//! identifiers, quoted strings, and the structural punctuation the group
//! builder partitions on. Anything else is a syntax error at this stage,
//! before any tree is built.

use crate::error::{SyntaxError, SyntaxErrorKind};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Identifier,
    Number,
    Str,
    /// Boolean, relational and equality operators plus `!`.
    Operator,
    /// `++` or `--`.
    Increment,
    Plus,
    Minus,
    Dot,
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    Question,
    Colon,
    Semicolon,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
}

impl Token {
    fn new<T: Into<String>>(kind: TokenKind, lexeme: T) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
        }
    }
}

type LexResult<T> = Result<T, SyntaxError>;

/// Scan `expr` into tokens, dropping whitespace.
pub(crate) fn tokenize(expr: &str) -> LexResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let bytes = expr.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        let rest = &expr[pos..];
        let c = rest.chars().next().unwrap_or('\0');

        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        if c == '\'' || c == '"' {
            let (lexeme, consumed) = scan_string(expr, rest, c)?;
            tokens.push(Token::new(TokenKind::Str, lexeme));
            pos += consumed;
            continue;
        }

        if c.is_ascii_digit() {
            let end = rest
                .find(|ch: char| !ch.is_ascii_digit() && ch != '.')
                .unwrap_or(rest.len());
            // A trailing '.' belongs to member access, not the number.
            let number = rest[..end].trim_end_matches('.');
            tokens.push(Token::new(TokenKind::Number, number));
            pos += number.len();
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let end = rest
                .find(|ch: char| !ch.is_ascii_alphanumeric() && ch != '_')
                .unwrap_or(rest.len());
            tokens.push(Token::new(TokenKind::Identifier, &rest[..end]));
            pos += end;
            continue;
        }

        // Reject `+++`/`---` outright: the split between increment and
        // arithmetic would be ambiguous.
        if rest.starts_with("+++") || rest.starts_with("---") {
            let run = rest
                .find(|ch: char| ch != c)
                .unwrap_or(rest.len());
            return Err(SyntaxError::new(
                expr,
                SyntaxErrorKind::AmbiguousIncrement {
                    lexeme: rest[..run].to_string(),
                },
            ));
        }

        let multi: &[(&str, TokenKind)] = &[
            ("===", TokenKind::Operator),
            ("!==", TokenKind::Operator),
            ("==", TokenKind::Operator),
            ("!=", TokenKind::Operator),
            ("<=", TokenKind::Operator),
            (">=", TokenKind::Operator),
            ("&&", TokenKind::Operator),
            ("||", TokenKind::Operator),
            ("++", TokenKind::Increment),
            ("--", TokenKind::Increment),
        ];
        if let Some((lexeme, kind)) = multi.iter().find(|(s, _)| rest.starts_with(s)) {
            tokens.push(Token::new(*kind, *lexeme));
            pos += lexeme.len();
            continue;
        }

        let single = match c {
            '<' | '>' | '!' => TokenKind::Operator,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '.' => TokenKind::Dot,
            '(' => TokenKind::OpenParen,
            ')' => TokenKind::CloseParen,
            '[' => TokenKind::OpenBracket,
            ']' => TokenKind::CloseBracket,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            other => {
                return Err(SyntaxError::new(
                    expr,
                    SyntaxErrorKind::DisallowedToken {
                        lexeme: other.to_string(),
                    },
                ));
            }
        };
        tokens.push(Token::new(single, c.to_string()));
        pos += c.len_utf8();
    }

    Ok(tokens)
}

/// Scan a quoted string starting at `rest`, returning the lexeme (quotes
/// included) and the byte length consumed.
fn scan_string(expr: &str, rest: &str, quote: char) -> LexResult<(String, usize)> {
    let mut lexeme = String::new();
    lexeme.push(quote);
    let mut chars = rest.char_indices().skip(1);
    while let Some((index, c)) = chars.next() {
        lexeme.push(c);
        if c == '\\' {
            if let Some((_, escaped)) = chars.next() {
                lexeme.push(escaped);
            }
            continue;
        }
        if c == quote {
            return Ok((lexeme, index + c.len_utf8()));
        }
    }
    Err(SyntaxError::new(expr, SyntaxErrorKind::UnterminatedString))
}

//! The expression transpiler: rewrites the constrained expression
//! mini-language into PHP source text.
//!
//! This is a source-to-source rewrite, not an evaluator. Grouping and
//! precedence of the emitted operators are left to the target runtime; the
//! only analysis performed is a light static-type inference used to pick
//! between `.` (concatenation), `+` (arithmetic) and the runtime `tal_plus`
//! helper when the operand type cannot be known at compile time.

use crate::cache::ExprCache;
use crate::error::{SyntaxError, SyntaxErrorKind};
use crate::lexer::{Token, TokenKind, tokenize};

type ExprResult<T> = Result<T, SyntaxError>;

/// One element of the nested-group tree: either a raw token or a completed
/// sub-group (parenthesized, bracketed, or a ternary branch).
#[derive(Debug, Clone)]
enum Group {
    Tok(Token),
    Nest(Vec<Group>),
}

/// Inferred operand type, derived from the most recent literal seen.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Operand {
    Unknown,
    Numeric,
    Stringy,
}

/// Compiles expressions to PHP, memoising results in a bounded LRU cache.
///
/// Deterministic and pure with respect to its memo: within one compiler
/// instance an identical input is compiled once and always yields the
/// identical output.
#[derive(Debug)]
pub struct ExprCompiler {
    cache: ExprCache,
}

impl Default for ExprCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ExprCompiler {
    pub fn new() -> Self {
        Self {
            cache: ExprCache::default(),
        }
    }

    /// Use an externally configured memo cache.
    pub fn with_cache(cache: ExprCache) -> Self {
        Self { cache }
    }

    /// Rewrite `expr` into PHP source.
    pub fn parse(&mut self, expr: &str) -> ExprResult<String> {
        let expr = expr.trim();

        if expr.starts_with("<?") {
            return Err(SyntaxError::new(expr, SyntaxErrorKind::CodeOpenMarker));
        }
        if expr.ends_with(';') {
            return Err(SyntaxError::new(expr, SyntaxErrorKind::TrailingTerminator));
        }

        if let Some(code) = self.cache.get(expr) {
            return Ok(code);
        }

        let tokens = tokenize(expr)?;
        let groups = build_groups(expr, tokens)?;
        let mut state = Transform::default();
        let mut out = String::new();
        state.level(&groups, &mut out);
        state.finish(&mut out);

        self.cache.insert(expr, &out);
        Ok(out)
    }
}

/// Which construct opened the level currently being accumulated.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Opener {
    Root,
    Paren,
    Bracket,
    /// The "then" branch of a ternary.
    Then,
}

struct Level {
    opener: Opener,
    items: Vec<Group>,
}

/// Partition the token stream into the nested-group tree: one level per
/// parenthesis/bracket nesting, with ternary `?`/`:` splitting a level into
/// condition, then-branch and else-branch.
fn build_groups(expr: &str, tokens: Vec<Token>) -> ExprResult<Vec<Group>> {
    let mut stack = vec![Level {
        opener: Opener::Root,
        items: Vec::new(),
    }];

    let mut iter = tokens.into_iter();
    while let Some(token) = iter.next() {
        match token.kind {
            TokenKind::OpenParen => stack.push(Level {
                opener: Opener::Paren,
                items: vec![Group::Tok(token)],
            }),
            TokenKind::OpenBracket => stack.push(Level {
                opener: Opener::Bracket,
                items: vec![Group::Tok(token)],
            }),
            TokenKind::CloseParen | TokenKind::CloseBracket => {
                let expected = if token.kind == TokenKind::CloseParen {
                    Opener::Paren
                } else {
                    Opener::Bracket
                };
                // Close any ternary branch still open inside this group.
                while stack.last().is_some_and(|l| l.opener == Opener::Then) {
                    let branch = stack.pop().unwrap_or_else(|| unreachable!());
                    if let Some(parent) = stack.last_mut() {
                        parent.items.push(Group::Nest(branch.items));
                    }
                }
                if stack.last().is_none_or(|l| l.opener != expected) {
                    return Err(SyntaxError::new(
                        expr,
                        SyntaxErrorKind::UnexpectedClose {
                            closer: token.lexeme.chars().next().unwrap_or('?'),
                        },
                    ));
                }
                let mut level = stack.pop().unwrap_or_else(|| unreachable!());
                level.items.push(Group::Tok(token));
                if let Some(parent) = stack.last_mut() {
                    parent.items.push(Group::Nest(level.items));
                }
            }
            TokenKind::Question => {
                // Split everything accumulated so far into the condition,
                // then open a fresh level for the "then" branch.
                let current = stack.last_mut().unwrap_or_else(|| unreachable!());
                let condition = std::mem::take(&mut current.items);
                current.items.push(Group::Nest(condition));
                current.items.push(Group::Tok(token));
                stack.push(Level {
                    opener: Opener::Then,
                    items: Vec::new(),
                });
            }
            TokenKind::Colon => {
                if stack.last().is_none_or(|l| l.opener != Opener::Then) {
                    return Err(SyntaxError::new(
                        expr,
                        SyntaxErrorKind::TernaryWithoutCondition,
                    ));
                }
                let branch = stack.pop().unwrap_or_else(|| unreachable!());
                let parent = stack.last_mut().unwrap_or_else(|| unreachable!());
                parent.items.push(Group::Nest(branch.items));
                parent.items.push(Group::Tok(token));
                // The else branch accumulates at the parent level.
            }
            TokenKind::Semicolon => {
                if stack.len() > 1 || iter.next().is_some() {
                    return Err(SyntaxError::new(expr, SyntaxErrorKind::MultipleStatements));
                }
                break;
            }
            TokenKind::Identifier
            | TokenKind::Number
            | TokenKind::Str
            | TokenKind::Operator
            | TokenKind::Increment
            | TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Dot => {
                let current = stack.last_mut().unwrap_or_else(|| unreachable!());
                current.items.push(Group::Tok(token));
            }
        }
    }

    // Ternary branches may legitimately run to the end of the expression.
    while stack.last().is_some_and(|l| l.opener == Opener::Then) {
        let branch = stack.pop().unwrap_or_else(|| unreachable!());
        if branch.items.is_empty() {
            return Err(SyntaxError::new(
                expr,
                SyntaxErrorKind::UnbalancedGroup { opener: '?' },
            ));
        }
        if let Some(parent) = stack.last_mut() {
            parent.items.push(Group::Nest(branch.items));
        }
    }

    if stack.len() != 1 {
        let opener = match stack.last().map(|l| l.opener) {
            Some(Opener::Bracket) => '[',
            _ => '(',
        };
        return Err(SyntaxError::new(
            expr,
            SyntaxErrorKind::UnbalancedGroup { opener },
        ));
    }

    Ok(stack.pop().map(|l| l.items).unwrap_or_default())
}

/// Single-pass transform state: the inference FSM plus whether the output
/// is currently inside a synthesized `tal_plus(…)` call.
struct Transform {
    ty: Operand,
    in_plus: bool,
    /// Byte offset in the output where the current operand began; used to
    /// splice `tal_plus(` around the left operand after the fact.
    operand_start: usize,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            ty: Operand::Unknown,
            in_plus: false,
            operand_start: 0,
        }
    }
}

impl Transform {
    fn close_plus(&mut self, out: &mut String) {
        if self.in_plus {
            out.push(')');
            self.in_plus = false;
        }
    }

    fn finish(&mut self, out: &mut String) {
        self.close_plus(out);
    }

    /// Transform one level of the group tree, appending PHP to `out`.
    fn level(&mut self, items: &[Group], out: &mut String) {
        let mut index = 0;
        let mut after_dot = false;
        while index < items.len() {
            match &items[index] {
                Group::Tok(token) => match token.kind {
                    TokenKind::Identifier => {
                        if after_dot {
                            out.push_str(&token.lexeme);
                            after_dot = false;
                        } else {
                            self.operand_start = out.len();
                            let wraps = matches!(
                                items.get(index + 1),
                                Some(Group::Tok(t)) if t.kind == TokenKind::Dot
                            );
                            if is_keyword(&token.lexeme) {
                                out.push_str(&token.lexeme);
                            } else if wraps {
                                out.push_str("tal_mem($");
                                out.push_str(&token.lexeme);
                                out.push(')');
                            } else {
                                out.push('$');
                                out.push_str(&token.lexeme);
                            }
                        }
                    }
                    TokenKind::Dot => {
                        out.push_str("->");
                        after_dot = true;
                    }
                    TokenKind::Number => {
                        self.operand_start = out.len();
                        self.ty = Operand::Numeric;
                        out.push_str(&token.lexeme);
                    }
                    TokenKind::Str => {
                        self.operand_start = out.len();
                        self.ty = Operand::Stringy;
                        out.push_str(&token.lexeme);
                    }
                    TokenKind::Plus => match self.ty {
                        Operand::Numeric => out.push_str(" + "),
                        Operand::Stringy => out.push_str(" . "),
                        Operand::Unknown => {
                            if self.in_plus {
                                out.push_str(", ");
                            } else {
                                out.insert_str(self.operand_start, "tal_plus(");
                                out.push_str(", ");
                                self.in_plus = true;
                            }
                        }
                    },
                    TokenKind::Minus => {
                        // Minus always forces arithmetic mode.
                        self.close_plus(out);
                        self.ty = Operand::Numeric;
                        out.push_str(" - ");
                    }
                    TokenKind::Operator => {
                        self.close_plus(out);
                        self.ty = Operand::Unknown;
                        if token.lexeme == "!" {
                            self.operand_start = out.len();
                            out.push('!');
                        } else {
                            out.push(' ');
                            out.push_str(&token.lexeme);
                            out.push(' ');
                        }
                    }
                    TokenKind::Increment => {
                        out.push_str(&token.lexeme);
                    }
                    TokenKind::Question => {
                        self.close_plus(out);
                        self.ty = Operand::Unknown;
                        out.push_str(" ? ");
                    }
                    TokenKind::Colon => {
                        self.close_plus(out);
                        self.ty = Operand::Unknown;
                        out.push_str(" : ");
                    }
                    TokenKind::OpenParen | TokenKind::OpenBracket => out.push_str(&token.lexeme),
                    TokenKind::CloseParen | TokenKind::CloseBracket => {
                        out.push_str(&token.lexeme);
                    }
                    TokenKind::Semicolon => {}
                },
                Group::Nest(inner) => {
                    let bracketed = matches!(
                        inner.first(),
                        Some(Group::Tok(t)) if t.kind == TokenKind::OpenBracket
                    );
                    // A bracket group continues the current operand
                    // (index access); anything else starts a fresh one.
                    if !bracketed {
                        self.operand_start = out.len();
                    }
                    // Sub-trees recurse with their own inference state and
                    // are wrapped verbatim.
                    let mut nested = Transform::default();
                    nested.level(inner, out);
                    nested.finish(out);
                }
            }
            index += 1;
        }
    }
}

fn is_keyword(lexeme: &str) -> bool {
    matches!(lexeme, "true" | "false" | "null")
}

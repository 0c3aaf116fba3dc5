//! Resolver for the path-expression dialect.
//!
//! Paths are the richer of the two expression surfaces: slash- and
//! dot-separated context references, `|` alternation with first-truthy
//! semantics, `string:` interpolation, the loop magic counters, and
//! function calls with quoted arguments. Anything that does not look like a
//! path is handed to the expression transpiler, which is the only other
//! road into generated code.

use crate::error::{SyntaxError, SyntaxErrorKind, TalcResult};
use crate::expr::ExprCompiler;

/// The marker selecting raw (unescaped) output.
const STRUCTURE_MARKER: &str = "structure ";

/// Resolves path expressions to PHP fragments. Borrows the expression
/// compiler so non-path alternatives share its memo.
pub(crate) struct PathResolver<'a> {
    exprs: &'a mut ExprCompiler,
}

impl<'a> PathResolver<'a> {
    pub fn new(exprs: &'a mut ExprCompiler) -> Self {
        Self { exprs }
    }

    /// True when the expression carries the leading raw-output marker.
    pub fn is_structure(expr: &str) -> bool {
        expr.trim_start().starts_with(STRUCTURE_MARKER)
    }

    /// Strip the raw-output marker, returning the remaining expression.
    pub fn structure(expr: &str) -> &str {
        let trimmed = expr.trim_start();
        trimmed
            .strip_prefix(STRUCTURE_MARKER)
            .unwrap_or(trimmed)
            .trim_start()
    }

    /// Resolve a full path expression, including alternation. An empty
    /// input resolves to an empty fragment (the caller decides whether that
    /// means "emit nothing").
    pub fn resolve(&mut self, path: &str) -> TalcResult<String> {
        let path = path.trim();
        if path.is_empty() {
            return Ok(String::new());
        }

        let alternatives = split_alternatives(path);
        if alternatives.len() == 1 {
            return self.resolve_one(path);
        }

        // First truthy alternative wins at runtime: an Elvis chain.
        let mut compiled = Vec::with_capacity(alternatives.len());
        for alternative in &alternatives {
            compiled.push(self.resolve_one(alternative)?);
        }
        Ok(format!("({})", compiled.join(" ?: ")))
    }

    /// Resolve a single alternative (no `|` splitting).
    fn resolve_one(&mut self, path: &str) -> TalcResult<String> {
        let path = path.trim();

        if let Some(template) = path.strip_prefix("string:") {
            return self.string(template);
        }
        if path.starts_with('\'') {
            return Ok(quote_literal(path)?);
        }
        if is_number(path) {
            return Ok(path.to_string());
        }
        if is_path(path) {
            return self.variable(path);
        }

        // Not a path: the expression transpiler owns it.
        Ok(self.exprs.parse(path)?)
    }

    /// Compile a bare path reference.
    ///
    /// Slash paths become array-index chains, dotted paths adapter-wrapped
    /// member chains; the two are never mixed. `repeat/item/…` resolves to
    /// the loop-scoped counters the repeat directive emits.
    pub fn variable(&mut self, path: &str) -> TalcResult<String> {
        let path = path.trim();

        if let Some(call) = self.try_call(path)? {
            return Ok(call);
        }

        if let Some(rest) = path.strip_prefix("repeat/") {
            if let Some(code) = repeat_counter(rest) {
                return Ok(code);
            }
        }

        if path.contains('/') {
            let mut segments = path.split('/');
            let base = segments.next().unwrap_or_default();
            let mut code = format!("${}", base);
            for segment in segments {
                if segment.chars().all(|c| c.is_ascii_digit()) && !segment.is_empty() {
                    code.push_str(&format!("[{}]", segment));
                } else {
                    code.push_str(&format!("['{}']", segment));
                }
            }
            return Ok(code);
        }

        if path.contains('.') {
            let mut segments = path.split('.');
            let base = segments.next().unwrap_or_default();
            let mut code = format!("tal_mem(${})", base);
            for segment in segments {
                code.push_str("->");
                code.push_str(segment);
            }
            return Ok(code);
        }

        Ok(format!("${}", path))
    }

    /// Interpolate a `string:` template: `$name` and `${path}` resolve via
    /// [`Self::variable`], `$$` escapes to a literal `$`, any other
    /// `$`-prefixed text is left untouched.
    pub fn string(&mut self, template: &str) -> TalcResult<String> {
        let mut parts: Vec<String> = Vec::new();
        let mut literal = String::new();
        let mut chars = template.char_indices().peekable();

        while let Some((index, c)) = chars.next() {
            if c != '$' {
                literal.push(c);
                continue;
            }
            match chars.peek().map(|&(_, next)| next) {
                Some('$') => {
                    chars.next();
                    literal.push('$');
                }
                Some('{') => {
                    chars.next();
                    let rest = &template[index + 2..];
                    let Some(end) = rest.find('}') else {
                        // No closing brace: not an interpolation.
                        literal.push('$');
                        literal.push('{');
                        continue;
                    };
                    flush_literal(&mut parts, &mut literal);
                    parts.push(self.variable(&rest[..end])?);
                    // Skip past the path and its closing brace.
                    let resume = index + 2 + end + 1;
                    while chars.peek().is_some_and(|&(i, _)| i < resume) {
                        chars.next();
                    }
                }
                Some(next) if next.is_ascii_alphabetic() || next == '_' => {
                    let rest = &template[index + 1..];
                    let end = rest
                        .find(|ch: char| !ch.is_ascii_alphanumeric() && ch != '_')
                        .unwrap_or(rest.len());
                    flush_literal(&mut parts, &mut literal);
                    parts.push(self.variable(&rest[..end])?);
                    let resume = index + 1 + end;
                    while chars.peek().is_some_and(|&(i, _)| i < resume) {
                        chars.next();
                    }
                }
                _ => literal.push('$'),
            }
        }
        flush_literal(&mut parts, &mut literal);

        Ok(match parts.len() {
            0 => "''".to_string(),
            1 => parts.remove(0),
            _ => format!("({})", parts.join(" . ")),
        })
    }

    /// Try to parse `name(args…)` or `Type::method(args…)`. Returns `None`
    /// when the path is not call-shaped.
    fn try_call(&mut self, path: &str) -> TalcResult<Option<String>> {
        let Some(open) = path.find('(') else {
            return Ok(None);
        };
        if !path.ends_with(')') {
            return Ok(None);
        }
        let callee = &path[..open];
        let callable = |s: &str| {
            !s.is_empty()
                && s.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        };
        let is_callee = match callee.split_once("::") {
            Some((ty, method)) => callable(ty) && callable(method),
            None => callable(callee),
        };
        if !is_callee {
            return Ok(None);
        }

        let raw_args = &path[open + 1..path.len() - 1];
        let mut compiled = Vec::new();
        for arg in split_arguments(raw_args)? {
            compiled.push(self.resolve(&arg)?);
        }
        Ok(Some(format!("{}({})", callee, compiled.join(", "))))
    }
}

fn flush_literal(parts: &mut Vec<String>, literal: &mut String) {
    if !literal.is_empty() {
        parts.push(format!("'{}'", php_escape(literal)));
        literal.clear();
    }
}

/// Escape a literal chunk for a single-quoted PHP string.
pub(crate) fn php_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "\\'")
}

/// The loop magic counters scoped to `item`, addressed as
/// `repeat/<item>/<counter>`.
fn repeat_counter(rest: &str) -> Option<String> {
    let (item, counter) = rest.split_once('/')?;
    let code = match counter {
        "key" => format!("$item_{}_key", item),
        "index" | "number" => format!("$item_{}_idx", item),
        "length" => format!("$item_{}_cnt", item),
        "even" => format!("($item_{}_key % 2 === 0)", item),
        "odd" => format!("($item_{}_key % 2 === 1)", item),
        "start" => format!("($item_{}_key === 0)", item),
        "end" => format!("($item_{}_idx === $item_{}_cnt)", item, item),
        _ => return None,
    };
    Some(code)
}

/// Names of the loop-scoped locals the repeat directive emits for `item`.
pub(crate) fn loop_locals(item: &str) -> (String, String, String, String) {
    (
        format!("$item_{}_seq", item),
        format!("$item_{}_key", item),
        format!("$item_{}_idx", item),
        format!("$item_{}_cnt", item),
    )
}

fn is_number(path: &str) -> bool {
    !path.is_empty()
        && path.chars().all(|c| c.is_ascii_digit() || c == '.')
        && path.chars().any(|c| c.is_ascii_digit())
}

/// A path is identifier segments joined by `/` or `.`, or a call with a
/// path-shaped callee; whitespace or operators disqualify it and route the
/// alternative to the transpiler instead.
fn is_path(path: &str) -> bool {
    if path.contains('(') {
        // Call-shaped; validated further by try_call.
        return path.ends_with(')');
    }
    !path.is_empty()
        && path.split(['/', '.']).all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// Split on top-level `|`, honoring quoted strings and parentheses and
/// leaving `||` (boolean or, for transpiler-bound alternatives) intact.
pub(crate) fn split_alternatives(expr: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut chars = expr.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            current.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                current.push(c);
            }
            '(' | '[' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            '|' if depth == 0 => {
                if chars.peek() == Some(&'|') {
                    chars.next();
                    current.push_str("||");
                } else {
                    parts.push(current.trim().to_string());
                    current = String::new();
                }
            }
            _ => current.push(c),
        }
    }
    parts.push(current.trim().to_string());
    parts.retain(|p| !p.is_empty());
    parts
}

/// Split `;`-separated clauses, honoring quoted strings.
pub(crate) fn multi_line(expr: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = expr.chars();

    for c in chars.by_ref() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                current.push(c);
            }
            ';' => {
                parts.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(c),
        }
    }
    parts.push(current.trim().to_string());
    parts.retain(|p| !p.is_empty());
    parts
}

/// Split a call argument list on top-level commas, honoring single-quoted
/// strings with backslash escapes.
fn split_arguments(raw: &str) -> Result<Vec<String>, SyntaxError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote = false;
    let mut depth = 0usize;
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if quote {
            current.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            } else if c == '\'' {
                quote = false;
            }
            continue;
        }
        match c {
            '\'' => {
                quote = true;
                current.push(c);
            }
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                args.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(c),
        }
    }
    if quote {
        return Err(SyntaxError::new(raw, SyntaxErrorKind::UnterminatedString));
    }
    args.push(current.trim().to_string());
    args.retain(|a| !a.is_empty());
    Ok(args)
}

/// Validate a single-quoted literal and pass it through.
fn quote_literal(path: &str) -> Result<String, SyntaxError> {
    let inner = &path[1..];
    let mut chars = inner.chars();
    let mut closed = false;
    while let Some(c) = chars.next() {
        if c == '\\' {
            chars.next();
            continue;
        }
        if c == '\'' {
            closed = chars.as_str().trim().is_empty();
            break;
        }
    }
    if closed {
        Ok(path.to_string())
    } else {
        Err(SyntaxError::new(path, SyntaxErrorKind::UnterminatedString))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(path: &str) -> String {
        let mut exprs = ExprCompiler::new();
        PathResolver::new(&mut exprs).resolve(path).unwrap()
    }

    fn variable(path: &str) -> String {
        let mut exprs = ExprCompiler::new();
        PathResolver::new(&mut exprs).variable(path).unwrap()
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_slash_path_is_pure_index_chain() {
        assert_eq!(variable("a/b/c"), "$a['b']['c']");
        assert_eq!(variable("rows/0/name"), "$rows[0]['name']");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_dot_path_is_pure_member_chain() {
        assert_eq!(variable("a.b.c"), "tal_mem($a)->b->c");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_plain_identifier() {
        assert_eq!(variable("user"), "$user");
    }

    #[test]
    #[ntest::timeout(100)]
    fn alternation_splits_on_top_level_pipe() {
        assert_eq!(
            split_alternatives("item/name | item/alias | 'anonymous'"),
            vec!["item/name", "item/alias", "'anonymous'"]
        );
        // `||` is boolean-or inside an alternative, not a splitter.
        assert_eq!(split_alternatives("a || b | c"), vec!["a || b", "c"]);
        // Quoted pipes do not split.
        assert_eq!(split_alternatives("'a|b' | c"), vec!["'a|b'", "c"]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_alternation_compiles_to_elvis_chain() {
        assert_eq!(
            resolve("item/name | 'anonymous'"),
            "($item['name'] ?: 'anonymous')"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_repeat_magic_counters() {
        assert_eq!(variable("repeat/row/index"), "$item_row_idx");
        assert_eq!(variable("repeat/row/number"), "$item_row_idx");
        assert_eq!(variable("repeat/row/key"), "$item_row_key");
        assert_eq!(variable("repeat/row/length"), "$item_row_cnt");
        assert_eq!(variable("repeat/row/even"), "($item_row_key % 2 === 0)");
        assert_eq!(variable("repeat/row/odd"), "($item_row_key % 2 === 1)");
        assert_eq!(variable("repeat/row/start"), "($item_row_key === 0)");
        assert_eq!(
            variable("repeat/row/end"),
            "($item_row_idx === $item_row_cnt)"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_function_call_arguments() {
        assert_eq!(
            variable("format(item/price, 'en-GB')"),
            "format($item['price'], 'en-GB')"
        );
        assert_eq!(variable("Text::upper(name)"), "Text::upper($name)");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_call_argument_with_escaped_quote() {
        assert_eq!(
            variable("wrap('it\\'s, fine', name)"),
            "wrap('it\\'s, fine', $name)"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_string_interpolation() {
        let mut exprs = ExprCompiler::new();
        let mut resolver = PathResolver::new(&mut exprs);
        assert_eq!(
            resolver.string("Hello $name!").unwrap(),
            "('Hello ' . $name . '!')"
        );
        assert_eq!(
            resolver.string("Sum: ${cart/total}").unwrap(),
            "('Sum: ' . $cart['total'])"
        );
        assert_eq!(resolver.string("$$5 off").unwrap(), "'$5 off'");
        // A lone `$` before a non-name stays literal.
        assert_eq!(resolver.string("cost: $ 5").unwrap(), "'cost: $ 5'");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_structure_marker() {
        assert!(PathResolver::is_structure("structure item/body"));
        assert!(!PathResolver::is_structure("item/body"));
        assert_eq!(PathResolver::structure("structure item/body"), "item/body");
        assert_eq!(PathResolver::structure("item/body"), "item/body");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_non_path_falls_through_to_transpiler() {
        assert_eq!(resolve("count + 1"), "tal_plus($count, 1)");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_multi_line_split_honors_quotes() {
        assert_eq!(
            multi_line("x 'a;b'; y item/name"),
            vec!["x 'a;b'", "y item/name"]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_quoted_literal_passthrough() {
        assert_eq!(resolve("'plain text'"), "'plain text'");
        assert_eq!(resolve("42"), "42");
    }
}

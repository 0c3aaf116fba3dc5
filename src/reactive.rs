//! The reactive-binding dialect.
//!
//! Reactive directives compile to the same server-side structures as the
//! path dialect, but are driven by their own expression compiler: member
//! access and bare identifiers map onto the data context, every `+` is the
//! polymorphic runtime add (there is no type inference here), and the
//! remaining operators pass through. Consumed attributes are re-serialized
//! into the output for the client half of the dual rendering, unless an
//! ancestor carries `once`.

use crate::directives::{Cx, directive_error, emit_counting_loop, tag_of, take_attr};
use crate::error::{DirectiveErrorKind, SyntaxError, SyntaxErrorKind, TalcError, TalcResult};
use crate::lexer::{TokenKind, tokenize};
use crate::path::php_escape;
use crate::tree::{AttrValue, NodeId, NodeKind, Tree, escape_attr};

/// Compile a reactive expression to PHP.
///
/// No inference: `+` always goes through `tal_plus`, which decides between
/// concatenation and addition at runtime.
pub(crate) fn compile(expr: &str) -> Result<String, SyntaxError> {
    let expr = expr.trim();
    if expr.starts_with("<?") {
        return Err(SyntaxError::new(expr, SyntaxErrorKind::CodeOpenMarker));
    }
    if expr.ends_with(';') {
        return Err(SyntaxError::new(expr, SyntaxErrorKind::TrailingTerminator));
    }

    let tokens = tokenize(expr)?;
    let mut out = String::new();
    let mut depth: i32 = 0;
    let mut ternaries: i32 = 0;
    let mut in_plus = false;
    let mut operand_start = 0;
    let mut after_dot = false;

    let mut close_plus = |out: &mut String, in_plus: &mut bool| {
        if *in_plus {
            out.push(')');
            *in_plus = false;
        }
    };

    for (index, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Identifier => {
                if after_dot {
                    out.push_str(&token.lexeme);
                    after_dot = false;
                } else {
                    operand_start = out.len();
                    let wraps = tokens.get(index + 1).is_some_and(|t| t.kind == TokenKind::Dot);
                    if matches!(token.lexeme.as_str(), "true" | "false" | "null") {
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
            TokenKind::Number | TokenKind::Str => {
                operand_start = out.len();
                out.push_str(&token.lexeme);
            }
            TokenKind::Plus => {
                if in_plus {
                    out.push_str(", ");
                } else {
                    out.insert_str(operand_start, "tal_plus(");
                    out.push_str(", ");
                    in_plus = true;
                }
            }
            TokenKind::Minus => {
                close_plus(&mut out, &mut in_plus);
                out.push_str(" - ");
            }
            TokenKind::Operator => {
                close_plus(&mut out, &mut in_plus);
                if token.lexeme == "!" {
                    operand_start = out.len();
                    out.push('!');
                } else {
                    out.push(' ');
                    out.push_str(&token.lexeme);
                    out.push(' ');
                }
            }
            TokenKind::Increment => out.push_str(&token.lexeme),
            TokenKind::OpenParen | TokenKind::OpenBracket => {
                depth += 1;
                if token.kind == TokenKind::OpenParen {
                    operand_start = out.len();
                }
                out.push_str(&token.lexeme);
            }
            TokenKind::CloseParen | TokenKind::CloseBracket => {
                close_plus(&mut out, &mut in_plus);
                depth -= 1;
                if depth < 0 {
                    return Err(SyntaxError::new(
                        expr,
                        SyntaxErrorKind::UnexpectedClose {
                            closer: token.lexeme.chars().next().unwrap_or('?'),
                        },
                    ));
                }
                out.push_str(&token.lexeme);
            }
            TokenKind::Question => {
                close_plus(&mut out, &mut in_plus);
                ternaries += 1;
                out.push_str(" ? ");
            }
            TokenKind::Colon => {
                if ternaries == 0 {
                    return Err(SyntaxError::new(
                        expr,
                        SyntaxErrorKind::TernaryWithoutCondition,
                    ));
                }
                close_plus(&mut out, &mut in_plus);
                ternaries -= 1;
                out.push_str(" : ");
            }
            TokenKind::Semicolon => {
                return Err(SyntaxError::new(expr, SyntaxErrorKind::MultipleStatements));
            }
        }
    }
    if depth != 0 {
        return Err(SyntaxError::new(
            expr,
            SyntaxErrorKind::UnbalancedGroup { opener: '(' },
        ));
    }
    if in_plus {
        out.push(')');
    }
    Ok(out)
}

fn compile_in(expr: &str, directive: &str, tag: &str) -> TalcResult<String> {
    compile(expr).map_err(|e| TalcError::from(e).in_directive(directive, tag))
}

/// True when the node or any ancestor element carries the `once` flag.
fn effective_once(tree: &Tree, node: NodeId) -> bool {
    let mut current = Some(node);
    while let Some(id) = current {
        if tree.element(id).is_some_and(|e| e.once) {
            return true;
        }
        current = tree.parent(id);
    }
    false
}

/// Keep a consumed reactive attribute for the client half of the dual
/// rendering, unless `once` is in force for this subtree.
fn retain(tree: &mut Tree, node: NodeId, name: &str, value: &str) {
    if effective_once(tree, node) {
        return;
    }
    if let Some(element) = tree.element_mut(node) {
        element.retained.push((name.to_string(), value.to_string()));
    }
}

/// `once` — mark the subtree server-only; nothing reactive below it is
/// re-serialized for the client.
pub(crate) fn process_once(tree: &mut Tree, node: NodeId, _cx: &mut Cx<'_>) -> TalcResult<bool> {
    if take_attr(tree, node, "once").is_none() {
        return Ok(false);
    }
    if let Some(element) = tree.element_mut(node) {
        element.once = true;
    }
    Ok(true)
}

/// How a conditional ladder compiles its branch expressions.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum LadderStyle {
    Reactive,
    Generic,
}

/// `if`/`elseif`/`else` — reconstruct the conditional ladder from sibling
/// nodes. The scan walks the immediate next sibling while it is an element
/// carrying the companion attribute and stops at the first that is not; a
/// trailing `elseif` after a plain sibling is left alone.
pub(crate) fn process_ladder(
    tree: &mut Tree,
    node: NodeId,
    cx: &mut Cx<'_>,
    style: LadderStyle,
) -> TalcResult<bool> {
    let Some(cond) = take_attr(tree, node, "if") else {
        return Ok(false);
    };
    let tag = tag_of(tree, node);
    let code = match style {
        LadderStyle::Reactive => compile_in(&cond, "if", &tag)?,
        LadderStyle::Generic => cx
            .exprs
            .parse(&cond)
            .map_err(|e| TalcError::from(e).in_directive("if", &tag))?,
    };
    if style == LadderStyle::Reactive {
        retain(tree, node, "if", &cond);
    }

    let open = tree.new_code(format!("if ({}) {{\n", code));
    let close = tree.new_code("}\n");
    tree.insert_before(node, open);
    tree.insert_after(node, close);

    let mut current = node;
    loop {
        let Some(next) = tree.next_sibling(current) else {
            break;
        };
        // Skip the close brace we just inserted after `current`.
        let next = match tree.kind(next) {
            NodeKind::Code(_) => match tree.next_sibling(next) {
                Some(after) => after,
                None => break,
            },
            NodeKind::Root | NodeKind::Element(_) | NodeKind::Text(_) => next,
        };

        if let Some(value) = take_attr(tree, next, "elseif") {
            let tag = tag_of(tree, next);
            let code = match style {
                LadderStyle::Reactive => compile_in(&value, "elseif", &tag)?,
                LadderStyle::Generic => cx
                    .exprs
                    .parse(&value)
                    .map_err(|e| TalcError::from(e).in_directive("elseif", &tag))?,
            };
            if style == LadderStyle::Reactive {
                retain(tree, next, "elseif", &value);
            }
            let open = tree.new_code(format!("else if ({}) {{\n", code));
            let close = tree.new_code("}\n");
            tree.insert_before(next, open);
            tree.insert_after(next, close);
            current = next;
            continue;
        }
        if take_attr(tree, next, "else").is_some() {
            if style == LadderStyle::Reactive {
                retain(tree, next, "else", "");
            }
            let open = tree.new_code("else {\n");
            let close = tree.new_code("}\n");
            tree.insert_before(next, open);
            tree.insert_after(next, close);
            break;
        }
        break;
    }
    Ok(true)
}

pub(crate) fn process_if(tree: &mut Tree, node: NodeId, cx: &mut Cx<'_>) -> TalcResult<bool> {
    process_ladder(tree, node, cx, LadderStyle::Reactive)
}

/// `for="item in list"` — the counting loop, reactive expression for the
/// list.
pub(crate) fn process_for(tree: &mut Tree, node: NodeId, cx: &mut Cx<'_>) -> TalcResult<bool> {
    let Some(value) = take_attr(tree, node, "for") else {
        return Ok(false);
    };
    let tag = tag_of(tree, node);
    let Some((item, list)) = value.split_once(" in ") else {
        return Err(directive_error(
            "for",
            &tag,
            DirectiveErrorKind::MalformedLoop { header: value },
        ));
    };
    let list_code = compile_in(list, "for", &tag)?;
    retain(tree, node, "for", &value);
    emit_counting_loop(tree, node, item.trim(), &list_code);
    Ok(true)
}

/// `show="expr"` — toggle an inline `display:none` instead of removing
/// markup.
pub(crate) fn process_show(tree: &mut Tree, node: NodeId, cx: &mut Cx<'_>) -> TalcResult<bool> {
    let Some(value) = take_attr(tree, node, "show") else {
        return Ok(false);
    };
    let tag = tag_of(tree, node);
    let code = compile_in(&value, "show", &tag)?;
    retain(tree, node, "show", &value);

    let original = tree
        .element(node)
        .and_then(|e| e.attr("style"))
        .map(str::to_string);
    let attr_code = match original {
        Some(style) => {
            let shown = php_escape(&escape_attr(&style));
            let hidden = format!("{};display:none", shown);
            format!(
                "if (!({code})) {{\necho ' style=\"{hidden}\"';\n}} else {{\necho ' style=\"{shown}\"';\n}}\n",
                code = code,
                hidden = hidden,
                shown = shown,
            )
        }
        None => format!(
            "if (!({})) {{\necho ' style=\"display:none\"';\n}}\n",
            code
        ),
    };
    if let Some(element) = tree.element_mut(node) {
        element.set_attr("style", AttrValue::Computed(attr_code));
    }
    Ok(true)
}

/// `text="expr"` — escaped content binding.
pub(crate) fn process_text(tree: &mut Tree, node: NodeId, cx: &mut Cx<'_>) -> TalcResult<bool> {
    content_binding(tree, node, cx, "text", true)
}

/// `html="expr"` — raw content binding.
pub(crate) fn process_html(tree: &mut Tree, node: NodeId, cx: &mut Cx<'_>) -> TalcResult<bool> {
    content_binding(tree, node, cx, "html", false)
}

fn content_binding(
    tree: &mut Tree,
    node: NodeId,
    cx: &mut Cx<'_>,
    directive: &str,
    escape: bool,
) -> TalcResult<bool> {
    let Some(value) = take_attr(tree, node, directive) else {
        return Ok(false);
    };
    let tag = tag_of(tree, node);
    let code = compile_in(&value, directive, &tag)?;
    retain(tree, node, directive, &value);

    tree.clear_children(node);
    let statement = if escape {
        format!("echo tal_esc({});\n", code)
    } else {
        format!("echo {};\n", code)
    };
    let output = tree.new_code(statement);
    tree.append(node, output);
    Ok(true)
}

/// `bind:<attr>` / `:<attr>` — one computed attribute per pass.
pub(crate) fn process_bind(tree: &mut Tree, node: NodeId, cx: &mut Cx<'_>) -> TalcResult<bool> {
    let Some(element) = tree.element(node) else {
        return Ok(false);
    };
    let Some((full_name, value)) = element
        .attr_with_prefix("bind:")
        .or_else(|| element.attr_with_prefix(":"))
    else {
        return Ok(false);
    };

    let target = full_name
        .strip_prefix("bind:")
        .or_else(|| full_name.strip_prefix(':'))
        .unwrap_or(&full_name)
        .to_string();
    if let Some(element) = tree.element_mut(node) {
        element.remove_attr(&full_name);
    }
    let tag = tag_of(tree, node);
    let code = compile_in(&value, &full_name, &tag)?;
    retain(tree, node, &full_name, &value);

    let attr_code = format!(
        "echo ' {target}=\"' . tal_esc({code}) . '\"';\n",
        target = target,
        code = code
    );
    if let Some(element) = tree.element_mut(node) {
        element.set_attr(target, AttrValue::Computed(attr_code));
    }
    Ok(true)
}

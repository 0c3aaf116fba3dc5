//! The generic scripting dialect: control-flow attributes that feed the
//! expression transpiler directly, with none of the path dialect's
//! alternation or interpolation sugar. Opt-in via [`crate::Dialect::Generic`].

use crate::directives::{Cx, directive_error, tag_of, take_attr};
use crate::error::{DirectiveErrorKind, TalcError, TalcResult};
use crate::path::multi_line;
use crate::reactive::{LadderStyle, process_ladder};
use crate::tree::{AttrValue, NodeId, NodeKind, Tree};

fn parse_in(cx: &mut Cx<'_>, expr: &str, directive: &str, tag: &str) -> TalcResult<String> {
    cx.exprs
        .parse(expr)
        .map_err(|e| TalcError::from(e).in_directive(directive, tag))
}

/// `var="name expr[; …]"` — assignment statements before the node.
pub(crate) fn process_var(tree: &mut Tree, node: NodeId, cx: &mut Cx<'_>) -> TalcResult<bool> {
    let Some(value) = take_attr(tree, node, "var") else {
        return Ok(false);
    };
    let tag = tag_of(tree, node);
    for clause in multi_line(&value) {
        let Some((name, expr)) = clause.split_once(char::is_whitespace) else {
            return Err(directive_error(
                "var",
                &tag,
                DirectiveErrorKind::MalformedClause { clause },
            ));
        };
        let code = parse_in(cx, expr, "var", &tag)?;
        let assign = tree.new_code(format!("${} = {};\n", name.trim(), code));
        tree.insert_before(node, assign);
    }
    Ok(true)
}

/// `if`/`elseif`/`else` for the generic dialect: same ladder scan, the
/// transpiler for branch expressions, no client-side retention.
pub(crate) fn process_if(tree: &mut Tree, node: NodeId, cx: &mut Cx<'_>) -> TalcResult<bool> {
    process_ladder(tree, node, cx, LadderStyle::Generic)
}

/// `tag-if="expr"` — keep the tag only when the expression is truthy.
pub(crate) fn process_tag_if(tree: &mut Tree, node: NodeId, cx: &mut Cx<'_>) -> TalcResult<bool> {
    let Some(value) = take_attr(tree, node, "tag-if") else {
        return Ok(false);
    };
    let tag = tag_of(tree, node);
    let code = parse_in(cx, &value, "tag-if", &tag)?;
    if let Some(element) = tree.element_mut(node) {
        element.omit_cond = Some(format!("!({})", code));
    }
    Ok(true)
}

/// `for="i start end"` (numeric range) or `for="init; cond; step"` (raw
/// clause passed through verbatim).
pub(crate) fn process_for(tree: &mut Tree, node: NodeId, cx: &mut Cx<'_>) -> TalcResult<bool> {
    let Some(value) = take_attr(tree, node, "for") else {
        return Ok(false);
    };
    let tag = tag_of(tree, node);

    let header = if value.contains(';') {
        // Raw clause: target code, emitted as-is.
        format!("for ({}) {{\n", value.trim())
    } else {
        let parts: Vec<&str> = value.split_whitespace().collect();
        let [name, start, end] = parts.as_slice() else {
            return Err(directive_error(
                "for",
                &tag,
                DirectiveErrorKind::MalformedLoop { header: value },
            ));
        };
        let start = parse_in(cx, start, "for", &tag)?;
        let end = parse_in(cx, end, "for", &tag)?;
        format!(
            "for (${name} = {start}; ${name} <= {end}; ${name}++) {{\n",
            name = name,
            start = start,
            end = end
        )
    };

    let open = tree.new_code(header);
    let close = tree.new_code("}\n");
    tree.insert_before(node, open);
    tree.insert_after(node, close);
    Ok(true)
}

/// `foreach="item list"` — plain iteration, no magic counters.
pub(crate) fn process_foreach(tree: &mut Tree, node: NodeId, cx: &mut Cx<'_>) -> TalcResult<bool> {
    let Some(value) = take_attr(tree, node, "foreach") else {
        return Ok(false);
    };
    let tag = tag_of(tree, node);
    let Some((item, list)) = value.trim().split_once(char::is_whitespace) else {
        return Err(directive_error(
            "foreach",
            &tag,
            DirectiveErrorKind::MalformedLoop { header: value },
        ));
    };
    let list_code = parse_in(cx, list, "foreach", &tag)?;
    let open = tree.new_code(format!(
        "foreach (tal_seq({}) as ${}) {{\n",
        list_code, item
    ));
    let close = tree.new_code("}\n");
    tree.insert_before(node, open);
    tree.insert_after(node, close);
    Ok(true)
}

/// `while="expr"` — wrap the node in a while loop.
pub(crate) fn process_while(tree: &mut Tree, node: NodeId, cx: &mut Cx<'_>) -> TalcResult<bool> {
    let Some(value) = take_attr(tree, node, "while") else {
        return Ok(false);
    };
    let tag = tag_of(tree, node);
    let code = parse_in(cx, &value, "while", &tag)?;
    let open = tree.new_code(format!("while ({}) {{\n", code));
    let close = tree.new_code("}\n");
    tree.insert_before(node, open);
    tree.insert_after(node, close);
    Ok(true)
}

/// `switch="expr"` with `case="value"`/`default` children: each qualifying
/// child is wrapped in its label and a trailing `break;`.
pub(crate) fn process_switch(tree: &mut Tree, node: NodeId, cx: &mut Cx<'_>) -> TalcResult<bool> {
    let Some(value) = take_attr(tree, node, "switch") else {
        return Ok(false);
    };
    let tag = tag_of(tree, node);
    let code = parse_in(cx, &value, "switch", &tag)?;

    // Statements between `switch {` and the first label are not valid in
    // the target, so whitespace-only text children are dropped.
    let children: Vec<NodeId> = tree.children(node).to_vec();
    for child in &children {
        if let NodeKind::Text(text) = tree.kind(*child) {
            if text.trim().is_empty() {
                tree.detach(*child);
            }
        }
    }

    let children: Vec<NodeId> = tree.children(node).to_vec();
    for child in children {
        if let Some(case) = take_attr(tree, child, "case") {
            let case_code = parse_in(cx, &case, "case", &tag)?;
            let label = tree.new_code(format!("case {}:\n", case_code));
            let brk = tree.new_code("break;\n");
            tree.insert_before(child, label);
            tree.insert_after(child, brk);
        } else if take_attr(tree, child, "default").is_some() {
            let label = tree.new_code("default:\n");
            let brk = tree.new_code("break;\n");
            tree.insert_before(child, label);
            tree.insert_after(child, brk);
        }
    }

    let open = tree.new_code(format!("switch ({}) {{\n", code));
    let close = tree.new_code("}\n");
    match tree.children(node).first().copied() {
        Some(first) => tree.insert_before(first, open),
        None => tree.append(node, open),
    }
    tree.append(node, close);
    Ok(true)
}

/// `class="expr"` — computed class attribute.
pub(crate) fn process_class(tree: &mut Tree, node: NodeId, cx: &mut Cx<'_>) -> TalcResult<bool> {
    let Some(element) = tree.element(node) else {
        return Ok(false);
    };
    // Only a literal `class` that still needs computing qualifies; markup
    // with a static class keeps it.
    if !element.attrs.iter().any(|a| {
        a.name == "class" && matches!(&a.value, AttrValue::Literal(v) if looks_dynamic(v))
    }) {
        return Ok(false);
    }
    let Some(value) = take_attr(tree, node, "class") else {
        return Ok(false);
    };
    let tag = tag_of(tree, node);
    let code = parse_in(cx, &value, "class", &tag)?;
    let attr_code = format!("echo ' class=\"' . tal_esc({}) . '\"';\n", code);
    if let Some(element) = tree.element_mut(node) {
        element.set_attr("class", AttrValue::Computed(attr_code));
    }
    Ok(true)
}

/// A class value is treated as an expression only when it cannot be a
/// plain class list.
fn looks_dynamic(value: &str) -> bool {
    value
        .chars()
        .any(|c| matches!(c, '(' | ')' | '?' | ':' | '+' | '\'' | '.' | '['))
}

/// `attr="name expr[; …]"` — computed attributes via the transpiler.
pub(crate) fn process_attr(tree: &mut Tree, node: NodeId, cx: &mut Cx<'_>) -> TalcResult<bool> {
    let Some(value) = take_attr(tree, node, "attr") else {
        return Ok(false);
    };
    let tag = tag_of(tree, node);
    for clause in multi_line(&value) {
        let Some((name, expr)) = clause.split_once(char::is_whitespace) else {
            return Err(directive_error(
                "attr",
                &tag,
                DirectiveErrorKind::MalformedClause { clause },
            ));
        };
        let code = parse_in(cx, expr, "attr", &tag)?;
        let attr_code = format!(
            "echo ' {name}=\"' . tal_esc({code}) . '\"';\n",
            name = name.trim(),
            code = code
        );
        if let Some(element) = tree.element_mut(node) {
            element.set_attr(name.trim(), AttrValue::Computed(attr_code));
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ntest::timeout(100)]
    fn test_looks_dynamic() {
        assert!(looks_dynamic("active ? 'on' : 'off'"));
        assert!(!looks_dynamic("btn btn-primary"));
    }
}

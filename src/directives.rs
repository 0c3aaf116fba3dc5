//! The directive registry and the path-dialect processors.
//!
//! Every directive is one variant of the closed [`Directive`] enum; the
//! compilation driver tries the registry in order and the first processor
//! that claims a node wins that visit. A processor that consumes its
//! attribute removes it from the node, so a later visit of the same node
//! falls through to the remaining directives and, eventually, to the
//! children. That removal is also what makes a second compile of an
//! already-compiled tree a no-op.

use crate::error::{DirectiveError, DirectiveErrorKind, TalcError, TalcResult};
use crate::expr::ExprCompiler;
use crate::generic;
use crate::path::{self, PathResolver, php_escape};
use crate::reactive;
use crate::tree::{AttrValue, NodeId, Tree};

/// Shared mutable state for one compile pass.
pub(crate) struct Cx<'a> {
    pub exprs: &'a mut ExprCompiler,
    /// Replacement nodes a processor spliced into a removed node's place;
    /// the driver enqueues these for later visits.
    pub requeue: Vec<NodeId>,
    /// Counter for unique runtime temporaries (`$tal_tmp0`, …).
    pub temp: usize,
}

impl Cx<'_> {
    pub fn temp_var(&mut self) -> String {
        let var = format!("$tal_tmp{}", self.temp);
        self.temp += 1;
        var
    }
}

/// One variant per directive kind, across all three dialects. Matched
/// exhaustively: adding a directive is a new variant plus one match arm.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Directive {
    // Path dialect.
    Define,
    Condition,
    Repeat,
    Content,
    Replace,
    Attributes,
    OmitTag,
    // Reactive dialect.
    Once,
    If,
    For,
    Show,
    Text,
    Html,
    Bind,
    // Generic dialect.
    GenVar,
    GenIf,
    GenTagIf,
    GenFor,
    GenForeach,
    GenWhile,
    GenSwitch,
    GenClass,
    GenAttr,
}

/// Which directive families are enabled for a compile.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// `define`, `condition`, `repeat`, `content`, `replace`, `attributes`,
    /// `omit-tag` — driven by the path resolver.
    Path,
    /// `if`/`elseif`/`else`, `for`, `show`, `text`, `html`, `bind:`/`:`,
    /// `{{ … }}`, `once` — driven by the reactive expression compiler.
    Reactive,
    /// `if`/`elseif`/`else`, `for`, `foreach`, `switch`/`case`/`default`,
    /// `var`, `while`, `class`, `attr`, `tag-if` — driven by the
    /// expression transpiler directly.
    Generic,
}

impl Directive {
    /// The ordered registry for a dialect set. Order encodes priority:
    /// definitions before conditions before loops before content before
    /// attribute rewrites before tag omission. When both the reactive and
    /// generic dialects are enabled, the reactive forms own the
    /// overlapping attribute names.
    pub fn registry(dialects: &[Dialect]) -> Vec<Self> {
        let path = dialects.contains(&Dialect::Path);
        let reactive = dialects.contains(&Dialect::Reactive);
        let generic = dialects.contains(&Dialect::Generic) && !reactive;

        let mut registry = Vec::new();
        if dialects.contains(&Dialect::Reactive) {
            registry.push(Self::Once);
        }
        if path {
            registry.push(Self::Define);
        }
        if dialects.contains(&Dialect::Generic) {
            registry.push(Self::GenVar);
        }
        if path {
            registry.push(Self::Condition);
        }
        if reactive {
            registry.push(Self::If);
        }
        if generic {
            registry.push(Self::GenIf);
        }
        if path {
            registry.push(Self::Repeat);
        }
        if reactive {
            registry.push(Self::For);
        }
        if generic {
            registry.push(Self::GenFor);
        }
        if dialects.contains(&Dialect::Generic) {
            registry.extend([Self::GenForeach, Self::GenWhile, Self::GenSwitch]);
        }
        if path {
            registry.push(Self::Content);
        }
        if dialects.contains(&Dialect::Reactive) {
            registry.extend([Self::Text, Self::Html]);
        }
        if path {
            registry.extend([Self::Replace, Self::Attributes]);
        }
        if dialects.contains(&Dialect::Reactive) {
            registry.extend([Self::Bind, Self::Show]);
        }
        if dialects.contains(&Dialect::Generic) {
            registry.extend([Self::GenClass, Self::GenAttr, Self::GenTagIf]);
        }
        if path {
            registry.push(Self::OmitTag);
        }
        registry
    }

    /// Try this directive on `node`. True means the node was claimed for
    /// this visit and the chain stops.
    pub fn process(self, tree: &mut Tree, node: NodeId, cx: &mut Cx<'_>) -> TalcResult<bool> {
        match self {
            Self::Define => process_define(tree, node, cx),
            Self::Condition => process_condition(tree, node, cx),
            Self::Repeat => process_repeat(tree, node, cx),
            Self::Content => process_content(tree, node, cx),
            Self::Replace => process_replace(tree, node, cx),
            Self::Attributes => process_attributes(tree, node, cx),
            Self::OmitTag => process_omit_tag(tree, node, cx),
            Self::Once => reactive::process_once(tree, node, cx),
            Self::If => reactive::process_if(tree, node, cx),
            Self::For => reactive::process_for(tree, node, cx),
            Self::Show => reactive::process_show(tree, node, cx),
            Self::Text => reactive::process_text(tree, node, cx),
            Self::Html => reactive::process_html(tree, node, cx),
            Self::Bind => reactive::process_bind(tree, node, cx),
            Self::GenVar => generic::process_var(tree, node, cx),
            Self::GenIf => generic::process_if(tree, node, cx),
            Self::GenTagIf => generic::process_tag_if(tree, node, cx),
            Self::GenFor => generic::process_for(tree, node, cx),
            Self::GenForeach => generic::process_foreach(tree, node, cx),
            Self::GenWhile => generic::process_while(tree, node, cx),
            Self::GenSwitch => generic::process_switch(tree, node, cx),
            Self::GenClass => generic::process_class(tree, node, cx),
            Self::GenAttr => generic::process_attr(tree, node, cx),
        }
    }
}

/// Take the literal value of `name` off the element, or return `None` when
/// the directive does not apply to this node.
pub(crate) fn take_attr(tree: &mut Tree, node: NodeId, name: &str) -> Option<String> {
    let element = tree.element_mut(node)?;
    if element.attr(name).is_none() {
        return None;
    }
    element.remove_attr(name)
}

pub(crate) fn directive_error(directive: &str, tag: &str, kind: DirectiveErrorKind) -> TalcError {
    TalcError::Directive(DirectiveError {
        directive: directive.to_string(),
        tag: tag.to_string(),
        kind,
    })
}

pub(crate) fn tag_of(tree: &Tree, node: NodeId) -> String {
    tree.element(node)
        .map_or_else(String::new, |e| e.tag.clone())
}

/// `define="name expr[; name expr…]"` — one assignment statement per
/// clause, inserted before the node in clause order.
fn process_define(tree: &mut Tree, node: NodeId, cx: &mut Cx<'_>) -> TalcResult<bool> {
    let Some(value) = take_attr(tree, node, "define") else {
        return Ok(false);
    };
    let tag = tag_of(tree, node);

    for clause in path::multi_line(&value) {
        let Some((name, expr)) = clause.split_once(char::is_whitespace) else {
            return Err(directive_error(
                "define",
                &tag,
                DirectiveErrorKind::MalformedClause { clause },
            ));
        };
        let code = PathResolver::new(cx.exprs)
            .resolve(expr)
            .map_err(|e| e.in_directive("define", &tag))?;
        let assign = tree.new_code(format!("${} = {};\n", name.trim(), code));
        tree.insert_before(node, assign);
    }
    Ok(true)
}

/// `condition="expr"` — wrap the node in `if (…) { … }`.
fn process_condition(tree: &mut Tree, node: NodeId, cx: &mut Cx<'_>) -> TalcResult<bool> {
    let Some(value) = take_attr(tree, node, "condition") else {
        return Ok(false);
    };
    let tag = tag_of(tree, node);
    let code = PathResolver::new(cx.exprs)
        .resolve(&value)
        .map_err(|e| e.in_directive("condition", &tag))?;

    let open = tree.new_code(format!("if ({}) {{\n", code));
    let close = tree.new_code("}\n");
    tree.insert_before(node, open);
    tree.insert_after(node, close);
    Ok(true)
}

/// `repeat="item list"` — wrap the node in a counting loop with the
/// 1-based index, 0-based key and total-count locals scoped to `item`.
fn process_repeat(tree: &mut Tree, node: NodeId, cx: &mut Cx<'_>) -> TalcResult<bool> {
    let Some(value) = take_attr(tree, node, "repeat") else {
        return Ok(false);
    };
    let tag = tag_of(tree, node);
    let Some((item, list)) = value.trim().split_once(char::is_whitespace) else {
        return Err(directive_error(
            "repeat",
            &tag,
            DirectiveErrorKind::MalformedLoop { header: value },
        ));
    };
    let list_code = PathResolver::new(cx.exprs)
        .resolve(list)
        .map_err(|e| e.in_directive("repeat", &tag))?;

    emit_counting_loop(tree, node, item, &list_code);
    Ok(true)
}

/// Shared by `repeat` and the reactive `for`: the loop statements around
/// `node`, maintaining the magic counters for `item`.
pub(crate) fn emit_counting_loop(tree: &mut Tree, node: NodeId, item: &str, list_code: &str) {
    let (seq, key, idx, cnt) = path::loop_locals(item);
    let open = tree.new_code(format!(
        "{seq} = tal_seq({list});\n{cnt} = count({seq});\nforeach ({seq} as {key} => ${item}) {{\n{idx} = {key} + 1;\n",
        seq = seq,
        cnt = cnt,
        key = key,
        idx = idx,
        item = item,
        list = list_code,
    ));
    let close = tree.new_code("}\n");
    tree.insert_before(node, open);
    tree.insert_after(node, close);
}

/// `content="[structure ]expr[ | … | default]"` — replace the children
/// with one output statement, escaped unless marked `structure`; the
/// `default` alternative falls back to the original static inner markup.
fn process_content(tree: &mut Tree, node: NodeId, cx: &mut Cx<'_>) -> TalcResult<bool> {
    let Some(value) = take_attr(tree, node, "content") else {
        return Ok(false);
    };
    let tag = tag_of(tree, node);
    let code = output_statement(tree, node, cx, &value, "content", &tag)?;
    tree.clear_children(node);
    if let Some(code) = code {
        let output = tree.new_code(code);
        tree.append(node, output);
    }
    Ok(true)
}

/// `replace="[structure ]expr"` — remove the node, leaving one output
/// statement (or nothing at all when the expression is empty).
fn process_replace(tree: &mut Tree, node: NodeId, cx: &mut Cx<'_>) -> TalcResult<bool> {
    let Some(value) = take_attr(tree, node, "replace") else {
        return Ok(false);
    };
    let tag = tag_of(tree, node);
    let code = output_statement(tree, node, cx, &value, "replace", &tag)?;
    if let Some(code) = code {
        let output = tree.new_code(code);
        tree.insert_before(node, output);
        cx.requeue.push(output);
    }
    tree.detach(node);
    Ok(true)
}

/// Build the output statement both `content` and `replace` emit. Returns
/// `None` when the expression resolves to nothing.
fn output_statement(
    tree: &Tree,
    node: NodeId,
    cx: &mut Cx<'_>,
    value: &str,
    directive: &str,
    tag: &str,
) -> TalcResult<Option<String>> {
    let structure = PathResolver::is_structure(value);
    let expr = PathResolver::structure(value);
    if expr.is_empty() {
        return Ok(None);
    }

    let mut alternatives = path::split_alternatives(expr);
    let wants_default = alternatives.last().is_some_and(|a| a == "default");
    if wants_default {
        alternatives.pop();
    }

    let mut resolver = PathResolver::new(cx.exprs);
    let mut compiled = Vec::with_capacity(alternatives.len());
    for alternative in &alternatives {
        compiled.push(
            resolver
                .resolve(alternative)
                .map_err(|e| e.in_directive(directive, tag))?,
        );
    }
    if compiled.is_empty() {
        return Ok(None);
    }
    let chain = if compiled.len() == 1 {
        compiled.remove(0)
    } else {
        format!("({})", compiled.join(" ?: "))
    };

    let emit = |value: &str| {
        if structure {
            format!("echo {};\n", value)
        } else {
            format!("echo tal_esc({});\n", value)
        }
    };

    if wants_default {
        let fallback = tree.inner_markup(node);
        let tmp = cx.temp_var();
        return Ok(Some(format!(
            "{tmp} = {chain};\nif ({tmp} !== null && {tmp} !== '') {{\n{then}}} else {{\necho '{fallback}';\n}}\n",
            tmp = tmp,
            chain = chain,
            then = emit(&tmp),
            fallback = php_escape(&fallback),
        )));
    }
    Ok(Some(emit(&chain)))
}

/// `attributes="name [nothing:|default:]expr[; …]"` — rewrite attribute
/// values to computed output statements, preserving attribute order.
fn process_attributes(tree: &mut Tree, node: NodeId, cx: &mut Cx<'_>) -> TalcResult<bool> {
    let Some(value) = take_attr(tree, node, "attributes") else {
        return Ok(false);
    };
    let tag = tag_of(tree, node);

    for clause in path::multi_line(&value) {
        let Some((name, rest)) = clause.split_once(char::is_whitespace) else {
            return Err(directive_error(
                "attributes",
                &tag,
                DirectiveErrorKind::MalformedClause { clause },
            ));
        };
        let name = name.trim();
        let code = compute_attribute(tree, node, cx, name, rest.trim(), "attributes", &tag)?;
        if let Some(element) = tree.element_mut(node) {
            element.set_attr(name, AttrValue::Computed(code));
        }
    }
    Ok(true)
}

/// The computed code for one attribute clause: plain, `nothing:` (drop the
/// attribute when the value is empty) or `default:` (fall back to the
/// original literal value). A trailing `| nothing`/`| default` alternative
/// is the equivalent spelling.
pub(crate) fn compute_attribute(
    tree: &Tree,
    node: NodeId,
    cx: &mut Cx<'_>,
    name: &str,
    rest: &str,
    directive: &str,
    tag: &str,
) -> TalcResult<String> {
    let (mode, expr) = if let Some(expr) = rest.strip_prefix("nothing:") {
        (AttrMode::Nothing, expr.trim())
    } else if let Some(expr) = rest.strip_prefix("default:") {
        (AttrMode::Default, expr.trim())
    } else {
        (AttrMode::Plain, rest)
    };

    let mut alternatives = path::split_alternatives(expr);
    let mode = match alternatives.last().map(String::as_str) {
        Some("nothing") => {
            alternatives.pop();
            AttrMode::Nothing
        }
        Some("default") => {
            alternatives.pop();
            AttrMode::Default
        }
        _ => mode,
    };

    let mut resolver = PathResolver::new(cx.exprs);
    let mut compiled = Vec::with_capacity(alternatives.len());
    for alternative in &alternatives {
        compiled.push(
            resolver
                .resolve(alternative)
                .map_err(|e| e.in_directive(directive, tag))?,
        );
    }
    let chain = match compiled.len() {
        0 => "null".to_string(),
        1 => compiled.remove(0),
        _ => format!("({})", compiled.join(" ?: ")),
    };

    let emit_attr = |value: &str| {
        format!(
            "echo ' {name}=\"' . tal_esc({value}) . '\"';\n",
            name = name,
            value = value
        )
    };

    Ok(match mode {
        AttrMode::Plain => emit_attr(&chain),
        AttrMode::Nothing => {
            let tmp = cx.temp_var();
            format!(
                "{tmp} = {chain};\nif ({tmp} !== null && {tmp} !== '') {{\n{then}}}\n",
                tmp = tmp,
                chain = chain,
                then = emit_attr(&tmp),
            )
        }
        AttrMode::Default => {
            let original = tree
                .element(node)
                .and_then(|e| e.attr(name))
                .unwrap_or_default()
                .to_string();
            let tmp = cx.temp_var();
            format!(
                "{tmp} = {chain};\nif ({tmp} !== null && {tmp} !== '') {{\n{then}}} else {{\necho ' {name}=\"{original}\"';\n}}\n",
                tmp = tmp,
                chain = chain,
                then = emit_attr(&tmp),
                name = name,
                original = php_escape(&crate::tree::escape_attr(&original)),
            )
        }
    })
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum AttrMode {
    Plain,
    Nothing,
    Default,
}

/// `omit-tag="[expr]"` — drop the tag literals (unconditionally when the
/// expression is empty, otherwise when it is truthy) while keeping the
/// children.
fn process_omit_tag(tree: &mut Tree, node: NodeId, cx: &mut Cx<'_>) -> TalcResult<bool> {
    let Some(value) = take_attr(tree, node, "omit-tag") else {
        return Ok(false);
    };
    let tag = tag_of(tree, node);

    if value.trim().is_empty() {
        let children = tree.replace_with_children(node);
        cx.requeue.extend(children);
        return Ok(true);
    }

    let code = PathResolver::new(cx.exprs)
        .resolve(&value)
        .map_err(|e| e.in_directive("omit-tag", &tag))?;
    if let Some(element) = tree.element_mut(node) {
        element.omit_cond = Some(code);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ntest::timeout(100)]
    fn test_registry_order_defines_before_conditions_before_loops() {
        let registry = Directive::registry(&[Dialect::Path]);
        let pos = |d: Directive| registry.iter().position(|&r| r == d).unwrap();
        assert!(pos(Directive::Define) < pos(Directive::Condition));
        assert!(pos(Directive::Condition) < pos(Directive::Repeat));
        assert!(pos(Directive::Repeat) < pos(Directive::Content));
        assert!(pos(Directive::Content) < pos(Directive::Replace));
        assert!(pos(Directive::Replace) < pos(Directive::Attributes));
        assert!(pos(Directive::Attributes) < pos(Directive::OmitTag));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_reactive_owns_overlapping_names() {
        let registry = Directive::registry(&[Dialect::Reactive, Dialect::Generic]);
        assert!(registry.contains(&Directive::If));
        assert!(!registry.contains(&Directive::GenIf));
        assert!(registry.contains(&Directive::GenSwitch));

        let registry = Directive::registry(&[Dialect::Generic]);
        assert!(registry.contains(&Directive::GenIf));
        assert!(registry.contains(&Directive::GenFor));
    }
}

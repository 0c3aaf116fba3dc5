//! The compilation driver: walks the token tree over an explicit worklist,
//! applies the directive registry to each node, interpolates text nodes,
//! and serializes the mutated tree to PHP source text.
//!
//! The walk is depth-first over node ids rather than live references. A
//! claimed node goes back on the worklist so its remaining directives get
//! their turn on a later pass (its consumed attribute is gone, so the
//! passes terminate); a processor that removes its node reports the
//! replacement nodes and those are enqueued in its place. This gives
//! splicing during iteration a defined, testable order.

use crate::cache::{self, ExprCache};
use crate::directives::{Cx, Directive};
use crate::error::TalcResult;
use crate::expr::ExprCompiler;
use crate::markup;
use crate::path::{PathResolver, php_escape};
use crate::reactive;
use crate::tree::{AttrValue, Element, NodeId, NodeKind, Tree, escape_attr};

pub use crate::directives::Dialect;

/// Configuration for a [`Compiler`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Enabled directive families, in no particular order. Defaults to the
    /// two overlapping dialects; the generic scripting dialect is opt-in.
    pub dialects: Vec<Dialect>,
    /// Capacity of the expression memo (bounded LRU). Zero disables it.
    pub memo_capacity: usize,
    /// Interpolate `$name`/`${path}` and `{{ expr }}` in text nodes.
    pub interpolate: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            dialects: vec![Dialect::Path, Dialect::Reactive],
            memo_capacity: cache::DEFAULT_CAPACITY,
            interpolate: true,
        }
    }
}

/// Compiles markup templates to PHP source text.
///
/// One compiler owns one expression memo; compiling the same expression
/// twice within an instance reuses the first result. A tree belongs to
/// exactly one compile invocation — the compiler mutates it in place and
/// the serialized text is the artifact worth keeping.
#[derive(Debug)]
pub struct Compiler {
    options: CompileOptions,
    registry: Vec<Directive>,
    exprs: ExprCompiler,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self::with_options(CompileOptions::default())
    }

    pub fn with_options(options: CompileOptions) -> Self {
        let registry = Directive::registry(&options.dialects);
        let exprs = ExprCompiler::with_cache(ExprCache::new(options.memo_capacity));
        Self {
            options,
            registry,
            exprs,
        }
    }

    /// Compile template source to PHP.
    ///
    /// # Errors
    /// - [`crate::TalcError::Markup`] if the source is not well-formed markup.
    /// - [`crate::TalcError::Syntax`] / [`crate::TalcError::Directive`] if a
    ///   directive or embedded expression is malformed.
    pub fn compile(&mut self, source: &str) -> TalcResult<String> {
        tracing::debug!("compiling template ({} bytes)", source.len());
        let mut tree = markup::parse(source)?;
        self.compile_tree(&mut tree)?;
        Ok(Self::serialize(&tree))
    }

    /// Run the directive passes over an already-built tree, mutating it in
    /// place. Compiling a tree a second time is a no-op: every directive
    /// attribute was consumed by the first pass.
    pub fn compile_tree(&mut self, tree: &mut Tree) -> TalcResult<()> {
        let mut cx = Cx {
            exprs: &mut self.exprs,
            requeue: Vec::new(),
            temp: 0,
        };

        let mut stack: Vec<NodeId> = tree.children(tree.root()).to_vec();
        stack.reverse();

        while let Some(id) = stack.pop() {
            if !tree.is_attached(id) {
                continue;
            }
            match tree.kind(id) {
                NodeKind::Root | NodeKind::Code(_) => {}
                NodeKind::Text(text) => {
                    if self.options.interpolate {
                        let text = text.clone();
                        if let Some(code) = interpolate_text(&self.options, &mut cx, &text)? {
                            *tree.kind_mut(id) = NodeKind::Code(code);
                        }
                    }
                }
                NodeKind::Element(_) => {
                    let mut claimed = false;
                    for directive in &self.registry {
                        if directive.process(tree, id, &mut cx)? {
                            tracing::trace!("{:?} claimed node {:?}", directive, id);
                            claimed = true;
                            break;
                        }
                    }
                    if claimed {
                        // Replacement nodes first (in document order), then
                        // the node itself for its remaining directives.
                        for spliced in cx.requeue.drain(..).rev() {
                            stack.push(spliced);
                        }
                        if tree.is_attached(id) {
                            stack.push(id);
                        }
                    } else {
                        let children = tree.children(id);
                        for &child in children.iter().rev() {
                            stack.push(child);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Serialize a compiled tree to the PHP program text. Static markup is
    /// coalesced into `echo '…';` statements; code nodes and computed
    /// attributes are emitted in document order.
    pub fn serialize(tree: &Tree) -> String {
        let mut emitter = Emitter::default();
        emitter.node(tree, tree.root());
        emitter.flush();
        emitter.out
    }
}

/// Rewrite a text node with interpolation markers into echo statements.
/// Returns `None` when the text is purely static.
fn interpolate_text(
    options: &CompileOptions,
    cx: &mut Cx<'_>,
    text: &str,
) -> TalcResult<Option<String>> {
    let path_on = options.dialects.contains(&Dialect::Path);
    let reactive_on = options.dialects.contains(&Dialect::Reactive);

    let mut statements: Vec<String> = Vec::new();
    let mut literal = String::new();
    let mut dynamic = false;
    let mut rest = text;

    while !rest.is_empty() {
        if reactive_on {
            if let Some(after) = rest.strip_prefix("{{") {
                if let Some(end) = after.find("}}") {
                    let expr = &after[..end];
                    let code = reactive::compile(expr)?;
                    flush_echo(&mut statements, &mut literal);
                    statements.push(format!("echo tal_esc({});\n", code));
                    dynamic = true;
                    rest = &after[end + 2..];
                    continue;
                }
            }
        }
        if path_on && rest.starts_with('$') {
            if let Some(after) = rest.strip_prefix("$$") {
                literal.push('$');
                rest = after;
                continue;
            }
            if let Some(after) = rest.strip_prefix("${") {
                if let Some(end) = after.find('}') {
                    let code = PathResolver::new(cx.exprs).variable(&after[..end])?;
                    flush_echo(&mut statements, &mut literal);
                    statements.push(format!("echo tal_esc({});\n", code));
                    dynamic = true;
                    rest = &after[end + 1..];
                    continue;
                }
            }
            let after = &rest[1..];
            let end = after
                .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                .unwrap_or(after.len());
            if end > 0 && after[..1].chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_') {
                let code = PathResolver::new(cx.exprs).variable(&after[..end])?;
                flush_echo(&mut statements, &mut literal);
                statements.push(format!("echo tal_esc({});\n", code));
                dynamic = true;
                rest = &after[end..];
                continue;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            literal.push(c);
        }
        rest = chars.as_str();
    }

    if !dynamic {
        return Ok(None);
    }
    flush_echo(&mut statements, &mut literal);
    Ok(Some(statements.concat()))
}

fn flush_echo(statements: &mut Vec<String>, literal: &mut String) {
    if !literal.is_empty() {
        statements.push(format!("echo '{}';\n", php_escape(literal)));
        literal.clear();
    }
}

/// Serializer state: `buf` accumulates static markup until a code boundary
/// forces a flush into one echo statement.
#[derive(Default)]
struct Emitter {
    out: String,
    buf: String,
}

impl Emitter {
    fn flush(&mut self) {
        if !self.buf.is_empty() {
            self.out
                .push_str(&format!("echo '{}';\n", php_escape(&self.buf)));
            self.buf.clear();
        }
    }

    fn node(&mut self, tree: &Tree, id: NodeId) {
        match tree.kind(id) {
            NodeKind::Root => {
                for &child in tree.children(id) {
                    self.node(tree, child);
                }
            }
            NodeKind::Text(text) => self.buf.push_str(text),
            NodeKind::Code(code) => {
                self.flush();
                self.out.push_str(code);
                if !code.ends_with('\n') {
                    self.out.push('\n');
                }
            }
            NodeKind::Element(element) => match &element.omit_cond {
                None => {
                    self.open_tag(element);
                    if !element.void {
                        for &child in tree.children(id) {
                            self.node(tree, child);
                        }
                        self.buf.push_str(&format!("</{}>", element.tag));
                    }
                }
                Some(cond) => {
                    self.flush();
                    let guard = format!("$tal_omit{}", id.0);
                    self.out.push_str(&format!("{} = ({});\n", guard, cond));
                    self.out.push_str(&format!("if (!{}) {{\n", guard));
                    self.open_tag(element);
                    self.flush();
                    self.out.push_str("}\n");
                    if !element.void {
                        for &child in tree.children(id) {
                            self.node(tree, child);
                        }
                        self.flush();
                        self.out.push_str(&format!(
                            "if (!{}) {{\necho '</{}>';\n}}\n",
                            guard, element.tag
                        ));
                    }
                }
            },
        }
    }

    fn open_tag(&mut self, element: &Element) {
        self.buf.push('<');
        self.buf.push_str(&element.tag);
        for attr in &element.attrs {
            match &attr.value {
                AttrValue::Literal(value) => {
                    self.buf.push(' ');
                    self.buf.push_str(&attr.name);
                    self.buf.push_str("=\"");
                    self.buf.push_str(&escape_attr(value));
                    self.buf.push('"');
                }
                AttrValue::Computed(code) => {
                    self.flush();
                    self.out.push_str(code);
                    if !code.ends_with('\n') {
                        self.out.push('\n');
                    }
                }
            }
        }
        for (name, value) in &element.retained {
            self.buf.push(' ');
            self.buf.push_str(name);
            self.buf.push_str("=\"");
            self.buf.push_str(&escape_attr(value));
            self.buf.push('"');
        }
        if element.void {
            self.buf.push_str("/>");
        } else {
            self.buf.push('>');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(source: &str) -> String {
        Compiler::new().compile(source).unwrap()
    }

    fn compile_with(dialects: &[Dialect], source: &str) -> String {
        let options = CompileOptions {
            dialects: dialects.to_vec(),
            ..CompileOptions::default()
        };
        Compiler::with_options(options).compile(source).unwrap()
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_static_markup_single_echo() {
        let code = compile("<p class=\"x\">hi</p>");
        assert_eq!(code, "echo '<p class=\"x\">hi</p>';\n");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_condition_wraps_node() {
        let code = compile("<p condition=\"user/active\">on</p>");
        assert_eq!(
            code,
            "if ($user['active']) {\necho '<p>on</p>';\n}\n"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_define_inserts_assignments_in_clause_order() {
        let code = compile("<p define=\"a item/x; b item/y\">t</p>");
        let a = code.find("$a = $item['x'];").unwrap();
        let b = code.find("$b = $item['y'];").unwrap();
        let body = code.find("echo '<p>t</p>';").unwrap();
        assert!(a < b && b < body);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_condition_outside_repeat_on_same_node() {
        // Registry order: condition wraps first, repeat wraps inside it.
        let code = compile("<li condition=\"items\" repeat=\"item items\">x</li>");
        let if_pos = code.find("if ($items) {").unwrap();
        let loop_pos = code.find("foreach (").unwrap();
        assert!(if_pos < loop_pos);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_text_interpolation_is_escaped() {
        let code = compile("<p>Hello $name!</p>");
        assert_eq!(
            code,
            "echo '<p>';\necho 'Hello ';\necho tal_esc($name);\necho '!';\necho '</p>';\n"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_braced_interpolation_and_dollar_escape() {
        let code = compile("<p>$$9 ${cart/total}</p>");
        assert!(code.contains("echo '$9 ';"));
        assert!(code.contains("echo tal_esc($cart['total']);"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_reactive_interpolation() {
        let code = compile("<p>{{ user.name }}</p>");
        assert!(code.contains("echo tal_esc(tal_mem($user)->name);"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_idempotent_second_compile() {
        let mut compiler = Compiler::new();
        let mut tree = markup::parse("<p condition=\"ok\" content=\"msg\">x</p>").unwrap();
        compiler.compile_tree(&mut tree).unwrap();
        let first = Compiler::serialize(&tree);
        compiler.compile_tree(&mut tree).unwrap();
        let second = Compiler::serialize(&tree);
        assert_eq!(first, second);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_omit_tag_unconditional_keeps_children() {
        let code = compile("<div omit-tag=\"\"><b>x</b></div>");
        assert_eq!(code, "echo '<b>x</b>';\n");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_omit_tag_conditional_guards_tag_literals() {
        let code = compile("<div omit-tag=\"bare\"><b>x</b></div>");
        assert!(code.contains("= ($bare);"));
        assert!(code.contains("echo '<div>';"));
        assert!(code.contains("echo '<b>x</b>';"));
        assert!(code.contains("echo '</div>';"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_generic_switch() {
        let code = compile_with(
            &[Dialect::Generic],
            "<div switch=\"kind\"><p case=\"1\">one</p><p default=\"\">other</p></div>",
        );
        assert!(code.contains("switch ($kind) {"));
        assert!(code.contains("case 1:"));
        assert!(code.contains("default:"));
        assert_eq!(code.matches("break;").count(), 2);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_escape_hatch_code_passthrough() {
        let code = compile("<div><?php $x = 1; ?></div>");
        assert!(code.contains("$x = 1;"));
        assert!(!code.contains("echo '$x"));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_expression_error_carries_directive_context() {
        let err = Compiler::new()
            .compile("<p condition=\"a ** b\">x</p>")
            .unwrap_err();
        let crate::error::TalcError::Directive(inner) = err else {
            panic!("expected a directive error");
        };
        assert_eq!(inner.directive, "condition");
        assert_eq!(inner.tag, "p");
    }
}

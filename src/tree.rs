//! The token tree the compiler mutates in place: an arena of element, text
//! and code nodes addressed by [`NodeId`].
//!
//! Processors splice generated code around nodes while a walk is in
//! progress, so nodes are referred to by index rather than by live
//! reference; removal detaches a node from its parent but leaves the slot
//! in the arena (the id simply becomes unattached).

/// Index of a node inside a [`Tree`] arena.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// An attribute value: either the literal text from the source markup, or a
/// fragment of generated code that emits the attribute at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Literal(String),
    /// Raw statements emitted inside the open tag; the code is responsible
    /// for echoing the leading space, the attribute name and the quotes.
    Computed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub name: String,
    pub value: AttrValue,
}

/// An element node. Attribute order is insertion order and is preserved on
/// re-serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<Attr>,
    /// Directive attributes already consumed by the compiler but kept for
    /// re-serialization (client-side duplication of the reactive dialect).
    pub retained: Vec<(String, String)>,
    /// Self-closing in the source (`<br/>`, void elements).
    pub void: bool,
    /// Subtree is server-only: consumed reactive attributes are dropped
    /// instead of retained.
    pub once: bool,
    /// When set, the open/close tag literals are emitted only if this
    /// expression is falsy at runtime; the children are kept either way.
    pub omit_cond: Option<String>,
}

impl Element {
    pub fn new<T: Into<String>>(tag: T) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            retained: Vec::new(),
            void: false,
            once: false,
            omit_cond: None,
        }
    }

    /// Literal value of the named attribute, if present.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.iter().find(|a| a.name == name).and_then(|a| match &a.value {
            AttrValue::Literal(value) => Some(value.as_str()),
            AttrValue::Computed(_) => None,
        })
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|a| a.name == name)
    }

    /// Append or overwrite, preserving the position of an existing entry.
    pub fn set_attr<N: Into<String>>(&mut self, name: N, value: AttrValue) {
        let name = name.into();
        match self.attrs.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value,
            None => self.attrs.push(Attr { name, value }),
        }
    }

    /// Remove the named attribute, returning its literal value if it had one.
    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let index = self.attrs.iter().position(|a| a.name == name)?;
        match self.attrs.remove(index).value {
            AttrValue::Literal(value) => Some(value),
            AttrValue::Computed(_) => None,
        }
    }

    /// First attribute whose name starts with `prefix`, e.g. `bind:`.
    pub fn attr_with_prefix(&self, prefix: &str) -> Option<(String, String)> {
        self.attrs.iter().find_map(|a| {
            if let AttrValue::Literal(value) = &a.value {
                if a.name.starts_with(prefix) && a.name.len() > prefix.len() {
                    return Some((a.name.clone(), value.clone()));
                }
            }
            None
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Synthetic document root; never serialized itself.
    Root,
    Element(Element),
    Text(String),
    /// Raw target-language source emitted verbatim at this position.
    Code(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed markup tree. Built once per template, mutated in place by
/// one compile invocation, then serialized and discarded.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
            }],
            root: NodeId(0),
        }
    }

    pub const fn root(&self) -> NodeId {
        self.root
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Create a detached element node.
    pub fn new_element(&mut self, element: Element) -> NodeId {
        self.alloc(NodeKind::Element(element))
    }

    /// Create a detached text node.
    pub fn new_text<T: Into<String>>(&mut self, text: T) -> NodeId {
        self.alloc(NodeKind::Text(text.into()))
    }

    /// Create a detached code node.
    pub fn new_code<T: Into<String>>(&mut self, code: T) -> NodeId {
        self.alloc(NodeKind::Code(code.into()))
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.0].kind
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(element) => Some(element),
            NodeKind::Root | NodeKind::Text(_) | NodeKind::Code(_) => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Element(element) => Some(element),
            NodeKind::Root | NodeKind::Text(_) | NodeKind::Code(_) => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let index = siblings.iter().position(|&c| c == id)?;
        siblings.get(index + 1).copied()
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let index = siblings.iter().position(|&c| c == id)?;
        index.checked_sub(1).and_then(|i| siblings.get(i).copied())
    }

    /// A node is attached when following parent links reaches the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Insert `new` as the sibling immediately before `anchor`.
    pub fn insert_before(&mut self, anchor: NodeId, new: NodeId) {
        let parent = self.parent(anchor).unwrap_or(self.root);
        self.detach(new);
        let index = self.nodes[parent.0]
            .children
            .iter()
            .position(|&c| c == anchor)
            .unwrap_or(0);
        self.nodes[new.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(index, new);
    }

    /// Insert `new` as the sibling immediately after `anchor`.
    pub fn insert_after(&mut self, anchor: NodeId, new: NodeId) {
        let parent = self.parent(anchor).unwrap_or(self.root);
        self.detach(new);
        let index = self.nodes[parent.0]
            .children
            .iter()
            .position(|&c| c == anchor)
            .map_or(self.nodes[parent.0].children.len(), |i| i + 1);
        self.nodes[new.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(index, new);
    }

    /// Detach a node from its parent. The node and its subtree stay in the
    /// arena and can be re-inserted.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
    }

    /// Remove all children of `id`, detaching each.
    pub fn clear_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.nodes[id.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
        }
    }

    /// Replace `id` with its own children (unwrap), returning them in
    /// document order.
    pub fn replace_with_children(&mut self, id: NodeId) -> Vec<NodeId> {
        let parent = match self.parent(id) {
            Some(parent) => parent,
            None => return Vec::new(),
        };
        let children = std::mem::take(&mut self.nodes[id.0].children);
        let index = self.nodes[parent.0]
            .children
            .iter()
            .position(|&c| c == id)
            .unwrap_or(0);
        self.nodes[parent.0].children.remove(index);
        self.nodes[id.0].parent = None;
        for (offset, &child) in children.iter().enumerate() {
            self.nodes[child.0].parent = Some(parent);
            self.nodes[parent.0].children.insert(index + offset, child);
        }
        children
    }

    /// Serialize a node (and its subtree) back to source markup. Computed
    /// attributes and code nodes are not representable as markup and are
    /// skipped; this is used for the static-fallback copies the `content`
    /// and `attributes` directives capture before rewriting.
    pub fn to_markup(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_markup(id, &mut out);
        out
    }

    /// Serialize only the children of `id` to source markup.
    pub fn inner_markup(&self, id: NodeId) -> String {
        let mut out = String::new();
        for &child in &self.nodes[id.0].children {
            self.write_markup(child, &mut out);
        }
        out
    }

    fn write_markup(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.0].kind {
            NodeKind::Root => {
                for &child in &self.nodes[id.0].children {
                    self.write_markup(child, out);
                }
            }
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Code(_) => {}
            NodeKind::Element(element) => {
                out.push('<');
                out.push_str(&element.tag);
                for attr in &element.attrs {
                    if let AttrValue::Literal(value) = &attr.value {
                        out.push(' ');
                        out.push_str(&attr.name);
                        out.push_str("=\"");
                        out.push_str(&escape_attr(value));
                        out.push('"');
                    }
                }
                for (name, value) in &element.retained {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_attr(value));
                    out.push('"');
                }
                if element.void {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for &child in &self.nodes[id.0].children {
                    self.write_markup(child, out);
                }
                out.push_str("</");
                out.push_str(&element.tag);
                out.push('>');
            }
        }
    }
}

pub(crate) fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> (Tree, NodeId, NodeId, NodeId) {
        let mut tree = Tree::new();
        let div = tree.new_element(Element::new("div"));
        let text = tree.new_text("hello");
        let span = tree.new_element(Element::new("span"));
        let root = tree.root();
        tree.append(root, div);
        tree.append(div, text);
        tree.append(div, span);
        (tree, div, text, span)
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_sibling_navigation() {
        let (tree, div, text, span) = sample_tree();
        assert_eq!(tree.next_sibling(text), Some(span));
        assert_eq!(tree.prev_sibling(span), Some(text));
        assert_eq!(tree.next_sibling(span), None);
        assert_eq!(tree.parent(text), Some(div));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_insert_before_and_after() {
        let (mut tree, div, text, span) = sample_tree();
        let before = tree.new_code("A");
        let after = tree.new_code("B");
        tree.insert_before(text, before);
        tree.insert_after(span, after);
        assert_eq!(tree.children(div), &[before, text, span, after]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_detach_leaves_node_unattached() {
        let (mut tree, div, text, _span) = sample_tree();
        tree.detach(text);
        assert!(!tree.is_attached(text));
        assert!(tree.is_attached(div));
        assert_eq!(tree.children(div).len(), 1);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_replace_with_children_preserves_order() {
        let (mut tree, div, text, span) = sample_tree();
        let root = tree.root();
        let spliced = tree.replace_with_children(div);
        assert_eq!(spliced, vec![text, span]);
        assert_eq!(tree.children(root), &[text, span]);
        assert!(!tree.is_attached(div));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_attr_order_preserved_on_serialization() {
        let mut tree = Tree::new();
        let mut element = Element::new("a");
        element.set_attr("href", AttrValue::Literal("/x".to_string()));
        element.set_attr("title", AttrValue::Literal("t".to_string()));
        let a = tree.new_element(element);
        let root = tree.root();
        tree.append(root, a);
        assert_eq!(tree.to_markup(a), "<a href=\"/x\" title=\"t\"></a>");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_set_attr_keeps_position() {
        let mut element = Element::new("a");
        element.set_attr("href", AttrValue::Literal("/x".to_string()));
        element.set_attr("title", AttrValue::Literal("t".to_string()));
        element.set_attr("href", AttrValue::Computed("echo 1;".to_string()));
        assert_eq!(element.attrs[0].name, "href");
        assert!(matches!(element.attrs[0].value, AttrValue::Computed(_)));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_inner_markup_for_fallbacks() {
        let (tree, div, _text, _span) = sample_tree();
        assert_eq!(tree.inner_markup(div), "hello<span></span>");
    }
}

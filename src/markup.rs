//! Markup tokenizer: builds a [`Tree`] from template source text.
//!
//! Deliberately permissive where browsers are: unknown tags nest freely,
//! attribute values may use either quote style, and comments and doctypes
//! pass through as text. Attribute shape and open/close tag pairing are
//! strict: a directive on a mispaired element would wrap the wrong subtree.

use crate::error::{MarkupError, MarkupErrorKind};
use crate::tree::{Attr, AttrValue, Element, NodeId, Tree};

type ParseResult<T> = Result<T, MarkupError>;

/// Tags that never take a close tag.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// The starting location of the current line
    line_start_pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser {
            input,
            pos: 0,
            line: 1,
            line_start_pos: 0,
        }
    }

    #[inline]
    fn current_column(&self) -> usize {
        self.pos - self.line_start_pos + 1
    }

    #[inline]
    fn make_error(&self, kind: MarkupErrorKind) -> MarkupError {
        MarkupError {
            line: self.line,
            column: self.current_column(),
            kind,
        }
    }

    /// Advance by one char, updating the line counter on newlines.
    #[inline]
    fn advance_by_char(&mut self, current_char: char, char_len: usize) {
        if current_char == '\n' {
            self.line += 1;
            self.line_start_pos = self.pos + char_len;
        }
        self.pos += char_len;
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.advance_by_char(c, c.len_utf8());
        Some(c)
    }

    fn consume(&mut self, s: &str) -> bool {
        if self.peek(s) {
            // Delimiters never contain newlines except inside consumed text,
            // which goes through bump(); advancing bytewise is fine here.
            for _ in 0..s.len() {
                self.bump();
            }
            true
        } else {
            false
        }
    }

    fn expect(&mut self, s: &str) -> ParseResult<()> {
        if self.consume(s) {
            Ok(())
        } else {
            Err(self.make_error(MarkupErrorKind::Expected {
                description: format!(
                    "'{}', found '{}'",
                    s,
                    &self.input[self.pos..std::cmp::min(self.pos + s.len() + 10, self.input.len())]
                ),
            }))
        }
    }

    fn consume_whitespace(&mut self) {
        while self.peek_char().is_some_and(|c| c.is_ascii_whitespace()) {
            self.bump();
        }
    }

    /// Consume everything up to (not including) `delimiter`, or to EOF.
    fn consume_until(&mut self, delimiter: &str) -> &'a str {
        let start = self.pos;
        while !self.eof() && !self.peek(delimiter) {
            self.bump();
        }
        &self.input[start..self.pos]
    }

    fn consume_name(&mut self) -> &'a str {
        let start = self.pos;
        while self
            .peek_char()
            .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        {
            self.bump();
        }
        &self.input[start..self.pos]
    }

    fn parse_attributes(&mut self) -> ParseResult<Vec<Attr>> {
        let mut attrs = Vec::new();
        loop {
            self.consume_whitespace();
            match self.peek_char() {
                None => {
                    return Err(self.make_error(MarkupErrorKind::unexpected_eof(Some(
                        ">".to_string(),
                    ))));
                }
                Some('>') | Some('/') => return Ok(attrs),
                Some(c) if c.is_ascii_alphanumeric() || c == '_' || c == ':' => {}
                Some(other) => {
                    return Err(self.make_error(MarkupErrorKind::MalformedAttribute {
                        at_char: other.to_string(),
                    }));
                }
            }

            let name = self.consume_name().to_string();
            self.consume_whitespace();
            let value = if self.consume("=") {
                self.consume_whitespace();
                match self.peek_char() {
                    Some(q @ ('"' | '\'')) => {
                        self.bump();
                        let value = self.consume_until(&q.to_string()).to_string();
                        self.expect(&q.to_string())?;
                        value
                    }
                    Some(_) => {
                        let start = self.pos;
                        while self
                            .peek_char()
                            .is_some_and(|c| !c.is_ascii_whitespace() && c != '>' && c != '/')
                        {
                            self.bump();
                        }
                        self.input[start..self.pos].to_string()
                    }
                    None => {
                        return Err(self.make_error(MarkupErrorKind::unexpected_eof(Some(
                            "attribute value".to_string(),
                        ))));
                    }
                }
            } else {
                // Bare attribute, e.g. `once`.
                String::new()
            };
            attrs.push(Attr {
                name,
                value: AttrValue::Literal(value),
            });
        }
    }
}

/// Parse markup source into a tree.
pub fn parse(input: &str) -> Result<Tree, MarkupError> {
    let mut tree = Tree::new();
    let mut parser = Parser::new(input);
    // Stack of open elements; the synthetic root is always at the bottom.
    let mut open: Vec<(NodeId, String)> = vec![(tree.root(), String::new())];

    let mut text_start = parser.pos;
    while !parser.eof() {
        if !parser.peek("<") {
            parser.bump();
            continue;
        }

        // Comments and doctypes stay in the text flow verbatim.
        if parser.peek("<!--") {
            parser.consume_until("-->");
            if !parser.consume("-->") {
                return Err(parser.make_error(MarkupErrorKind::unexpected_eof(Some(
                    "-->".to_string(),
                ))));
            }
            continue;
        }
        if parser.peek("<!") {
            parser.consume_until(">");
            parser.consume(">");
            continue;
        }

        // The escape hatch: raw target code passes through untouched.
        if parser.peek("<?") {
            flush_text(&mut tree, &open, input, text_start, parser.pos);
            parser.consume("<?");
            parser.consume("php");
            let code = parser.consume_until("?>").trim().to_string();
            if !parser.consume("?>") {
                return Err(parser.make_error(MarkupErrorKind::unexpected_eof(Some(
                    "?>".to_string(),
                ))));
            }
            let node = tree.new_code(code);
            let parent = open.last().map_or(tree.root(), |&(id, _)| id);
            tree.append(parent, node);
            text_start = parser.pos;
            continue;
        }

        if parser.peek("</") {
            flush_text(&mut tree, &open, input, text_start, parser.pos);
            parser.consume("</");
            let name = parser.consume_name().to_string();
            parser.consume_whitespace();
            parser.expect(">")?;
            let Some((_, expected)) = open.last() else {
                unreachable!()
            };
            if open.len() == 1 || *expected != name {
                return Err(parser.make_error(MarkupErrorKind::MismatchedCloseTag {
                    expected: expected.clone(),
                    found: name,
                }));
            }
            open.pop();
            text_start = parser.pos;
            continue;
        }

        // An open tag needs a name character right after `<`; anything else
        // is literal text (`a < b`).
        let after = input[parser.pos + 1..].chars().next();
        if !after.is_some_and(|c| c.is_ascii_alphabetic() || c == '_') {
            parser.bump();
            continue;
        }

        flush_text(&mut tree, &open, input, text_start, parser.pos);
        parser.consume("<");
        let tag = parser.consume_name().to_string();
        let attrs = parser.parse_attributes()?;
        let self_closing = parser.consume("/");
        parser.expect(">")?;

        let mut element = Element::new(tag.clone());
        element.attrs = attrs;
        element.void = self_closing || VOID_TAGS.contains(&tag.as_str());
        let node = tree.new_element(element);
        let parent = open.last().map_or(tree.root(), |&(id, _)| id);
        tree.append(parent, node);

        if !self_closing && !VOID_TAGS.contains(&tag.as_str()) {
            open.push((node, tag));
        }
        text_start = parser.pos;
    }

    flush_text(&mut tree, &open, input, text_start, parser.pos);

    if open.len() > 1 {
        let (_, tag) = open.pop().unwrap_or_else(|| unreachable!());
        return Err(parser.make_error(MarkupErrorKind::unexpected_eof(Some(format!("</{}>", tag)))));
    }
    Ok(tree)
}

fn flush_text(
    tree: &mut Tree,
    open: &[(NodeId, String)],
    input: &str,
    start: usize,
    end: usize,
) {
    if start >= end {
        return;
    }
    let text = &input[start..end];
    let node = tree.new_text(text);
    if let Some(&(parent, _)) = open.last() {
        tree.append(parent, node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeKind;

    #[test]
    #[ntest::timeout(100)]
    fn test_element_with_text() {
        let tree = parse("<p>hello</p>").unwrap();
        let root = tree.root();
        assert_eq!(tree.children(root).len(), 1);
        let p = tree.children(root)[0];
        assert_eq!(tree.element(p).map(|e| e.tag.as_str()), Some("p"));
        let text = tree.children(p)[0];
        assert_eq!(tree.kind(text), &NodeKind::Text("hello".to_string()));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_attribute_order_preserved() {
        let tree = parse("<a href='/x' title=\"t\" data-k=v once></a>").unwrap();
        let a = tree.children(tree.root())[0];
        let element = tree.element(a).unwrap();
        let names: Vec<&str> = element.attrs.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["href", "title", "data-k", "once"]);
        assert_eq!(element.attr("href"), Some("/x"));
        assert_eq!(element.attr("once"), Some(""));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_nesting_and_siblings() {
        let tree = parse("<div><span>a</span><span>b</span></div>").unwrap();
        let div = tree.children(tree.root())[0];
        assert_eq!(tree.children(div).len(), 2);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_void_and_self_closing_tags() {
        let tree = parse("<div><br><img src='x'/><p>t</p></div>").unwrap();
        let div = tree.children(tree.root())[0];
        assert_eq!(tree.children(div).len(), 3);
        let br = tree.children(div)[0];
        assert!(tree.element(br).is_some_and(|e| e.void));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_escape_hatch_becomes_code_node() {
        let tree = parse("<div><?php echo $x; ?></div>").unwrap();
        let div = tree.children(tree.root())[0];
        let code = tree.children(div)[0];
        assert_eq!(tree.kind(code), &NodeKind::Code("echo $x;".to_string()));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_mismatched_close_tag() {
        let err = parse("<div><span></div>").unwrap_err();
        assert!(matches!(
            err.kind,
            MarkupErrorKind::MismatchedCloseTag { ref expected, ref found }
                if expected == "span" && found == "div"
        ));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unclosed_tag_reports_position() {
        let err = parse("<div>\n<p>text").unwrap_err();
        assert!(matches!(err.kind, MarkupErrorKind::UnexpectedEof { .. }));
        assert_eq!(err.line, 2);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_stray_angle_bracket_is_text() {
        let tree = parse("<p>a < b</p>").unwrap();
        let p = tree.children(tree.root())[0];
        let text = tree.children(p)[0];
        assert_eq!(tree.kind(text), &NodeKind::Text("a < b".to_string()));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_comment_stays_in_text_flow() {
        let tree = parse("<p><!-- note -->x</p>").unwrap();
        let p = tree.children(tree.root())[0];
        // Comment and trailing text coalesce into one text node.
        assert_eq!(
            tree.kind(tree.children(p)[0]),
            &NodeKind::Text("<!-- note -->x".to_string())
        );
    }
}

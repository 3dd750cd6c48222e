//! HTML-subset markup, the stored form of a document.
//!
//! Block tags become elements, inline formatting tags (`a`, `strong`, `em`,
//! `u`, `s`, `code` and their aliases) become marks on text runs. Parsing
//! is lenient about unclosed tags and stray inline end tags; a stray block
//! end tag or an unterminated tag is an error.

use std::collections::BTreeMap;

use super::link::LinkAttrs;
use super::node::{Document, Element, Mark, Node, TextRun, VOID_TAGS, normalize_marks};
use crate::errors::DocumentError;

/// Containers whose whitespace-only text is formatting, not content.
const CONTAINER_TAGS: &[&str] = &["ul", "ol", "blockquote", "table", "thead", "tbody", "tfoot", "tr"];

// ── Entities ──────────────────────────────────────────────────────────

pub fn decode_entities(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .find(';')
            .filter(|semi| *semi <= 10)
            .and_then(|semi| decode_entity(&rest[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

// ── Tokenizer ─────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
enum Token {
    Text(String),
    Start {
        name: String,
        attrs: BTreeMap<String, String>,
        self_closing: bool,
    },
    End(String),
}

struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> DocumentError {
        DocumentError::Markup {
            offset,
            message: message.into(),
        }
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let end = rest.find(|c: char| !pred(c)).unwrap_or(rest.len());
        self.pos += end;
        &rest[..end]
    }

    fn next_token(&mut self) -> Result<Option<Token>, DocumentError> {
        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return Ok(None);
            }
            let start = self.pos;

            if rest.starts_with("<!--") {
                let end = rest
                    .find("-->")
                    .ok_or_else(|| self.error(start, "unterminated comment"))?;
                self.pos += end + 3;
                continue;
            }
            if rest.starts_with("<!") || rest.starts_with("<?") {
                let end = rest
                    .find('>')
                    .ok_or_else(|| self.error(start, "unterminated declaration"))?;
                self.pos += end + 1;
                continue;
            }
            if let Some(after) = rest.strip_prefix("</") {
                let end = after
                    .find('>')
                    .ok_or_else(|| self.error(start, "unterminated closing tag"))?;
                self.pos += 2 + end + 1;
                return Ok(Some(Token::End(after[..end].trim().to_ascii_lowercase())));
            }
            if rest.starts_with('<') && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
                return self.start_tag().map(Some);
            }

            // Text up to the next tag; a '<' that opens no tag is literal.
            let skip = rest.chars().next().map_or(0, char::len_utf8);
            let end = rest[skip..].find('<').map_or(rest.len(), |i| i + skip);
            self.pos += end;
            return Ok(Some(Token::Text(decode_entities(&rest[..end]))));
        }
    }

    fn start_tag(&mut self) -> Result<Token, DocumentError> {
        let start = self.pos;
        self.pos += 1;
        let name = self
            .take_while(|c| c.is_ascii_alphanumeric() || c == '-')
            .to_ascii_lowercase();
        let mut attrs = BTreeMap::new();

        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.is_empty() {
                return Err(self.error(start, format!("unterminated <{}> tag", name)));
            }
            if rest.starts_with("/>") {
                self.pos += 2;
                return Ok(Token::Start {
                    name,
                    attrs,
                    self_closing: true,
                });
            }
            if rest.starts_with('>') {
                self.pos += 1;
                return Ok(Token::Start {
                    name,
                    attrs,
                    self_closing: false,
                });
            }
            if rest.starts_with('/') {
                self.pos += 1;
                continue;
            }

            let attr_name = self
                .take_while(|c| !c.is_whitespace() && c != '=' && c != '>' && c != '/')
                .to_ascii_lowercase();
            self.skip_whitespace();
            let value = if self.rest().starts_with('=') {
                self.pos += 1;
                self.skip_whitespace();
                self.attr_value(start)?
            } else {
                String::new()
            };
            attrs.insert(attr_name, value);
        }
    }

    fn attr_value(&mut self, tag_start: usize) -> Result<String, DocumentError> {
        let rest = self.rest();
        match rest.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let body = &rest[1..];
                let end = body
                    .find(quote)
                    .ok_or_else(|| self.error(tag_start, "unterminated attribute value"))?;
                self.pos += end + 2;
                Ok(decode_entities(&body[..end]))
            }
            _ => {
                let raw = self.take_while(|c| !c.is_whitespace() && c != '>');
                Ok(decode_entities(raw))
            }
        }
    }
}

// ── Tree building ─────────────────────────────────────────────────────

struct Frame {
    element: Element,
    /// Length of the mark stack when this element opened
    marks_len: usize,
    /// Paragraph wrapped around loose top-level text
    implicit: bool,
}

struct Builder {
    root: Vec<Node>,
    stack: Vec<Frame>,
    /// Open inline tags, by tag name as written
    marks: Vec<(String, Mark)>,
}

impl Builder {
    fn new() -> Self {
        Self {
            root: Vec::new(),
            stack: Vec::new(),
            marks: Vec::new(),
        }
    }

    fn container(&mut self) -> &mut Vec<Node> {
        match self.stack.last_mut() {
            Some(frame) => &mut frame.element.children,
            None => &mut self.root,
        }
    }

    fn keeps_whitespace(&self) -> bool {
        match self.stack.last() {
            Some(frame) => !CONTAINER_TAGS.contains(&frame.element.tag.as_str()),
            None => false,
        }
    }

    fn close_top(&mut self) {
        if let Some(frame) = self.stack.pop() {
            self.marks.truncate(frame.marks_len);
            self.container().push(Node::Element(frame.element));
        }
    }

    fn close_implicit(&mut self) {
        if self.stack.last().is_some_and(|f| f.implicit) {
            self.close_top();
        }
    }

    fn text(&mut self, text: String) {
        if text.trim().is_empty() && !self.keeps_whitespace() {
            return;
        }
        if self.stack.is_empty() {
            self.stack.push(Frame {
                element: Element::new("p"),
                marks_len: self.marks.len(),
                implicit: true,
            });
        }
        let mut marks: Vec<Mark> = self.marks.iter().map(|(_, m)| m.clone()).collect();
        normalize_marks(&mut marks);
        self.container().push(Node::Text(TextRun { text, marks }));
    }

    fn start(&mut self, name: String, attrs: BTreeMap<String, String>, self_closing: bool) {
        if name == "a" {
            self.marks.push((name, Mark::Link(LinkAttrs::from_html_attrs(attrs))));
            return;
        }
        if let Some(mark) = Mark::from_tag(&name) {
            self.marks.push((name, mark));
            return;
        }

        let element = Element {
            tag: name,
            attrs,
            children: Vec::new(),
        };
        if element.is_void() {
            self.container().push(Node::Element(element));
            return;
        }
        self.close_implicit();
        self.stack.push(Frame {
            element,
            marks_len: self.marks.len(),
            implicit: false,
        });
        if self_closing {
            self.close_top();
        }
    }

    fn end(&mut self, name: &str, offset: usize) -> Result<(), DocumentError> {
        if name == "a" || Mark::from_tag(name).is_some() {
            if let Some(idx) = self.marks.iter().rposition(|(tag, _)| tag == name) {
                self.marks.remove(idx);
            }
            return Ok(());
        }
        if VOID_TAGS.contains(&name) {
            return Ok(());
        }

        self.close_implicit();
        let Some(idx) = self.stack.iter().rposition(|f| f.element.tag == name) else {
            return Err(DocumentError::Markup {
                offset,
                message: format!("unexpected closing tag </{}>", name),
            });
        };
        while self.stack.len() > idx {
            self.close_top();
        }
        Ok(())
    }

    fn finish(mut self) -> Document {
        while !self.stack.is_empty() {
            self.close_top();
        }
        Document::new(self.root)
    }
}

/// Parse stored markup into a document.
pub fn parse(markup: &str) -> Result<Document, DocumentError> {
    let mut tokenizer = Tokenizer::new(markup);
    let mut builder = Builder::new();
    loop {
        let offset = tokenizer.pos;
        match tokenizer.next_token()? {
            None => break,
            Some(Token::Text(text)) => builder.text(text),
            Some(Token::Start {
                name,
                attrs,
                self_closing,
            }) => builder.start(name, attrs, self_closing),
            Some(Token::End(name)) => builder.end(&name, offset)?,
        }
    }
    Ok(builder.finish())
}

// ── Serialization ─────────────────────────────────────────────────────

fn open_mark(mark: &Mark, out: &mut String) {
    out.push('<');
    out.push_str(mark.tag());
    if let Mark::Link(link) = mark {
        for (name, value) in link.to_html_attrs() {
            out.push(' ');
            out.push_str(&name);
            out.push_str("=\"");
            escape_attr(&value, out);
            out.push('"');
        }
    }
    out.push('>');
}

fn close_mark(mark: &Mark, out: &mut String) {
    out.push_str("</");
    out.push_str(mark.tag());
    out.push('>');
}

fn write_nodes(nodes: &[Node], out: &mut String) {
    let mut open: Vec<&Mark> = Vec::new();
    for node in nodes {
        match node {
            Node::Text(run) => {
                let common = open
                    .iter()
                    .zip(&run.marks)
                    .take_while(|(a, b)| **a == *b)
                    .count();
                while open.len() > common {
                    if let Some(mark) = open.pop() {
                        close_mark(mark, out);
                    }
                }
                for mark in &run.marks[common..] {
                    open_mark(mark, out);
                    open.push(mark);
                }
                escape_text(&run.text, out);
            }
            Node::Element(el) => {
                while let Some(mark) = open.pop() {
                    close_mark(mark, out);
                }
                write_element(el, out);
            }
        }
    }
    while let Some(mark) = open.pop() {
        close_mark(mark, out);
    }
}

fn write_element(el: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&el.tag);
    for (name, value) in &el.attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_attr(value, out);
        out.push('"');
    }
    out.push('>');
    if el.is_void() {
        return;
    }
    write_nodes(&el.children, out);
    out.push_str("</");
    out.push_str(&el.tag);
    out.push('>');
}

/// Render a document as markup.
pub fn serialize(doc: &Document) -> String {
    let mut out = String::new();
    write_nodes(&doc.children, &mut out);
    out
}

impl Document {
    pub fn from_markup(markup: &str) -> Result<Self, DocumentError> {
        parse(markup)
    }

    pub fn to_markup(&self) -> String {
        serialize(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::IssueState;

    const ISSUE_MARKUP: &str = concat!(
        "<p>See <a href=\"https://github.com/acme/site/issues/3\" data-issue-number=\"3\" ",
        "data-issue-state=\"open\" data-issue-title=\"Fix &quot;typo&quot;\" class=\"gh-issue-link\" ",
        "target=\"_blank\">this <strong>typo</strong></a> here.</p>"
    );

    #[test]
    fn test_round_trip_preserves_issue_attributes() {
        let doc = parse(ISSUE_MARKUP).unwrap();
        assert_eq!(serialize(&doc), ISSUE_MARKUP);

        let spans = doc.issue_links();
        assert_eq!(spans.len(), 1);
        let attrs = &spans[0].attrs;
        assert_eq!(attrs.issue_number, Some(3));
        assert_eq!(attrs.issue_state, Some(IssueState::Open));
        assert_eq!(attrs.issue_title.as_deref(), Some("Fix \"typo\""));
        assert_eq!(attrs.extra["target"], "_blank");
        assert_eq!(doc.text_between(spans[0].from, spans[0].to).unwrap(), "this typo");
    }

    #[test]
    fn test_issue_link_class_is_merged_on_output() {
        let doc = parse("<p><a href=\"u\" data-issue-number=\"5\" class=\"x\">t</a></p>").unwrap();
        assert_eq!(
            serialize(&doc),
            "<p><a href=\"u\" data-issue-number=\"5\" data-issue-state=\"open\" class=\"x gh-issue-link\">t</a></p>"
        );
    }

    #[test]
    fn test_block_structure() {
        let markup = "<h2>Title</h2><ul><li><p>one</p></li><li><p>two</p></li></ul><hr><pre><code>let x = 1;</code></pre>";
        let doc = parse(markup).unwrap();
        assert_eq!(serialize(&doc), markup);
        assert_eq!(doc.plain_text(), "Title\none\ntwo\nlet x = 1;");
    }

    #[test]
    fn test_formatting_whitespace_between_blocks_is_dropped() {
        let doc = parse("<ul>\n  <li>a</li>\n  <li>b</li>\n</ul>\n<p>c d</p>\n").unwrap();
        assert_eq!(serialize(&doc), "<ul><li>a</li><li>b</li></ul><p>c d</p>");
    }

    #[test]
    fn test_loose_text_is_wrapped_in_paragraph() {
        let doc = parse("hello <em>there</em><p>next</p>").unwrap();
        assert_eq!(serialize(&doc), "<p>hello <em>there</em></p><p>next</p>");
    }

    #[test]
    fn test_aliases_and_entities() {
        let doc = parse("<p><b>a</b> &amp; <i>b</i> &lt;3 &#169; &#x41; &bogus;</p>").unwrap();
        assert_eq!(
            serialize(&doc),
            "<p><strong>a</strong> &amp; <em>b</em> &lt;3 © A &amp;bogus;</p>"
        );
    }

    #[test]
    fn test_void_elements_and_attributes() {
        let markup = "<p>a<br>b<img alt=\"x\" src=\"/img.png\"></p>";
        let doc = parse(markup).unwrap();
        assert_eq!(serialize(&doc), markup);
        assert_eq!(doc.plain_text(), "ab");
        let self_closed = parse("<p>a<br/>b</p>").unwrap();
        assert_eq!(serialize(&self_closed), "<p>a<br>b</p>");
    }

    #[test]
    fn test_unclosed_elements_are_closed_at_end() {
        let doc = parse("<p>open <strong>bold").unwrap();
        assert_eq!(serialize(&doc), "<p>open <strong>bold</strong></p>");
    }

    #[test]
    fn test_stray_block_end_tag_is_an_error() {
        let err = parse("<p>a</p></div>").unwrap_err();
        assert_eq!(
            err,
            DocumentError::Markup {
                offset: 8,
                message: "unexpected closing tag </div>".into()
            }
        );
    }

    #[test]
    fn test_unterminated_tag_is_an_error() {
        assert!(matches!(parse("<p class=\"x"), Err(DocumentError::Markup { .. })));
        assert!(matches!(parse("<p"), Err(DocumentError::Markup { .. })));
    }

    #[test]
    fn test_literal_less_than_is_text() {
        let doc = parse("<p>1 < 2</p>").unwrap();
        assert_eq!(doc.plain_text(), "1 < 2");
    }

    #[test]
    fn test_comments_are_skipped() {
        let doc = parse("<!-- note --><p>x</p>").unwrap();
        assert_eq!(serialize(&doc), "<p>x</p>");
    }

    #[test]
    fn test_empty_markup() {
        let doc = parse("").unwrap();
        assert!(doc.is_empty());
        assert_eq!(serialize(&doc), "");
    }

    #[test]
    fn test_non_ascii_text_round_trips() {
        let markup = concat!(
            "<p>élan <a href=\"https://github.com/acme/site/issues/4\" data-issue-number=\"4\" ",
            "data-issue-state=\"open\" class=\"gh-issue-link\">Ünicode</a> 😀</p>"
        );
        let doc = parse(markup).unwrap();
        assert_eq!(doc.plain_text(), "élan Ünicode 😀");
        assert_eq!(serialize(&doc), markup);

        let leading = parse("<p>élan vital</p>").unwrap();
        assert_eq!(leading.plain_text(), "élan vital");
    }

    #[test]
    fn test_non_ascii_next_to_entities_and_literal_less_than() {
        let doc = parse("<p>&amp;über &lt;ç< ß</p>").unwrap();
        assert_eq!(doc.plain_text(), "&über <ç< ß");
        assert_eq!(serialize(&doc), "<p>&amp;über &lt;ç&lt; ß</p>");
    }
}

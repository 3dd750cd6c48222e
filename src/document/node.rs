use std::collections::BTreeMap;

use super::link::LinkAttrs;

/// Inline formatting on a text run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mark {
    Link(LinkAttrs),
    Bold,
    Italic,
    Underline,
    Strike,
    Code,
}

impl Mark {
    /// Nesting order when rendered: lower ranks wrap higher ones.
    pub fn rank(&self) -> u8 {
        match self {
            Mark::Link(_) => 0,
            Mark::Bold => 1,
            Mark::Italic => 2,
            Mark::Underline => 3,
            Mark::Strike => 4,
            Mark::Code => 5,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Mark::Link(_) => "a",
            Mark::Bold => "strong",
            Mark::Italic => "em",
            Mark::Underline => "u",
            Mark::Strike => "s",
            Mark::Code => "code",
        }
    }

    /// Mark for an inline tag, if the tag is one. Links are built from
    /// their attributes separately.
    pub fn from_tag(tag: &str) -> Option<Mark> {
        match tag {
            "strong" | "b" => Some(Mark::Bold),
            "em" | "i" => Some(Mark::Italic),
            "u" => Some(Mark::Underline),
            "s" | "strike" | "del" => Some(Mark::Strike),
            "code" => Some(Mark::Code),
            _ => None,
        }
    }

    pub fn as_link(&self) -> Option<&LinkAttrs> {
        match self {
            Mark::Link(attrs) => Some(attrs),
            _ => None,
        }
    }
}

/// Sort by rank and drop duplicates; a run carries at most one link.
pub fn normalize_marks(marks: &mut Vec<Mark>) {
    marks.sort_by_key(Mark::rank);
    marks.dedup_by(|a, b| a.rank() == b.rank());
}

/// A run of text with uniform marks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextRun {
    pub text: String,
    pub marks: Vec<Mark>,
}

impl TextRun {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            marks: Vec::new(),
        }
    }

    pub fn with_marks(text: impl Into<String>, mut marks: Vec<Mark>) -> Self {
        normalize_marks(&mut marks);
        Self {
            text: text.into(),
            marks,
        }
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn link(&self) -> Option<&LinkAttrs> {
        self.marks.iter().find_map(Mark::as_link)
    }

    /// Replace the run's link, or remove it with `None`.
    pub fn set_link(&mut self, link: Option<LinkAttrs>) {
        self.marks.retain(|m| m.as_link().is_none());
        if let Some(link) = link {
            self.marks.insert(0, Mark::Link(link));
        }
    }

    /// Split at a char offset into (head, tail).
    pub fn split_at_char(&self, at: usize) -> (TextRun, TextRun) {
        let byte = self
            .text
            .char_indices()
            .nth(at)
            .map_or(self.text.len(), |(i, _)| i);
        let (head, tail) = self.text.split_at(byte);
        (
            TextRun {
                text: head.to_string(),
                marks: self.marks.clone(),
            },
            TextRun {
                text: tail.to_string(),
                marks: self.marks.clone(),
            },
        )
    }
}

/// Elements without children.
pub const VOID_TAGS: &[&str] = &["br", "hr", "img"];

/// Block elements whose direct content is inline.
pub const TEXTBLOCK_TAGS: &[&str] = &["p", "h1", "h2", "h3", "h4", "h5", "h6", "pre", "li", "td", "th"];

/// A block element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn paragraph(children: Vec<Node>) -> Self {
        Self {
            children,
            ..Self::new("p")
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn is_void(&self) -> bool {
        VOID_TAGS.contains(&self.tag.as_str())
    }

    pub fn is_textblock(&self) -> bool {
        TEXTBLOCK_TAGS.contains(&self.tag.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(TextRun),
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(TextRun::new(text))
    }
}

/// Merge neighbouring runs with equal marks and drop empty runs, at every level.
pub fn normalize_nodes(nodes: &mut Vec<Node>) {
    let mut merged: Vec<Node> = Vec::with_capacity(nodes.len());
    for node in nodes.drain(..) {
        match node {
            Node::Text(run) if run.text.is_empty() => {}
            Node::Text(run) => {
                if let Some(Node::Text(prev)) = merged.last_mut()
                    && prev.marks == run.marks
                {
                    prev.text.push_str(&run.text);
                } else {
                    merged.push(Node::Text(run));
                }
            }
            Node::Element(mut el) => {
                normalize_nodes(&mut el.children);
                merged.push(Node::Element(el));
            }
        }
    }
    *nodes = merged;
}

/// A document: an ordered list of top-level nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub children: Vec<Node>,
}

impl Document {
    pub fn new(children: Vec<Node>) -> Self {
        let mut doc = Self { children };
        doc.normalize();
        doc
    }

    /// A document of one paragraph per line.
    pub fn from_lines(lines: &[&str]) -> Self {
        Self::new(
            lines
                .iter()
                .map(|line| Node::Element(Element::paragraph(vec![Node::text(*line)])))
                .collect(),
        )
    }

    pub fn normalize(&mut self) {
        normalize_nodes(&mut self.children);
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

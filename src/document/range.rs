//! Text-offset addressing over a document.
//!
//! Offsets count characters of text runs in document order. Block
//! boundaries take no space; `text_between` joins blocks with `\n`.

use super::link::LinkAttrs;
use super::node::{Document, Element, Node, TextRun, normalize_nodes};
use crate::errors::DocumentError;

/// A text run and where it sits.
#[derive(Debug, Clone, Copy)]
pub struct RunRef<'a> {
    /// Identifies the innermost enclosing element
    pub block: usize,
    pub from: usize,
    pub to: usize,
    pub run: &'a TextRun,
}

/// A maximal range of neighbouring runs carrying the same link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpan {
    pub from: usize,
    pub to: usize,
    pub attrs: LinkAttrs,
}

/// A cursor touches a run only strictly inside it; a range touches runs it overlaps.
fn touches(start: usize, end: usize, from: usize, to: usize) -> bool {
    if from == to {
        start < from && from < end
    } else {
        start < to && from < end
    }
}

fn collect_runs<'a>(
    nodes: &'a [Node],
    block: usize,
    next_block: &mut usize,
    pos: &mut usize,
    out: &mut Vec<RunRef<'a>>,
) {
    for node in nodes {
        match node {
            Node::Text(run) => {
                let len = run.char_len();
                out.push(RunRef {
                    block,
                    from: *pos,
                    to: *pos + len,
                    run,
                });
                *pos += len;
            }
            Node::Element(el) => {
                *next_block += 1;
                let id = *next_block;
                collect_runs(&el.children, id, next_block, pos, out);
            }
        }
    }
}

/// Split runs at `from` and `to` and apply `f` to each run inside the range.
fn map_runs(nodes: &mut Vec<Node>, pos: &mut usize, from: usize, to: usize, f: &mut dyn FnMut(&mut TextRun)) {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes.drain(..) {
        match node {
            Node::Element(mut el) => {
                map_runs(&mut el.children, pos, from, to, f);
                out.push(Node::Element(el));
            }
            Node::Text(run) => {
                let start = *pos;
                let end = start + run.char_len();
                *pos = end;
                if end <= from || start >= to {
                    out.push(Node::Text(run));
                    continue;
                }
                let a = from.saturating_sub(start);
                let b = to.min(end) - start;
                let (head, rest) = run.split_at_char(a);
                let (mut mid, tail) = rest.split_at_char(b - a);
                f(&mut mid);
                out.extend([head, mid, tail].into_iter().map(Node::Text));
            }
        }
    }
    *nodes = out;
}

fn insert_run(nodes: &mut Vec<Node>, pos: &mut usize, at: usize, run: &mut Option<TextRun>) {
    let mut i = 0;
    while i < nodes.len() && run.is_some() {
        let split = match &mut nodes[i] {
            Node::Element(el) => {
                insert_run(&mut el.children, pos, at, run);
                None
            }
            Node::Text(existing) => {
                let start = *pos;
                let len = existing.char_len();
                if at <= start + len {
                    Some(existing.split_at_char(at - start))
                } else {
                    *pos += len;
                    None
                }
            }
        };
        if let Some((head, tail)) = split {
            if let Some(new) = run.take() {
                nodes.splice(i..=i, [Node::Text(head), Node::Text(new), Node::Text(tail)]);
            }
            return;
        }
        i += 1;
    }
}

fn first_textblock(nodes: &mut [Node]) -> Option<&mut Element> {
    for node in nodes.iter_mut() {
        if let Node::Element(el) = node {
            if el.is_textblock() {
                return Some(el);
            }
            if let Some(found) = first_textblock(&mut el.children) {
                return Some(found);
            }
        }
    }
    None
}

impl Document {
    /// All text runs with their offsets, in document order.
    pub fn runs(&self) -> Vec<RunRef<'_>> {
        let mut out = Vec::new();
        collect_runs(&self.children, 0, &mut 0, &mut 0, &mut out);
        out
    }

    pub fn text_len(&self) -> usize {
        self.runs().last().map_or(0, |r| r.to)
    }

    pub fn check_range(&self, from: usize, to: usize) -> Result<(), DocumentError> {
        if from > to {
            return Err(DocumentError::InvertedRange { from, to });
        }
        let len = self.text_len();
        if to > len {
            return Err(DocumentError::OutOfBounds { from, to, len });
        }
        Ok(())
    }

    /// Text in `[from, to)`, blocks separated by `\n`.
    pub fn text_between(&self, from: usize, to: usize) -> Result<String, DocumentError> {
        self.check_range(from, to)?;
        let mut out = String::new();
        let mut last_block = None;
        for r in self.runs() {
            let start = r.from.max(from);
            let end = r.to.min(to);
            if start >= end {
                continue;
            }
            if last_block.is_some_and(|b| b != r.block) {
                out.push('\n');
            }
            out.extend(r.run.text.chars().skip(start - r.from).take(end - start));
            last_block = Some(r.block);
        }
        Ok(out)
    }

    pub fn plain_text(&self) -> String {
        self.text_between(0, self.text_len()).unwrap_or_default()
    }

    /// Runs touched by a selection.
    pub fn runs_between(&self, from: usize, to: usize) -> Vec<RunRef<'_>> {
        self.runs()
            .into_iter()
            .filter(|r| touches(r.from, r.to, from, to))
            .collect()
    }

    /// Whether a selection touches a link to an open issue.
    pub fn has_open_issue_between(&self, from: usize, to: usize) -> bool {
        self.runs_between(from, to)
            .iter()
            .any(|r| r.run.link().is_some_and(LinkAttrs::is_open_issue))
    }

    pub fn link_spans(&self) -> Vec<LinkSpan> {
        let mut spans: Vec<LinkSpan> = Vec::new();
        let mut last_block = None;
        for r in self.runs() {
            let Some(link) = r.run.link() else {
                continue;
            };
            if let Some(last) = spans.last_mut()
                && last.to == r.from
                && last_block == Some(r.block)
                && last.attrs == *link
            {
                last.to = r.to;
                continue;
            }
            spans.push(LinkSpan {
                from: r.from,
                to: r.to,
                attrs: link.clone(),
            });
            last_block = Some(r.block);
        }
        spans
    }

    /// Spans of links that carry an issue number.
    pub fn issue_links(&self) -> Vec<LinkSpan> {
        self.link_spans()
            .into_iter()
            .filter(|s| s.attrs.is_issue())
            .collect()
    }

    pub fn links_in_range(&self, from: usize, to: usize) -> Vec<LinkSpan> {
        self.link_spans()
            .into_iter()
            .filter(|s| touches(s.from, s.to, from, to))
            .collect()
    }

    /// First issue link touched by a selection, extended to its full range.
    pub fn issue_link_in_range(&self, from: usize, to: usize) -> Option<LinkSpan> {
        self.links_in_range(from, to)
            .into_iter()
            .find(|s| s.attrs.is_issue())
    }

    /// Put `attrs` as the link on `[from, to)`, replacing any link there.
    pub fn apply_link(&mut self, from: usize, to: usize, attrs: LinkAttrs) -> Result<(), DocumentError> {
        self.check_range(from, to)?;
        if from == to {
            return Ok(());
        }
        map_runs(&mut self.children, &mut 0, from, to, &mut |run| {
            run.set_link(Some(attrs.clone()))
        });
        normalize_nodes(&mut self.children);
        Ok(())
    }

    /// Rewrite the attributes of an existing link span in place. Returns
    /// whether anything changed.
    pub fn replace_link(&mut self, span: &LinkSpan, attrs: LinkAttrs) -> bool {
        if span.attrs == attrs {
            return false;
        }
        let mut changed = false;
        map_runs(&mut self.children, &mut 0, span.from, span.to, &mut |run| {
            if run.link() == Some(&span.attrs) {
                run.set_link(Some(attrs.clone()));
                changed = true;
            }
        });
        normalize_nodes(&mut self.children);
        changed
    }

    /// Apply `f` to a copy of the span's attributes and write the result back.
    pub fn update_link(&mut self, span: &LinkSpan, f: impl FnOnce(&mut LinkAttrs)) -> bool {
        let mut attrs = span.attrs.clone();
        f(&mut attrs);
        self.replace_link(span, attrs)
    }

    /// Insert a run at a text offset. With no text in the document it goes
    /// into the first text block, or a new paragraph.
    pub fn insert_text(&mut self, at: usize, run: TextRun) -> Result<(), DocumentError> {
        self.check_range(at, at)?;
        let mut pending = Some(run);
        insert_run(&mut self.children, &mut 0, at, &mut pending);
        if let Some(run) = pending {
            match first_textblock(&mut self.children) {
                Some(block) => block.children.push(Node::Text(run)),
                None => self
                    .children
                    .push(Node::Element(Element::paragraph(vec![Node::Text(run)]))),
            }
        }
        normalize_nodes(&mut self.children);
        Ok(())
    }
}

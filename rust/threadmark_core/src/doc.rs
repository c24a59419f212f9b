//! Document tree structures and the in-memory mark engine.

use serde::{Deserialize, Serialize};

use crate::comments::ThreadId;
use crate::error::{Result, ThreadmarkError};
use crate::marks::{MarkEngine, MarkSegment};
use crate::selection::{Anchor, SelectionRange};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Doc {
    pub nodes: Vec<Node>,
    #[serde(skip)]
    selection: SelectionRange,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Node {
    Paragraph { #[serde(default)] spans: Vec<InlineSpan> },
    Heading { level: u8, #[serde(default)] spans: Vec<InlineSpan> },
}

impl Default for Node {
    fn default() -> Self {
        Node::Paragraph { spans: Vec::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct InlineStyle {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub code: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Comment thread mark. One per character; a new id replaces the old one.
    #[serde(rename = "threadId", skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<ThreadId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct InlineSpan {
    pub text: String,
    #[serde(default)]
    pub style: InlineStyle,
}

impl InlineSpan {
    pub fn plain(text: impl Into<String>) -> Self { Self { text: text.into(), style: InlineStyle::default() } }
    pub fn char_len(&self) -> usize { self.text.chars().count() }
}

impl Node {
    pub fn paragraph(text: &str) -> Self { Node::Paragraph { spans: plain_spans(text) } }

    pub fn heading(level: u8, text: &str) -> Self { Node::Heading { level: level.clamp(1, 6), spans: plain_spans(text) } }

    pub fn spans(&self) -> &[InlineSpan] {
        match self {
            Node::Paragraph { spans } | Node::Heading { spans, .. } => spans,
        }
    }

    pub fn spans_mut(&mut self) -> &mut Vec<InlineSpan> {
        match self {
            Node::Paragraph { spans } | Node::Heading { spans, .. } => spans,
        }
    }

    pub fn text(&self) -> String { self.spans().iter().map(|s| s.text.as_str()).collect() }

    pub fn char_len(&self) -> usize { self.spans().iter().map(InlineSpan::char_len).sum() }

    fn style_at(&self, offset: usize) -> Option<&InlineStyle> {
        let mut acc = 0;
        for span in self.spans() {
            let len = span.char_len();
            if offset < acc + len {
                return Some(&span.style);
            }
            acc += len;
        }
        None
    }
}

fn plain_spans(text: &str) -> Vec<InlineSpan> {
    if text.is_empty() { Vec::new() } else { vec![InlineSpan::plain(text)] }
}

/// Ensure a span boundary at `offset` chars; returns the index of the span
/// starting there (or `spans.len()` at the end).
fn split_spans_at(spans: &mut Vec<InlineSpan>, offset: usize) -> usize {
    let mut acc = 0;
    for i in 0..spans.len() {
        if offset == acc {
            return i;
        }
        let len = spans[i].char_len();
        if offset < acc + len {
            let k = offset - acc;
            let byte = spans[i].text.char_indices().nth(k).map_or(spans[i].text.len(), |(b, _)| b);
            let tail = spans[i].text.split_off(byte);
            let style = spans[i].style.clone();
            spans.insert(i + 1, InlineSpan { text: tail, style });
            return i + 1;
        }
        acc += len;
    }
    spans.len()
}

/// Drop empty spans and merge neighbours with identical style.
pub(crate) fn normalize_spans(spans: &mut Vec<InlineSpan>) {
    spans.retain(|s| !s.text.is_empty());
    let mut merged: Vec<InlineSpan> = Vec::with_capacity(spans.len());
    for span in spans.drain(..) {
        match merged.last_mut() {
            Some(prev) if prev.style == span.style => prev.text.push_str(&span.text),
            _ => merged.push(span),
        }
    }
    *spans = merged;
}

fn restyle(spans: &mut Vec<InlineSpan>, from: usize, to: usize, f: &mut impl FnMut(&mut InlineStyle)) {
    if from >= to {
        return;
    }
    let a = split_spans_at(spans, from);
    let b = split_spans_at(spans, to);
    for span in &mut spans[a..b] {
        f(&mut span.style);
    }
    normalize_spans(spans);
}

impl Doc {
    pub fn new(nodes: Vec<Node>) -> Self { Self { nodes, selection: SelectionRange::default() } }

    /// One paragraph per line.
    pub fn from_text(text: &str) -> Self { Self::new(text.split('\n').map(Node::paragraph).collect()) }

    pub fn from_json(json: &str) -> Result<Self> { Ok(serde_json::from_str(json)?) }

    pub fn to_json(&self) -> Result<String> { Ok(serde_json::to_string(self)?) }

    pub fn text(&self) -> String { self.nodes.iter().map(Node::text).collect::<Vec<_>>().join("\n") }

    pub fn set_selection(&mut self, range: SelectionRange) -> Result<()> {
        self.check(range.start)?;
        self.check(range.end)?;
        let mut range = range;
        range.normalize();
        self.selection = range;
        Ok(())
    }

    fn check(&self, anchor: Anchor) -> Result<usize> {
        match self.nodes.get(anchor.node_index) {
            Some(n) if anchor.char_offset <= n.char_len() => Ok(n.char_len()),
            _ => Err(ThreadmarkError::InvalidRange { anchor }),
        }
    }

    /// Visit the per-node `[from, to)` pieces of a range.
    fn segments(&self, range: SelectionRange) -> Result<Vec<(usize, usize, usize)>> {
        let mut range = range;
        range.normalize();
        self.check(range.start)?;
        self.check(range.end)?;
        let mut out = Vec::new();
        for i in range.start.node_index..=range.end.node_index {
            let from = if i == range.start.node_index { range.start.char_offset } else { 0 };
            let to = if i == range.end.node_index { range.end.char_offset } else { self.nodes[i].char_len() };
            out.push((i, from, to));
        }
        Ok(out)
    }

    fn restyle_range(&mut self, range: SelectionRange, mut f: impl FnMut(&mut InlineStyle)) -> Result<()> {
        for (i, from, to) in self.segments(range)? {
            restyle(self.nodes[i].spans_mut(), from, to, &mut f);
        }
        Ok(())
    }

    pub fn style_at(&self, at: Anchor) -> Option<&InlineStyle> {
        self.nodes.get(at.node_index)?.style_at(at.char_offset)
    }

    /// Insert inline text. It takes the style of the preceding character
    /// (the following one at block start); a thread mark carries over only
    /// when both neighbours share it, so typing at a mark edge does not grow it.
    pub fn insert_text(&mut self, at: Anchor, text: &str) -> Result<()> {
        self.check(at)?;
        if text.is_empty() {
            return Ok(());
        }
        let node = &self.nodes[at.node_index];
        let before = at.char_offset.checked_sub(1).and_then(|o| node.style_at(o));
        let after = node.style_at(at.char_offset);
        let mut style = before.or(after).cloned().unwrap_or_default();
        let shared = match (before, after) {
            (Some(b), Some(a)) if b.thread_id == a.thread_id => a.thread_id.clone(),
            _ => None,
        };
        style.thread_id = shared;

        let spans = self.nodes[at.node_index].spans_mut();
        let idx = split_spans_at(spans, at.char_offset);
        spans.insert(idx, InlineSpan { text: text.to_string(), style });
        normalize_spans(spans);
        Ok(())
    }

    /// Delete a range; a cross-block range joins the first and last block.
    pub fn delete_range(&mut self, range: SelectionRange) -> Result<()> {
        let mut range = range;
        range.normalize();
        self.check(range.start)?;
        self.check(range.end)?;
        if range.is_collapsed() {
            return Ok(());
        }
        let (s, e) = (range.start, range.end);
        if s.node_index == e.node_index {
            let spans = self.nodes[s.node_index].spans_mut();
            let a = split_spans_at(spans, s.char_offset);
            let b = split_spans_at(spans, e.char_offset);
            spans.drain(a..b);
            normalize_spans(spans);
            return Ok(());
        }
        let tail = {
            let spans = self.nodes[e.node_index].spans_mut();
            let b = split_spans_at(spans, e.char_offset);
            spans.split_off(b)
        };
        let spans = self.nodes[s.node_index].spans_mut();
        let a = split_spans_at(spans, s.char_offset);
        spans.truncate(a);
        spans.extend(tail);
        normalize_spans(spans);
        self.nodes.drain(s.node_index + 1..=e.node_index);
        Ok(())
    }
}

impl MarkEngine for Doc {
    fn selection(&self) -> SelectionRange { self.selection }

    fn set_thread_mark(&mut self, range: SelectionRange, id: &ThreadId) -> Result<()> {
        self.restyle_range(range, |s| s.thread_id = Some(id.clone()))
    }

    fn thread_mark_at(&self, at: Anchor) -> Option<ThreadId> {
        self.style_at(at).and_then(|s| s.thread_id.clone())
    }

    fn unset_thread_mark(&mut self, range: SelectionRange) -> Result<()> {
        self.restyle_range(range, |s| s.thread_id = None)
    }

    fn unset_thread_everywhere(&mut self, id: &ThreadId) -> bool {
        let mut changed = false;
        for node in &mut self.nodes {
            let spans = node.spans_mut();
            for span in spans.iter_mut() {
                if span.style.thread_id.as_ref() == Some(id) {
                    span.style.thread_id = None;
                    changed = true;
                }
            }
            normalize_spans(spans);
        }
        changed
    }

    fn mark_segments(&self, range: SelectionRange) -> Result<Vec<MarkSegment>> {
        let mut out = Vec::new();
        for (i, from, to) in self.segments(range)? {
            let mut acc = 0;
            for span in self.nodes[i].spans() {
                let len = span.char_len();
                let lo = from.max(acc);
                let hi = to.min(acc + len);
                if lo < hi {
                    out.push(MarkSegment { thread_id: span.style.thread_id.clone(), chars: hi - lo });
                }
                acc += len;
            }
        }
        Ok(out)
    }

    fn range_text(&self, range: SelectionRange) -> Result<String> {
        let mut parts = Vec::new();
        for (i, from, to) in self.segments(range)? {
            parts.push(self.nodes[i].text().chars().skip(from).take(to - from).collect::<String>());
        }
        Ok(parts.join("\n"))
    }

    fn thread_ids(&self) -> Vec<ThreadId> {
        let mut ids: Vec<ThreadId> = Vec::new();
        for span in self.nodes.iter().flat_map(Node::spans) {
            if let Some(id) = &span.style.thread_id {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ThreadId { ThreadId::new(s) }

    #[test]
    fn mark_splits_and_remerges_spans() {
        let mut doc = Doc::from_text("hello world");
        doc.set_thread_mark(SelectionRange::within(0, 6, 11), &id("t1")).unwrap();
        assert_eq!(doc.nodes[0].spans().len(), 2);
        assert_eq!(doc.nodes[0].spans()[1].text, "world");

        doc.unset_thread_mark(SelectionRange::within(0, 0, 11)).unwrap();
        assert_eq!(doc.nodes[0].spans().len(), 1);
        assert_eq!(doc.text(), "hello world");
    }

    #[test]
    fn offsets_count_chars_not_bytes() {
        let mut doc = Doc::from_text("héllo wörld");
        doc.set_thread_mark(SelectionRange::within(0, 1, 4), &id("t1")).unwrap();
        assert_eq!(doc.range_text(SelectionRange::within(0, 1, 4)).unwrap(), "éll");
        assert_eq!(doc.thread_mark_at(Anchor::new(0, 3)), Some(id("t1")));
        assert_eq!(doc.thread_mark_at(Anchor::new(0, 4)), None);
    }

    #[test]
    fn mark_at_block_end_is_absent() {
        let mut doc = Doc::from_text("abc");
        doc.set_thread_mark(SelectionRange::within(0, 0, 3), &id("t1")).unwrap();
        assert_eq!(doc.thread_mark_at(Anchor::new(0, 3)), None);
        assert_eq!(doc.thread_mark_at(Anchor::new(5, 0)), None);
    }

    #[test]
    fn cross_block_mark_and_text() {
        let mut doc = Doc::from_text("first line\nsecond line");
        let r = SelectionRange::new(Anchor::new(0, 6), Anchor::new(1, 6));
        doc.set_thread_mark(r, &id("t1")).unwrap();
        assert_eq!(doc.range_text(r).unwrap(), "line\nsecond");
        let segs = doc.mark_segments(r).unwrap();
        assert!(segs.iter().all(|s| s.thread_id == Some(id("t1"))));
        assert_eq!(segs.iter().map(|s| s.chars).sum::<usize>(), 10);
    }

    #[test]
    fn out_of_bounds_range_is_rejected() {
        let mut doc = Doc::from_text("abc");
        let err = doc.set_thread_mark(SelectionRange::within(0, 1, 9), &id("t1")).unwrap_err();
        assert!(matches!(err, ThreadmarkError::InvalidRange { .. }));
        assert!(doc.set_selection(SelectionRange::within(3, 0, 0)).is_err());
    }

    #[test]
    fn typing_inside_mark_extends_it_but_not_at_edges() {
        let mut doc = Doc::from_text("abcdef");
        doc.set_thread_mark(SelectionRange::within(0, 2, 4), &id("t1")).unwrap();
        doc.insert_text(Anchor::new(0, 3), "X").unwrap();
        assert_eq!(doc.thread_mark_at(Anchor::new(0, 3)), Some(id("t1")));
        doc.insert_text(Anchor::new(0, 5), "Y").unwrap();
        assert_eq!(doc.text(), "abcXdYef");
        assert_eq!(doc.thread_mark_at(Anchor::new(0, 5)), None);
        doc.insert_text(Anchor::new(0, 2), "Z").unwrap();
        assert_eq!(doc.thread_mark_at(Anchor::new(0, 2)), None);
        assert_eq!(doc.thread_mark_at(Anchor::new(0, 3)), Some(id("t1")));
    }

    #[test]
    fn delete_range_joins_blocks() {
        let mut doc = Doc::from_text("one\ntwo\nthree");
        doc.delete_range(SelectionRange::new(Anchor::new(0, 2), Anchor::new(2, 2))).unwrap();
        assert_eq!(doc.nodes.len(), 1);
        assert_eq!(doc.text(), "onree");
    }

    #[test]
    fn unset_everywhere_only_touches_that_thread() {
        let mut doc = Doc::from_text("aaaa bbbb");
        doc.set_thread_mark(SelectionRange::within(0, 0, 4), &id("a")).unwrap();
        doc.set_thread_mark(SelectionRange::within(0, 5, 9), &id("b")).unwrap();
        assert!(doc.unset_thread_everywhere(&id("a")));
        assert!(!doc.unset_thread_everywhere(&id("a")));
        assert_eq!(doc.thread_ids(), vec![id("b")]);
    }

    #[test]
    fn json_keeps_thread_attribute() {
        let mut doc = Doc::from_text("hello");
        doc.set_thread_mark(SelectionRange::within(0, 0, 5), &id("t1")).unwrap();
        let json = doc.to_json().unwrap();
        assert!(json.contains("\"threadId\":\"t1\""));
        assert_eq!(Doc::from_json(&json).unwrap(), doc);
    }
}

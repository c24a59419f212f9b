//! HTML and Quill-delta import/export. Thread marks travel as
//! `data-thread-id` in HTML and as the `threadId` attribute in deltas.

use quick_xml::events::{BytesStart, Event};
use serde_json::{json, Map, Value};

use crate::comments::ThreadId;
use crate::doc::{normalize_spans, Doc, InlineSpan, InlineStyle, Node};
use crate::error::{Result, ThreadmarkError};
use crate::store::ThreadStore;

pub fn to_html(doc: &Doc, store: &ThreadStore) -> String {
    let mut out = String::new();
    out.push_str("<div class=\"doc\">\n");
    for n in &doc.nodes {
        match n {
            Node::Paragraph { spans } => {
                out.push_str("  <p>");
                out.push_str(&render_spans_html(spans, store));
                out.push_str("</p>\n");
            }
            Node::Heading { level, spans } => {
                let lvl = (*level).clamp(1, 6);
                out.push_str(&format!("  <h{lvl}>"));
                out.push_str(&render_spans_html(spans, store));
                out.push_str(&format!("</h{lvl}>\n"));
            }
        }
    }
    out.push_str("</div>");
    out
}

fn render_spans_html(spans: &[InlineSpan], store: &ThreadStore) -> String {
    let mut s = String::new();
    for span in spans {
        let mut inner = html_escape::encode_text(&span.text).to_string();
        if span.style.code {
            inner = format!("<code>{}</code>", inner);
        }
        if span.style.underline {
            inner = format!("<u>{}</u>", inner);
        }
        if span.style.italic {
            inner = format!("<em>{}</em>", inner);
        }
        if span.style.bold {
            inner = format!("<strong>{}</strong>", inner);
        }
        if let Some(href) = &span.style.link {
            inner = format!("<a href=\"{}\">{}</a>", html_escape::encode_double_quoted_attribute(href), inner);
        }
        if let Some(id) = &span.style.thread_id {
            inner = render_thread_mark(id, store, &inner);
        }
        s.push_str(&inner);
    }
    s
}

fn render_thread_mark(id: &ThreadId, store: &ThreadStore, inner: &str) -> String {
    let count = store.get_comment_count(id);
    let resolved = store.get_thread(id).is_some_and(|t| t.resolved);
    format!(
        "<span data-thread-id=\"{}\" class=\"has-comments\" data-comment-count=\"{}\"{}>{}</span>",
        html_escape::encode_double_quoted_attribute(id.as_str()),
        count,
        if resolved { " data-resolved=\"true\"" } else { "" },
        inner
    )
}

/// Inline element open while reading HTML.
enum Inline {
    Bold,
    Italic,
    Underline,
    Code,
    Link(String),
    Thread(ThreadId),
    Other,
}

/// Parse the markup `to_html` produces. `<p>` and `<h1>`..`<h6>` open blocks;
/// text outside a block is ignored. A `span[data-thread-id]` becomes a thread
/// mark. Comment counts and resolved flags are not read back.
pub fn from_html(html: &str) -> Result<Doc> {
    let mut reader = quick_xml::Reader::from_reader(html.as_bytes());
    let mut buf = Vec::new();
    let mut nodes: Vec<Node> = Vec::new();
    let mut spans: Vec<InlineSpan> = Vec::new();
    let mut open: Vec<Inline> = Vec::new();
    // Some(None) is a paragraph, Some(Some(n)) a heading.
    let mut block: Option<Option<u8>> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match block_level(e.local_name().as_ref()) {
                Some(level) => {
                    if let Some(prev) = block.replace(level) {
                        flush_html_block(&mut nodes, &mut spans, prev);
                    }
                    open.clear();
                }
                None if block.is_some() => open.push(inline_element(&e)?),
                None => {}
            },
            Ok(Event::Empty(e)) => {
                if let Some(level) = block_level(e.local_name().as_ref()) {
                    flush_html_block(&mut nodes, &mut Vec::new(), level);
                }
            }
            Ok(Event::Text(te)) if block.is_some() => {
                let text = te.unescape().map_err(|e| ThreadmarkError::Html(e.to_string()))?;
                spans.push(InlineSpan { text: text.into_owned(), style: fold_style(&open) });
            }
            Ok(Event::End(e)) => {
                if block_level(e.local_name().as_ref()).is_some() {
                    if let Some(level) = block.take() {
                        flush_html_block(&mut nodes, &mut spans, level);
                    }
                    open.clear();
                } else if block.is_some() {
                    open.pop();
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ThreadmarkError::Html(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if let Some(level) = block.take() {
        flush_html_block(&mut nodes, &mut spans, level);
    }
    tracing::debug!(blocks = nodes.len(), "imported html");
    Ok(Doc::new(nodes))
}

fn block_level(name: &[u8]) -> Option<Option<u8>> {
    match name {
        b"p" => Some(None),
        [b'h', d @ b'1'..=b'6'] => Some(Some(d - b'0')),
        _ => None,
    }
}

fn inline_element(e: &BytesStart<'_>) -> Result<Inline> {
    Ok(match e.local_name().as_ref() {
        b"strong" | b"b" => Inline::Bold,
        b"em" | b"i" => Inline::Italic,
        b"u" => Inline::Underline,
        b"code" => Inline::Code,
        b"a" => attribute(e, b"href")?.map_or(Inline::Other, Inline::Link),
        b"span" => attribute(e, b"data-thread-id")?.map_or(Inline::Other, |id| Inline::Thread(ThreadId::new(id))),
        _ => Inline::Other,
    })
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for a in e.attributes() {
        let a = a.map_err(|err| ThreadmarkError::Html(err.to_string()))?;
        if a.key.as_ref() == key {
            let value = a.unescape_value().map_err(|err| ThreadmarkError::Html(err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn fold_style(open: &[Inline]) -> InlineStyle {
    let mut style = InlineStyle::default();
    for el in open {
        match el {
            Inline::Bold => style.bold = true,
            Inline::Italic => style.italic = true,
            Inline::Underline => style.underline = true,
            Inline::Code => style.code = true,
            Inline::Link(href) => style.link = Some(href.clone()),
            Inline::Thread(id) => style.thread_id = Some(id.clone()),
            Inline::Other => {}
        }
    }
    style
}

fn flush_html_block(nodes: &mut Vec<Node>, spans: &mut Vec<InlineSpan>, level: Option<u8>) {
    normalize_spans(spans);
    flush_block(nodes, spans, level.map(u64::from));
}

pub fn to_delta(doc: &Doc) -> Value {
    let mut ops: Vec<Value> = Vec::new();
    for n in &doc.nodes {
        match n {
            Node::Paragraph { spans } => {
                push_spans_as_delta(&mut ops, spans);
                ops.push(json!({"insert":"\n"}));
            }
            Node::Heading { level, spans } => {
                push_spans_as_delta(&mut ops, spans);
                ops.push(json!({"insert":"\n", "attributes": {"header": (*level as u32).min(6)}}));
            }
        }
    }
    json!({"ops": ops})
}

fn push_spans_as_delta(ops: &mut Vec<Value>, spans: &[InlineSpan]) {
    for span in spans {
        let mut attributes = Map::new();
        if span.style.bold { attributes.insert("bold".into(), json!(true)); }
        if span.style.italic { attributes.insert("italic".into(), json!(true)); }
        if span.style.underline { attributes.insert("underline".into(), json!(true)); }
        if span.style.code { attributes.insert("code".into(), json!(true)); }
        if let Some(link) = &span.style.link { attributes.insert("link".into(), json!(link)); }
        if let Some(id) = &span.style.thread_id { attributes.insert("threadId".into(), json!(id)); }
        if attributes.is_empty() {
            ops.push(json!({"insert": span.text}));
        } else {
            ops.push(json!({"insert": span.text, "attributes": attributes}));
        }
    }
}

/// Best-effort import; unknown embeds are skipped.
pub fn from_delta(delta: &Value) -> Doc {
    let mut nodes: Vec<Node> = Vec::new();
    let mut current_spans: Vec<InlineSpan> = Vec::new();

    let ops = delta.get("ops").and_then(|v| v.as_array()).cloned().unwrap_or_default();
    for op in ops {
        let Some(s) = op.get("insert").and_then(|v| v.as_str()) else { continue };
        let attrs = op.get("attributes");
        let mut lines = s.split('\n').peekable();
        while let Some(line) = lines.next() {
            if !line.is_empty() {
                current_spans.push(InlineSpan { text: line.to_string(), style: style_from_attrs(attrs) });
            }
            if lines.peek().is_some() {
                let header = attrs.and_then(|a| a.get("header")).and_then(|v| v.as_u64());
                flush_block(&mut nodes, &mut current_spans, header);
            }
        }
    }

    if !current_spans.is_empty() {
        flush_block(&mut nodes, &mut current_spans, None);
    }

    Doc::new(nodes)
}

fn style_from_attrs(attrs: Option<&Value>) -> InlineStyle {
    let flag = |k: &str| attrs.and_then(|a| a.get(k)).and_then(|v| v.as_bool()).unwrap_or(false);
    let text = |k: &str| attrs.and_then(|a| a.get(k)).and_then(|v| v.as_str()).map(|s| s.to_string());
    InlineStyle {
        bold: flag("bold"),
        italic: flag("italic"),
        underline: flag("underline"),
        code: flag("code"),
        link: text("link"),
        thread_id: text("threadId").map(ThreadId::new),
    }
}

fn flush_block(nodes: &mut Vec<Node>, current_spans: &mut Vec<InlineSpan>, header: Option<u64>) {
    let mut spans = std::mem::take(current_spans);
    spans.retain(|s| !s.text.is_empty());
    match header {
        Some(h) => nodes.push(Node::Heading { level: (h.min(6) as u8).max(1), spans }),
        None => nodes.push(Node::Paragraph { spans }),
    }
}

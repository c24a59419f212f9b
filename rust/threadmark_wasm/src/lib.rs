use wasm_bindgen::prelude::*;
use threadmark_core::comments::{Author, ThreadId};
use threadmark_core::config::SessionConfig;
use threadmark_core::doc::Doc;
use threadmark_core::error::ThreadmarkError;
use threadmark_core::marks::RangeAttribution;
use threadmark_core::selection::{Anchor, SelectionRange};
use threadmark_core::CommentSession;

fn to_js(e: ThreadmarkError) -> JsValue { JsValue::from_str(&e.to_string()) }

fn json<T: serde::Serialize>(v: &T) -> String { serde_json::to_string(v).unwrap_or_else(|_| "null".to_string()) }

fn range(start_node: u32, start_offset: u32, end_node: u32, end_offset: u32) -> SelectionRange {
    SelectionRange::new(
        Anchor::new(start_node as usize, start_offset as usize),
        Anchor::new(end_node as usize, end_offset as usize),
    )
}

#[wasm_bindgen]
pub struct CommentEditor {
    session: CommentSession,
}

#[wasm_bindgen]
impl CommentEditor {
    #[wasm_bindgen(constructor)]
    pub fn new() -> CommentEditor {
        CommentEditor { session: CommentSession::new_empty() }
    }

    pub fn from_text(text: String) -> CommentEditor { CommentEditor { session: CommentSession::from_text(&text) } }

    pub fn from_json(json: String) -> Result<CommentEditor, JsValue> {
        let doc = Doc::from_json(&json).map_err(to_js)?;
        Ok(CommentEditor { session: CommentSession::new(doc, Default::default(), SessionConfig::default()) })
    }

    pub fn configure(&mut self, config_json: String) -> Result<(), JsValue> {
        let cfg = SessionConfig::from_json(&config_json).map_err(to_js)?;
        self.session.set_config(cfg).map_err(to_js)
    }

    pub fn to_json(&self) -> String { self.session.engine.to_json().unwrap_or_else(|_| "{}".to_string()) }
    pub fn to_html(&self) -> String { self.session.to_html() }
    pub fn to_delta(&self) -> String { self.session.to_delta() }
    pub fn load_delta(&mut self, delta_json: String) -> Result<(), JsValue> { self.session.load_delta(&delta_json).map_err(to_js) }
    pub fn load_html(&mut self, html: String) -> Result<(), JsValue> { self.session.load_html(&html).map_err(to_js) }

    // Selection
    pub fn select(&mut self, sn: u32, so: u32, en: u32, eo: u32) -> Result<(), JsValue> { self.session.select(range(sn, so, en, eo)).map_err(to_js) }

    // Comment actions
    pub fn comment_on_selection(&mut self, text: String, author_id: String, author_name: String) -> Result<String, JsValue> {
        let outcome = self.session.comment_on_selection(&text, &Author::new(author_id, author_name)).map_err(to_js)?;
        Ok(json(&outcome))
    }
    pub fn resolve_at_selection(&mut self) -> Result<Option<String>, JsValue> {
        Ok(self.session.resolve_at_selection().map_err(to_js)?.map(|id| id.to_string()))
    }
    pub fn resolve_thread(&mut self, thread_id: String, sn: u32, so: u32, en: u32, eo: u32) -> Result<(), JsValue> {
        self.session.resolve_thread(&ThreadId::new(thread_id), range(sn, so, en, eo)).map_err(to_js)
    }
    pub fn delete_thread_and_marks(&mut self, thread_id: String) { self.session.delete_thread_and_marks(&ThreadId::new(thread_id)) }

    // Lookups
    pub fn thread_at(&self, node: u32, offset: u32) -> String { json(&self.session.thread_at(Anchor::new(node as usize, offset as usize))) }
    pub fn classify_selection(&mut self) -> Result<String, JsValue> {
        let sel = threadmark_core::marks::MarkEngine::selection(&self.session.engine);
        let marks = RangeAttribution::new(&mut self.session.engine).classify(sel).map_err(to_js)?;
        Ok(json(&marks))
    }
    pub fn comment_count(&self, thread_id: String) -> u32 { self.session.store.get_comment_count(&ThreadId::new(thread_id)) as u32 }
    pub fn threads_json(&self) -> Result<String, JsValue> { self.session.threads_json().map_err(to_js) }
    pub fn load_threads_json(&mut self, json: String) -> Result<(), JsValue> { self.session.load_threads_json(&json).map_err(to_js) }

    // History
    pub fn undo(&mut self) -> bool { self.session.undo() }
    pub fn redo(&mut self) -> bool { self.session.redo() }
}

impl Default for CommentEditor {
    fn default() -> Self { Self::new() }
}

//! WASM bridge for Flowblocks: exposes the canvas engine to JavaScript.
//!
//! Compiled via `wasm-pack build --target web`. Every call returns a JSON
//! string: `{"ok":true,"result":...}` or `{"ok":false,"error":"..."}`, so no
//! error ever escapes into the host event loop as an exception.

use fb_core::document::GraphDocument;
use fb_core::error::GraphError;
use fb_core::events::GraphEvent;
use fb_core::hit::hit_test;
use fb_core::id::{BlockId, TemplateId};
use fb_core::model::{FlowGraph, Point};
use fb_editor::canvas::{CanvasObserver, FlowCanvas, RenderSnapshot};
use fb_editor::input::{DragSource, InputEvent};
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// The main WASM-facing canvas controller.
///
/// Holds the canvas (graph, arrows, history, drag tool). All interaction
/// from the page goes through this struct.
#[wasm_bindgen]
pub struct FbCanvas {
    canvas: FlowCanvas,
}

impl Default for FbCanvas {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl FbCanvas {
    /// Create a canvas with the default configuration.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        // Set up panic hook for better error messages in console
        console_error_panic_hook_setup();
        Self {
            canvas: FlowCanvas::default(),
        }
    }

    /// Create a canvas from a JSON config (camelCase keys, all optional).
    pub fn with_config(config_json: &str) -> Result<FbCanvas, String> {
        console_error_panic_hook_setup();
        let canvas = FlowCanvas::from_config_json(config_json).map_err(|e| e.to_string())?;
        Ok(Self { canvas })
    }

    /// Register `callback(json)`, invoked after every change with
    /// `{"events":[...],"snapshot":{...}}`. Replaces any previous listener.
    pub fn set_listener(&mut self, callback: js_sys::Function) {
        self.canvas.clear_observers();
        self.canvas.add_observer(Box::new(JsListener {
            callback,
            pending: Vec::new(),
        }));
    }

    pub fn clear_listener(&mut self) {
        self.canvas.clear_observers();
    }

    // ─── Blocks ──────────────────────────────────────────────────────────

    /// Create a root block with its top-left at (x, y). Result: the block.
    pub fn add_root(&mut self, template: &str, x: f32, y: f32) -> String {
        respond(self.canvas.add_root(template, Point::new(x, y)))
    }

    /// Drop a palette template. Result: a drop outcome.
    pub fn drop_template(&mut self, template: &str, x: f32, y: f32) -> String {
        respond(self.canvas.drop_template(template, Point::new(x, y)))
    }

    /// Preview a drag of an existing block (or a template when `id` is
    /// absent). Result: `{target, positions}`.
    pub fn drag_preview(&self, id: Option<f64>, template: &str, x: f32, y: f32) -> String {
        let source = match id.map(block_id).transpose() {
            Ok(Some(id)) => DragSource::Block { id },
            Ok(None) => DragSource::Template {
                template: TemplateId::intern(template),
            },
            Err(e) => return error(&e),
        };
        respond(self.canvas.preview(source, Point::new(x, y)))
    }

    /// Release an existing block at (x, y). Result: a drop outcome.
    pub fn commit_drag(&mut self, id: f64, x: f32, y: f32) -> String {
        respond(block_id(id).and_then(|id| self.canvas.commit_drag(id, Point::new(x, y))))
    }

    /// Feed a drag event, e.g. `{"type":"dragMove","point":{"x":1,"y":2}}`.
    pub fn handle_input(&mut self, event_json: &str) -> String {
        let event = match InputEvent::from_json(event_json) {
            Ok(event) => event,
            Err(e) => return error(&GraphError::from(e)),
        };
        respond(self.canvas.handle_input(&event))
    }

    /// Delete blocks with their subtrees. Result: removed ids.
    pub fn delete_blocks(&mut self, ids: &[f64]) -> String {
        let ids: Result<Vec<BlockId>, GraphError> = ids.iter().map(|&id| block_id(id)).collect();
        respond(ids.and_then(|ids| self.canvas.delete_blocks(&ids)))
    }

    /// Topmost block at (x, y), if any.
    pub fn hit_test(&self, x: f32, y: f32) -> Option<f64> {
        hit_test(self.canvas.graph(), Point::new(x, y)).map(|id| id.get() as f64)
    }

    // ─── History ─────────────────────────────────────────────────────────

    /// Result: `{applied, description}`.
    pub fn undo(&mut self) -> String {
        respond(self.canvas.undo())
    }

    pub fn redo(&mut self) -> String {
        respond(self.canvas.redo())
    }

    pub fn can_undo(&self) -> bool {
        self.canvas.history().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.canvas.history().can_redo()
    }

    // ─── Documents ───────────────────────────────────────────────────────

    /// Result: the exported document.
    pub fn export_json(&self) -> String {
        respond(self.canvas.export())
    }

    /// Replace the graph with a document. Nothing changes on error.
    pub fn import_json(&mut self, json: &str) -> String {
        respond(self.canvas.import_json(json).map(|()| true))
    }

    /// Result: the current render snapshot.
    pub fn snapshot_json(&self) -> String {
        respond(Ok(self.canvas.snapshot()))
    }
}

// ─── Listener ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChangePayload<'a> {
    events: &'a [GraphEvent],
    snapshot: &'a RenderSnapshot,
}

/// Buffers events until the render snapshot arrives, then calls back once.
struct JsListener {
    callback: js_sys::Function,
    pending: Vec<GraphEvent>,
}

impl CanvasObserver for JsListener {
    fn on_events(&mut self, events: &[GraphEvent]) {
        self.pending.extend_from_slice(events);
    }

    fn on_render(&mut self, snapshot: &RenderSnapshot) {
        let events = std::mem::take(&mut self.pending);
        let payload = ChangePayload {
            events: &events,
            snapshot,
        };
        match serde_json::to_string(&payload) {
            Ok(json) => {
                if let Err(err) = self.callback.call1(&JsValue::NULL, &JsValue::from_str(&json)) {
                    log::error!("listener threw: {err:?}");
                }
            }
            Err(err) => log::error!("cannot serialize change payload: {err}"),
        }
    }
}

// ─── Ids ─────────────────────────────────────────────────────────────────

/// Block ids cross the bridge as JS numbers; every valid id is an exact integer.
fn block_id(raw: f64) -> Result<BlockId, GraphError> {
    let max = BlockId::MAX.get() as f64;
    if raw.fract() != 0.0 || !(0.0..=max).contains(&raw) {
        return Err(GraphError::MalformedData(format!("{raw} is not a block id")));
    }
    Ok(BlockId(raw as u64))
}

// ─── Responses ───────────────────────────────────────────────────────────

fn respond<T: Serialize>(result: Result<T, GraphError>) -> String {
    match result {
        Ok(value) => match serde_json::to_value(&value) {
            Ok(value) => serde_json::json!({ "ok": true, "result": value }).to_string(),
            Err(e) => error(&GraphError::from(e)),
        },
        Err(e) => error(&e),
    }
}

fn error(err: &GraphError) -> String {
    serde_json::json!({ "ok": false, "error": err.to_string() }).to_string()
}

// ─── Panic hook for WASM debugging ───────────────────────────────────────

fn console_error_panic_hook_setup() {
    #[cfg(target_arch = "wasm32")]
    {
        use std::sync::Once;
        static SET_HOOK: Once = Once::new();
        SET_HOOK.call_once(|| {
            std::panic::set_hook(Box::new(|info| {
                let msg = format!("Flowblocks WASM panic: {info}");
                web_sys::console::error_1(&msg.into());
            }));
        });
    }
}

// ─── Standalone validation (no canvas needed) ────────────────────────────

/// Validate a document. Returns `{"ok":true,"result":<node count>}` or `{"ok":false,"error":"..."}`.
#[wasm_bindgen]
pub fn validate_document(json: &str) -> String {
    respond(
        GraphDocument::parse(json)
            .and_then(|doc| doc.validate(&FlowGraph::new()))
            .map(|blocks| blocks.len()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn parse(json: &str) -> Value {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn responses_are_tagged_json() {
        let mut canvas = FbCanvas::new();
        let added = parse(&canvas.add_root("action", 100.0, 100.0));
        assert_eq!(added["ok"], Value::Bool(true));
        assert_eq!(added["result"]["id"], serde_json::json!(1));

        let dropped = parse(&canvas.drop_template("action", 120.0, 260.0));
        assert_eq!(dropped["result"]["outcome"], serde_json::json!("attached"));
        assert_eq!(dropped["result"]["parent"], serde_json::json!(1));

        let failed = parse(&canvas.commit_drag(77.0, 0.0, 0.0));
        assert_eq!(failed["ok"], Value::Bool(false));
        assert_eq!(failed["error"], serde_json::json!("block #77 does not exist"));
    }

    #[test]
    fn input_events_drive_the_drag_tool() {
        let mut canvas = FbCanvas::new();
        canvas.add_root("action", 100.0, 100.0);
        let started = parse(&canvas.handle_input(r#"{"type":"dragStart","source":{"kind":"template","template":"action"}}"#));
        assert_eq!(started["result"]["response"], serde_json::json!("started"));
        let dropped = parse(&canvas.handle_input(r#"{"type":"dragEnd","point":{"x":120,"y":260}}"#));
        assert_eq!(dropped["result"]["outcome"]["outcome"], serde_json::json!("attached"));

        let bad = parse(&canvas.handle_input(r#"{"type":"wiggle"}"#));
        assert_eq!(bad["ok"], Value::Bool(false));
        assert_eq!(canvas.hit_test(150.0, 120.0), Some(1.0));
    }

    #[test]
    fn export_import_and_history() {
        let mut canvas = FbCanvas::new();
        canvas.add_root("action", 100.0, 100.0);
        let exported = parse(&canvas.export_json());
        let document = exported["result"].to_string();

        let mut other = FbCanvas::new();
        assert_eq!(parse(&other.import_json(&document))["ok"], Value::Bool(true));
        assert_eq!(parse(&other.snapshot_json())["result"]["blocks"][0]["templateType"], serde_json::json!("action"));
        assert!(other.can_undo());
        assert_eq!(parse(&other.undo())["result"]["applied"], Value::Bool(true));
        assert_eq!(parse(&other.undo())["result"]["applied"], Value::Bool(false));

        assert_eq!(parse(&validate_document(&document))["result"], serde_json::json!(1));
        assert_eq!(parse(&validate_document("{}"))["ok"], Value::Bool(false));
    }

    #[test]
    fn bad_config_is_reported() {
        assert!(FbCanvas::with_config(r#"{"historyCapacity":0}"#).is_err());
        let canvas = FbCanvas::with_config(r#"{"snap":{"depth":60}}"#).ok().unwrap();
        assert!(!canvas.can_undo());
    }

    #[test]
    fn large_ids_are_reachable_from_js() {
        let mut canvas = FbCanvas::new();
        let document = r#"{"nodes":[{"id":9007199254740991,"parentId":-1,"templateType":"action","position":{"x":100,"y":100}}],"connections":[]}"#;
        assert_eq!(parse(&canvas.import_json(document))["ok"], Value::Bool(true));

        let id = canvas.hit_test(150.0, 120.0).unwrap();
        assert_eq!(id, 9_007_199_254_740_991.0);
        let preview = parse(&canvas.drag_preview(Some(id), "", 900.0, 900.0));
        assert_eq!(preview["ok"], Value::Bool(true));

        for bad in [1.5, -1.0, f64::NAN, 9_007_199_254_740_992.0] {
            assert_eq!(parse(&canvas.delete_blocks(&[bad]))["ok"], Value::Bool(false));
        }
        let removed = parse(&canvas.delete_blocks(&[id]));
        assert_eq!(removed["result"], serde_json::json!([9_007_199_254_740_991u64]));

        let too_big = r#"{"nodes":[{"id":18446744073709551615,"parentId":-1,"templateType":"action","position":{"x":0,"y":0}}],"connections":[]}"#;
        assert_eq!(parse(&canvas.import_json(too_big))["ok"], Value::Bool(false));
    }
}

//! WebAssembly bindings for Pixel Timeline.
//!
//! Provides a thin wrapper around [`Editor`] for browser environments. The
//! page owns storage and timers: it calls `sync` after each input event and
//! `pollAutosave` from an interval, writing any returned bytes wherever it
//! keeps backups.

use std::time::Duration;

use wasm_bindgen::prelude::*;

use crate::{
    schema::{CanvasConfig, Palette, rgba_bytes},
    session::Editor,
    timeline::{FlipAxis, FrameStatus, Rect, StackError},
};

/// Initialize WASM module with panic hook and logging.
#[wasm_bindgen(start)]
pub fn init() {
    // Set panic hook for better error messages in browser
    console_error_panic_hook::set_once();

    // Initialize WASM logger
    wasm_logger::init(wasm_logger::Config::default());
}

fn js_error(context: &str, e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("{context}: {e}"))
}

/// Browser clock as a monotonic-enough timestamp for the autosave debouncer.
fn now() -> Duration {
    Duration::from_millis(js_sys::Date::now().max(0.0) as u64)
}

/// `[col1, row1, col2, row2]` from JS, or no selection.
fn selection(rect: Option<Vec<u32>>) -> Result<Option<Rect>, JsValue> {
    match rect.as_deref() {
        None => Ok(None),
        Some(&[col1, row1, col2, row2]) => Ok(Some(Rect::new(
            col1 as usize,
            row1 as usize,
            col2 as usize,
            row2 as usize,
        ))),
        Some(other) => Err(JsValue::from_str(&format!(
            "Selection needs 4 values, got {}",
            other.len()
        ))),
    }
}

/// WebAssembly wrapper for an editing session.
#[wasm_bindgen]
pub struct WasmEditor {
    editor: Editor,
    palette: Palette,
}

#[wasm_bindgen]
impl WasmEditor {
    /// Create a new editor from JSON configuration. An empty string uses
    /// the defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<WasmEditor, JsValue> {
        let config: CanvasConfig = if config_json.trim().is_empty() {
            CanvasConfig::default()
        } else {
            serde_json::from_str(config_json).map_err(|e| js_error("Invalid config JSON", e))?
        };

        let editor = Editor::new(config).map_err(|e| js_error("Invalid config", e))?;

        Ok(WasmEditor {
            editor,
            palette: Palette::generated(),
        })
    }

    /// Replace the display palette from a JSON array of `[r, g, b]` triples.
    #[wasm_bindgen(js_name = setPalette)]
    pub fn set_palette(&mut self, palette_json: &str) -> Result<(), JsValue> {
        let colors: Vec<[u8; 3]> = serde_json::from_str(palette_json)
            .map_err(|e| js_error("Invalid palette JSON", e))?;
        self.palette = Palette::new(colors).map_err(|e| js_error("Invalid palette", e))?;
        Ok(())
    }

    /// Paint on the current layer and frame. Returns whether anything changed.
    #[wasm_bindgen(js_name = putPixel)]
    pub fn put_pixel(
        &mut self,
        color: u8,
        col: i32,
        row: i32,
        brush_size: u32,
        rect: Option<Vec<u32>>,
    ) -> Result<bool, JsValue> {
        let selection = selection(rect)?;
        let stack = self.editor.stack_mut();
        let frame = stack.current_frame();
        Ok(stack
            .current_layer_mut()
            .put_pixel(frame, color, col, row, brush_size, selection))
    }

    /// Palette index under the cursor on the current layer and frame.
    #[wasm_bindgen(js_name = getPixel)]
    pub fn get_pixel(&self, col: i32, row: i32) -> u8 {
        let stack = self.editor.stack();
        stack
            .current_layer()
            .get_pixel(stack.current_frame(), col, row)
    }

    /// Flood fill (or fill the selection) on the current layer and frame.
    pub fn fill(
        &mut self,
        col: i32,
        row: i32,
        color: u8,
        rect: Option<Vec<u32>>,
    ) -> Result<bool, JsValue> {
        let selection = selection(rect)?;
        let stack = self.editor.stack_mut();
        let frame = stack.current_frame();
        stack
            .current_layer_mut()
            .fill(frame, col, row, color, selection)
            .map_err(|e| js_error("Fill failed", e))
    }

    /// Mirror the current keyframe. `axis` is `"horizontal"` or `"vertical"`.
    pub fn flip(&mut self, axis: &str, rect: Option<Vec<u32>>) -> Result<(), JsValue> {
        let axis = match axis {
            "horizontal" => FlipAxis::Horizontal,
            "vertical" => FlipAxis::Vertical,
            other => return Err(JsValue::from_str(&format!("Unknown axis: {other}"))),
        };
        let selection = selection(rect)?;
        let stack = self.editor.stack_mut();
        let frame = stack.current_frame();
        stack
            .current_layer_mut()
            .flip(frame, axis, selection)
            .map_err(|e| js_error("Flip failed", e))
    }

    /// Lift a selection of the current keyframe into a movable transaction.
    #[wasm_bindgen(js_name = startMove)]
    pub fn start_move(&mut self, col1: u32, row1: u32, col2: u32, row2: u32) -> Result<(), JsValue> {
        let rect = Rect::new(col1 as usize, row1 as usize, col2 as usize, row2 as usize);
        let stack = self.editor.stack_mut();
        let frame = stack.current_frame();
        stack
            .current_layer_mut()
            .start_transaction_from_selection(frame, rect)
            .map_err(|e| js_error("Move failed", e))
    }

    /// Shift the open transaction on the current layer.
    #[wasm_bindgen(js_name = translateMove)]
    pub fn translate_move(&mut self, dx: i32, dy: i32) {
        self.editor
            .stack_mut()
            .current_layer_mut()
            .translate_transaction(dx, dy);
    }

    /// Commit every open transaction.
    #[wasm_bindgen(js_name = commitMove)]
    pub fn commit_move(&mut self) {
        self.editor.stack_mut().commit_transactions();
    }

    #[wasm_bindgen(js_name = createKeyframe)]
    pub fn create_keyframe(&mut self) -> Result<(), JsValue> {
        let stack = self.editor.stack_mut();
        let frame = stack.current_frame();
        stack
            .current_layer_mut()
            .create_keyframe(frame)
            .map_err(|e| js_error("Keyframe failed", e))
    }

    #[wasm_bindgen(js_name = createBlankKeyframe)]
    pub fn create_blank_keyframe(&mut self) -> Result<(), JsValue> {
        let stack = self.editor.stack_mut();
        let frame = stack.current_frame();
        stack
            .current_layer_mut()
            .create_blank_keyframe(frame)
            .map_err(|e| js_error("Keyframe failed", e))
    }

    #[wasm_bindgen(js_name = insertFrame)]
    pub fn insert_frame(&mut self) -> Result<(), JsValue> {
        let stack = self.editor.stack_mut();
        let frame = stack.current_frame();
        stack
            .current_layer_mut()
            .insert_frame(frame)
            .map_err(|e| js_error("Insert frame failed", e))
    }

    #[wasm_bindgen(js_name = removeFrame)]
    pub fn remove_frame(&mut self) -> Result<(), JsValue> {
        let stack = self.editor.stack_mut();
        let frame = stack.current_frame();
        stack
            .current_layer_mut()
            .remove_frame(frame)
            .map_err(|e| js_error("Remove frame failed", e))
    }

    #[wasm_bindgen(js_name = setCurrentFrame)]
    pub fn set_current_frame(&mut self, frame: usize) {
        self.editor.stack_mut().set_current_frame(frame);
    }

    #[wasm_bindgen(js_name = setCurrentLayer)]
    pub fn set_current_layer(&mut self, index: usize) {
        self.editor.stack_mut().set_current_layer(index);
    }

    /// Insert an empty layer at `index`. Returns the new layer's index.
    #[wasm_bindgen(js_name = insertLayer)]
    pub fn insert_layer(&mut self, index: usize) -> Result<usize, JsValue> {
        self.editor
            .stack_mut()
            .insert_layer(index)
            .map_err(|e| js_error("Insert layer failed", e))
    }

    #[wasm_bindgen(js_name = duplicateLayer)]
    pub fn duplicate_layer(&mut self) -> Result<(), JsValue> {
        self.editor
            .stack_mut()
            .duplicate_layer()
            .map_err(|e| js_error("Duplicate layer failed", e))
    }

    #[wasm_bindgen(js_name = removeLayer)]
    pub fn remove_layer(&mut self) {
        self.editor.stack_mut().remove_layer();
    }

    /// Merge the current layer into the one below. Returns `false` when
    /// there is no layer below.
    #[wasm_bindgen(js_name = mergeDown)]
    pub fn merge_down(&mut self) -> Result<bool, JsValue> {
        match self.editor.stack_mut().merge_down() {
            Ok(()) => Ok(true),
            Err(StackError::NoLayerBelow) => Ok(false),
            Err(e) => Err(js_error("Merge failed", e)),
        }
    }

    /// Reorder layers from a JSON array of layer ids, top first.
    pub fn reorder(&mut self, order_json: &str) -> Result<(), JsValue> {
        let order: Vec<String> =
            serde_json::from_str(order_json).map_err(|e| js_error("Invalid order JSON", e))?;
        self.editor
            .stack_mut()
            .reorder(&order)
            .map_err(|e| js_error("Reorder failed", e))
    }

    #[wasm_bindgen(js_name = setVisibility)]
    pub fn set_visibility(&mut self, index: usize, visible: bool) -> Result<(), JsValue> {
        self.editor
            .stack_mut()
            .set_visibility(index, visible)
            .map_err(|e| js_error("Visibility failed", e))
    }

    pub fn rename(&mut self, index: usize, name: &str) -> Result<(), JsValue> {
        self.editor
            .stack_mut()
            .rename(index, name)
            .map_err(|e| js_error("Rename failed", e))
    }

    /// Visible layers of the current frame as `RGBA` bytes, ready for
    /// `ImageData`.
    pub fn composite(&self) -> Vec<u8> {
        let pixels = self.editor.stack().composite_rgba(&self.palette);
        rgba_bytes(&pixels).to_vec()
    }

    /// Frame status codes of the current layer.
    #[wasm_bindgen(js_name = framesStatus)]
    pub fn frames_status(&self) -> Vec<u8> {
        self.editor
            .stack()
            .current_layer()
            .frames_status()
            .into_iter()
            .map(FrameStatus::code)
            .collect()
    }

    /// Drain change flags, recording finished edits in history.
    /// Returns `{ timeline, commit }`.
    pub fn sync(&mut self) -> Result<JsValue, JsValue> {
        let changes = self.editor.sync(now());
        serde_wasm_bindgen::to_value(&changes).map_err(|e| js_error("Serialization error", e))
    }

    pub fn undo(&mut self) -> Result<bool, JsValue> {
        self.editor.undo().map_err(|e| js_error("Undo failed", e))
    }

    pub fn redo(&mut self) -> Result<bool, JsValue> {
        self.editor.redo().map_err(|e| js_error("Redo failed", e))
    }

    #[wasm_bindgen(js_name = canUndo)]
    pub fn can_undo(&self) -> bool {
        self.editor.history().can_undo()
    }

    #[wasm_bindgen(js_name = canRedo)]
    pub fn can_redo(&self) -> bool {
        self.editor.history().can_redo()
    }

    pub fn copy(&mut self, rect: Option<Vec<u32>>) -> Result<(), JsValue> {
        let selection = selection(rect)?;
        self.editor
            .copy(selection)
            .map_err(|e| js_error("Copy failed", e))
    }

    pub fn cut(&mut self, rect: Option<Vec<u32>>) -> Result<(), JsValue> {
        let selection = selection(rect)?;
        self.editor
            .cut(selection)
            .map_err(|e| js_error("Cut failed", e))
    }

    pub fn paste(&mut self) -> Result<(), JsValue> {
        self.editor
            .paste()
            .map(|_| ())
            .map_err(|e| js_error("Paste failed", e))
    }

    /// Replace the document with a packed file. On error nothing changes.
    pub fn load(&mut self, bytes: &[u8]) -> Result<(), JsValue> {
        self.editor.load(bytes).map_err(|e| js_error("Load failed", e))
    }

    #[wasm_bindgen(js_name = newDocument)]
    pub fn new_document(&mut self) {
        self.editor.new_document();
    }

    #[wasm_bindgen(js_name = saveBytes)]
    pub fn save_bytes(&mut self) -> Result<Vec<u8>, JsValue> {
        self.editor
            .save_bytes()
            .map_err(|e| js_error("Pack failed", e))
    }

    #[wasm_bindgen(js_name = exportFinal)]
    pub fn export_final(&mut self) -> Result<Vec<u8>, JsValue> {
        self.editor
            .export_final()
            .map_err(|e| js_error("Pack failed", e))
    }

    /// Packed bytes once the autosave delay has passed, otherwise `undefined`.
    #[wasm_bindgen(js_name = pollAutosave)]
    pub fn poll_autosave(&mut self) -> Result<Option<Vec<u8>>, JsValue> {
        self.editor
            .poll_autosave(now())
            .map_err(|e| js_error("Autosave failed", e))
    }

    #[wasm_bindgen(js_name = setAutosaveMuted)]
    pub fn set_autosave_muted(&mut self, muted: bool) {
        self.editor.set_autosave_muted(muted);
    }

    /// Committed snapshot of the whole stack as a JS object.
    #[wasm_bindgen(js_name = getState)]
    pub fn get_state(&mut self) -> Result<JsValue, JsValue> {
        let state = self.editor.stack_mut().get_state();
        serde_wasm_bindgen::to_value(&state).map_err(|e| js_error("Serialization error", e))
    }

    #[wasm_bindgen(js_name = getConfig)]
    pub fn get_config(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(self.editor.config())
            .map_err(|e| js_error("Serialization error", e))
    }

    #[wasm_bindgen(js_name = currentFrame)]
    pub fn current_frame(&self) -> usize {
        self.editor.stack().current_frame()
    }

    #[wasm_bindgen(js_name = currentLayer)]
    pub fn current_layer(&self) -> usize {
        self.editor.stack().current_layer_index()
    }

    #[wasm_bindgen(js_name = layerCount)]
    pub fn layer_count(&self) -> usize {
        self.editor.stack().len()
    }
}

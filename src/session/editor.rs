//! Editing session: a layer stack with history, autosave and clipboard.

use std::time::Duration;

use log::{info, warn};

use super::{Autosave, History};
use crate::animation::{Codec, CodecError};
use crate::schema::{CanvasConfig, ConfigError};
use crate::timeline::{
    ChangeSet, Clipboard, ClipboardError, IdGenerator, LayerStack, Pasted, Rect, SequentialIds,
    StackError,
};

/// Session-level errors.
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Could not read animation: {0}")]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Stack(#[from] StackError),
    #[error(transparent)]
    Clipboard(#[from] ClipboardError),
}

/// Everything one open document needs.
///
/// Callers mutate the stack, then call [`sync`](Editor::sync) once per
/// input event with the current time. Finished edits are snapshotted into
/// history and schedule an autosave; [`poll_autosave`](Editor::poll_autosave)
/// hands back packed bytes when the debounce delay has passed.
#[derive(Debug)]
pub struct Editor {
    config: CanvasConfig,
    stack: LayerStack,
    codec: Codec,
    history: History,
    autosave: Autosave,
    clipboard: Clipboard,
    pending_commit: bool,
}

impl Editor {
    pub fn new(config: CanvasConfig) -> Result<Self, EditorError> {
        Self::with_ids(config, Box::new(SequentialIds::new()))
    }

    pub fn with_ids(config: CanvasConfig, ids: Box<dyn IdGenerator>) -> Result<Self, EditorError> {
        config.validate()?;
        let codec = Codec::new(config.dimensions());
        let mut editor = Self {
            stack: LayerStack::with_ids(&config, ids),
            codec,
            history: History::new(config.history_limit),
            autosave: Autosave::new(codec, Duration::from_millis(config.autosave_delay_ms)),
            clipboard: Clipboard::new(),
            pending_commit: false,
            config,
        };
        editor.history.save(editor.stack.get_state());
        Ok(editor)
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn stack(&self) -> &LayerStack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut LayerStack {
        &mut self.stack
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn clipboard(&self) -> &Clipboard {
        &self.clipboard
    }

    /// Drain change flags. A finished edit is recorded in history and
    /// schedules an autosave; recording waits until no transaction is open
    /// so a live move preview is never committed early.
    pub fn sync(&mut self, now: Duration) -> ChangeSet {
        let changes = self.stack.take_changes();
        self.pending_commit |= changes.commit;

        if self.pending_commit && !self.stack.has_transaction() {
            self.pending_commit = false;
            if self.history.save(self.stack.get_state()) {
                self.autosave.schedule(now);
            }
        }
        changes
    }

    /// Restore the previous snapshot. Returns `false` at the oldest one.
    pub fn undo(&mut self) -> Result<bool, EditorError> {
        let Some(state) = self.history.undo().cloned() else {
            return Ok(false);
        };
        self.stack.set_state(state)?;
        self.pending_commit = false;
        Ok(true)
    }

    /// Re-apply the next snapshot. Returns `false` at the newest one.
    pub fn redo(&mut self) -> Result<bool, EditorError> {
        let Some(state) = self.history.redo().cloned() else {
            return Ok(false);
        };
        self.stack.set_state(state)?;
        self.pending_commit = false;
        Ok(true)
    }

    /// Replace the document with a packed file. On error the open document,
    /// its history and any pending autosave are left as they were.
    pub fn load(&mut self, bytes: &[u8]) -> Result<(), EditorError> {
        let state = self.codec.unpack(bytes).inspect_err(|e| {
            warn!("load rejected: {}", e);
        })?;
        self.stack.set_state(state)?;
        self.stack.take_changes();

        self.autosave.cancel();
        self.history.clear();
        self.history.save(self.stack.get_state());
        self.pending_commit = false;
        info!("loaded {} layers", self.stack.len());
        Ok(())
    }

    /// Start over with one empty layer and a fresh history.
    pub fn new_document(&mut self) {
        self.stack.reset();
        self.stack.take_changes();
        self.autosave.cancel();
        self.history.clear();
        self.history.save(self.stack.get_state());
        self.pending_commit = false;
    }

    /// Pack the whole document.
    pub fn save_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        self.codec.pack(&mut self.stack)
    }

    /// Pack the document flattened into a single layer.
    pub fn export_final(&mut self) -> Result<Vec<u8>, CodecError> {
        self.codec.pack_flattened(&mut self.stack)
    }

    /// Packed bytes to store, once the autosave delay has passed.
    pub fn poll_autosave(&mut self, now: Duration) -> Result<Option<Vec<u8>>, CodecError> {
        self.autosave.poll(now, &mut self.stack)
    }

    /// Suppress autosave scheduling, for example while restoring a backup.
    pub fn set_autosave_muted(&mut self, muted: bool) {
        self.autosave.set_muted(muted);
    }

    pub fn copy(&mut self, selection: Option<Rect>) -> Result<(), EditorError> {
        Ok(self.clipboard.copy(&mut self.stack, selection)?)
    }

    pub fn cut(&mut self, selection: Option<Rect>) -> Result<(), EditorError> {
        Ok(self.clipboard.cut(&mut self.stack, selection)?)
    }

    pub fn paste(&mut self) -> Result<Pasted, EditorError> {
        Ok(self.clipboard.paste(&mut self.stack)?)
    }
}

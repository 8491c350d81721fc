//! Session module - Undo history, debounced autosave and the editor that
//! wires them to a layer stack.

mod autosave;
mod editor;
mod history;

pub use autosave::*;
pub use editor::*;
pub use history::*;

//! Pixel Timeline - Keyframe sprite animation model with a compact binary
//! file format.
//!
//! A document is a stack of layers. Each layer owns a fixed number of frame
//! slots; a slot either holds a keyframe grid of palette indices or repeats
//! the nearest earlier keyframe. Edits can be staged in a per-layer
//! transaction and moved around before they are committed.
//!
//! # Architecture
//!
//! - `schema`: Canvas configuration and the color palette
//! - `timeline`: Grids, layers, transactions and the layer stack
//! - `animation`: The chunked, run-length coded file format
//! - `session`: Undo history, debounced autosave and the editor facade
//!
//! # Example
//!
//! ```rust,no_run
//! use pixel_timeline::{
//!     animation::Codec,
//!     schema::CanvasConfig,
//!     timeline::{LayerStack, Rect},
//! };
//!
//! let config = CanvasConfig::default();
//! let mut stack = LayerStack::new(&config);
//!
//! // Paint a 3x3 dot on frame 0 and shift it right on frame 1
//! let layer = stack.current_layer_mut();
//! layer.put_pixel(0, 12, 10, 10, 2, None);
//! layer.create_keyframe(1).unwrap();
//! layer.start_transaction_from_selection(1, Rect::new(9, 9, 12, 12)).unwrap();
//! layer.translate_transaction(5, 0);
//! layer.commit_transaction();
//!
//! let codec = Codec::new(config.dimensions());
//! let bytes = codec.pack(&mut stack).unwrap();
//! println!("Packed size: {} bytes", bytes.len());
//! ```

pub mod animation;
pub mod schema;
pub mod session;
pub mod timeline;

// WebAssembly bindings (only for wasm32 target)
#[cfg(target_arch = "wasm32")]
pub mod wasm;

// Re-export commonly used types
pub use animation::{Codec, CodecError};
pub use schema::{CanvasConfig, Dimensions, Palette};
pub use session::Editor;
pub use timeline::{Layer, LayerStack, StackState};

//! Timeline module - Layers of keyframed pixel grids and the stack that
//! composites them.

mod changes;
mod clipboard;
mod edit;
mod grid;
mod ids;
mod layer;
mod stack;

pub use changes::*;
pub use clipboard::*;
pub use edit::*;
pub use grid::*;
pub use ids::*;
pub use layer::*;
pub use stack::*;

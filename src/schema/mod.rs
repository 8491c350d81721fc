//! Schema module - Configuration and palette types for sprite documents.

mod config;
mod palette;

pub use config::*;
pub use palette::*;

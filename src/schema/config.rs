//! Configuration types for a sprite animation document.

use serde::{Deserialize, Serialize};

/// Largest grid edge accepted by [`CanvasConfig::validate`].
pub const MAX_GRID_EDGE: usize = 4096;

/// Largest frame count accepted by [`CanvasConfig::validate`].
pub const MAX_FRAMES: usize = 1024;

/// Layer count is stored as a single byte in packed files.
pub const MAX_LAYERS_LIMIT: usize = u8::MAX as usize;

fn default_cols() -> usize {
    200
}

fn default_rows() -> usize {
    200
}

fn default_frames() -> usize {
    60
}

fn default_max_layers() -> usize {
    30
}

fn default_history_limit() -> usize {
    50
}

fn default_autosave_delay_ms() -> u64 {
    500
}

/// Top-level document configuration.
///
/// Grid size and frame count are fixed for the lifetime of a document; every
/// layer and the codec carry the same [`Dimensions`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasConfig {
    /// Grid width in cells.
    #[serde(default = "default_cols")]
    pub cols: usize,
    /// Grid height in cells.
    #[serde(default = "default_rows")]
    pub rows: usize,
    /// Number of frame slots per layer.
    #[serde(default = "default_frames")]
    pub frames: usize,
    /// Maximum number of layers in a stack.
    #[serde(default = "default_max_layers")]
    pub max_layers: usize,
    /// Number of undo snapshots retained.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Quiet period before a scheduled autosave fires.
    #[serde(default = "default_autosave_delay_ms")]
    pub autosave_delay_ms: u64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            cols: default_cols(),
            rows: default_rows(),
            frames: default_frames(),
            max_layers: default_max_layers(),
            history_limit: default_history_limit(),
            autosave_delay_ms: default_autosave_delay_ms(),
        }
    }
}

impl CanvasConfig {
    /// Grid and timeline shape shared by layers and the codec.
    #[inline]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            cols: self.cols,
            rows: self.rows,
            frames: self.frames,
        }
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cols == 0 || self.rows == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.cols > MAX_GRID_EDGE || self.rows > MAX_GRID_EDGE {
            return Err(ConfigError::GridTooLarge {
                cols: self.cols,
                rows: self.rows,
            });
        }
        if self.frames == 0 || self.frames > MAX_FRAMES {
            return Err(ConfigError::InvalidFrameCount(self.frames));
        }
        if self.max_layers == 0 || self.max_layers > MAX_LAYERS_LIMIT {
            return Err(ConfigError::InvalidLayerCap(self.max_layers));
        }
        if self.history_limit == 0 {
            return Err(ConfigError::InvalidHistoryLimit);
        }
        Ok(())
    }
}

/// Shape of a document: grid size and number of frame slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub cols: usize,
    pub rows: usize,
    pub frames: usize,
}

impl Dimensions {
    /// Number of cells in one grid.
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.cols * self.rows
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        CanvasConfig::default().dimensions()
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Grid dimensions (cols, rows) must be non-zero")]
    InvalidDimensions,
    #[error("Grid {cols}x{rows} exceeds the 4096 cell edge limit")]
    GridTooLarge { cols: usize, rows: usize },
    #[error("Frame count {0} must be between 1 and 1024")]
    InvalidFrameCount(usize),
    #[error("Layer cap {0} must be between 1 and 255")]
    InvalidLayerCap(usize),
    #[error("History limit must be non-zero")]
    InvalidHistoryLimit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CanvasConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dimensions().cell_count(), 200 * 200);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CanvasConfig = serde_json::from_str(r#"{"cols": 32, "rows": 16}"#).unwrap();
        assert_eq!(config.cols, 32);
        assert_eq!(config.rows, 16);
        assert_eq!(config.frames, 60);
        assert_eq!(config.max_layers, 30);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero = CanvasConfig {
            cols: 0,
            ..Default::default()
        };
        assert!(matches!(zero.validate(), Err(ConfigError::InvalidDimensions)));

        let huge = CanvasConfig {
            rows: MAX_GRID_EDGE + 1,
            ..Default::default()
        };
        assert!(matches!(huge.validate(), Err(ConfigError::GridTooLarge { .. })));

        let layers = CanvasConfig {
            max_layers: 256,
            ..Default::default()
        };
        assert!(matches!(layers.validate(), Err(ConfigError::InvalidLayerCap(256))));

        let frames = CanvasConfig {
            frames: 0,
            ..Default::default()
        };
        assert!(matches!(frames.validate(), Err(ConfigError::InvalidFrameCount(0))));
    }
}

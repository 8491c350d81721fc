//! Copy, cut and paste of keyframe pixels.
//!
//! A clipboard holds one full-size grid. Copying from a selection keeps the
//! copied pixels at their original coordinates so a paste lands in place and
//! can then be moved through the layer's transaction.

use log::debug;

use super::{Grid, LayerStack, Rect, TimelineError};

/// Clipboard errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClipboardError {
    #[error("You can only copy from a keyframe. The current frame is not a key")]
    NotAKeyframe,
    #[error("Clipboard is empty")]
    Empty,
    #[error(transparent)]
    Timeline(#[from] TimelineError),
}

/// Result of a paste.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pasted {
    /// The whole frame was replaced and committed.
    Frame,
    /// A move transaction was opened; the rectangle bounds the pasted ink.
    Selection(Rect),
}

#[derive(Debug, Clone, Default)]
pub struct Clipboard {
    buffer: Option<Grid>,
    whole_frame: bool,
}

impl Clipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_none()
    }

    pub fn buffer(&self) -> Option<&Grid> {
        self.buffer.as_ref()
    }

    /// Copy the current keyframe (or `selection` inside it).
    pub fn copy(
        &mut self,
        stack: &mut LayerStack,
        selection: Option<Rect>,
    ) -> Result<(), ClipboardError> {
        self.capture(stack, selection, false)
    }

    /// Copy, then clear the copied cells as one committed edit.
    pub fn cut(
        &mut self,
        stack: &mut LayerStack,
        selection: Option<Rect>,
    ) -> Result<(), ClipboardError> {
        self.capture(stack, selection, true)
    }

    fn capture(
        &mut self,
        stack: &mut LayerStack,
        selection: Option<Rect>,
        erase: bool,
    ) -> Result<(), ClipboardError> {
        stack.commit_transactions();
        let frame = stack.current_frame();
        let layer = stack.current_layer_mut();
        let dims = layer.dims();
        let source = layer.pixels(frame).ok_or(ClipboardError::NotAKeyframe)?;

        let rect = selection
            .unwrap_or_else(|| Rect::full(dims.cols, dims.rows))
            .clipped(dims.cols, dims.rows);
        let mut buffer = Grid::blank(dims.cols, dims.rows);
        for row in rect.row1..rect.row2 {
            for col in rect.col1..rect.col2 {
                buffer.set(col, row, source.get(col, row));
            }
        }

        if erase {
            layer.keyframe_mut(frame)?.clear_rect(rect);
            layer.mark_committed();
        }

        debug!(
            "clipboard: {} {:?} from layer {} frame {}",
            if erase { "cut" } else { "copy" },
            rect,
            layer.id(),
            frame
        );
        self.buffer = Some(buffer);
        self.whole_frame = selection.is_none();
        Ok(())
    }

    /// Paste into the current layer and frame.
    ///
    /// A whole-frame copy replaces the keyframe. A selection copy opens a
    /// transaction seeded with the buffer, ready to be translated.
    pub fn paste(&self, stack: &mut LayerStack) -> Result<Pasted, ClipboardError> {
        let buffer = self.buffer.as_ref().ok_or(ClipboardError::Empty)?;
        stack.commit_transactions();
        let frame = stack.current_frame();
        let layer = stack.current_layer_mut();

        if self.whole_frame {
            layer.set_pixels(frame, buffer.clone())?;
            layer.mark_committed();
            return Ok(Pasted::Frame);
        }

        let rect = buffer
            .ink_bounds()
            .unwrap_or_else(|| Rect::full(buffer.cols(), buffer.rows()));
        layer.start_transaction_from_buffer(frame, buffer)?;
        Ok(Pasted::Selection(rect))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CanvasConfig;

    fn stack() -> LayerStack {
        let config = CanvasConfig {
            cols: 4,
            rows: 4,
            frames: 3,
            ..Default::default()
        };
        LayerStack::new(&config)
    }

    #[test]
    fn test_copy_requires_keyframe() {
        let mut stack = stack();
        let mut clipboard = Clipboard::new();
        assert_eq!(
            clipboard.copy(&mut stack, None),
            Err(ClipboardError::NotAKeyframe)
        );
        assert_eq!(clipboard.paste(&mut stack), Err(ClipboardError::Empty));
    }

    #[test]
    fn test_cut_and_paste_selection() {
        let mut stack = stack();
        stack.current_layer_mut().put_pixel(0, 3, 1, 1, 1, None);
        stack.current_layer_mut().put_pixel(0, 4, 3, 3, 1, None);
        stack.take_changes();

        let mut clipboard = Clipboard::new();
        clipboard
            .cut(&mut stack, Some(Rect::new(0, 0, 2, 2)))
            .unwrap();
        assert!(stack.take_changes().commit);
        assert_eq!(stack.current_layer().get_pixel(0, 1, 1), 0);
        assert_eq!(stack.current_layer().get_pixel(0, 3, 3), 4);

        stack.set_current_frame(2);
        let pasted = clipboard.paste(&mut stack).unwrap();
        assert_eq!(pasted, Pasted::Selection(Rect::new(1, 1, 2, 2)));

        let layer = stack.current_layer_mut();
        assert!(layer.has_transaction());
        layer.translate_transaction(1, 0);
        layer.commit_transaction();
        assert_eq!(layer.get_pixel(2, 2, 1), 3);
        assert_eq!(layer.get_pixel(2, 3, 3), 4);
    }

    #[test]
    fn test_whole_frame_paste_replaces_keyframe() {
        let mut stack = stack();
        stack.current_layer_mut().put_pixel(0, 7, 0, 0, 1, None);

        let mut clipboard = Clipboard::new();
        clipboard.copy(&mut stack, None).unwrap();
        stack.current_layer_mut().put_pixel(0, 2, 0, 0, 1, None);

        assert_eq!(clipboard.paste(&mut stack).unwrap(), Pasted::Frame);
        assert_eq!(stack.current_layer().get_pixel(0, 0, 0), 7);
        assert!(!stack.current_layer().has_transaction());
    }
}

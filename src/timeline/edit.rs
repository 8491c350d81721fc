//! Whole-keyframe edits: mirroring and flood fill.

use serde::{Deserialize, Serialize};

use super::{Layer, Rect, TimelineError};
use crate::schema::PALETTE_SIZE;

/// Mirror direction for [`Layer::flip`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlipAxis {
    /// Mirror columns (left/right).
    Horizontal,
    /// Mirror rows (top/bottom).
    Vertical,
}

impl Layer {
    /// Mirror the keyframe at `frame`, or only the `selection` inside it.
    ///
    /// Any active transaction is committed first. The keyframe is created
    /// (clone-on-write) if the slot is empty.
    pub fn flip(
        &mut self,
        frame: usize,
        axis: FlipAxis,
        selection: Option<Rect>,
    ) -> Result<(), TimelineError> {
        self.commit_transaction();
        let dims = self.dims();
        let rect = selection
            .unwrap_or_else(|| Rect::full(dims.cols, dims.rows))
            .clipped(dims.cols, dims.rows);

        let grid = self.keyframe_mut(frame)?;
        let source = grid.clone();
        for row in rect.row1..rect.row2 {
            for col in rect.col1..rect.col2 {
                let color = match axis {
                    FlipAxis::Horizontal => source.get(rect.col2 - 1 - (col - rect.col1), row),
                    FlipAxis::Vertical => source.get(col, rect.row2 - 1 - (row - rect.row1)),
                };
                grid.set(col, row, color);
            }
        }

        self.mark_committed();
        Ok(())
    }

    /// Paint with `color` starting at `(col, row)`.
    ///
    /// With a selection the whole selection is painted. Without one, the
    /// 4-connected region sharing the start cell's color is filled. Returns
    /// `Ok(false)` when nothing changed: the start cell is outside the grid or
    /// already holds `color`.
    pub fn fill(
        &mut self,
        frame: usize,
        col: i32,
        row: i32,
        color: u8,
        selection: Option<Rect>,
    ) -> Result<bool, TimelineError> {
        if color as usize >= PALETTE_SIZE {
            return Err(TimelineError::InvalidColor(color));
        }
        let dims = self.dims();
        if col < 0 || row < 0 || col as usize >= dims.cols || row as usize >= dims.rows {
            return Ok(false);
        }
        let (col, row) = (col as usize, row as usize);

        self.commit_transaction();
        let grid = self.keyframe_mut(frame)?;
        let target = grid.get(col, row);
        if target == color {
            return Ok(false);
        }

        if let Some(selection) = selection {
            let rect = selection.clipped(dims.cols, dims.rows);
            for r in rect.row1..rect.row2 {
                for c in rect.col1..rect.col2 {
                    grid.set(c, r, color);
                }
            }
        } else {
            let mut pending = vec![(col, row)];
            grid.set(col, row, color);
            while let Some((c, r)) = pending.pop() {
                let neighbours = [
                    (c.checked_sub(1), Some(r)),
                    (Some(c + 1).filter(|&c| c < dims.cols), Some(r)),
                    (Some(c), r.checked_sub(1)),
                    (Some(c), Some(r + 1).filter(|&r| r < dims.rows)),
                ];
                for (c2, r2) in neighbours {
                    let (Some(c2), Some(r2)) = (c2, r2) else {
                        continue;
                    };
                    if grid.get(c2, r2) == target {
                        grid.set(c2, r2, color);
                        pending.push((c2, r2));
                    }
                }
            }
        }

        self.mark_committed();
        Ok(true)
    }
}

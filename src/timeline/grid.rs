//! Pixel grid storage and selection rectangles.

use serde::{Deserialize, Serialize};

use super::TimelineError;
use crate::schema::{PALETTE_SIZE, TRANSPARENT};

/// A `rows × cols` grid of palette indices.
///
/// Data is stored as a flat row-major array: `cells[row * cols + col]`.
/// Deserialization goes through [`Grid::from_cells`], so a decoded grid
/// always has `cols * rows` cells inside the palette.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "GridData")]
pub struct Grid {
    cols: usize,
    rows: usize,
    cells: Vec<u8>,
}

#[derive(Deserialize)]
struct GridData {
    cols: usize,
    rows: usize,
    cells: Vec<u8>,
}

impl TryFrom<GridData> for Grid {
    type Error = TimelineError;

    fn try_from(data: GridData) -> Result<Self, Self::Error> {
        Grid::from_cells(data.cols, data.rows, data.cells)
    }
}

impl Grid {
    /// Create an all-transparent grid.
    pub fn blank(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows,
            cells: vec![TRANSPARENT; cols * rows],
        }
    }

    /// Wrap an existing row-major cell buffer.
    pub fn from_cells(cols: usize, rows: usize, cells: Vec<u8>) -> Result<Self, TimelineError> {
        let expected = cols.checked_mul(rows).unwrap_or(usize::MAX);
        if cells.len() != expected {
            return Err(TimelineError::DimensionMismatch {
                expected,
                found: cells.len(),
            });
        }
        let grid = Self { cols, rows, cells };
        grid.check_colors()?;
        Ok(grid)
    }

    /// Fails on the first cell outside the 64 color palette.
    pub fn check_colors(&self) -> Result<(), TimelineError> {
        match self.cells.iter().find(|&&c| c as usize >= PALETTE_SIZE) {
            Some(&color) => Err(TimelineError::InvalidColor(color)),
            None => Ok(()),
        }
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    #[inline]
    pub fn cells_mut(&mut self) -> &mut [u8] {
        &mut self.cells
    }

    pub fn into_cells(self) -> Vec<u8> {
        self.cells
    }

    /// Convert (col, row) coordinates to flat index.
    #[inline]
    pub fn idx(&self, col: usize, row: usize) -> usize {
        row * self.cols + col
    }

    /// Get value at (col, row). Coordinates must be in range.
    #[inline]
    pub fn get(&self, col: usize, row: usize) -> u8 {
        self.cells[self.idx(col, row)]
    }

    /// Set value at (col, row). Coordinates must be in range.
    #[inline]
    pub fn set(&mut self, col: usize, row: usize, color: u8) {
        let idx = self.idx(col, row);
        self.cells[idx] = color;
    }

    /// Signed lookup used for offset reads; `None` outside the grid.
    #[inline]
    pub fn get_signed(&self, col: i64, row: i64) -> Option<u8> {
        if col < 0 || row < 0 || col >= self.cols as i64 || row >= self.rows as i64 {
            return None;
        }
        Some(self.get(col as usize, row as usize))
    }

    /// True if any cell carries a non-transparent index.
    pub fn has_ink(&self) -> bool {
        self.cells.iter().any(|&c| c != TRANSPARENT)
    }

    /// Zero every cell inside `rect` (clipped to the grid).
    pub fn clear_rect(&mut self, rect: Rect) {
        let rect = rect.clipped(self.cols, self.rows);
        for row in rect.row1..rect.row2 {
            let start = self.idx(rect.col1, row);
            let end = self.idx(rect.col2, row);
            self.cells[start..end].fill(TRANSPARENT);
        }
    }

    /// Smallest rectangle covering every inked cell.
    pub fn ink_bounds(&self) -> Option<Rect> {
        let mut bounds: Option<Rect> = None;
        for row in 0..self.rows {
            for col in 0..self.cols {
                if self.get(col, row) == TRANSPARENT {
                    continue;
                }
                let b = bounds.get_or_insert(Rect {
                    col1: col,
                    row1: row,
                    col2: col + 1,
                    row2: row + 1,
                });
                b.col1 = b.col1.min(col);
                b.row1 = b.row1.min(row);
                b.col2 = b.col2.max(col + 1);
                b.row2 = b.row2.max(row + 1);
            }
        }
        bounds
    }

    /// Overwrite `self` with every inked cell of `src`, reading `src` at
    /// `(col + dx, row + dy)`. Cells whose source falls outside the grid are
    /// left untouched.
    pub fn stamp(&mut self, src: &Grid, dx: i32, dy: i32) {
        for row in 0..self.rows {
            let src_row = row as i64 + dy as i64;
            if src_row < 0 || src_row >= src.rows as i64 {
                continue;
            }
            for col in 0..self.cols {
                let src_col = col as i64 + dx as i64;
                if src_col < 0 || src_col >= src.cols as i64 {
                    continue;
                }
                let color = src.get(src_col as usize, src_row as usize);
                if color != TRANSPARENT {
                    self.set(col, row, color);
                }
            }
        }
    }
}

/// Half-open rectangle `[col1, col2) × [row1, row2)` in grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub col1: usize,
    pub row1: usize,
    pub col2: usize,
    pub row2: usize,
}

impl Rect {
    /// Build a rectangle from two corners in any order.
    pub fn new(col1: usize, row1: usize, col2: usize, row2: usize) -> Self {
        Self {
            col1: col1.min(col2),
            row1: row1.min(row2),
            col2: col1.max(col2),
            row2: row1.max(row2),
        }
    }

    /// Whole-grid rectangle.
    pub fn full(cols: usize, rows: usize) -> Self {
        Self {
            col1: 0,
            row1: 0,
            col2: cols,
            row2: rows,
        }
    }

    /// Build from signed corners, clamping into `[0, cols] × [0, rows]`.
    pub fn from_signed(col1: i32, row1: i32, col2: i32, row2: i32, cols: usize, rows: usize) -> Self {
        let clamp = |v: i32, max: usize| (v.max(0) as usize).min(max);
        Self::new(
            clamp(col1, cols),
            clamp(row1, rows),
            clamp(col2, cols),
            clamp(row2, rows),
        )
    }

    /// Intersect with the `cols × rows` grid.
    pub fn clipped(self, cols: usize, rows: usize) -> Self {
        let col2 = self.col2.min(cols);
        let row2 = self.row2.min(rows);
        Self {
            col1: self.col1.min(col2),
            row1: self.row1.min(row2),
            col2,
            row2,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.col2 - self.col1
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.row2 - self.row1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Signed containment test; stamping coordinates may be negative.
    #[inline]
    pub fn contains(&self, col: i64, row: i64) -> bool {
        col >= self.col1 as i64
            && row >= self.row1 as i64
            && col < self.col2 as i64
            && row < self.row2 as i64
    }
}

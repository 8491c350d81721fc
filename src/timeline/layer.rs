//! Per-layer keyframe timeline with staged edit transactions.
//!
//! A layer owns a fixed number of frame slots. A slot is either empty, in
//! which case it shows the nearest earlier keyframe, or a keyframe holding a
//! full grid. Edits can be staged in a transaction overlay that is shifted by
//! a translation offset and merged into the keyframes on commit.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::{ChangeSet, Grid, Rect};
use crate::schema::{Dimensions, PALETTE_SIZE, TRANSPARENT};

/// Classification of a frame slot, used by timeline views and the
/// insert-frame guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameStatus {
    /// Inherits, and the grid it would inherit has no ink.
    Empty = 0,
    /// Inherits from a keyframe that has ink.
    Repeat = 1,
    /// Own keyframe without ink.
    BlankKey = 2,
    /// Own keyframe with ink.
    FilledKey = 3,
}

impl FrameStatus {
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn is_keyframe(self) -> bool {
        matches!(self, FrameStatus::BlankKey | FrameStatus::FilledKey)
    }

    /// One-character glyph for text timeline strips.
    pub fn glyph(self) -> char {
        match self {
            FrameStatus::Empty => '.',
            FrameStatus::Repeat => '-',
            FrameStatus::BlankKey => 'o',
            FrameStatus::FilledKey => '#',
        }
    }
}

/// Staged edit state of a layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Transaction {
    #[default]
    None,
    Active {
        /// Overlay slots, same shape as the layer's timeline.
        frames: Vec<Option<Grid>>,
        /// Displacement `(dx, dy)` applied when the overlay is read,
        /// composited or committed. Overlay cell `(c, r)` lands on `(c + dx, r + dy)`.
        offset: (i32, i32),
    },
}

impl Transaction {
    fn blank(frames: usize) -> Self {
        Transaction::Active {
            frames: vec![None; frames],
            offset: (0, 0),
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self, Transaction::Active { .. })
    }
}

/// Serializable snapshot of an active transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionState {
    pub frames: Vec<Option<Grid>>,
    pub offset: (i32, i32),
}

fn default_visible() -> bool {
    true
}

/// Serializable snapshot of a layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerState {
    pub id: String,
    pub name: String,
    pub frames: Vec<Option<Grid>>,
    #[serde(default)]
    pub transaction: Option<TransactionState>,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

/// Timeline and edit errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimelineError {
    #[error("Frame {frame} is outside the {frames} frame timeline")]
    FrameOutOfRange { frame: usize, frames: usize },
    #[error("There is no space in the timeline of the current layer to insert a frame")]
    NoRoomToInsert,
    #[error("Grid has {found} cells, expected {expected}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("Timeline has {found} frame slots, expected {expected}")]
    FrameCountMismatch { expected: usize, found: usize },
    #[error("Palette index {0} is outside the 64 color palette")]
    InvalidColor(u8),
}

/// A single drawing layer.
#[derive(Debug, Clone)]
pub struct Layer {
    id: String,
    name: String,
    dims: Dimensions,
    frames: Vec<Option<Grid>>,
    transaction: Transaction,
    visible: bool,
    changes: ChangeSet,
}

impl Layer {
    /// Create an empty, visible layer.
    pub fn new(dims: Dimensions, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            dims,
            frames: vec![None; dims.frames],
            transaction: Transaction::None,
            visible: true,
            changes: ChangeSet::default(),
        }
    }

    /// Rebuild a layer from a snapshot, validating its shape.
    pub fn from_state(dims: Dimensions, state: LayerState) -> Result<Self, TimelineError> {
        let mut layer = Layer::new(dims, String::new(), String::new());
        layer.set_state(state)?;
        Ok(layer)
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.changes.merge(ChangeSet::ALL);
    }

    #[inline]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visibility(&mut self, visible: bool) {
        self.visible = visible;
        self.changes.timeline = true;
    }

    #[inline]
    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    /// Number of slots holding a committed keyframe.
    pub fn keyframe_count(&self) -> usize {
        self.frames.iter().filter(|f| f.is_some()).count()
    }

    /// Committed frame slots.
    pub fn frames(&self) -> &[Option<Grid>] {
        &self.frames
    }

    /// Drain accumulated change flags.
    pub fn take_changes(&mut self) -> ChangeSet {
        self.changes.take()
    }

    /// Flag a finished, persistable edit made through direct grid access.
    pub fn mark_committed(&mut self) {
        self.changes.merge(ChangeSet::ALL);
    }

    fn check_frame(&self, frame: usize) -> Result<(), TimelineError> {
        if frame >= self.dims.frames {
            warn!(
                "layer {}: frame {} outside {} frame timeline",
                self.id, frame, self.dims.frames
            );
            return Err(TimelineError::FrameOutOfRange {
                frame,
                frames: self.dims.frames,
            });
        }
        Ok(())
    }

    /// Slots edits go to: the overlay while a transaction is active.
    fn slots(&self) -> &[Option<Grid>] {
        match &self.transaction {
            Transaction::Active { frames, .. } => frames,
            Transaction::None => &self.frames,
        }
    }

    fn slots_mut(&mut self) -> &mut Vec<Option<Grid>> {
        match &mut self.transaction {
            Transaction::Active { frames, .. } => frames,
            Transaction::None => &mut self.frames,
        }
    }

    fn blank_grid(&self) -> Grid {
        Grid::blank(self.dims.cols, self.dims.rows)
    }

    /// Index of the nearest committed keyframe at or before `frame`.
    pub fn nearest_keyframe(&self, frame: usize) -> Option<usize> {
        let last = frame.min(self.dims.frames.checked_sub(1)?);
        (0..=last).rev().find(|&f| self.frames[f].is_some())
    }

    /// Committed grid displayed at `frame`, resolved through empty slots.
    pub fn resolved(&self, frame: usize) -> Option<&Grid> {
        self.nearest_keyframe(frame)
            .and_then(|f| self.frames[f].as_ref())
    }

    /// Allocate a committed keyframe at `frame`, cloning the nearest earlier
    /// keyframe or starting blank.
    fn create_committed_keyframe(&mut self, frame: usize) {
        match self.nearest_keyframe(frame) {
            Some(source) => {
                let grid = self.frames[source]
                    .clone()
                    .unwrap_or_else(|| self.blank_grid());
                self.frames[frame] = Some(grid);
                self.changes.timeline = true;
                debug!("layer {}: keyframe {} cloned from {}", self.id, frame, source);
            }
            None => {
                self.frames[frame] = Some(self.blank_grid());
                self.changes.merge(ChangeSet::ALL);
                debug!("layer {}: blank keyframe {}", self.id, frame);
            }
        }
    }

    fn committed_keyframe_mut(&mut self, frame: usize) -> &mut Grid {
        if self.frames[frame].is_none() {
            self.create_committed_keyframe(frame);
        }
        let (cols, rows) = (self.dims.cols, self.dims.rows);
        self.frames[frame].get_or_insert_with(|| Grid::blank(cols, rows))
    }

    /// Keyframe grid edits at `frame` go to, created on demand. Staged slots
    /// start blank; committed slots clone history.
    fn slot_keyframe_mut(&mut self, frame: usize) -> &mut Grid {
        if !self.has_transaction() && self.frames[frame].is_none() {
            self.create_committed_keyframe(frame);
        }
        let (cols, rows) = (self.dims.cols, self.dims.rows);
        self.slots_mut()[frame].get_or_insert_with(|| Grid::blank(cols, rows))
    }

    /// Force-allocate an all-transparent keyframe at `frame`.
    pub fn create_blank_keyframe(&mut self, frame: usize) -> Result<(), TimelineError> {
        self.check_frame(frame)?;
        let staged = self.has_transaction();
        let blank = self.blank_grid();
        self.slots_mut()[frame] = Some(blank);

        if !staged {
            self.changes.merge(ChangeSet::ALL);
            debug!("layer {}: blank keyframe {}", self.id, frame);
        }
        Ok(())
    }

    /// Allocate a keyframe at `frame` if the slot is empty.
    ///
    /// Committed keyframes clone the nearest earlier keyframe. Inside a
    /// transaction the new slot is always blank.
    pub fn create_keyframe(&mut self, frame: usize) -> Result<(), TimelineError> {
        self.check_frame(frame)?;
        if self.slots()[frame].is_some() {
            return Ok(());
        }
        if self.has_transaction() {
            return self.create_blank_keyframe(frame);
        }
        self.create_committed_keyframe(frame);
        Ok(())
    }

    /// Insert an empty slot after `frame`, shifting later slots and dropping
    /// the last one.
    ///
    /// Fails without touching the timeline when the last slot is anything
    /// other than [`FrameStatus::Empty`], since shifting would discard it.
    pub fn insert_frame(&mut self, frame: usize) -> Result<(), TimelineError> {
        self.check_frame(frame)?;
        let last = self.dims.frames - 1;
        if frame == last || self.frames_status().last() != Some(&FrameStatus::Empty) {
            warn!("layer {}: no room to insert frame after {}", self.id, frame);
            return Err(TimelineError::NoRoomToInsert);
        }

        self.frames.insert(frame + 1, None);
        self.frames.pop();

        match &mut self.transaction {
            Transaction::Active { frames, .. } => {
                frames.insert(frame + 1, None);
                frames.pop();
            }
            Transaction::None => {
                self.changes.merge(ChangeSet::ALL);
            }
        }
        debug!("layer {}: inserted frame after {}", self.id, frame);
        Ok(())
    }

    /// Remove `frame`.
    ///
    /// A keyframe is cleared in place, so the slot falls back to repeating
    /// the previous keyframe. An empty slot is deleted and later slots shift
    /// one step earlier.
    pub fn remove_frame(&mut self, frame: usize) -> Result<(), TimelineError> {
        self.check_frame(frame)?;

        if self.frames[frame].is_some() {
            self.frames[frame] = None;
            if let Transaction::Active { frames, .. } = &mut self.transaction {
                frames[frame] = None;
            }
        } else {
            self.frames.remove(frame);
            self.frames.push(None);
            if let Transaction::Active { frames, .. } = &mut self.transaction {
                frames.remove(frame);
                frames.push(None);
            }
        }

        if !self.has_transaction() {
            self.changes.merge(ChangeSet::ALL);
        }
        debug!("layer {}: removed frame {}", self.id, frame);
        Ok(())
    }

    /// Classify every slot.
    pub fn frames_status(&self) -> Vec<FrameStatus> {
        let overlay = match &self.transaction {
            Transaction::Active { frames, .. } => Some(frames),
            Transaction::None => None,
        };
        let mut inherits_ink = false;

        (0..self.dims.frames)
            .map(|f| {
                let staged_ink = overlay
                    .and_then(|o| o[f].as_ref())
                    .is_some_and(Grid::has_ink);

                match &self.frames[f] {
                    Some(grid) if staged_ink || grid.has_ink() => {
                        inherits_ink = true;
                        FrameStatus::FilledKey
                    }
                    Some(_) => {
                        inherits_ink = false;
                        FrameStatus::BlankKey
                    }
                    None if staged_ink => {
                        inherits_ink = true;
                        FrameStatus::FilledKey
                    }
                    None if inherits_ink => FrameStatus::Repeat,
                    None => FrameStatus::Empty,
                }
            })
            .collect()
    }

    #[inline]
    pub fn has_transaction(&self) -> bool {
        self.transaction.is_active()
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Current transaction displacement, `(0, 0)` when none is active.
    pub fn transaction_offset(&self) -> (i32, i32) {
        match &self.transaction {
            Transaction::Active { offset, .. } => *offset,
            Transaction::None => (0, 0),
        }
    }

    /// Open a blank transaction. An already active transaction is committed
    /// first so staged pixels are never lost.
    pub fn start_transaction(&mut self) {
        if self.has_transaction() {
            debug!("layer {}: committing previous transaction", self.id);
            self.commit_transaction();
        }
        self.transaction = Transaction::blank(self.dims.frames);
        debug!("layer {}: transaction started", self.id);
    }

    /// Lift the pixels inside `selection` out of the keyframe at `frame` into
    /// a new transaction overlay, clearing them in the keyframe.
    pub fn start_transaction_from_selection(
        &mut self,
        frame: usize,
        selection: Rect,
    ) -> Result<(), TimelineError> {
        self.check_frame(frame)?;
        if self.has_transaction() {
            self.commit_transaction();
        }

        let rect = selection.clipped(self.dims.cols, self.dims.rows);
        let mut lifted = self.blank_grid();
        let source = self.committed_keyframe_mut(frame);
        for row in rect.row1..rect.row2 {
            for col in rect.col1..rect.col2 {
                lifted.set(col, row, source.get(col, row));
                source.set(col, row, TRANSPARENT);
            }
        }

        let mut transaction = Transaction::blank(self.dims.frames);
        if let Transaction::Active { frames, .. } = &mut transaction {
            frames[frame] = Some(lifted);
        }
        self.transaction = transaction;
        debug!(
            "layer {}: transaction from selection {:?} at frame {}",
            self.id, rect, frame
        );
        Ok(())
    }

    /// Open a transaction whose overlay at `frame` is seeded from `buffer`.
    pub fn start_transaction_from_buffer(
        &mut self,
        frame: usize,
        buffer: &Grid,
    ) -> Result<(), TimelineError> {
        self.check_frame(frame)?;
        self.check_grid(buffer)?;
        if self.has_transaction() {
            self.commit_transaction();
        }

        let mut transaction = Transaction::blank(self.dims.frames);
        if let Transaction::Active { frames, .. } = &mut transaction {
            frames[frame] = Some(buffer.clone());
        }
        self.transaction = transaction;
        debug!("layer {}: transaction from buffer at frame {}", self.id, frame);
        Ok(())
    }

    /// Set the preview displacement of the active transaction. Pixel data is
    /// untouched until commit.
    pub fn translate_transaction(&mut self, dx: i32, dy: i32) {
        match &mut self.transaction {
            Transaction::Active { offset, .. } => *offset = (dx, dy),
            Transaction::None => debug!("layer {}: translate without transaction", self.id),
        }
    }

    /// Merge the overlay into the committed keyframes and close the
    /// transaction. Transparent overlay cells never overwrite.
    pub fn commit_transaction(&mut self) {
        let Transaction::Active { frames, offset } = std::mem::take(&mut self.transaction) else {
            return;
        };

        let mut touched = 0;
        for (frame, slot) in frames.into_iter().enumerate() {
            let Some(staged) = slot else {
                continue;
            };
            let dst = self.committed_keyframe_mut(frame);
            dst.stamp(&staged, -offset.0, -offset.1);
            touched += 1;
        }

        self.changes.merge(ChangeSet::ALL);
        debug!(
            "layer {}: transaction committed ({} frames, offset {:?})",
            self.id, touched, offset
        );
    }

    /// Stamp a square brush of side `2 * brush_size - 1` centered on
    /// `(col, row)`.
    ///
    /// Coordinates are shifted into overlay space while a transaction is
    /// active. Cells outside the grid or outside `selection` are skipped.
    /// Returns `false` without painting when the frame or color is invalid or
    /// the brush origin falls outside the grid.
    pub fn put_pixel(
        &mut self,
        frame: usize,
        color: u8,
        col: i32,
        row: i32,
        brush_size: u32,
        selection: Option<Rect>,
    ) -> bool {
        if frame >= self.dims.frames || color as usize >= PALETTE_SIZE {
            return false;
        }

        let (dx, dy) = self.transaction_offset();
        let col = col as i64 - dx as i64;
        let row = row as i64 - dy as i64;
        let (cols, rows) = (self.dims.cols as i64, self.dims.rows as i64);
        if col < 0 || row < 0 || col >= cols || row >= rows {
            return false;
        }

        let radius = brush_size.max(1) as i64 - 1;
        let grid = self.slot_keyframe_mut(frame);
        for r in (row - radius).max(0)..=(row + radius).min(rows - 1) {
            for c in (col - radius).max(0)..=(col + radius).min(cols - 1) {
                if selection.is_some_and(|sel| !sel.contains(c, r)) {
                    continue;
                }
                grid.set(c as usize, r as usize, color);
            }
        }
        true
    }

    /// Zero a rectangle (corners in any order, clamped to the grid). No-op if
    /// the slot has no keyframe.
    pub fn clear_rect(&mut self, frame: usize, col1: i32, row1: i32, col2: i32, row2: i32) {
        if frame >= self.dims.frames {
            return;
        }
        let rect = Rect::from_signed(col1, row1, col2, row2, self.dims.cols, self.dims.rows);
        if let Some(grid) = self.slots_mut()[frame].as_mut() {
            grid.clear_rect(rect);
        }
    }

    /// Displayed palette index at `(col, row)`: staged ink first, then the
    /// nearest committed keyframe, else transparent.
    pub fn get_pixel(&self, frame: usize, col: i32, row: i32) -> u8 {
        if frame >= self.dims.frames {
            return TRANSPARENT;
        }

        if let Transaction::Active { frames, offset } = &self.transaction {
            let staged = frames[frame].as_ref().and_then(|grid| {
                grid.get_signed(col as i64 - offset.0 as i64, row as i64 - offset.1 as i64)
            });
            if let Some(color) = staged.filter(|&c| c != TRANSPARENT) {
                return color;
            }
        }

        self.resolved(frame)
            .and_then(|grid| grid.get_signed(col as i64, row as i64))
            .unwrap_or(TRANSPARENT)
    }

    /// Keyframe grid at `frame` without resolving empty slots.
    pub fn pixels(&self, frame: usize) -> Option<&Grid> {
        self.slots().get(frame).and_then(Option::as_ref)
    }

    /// Keyframe grid at `frame`, created on demand (clone-on-write).
    pub fn keyframe_mut(&mut self, frame: usize) -> Result<&mut Grid, TimelineError> {
        self.check_frame(frame)?;
        Ok(self.slot_keyframe_mut(frame))
    }

    /// Replace the keyframe at `frame`.
    pub fn set_pixels(&mut self, frame: usize, grid: Grid) -> Result<(), TimelineError> {
        self.check_frame(frame)?;
        self.check_grid(&grid)?;
        let staged = self.has_transaction();
        self.slots_mut()[frame] = Some(grid);
        if !staged {
            self.changes.timeline = true;
        }
        Ok(())
    }

    fn check_grid(&self, grid: &Grid) -> Result<(), TimelineError> {
        if grid.cols() != self.dims.cols
            || grid.rows() != self.dims.rows
            || grid.cells().len() != self.dims.cell_count()
        {
            return Err(TimelineError::DimensionMismatch {
                expected: self.dims.cell_count(),
                found: grid.cells().len(),
            });
        }
        grid.check_colors()
    }

    /// Flatten `other` onto this layer frame by frame. Inked cells of
    /// `other` overwrite; its transparent cells never do.
    pub fn merge_layer(&mut self, other: &Layer) {
        self.commit_transaction();

        for f in 0..self.dims.frames {
            if other.frames[f].is_some() && self.frames[f].is_none() {
                self.create_committed_keyframe(f);
            }
        }

        for f in 0..self.dims.frames {
            if other.frames[f].is_none() && self.frames[f].is_none() {
                continue;
            }
            let Some(src) = other.resolved(f) else {
                continue;
            };
            if let Some(dst) = self.frames[f].as_mut() {
                dst.stamp(src, 0, 0);
            }
        }

        self.changes.timeline = true;
        debug!("layer {}: merged layer {}", self.id, other.id);
    }

    /// Paint this layer's contribution at `frame` over `dst`: the nearest
    /// keyframe, then the displaced transaction overlay.
    pub fn merge_into(&self, dst: &mut Grid, frame: usize) {
        if let Some(grid) = self.resolved(frame) {
            dst.stamp(grid, 0, 0);
        }
        if let Transaction::Active { frames, offset } = &self.transaction {
            if let Some(staged) = frames.get(frame).and_then(Option::as_ref) {
                dst.stamp(staged, -offset.0, -offset.1);
            }
        }
    }

    /// Copy of the committed timeline under a new identity.
    pub fn duplicate(&self, id: impl Into<String>, name: impl Into<String>) -> Layer {
        Layer {
            id: id.into(),
            name: name.into(),
            dims: self.dims,
            frames: self.frames.clone(),
            transaction: Transaction::None,
            visible: true,
            changes: ChangeSet::default(),
        }
    }

    /// Snapshot of the layer including any active transaction.
    pub fn get_state(&self) -> LayerState {
        let transaction = match &self.transaction {
            Transaction::Active { frames, offset } => Some(TransactionState {
                frames: frames.clone(),
                offset: *offset,
            }),
            Transaction::None => None,
        };
        LayerState {
            id: self.id.clone(),
            name: self.name.clone(),
            frames: self.frames.clone(),
            transaction,
            visible: self.visible,
        }
    }

    /// Restore from a snapshot. The layer is unchanged if the snapshot does
    /// not match this layer's dimensions.
    pub fn set_state(&mut self, state: LayerState) -> Result<(), TimelineError> {
        self.check_slots(&state.frames)?;
        if let Some(transaction) = &state.transaction {
            self.check_slots(&transaction.frames)?;
        }

        self.id = state.id;
        self.name = state.name;
        self.frames = state.frames;
        self.transaction = match state.transaction {
            Some(TransactionState { frames, offset }) => Transaction::Active { frames, offset },
            None => Transaction::None,
        };
        self.visible = state.visible;
        self.changes.timeline = true;
        Ok(())
    }

    fn check_slots(&self, slots: &[Option<Grid>]) -> Result<(), TimelineError> {
        if slots.len() != self.dims.frames {
            return Err(TimelineError::FrameCountMismatch {
                expected: self.dims.frames,
                found: slots.len(),
            });
        }
        slots
            .iter()
            .flatten()
            .try_for_each(|grid| self.check_grid(grid))
    }
}

//! Bounded undo/redo history of stack snapshots.

use std::collections::VecDeque;

use log::debug;

use crate::timeline::StackState;

/// Linear history with a cursor on the snapshot currently shown.
///
/// Saving after an undo drops the redo tail. A save identical to the
/// snapshot under the cursor is skipped, except for the first save after an
/// undo or redo.
#[derive(Debug, Clone)]
pub struct History {
    records: VecDeque<StackState>,
    cursor: usize,
    limit: usize,
    force_next: bool,
}

impl History {
    /// `limit` is clamped to at least one snapshot.
    pub fn new(limit: usize) -> Self {
        Self {
            records: VecDeque::new(),
            cursor: 0,
            limit: limit.max(1),
            force_next: false,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.records.len()
    }

    /// Snapshot under the cursor.
    pub fn current(&self) -> Option<&StackState> {
        self.records.get(self.cursor)
    }

    /// Record `state`. Returns `false` if it was skipped as a duplicate.
    pub fn save(&mut self, state: StackState) -> bool {
        if !self.force_next && self.current() == Some(&state) {
            debug!("history: skip unchanged snapshot");
            return false;
        }
        self.force_next = false;

        if !self.records.is_empty() {
            self.records.truncate(self.cursor + 1);
        }
        self.records.push_back(state);
        if self.records.len() > self.limit {
            self.records.pop_front();
        }
        self.cursor = self.records.len() - 1;
        debug!("history: {} of {} snapshots", self.cursor + 1, self.records.len());
        true
    }

    /// Step back, returning the snapshot to restore.
    pub fn undo(&mut self) -> Option<&StackState> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.force_next = true;
        self.records.get(self.cursor)
    }

    /// Step forward, returning the snapshot to restore.
    pub fn redo(&mut self) -> Option<&StackState> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.force_next = true;
        self.records.get(self.cursor)
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.cursor = 0;
        self.force_next = false;
    }
}

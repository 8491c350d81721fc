//! Polled change notification for layers and stacks.

use serde::Serialize;

/// What changed since the last drain.
///
/// `timeline` means frame structure or pixels changed and views should
/// redraw. `commit` means a persistable edit finished and history/autosave
/// should take a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub timeline: bool,
    pub commit: bool,
}

impl ChangeSet {
    /// Both flags raised.
    pub const ALL: ChangeSet = ChangeSet {
        timeline: true,
        commit: true,
    };

    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.timeline && !self.commit
    }

    #[inline]
    pub fn merge(&mut self, other: ChangeSet) {
        self.timeline |= other.timeline;
        self.commit |= other.commit;
    }

    /// Return the accumulated set and reset to empty.
    #[inline]
    pub fn take(&mut self) -> ChangeSet {
        std::mem::take(self)
    }
}

//! Layer identity generators.
//!
//! Layer ids are opaque strings that survive save/load. They are produced by
//! a generator owned by the [`LayerStack`](super::LayerStack) so tests can
//! inject deterministic ids.

/// Source of fresh layer identifiers.
pub trait IdGenerator: Send {
    fn next_id(&mut self) -> String;
}

/// Monotonic counter ids: `"1"`, `"2"`, ...
#[derive(Debug, Clone, Default)]
pub struct SequentialIds {
    next: u64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue numbering after `last`.
    pub fn starting_after(last: u64) -> Self {
        Self { next: last }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&mut self) -> String {
        self.next += 1;
        self.next.to_string()
    }
}

/// Random ids with a sequence suffix, unique across sessions.
///
/// Format: `<16 hex digits>.<seq>`, well under the 255 byte codec limit.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone, Default)]
pub struct RandomIds {
    seq: u64,
}

#[cfg(not(target_arch = "wasm32"))]
impl RandomIds {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl IdGenerator for RandomIds {
    fn next_id(&mut self) -> String {
        self.seq += 1;
        format!("{:016x}.{}", rand::random::<u64>(), self.seq)
    }
}

//! Binary format definitions for packed sprite animation files.
//!
//! All multi-byte integers are big-endian.

use std::io;

/// Magic bytes at the start of every packed file.
pub const SIGNATURE: &[u8; 7] = b"f796img";

/// Longest id or name a layer chunk can carry.
pub const MAX_SHORT_STRING: usize = u8::MAX as usize;

/// Largest encoded keyframe payload; the length field is a `u16`.
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

/// Layer count is a single byte in the canvas chunk.
pub const MAX_PACKED_LAYERS: usize = u8::MAX as usize;

/// Chunk type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkTag {
    /// Signature trailer, followed by a one-byte layer count.
    Canvas = 1,
    /// Id string, name string, frames array.
    Layer = 2,
    /// Exactly one frame chunk per timeline slot.
    FramesArray = 3,
    /// `u16` payload length then run-length pixels; length 0 is an empty slot.
    Frame = 4,
}

impl ChunkTag {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(ChunkTag::Canvas),
            2 => Some(ChunkTag::Layer),
            3 => Some(ChunkTag::FramesArray),
            4 => Some(ChunkTag::Frame),
            _ => None,
        }
    }
}

/// Errors raised while packing or unpacking.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Wrong file signature")]
    InvalidSignature,
    #[error("Expected {expected:?} chunk at byte {offset}, found tag {found}")]
    UnexpectedChunk {
        expected: ChunkTag,
        found: u8,
        offset: usize,
    },
    #[error("Truncated buffer: need {needed} bytes at byte {offset}, {available} available")]
    Truncated {
        needed: usize,
        available: usize,
        offset: usize,
    },
    #[error("Invalid unpacked pixels count: {found}, expected {expected}")]
    InvalidPixelCount { expected: usize, found: usize },
    #[error("Layer has {found} frame slots, expected {expected}")]
    FrameCountMismatch { expected: usize, found: usize },
    #[error("String of {len} bytes exceeds the 255 byte limit")]
    StringTooLong { len: usize },
    #[error("{count} layers exceed the 255 layer limit")]
    TooManyLayers { count: usize },
    #[error("Frame {frame} encodes to {len} bytes, more than 65535")]
    FrameTooLarge { frame: usize, len: usize },
    #[error("Frame {frame} holds palette index {color}, outside the 64 color palette")]
    InvalidColor { frame: usize, color: u8 },
    #[error("{count} unexpected bytes after the last layer")]
    TrailingBytes { count: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

//! Binary persistence for layer stacks.
//!
//! A packed file is a signature followed by nested, tagged chunks: one
//! canvas chunk, one chunk per layer, and inside each layer one chunk per
//! frame slot. Keyframe pixels are run-length coded with an extra mode that
//! copies runs from the layer's first frame, which is what makes animation
//! frames cheap to store.
//!
//! ```text
//! "f796img" CANVAS n
//!   LAYER id name FRAMES_ARRAY
//!     FRAME len payload
//!     ...
//! ```

mod codec;
mod cursor;
mod format;
mod rle;

pub use codec::{Codec, PackStats};
pub use cursor::ByteCursor;
pub use format::{
    ChunkTag, CodecError, MAX_FRAME_PAYLOAD, MAX_PACKED_LAYERS, MAX_SHORT_STRING, SIGNATURE,
};
pub use rle::{MAX_COLOR_RUN, MAX_FIRST_FRAME_RUN, decode_pixels, encode_pixels};

//! Packing and unpacking of whole layer stacks.
//!
//! ```text
//! SIGNATURE "f796img"
//! CANVAS   u8 tag, u8 layer count
//! LAYER    u8 tag, u8 len + id, u8 len + name, FRAMES_ARRAY
//! FRAMES_ARRAY  u8 tag, then exactly `frames` FRAME chunks
//! FRAME    u8 tag, u16 payload length (0 = empty slot), payload
//! ```
//!
//! Cursor positions, visibility and transactions are not stored. An
//! unpacked state has both cursors at 0, every layer visible and no
//! transaction.

use std::io::{Read, Write};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::{
    ByteCursor, ChunkTag, CodecError, MAX_FRAME_PAYLOAD, MAX_PACKED_LAYERS, MAX_SHORT_STRING,
    SIGNATURE, decode_pixels, encode_pixels,
};
use crate::schema::Dimensions;
use crate::timeline::{Grid, LayerStack, LayerState, StackState, TimelineError};

/// Summary of a packed document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackStats {
    pub layers: usize,
    pub keyframes: usize,
    pub bytes: usize,
}

impl PackStats {
    pub fn of(state: &StackState, bytes: usize) -> Self {
        Self {
            layers: state.layers.len(),
            keyframes: state
                .layers
                .iter()
                .map(|l| l.frames.iter().filter(|f| f.is_some()).count())
                .sum(),
            bytes,
        }
    }
}

/// Binary codec for one document shape.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    dims: Dimensions,
}

impl Codec {
    pub fn new(dims: Dimensions) -> Self {
        Self { dims }
    }

    #[inline]
    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    /// Pack every layer of `stack`, committing pending transactions first.
    pub fn pack(&self, stack: &mut LayerStack) -> Result<Vec<u8>, CodecError> {
        let state = stack.get_state();
        self.pack_state(&state)
    }

    /// Pack the stack flattened into a single layer, top of the stack
    /// painted last.
    pub fn pack_flattened(&self, stack: &mut LayerStack) -> Result<Vec<u8>, CodecError> {
        let flat = stack.flatten().get_state();
        self.pack_layers(std::slice::from_ref(&flat))
    }

    pub fn pack_state(&self, state: &StackState) -> Result<Vec<u8>, CodecError> {
        self.pack_layers(&state.layers)
    }

    fn pack_layers(&self, layers: &[LayerState]) -> Result<Vec<u8>, CodecError> {
        if layers.len() > MAX_PACKED_LAYERS {
            return Err(CodecError::TooManyLayers {
                count: layers.len(),
            });
        }

        let mut out = Vec::with_capacity(SIGNATURE.len() + 2);
        out.extend_from_slice(SIGNATURE);
        out.push(ChunkTag::Canvas as u8);
        out.push(layers.len() as u8);

        for layer in layers {
            self.pack_layer(&mut out, layer)?;
        }

        info!("packed {} layers into {} bytes", layers.len(), out.len());
        Ok(out)
    }

    fn pack_layer(&self, out: &mut Vec<u8>, layer: &LayerState) -> Result<(), CodecError> {
        if layer.frames.len() != self.dims.frames {
            return Err(CodecError::FrameCountMismatch {
                expected: self.dims.frames,
                found: layer.frames.len(),
            });
        }

        out.push(ChunkTag::Layer as u8);
        pack_string(out, &layer.id)?;
        pack_string(out, &layer.name)?;
        out.push(ChunkTag::FramesArray as u8);

        let blank;
        let first = match layer.frames.first().and_then(Option::as_ref) {
            Some(grid) => grid.cells(),
            None => {
                blank = vec![0u8; self.dims.cell_count()];
                &blank[..]
            }
        };

        for (frame, slot) in layer.frames.iter().enumerate() {
            out.push(ChunkTag::Frame as u8);
            let Some(grid) = slot else {
                out.extend_from_slice(&[0, 0]);
                continue;
            };
            if grid.cells().len() != self.dims.cell_count() {
                return Err(CodecError::InvalidPixelCount {
                    expected: self.dims.cell_count(),
                    found: grid.cells().len(),
                });
            }
            if let Err(TimelineError::InvalidColor(color)) = grid.check_colors() {
                return Err(CodecError::InvalidColor { frame, color });
            }

            let payload = encode_pixels(frame, grid.cells(), first);
            if payload.len() > MAX_FRAME_PAYLOAD {
                return Err(CodecError::FrameTooLarge {
                    frame,
                    len: payload.len(),
                });
            }
            out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
            out.extend_from_slice(&payload);
        }

        debug!(
            "packed layer {} ({} keyframes)",
            layer.id,
            layer.frames.iter().filter(|f| f.is_some()).count()
        );
        Ok(())
    }

    /// Rebuild a stack snapshot. Nothing outside the returned value is
    /// touched, so a failed unpack leaves the caller's document intact.
    pub fn unpack(&self, bytes: &[u8]) -> Result<StackState, CodecError> {
        let mut cursor = ByteCursor::new(bytes);

        if cursor.read_bytes(SIGNATURE.len())? != SIGNATURE {
            return Err(CodecError::InvalidSignature);
        }
        expect_tag(&mut cursor, ChunkTag::Canvas)?;

        let count = cursor.read_u8()? as usize;
        let layers = (0..count)
            .map(|_| self.unpack_layer(&mut cursor))
            .collect::<Result<Vec<_>, _>>()?;

        if !cursor.is_empty() {
            return Err(CodecError::TrailingBytes {
                count: cursor.remaining(),
            });
        }

        info!("unpacked {} layers from {} bytes", layers.len(), bytes.len());
        Ok(StackState {
            current_frame: 0,
            current_layer: 0,
            layers,
        })
    }

    fn unpack_layer(&self, cursor: &mut ByteCursor<'_>) -> Result<LayerState, CodecError> {
        expect_tag(cursor, ChunkTag::Layer)?;
        let id = cursor.read_short_string()?;
        let name = cursor.read_short_string()?;
        expect_tag(cursor, ChunkTag::FramesArray)?;

        let cells = self.dims.cell_count();
        let mut frames: Vec<Option<Grid>> = Vec::with_capacity(self.dims.frames);
        for _ in 0..self.dims.frames {
            expect_tag(cursor, ChunkTag::Frame)?;
            let len = cursor.read_u16()? as usize;
            if len == 0 {
                frames.push(None);
                continue;
            }

            let payload = cursor.read_bytes(len)?;
            let first = frames.first().and_then(Option::as_ref).map(Grid::cells);
            let pixels = decode_pixels(payload, cells, first)?;
            let grid = Grid::from_cells(self.dims.cols, self.dims.rows, pixels).map_err(|_| {
                CodecError::InvalidPixelCount {
                    expected: cells,
                    found: len,
                }
            })?;
            frames.push(Some(grid));
        }

        Ok(LayerState {
            id,
            name,
            frames,
            transaction: None,
            visible: true,
        })
    }

    /// Pack `state` into `w`.
    pub fn write_to<W: Write>(&self, state: &StackState, w: &mut W) -> Result<usize, CodecError> {
        let bytes = self.pack_state(state)?;
        w.write_all(&bytes)?;
        Ok(bytes.len())
    }

    /// Read `r` to the end and unpack it.
    pub fn read_from<R: Read>(&self, r: &mut R) -> Result<StackState, CodecError> {
        let mut bytes = Vec::new();
        r.read_to_end(&mut bytes)?;
        self.unpack(&bytes)
    }
}

fn pack_string(out: &mut Vec<u8>, s: &str) -> Result<(), CodecError> {
    let bytes = s.as_bytes();
    if bytes.len() > MAX_SHORT_STRING {
        return Err(CodecError::StringTooLong { len: bytes.len() });
    }
    out.push(bytes.len() as u8);
    out.extend_from_slice(bytes);
    Ok(())
}

fn expect_tag(cursor: &mut ByteCursor<'_>, expected: ChunkTag) -> Result<(), CodecError> {
    let offset = cursor.position();
    let found = cursor.read_u8()?;
    if found != expected as u8 {
        return Err(CodecError::UnexpectedChunk {
            expected,
            found,
            offset,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CanvasConfig;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn config() -> CanvasConfig {
        CanvasConfig {
            cols: 4,
            rows: 4,
            frames: 3,
            ..Default::default()
        }
    }

    fn codec() -> Codec {
        Codec::new(config().dimensions())
    }

    fn header(layers: u8) -> Vec<u8> {
        let mut bytes = SIGNATURE.to_vec();
        bytes.extend_from_slice(&[ChunkTag::Canvas as u8, layers]);
        bytes
    }

    #[test]
    fn test_single_keyframe_layout() {
        let mut stack = LayerStack::new(&config());
        stack.current_layer_mut().put_pixel(0, 3, 0, 0, 1, None);

        let bytes = codec().pack(&mut stack).unwrap();
        let mut expected = header(1);
        expected.extend_from_slice(&[2, 1, b'1', 1, b'1', 3]);
        expected.extend_from_slice(&[4, 0, 4, 0x03, 0x40, 14, 0x00]);
        expected.extend_from_slice(&[4, 0, 0, 4, 0, 0]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_round_trip_resets_cursors_and_transactions() {
        let mut stack = LayerStack::new(&config());
        stack.current_layer_mut().put_pixel(1, 9, 2, 2, 2, None);
        stack.insert_layer(0).unwrap();
        stack.current_layer_mut().put_pixel(0, 5, 0, 0, 1, None);
        stack.current_layer_mut().put_pixel(2, 6, 3, 3, 1, None);
        stack.set_visibility(1, false).unwrap();
        stack.set_current_frame(2);

        let state = stack.get_state();
        let unpacked = codec().unpack(&codec().pack_state(&state).unwrap()).unwrap();

        assert_eq!(unpacked.current_frame, 0);
        assert_eq!(unpacked.current_layer, 0);
        assert_eq!(unpacked.layers.len(), 2);
        for (a, b) in unpacked.layers.iter().zip(&state.layers) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.name, b.name);
            assert_eq!(a.frames, b.frames);
            assert!(a.visible);
            assert!(a.transaction.is_none());
        }
    }

    #[test]
    fn test_pack_commits_pending_transaction() {
        let mut stack = LayerStack::new(&config());
        let layer = stack.current_layer_mut();
        layer.start_transaction();
        layer.put_pixel(0, 2, 1, 1, 1, None);

        let state = codec().unpack(&codec().pack(&mut stack).unwrap()).unwrap();
        let grid = state.layers[0].frames[0].as_ref().unwrap();
        assert_eq!(grid.get(1, 1), 2);
    }

    #[test]
    fn test_pack_flattened_writes_one_layer() {
        let mut stack = LayerStack::new(&config());
        stack.current_layer_mut().put_pixel(0, 7, 0, 0, 1, None);
        stack.insert_layer(0).unwrap();
        stack.current_layer_mut().put_pixel(0, 5, 0, 0, 1, None);
        stack.current_layer_mut().put_pixel(0, 5, 1, 0, 1, None);

        let bytes = codec().pack_flattened(&mut stack).unwrap();
        assert_eq!(bytes[SIGNATURE.len() + 1], 1);

        let state = codec().unpack(&bytes).unwrap();
        let grid = state.layers[0].frames[0].as_ref().unwrap();
        assert_eq!(grid.get(0, 0), 5);
        assert_eq!(grid.get(1, 0), 5);
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn test_unpack_rejects_bad_signature() {
        let mut bytes = header(0);
        bytes[0] = b'F';
        assert!(matches!(
            codec().unpack(&bytes),
            Err(CodecError::InvalidSignature)
        ));
        assert!(matches!(
            codec().unpack(b"f79"),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn test_unpack_rejects_unexpected_chunks() {
        let mut bytes = SIGNATURE.to_vec();
        bytes.extend_from_slice(&[ChunkTag::Layer as u8, 0]);
        assert!(matches!(
            codec().unpack(&bytes),
            Err(CodecError::UnexpectedChunk {
                expected: ChunkTag::Canvas,
                found: 2,
                offset: 7
            })
        ));

        let mut bytes = header(1);
        bytes.extend_from_slice(&[2, 0, 0, 3, 4, 0, 0, 3, 0, 0]);
        assert!(matches!(
            codec().unpack(&bytes),
            Err(CodecError::UnexpectedChunk {
                expected: ChunkTag::Frame,
                found: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_unpack_rejects_truncated_and_trailing() {
        let mut stack = LayerStack::new(&config());
        stack.current_layer_mut().put_pixel(0, 1, 0, 0, 1, None);
        let bytes = codec().pack(&mut stack).unwrap();

        for cut in [bytes.len() - 1, bytes.len() - 4, 12] {
            assert!(matches!(
                codec().unpack(&bytes[..cut]),
                Err(CodecError::Truncated { .. })
            ));
        }

        let mut extra = bytes.clone();
        extra.push(0);
        assert!(matches!(
            codec().unpack(&extra),
            Err(CodecError::TrailingBytes { count: 1 })
        ));
    }

    #[test]
    fn test_unpack_rejects_wrong_pixel_count() {
        let mut bytes = header(1);
        bytes.extend_from_slice(&[2, 0, 0, 3]);
        bytes.extend_from_slice(&[4, 0, 2, 0x40, 15]);
        bytes.extend_from_slice(&[4, 0, 0, 4, 0, 0]);
        assert!(matches!(
            codec().unpack(&bytes),
            Err(CodecError::InvalidPixelCount {
                expected: 16,
                found: 15
            })
        ));
    }

    #[test]
    fn test_pack_rejects_oversized_inputs() {
        let mut state = LayerStack::new(&config()).get_state();
        state.layers[0].id = "x".repeat(256);
        assert!(matches!(
            codec().pack_state(&state),
            Err(CodecError::StringTooLong { len: 256 })
        ));

        let mut state = LayerStack::new(&config()).get_state();
        state.layers[0].frames.pop();
        assert!(matches!(
            codec().pack_state(&state),
            Err(CodecError::FrameCountMismatch {
                expected: 3,
                found: 2
            })
        ));

        let mut state = LayerStack::new(&config()).get_state();
        let layer = state.layers[0].clone();
        state.layers = vec![layer; 256];
        assert!(matches!(
            codec().pack_state(&state),
            Err(CodecError::TooManyLayers { count: 256 })
        ));
    }

    #[test]
    fn test_frame_too_large() {
        let dims = Dimensions {
            cols: 256,
            rows: 257,
            frames: 1,
        };
        // Alternating colors never form runs: one byte per pixel
        let cells = (0..dims.cell_count()).map(|i| (i % 2) as u8 + 1).collect();
        let state = StackState {
            current_frame: 0,
            current_layer: 0,
            layers: vec![LayerState {
                id: "1".into(),
                name: "1".into(),
                frames: vec![Some(Grid::from_cells(256, 257, cells).unwrap())],
                transaction: None,
                visible: true,
            }],
        };
        assert!(matches!(
            Codec::new(dims).pack_state(&state),
            Err(CodecError::FrameTooLarge { frame: 0, len: 65792 })
        ));
    }

    #[test]
    fn test_pack_rejects_colors_outside_palette() {
        let mut stack = LayerStack::new(&config());
        stack.current_layer_mut().put_pixel(0, 3, 0, 0, 1, None);
        if let Ok(grid) = stack.current_layer_mut().keyframe_mut(1) {
            grid.set(1, 1, 65);
        }
        assert!(matches!(
            codec().pack(&mut stack),
            Err(CodecError::InvalidColor { frame: 1, color: 65 })
        ));
    }

    #[test]
    fn test_non_utf8_names_read_as_latin1() {
        let mut bytes = header(1);
        bytes.extend_from_slice(&[2, 1, b'7', 2, 0xE9, b't', 3]);
        bytes.extend_from_slice(&[4, 0, 0, 4, 0, 0, 4, 0, 0]);
        let state = codec().unpack(&bytes).unwrap();
        assert_eq!(state.layers[0].name, "ét");
        assert_eq!(state.layers[0].frames, vec![None, None, None]);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sprite.f796");

        let mut stack = LayerStack::new(&config());
        stack.current_layer_mut().put_pixel(0, 12, 2, 1, 2, None);
        stack.rename(0, "Ink").unwrap();
        let state = stack.get_state();

        let mut file = std::fs::File::create(&path).unwrap();
        let written = codec().write_to(&state, &mut file).unwrap();
        drop(file);
        assert_eq!(std::fs::metadata(&path).unwrap().len() as usize, written);

        let mut file = std::fs::File::open(&path).unwrap();
        let loaded = codec().read_from(&mut file).unwrap();
        assert_eq!(loaded.layers[0].name, "Ink");
        assert_eq!(loaded.layers[0].frames, state.layers[0].frames);
    }

    #[test]
    fn test_pack_stats() {
        let mut stack = LayerStack::new(&config());
        stack.current_layer_mut().put_pixel(0, 1, 0, 0, 1, None);
        stack.current_layer_mut().put_pixel(2, 1, 1, 0, 1, None);
        let state = stack.get_state();
        let bytes = codec().pack_state(&state).unwrap();

        let stats = PackStats::of(&state, bytes.len());
        assert_eq!(stats.layers, 1);
        assert_eq!(stats.keyframes, 2);
        assert_eq!(stats.bytes, bytes.len());
    }

    fn arb_slot(cells: usize) -> impl Strategy<Value = Option<Vec<u8>>> {
        prop_oneof![
            1 => Just(None),
            1 => prop::collection::vec(0u8..64, cells).prop_map(Some),
            1 => prop::collection::vec(prop_oneof![4 => Just(0u8), 1 => 1u8..64], cells).prop_map(Some),
        ]
    }

    fn arb_state() -> impl Strategy<Value = (Dimensions, StackState)> {
        (1usize..8, 1usize..8, 1usize..5).prop_flat_map(|(cols, rows, frames)| {
            let dims = Dimensions { cols, rows, frames };
            let layer = prop::collection::vec(arb_slot(cols * rows), frames);
            prop::collection::vec(layer, 1..4).prop_map(move |layers| {
                let layers = layers
                    .into_iter()
                    .enumerate()
                    .map(|(i, slots)| LayerState {
                        id: format!("id{i}"),
                        name: (i + 1).to_string(),
                        frames: slots
                            .into_iter()
                            .map(|s| s.map(|c| Grid::from_cells(cols, rows, c).unwrap()))
                            .collect(),
                        transaction: None,
                        visible: true,
                    })
                    .collect();
                (
                    dims,
                    StackState {
                        current_frame: 0,
                        current_layer: 0,
                        layers,
                    },
                )
            })
        })
    }

    proptest! {
        #[test]
        fn packed_states_round_trip((dims, state) in arb_state()) {
            let codec = Codec::new(dims);
            let bytes = codec.pack_state(&state).unwrap();
            let unpacked = codec.unpack(&bytes).unwrap();
            prop_assert_eq!(unpacked, state);
        }

        #[test]
        fn frames_resembling_frame_zero_round_trip(
            base in prop::collection::vec(0u8..4, 64),
            edits in prop::collection::vec((0usize..64, 0u8..64), 0..8),
        ) {
            let mut next = base.clone();
            for (i, color) in edits {
                next[i] = color;
            }
            let encoded = encode_pixels(1, &next, &base);
            let decoded = decode_pixels(&encoded, 64, Some(&base)).unwrap();
            prop_assert_eq!(decoded, next);
        }
    }
}

//! Run-length coding of keyframe pixels.
//!
//! Pixels are traversed row-major. The top two bits of each tag byte pick
//! the mode, the low six bits carry a palette index or the high part of a
//! length:
//!
//! ```text
//! 00cccccc                      literal pixel
//! 01cccccc nnnnnnnn             run of 1..=255 pixels of color c
//! 10cccccc nnnnnnnn nnnnnnnn    run of 1..=65535 pixels of color c
//! 11nnnnnn nnnnnnnn             run of 1..=16383 pixels copied from frame 0
//! ```
//!
//! Mode `11` is only emitted for frames after the first. The last pixel of a
//! grid is always written as a literal, so no run is left open.

use super::CodecError;

const MASK6: u8 = 0x3F;
const SHORT_RUN: u8 = 0b01 << 6;
const LONG_RUN: u8 = 0b10 << 6;
const FIRST_FRAME_RUN: u8 = 0b11 << 6;

/// Longest same-color run the encoder accumulates.
pub const MAX_COLOR_RUN: usize = u16::MAX as usize;

/// Longest frame-0 repeat run; the length field is 14 bits.
pub const MAX_FIRST_FRAME_RUN: usize = (1 << 14) - 1;

/// Encode one keyframe of palette indices below 64. `first` is frame 0 of
/// the same layer (or a blank grid when frame 0 is empty) and is only
/// consulted when `frame > 0`.
pub fn encode_pixels(frame: usize, cells: &[u8], first: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut prev: Option<u8> = None;
    let mut count = 0usize;
    let mut repeating_first = false;
    let last = cells.len().saturating_sub(1);

    for (i, &color) in cells.iter().enumerate() {
        let is_last = i == last;

        if frame > 0
            && first.get(i) == Some(&color)
            && (count == 0 || repeating_first)
            && count < MAX_FIRST_FRAME_RUN
            && !is_last
        {
            count += 1;
            repeating_first = true;
            continue;
        }

        if repeating_first {
            out.push(FIRST_FRAME_RUN | ((count >> 8) as u8 & MASK6));
            out.push(count as u8);
            repeating_first = false;
            count = 0;
            prev = None;
        }

        match prev {
            Some(run_color) if run_color == color && count < MAX_COLOR_RUN - 1 && !is_last => {
                count += 1;
                continue;
            }
            Some(run_color) if count > 0 => {
                flush_run(&mut out, run_color, count + 1);
                count = 0;
            }
            _ => {}
        }

        prev = Some(color);
        out.push(color & MASK6);
    }

    out
}

/// Upgrade the literal that opened a run into a run tag.
fn flush_run(out: &mut Vec<u8>, color: u8, total: usize) {
    out.pop();
    let color = color & MASK6;
    if total > u8::MAX as usize {
        out.push(LONG_RUN | color);
        out.extend_from_slice(&(total as u16).to_be_bytes());
    } else {
        out.push(SHORT_RUN | color);
        out.push(total as u8);
    }
}

/// Decode one keyframe of exactly `cell_count` pixels.
///
/// Frame-0 repeats read from `first`; cells it cannot supply decode as 0.
pub fn decode_pixels(
    data: &[u8],
    cell_count: usize,
    first: Option<&[u8]>,
) -> Result<Vec<u8>, CodecError> {
    let mut pixels = Vec::with_capacity(cell_count);
    let mut i = 0;

    while i < data.len() {
        let tag = data[i];
        let low = tag & MASK6;

        let width = match tag >> 6 {
            0b00 => 1,
            0b01 | 0b11 => 2,
            _ => 3,
        };
        if i + width > data.len() {
            return Err(CodecError::Truncated {
                needed: width,
                available: data.len() - i,
                offset: i,
            });
        }

        let len = match tag >> 6 {
            0b00 => 1,
            0b01 => data[i + 1] as usize,
            0b10 => u16::from_be_bytes([data[i + 1], data[i + 2]]) as usize,
            _ => ((low as usize) << 8) | data[i + 1] as usize,
        };
        if pixels.len() + len > cell_count {
            return Err(CodecError::InvalidPixelCount {
                expected: cell_count,
                found: pixels.len() + len,
            });
        }

        if tag >> 6 == 0b11 {
            let start = pixels.len();
            pixels.extend(
                (start..start + len).map(|j| first.and_then(|f| f.get(j)).copied().unwrap_or(0)),
            );
        } else {
            pixels.resize(pixels.len() + len, low);
        }
        i += width;
    }

    if pixels.len() != cell_count {
        return Err(CodecError::InvalidPixelCount {
            expected: cell_count,
            found: pixels.len(),
        });
    }
    Ok(pixels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_then(color: u8, n: usize, terminator: u8) -> Vec<u8> {
        let mut cells = vec![color; n];
        cells.push(terminator);
        cells
    }

    fn assert_round_trip(frame: usize, cells: &[u8], first: &[u8]) -> Vec<u8> {
        let encoded = encode_pixels(frame, cells, first);
        let decoded = decode_pixels(&encoded, cells.len(), Some(first)).unwrap();
        assert_eq!(decoded, cells);
        encoded
    }

    #[test]
    fn test_single_ink_cell_then_background() {
        let mut cells = vec![0u8; 16];
        cells[0] = 3;
        let encoded = assert_round_trip(0, &cells, &cells.clone());
        assert_eq!(encoded, vec![0x03, 0x40, 14, 0x00]);
    }

    #[test]
    fn test_short_run_boundary() {
        let cells = run_then(5, 255, 1);
        let encoded = assert_round_trip(0, &cells, &[]);
        assert_eq!(encoded, vec![0x45, 0xFF, 0x01]);
    }

    #[test]
    fn test_long_run_boundary() {
        let cells = run_then(5, 256, 1);
        let encoded = assert_round_trip(0, &cells, &[]);
        assert_eq!(encoded, vec![0x85, 0x01, 0x00, 0x01]);

        let cells = run_then(5, 65535, 1);
        let encoded = assert_round_trip(0, &cells, &[]);
        assert_eq!(encoded, vec![0x85, 0xFF, 0xFF, 0x01]);
    }

    #[test]
    fn test_run_longer_than_u16_splits() {
        let cells = run_then(5, 65536, 1);
        let encoded = assert_round_trip(0, &cells, &[]);
        assert_eq!(encoded, vec![0x85, 0xFF, 0xFF, 0x05, 0x01]);
    }

    #[test]
    fn test_uniform_grid_ends_with_literal() {
        let cells = vec![9u8; 300];
        let encoded = assert_round_trip(0, &cells, &[]);
        assert_eq!(encoded, vec![0x89, 0x01, 0x2B, 0x09]);

        assert_eq!(encode_pixels(0, &[7], &[]), vec![0x07]);
        assert_eq!(encode_pixels(0, &[7, 7], &[]), vec![0x07, 0x07]);
    }

    #[test]
    fn test_first_frame_run_boundary() {
        let first = vec![0u8; MAX_FIRST_FRAME_RUN + 1];
        let encoded = assert_round_trip(1, &first, &first);
        assert_eq!(encoded, vec![0xFF, 0xFF, 0x00]);

        let first = vec![0u8; MAX_FIRST_FRAME_RUN + 2];
        let encoded = assert_round_trip(1, &first, &first);
        assert_eq!(encoded, vec![0xFF, 0xFF, 0x00, 0x00]);
    }

    #[test]
    fn test_first_frame_run_only_after_frame_zero() {
        let cells = vec![0, 4, 4, 4, 0];
        let encoded = encode_pixels(0, &cells, &cells);
        assert!(encoded.iter().all(|b| b >> 6 != 0b11));
    }

    #[test]
    fn test_first_frame_run_stops_on_divergence() {
        let first = [1, 1, 1, 1, 2, 2];
        let cells = [1, 1, 3, 3, 3, 2];
        let encoded = assert_round_trip(1, &cells, &first);
        assert_eq!(encoded, vec![0xC0, 0x02, 0x43, 0x03, 0x02]);
    }

    #[test]
    fn test_decode_first_frame_run_without_reference() {
        let decoded = decode_pixels(&[0xC0, 0x03, 0x07], 4, None).unwrap();
        assert_eq!(decoded, vec![0, 0, 0, 7]);
    }

    #[test]
    fn test_decode_truncated_runs() {
        for data in [&[0x45][..], &[0x85, 0x01], &[0xC0]] {
            assert!(matches!(
                decode_pixels(data, 4, None),
                Err(CodecError::Truncated { offset: 0, .. })
            ));
        }
    }

    #[test]
    fn test_decode_pixel_count_mismatch() {
        assert!(matches!(
            decode_pixels(&[0x01, 0x02], 3, None),
            Err(CodecError::InvalidPixelCount {
                expected: 3,
                found: 2
            })
        ));
        assert!(matches!(
            decode_pixels(&[0x81, 0xFF, 0xFF], 3, None),
            Err(CodecError::InvalidPixelCount {
                expected: 3,
                found: 65535
            })
        ));
    }
}

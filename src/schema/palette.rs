//! Indexed color palette and the RGBA pixel type handed to display surfaces.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Maximum palette size; indices are 6-bit on disk.
pub const PALETTE_SIZE: usize = 64;

/// Palette index that means "no ink".
pub const TRANSPARENT: u8 = 0;

/// A single RGBA8 pixel.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba {
        r: 0,
        g: 0,
        b: 0,
        a: 0,
    };

    #[inline]
    pub const fn opaque(rgb: [u8; 3]) -> Self {
        Self {
            r: rgb[0],
            g: rgb[1],
            b: rgb[2],
            a: 255,
        }
    }
}

/// View a pixel buffer as raw `RGBA` bytes.
#[inline]
pub fn rgba_bytes(pixels: &[Rgba]) -> &[u8] {
    bytemuck::cast_slice(pixels)
}

/// Ordered list of up to [`PALETTE_SIZE`] colors.
///
/// Index 0 is never drawn: it resolves to [`Rgba::TRANSPARENT`] regardless of
/// the color stored there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    colors: Vec<[u8; 3]>,
}

impl Palette {
    pub fn new(colors: Vec<[u8; 3]>) -> Result<Self, PaletteError> {
        if colors.len() > PALETTE_SIZE {
            return Err(PaletteError::TooManyColors(colors.len()));
        }
        Ok(Self { colors })
    }

    /// The editor's stock palette: eleven hues in five shades each, followed
    /// by a nine step gray ramp, reversed so black lands on index 0.
    pub fn generated() -> Self {
        let mut colors = Vec::with_capacity(PALETTE_SIZE);
        let hue_steps = 12;
        let hue_step = 360.0 / hue_steps as f64;

        for h in 0..hue_steps {
            let hue = h as f64 * hue_step;
            if h == 4 {
                // 120° reads as the grid color
                continue;
            }
            colors.push(hsv_to_rgb(hue, 0.2, 1.0));
            colors.push(hsv_to_rgb(hue, 0.4, 1.0));
            colors.push(hsv_to_rgb(hue, 0.6, 0.9));
            colors.push(hsv_to_rgb(hue, 0.8, 0.6));
            colors.push(hsv_to_rgb(hue, 0.8, 0.4));
        }

        for v in (0..=8).rev() {
            colors.push(hsv_to_rgb(0.0, 0.0, v as f64 / 8.0));
        }

        colors.reverse();
        Self { colors }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn colors(&self) -> &[[u8; 3]] {
        &self.colors
    }

    /// Resolve a palette index to a display pixel.
    #[inline]
    pub fn rgba(&self, index: u8) -> Rgba {
        if index == TRANSPARENT {
            return Rgba::TRANSPARENT;
        }
        self.colors
            .get(index as usize)
            .map_or(Rgba::TRANSPARENT, |&rgb| Rgba::opaque(rgb))
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::generated()
    }
}

/// Palette construction errors.
#[derive(Debug, thiserror::Error)]
pub enum PaletteError {
    #[error("Palette has {0} colors, at most 64 are addressable")]
    TooManyColors(usize),
}

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> [u8; 3] {
    let l = v * (1.0 - s / 2.0);
    let s = if !(0.0001..=0.998).contains(&l) {
        0.0
    } else {
        (v - l) / l.min(1.0 - l)
    };

    let h = h.clamp(0.0, 360.0);
    let l = l.clamp(0.0, 1.0);
    let s = s.clamp(0.0, 1.0);
    if s == 0.0 {
        let g = (l * 255.0).round() as u8;
        return [g, g, g];
    }

    let temp2 = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let temp1 = 2.0 * l - temp2;
    let h = h / 360.0;

    let channel = |t: f64| -> u8 {
        let value = if t < 1.0 / 6.0 {
            temp1 + (temp2 - temp1) * 6.0 * t
        } else if t < 0.5 {
            temp2
        } else if t < 2.0 / 3.0 {
            temp1 + (temp2 - temp1) * 6.0 * (2.0 / 3.0 - t)
        } else {
            temp1
        };
        (value * 255.0).round() as u8
    };

    [
        channel((h + 1.0 / 3.0) % 1.0),
        channel(h),
        channel((h + 2.0 / 3.0) % 1.0),
    ]
}

//! Converts external, non-indexed rasters into 8-bit indexed pixel
//! buffers against a target palette (§4.6 of the format specification).
//!
//! This is the only place in the crate that looks at color values as
//! anything other than opaque RGB triples: everywhere else, pixels are
//! already palette indices. Once a raster has been converted here, it
//! is handed to [`crate::frame::Frame::from_indexed_raster`], which
//! performs the palette-trimming step.

use once_cell::sync::Lazy;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use log::{trace, warn};

use crate::error::{ActError, FormatError};

/// A raster in one of the pixel formats external tools commonly hand
/// this crate. `Indexed` rasters carry their own source palette, which
/// may differ from the palette the caller wants the result expressed
/// against; `Bgra32` rasters carry true color plus an alpha channel
/// used only to detect fully-transparent pixels (mapped to index 0).
pub enum SourceRaster {
    /// Already-indexed pixels at `bit_depth` bits per pixel (1, 4, or 8),
    /// tightly packed per row, most-significant bits first, with their
    /// own palette.
    Indexed {
        bit_depth: u8,
        width: u32,
        height: u32,
        source_palette: Vec<[u8; 3]>,
        packed: Vec<u8>,
    },
    /// True-color pixels, four bytes each in `B, G, R, A` order.
    Bgra32 {
        width: u32,
        height: u32,
        pixels: Vec<[u8; 4]>,
    },
}

type CacheKey = ([u8; 3], bool, u64);
static COLOR_INDEX_CACHE: Lazy<Mutex<HashMap<CacheKey, u8>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Cheap content fingerprint of a target palette, used as part of the
/// cache key so two distinct same-length palettes never collide.
fn fingerprint_palette(palette: &[[u8; 3]]) -> u64 {
    let mut hasher = DefaultHasher::new();
    palette.hash(&mut hasher);
    hasher.finish()
}

/// Converts `source` into an 8-bit indexed raster expressed against
/// `target_palette`, one byte per pixel, top-down left-to-right. Does
/// not trim the palette; that is [`crate::frame::Frame`]'s job.
pub fn convert_to_indexed(
    source: &SourceRaster,
    target_palette: &[[u8; 3]],
) -> Result<Vec<u8>, ActError> {
    if target_palette.is_empty() {
        return Err(FormatError::PaletteLengthOutOfRange { got: 0 }.into());
    }

    match source {
        SourceRaster::Indexed {
            bit_depth,
            width,
            height,
            source_palette,
            packed,
        } => convert_indexed(*bit_depth, *width, *height, source_palette, packed, target_palette),
        SourceRaster::Bgra32 {
            width,
            height,
            pixels,
        } => convert_bgra(*width, *height, pixels, target_palette),
    }
}

fn convert_indexed(
    bit_depth: u8,
    width: u32,
    height: u32,
    source_palette: &[[u8; 3]],
    packed: &[u8],
    target_palette: &[[u8; 3]],
) -> Result<Vec<u8>, ActError> {
    if !matches!(bit_depth, 1 | 4 | 8) {
        return Err(FormatError::NotIndexed.into());
    }
    let unpacked = unpack_indexed(bit_depth, width, height, packed)?;
    let fingerprint = fingerprint_palette(target_palette);

    let mut out = Vec::with_capacity(unpacked.len());
    for &source_index in &unpacked {
        let color = *source_palette.get(source_index as usize).ok_or(
            crate::error::ValidationError::IndexOutOfRange {
                index: source_index as usize,
                palette_len: source_palette.len(),
            },
        )?;
        out.push(nearest_palette_index(color, false, target_palette, fingerprint));
    }
    Ok(out)
}

fn convert_bgra(
    width: u32,
    height: u32,
    pixels: &[[u8; 4]],
    target_palette: &[[u8; 3]],
) -> Result<Vec<u8>, ActError> {
    let expected = (width as usize) * (height as usize);
    if pixels.len() != expected {
        return Err(FormatError::RasterLengthMismatch {
            expected,
            got: pixels.len(),
        }
        .into());
    }

    let fingerprint = fingerprint_palette(target_palette);
    let mut out = Vec::with_capacity(expected);
    for &[b, g, r, a] in pixels {
        if a == 0 {
            out.push(0);
            continue;
        }
        out.push(nearest_palette_index([r, g, b], true, target_palette, fingerprint));
    }
    Ok(out)
}

/// Unpacks a tightly-packed `bit_depth`-bits-per-pixel raster (rows not
/// byte-aligned) into one byte per pixel.
fn unpack_indexed(bit_depth: u8, width: u32, height: u32, packed: &[u8]) -> Result<Vec<u8>, ActError> {
    let total_pixels = (width as usize) * (height as usize);
    let total_bits = total_pixels * bit_depth as usize;
    let expected_bytes = (total_bits + 7) / 8;
    if packed.len() != expected_bytes {
        return Err(FormatError::RasterLengthMismatch {
            expected: expected_bytes,
            got: packed.len(),
        }
        .into());
    }

    let mask = (1u16 << bit_depth) - 1;
    let mut out = Vec::with_capacity(total_pixels);
    let mut bit_pos = 0usize;
    for _ in 0..total_pixels {
        let byte_index = bit_pos / 8;
        let bit_offset = bit_pos % 8;
        // Bits are consumed most-significant-first within each byte.
        let shift = 8 - bit_offset - bit_depth as usize;
        let value = (packed[byte_index] >> shift) as u16 & mask;
        out.push(value as u8);
        bit_pos += bit_depth as usize;
    }
    Ok(out)
}

/// Finds the palette entry minimizing squared Euclidean RGB distance to
/// `color`, ties broken by lowest index, with an early exit on an exact
/// match. Results are memoized per `(color, had_alpha, palette
/// fingerprint)` so repeated colors in a raster are not re-searched;
/// `fingerprint` is a content hash of the whole target palette (computed
/// once per conversion call), not just its length, so two distinct
/// palettes of the same size never collide in the cache.
fn nearest_palette_index(color: [u8; 3], had_alpha: bool, palette: &[[u8; 3]], fingerprint: u64) -> u8 {
    let key: CacheKey = (color, had_alpha, fingerprint);
    if let Some(&cached) = COLOR_INDEX_CACHE.lock().unwrap().get(&key) {
        return cached;
    }

    let mut best_index = 0usize;
    let mut best_distance = u32::MAX;
    for (i, &candidate) in palette.iter().enumerate() {
        let dr = color[0] as i32 - candidate[0] as i32;
        let dg = color[1] as i32 - candidate[1] as i32;
        let db = color[2] as i32 - candidate[2] as i32;
        let distance = (dr * dr + dg * dg + db * db) as u32;
        if distance < best_distance {
            best_distance = distance;
            best_index = i;
            if distance == 0 {
                break;
            }
        }
    }

    if best_distance != 0 {
        warn!(
            "no exact palette match for [{}, {}, {}]; using index {} at distance {}",
            color[0], color[1], color[2], best_index, best_distance
        );
    } else {
        trace!("exact palette match for [{}, {}, {}] at index {}", color[0], color[1], color[2], best_index);
    }

    COLOR_INDEX_CACHE.lock().unwrap().insert(key, best_index as u8);
    best_index as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgra_exact_match() {
        let palette = vec![[0, 0, 0], [255, 0, 0], [0, 255, 0]];
        let pixels = vec![[0, 0, 255, 255], [0, 255, 0, 255]]; // B,G,R,A
        let source = SourceRaster::Bgra32 {
            width: 2,
            height: 1,
            pixels,
        };
        let result = convert_to_indexed(&source, &palette).unwrap();
        assert_eq!(result, vec![1, 2]);
    }

    #[test]
    fn transparent_alpha_maps_to_zero() {
        let palette = vec![[0, 0, 0], [255, 0, 0]];
        let pixels = vec![[10, 20, 30, 0]];
        let source = SourceRaster::Bgra32 {
            width: 1,
            height: 1,
            pixels,
        };
        let result = convert_to_indexed(&source, &palette).unwrap();
        assert_eq!(result, vec![0]);
    }

    #[test]
    fn nearest_neighbor_picks_closest_color() {
        let palette = vec![[0, 0, 0], [100, 100, 100], [255, 255, 255]];
        let pixels = vec![[90, 90, 90, 255]]; // B,G,R but gray so order-agnostic
        let source = SourceRaster::Bgra32 {
            width: 1,
            height: 1,
            pixels,
        };
        let result = convert_to_indexed(&source, &palette).unwrap();
        assert_eq!(result, vec![1]);
    }

    #[test]
    fn indexed_8bit_remaps_through_own_palette() {
        let source_palette = vec![[0, 0, 0], [10, 10, 10]];
        let target_palette = vec![[0, 0, 0], [200, 200, 200], [10, 10, 10]];
        let source = SourceRaster::Indexed {
            bit_depth: 8,
            width: 2,
            height: 1,
            source_palette,
            packed: vec![1, 0],
        };
        let result = convert_to_indexed(&source, &target_palette).unwrap();
        assert_eq!(result, vec![2, 0]);
    }

    #[test]
    fn indexed_1bit_unpacks_msb_first() {
        // byte 0b1011_0000 -> pixels [1,0,1,1,0,0,0,0] for an 8-wide row
        let source_palette = vec![[0, 0, 0], [255, 255, 255]];
        let target_palette = source_palette.clone();
        let source = SourceRaster::Indexed {
            bit_depth: 1,
            width: 8,
            height: 1,
            source_palette,
            packed: vec![0b1011_0000],
        };
        let result = convert_to_indexed(&source, &target_palette).unwrap();
        assert_eq!(result, vec![1, 0, 1, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn wrong_packed_length_is_rejected() {
        let palette = vec![[0, 0, 0]];
        let source = SourceRaster::Indexed {
            bit_depth: 8,
            width: 4,
            height: 1,
            source_palette: palette.clone(),
            packed: vec![0, 0],
        };
        let result = convert_to_indexed(&source, &palette);
        assert!(result.is_err());
    }
}

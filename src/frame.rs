//! A single ACT frame: its own palette, origin offset, and indexed raster.

use log::debug;

use crate::error::{ActError, BoundaryError, FormatError, ValidationError};
use crate::opcode::{decode_indexed_raster, encode_indexed_raster};

/// Maximum pixel dimension of a frame, and the upper bound `(x, y)` must
/// stay clear of relative to the parent center.
pub const MAX_FRAME_DIMENSION: u32 = 256;

/// Maximum number of colors a palette may hold.
pub const MAX_PALETTE_LEN: usize = 256;

/// Sentinel meaning "this frame's offset has never been explicitly set".
/// Replaced at construction time with a concrete centered offset; never
/// observable from outside this module (see spec.md §9's design note on
/// the `(621, 621)` sentinel).
const UNSET_OFFSET: (i32, i32) = (621, 621);

/// Checks `width`/`height` against the `[1, 256]` range a frame may
/// legally have, per §3 of the format specification. Callers that read
/// these values from untrusted bytes (the file codec) must call this
/// *before* using either value to size an allocation or a loop bound,
/// not just rely on [`Frame::from_decoded_parts`]'s own check, which
/// only runs after the row-opcode decoder has already allocated the
/// pixel buffer.
pub fn validate_frame_dimensions(width: u32, height: u32) -> Result<(), ActError> {
    if width == 0 || height == 0 || width > MAX_FRAME_DIMENSION || height > MAX_FRAME_DIMENSION {
        return Err(BoundaryError::FrameDimensionTooLarge {
            dimension: width.max(height),
        }
        .into());
    }
    Ok(())
}

/// One rectangular frame of an [`Image`](crate::image::Image).
///
/// A `Frame` holds no reference to its parent; operations that need
/// parent context (the shared center, the maximum legal coordinate)
/// take it as an explicit parameter and the caller is responsible for
/// re-running the parent's bounding-box recompute afterward.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    x: i32,
    y: i32,
    palette: Vec<[u8; 3]>,
    use_frame_colors: bool,
    pixels: Vec<u8>,
    length_bit_count: u8,
}

impl Frame {
    /// Builds a frame from an already-decoded palette and indexed
    /// raster, computing `length_bit_count` canonically (§3 invariant).
    /// Used both by the file decoder (which then overwrites
    /// `length_bit_count` with the value the file actually carried) and
    /// by frame construction from a raw raster.
    fn new_canonical(
        width: u32,
        height: u32,
        x: i32,
        y: i32,
        palette: Vec<[u8; 3]>,
        use_frame_colors: bool,
        pixels: Vec<u8>,
    ) -> Result<Self, ActError> {
        let length_bit_count = canonical_length_bit_count(palette.len(), width);
        let mut frame = Frame {
            width,
            height,
            x,
            y,
            palette,
            use_frame_colors,
            pixels,
            length_bit_count,
        };
        if frame.x == UNSET_OFFSET.0 && frame.y == UNSET_OFFSET.1 {
            frame.x = -(frame.width as i32) / 2;
            frame.y = -(frame.height as i32) / 2;
        }
        frame.validate_geometry()?;
        Ok(frame)
    }

    /// Constructs a frame from an 8-bit indexed raster and a palette,
    /// trimming unused palette slots (other than slot 0) and remapping
    /// pixel indices (§4.2 "Construction from raster").
    pub fn from_indexed_raster(
        width: u32,
        height: u32,
        palette: Vec<[u8; 3]>,
        pixels: Vec<u8>,
    ) -> Result<Self, ActError> {
        validate_frame_dimensions(width, height)?;
        if pixels.len() != (width * height) as usize {
            return Err(FormatError::RasterLengthMismatch {
                expected: (width * height) as usize,
                got: pixels.len(),
            }
            .into());
        }
        for &p in &pixels {
            if p as usize >= palette.len() {
                return Err(ValidationError::IndexOutOfRange {
                    index: p as usize,
                    palette_len: palette.len(),
                }
                .into());
            }
        }

        let (trimmed_palette, remapped_pixels) = trim_unused_palette_slots(&palette, &pixels);
        debug!(
            "trimmed palette from {} to {} colors",
            palette.len(),
            trimmed_palette.len()
        );

        Self::new_canonical(
            width,
            height,
            UNSET_OFFSET.0,
            UNSET_OFFSET.1,
            trimmed_palette,
            true,
            remapped_pixels,
        )
    }

    /// Reconstructs a frame exactly as decoded from file bytes: no
    /// trimming, and `length_bit_count` is whatever the file said.
    pub(crate) fn from_decoded_parts(
        width: u32,
        height: u32,
        x: i32,
        y: i32,
        palette: Vec<[u8; 3]>,
        use_frame_colors: bool,
        length_bit_count: u8,
        pixels: Vec<u8>,
    ) -> Result<Self, ActError> {
        if !(3..=5).contains(&length_bit_count) {
            return Err(FormatError::InvalidLengthBitCount { got: length_bit_count }.into());
        }
        let frame = Frame {
            width,
            height,
            x,
            y,
            palette,
            use_frame_colors,
            pixels,
            length_bit_count,
        };
        frame.validate_geometry()?;
        Ok(frame)
    }

    fn validate_geometry(&self) -> Result<(), ActError> {
        validate_frame_dimensions(self.width, self.height)?;
        if self.palette.is_empty() || self.palette.len() > MAX_PALETTE_LEN {
            return Err(FormatError::PaletteLengthOutOfRange {
                got: self.palette.len(),
            }
            .into());
        }
        for &p in &self.pixels {
            if p as usize >= self.palette.len() {
                return Err(ValidationError::IndexOutOfRange {
                    index: p as usize,
                    palette_len: self.palette.len(),
                }
                .into());
            }
        }
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn palette(&self) -> &[[u8; 3]] {
        &self.palette
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn use_frame_colors(&self) -> bool {
        self.use_frame_colors
    }

    pub fn set_use_frame_colors(&mut self, use_frame_colors: bool) {
        self.use_frame_colors = use_frame_colors;
    }

    pub fn length_bit_count(&self) -> u8 {
        self.length_bit_count
    }

    pub fn color_count(&self) -> usize {
        self.palette.len()
    }

    /// Sets one palette slot's color. Slot 0 is semantically transparent
    /// but its stored color is not otherwise special.
    pub fn set_palette_color(&mut self, index: usize, color: [u8; 3]) -> Result<(), ActError> {
        if index >= self.palette.len() {
            return Err(ValidationError::IndexOutOfRange {
                index,
                palette_len: self.palette.len(),
            }
            .into());
        }
        self.palette[index] = color;
        Ok(())
    }

    /// Replaces this frame's raster and palette wholesale, trimming
    /// unused palette slots as construction-from-raster does, and
    /// recomputing `length_bit_count`.
    pub fn set_raster(&mut self, palette: Vec<[u8; 3]>, pixels: Vec<u8>) -> Result<(), ActError> {
        if pixels.len() != (self.width * self.height) as usize {
            return Err(FormatError::RasterLengthMismatch {
                expected: (self.width * self.height) as usize,
                got: pixels.len(),
            }
            .into());
        }
        for &p in &pixels {
            if p as usize >= palette.len() {
                return Err(ValidationError::IndexOutOfRange {
                    index: p as usize,
                    palette_len: palette.len(),
                }
                .into());
            }
        }
        let (trimmed_palette, remapped_pixels) = trim_unused_palette_slots(&palette, &pixels);
        self.palette = trimmed_palette;
        self.pixels = remapped_pixels;
        self.length_bit_count = canonical_length_bit_count(self.palette.len(), self.width);
        Ok(())
    }

    /// Re-validates and sets this frame's offset relative to `center`,
    /// given the image's maximum legal coordinate (always 256, per
    /// §4.2's setter invariant). The caller must trigger the parent's
    /// bounding-box recompute afterward.
    pub fn set_offset(&mut self, x: i32, y: i32, center: (i32, i32)) -> Result<(), ActError> {
        let parent_max = MAX_FRAME_DIMENSION as i32;
        let min_x = -center.0;
        let max_x = parent_max - self.width as i32 - center.0;
        let min_y = -center.1;
        let max_y = parent_max - self.height as i32 - center.1;

        if x < min_x || x > max_x || y < min_y || y > max_y {
            return Err(BoundaryError::OffsetOutOfRange { x, y }.into());
        }
        self.x = x;
        self.y = y;
        Ok(())
    }

    /// Encodes this frame's raster through the opcode codec.
    pub fn encode_rows(&self) -> Result<Vec<u8>, ActError> {
        encode_indexed_raster(
            &self.pixels,
            self.width as usize,
            self.height as usize,
            self.length_bit_count,
        )
    }

    /// Decodes a row-opcode stream into a frame's raster, given
    /// dimensions and `length_bit_count` already read from the frame
    /// header.
    pub(crate) fn decode_rows(
        data: &[u8],
        width: u32,
        height: u32,
        length_bit_count: u8,
    ) -> Result<(Vec<u8>, usize), ActError> {
        decode_indexed_raster(data, width as usize, height as usize, length_bit_count)
    }
}

/// Picks `length_bit_count` per the §3 invariant: 5 if the palette has
/// at most 8 colors; else 4 if the palette has at most 16 colors or the
/// frame is at most 16 pixels wide; else 3.
pub fn canonical_length_bit_count(palette_len: usize, width: u32) -> u8 {
    if palette_len <= 8 {
        5
    } else if palette_len <= 16 || width <= 16 {
        4
    } else {
        3
    }
}

/// Compresses a palette by removing unused slots (other than slot 0)
/// and remapping pixel indices downward to match, repeating until
/// stable (a single pass already achieves this, since removing slot
/// `i` only ever decrements indices greater than `i`).
fn trim_unused_palette_slots(palette: &[[u8; 3]], pixels: &[u8]) -> (Vec<[u8; 3]>, Vec<u8>) {
    let mut used = vec![false; palette.len()];
    used[0] = true;
    for &p in pixels {
        used[p as usize] = true;
    }

    let mut remap = vec![0u8; palette.len()];
    let mut trimmed = Vec::with_capacity(palette.len());
    for (i, &color) in palette.iter().enumerate() {
        if used[i] {
            remap[i] = trimmed.len() as u8;
            trimmed.push(color);
        }
    }

    let remapped_pixels = pixels.iter().map(|&p| remap[p as usize]).collect();
    (trimmed, remapped_pixels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_palette(n: usize) -> Vec<[u8; 3]> {
        (0..n).map(|i| [i as u8, i as u8, i as u8]).collect()
    }

    #[test]
    fn trim_on_assignment() {
        let palette = gray_palette(256);
        let pixels = vec![5u8; 16 * 16];
        let frame = Frame::from_indexed_raster(16, 16, palette, pixels).unwrap();

        assert_eq!(frame.palette().len(), 2);
        assert!(frame.pixels().iter().all(|&p| p == 1));
    }

    #[test]
    fn unset_offset_centers_on_anchor() {
        let palette = gray_palette(2);
        let pixels = vec![0u8; 16 * 20];
        let frame = Frame::from_indexed_raster(16, 20, palette, pixels).unwrap();

        assert_eq!(frame.x(), -8);
        assert_eq!(frame.y(), -10);
    }

    #[test]
    fn length_bit_count_selection() {
        assert_eq!(canonical_length_bit_count(8, 200), 5);
        assert_eq!(canonical_length_bit_count(16, 200), 4);
        assert_eq!(canonical_length_bit_count(200, 16), 4);
        assert_eq!(canonical_length_bit_count(200, 200), 3);
    }

    #[test]
    fn offset_setter_rejects_out_of_range() {
        let palette = gray_palette(2);
        let pixels = vec![0u8; 16 * 16];
        let mut frame = Frame::from_indexed_raster(16, 16, palette, pixels).unwrap();

        assert!(frame.set_offset(-20, -8, (16, 16)).is_ok());
        assert!(frame.set_offset(300, 0, (16, 16)).is_err());
    }

    #[test]
    fn index_out_of_range_is_rejected() {
        let palette = gray_palette(2);
        let pixels = vec![5u8; 4];
        let result = Frame::from_indexed_raster(2, 2, palette, pixels);
        assert!(result.is_err());
    }

    #[test]
    fn dimension_too_large_is_rejected() {
        let palette = gray_palette(2);
        let pixels = vec![0u8; 300 * 2];
        let result = Frame::from_indexed_raster(300, 2, palette, pixels);
        assert!(result.is_err());
    }
}

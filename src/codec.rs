//! The top-level ACT/XACT binary layout (§4.5 and §6 of the format
//! specification): file header, frame-offset jump table, concatenated
//! frame bodies, and an optional trailing global-palette section.

use log::{debug, warn};

use crate::collection::{MAX_FRAMES, MIN_FRAMES};
use crate::error::{ActError, BoundaryError, FormatError, StateError, ValidationError};
use crate::frame::{validate_frame_dimensions, Frame, MAX_PALETTE_LEN};
use crate::image::Image;

pub const FILE_HEADER_LEN: usize = 0x34;
pub const FRAME_HEADER_LEN: usize = 0x2C;
pub const FRAME_EXTENTS_LEN: usize = 16;
const CANONICAL_FRAME_OFFSETS_JUMP: u32 = 0x34;
const CANONICAL_PALETTE_JUMP: u32 = 0x2C;
const COLORS_PRESENT: u32 = 0x18;
const COLORS_ABSENT: u32 = 0x00;

fn read_u32(data: &[u8], offset: usize) -> Result<u32, ActError> {
    let bytes: [u8; 4] = data
        .get(offset..offset + 4)
        .ok_or(ValidationError::MissingEndFrame)?
        .try_into()
        .unwrap();
    Ok(u32::from_le_bytes(bytes))
}

fn read_i32(data: &[u8], offset: usize) -> Result<i32, ActError> {
    read_u32(data, offset).map(|v| v as i32)
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Decodes a full ACT (or bare XACT payload) byte buffer into an
/// [`Image`]. Both are the same byte layout; XACT is only ACT embedded
/// as an archive payload, out of scope for this crate to unwrap.
pub fn decode_image(data: &[u8]) -> Result<Image, ActError> {
    if data.len() < FILE_HEADER_LEN {
        return Err(ValidationError::MissingEndFrame.into());
    }

    let frame_offsets_jump = read_u32(data, 0x10)?;
    if frame_offsets_jump != CANONICAL_FRAME_OFFSETS_JUMP {
        return Err(ValidationError::BadFrameOffsetsJump {
            found: frame_offsets_jump,
        }
        .into());
    }

    let global_palette_jump = read_u32(data, 0x0C)? as usize;
    let frame_count = read_u32(data, 0x18)? as usize;
    let width = read_u32(data, 0x1C)?.saturating_add(1);
    let height = read_u32(data, 0x20)?.saturating_add(1);
    let center_x = read_i32(data, 0x24)?;
    let center_y = read_i32(data, 0x28)?;
    let global_colors_flag = read_u32(data, 0x2C)?;
    let global_color_count = read_u32(data, 0x30)? as usize;

    if !(MIN_FRAMES..=MAX_FRAMES).contains(&frame_count) {
        return Err(StateError::FrameCountOutOfRange {
            requested: frame_count,
        }
        .into());
    }
    if width > 65536 || height > 65536 {
        return Err(BoundaryError::SizeOutOfRange { width, height }.into());
    }
    if global_color_count > MAX_PALETTE_LEN {
        return Err(FormatError::PaletteLengthOutOfRange {
            got: global_color_count,
        }
        .into());
    }

    if center_x < 0 || center_y < 0 || center_x as u32 >= width || center_y as u32 >= height {
        return Err(BoundaryError::CenterOutOfRange {
            x: center_x,
            y: center_y,
            width,
            height,
        }
        .into());
    }

    let use_global_colors = match global_colors_flag {
        COLORS_PRESENT => true,
        COLORS_ABSENT => false,
        other => {
            warn!("unexpected global-colors flag 0x{:X}, treating as absent", other);
            false
        }
    };

    let global_palette = if use_global_colors {
        let mut palette = Vec::with_capacity(global_color_count);
        for i in 0..global_color_count {
            let base = global_palette_jump + i * 4;
            let rgb = data
                .get(base..base + 3)
                .ok_or(ValidationError::MissingEndFrame)?;
            palette.push([rgb[0], rgb[1], rgb[2]]);
        }
        Some(palette)
    } else {
        None
    };

    let mut frame_offsets = Vec::with_capacity(frame_count);
    for i in 0..frame_count {
        frame_offsets.push(read_u32(data, FILE_HEADER_LEN + i * 4)? as usize);
    }

    let mut frames = Vec::with_capacity(frame_count);
    for offset in frame_offsets {
        let body_len = read_u32(data, offset)? as usize;
        let body = data
            .get(offset..offset + body_len)
            .ok_or(ValidationError::MissingEndFrame)?;
        frames.push(decode_frame(body, use_global_colors)?);
    }

    debug!(
        "decoded image: {} frames, reported size {}x{}, center ({}, {})",
        frame_count, width, height, center_x, center_y
    );

    Image::from_decoded_parts(
        (center_x, center_y),
        frames,
        global_palette,
        use_global_colors,
    )
}

fn decode_frame(body: &[u8], parent_uses_global_colors: bool) -> Result<Frame, ActError> {
    if body.len() < FRAME_HEADER_LEN {
        return Err(ValidationError::MissingEndFrame.into());
    }

    let palette_jump = read_u32(body, 0x04)?;
    if palette_jump != CANONICAL_PALETTE_JUMP {
        return Err(ValidationError::BadPaletteJump { found: palette_jump }.into());
    }

    let width = read_u32(body, 0x10)?;
    let height = read_u32(body, 0x14)?;
    let length_bit_count = read_u32(body, 0x20)? as u8;
    let use_frame_colors_flag = read_u32(body, 0x24)?;
    let color_count = read_u32(body, 0x28)? as usize;

    validate_frame_dimensions(width, height)?;
    if color_count > MAX_PALETTE_LEN {
        return Err(FormatError::PaletteLengthOutOfRange { got: color_count }.into());
    }

    let use_frame_colors = use_frame_colors_flag == COLORS_PRESENT;
    if !use_frame_colors && !parent_uses_global_colors {
        return Err(ValidationError::NoActiveColorSource.into());
    }

    let mut palette = Vec::with_capacity(color_count);
    for i in 0..color_count {
        let base = CANONICAL_PALETTE_JUMP as usize + i * 4;
        let rgb = body
            .get(base..base + 3)
            .ok_or(ValidationError::MissingEndFrame)?;
        palette.push([rgb[0], rgb[1], rgb[2]]);
    }

    let image_data_jump = CANONICAL_PALETTE_JUMP as usize + color_count * 4;
    let extents_start = image_data_jump;
    let extents = body
        .get(extents_start..extents_start + FRAME_EXTENTS_LEN)
        .ok_or(ValidationError::MissingEndFrame)?;
    let x = i32::from_le_bytes(extents[0..4].try_into().unwrap());
    let y = i32::from_le_bytes(extents[4..8].try_into().unwrap());

    let row_stream_start = extents_start + FRAME_EXTENTS_LEN;
    let row_stream = &body[row_stream_start..];

    let (pixels, _consumed) = Frame::decode_rows(row_stream, width, height, length_bit_count)?;

    Frame::from_decoded_parts(
        width,
        height,
        x,
        y,
        palette,
        use_frame_colors,
        length_bit_count,
        pixels,
    )
}

/// Encodes an [`Image`] back into its canonical ACT byte layout.
/// Header, jump, and offset fields are all rebuilt from the model;
/// reserved bytes are written as zero. Always emits the 16-byte frame
/// extents block before the row stream (spec.md §4.5's "known encoder
/// shortcoming" is not reproduced here).
pub fn encode_image(image: &Image) -> Result<Vec<u8>, ActError> {
    let mut frame_bodies = Vec::with_capacity(image.frame_count());
    for frame in image.frames_iter() {
        frame_bodies.push(encode_frame(frame)?);
    }

    let frame_count = frame_bodies.len();
    let total_color_count: usize = image.frames_iter().map(|f| f.color_count()).sum();
    let (width, height) = image.size();
    let (center_x, center_y) = image.center();

    let offsets_table_len = frame_count * 4;
    let mut frame_offsets = Vec::with_capacity(frame_count);
    let mut running = FILE_HEADER_LEN + offsets_table_len;
    for body in &frame_bodies {
        frame_offsets.push(running as u32);
        running += body.len();
    }

    let global_palette_jump = running as u32;
    let (global_flag, global_count) = if image.use_global_colors() {
        (COLORS_PRESENT, image.global_palette().map(|p| p.len()).unwrap_or(0))
    } else {
        (COLORS_ABSENT, 0)
    };
    if image.use_global_colors() {
        running += global_count * 4;
    }

    let mut out = Vec::with_capacity(running);
    write_u32(&mut out, running as u32); // 0x00 total file length
    write_u32(&mut out, total_color_count as u32); // 0x04 total color count
    write_u32(&mut out, 0); // 0x08 reserved
    write_u32(&mut out, global_palette_jump); // 0x0C global palette jump
    write_u32(&mut out, CANONICAL_FRAME_OFFSETS_JUMP); // 0x10 frame-offsets jump
    write_u32(&mut out, 0); // 0x14 reserved
    write_u32(&mut out, frame_count as u32); // 0x18 frame count
    write_u32(&mut out, width.saturating_sub(1)); // 0x1C width - 1
    write_u32(&mut out, height.saturating_sub(1)); // 0x20 height - 1
    write_i32(&mut out, center_x); // 0x24 center X
    write_i32(&mut out, center_y); // 0x28 center Y
    write_u32(&mut out, global_flag); // 0x2C global colors flag
    write_u32(&mut out, global_count as u32); // 0x30 global color count
    debug_assert_eq!(out.len(), FILE_HEADER_LEN);

    for offset in &frame_offsets {
        write_u32(&mut out, *offset);
    }
    for body in &frame_bodies {
        out.extend_from_slice(body);
    }
    if image.use_global_colors() {
        if let Some(palette) = image.global_palette() {
            for &[r, g, b] in palette {
                out.extend_from_slice(&[r, g, b, 0]);
            }
        }
    }

    debug!("encoded image: {} bytes, {} frames", out.len(), frame_count);
    Ok(out)
}

fn encode_frame(frame: &Frame) -> Result<Vec<u8>, ActError> {
    let row_stream = frame.encode_rows()?;
    let color_count = frame.color_count();
    let body_len = FRAME_HEADER_LEN + color_count * 4 + FRAME_EXTENTS_LEN + row_stream.len();

    let mut out = Vec::with_capacity(body_len);
    write_u32(&mut out, body_len as u32); // 0x00 frame body length
    write_u32(&mut out, CANONICAL_PALETTE_JUMP); // 0x04 palette jump
    write_u32(&mut out, CANONICAL_PALETTE_JUMP + (color_count * 4) as u32); // 0x08 image-data jump
    write_u32(&mut out, body_len as u32); // 0x0C reserved (convention: body length)
    write_u32(&mut out, frame.width()); // 0x10 width
    write_u32(&mut out, frame.height()); // 0x14 height
    write_u32(&mut out, 0); // 0x18 reserved
    write_u32(&mut out, 0); // 0x1C reserved
    write_u32(&mut out, frame.length_bit_count() as u32); // 0x20 length_bit_count
    write_u32(
        &mut out,
        if frame.use_frame_colors() {
            COLORS_PRESENT
        } else {
            COLORS_ABSENT
        },
    ); // 0x24 use-frame-colors flag
    write_u32(&mut out, color_count as u32); // 0x28 color count
    debug_assert_eq!(out.len(), FRAME_HEADER_LEN);

    for &[r, g, b] in frame.palette() {
        out.extend_from_slice(&[r, g, b, 0]);
    }

    write_i32(&mut out, frame.x()); // left
    write_i32(&mut out, frame.y()); // top
    write_i32(&mut out, frame.x() + frame.width() as i32 - 1); // right
    write_i32(&mut out, frame.y()); // top (repeated)

    out.extend_from_slice(&row_stream);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::image::Image;

    #[test]
    fn one_frame_red_square_round_trips() {
        let palette = vec![[0u8, 0, 0], [255, 0, 0]];
        let pixels = vec![1u8; 16 * 16];
        let image = Image::from_indexed_raster(16, 16, palette, pixels).unwrap();

        let bytes = encode_image(&image).unwrap();
        assert_eq!(bytes.len(), 157);

        let decoded = decode_image(&bytes).unwrap();
        assert_eq!(decoded.frame_count(), 1);
        assert_eq!(decoded.frames_iter().next().unwrap().length_bit_count(), 5);
        assert_eq!(decoded.size(), image.size());
        assert_eq!(decoded.center(), image.center());
        assert_eq!(
            decoded.frames_iter().next().unwrap().pixels(),
            image.frames_iter().next().unwrap().pixels()
        );
    }

    #[test]
    fn bad_frame_offsets_jump_is_rejected() {
        let palette = vec![[0u8, 0, 0], [255, 0, 0]];
        let pixels = vec![1u8; 16 * 16];
        let image = Image::from_indexed_raster(16, 16, palette, pixels).unwrap();
        let mut bytes = encode_image(&image).unwrap();
        bytes[0x10] = 0x30;
        bytes[0x11] = 0x00;
        bytes[0x12] = 0x00;
        bytes[0x13] = 0x00;

        let result = decode_image(&bytes);
        assert!(matches!(result, Err(ActError::Validation(_))));
    }

    #[test]
    fn frame_without_any_color_source_is_rejected() {
        let palette = vec![[0u8, 0, 0], [255, 0, 0]];
        let pixels = vec![1u8; 16 * 16];
        let image = Image::from_indexed_raster(16, 16, palette, pixels).unwrap();
        let mut bytes = encode_image(&image).unwrap();

        // Flip the one frame's use_frame_colors flag to "absent"; the
        // image's use_global_colors is also false, so this must fail.
        let frame_offset = FILE_HEADER_LEN + 4;
        bytes[frame_offset + 0x24] = 0x00;

        let result = decode_image(&bytes);
        assert!(matches!(result, Err(ActError::Validation(_))));
    }
}

//! The row run-length opcode language (§4.1 of the format specification).
//!
//! Pure functions only: no I/O, no palette knowledge beyond the index
//! width implied by `length_bit_count`. Rows are encoded right-to-left,
//! bottom-to-top; [`decode_indexed_raster`] and [`encode_indexed_raster`]
//! take care of the axis flips so callers work in ordinary top-down,
//! left-to-right pixel order.

use log::{debug, trace};

use crate::error::{ActError, FormatError, ValidationError};

const END_FRAME: u8 = 0xFF;
const END_ROW: u8 = 0xFE;
const REPEAT: u8 = 0xFD;
const BLANK: u8 = 0xFC;
const SHIFT: u8 = 0xFB;

/// One decoded row opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Opcode {
    EndFrame,
    EndRow,
    Repeat { run: u16, index: u8 },
    Blank { run: u16 },
    Shift { shift: u8 },
    Short { index: u8, run: u16 },
}

fn max_short_index(length_bit_count: u8) -> u8 {
    0xFFu8 >> length_bit_count
}

fn short_run_cap(index: u8, length_bit_count: u8) -> u16 {
    let t = max_short_index(length_bit_count);
    if index == t {
        if length_bit_count == 3 {
            3
        } else {
            10
        }
    } else {
        1u16 << length_bit_count
    }
}

fn validate_length_bit_count(length_bit_count: u8) -> Result<(), ActError> {
    if !(3..=5).contains(&length_bit_count) {
        return Err(FormatError::InvalidLengthBitCount { got: length_bit_count }.into());
    }
    Ok(())
}

/// Decodes a single row's worth of opcodes (in flipped, left-to-right
/// order) starting at `data[pos]`. Returns the decoded row (length
/// `width`), the new stream position, and the `indexShift` in effect
/// at the end of the row (it persists into the next row).
fn decode_row(
    data: &[u8],
    mut pos: usize,
    width: usize,
    length_bit_count: u8,
    mut index_shift: u8,
) -> Result<(Vec<u8>, usize, u8), ActError> {
    let mask = (1u16 << length_bit_count) - 1;
    let mut row = vec![0u8; width];
    let mut x = 0usize;

    loop {
        if pos >= data.len() {
            return Err(ValidationError::MissingEndRow.into());
        }
        let b = data[pos];
        pos += 1;

        let opcode = if b == END_FRAME {
            Opcode::EndFrame
        } else if b == END_ROW {
            Opcode::EndRow
        } else if b == REPEAT {
            let n = *data.get(pos).ok_or(ValidationError::MissingEndRow)?;
            let idx = *data.get(pos + 1).ok_or(ValidationError::MissingEndRow)?;
            pos += 2;
            Opcode::Repeat { run: n as u16 + 1, index: idx }
        } else if b == BLANK {
            let n = *data.get(pos).ok_or(ValidationError::MissingEndRow)?;
            pos += 1;
            Opcode::Blank { run: n as u16 + 1 }
        } else if b == SHIFT {
            let s = *data.get(pos).ok_or(ValidationError::MissingEndRow)?;
            let u = *data.get(pos + 1).ok_or(ValidationError::MissingEndRow)?;
            pos += 2;
            if u != 0 {
                return Err(ValidationError::NonZeroShiftExtension { value: u }.into());
            }
            Opcode::Shift { shift: s }
        } else {
            let index = (b >> length_bit_count).wrapping_add(index_shift);
            let run = (b as u16 & mask) + 1;
            Opcode::Short { index, run }
        };

        match opcode {
            Opcode::EndFrame => {
                return Err(ValidationError::MissingEndRow.into());
            }
            Opcode::EndRow => {
                trace!("row closed at x={} of width={}", x, width);
                return Ok((row, pos, index_shift));
            }
            Opcode::Shift { shift } => {
                index_shift = shift;
                trace!("indexShift set to {}", shift);
            }
            Opcode::Repeat { run, index } | Opcode::Short { index, run } => {
                if x + run as usize > width {
                    return Err(ValidationError::OpcodeOverrunsRow { position: x, width }.into());
                }
                for _ in 0..run {
                    row[x] = index;
                    x += 1;
                }
            }
            Opcode::Blank { run } => {
                if x + run as usize > width {
                    return Err(ValidationError::OpcodeOverrunsRow { position: x, width }.into());
                }
                x += run as usize; // row is already zero-initialized
            }
        }
    }
}

/// Decodes a full frame's row-opcode stream into a top-down,
/// left-to-right indexed raster of `width * height` bytes.
///
/// Returns the decoded raster and the number of bytes consumed from
/// `data`, including the trailing `EndFrame` byte.
pub fn decode_indexed_raster(
    data: &[u8],
    width: usize,
    height: usize,
    length_bit_count: u8,
) -> Result<(Vec<u8>, usize), ActError> {
    validate_length_bit_count(length_bit_count)?;

    let mut pixels = vec![0u8; width * height];
    let mut pos = 0usize;
    let mut index_shift = 0u8;

    // Rows are stored bottom-to-top; row 0 of the stream is the bottom
    // display row.
    for display_row in (0..height).rev() {
        let (flipped, new_pos, shift) =
            decode_row(data, pos, width, length_bit_count, index_shift)?;
        pos = new_pos;
        index_shift = shift;

        let start = display_row * width;
        for (x, &value) in flipped.iter().enumerate() {
            pixels[start + (width - 1 - x)] = value;
        }
    }

    let end = *data.get(pos).ok_or(ValidationError::MissingEndFrame)?;
    if end != END_FRAME {
        return Err(ValidationError::MissingEndFrame.into());
    }
    pos += 1;

    debug!(
        "decoded {}x{} raster ({} bytes of opcodes)",
        width, height, pos
    );
    Ok((pixels, pos))
}

/// Picks the shortest opcode able to represent a run of `run` identical
/// `index` pixels, and how many pixels of that run it actually consumes.
fn select_opcode(index: u8, run: u16, length_bit_count: u8) -> (Opcode, u16) {
    let t = max_short_index(length_bit_count);
    if index <= t && run <= short_run_cap(index, length_bit_count) {
        (Opcode::Short { index, run }, run)
    } else if index == 0 {
        let chunk = run.min(256);
        (Opcode::Blank { run: chunk }, chunk)
    } else {
        let chunk = run.min(256);
        (Opcode::Repeat { run: chunk, index }, chunk)
    }
}

fn write_opcode(out: &mut Vec<u8>, opcode: Opcode, length_bit_count: u8) {
    match opcode {
        Opcode::Short { index, run } => {
            out.push((index << length_bit_count) | ((run - 1) as u8));
        }
        Opcode::Blank { run } => {
            out.push(BLANK);
            out.push((run - 1) as u8);
        }
        Opcode::Repeat { run, index } => {
            out.push(REPEAT);
            out.push((run - 1) as u8);
            out.push(index);
        }
        Opcode::Shift { .. } | Opcode::EndFrame | Opcode::EndRow => {
            unreachable!("the canonical encoder never emits this opcode directly")
        }
    }
}

/// Encodes one already axis-flipped row (left-to-right in opcode-stream
/// order) greedily, per the canonical selection rule, without the
/// trailing `EndRow` byte.
fn encode_row(row: &[u8], length_bit_count: u8) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i < row.len() {
        let index = row[i];
        let mut run = 1u16;
        while i + (run as usize) < row.len() && row[i + run as usize] == index && run < u16::MAX {
            run += 1;
        }
        let (opcode, consumed) = select_opcode(index, run, length_bit_count);
        write_opcode(&mut out, opcode, length_bit_count);
        i += consumed as usize;
    }
    out
}

/// Encodes a top-down, left-to-right indexed raster of `width * height`
/// bytes into a row-opcode stream, terminated by `EndFrame`.
pub fn encode_indexed_raster(
    pixels: &[u8],
    width: usize,
    height: usize,
    length_bit_count: u8,
) -> Result<Vec<u8>, ActError> {
    validate_length_bit_count(length_bit_count)?;
    if pixels.len() != width * height {
        return Err(FormatError::RasterLengthMismatch {
            expected: width * height,
            got: pixels.len(),
        }
        .into());
    }

    let mut out = Vec::new();
    for display_row in (0..height).rev() {
        let start = display_row * width;
        let row = &pixels[start..start + width];
        let flipped: Vec<u8> = row.iter().rev().copied().collect();
        out.extend(encode_row(&flipped, length_bit_count));
        out.push(END_ROW);
    }
    out.push(END_FRAME);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roundtrip(width: usize, height: usize, length_bit_count: u8, pixels: &[u8]) -> Vec<u8> {
        let encoded = encode_indexed_raster(pixels, width, height, length_bit_count).unwrap();
        let (decoded, consumed) =
            decode_indexed_raster(&encoded, width, height, length_bit_count).unwrap();
        assert_eq!(consumed, encoded.len());
        decoded
    }

    #[test]
    fn one_frame_red_square_row() {
        // 16 identical pixels of index 1, length_bit_count = 5: T = 0xFF>>5 = 7,
        // index(1) < T, cap = 1<<5 = 32 >= 16, so one Short opcode covers the row.
        let row = vec![1u8; 16];
        let encoded = encode_row(&row, 5);
        assert_eq!(encoded, vec![(1u8 << 5) | 15]);
        assert_eq!(encoded[0], 0x2F);
    }

    #[test]
    fn blank_run_encoding() {
        let row = vec![0u8; 256];
        let encoded = encode_row(&row, 5);
        assert_eq!(encoded, vec![BLANK, 0xFF]);
    }

    #[test]
    fn shift_code_roundtrip() {
        let mut stream = vec![SHIFT, 3, 0]; // indexShift = 3
        stream.push((2u8 << 5) | 3); // Short: index=2, run=4
        stream.push(END_ROW);
        stream.push(END_FRAME);

        let (pixels, consumed) = decode_indexed_raster(&stream, 4, 1, 5).unwrap();
        assert_eq!(consumed, stream.len());
        assert_eq!(pixels, vec![5, 5, 5, 5]);
    }

    #[test]
    fn shift_extension_byte_must_be_zero() {
        let stream = vec![SHIFT, 3, 1, END_ROW, END_FRAME];
        let result = decode_indexed_raster(&stream, 0, 1, 5);
        assert!(result.is_err());
    }

    #[test]
    fn missing_end_row_is_rejected() {
        let stream = vec![0x20, END_FRAME];
        let result = decode_indexed_raster(&stream, 1, 1, 5);
        assert!(result.is_err());
    }

    #[test]
    fn missing_end_frame_is_rejected() {
        let mut stream = vec![0x20];
        stream.push(END_ROW);
        let result = decode_indexed_raster(&stream, 1, 1, 5);
        assert!(result.is_err());
    }

    #[test]
    fn opcode_overrunning_row_is_rejected() {
        // run of 5 at length_bit_count=5 within a width-3 row
        let stream = vec![(1u8 << 5) | 4, END_ROW, END_FRAME];
        let result = decode_indexed_raster(&stream, 3, 1, 5);
        assert!(result.is_err());
    }

    #[test]
    fn invalid_length_bit_count_is_rejected() {
        let result = decode_indexed_raster(&[END_FRAME], 0, 0, 6);
        assert!(matches!(result, Err(ActError::Format(_))));
    }

    proptest! {
        #[test]
        fn prop_roundtrip_any_raster(
            width in 1usize..=64,
            height in 1usize..=8,
            length_bit_count in 3u8..=5,
            pixels in proptest::collection::vec(0u8..=255, 1..512),
        ) {
            let pixels: Vec<u8> = pixels.into_iter().cycle().take(width * height).collect();
            let decoded = roundtrip(width, height, length_bit_count, &pixels);
            prop_assert_eq!(decoded, pixels);
        }
    }
}

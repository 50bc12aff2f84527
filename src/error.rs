//! Error taxonomy for the ACT codec and composite-image model.
//!
//! Every fallible operation in this crate returns [`ActError`]. The five
//! outer variants correspond to the five error kinds named in the format
//! specification: malformed bytes, illegal geometry, wrong pixel format,
//! illegal model state, and filesystem failure.

use thiserror::Error;

/// Top-level error type returned by every fallible operation in this crate.
#[derive(Debug, Error)]
pub enum ActError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Boundary(#[from] BoundaryError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Malformed bytes: non-canonical jumps, missing terminators, indices
/// that escape their palette, or a frame with no active color source.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("non-canonical frame-offsets jump: expected 0x34, found 0x{found:02X}")]
    BadFrameOffsetsJump { found: u32 },

    #[error("non-canonical palette jump: expected 0x2C, found 0x{found:02X}")]
    BadPaletteJump { found: u32 },

    #[error("row did not close with an EndRow (0xFE) opcode")]
    MissingEndRow,

    #[error("frame did not close with an EndFrame (0xFF) opcode")]
    MissingEndFrame,

    #[error("opcode at row position {position} would write past the row width of {width}")]
    OpcodeOverrunsRow { position: usize, width: usize },

    #[error("palette index {index} is out of range for a palette of {palette_len} colors")]
    IndexOutOfRange { index: usize, palette_len: usize },

    #[error("frame has no active color source and the parent image's use_global_colors is false")]
    NoActiveColorSource,

    #[error("reserved Shift extension byte was non-zero: 0x{value:02X}")]
    NonZeroShiftExtension { value: u8 },
}

/// Geometry that falls outside the ranges the format can represent, or
/// that would violate the bounding-box invariant.
#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("frame dimension {dimension} exceeds the maximum of 256")]
    FrameDimensionTooLarge { dimension: u32 },

    #[error("raster of {width}x{height} is larger than the parent image of {parent_width}x{parent_height}")]
    RasterLargerThanImage {
        width: u32,
        height: u32,
        parent_width: u32,
        parent_height: u32,
    },

    #[error("offset ({x}, {y}) would place the frame outside [0, 256) relative to the image center")]
    OffsetOutOfRange { x: i32, y: i32 },

    #[error("center ({x}, {y}) is outside the image bounds [0, {width}) x [0, {height})")]
    CenterOutOfRange { x: i32, y: i32, width: u32, height: u32 },

    #[error("image size {width}x{height} is outside the valid range [1, 65536]")]
    SizeOutOfRange { width: u32, height: u32 },
}

/// The pixel data or a codec parameter is in the wrong shape for the
/// operation requested.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("expected an 8-bit indexed raster; pixel format was not indexed")]
    NotIndexed,

    #[error("raster length {got} does not match width*height = {expected}")]
    RasterLengthMismatch { expected: usize, got: usize },

    #[error("length_bit_count must be 3, 4, or 5; got {got}")]
    InvalidLengthBitCount { got: u8 },

    #[error("palette length {got} is outside the valid range [1, 256]")]
    PaletteLengthOutOfRange { got: usize },
}

/// The model's current state makes the requested mutation illegal.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot save: image has no file path (it was constructed from a bare buffer or raster)")]
    NoFilePath,

    #[error("path {0:?} does not have a .ACT extension")]
    MissingActExtension(std::path::PathBuf),

    #[error("cannot remove the only remaining frame")]
    LastFrameRemoval,

    #[error("frame count {requested} is outside the valid range [1, 20]")]
    FrameCountOutOfRange { requested: usize },

    #[error("set_count would truncate from {current} to {requested} frames without allow_truncate")]
    TruncationNotAllowed { current: usize, requested: usize },
}

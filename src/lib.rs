//! Reading, editing, and writing LucasArts ACT image files.
//!
//! An ACT file holds one or more rectangular frames, each with its own
//! palette and its own origin offset relative to a shared anchor (the
//! "center"), with pixel data compressed by a small run-length opcode
//! language. This crate decodes and encodes that byte layout and
//! exposes an editable in-memory model: [`image::Image`] owns a
//! [`collection::FrameCollection`] of [`frame::Frame`]s and keeps the
//! composite bounding box consistent under every mutation.
//!
//! XACT — the same byte layout embedded as a payload inside an LFD
//! archive — is accepted wherever a bare byte buffer is: unwrapping the
//! archive container itself is out of scope for this crate.
//!
//! ```no_run
//! use act_image::image::Image;
//!
//! let mut image = Image::from_path("explo1.act")?;
//! image.move_frame(0, -10, -10)?;
//! image.save()?;
//! # Ok::<(), act_image::error::ActError>(())
//! ```

pub mod codec;
pub mod collection;
pub mod error;
pub mod frame;
pub mod image;
pub mod layout;
pub mod opcode;
pub mod raster;

pub use error::ActError;
pub use frame::Frame;
pub use image::Image;

//! The composite multi-frame image (§4.4 of the format specification).
//!
//! An `Image` owns a [`FrameCollection`] and re-derives its own `center`
//! and `size` from the frames' rectangles after every mutation, so the
//! bounding box is never allowed to drift out of sync (§9's back-reference
//! design note: `Frame` holds no parent pointer, so `Image` carries the
//! recompute instead).

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::codec;
use crate::collection::FrameCollection;
use crate::error::{ActError, BoundaryError, StateError, ValidationError};
use crate::frame::Frame;
use crate::raster::{convert_to_indexed, SourceRaster};

/// A complete ACT image: one or more frames sharing a center point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    center: (i32, i32),
    size: (u32, u32),
    frames: FrameCollection,
    global_palette: Option<Vec<[u8; 3]>>,
    use_global_colors: bool,
    file_path: Option<PathBuf>,
}

impl Image {
    /// Builds an image from a single indexed raster: one frame centered
    /// on `(width / 2, height / 2)`, no global palette.
    pub fn from_indexed_raster(
        width: u32,
        height: u32,
        palette: Vec<[u8; 3]>,
        pixels: Vec<u8>,
    ) -> Result<Self, ActError> {
        let frame = Frame::from_indexed_raster(width, height, palette, pixels)?;
        let frames = FrameCollection::new(vec![frame])?;
        let mut image = Image {
            center: (width as i32 / 2, height as i32 / 2),
            size: (width, height),
            frames,
            global_palette: None,
            use_global_colors: false,
            file_path: None,
        };
        image.recompute_bbox();
        Ok(image)
    }

    /// Builds an image from a non-indexed [`SourceRaster`] (1-, 4-, or
    /// 8-bit indexed-with-its-own-palette, or 32-bit BGRA), converting
    /// it against `palette` via nearest-neighbor color matching (§4.6)
    /// before handing the result to [`Self::from_indexed_raster`].
    pub fn from_raster(source: SourceRaster, palette: Vec<[u8; 3]>) -> Result<Self, ActError> {
        let (width, height) = match &source {
            SourceRaster::Indexed { width, height, .. } => (*width, *height),
            SourceRaster::Bgra32 { width, height, .. } => (*width, *height),
        };
        let pixels = convert_to_indexed(&source, &palette)?;
        Self::from_indexed_raster(width, height, palette, pixels)
    }

    /// Reconstructs an image already decoded from file bytes. `center` is
    /// the file header's reported value, used only as a sanity check
    /// against the header's reported size before the bounding box is
    /// recomputed from the frames themselves.
    pub(crate) fn from_decoded_parts(
        center: (i32, i32),
        frames: Vec<Frame>,
        global_palette: Option<Vec<[u8; 3]>>,
        use_global_colors: bool,
    ) -> Result<Self, ActError> {
        let frames = FrameCollection::new(frames)?;
        let mut image = Image {
            center,
            size: (1, 1),
            frames,
            global_palette,
            use_global_colors,
            file_path: None,
        };
        image.recompute_bbox();
        Ok(image)
    }

    /// Reads and decodes a `.ACT` file from disk.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ActError> {
        let path = path.as_ref();
        require_act_extension(path)?;
        let data = fs::read(path)?;
        let mut image = codec::decode_image(&data)?;
        image.file_path = Some(path.to_path_buf());
        Ok(image)
    }

    /// Decodes an image from an already-loaded byte buffer. This is the
    /// same byte layout whether the buffer came from a standalone `.ACT`
    /// file or was extracted from an XACT archive; unwrapping the
    /// archive itself is out of scope here.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ActError> {
        codec::decode_image(data)
    }

    /// Re-derives `center` and `size` from the current frames' rectangles
    /// (§4.4): `left`/`top`/`right`/`bottom` are the bounding box of every
    /// `center + frame.(x, y)` rectangle, `center` is shifted so the box
    /// starts at `(0, 0)`, and `size` is the box's extent.
    fn recompute_bbox(&mut self) {
        let mut left = i32::MAX;
        let mut top = i32::MAX;
        let mut right = i32::MIN;
        let mut bottom = i32::MIN;

        for frame in self.frames.iter() {
            let l = self.center.0 + frame.x();
            let t = self.center.1 + frame.y();
            let r = l + frame.width() as i32 - 1;
            let b = t + frame.height() as i32 - 1;
            left = left.min(l);
            top = top.min(t);
            right = right.max(r);
            bottom = bottom.max(b);
        }

        self.center = (self.center.0 - left, self.center.1 - top);
        self.size = ((right - left + 1) as u32, (bottom - top + 1) as u32);
        debug!(
            "bounding box recomputed: center {:?}, size {:?}",
            self.center, self.size
        );
    }

    pub fn center(&self) -> (i32, i32) {
        self.center
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn frames_iter(&self) -> std::slice::Iter<'_, Frame> {
        self.frames.iter()
    }

    pub fn global_palette(&self) -> Option<&[[u8; 3]]> {
        self.global_palette.as_deref()
    }

    pub fn use_global_colors(&self) -> bool {
        self.use_global_colors
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Enables or disables the global color source. Fails if doing so
    /// would leave any frame with neither its own palette flagged active
    /// nor the global one (§4.4, §7 "no active color source").
    pub fn set_use_global_colors(&mut self, use_global_colors: bool) -> Result<(), ActError> {
        if !use_global_colors {
            for frame in self.frames.iter() {
                if !frame.use_frame_colors() {
                    return Err(ValidationError::NoActiveColorSource.into());
                }
            }
        }
        self.use_global_colors = use_global_colors;
        Ok(())
    }

    /// Replaces the global palette wholesale. Passing `None` clears it;
    /// callers must disable `use_global_colors` first if every frame
    /// relies on it (checked by [`Self::set_use_global_colors`]).
    pub fn set_global_palette(&mut self, palette: Option<Vec<[u8; 3]>>) {
        self.global_palette = palette;
    }

    fn check_frame_color_source(&self, frame: &Frame) -> Result<(), ActError> {
        if !frame.use_frame_colors() && !self.use_global_colors {
            return Err(ValidationError::NoActiveColorSource.into());
        }
        Ok(())
    }

    /// Appends a frame. Triggers a bounding-box recompute.
    pub fn add_frame(&mut self, frame: Frame) -> Result<(), ActError> {
        self.check_frame_color_source(&frame)?;
        self.frames.push(frame)?;
        self.recompute_bbox();
        Ok(())
    }

    /// Inserts a frame at `index`. Triggers a bounding-box recompute.
    pub fn insert_frame(&mut self, index: usize, frame: Frame) -> Result<(), ActError> {
        self.check_frame_color_source(&frame)?;
        self.frames.insert(index, frame)?;
        self.recompute_bbox();
        Ok(())
    }

    /// Replaces the frame at `index` wholesale. Triggers a bounding-box
    /// recompute.
    pub fn replace_frame(&mut self, index: usize, frame: Frame) -> Result<(), ActError> {
        self.check_frame_color_source(&frame)?;
        self.frames.assign(index, frame)?;
        self.recompute_bbox();
        Ok(())
    }

    /// Removes the frame at `index`. Triggers a bounding-box recompute.
    pub fn remove_frame(&mut self, index: usize) -> Result<Frame, ActError> {
        let frame = self.frames.remove(index)?;
        self.recompute_bbox();
        Ok(frame)
    }

    /// Grows or shrinks the frame collection to `n` frames. Triggers a
    /// bounding-box recompute.
    pub fn set_frame_count(&mut self, n: usize, allow_truncate: bool) -> Result<(), ActError> {
        self.frames.set_count(n, allow_truncate)?;
        self.recompute_bbox();
        Ok(())
    }

    /// Moves the frame at `index` to a new offset relative to this
    /// image's center. Triggers a bounding-box recompute.
    pub fn move_frame(&mut self, index: usize, x: i32, y: i32) -> Result<(), ActError> {
        let center = self.center;
        let frame = self
            .frames
            .get_mut(index)
            .ok_or(BoundaryError::OffsetOutOfRange { x, y })?;
        frame.set_offset(x, y, center)?;
        self.recompute_bbox();
        Ok(())
    }

    /// Replaces the raster and palette of the frame at `index`. Does not
    /// change the frame's dimensions, but a bounding-box recompute is run
    /// anyway to keep the invariant trivially easy to reason about.
    pub fn set_frame_raster(
        &mut self,
        index: usize,
        palette: Vec<[u8; 3]>,
        pixels: Vec<u8>,
    ) -> Result<(), ActError> {
        let frame = self
            .frames
            .get_mut(index)
            .ok_or(StateError::FrameCountOutOfRange { requested: index })?;
        frame.set_raster(palette, pixels)?;
        self.recompute_bbox();
        Ok(())
    }

    /// Finds frames whose palette and pixel data are identical to
    /// another frame already in the collection, returning `(i, j)` pairs
    /// with `i < j`. A frame's offset and per-frame color flag are not
    /// considered: two frames placed differently but sharing raster data
    /// still count as duplicates here.
    pub fn duplicate_frames(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for i in 0..self.frames.len() {
            for j in (i + 1)..self.frames.len() {
                let a = self.frames.get(i).unwrap();
                let b = self.frames.get(j).unwrap();
                if a.palette() == b.palette() && a.pixels() == b.pixels() {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }

    /// Writes this image back to the path it was loaded from (or last
    /// saved to). Fails if the image has no associated path.
    pub fn save(&self) -> Result<(), ActError> {
        let path = self.file_path.as_ref().ok_or(StateError::NoFilePath)?;
        self.write_to(path)
    }

    /// Encodes and writes this image to `path`, then remembers `path` as
    /// the image's file path for future [`Self::save`] calls.
    pub fn save_to<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ActError> {
        let path = path.as_ref();
        require_act_extension(path)?;
        self.write_to(path)?;
        self.file_path = Some(path.to_path_buf());
        Ok(())
    }

    fn write_to(&self, path: &Path) -> Result<(), ActError> {
        let bytes = codec::encode_image(self)?;

        if path.exists() {
            let backup = path.with_extension("act.bak");
            fs::copy(path, &backup)?;
            match fs::write(path, &bytes) {
                Ok(()) => {
                    let _ = fs::remove_file(&backup);
                    info!("saved {} bytes to {}", bytes.len(), path.display());
                    Ok(())
                }
                Err(write_err) => {
                    fs::copy(&backup, path)?;
                    let _ = fs::remove_file(&backup);
                    Err(write_err.into())
                }
            }
        } else {
            fs::write(path, &bytes)?;
            info!("saved {} bytes to {}", bytes.len(), path.display());
            Ok(())
        }
    }
}

fn require_act_extension(path: &Path) -> Result<(), ActError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("act") => Ok(()),
        _ => Err(StateError::MissingActExtension(path.to_path_buf()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_palette(n: usize) -> Vec<[u8; 3]> {
        (0..n).map(|i| [i as u8, i as u8, i as u8]).collect()
    }

    #[test]
    fn single_raster_centers_and_sizes_correctly() {
        let image =
            Image::from_indexed_raster(16, 20, gray_palette(2), vec![0u8; 16 * 20]).unwrap();
        assert_eq!(image.center(), (8, 10));
        assert_eq!(image.size(), (16, 20));
    }

    #[test]
    fn moving_a_frame_recomputes_the_bounding_box() {
        let mut image =
            Image::from_indexed_raster(16, 16, gray_palette(2), vec![0u8; 16 * 16]).unwrap();
        image.move_frame(0, 20, 0).unwrap();

        // Single-frame image: the box stays 16x16, just re-anchored
        // around the frame's new rect.
        assert_eq!(image.size(), (16, 16));
        let frame = image.frame(0).unwrap();
        assert_eq!(image.center().0 + frame.x(), 0);
    }

    #[test]
    fn cannot_disable_global_colors_with_no_frame_fallback() {
        let frame = crate::frame::Frame::from_indexed_raster(
            4,
            4,
            gray_palette(2),
            vec![0u8; 16],
        )
        .unwrap();
        let mut image =
            Image::from_decoded_parts((2, 2), vec![frame], Some(gray_palette(2)), true).unwrap();
        image.frames.get_mut(0).unwrap().set_use_frame_colors(false);

        assert!(image.set_use_global_colors(false).is_err());
    }

    #[test]
    fn adding_frame_with_no_color_source_is_rejected() {
        let base =
            crate::frame::Frame::from_indexed_raster(4, 4, gray_palette(2), vec![0u8; 16]).unwrap();
        let mut image = Image::from_decoded_parts((2, 2), vec![base], None, false).unwrap();

        let mut orphan =
            crate::frame::Frame::from_indexed_raster(4, 4, gray_palette(2), vec![0u8; 16]).unwrap();
        orphan.set_use_frame_colors(false);
        assert!(image.add_frame(orphan).is_err());
    }

    #[test]
    fn duplicate_frames_are_detected() {
        let frame = crate::frame::Frame::from_indexed_raster(
            4,
            4,
            gray_palette(2),
            vec![0u8; 16],
        )
        .unwrap();
        let mut image = Image::from_decoded_parts((2, 2), vec![frame.clone()], None, false)
            .unwrap();
        image.add_frame(frame).unwrap();

        assert_eq!(image.duplicate_frames(), vec![(0, 1)]);
    }

    #[test]
    fn builds_from_bgra_raster_via_nearest_neighbor() {
        let palette = gray_palette(2);
        let pixels = vec![[255, 255, 255, 255]; 4]; // B,G,R,A: white, nearest to index 1
        let source = crate::raster::SourceRaster::Bgra32 {
            width: 2,
            height: 2,
            pixels,
        };
        let image = Image::from_raster(source, palette).unwrap();
        assert_eq!(image.frame_count(), 1);
        assert!(image.frame(0).unwrap().pixels().iter().all(|&p| p == 1));
    }
}

//! An ordered, bounded list of frames (§4.3 of the format specification).
//!
//! `FrameCollection` enforces the `[1, 20]` frame-count invariant and
//! nothing else; it holds no reference to the parent [`Image`]. Every
//! method that can change frame count or identity returns a plain
//! `Result` — the caller (`Image`) is responsible for re-running the
//! bounding-box recompute after a successful mutation, per the
//! back-reference design note in spec.md §9.
//!
//! [`Image`]: crate::image::Image

use crate::error::{ActError, StateError};
use crate::frame::Frame;

/// Minimum number of frames an image may hold.
pub const MIN_FRAMES: usize = 1;
/// Maximum number of frames an image may hold.
pub const MAX_FRAMES: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameCollection {
    frames: Vec<Frame>,
}

impl FrameCollection {
    pub fn new(frames: Vec<Frame>) -> Result<Self, ActError> {
        if !(MIN_FRAMES..=MAX_FRAMES).contains(&frames.len()) {
            return Err(StateError::FrameCountOutOfRange {
                requested: frames.len(),
            }
            .into());
        }
        Ok(FrameCollection { frames })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        false // invariant: always >= MIN_FRAMES
    }

    pub fn get(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Frame> {
        self.frames.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Frame> {
        self.frames.iter()
    }

    /// Appends a frame to the end of the collection.
    pub fn push(&mut self, frame: Frame) -> Result<(), ActError> {
        if self.frames.len() >= MAX_FRAMES {
            return Err(StateError::FrameCountOutOfRange {
                requested: self.frames.len() + 1,
            }
            .into());
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Inserts a frame at `index`, shifting later frames back.
    pub fn insert(&mut self, index: usize, frame: Frame) -> Result<(), ActError> {
        if self.frames.len() >= MAX_FRAMES {
            return Err(StateError::FrameCountOutOfRange {
                requested: self.frames.len() + 1,
            }
            .into());
        }
        if index > self.frames.len() {
            return Err(StateError::FrameCountOutOfRange { requested: index }.into());
        }
        self.frames.insert(index, frame);
        Ok(())
    }

    /// Replaces the frame at `index` wholesale.
    pub fn assign(&mut self, index: usize, frame: Frame) -> Result<(), ActError> {
        let slot = self
            .frames
            .get_mut(index)
            .ok_or(StateError::FrameCountOutOfRange { requested: index })?;
        *slot = frame;
        Ok(())
    }

    /// Removes the frame at `index`. Fails if this is the only
    /// remaining frame.
    pub fn remove(&mut self, index: usize) -> Result<Frame, ActError> {
        if self.frames.len() <= MIN_FRAMES {
            return Err(StateError::LastFrameRemoval.into());
        }
        if index >= self.frames.len() {
            return Err(StateError::FrameCountOutOfRange { requested: index }.into());
        }
        Ok(self.frames.remove(index))
    }

    /// Resizes the collection to `n` frames. Growing appends trailing
    /// blank (1x1, fully transparent) frames. Shrinking removes
    /// trailing frames, and requires `allow_truncate` since it discards
    /// data.
    pub fn set_count(&mut self, n: usize, allow_truncate: bool) -> Result<(), ActError> {
        if !(MIN_FRAMES..=MAX_FRAMES).contains(&n) {
            return Err(StateError::FrameCountOutOfRange { requested: n }.into());
        }
        if n > self.frames.len() {
            for _ in self.frames.len()..n {
                self.frames.push(blank_frame()?);
            }
        } else if n < self.frames.len() {
            if !allow_truncate {
                return Err(StateError::TruncationNotAllowed {
                    current: self.frames.len(),
                    requested: n,
                }
                .into());
            }
            self.frames.truncate(n);
        }
        Ok(())
    }
}

fn blank_frame() -> Result<Frame, ActError> {
    Frame::from_indexed_raster(1, 1, vec![[0, 0, 0]], vec![0])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_frame() -> Frame {
        Frame::from_indexed_raster(4, 4, vec![[1, 2, 3], [4, 5, 6]], vec![0; 16]).unwrap()
    }

    #[test]
    fn cannot_remove_last_frame() {
        let mut collection = FrameCollection::new(vec![dummy_frame()]).unwrap();
        assert!(collection.remove(0).is_err());
    }

    #[test]
    fn grows_with_blank_frames() {
        let mut collection = FrameCollection::new(vec![dummy_frame()]).unwrap();
        collection.set_count(5, false).unwrap();
        assert_eq!(collection.len(), 5);
    }

    #[test]
    fn truncation_requires_permission() {
        let mut collection =
            FrameCollection::new(vec![dummy_frame(), dummy_frame(), dummy_frame()]).unwrap();
        assert!(collection.set_count(1, false).is_err());
        assert!(collection.set_count(1, true).is_ok());
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn caps_at_twenty_frames() {
        let mut collection = FrameCollection::new(vec![dummy_frame(); 20]).unwrap();
        assert!(collection.push(dummy_frame()).is_err());
    }
}

//! Read-only byte-range diagnostics for a decoded [`Image`](crate::image::Image).
//!
//! Grounded in the teacher crate's `analyse_grp`: that tool builds a
//! list of labeled, non-overlapping byte ranges consumed by each GRP
//! section, sorts them, and reports gaps and overlaps. This module does
//! the same thing for ACT's section layout, but as a pure function
//! returning a structured report instead of printing to stdout — this
//! crate has no CLI of its own, so the diagnostic is data, not text.

use crate::codec::{FILE_HEADER_LEN, FRAME_EXTENTS_LEN, FRAME_HEADER_LEN};
use crate::image::Image;

/// One labeled, half-open byte range `[start, end)` within the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub start: usize,
    pub end: usize,
    pub label: String,
}

impl Region {
    fn len(&self) -> usize {
        self.end - self.start
    }
}

/// A byte-range breakdown of an encoded ACT file, built from the
/// decoded [`Image`] model rather than by re-parsing the bytes.
#[derive(Debug, Clone, Default)]
pub struct FileLayout {
    /// All labeled regions, sorted by start offset.
    pub regions: Vec<Region>,
    /// Byte ranges covered by no region.
    pub gaps: Vec<(usize, usize)>,
    /// Pairs of regions whose ranges overlap.
    pub overlaps: Vec<(Region, Region)>,
    /// Total encoded length, per the file header's own bookkeeping.
    pub total_len: usize,
}

/// Computes the [`FileLayout`] of `image` as it would be encoded, given
/// the total length the encoder would produce (callers typically pass
/// `codec::encode_image(image)?.len()`, or the length of a buffer the
/// image was decoded from, to cross-check reserved/trailing bytes).
pub fn analyse(image: &Image, encoded_len: usize) -> FileLayout {
    let frame_count = image.frame_count();
    let mut regions = Vec::new();

    regions.push(Region {
        start: 0,
        end: FILE_HEADER_LEN,
        label: "file header".to_string(),
    });
    regions.push(Region {
        start: FILE_HEADER_LEN,
        end: FILE_HEADER_LEN + frame_count * 4,
        label: "frame offset table".to_string(),
    });

    let mut pos = FILE_HEADER_LEN + frame_count * 4;
    for (i, frame) in image.frames_iter().enumerate() {
        let color_count = frame.color_count();
        let row_stream_len = match frame.encode_rows() {
            Ok(bytes) => bytes.len(),
            Err(_) => 0,
        };

        let header_start = pos;
        let header_end = header_start + FRAME_HEADER_LEN;
        regions.push(Region {
            start: header_start,
            end: header_end,
            label: format!("frame {i} header"),
        });

        let palette_start = header_end;
        let palette_end = palette_start + color_count * 4;
        regions.push(Region {
            start: palette_start,
            end: palette_end,
            label: format!("frame {i} palette ({color_count} colors)"),
        });

        let extents_start = palette_end;
        let extents_end = extents_start + FRAME_EXTENTS_LEN;
        regions.push(Region {
            start: extents_start,
            end: extents_end,
            label: format!("frame {i} extents"),
        });

        let row_stream_start = extents_end;
        let row_stream_end = row_stream_start + row_stream_len;
        regions.push(Region {
            start: row_stream_start,
            end: row_stream_end,
            label: format!("frame {i} row stream"),
        });

        pos = row_stream_end;
    }

    if image.use_global_colors() {
        if let Some(palette) = image.global_palette() {
            regions.push(Region {
                start: pos,
                end: pos + palette.len() * 4,
                label: "global palette".to_string(),
            });
            pos += palette.len() * 4;
        }
    }

    regions.sort_by_key(|r| r.start);

    let overlaps = find_overlaps(&regions);
    let gaps = find_gaps(&regions, encoded_len.max(pos));

    FileLayout {
        regions,
        gaps,
        overlaps,
        total_len: encoded_len,
    }
}

fn find_overlaps(regions: &[Region]) -> Vec<(Region, Region)> {
    let mut overlaps = Vec::new();
    for window in regions.windows(2) {
        let (prev, curr) = (&window[0], &window[1]);
        if curr.start < prev.end {
            overlaps.push((prev.clone(), curr.clone()));
        }
    }
    overlaps
}

fn find_gaps(regions: &[Region], total_len: usize) -> Vec<(usize, usize)> {
    let mut gaps = Vec::new();
    let mut pos = 0usize;
    for region in regions {
        if pos < region.start {
            gaps.push((pos, region.start));
        }
        pos = pos.max(region.end);
    }
    if pos < total_len {
        gaps.push((pos, total_len));
    }
    gaps
}

impl FileLayout {
    /// Total bytes covered by labeled regions (may double-count bytes
    /// inside an overlap).
    pub fn covered_len(&self) -> usize {
        self.regions.iter().map(Region::len).sum()
    }

    pub fn has_gaps(&self) -> bool {
        !self.gaps.is_empty()
    }

    pub fn has_overlaps(&self) -> bool {
        !self.overlaps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_palette(n: usize) -> Vec<[u8; 3]> {
        (0..n).map(|i| [i as u8, i as u8, i as u8]).collect()
    }

    #[test]
    fn one_frame_layout_has_no_gaps_or_overlaps() {
        let image =
            Image::from_indexed_raster(16, 16, gray_palette(2), vec![1u8; 16 * 16]).unwrap();
        let encoded_len = crate::codec::encode_image(&image).unwrap().len();

        let layout = analyse(&image, encoded_len);
        assert!(!layout.has_overlaps());
        assert!(!layout.has_gaps());
        assert_eq!(layout.total_len, encoded_len);
    }

    #[test]
    fn regions_are_labeled_and_sorted() {
        let image =
            Image::from_indexed_raster(16, 16, gray_palette(2), vec![1u8; 16 * 16]).unwrap();
        let layout = analyse(&image, 157);

        assert_eq!(layout.regions.first().unwrap().label, "file header");
        for window in layout.regions.windows(2) {
            assert!(window[0].start <= window[1].start);
        }
    }
}

//! Luma plane cropping.
//!
//! Every supported preview format stores the full-resolution Y plane first, so the
//! decoder input is just the rows and columns of that plane covered by the scan
//! region. Chroma is never read.

use crate::error::DecodeError;
use crate::hardware::Frame;
use crate::region::Rect;
use std::borrow::Cow;

/// Read-only view of the scan region inside a frame's luma plane.
#[derive(Debug)]
pub struct LumaSource<'a> {
    data: &'a [u8],
    data_width: usize,
    data_height: usize,
    left: usize,
    top: usize,
    width: usize,
    height: usize,
}

impl<'a> LumaSource<'a> {
    /// Validate `frame` and crop its luma plane to `rect`.
    ///
    /// The rectangle is intersected with the frame bounds first, so a region that
    /// slightly overhangs the buffer still decodes.
    pub fn new(frame: &'a Frame, rect: Rect) -> Result<Self, DecodeError> {
        if !frame.format.is_luma_first() {
            return Err(DecodeError::UnsupportedFormat(frame.format.clone()));
        }

        let luma_len = frame.luma_len();
        if frame.data.len() < luma_len {
            return Err(DecodeError::FrameTooSmall {
                expected: luma_len,
                actual: frame.data.len(),
            });
        }

        let left = rect.left.clamp(0, frame.width as i32);
        let top = rect.top.clamp(0, frame.height as i32);
        let right = rect.right.clamp(0, frame.width as i32);
        let bottom = rect.bottom.clamp(0, frame.height as i32);
        if right <= left || bottom <= top {
            return Err(DecodeError::CropOutsideFrame);
        }

        Ok(Self {
            data: &frame.data[..luma_len],
            data_width: frame.width as usize,
            data_height: frame.height as usize,
            left: left as usize,
            top: top as usize,
            width: (right - left) as usize,
            height: (bottom - top) as usize,
        })
    }

    /// Width of the cropped region.
    pub fn width(&self) -> u32 {
        self.width as u32
    }

    /// Height of the cropped region.
    pub fn height(&self) -> u32 {
        self.height as u32
    }

    /// Contiguous row-major luma samples of the cropped region.
    ///
    /// Borrows the frame when the crop covers the whole plane.
    pub fn matrix(&self) -> Cow<'a, [u8]> {
        if self.left == 0
            && self.top == 0
            && self.width == self.data_width
            && self.height == self.data_height
        {
            return Cow::Borrowed(self.data);
        }

        let mut matrix = Vec::with_capacity(self.width * self.height);
        for row in self.top..self.top + self.height {
            let start = row * self.data_width + self.left;
            matrix.extend_from_slice(&self.data[start..start + self.width]);
        }
        Cow::Owned(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::PixelFormat;

    fn frame(width: u32, height: u32, format: PixelFormat) -> Frame {
        // Luma sample value encodes its own position: row * 10 + column.
        let mut data: Vec<u8> = (0..height)
            .flat_map(|y| (0..width).map(move |x| (y * 10 + x) as u8))
            .collect();
        data.extend(std::iter::repeat(128).take((width * height / 2) as usize));
        Frame::new(data, width, height, format, 1)
    }

    #[test]
    fn crops_rows_and_columns() {
        let f = frame(6, 4, PixelFormat::Yuv420SemiPlanar);
        let source = LumaSource::new(&f, Rect::new(1, 1, 4, 3)).unwrap();
        assert_eq!((source.width(), source.height()), (3, 2));
        assert_eq!(source.matrix().as_ref(), &[11, 12, 13, 21, 22, 23]);
    }

    #[test]
    fn full_frame_crop_borrows() {
        let f = frame(4, 2, PixelFormat::Yuv422SemiPlanar);
        let source = LumaSource::new(&f, Rect::new(0, 0, 4, 2)).unwrap();
        assert!(matches!(source.matrix(), Cow::Borrowed(_)));
        assert_eq!(source.matrix().len(), 8);
    }

    #[test]
    fn overhanging_rect_is_clipped() {
        let f = frame(4, 4, PixelFormat::Yuv420SemiPlanar);
        let source = LumaSource::new(&f, Rect::new(-2, 2, 9, 9)).unwrap();
        assert_eq!((source.width(), source.height()), (4, 2));
        assert_eq!(source.matrix().as_ref(), &[20, 21, 22, 23, 30, 31, 32, 33]);
    }

    #[test]
    fn vendor_planar_variant_is_accepted() {
        let f = frame(
            4,
            4,
            PixelFormat::Other {
                code: 842094169,
                name: Some("yuv420p".into()),
            },
        );
        assert!(LumaSource::new(&f, Rect::new(0, 0, 2, 2)).is_ok());
    }

    #[test]
    fn rejects_unsupported_format() {
        let f = frame(
            4,
            4,
            PixelFormat::Other {
                code: 4,
                name: Some("rgb565".into()),
            },
        );
        let err = LumaSource::new(&f, Rect::new(0, 0, 2, 2)).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedFormat(_)));
    }

    #[test]
    fn rejects_short_buffer_and_empty_crop() {
        let short = Frame::new(vec![0u8; 10], 4, 4, PixelFormat::Yuv420SemiPlanar, 1);
        assert_eq!(
            LumaSource::new(&short, Rect::new(0, 0, 4, 4)).unwrap_err(),
            DecodeError::FrameTooSmall {
                expected: 16,
                actual: 10
            }
        );

        let f = frame(4, 4, PixelFormat::Yuv420SemiPlanar);
        assert_eq!(
            LumaSource::new(&f, Rect::new(5, 5, 9, 9)).unwrap_err(),
            DecodeError::CropOutsideFrame
        );
    }
}

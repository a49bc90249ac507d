//! Video frames handed to the pipeline.

use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::{InferenceError, InferenceResult};

/// Layout of a raw, tightly packed pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgb8,
    Bgr8,
    Rgba8,
    Gray8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb8 | Self::Bgr8 => 3,
            Self::Rgba8 => 4,
            Self::Gray8 => 1,
        }
    }
}

/// One decoded frame, tagged with its position in the stream.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonically increasing frame index
    pub index: u64,
    /// Pixels in RGB order
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }

    /// Convert a raw buffer of `width * height` pixels into an RGB frame.
    pub fn from_raw(
        index: u64,
        width: u32,
        height: u32,
        format: PixelFormat,
        data: &[u8],
    ) -> InferenceResult<Self> {
        let bpp = format.bytes_per_pixel();
        let expected = width as usize * height as usize * bpp;
        if data.len() != expected {
            return Err(InferenceError::InputShapeMismatch {
                expected: vec![height as usize, width as usize, bpp],
                actual: vec![data.len()],
            });
        }

        let mut image = RgbImage::new(width, height);
        for (pixel, chunk) in image.pixels_mut().zip(data.chunks_exact(bpp)) {
            *pixel = match format {
                PixelFormat::Rgb8 | PixelFormat::Rgba8 => Rgb([chunk[0], chunk[1], chunk[2]]),
                PixelFormat::Bgr8 => Rgb([chunk[2], chunk[1], chunk[0]]),
                PixelFormat::Gray8 => Rgb([chunk[0]; 3]),
            };
        }

        Ok(Self { index, image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_bgr() {
        let frame = Frame::from_raw(4, 2, 1, PixelFormat::Bgr8, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(frame.index, 4);
        assert_eq!(frame.image.get_pixel(0, 0), &Rgb([3, 2, 1]));
        assert_eq!(frame.image.get_pixel(1, 0), &Rgb([6, 5, 4]));
    }

    #[test]
    fn test_from_raw_gray_and_rgba() {
        let gray = Frame::from_raw(0, 1, 1, PixelFormat::Gray8, &[9]).unwrap();
        assert_eq!(gray.image.get_pixel(0, 0), &Rgb([9, 9, 9]));

        let rgba = Frame::from_raw(0, 1, 1, PixelFormat::Rgba8, &[1, 2, 3, 255]).unwrap();
        assert_eq!(rgba.image.get_pixel(0, 0), &Rgb([1, 2, 3]));
    }

    #[test]
    fn test_from_raw_rejects_short_buffer() {
        let err = Frame::from_raw(0, 2, 2, PixelFormat::Rgb8, &[0; 5]).unwrap_err();
        assert!(matches!(err, InferenceError::InputShapeMismatch { .. }));
    }
}

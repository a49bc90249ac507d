//! Image-to-tensor preprocessing shared by all stages.

use image::{Rgb, RgbImage};
use nalgebra::Point2;
use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::error::{InferenceError, InferenceResult};
use crate::stage::affine::AffineTransform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// Per-channel `(value - mean) * scale`, applied in `order`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub scale: [f32; 3],
    pub order: ChannelOrder,
}

impl Normalization {
    /// InsightFace convention: BGR, `(v - 127.5) / 128`.
    pub const INSIGHTFACE: Self = Self {
        mean: [127.5; 3],
        scale: [1.0 / 128.0; 3],
        order: ChannelOrder::Bgr,
    };

    /// RGB scaled to [0, 1].
    pub const UNIT: Self = Self {
        mean: [0.0; 3],
        scale: [1.0 / 255.0; 3],
        order: ChannelOrder::Rgb,
    };
}

impl Default for Normalization {
    fn default() -> Self {
        Self::INSIGHTFACE
    }
}

/// Warp `image` through `transform` (source pixels to output pixels) into an
/// image of `size`, with bilinear sampling. Pixels that map outside the
/// source stay black.
pub fn warp_affine(
    image: &RgbImage,
    transform: &AffineTransform,
    size: (u32, u32),
) -> InferenceResult<RgbImage> {
    let (src_w, src_h) = image.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err(InferenceError::InvalidInput("empty source image".into()));
    }
    let inverse = transform
        .inverse()
        .ok_or_else(|| InferenceError::InvalidInput("degenerate crop transform".into()))?;

    let max_x = (src_w - 1) as f32;
    let max_y = (src_h - 1) as f32;
    let mut output = RgbImage::from_pixel(size.0, size.1, Rgb([0, 0, 0]));

    for y in 0..size.1 {
        for x in 0..size.0 {
            let src = inverse.apply(Point2::new(x as f32, y as f32));
            if !(src.x >= 0.0 && src.y >= 0.0 && src.x <= max_x && src.y <= max_y) {
                continue;
            }

            let x0 = src.x.floor() as u32;
            let y0 = src.y.floor() as u32;
            let x1 = (x0 + 1).min(src_w - 1);
            let y1 = (y0 + 1).min(src_h - 1);
            let fx = src.x - x0 as f32;
            let fy = src.y - y0 as f32;

            let p00 = image.get_pixel(x0, y0);
            let p10 = image.get_pixel(x1, y0);
            let p01 = image.get_pixel(x0, y1);
            let p11 = image.get_pixel(x1, y1);

            let mut pixel = [0u8; 3];
            for c in 0..3 {
                let v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
                    + p10[c] as f32 * fx * (1.0 - fy)
                    + p01[c] as f32 * (1.0 - fx) * fy
                    + p11[c] as f32 * fx * fy;
                pixel[c] = v.round().clamp(0.0, 255.0) as u8;
            }
            output.put_pixel(x, y, Rgb(pixel));
        }
    }

    Ok(output)
}

/// Convert an RGB image into a normalized `1 x 3 x H x W` tensor.
pub fn to_nchw(image: &RgbImage, normalization: &Normalization) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let channels = match normalization.order {
        ChannelOrder::Rgb => [0, 1, 2],
        ChannelOrder::Bgr => [2, 1, 0],
    };

    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        for (plane, &source) in channels.iter().enumerate() {
            tensor[[0, plane, y as usize, x as usize]] = (pixel[source] as f32
                - normalization.mean[plane])
                * normalization.scale[plane];
        }
    }
    tensor
}

//! 2-D affine transforms used to crop and align faces.

use nalgebra::{Matrix2, Matrix3, Point2, Vector2};

use crate::tracker::{Keypoints, Rect};

/// Side length of the canonical aligned face, in pixels.
pub const CANONICAL_FACE_SIZE: u32 = 112;

/// ArcFace reference positions of the five keypoints in the canonical face.
pub const ARCFACE_TEMPLATE: [(f32, f32); 5] = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

/// Affine map of the plane, stored as a homogeneous 3x3 matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    matrix: Matrix3<f32>,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineTransform {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    /// `x' = a*x + b*y + tx`, `y' = c*x + d*y + ty`.
    pub fn new(a: f32, b: f32, tx: f32, c: f32, d: f32, ty: f32) -> Self {
        Self {
            matrix: Matrix3::new(a, b, tx, c, d, ty, 0.0, 0.0, 1.0),
        }
    }

    pub fn scale_translate(sx: f32, sy: f32, tx: f32, ty: f32) -> Self {
        Self::new(sx, 0.0, tx, 0.0, sy, ty)
    }

    /// Aspect-preserving resize of `src` into `dst`, centered with padding.
    pub fn letterbox(src: (u32, u32), dst: (u32, u32)) -> Self {
        let scale = f32::min(dst.0 as f32 / src.0 as f32, dst.1 as f32 / src.1 as f32);
        let offset_x = (dst.0 as f32 - src.0 as f32 * scale) / 2.0;
        let offset_y = (dst.1 as f32 - src.1 as f32 * scale) / 2.0;
        Self::scale_translate(scale, scale, offset_x, offset_y)
    }

    /// Square crop centered on `rect`, with side `max(w, h) * expand`,
    /// resized to `out`. `None` for an empty box.
    pub fn from_box(rect: &Rect, out: (u32, u32), expand: f32) -> Option<Self> {
        let side = rect.width.max(rect.height) * expand;
        if !(side > 0.0) || !side.is_finite() {
            return None;
        }
        let (cx, cy) = rect.center();
        let sx = out.0 as f32 / side;
        let sy = out.1 as f32 / side;
        Some(Self::scale_translate(
            sx,
            sy,
            out.0 as f32 / 2.0 - cx * sx,
            out.1 as f32 / 2.0 - cy * sy,
        ))
    }

    /// Least-squares similarity transform (rotation, uniform scale,
    /// translation) mapping `src` onto `dst` (Umeyama).
    ///
    /// `None` when the point sets differ in length, have fewer than two
    /// points, or `src` is degenerate.
    pub fn estimate_similarity(src: &[Point2<f32>], dst: &[Point2<f32>]) -> Option<Self> {
        if src.len() != dst.len() || src.len() < 2 {
            return None;
        }
        let n = src.len() as f32;
        let src_mean = src.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / n;
        let dst_mean = dst.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / n;

        let mut covariance = Matrix2::<f32>::zeros();
        let mut src_variance = 0.0f32;
        for (s, d) in src.iter().zip(dst) {
            let sc = s.coords - src_mean;
            let dc = d.coords - dst_mean;
            covariance += dc * sc.transpose();
            src_variance += sc.norm_squared();
        }
        covariance /= n;
        src_variance /= n;
        if !(src_variance > 1e-6) {
            return None;
        }

        let svd = covariance.svd(true, true);
        let (u, v_t) = (svd.u?, svd.v_t?);
        let mut signs = Vector2::new(1.0f32, 1.0);
        if covariance.determinant() < 0.0 {
            signs[1] = -1.0;
        }

        let rotation = u * Matrix2::from_diagonal(&signs) * v_t;
        let scale = svd.singular_values.dot(&signs) / src_variance;
        if !scale.is_finite() || scale <= 0.0 {
            return None;
        }
        let linear = rotation * scale;
        let translation = dst_mean - linear * src_mean;

        Some(Self::new(
            linear[(0, 0)],
            linear[(0, 1)],
            translation.x,
            linear[(1, 0)],
            linear[(1, 1)],
            translation.y,
        ))
    }

    /// This transform followed by a scaling of the output.
    pub fn then_scale(&self, sx: f32, sy: f32) -> Self {
        self.then(&Self::scale_translate(sx, sy, 0.0, 0.0))
    }

    /// This transform followed by `next`.
    pub fn then(&self, next: &AffineTransform) -> Self {
        Self {
            matrix: next.matrix * self.matrix,
        }
    }

    pub fn apply(&self, point: Point2<f32>) -> Point2<f32> {
        let m = &self.matrix;
        Point2::new(
            m[(0, 0)] * point.x + m[(0, 1)] * point.y + m[(0, 2)],
            m[(1, 0)] * point.x + m[(1, 1)] * point.y + m[(1, 2)],
        )
    }

    pub fn inverse(&self) -> Option<Self> {
        self.matrix
            .try_inverse()
            .map(|matrix| Self { matrix })
    }

    /// Axis-aligned bounds of the mapped corners of `rect`.
    pub fn map_rect(&self, rect: &Rect) -> Rect {
        let [x1, y1, x2, y2] = rect.to_tlbr();
        let corners = [(x1, y1), (x2, y1), (x1, y2), (x2, y2)].map(|(x, y)| self.apply(Point2::new(x, y)));
        let (mut min_x, mut min_y) = (f32::INFINITY, f32::INFINITY);
        let (mut max_x, mut max_y) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
        for p in corners {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Rect::from_tlbr(min_x, min_y, max_x, max_y)
    }

    pub fn matrix(&self) -> &Matrix3<f32> {
        &self.matrix
    }
}

/// Frame-to-canonical transform for a face.
///
/// Aligns the five keypoints onto [`ARCFACE_TEMPLATE`] when they are present
/// and well-formed, otherwise falls back to a square crop around the box.
pub fn align_face(bbox: &Rect, keypoints: Option<&Keypoints>) -> Option<AffineTransform> {
    let template = ARCFACE_TEMPLATE.map(|(x, y)| Point2::new(x, y));
    keypoints
        .and_then(|kps| AffineTransform::estimate_similarity(kps, &template))
        .or_else(|| {
            AffineTransform::from_box(bbox, (CANONICAL_FACE_SIZE, CANONICAL_FACE_SIZE), 1.0)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Point2<f32>, b: Point2<f32>) -> bool {
        (a - b).norm() < 1e-3
    }

    #[test]
    fn test_letterbox_wide_frame() {
        let t = AffineTransform::letterbox((128, 64), (64, 64));
        assert!(close(t.apply(Point2::new(0.0, 0.0)), Point2::new(0.0, 16.0)));
        assert!(close(t.apply(Point2::new(128.0, 64.0)), Point2::new(64.0, 48.0)));
    }

    #[test]
    fn test_inverse_round_trips() {
        let t = AffineTransform::new(0.8, -0.6, 12.0, 0.6, 0.8, -4.0);
        let inv = t.inverse().unwrap();
        let p = Point2::new(33.0, 71.0);
        assert!(close(inv.apply(t.apply(p)), p));
    }

    #[test]
    fn test_singular_transform_has_no_inverse() {
        let t = AffineTransform::new(0.0, 0.0, 1.0, 0.0, 0.0, 1.0);
        assert!(t.inverse().is_none());
    }

    #[test]
    fn test_from_box_centers_face() {
        let rect = Rect::new(10.0, 10.0, 50.0, 50.0);
        let t = AffineTransform::from_box(&rect, (112, 112), 1.0).unwrap();
        assert!(close(t.apply(Point2::new(35.0, 35.0)), Point2::new(56.0, 56.0)));
        assert!(close(t.apply(Point2::new(10.0, 10.0)), Point2::new(0.0, 0.0)));
        assert!(AffineTransform::from_box(&Rect::default(), (112, 112), 1.0).is_none());
    }

    #[test]
    fn test_similarity_recovers_known_transform() {
        let truth = AffineTransform::new(1.6, -1.2, 30.0, 1.2, 1.6, -8.0);
        let src: Vec<Point2<f32>> = ARCFACE_TEMPLATE
            .iter()
            .map(|&(x, y)| Point2::new(x, y))
            .collect();
        let dst: Vec<Point2<f32>> = src.iter().map(|&p| truth.apply(p)).collect();

        let estimated = AffineTransform::estimate_similarity(&src, &dst).unwrap();
        for (&s, &d) in src.iter().zip(&dst) {
            assert!((estimated.apply(s) - d).norm() < 1e-2);
        }
    }

    #[test]
    fn test_similarity_rejects_degenerate_points() {
        let src = [Point2::new(5.0, 5.0); 5];
        let dst = ARCFACE_TEMPLATE.map(|(x, y)| Point2::new(x, y));
        assert!(AffineTransform::estimate_similarity(&src, &dst).is_none());
    }

    #[test]
    fn test_align_face_uses_keypoints_when_present() {
        // Keypoints laid out exactly like the template, shifted by (100, 50).
        let kps = ARCFACE_TEMPLATE.map(|(x, y)| Point2::new(x + 100.0, y + 50.0));
        let bbox = Rect::new(100.0, 50.0, 112.0, 112.0);
        let t = align_face(&bbox, Some(&kps)).unwrap();
        assert!(close(t.apply(kps[2]), Point2::new(56.0252, 71.7366)));

        let fallback = align_face(&bbox, None).unwrap();
        assert!(close(fallback.apply(Point2::new(156.0, 106.0)), Point2::new(56.0, 56.0)));
    }

    #[test]
    fn test_map_rect() {
        let t = AffineTransform::scale_translate(2.0, 2.0, 1.0, 1.0);
        let rect = t.map_rect(&Rect::new(0.0, 0.0, 10.0, 5.0));
        assert_eq!(rect, Rect::new(1.0, 1.0, 20.0, 10.0));
    }
}

//! Builder for creating Detection objects from various input formats.

use nalgebra::Point2;

use crate::stage::Embedding;
use crate::tracker::{Detection, Keypoints, Rect};

/// Builder for creating `Detection` objects from various box conventions.
#[derive(Debug, Clone, Default)]
pub struct DetectionBuilder {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
    keypoints: Option<Keypoints>,
    embedding: Option<Embedding>,
}

impl DetectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bounding box in TLBR format (x1, y1, x2, y2).
    pub fn tlbr(mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        self.x1 = x1;
        self.y1 = y1;
        self.x2 = x2;
        self.y2 = y2;
        self
    }

    /// Set bounding box in XYWH format (center_x, center_y, width, height).
    pub fn xywh(mut self, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        self.x1 = cx - w / 2.0;
        self.y1 = cy - h / 2.0;
        self.x2 = cx + w / 2.0;
        self.y2 = cy + h / 2.0;
        self
    }

    /// Set bounding box in TLWH format (left, top, width, height).
    pub fn tlwh(mut self, x: f32, y: f32, w: f32, h: f32) -> Self {
        self.x1 = x;
        self.y1 = y;
        self.x2 = x + w;
        self.y2 = y + h;
        self
    }

    /// Set the confidence score.
    pub fn score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    /// Set the five coarse keypoints from `(x, y)` pairs.
    pub fn keypoints(mut self, points: [(f32, f32); 5]) -> Self {
        self.keypoints = Some(points.map(|(x, y)| Point2::new(x, y)));
        self
    }

    /// Attach an appearance embedding, L2-normalized on build.
    pub fn embedding(mut self, values: Vec<f32>) -> Self {
        self.embedding = Embedding::normalized(values);
        self
    }

    pub fn build(self) -> Detection {
        Detection {
            bbox: Rect::from_tlbr(self.x1, self.y1, self.x2, self.y2),
            score: self.score,
            keypoints: self.keypoints,
            embedding: self.embedding,
        }
    }
}

//! Detection-to-track association.

use nalgebra::Point2;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::stage::Embedding;
use crate::tracker::rect::{Rect, iou_batch};
use crate::tracker::track::Track;

/// Five coarse facial keypoints: left eye, right eye, nose, left and right mouth corners.
pub type Keypoints = [Point2<f32>; 5];

/// One face candidate produced by a detector for a single frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Face box in frame pixels
    pub bbox: Rect,
    /// Detection confidence
    pub score: f32,
    /// Coarse keypoints, when the detector emits them
    pub keypoints: Option<Keypoints>,
    /// Appearance embedding, when the detection source provides one
    pub embedding: Option<Embedding>,
}

impl Detection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Self {
        Self::from_rect(Rect::from_tlbr(x1, y1, x2, y2), score)
    }

    pub fn from_rect(bbox: Rect, score: f32) -> Self {
        Self {
            bbox,
            score,
            keypoints: None,
            embedding: None,
        }
    }

    pub fn with_keypoints(mut self, keypoints: Keypoints) -> Self {
        self.keypoints = Some(keypoints);
        self
    }

    pub fn with_embedding(mut self, embedding: Embedding) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// Association score of every track against every detection, shape (tracks, detections).
///
/// The score is plain IoU unless both sides carry an embedding, in which case
/// it blends IoU with cosine similarity mapped to [0, 1]:
/// `(1 - w) * iou + w * (cos + 1) / 2`.
pub fn association_scores(
    tracks: &[&Track],
    detections: &[Detection],
    embedding_weight: f32,
) -> Array2<f32> {
    let track_boxes: Vec<Rect> = tracks.iter().map(|t| t.bbox()).collect();
    let det_boxes: Vec<Rect> = detections.iter().map(|d| d.bbox).collect();
    let ious = iou_batch(&track_boxes, &det_boxes);

    Array2::from_shape_fn((tracks.len(), detections.len()), |(i, j)| {
        let track = tracks[i];
        let det = &detections[j];
        let iou = ious[[i, j]];
        match (track.embedding(), det.embedding.as_ref()) {
            (Some(a), Some(b)) if a.len() == b.len() => {
                let similarity = (a.cosine_similarity(b) + 1.0) / 2.0;
                (1.0 - embedding_weight) * iou + embedding_weight * similarity
            }
            _ => iou,
        }
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentResult {
    /// (row, column) pairs
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

impl AssignmentResult {
    fn from_matches(matches: Vec<(usize, usize)>, rows: usize, cols: usize) -> Self {
        let mut row_used = vec![false; rows];
        let mut col_used = vec![false; cols];
        for &(r, c) in &matches {
            row_used[r] = true;
            col_used[c] = true;
        }
        Self {
            matches,
            unmatched_tracks: (0..rows).filter(|&r| !row_used[r]).collect(),
            unmatched_detections: (0..cols).filter(|&c| !col_used[c]).collect(),
        }
    }
}

/// Greedy highest-score-first matching.
///
/// Repeatedly takes the best remaining pair whose score is at least
/// `min_score`. Equal scores go to the lower row, then the lower column.
/// Not globally optimal under dense overlap, but bounded and predictable.
pub fn greedy_assignment(scores: &Array2<f32>, min_score: f32) -> AssignmentResult {
    let (rows, cols) = scores.dim();

    let mut candidates: Vec<(usize, usize, f32)> = scores
        .indexed_iter()
        .filter(|&(_, &s)| s >= min_score)
        .map(|((r, c), &s)| (r, c, s))
        .collect();
    // Stable sort keeps row-major order among ties.
    candidates.sort_by(|a, b| b.2.total_cmp(&a.2));

    let mut row_used = vec![false; rows];
    let mut col_used = vec![false; cols];
    let mut matches = Vec::new();
    for (r, c, _) in candidates {
        if row_used[r] || col_used[c] {
            continue;
        }
        row_used[r] = true;
        col_used[c] = true;
        matches.push((r, c));
    }

    AssignmentResult::from_matches(matches, rows, cols)
}

/// Globally optimal matching (Jonker-Volgenant) on `1 - score`, keeping only
/// pairs whose score is at least `min_score`.
pub fn optimal_assignment(scores: &Array2<f32>, min_score: f32) -> AssignmentResult {
    let (rows, cols) = scores.dim();
    if rows == 0 || cols == 0 {
        return AssignmentResult::from_matches(Vec::new(), rows, cols);
    }

    let size = rows.max(cols);
    let mut padded = Array2::<f64>::from_elem((size, size), 1e6);
    for ((r, c), &s) in scores.indexed_iter() {
        padded[[r, c]] = if s >= min_score { 1.0 - s as f64 } else { 1e3 };
    }

    let matches = match lapjv::lapjv(&padded) {
        Ok((row_to_col, _)) => row_to_col
            .iter()
            .enumerate()
            .filter(|&(r, &c)| r < rows && c < cols && scores[[r, c]] >= min_score)
            .map(|(r, &c)| (r, c))
            .collect(),
        // Solver failure degrades to greedy rather than dropping every match.
        Err(_) => return greedy_assignment(scores, min_score),
    };

    AssignmentResult::from_matches(matches, rows, cols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_greedy_picks_best_pair_first() {
        // Row 0 prefers column 0, but row 1 has the strongest claim on it.
        let scores = array![[0.6, 0.5], [0.9, 0.1]];
        let result = greedy_assignment(&scores, 0.3);
        assert_eq!(result.matches, vec![(1, 0), (0, 1)]);
        assert!(result.unmatched_tracks.is_empty());
        assert!(result.unmatched_detections.is_empty());
    }

    #[test]
    fn test_greedy_respects_threshold() {
        let scores = array![[0.2, 0.0], [0.0, 0.8]];
        let result = greedy_assignment(&scores, 0.3);
        assert_eq!(result.matches, vec![(1, 1)]);
        assert_eq!(result.unmatched_tracks, vec![0]);
        assert_eq!(result.unmatched_detections, vec![0]);
    }

    #[test]
    fn test_greedy_tie_break_is_row_major() {
        let scores = array![[0.7, 0.7], [0.7, 0.7]];
        let result = greedy_assignment(&scores, 0.3);
        assert_eq!(result.matches, vec![(0, 0), (1, 1)]);
    }

    #[test]
    fn test_empty_inputs() {
        let no_tracks = Array2::<f32>::zeros((0, 3));
        let result = greedy_assignment(&no_tracks, 0.3);
        assert_eq!(result.unmatched_detections, vec![0, 1, 2]);

        let no_dets = Array2::<f32>::zeros((2, 0));
        let result = optimal_assignment(&no_dets, 0.3);
        assert_eq!(result.unmatched_tracks, vec![0, 1]);
    }

    #[test]
    fn test_optimal_beats_greedy_on_crossed_pairs() {
        // Greedy takes (0, 0) = 0.9 and strands row 1; optimal pairs both.
        let scores = array![[0.9, 0.8], [0.85, 0.0]];
        let greedy = greedy_assignment(&scores, 0.3);
        assert_eq!(greedy.matches, vec![(0, 0)]);

        let optimal = optimal_assignment(&scores, 0.3);
        let mut matches = optimal.matches.clone();
        matches.sort();
        assert_eq!(matches, vec![(0, 1), (1, 0)]);
    }
}

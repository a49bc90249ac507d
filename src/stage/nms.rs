use crate::tracker::Detection;

/// Greedy non-maximum suppression.
///
/// Candidates are ranked by confidence, descending; the sort is stable, so on
/// equal confidence the earlier candidate ranks first. A candidate survives
/// unless its IoU with an already kept, higher-ranked box exceeds
/// `iou_threshold`.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        if keep
            .iter()
            .all(|kept| kept.bbox.iou(&candidate.bbox) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}

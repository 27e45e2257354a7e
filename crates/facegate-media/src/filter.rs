//! Confidence filtering.

use facegate_models::{Detection, DetectionSet};

/// Whether a detection survives a `score_min` threshold.
///
/// Detections without a score always survive.
#[inline]
pub fn passes(detection: &Detection, score_min: f32) -> bool {
    match detection.score {
        None => true,
        Some(score) => score >= score_min,
    }
}

/// Keep detections whose score is absent or at least `score_min`, in order.
pub fn filter_by_score(set: DetectionSet, score_min: f32) -> DetectionSet {
    set.retain(|d| passes(d, score_min))
}

#[cfg(test)]
mod tests {
    use super::*;
    use facegate_models::{BoundingBox, Keypoints};

    fn det(x: i64, score: Option<f32>) -> Detection {
        Detection::new(
            BoundingBox::new(x, 0, x + 10, 10).unwrap(),
            score,
            Keypoints::new(),
        )
    }

    fn sample() -> DetectionSet {
        DetectionSet::new(vec![
            det(0, Some(0.95)),
            det(10, Some(0.5)),
            det(20, None),
            det(30, Some(0.8)),
            det(40, Some(0.0)),
        ])
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let kept = filter_by_score(sample(), 0.8);
        let xs: Vec<i64> = kept.iter().map(|d| d.bbox.x1()).collect();
        assert_eq!(xs, vec![0, 20, 30]);
    }

    #[test]
    fn test_absent_score_survives_max_threshold() {
        let kept = filter_by_score(sample(), 1.0);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.as_slice()[0].score, None);
    }

    #[test]
    fn test_zero_threshold_keeps_everything() {
        assert_eq!(filter_by_score(sample(), 0.0), sample());
    }

    #[test]
    fn test_filter_is_idempotent() {
        for threshold in [0.0, 0.3, 0.5, 0.8, 0.95, 1.0] {
            let once = filter_by_score(sample(), threshold);
            let twice = filter_by_score(once.clone(), threshold);
            assert_eq!(once, twice, "threshold {}", threshold);
        }
    }
}

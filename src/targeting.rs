// src/targeting.rs
//
// Picks the person to follow out of a frame's detections and works out
// where it sits relative to the image centre (the lidar look direction).

use crate::config::TargetStrategy;
use crate::types::{BoundingBox, Detection};
use serde::Serialize;

/// Strategy for choosing the tracked target among a frame's detections.
pub trait TargetSelector {
    fn select<'a>(&self, detections: &'a [Detection]) -> Option<&'a Detection>;

    fn name(&self) -> &'static str;
}

/// Trusts the detector's ordering: the first detection wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstDetection;

impl TargetSelector for FirstDetection {
    fn select<'a>(&self, detections: &'a [Detection]) -> Option<&'a Detection> {
        detections.first()
    }

    fn name(&self) -> &'static str {
        "first"
    }
}

/// Ignores the detector's ordering and takes the most confident box.
#[derive(Debug, Clone, Copy, Default)]
pub struct HighestConfidence;

impl TargetSelector for HighestConfidence {
    fn select<'a>(&self, detections: &'a [Detection]) -> Option<&'a Detection> {
        detections.iter().max_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    fn name(&self) -> &'static str {
        "highest_confidence"
    }
}

pub fn selector_for(strategy: TargetStrategy) -> Box<dyn TargetSelector> {
    match strategy {
        TargetStrategy::First => Box::new(FirstDetection),
        TargetStrategy::HighestConfidence => Box::new(HighestConfidence),
    }
}

/// Signed offset of `target` from `center` along one image axis.
/// Positive means the target lies towards larger coordinates.
pub fn single_axis_delta(center: f32, target: f32) -> f32 {
    target - center
}

/// Boundary-inclusive point-in-box test.
pub fn point_in_rectangle(point: (f32, f32), bbox: &BoundingBox) -> bool {
    bbox.contains(point)
}

/// Geometry of the selected target for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TargetState {
    pub bbox: BoundingBox,
    pub center: (f32, f32),
    /// Horizontal pixel offset; drives yaw.
    pub yaw_delta: f32,
    /// Vertical pixel offset; diagnostics only.
    pub pitch_delta: f32,
    /// The lidar points at the image centre, so its reading belongs to
    /// this target only when the centre falls inside the box.
    pub ranging_on_target: bool,
}

impl TargetState {
    pub fn locate(detection: &Detection, image_center: (f32, f32)) -> Self {
        let center = detection.center();
        Self {
            bbox: detection.bbox,
            center,
            yaw_delta: single_axis_delta(image_center.0, center.0),
            pitch_delta: single_axis_delta(image_center.1, center.1),
            ranging_on_target: point_in_rectangle(image_center, &detection.bbox),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMAGE_CENTER: (f32, f32) = (640.0, 360.0);

    fn det(left: f32, top: f32, right: f32, bottom: f32, confidence: f32) -> Detection {
        Detection::new(BoundingBox::new(left, top, right, bottom), confidence)
    }

    #[test]
    fn test_first_detection_keeps_detector_priority() {
        let detections = vec![det(0.0, 0.0, 10.0, 10.0, 0.4), det(0.0, 0.0, 20.0, 20.0, 0.9)];
        let picked = FirstDetection.select(&detections).unwrap();
        assert_eq!(picked.confidence, 0.4);
        assert!(FirstDetection.select(&[]).is_none());
    }

    #[test]
    fn test_highest_confidence_strategy() {
        let detections = vec![det(0.0, 0.0, 10.0, 10.0, 0.4), det(0.0, 0.0, 20.0, 20.0, 0.9)];
        let picked = HighestConfidence.select(&detections).unwrap();
        assert_eq!(picked.confidence, 0.9);
        assert_eq!(
            selector_for(TargetStrategy::HighestConfidence).name(),
            "highest_confidence"
        );
    }

    #[test]
    fn test_deltas_are_sign_aware() {
        assert_eq!(single_axis_delta(640.0, 690.0), 50.0);
        assert_eq!(single_axis_delta(640.0, 600.0), -40.0);

        let target = TargetState::locate(&det(640.0, 160.0, 740.0, 520.0, 0.8), IMAGE_CENTER);
        assert_eq!(target.center, (690.0, 340.0));
        assert_eq!(target.yaw_delta, 50.0);
        assert_eq!(target.pitch_delta, -20.0);
    }

    #[test]
    fn test_on_target_when_box_contains_center() {
        let target = TargetState::locate(&det(500.0, 200.0, 800.0, 600.0, 0.8), IMAGE_CENTER);
        assert!(target.ranging_on_target);
    }

    #[test]
    fn test_off_target_when_box_fully_outside() {
        let target = TargetState::locate(&det(900.0, 100.0, 1100.0, 500.0, 0.8), IMAGE_CENTER);
        assert!(!target.ranging_on_target);
    }

    #[test]
    fn test_off_target_when_overlapping_without_center() {
        // Spans the centre row but stops short of the centre column.
        let target = TargetState::locate(&det(300.0, 200.0, 639.0, 600.0, 0.8), IMAGE_CENTER);
        assert!(!target.ranging_on_target);
    }

    #[test]
    fn test_boundary_touching_center_counts_as_on_target() {
        let touching_right_edge = det(400.0, 200.0, 640.0, 600.0, 0.8);
        let touching_top_edge = det(500.0, 360.0, 800.0, 600.0, 0.8);
        assert!(TargetState::locate(&touching_right_edge, IMAGE_CENTER).ranging_on_target);
        assert!(TargetState::locate(&touching_top_edge, IMAGE_CENTER).ranging_on_target);
    }
}

// src/types.rs

use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates (y grows downward).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            right,
            top,
            bottom,
        }
    }

    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(
            cx - width / 2.0,
            cy - height / 2.0,
            cx + width / 2.0,
            cy + height / 2.0,
        )
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Inclusive on every edge: a point lying exactly on the border is inside.
    pub fn contains(&self, point: (f32, f32)) -> bool {
        let (x, y) = point;
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }
}

/// One perceived target in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f32) -> Self {
        Self { bbox, confidence }
    }

    pub fn center(&self) -> (f32, f32) {
        self.bbox.center()
    }
}

/// Raw BGR image, row-major, 3 bytes per pixel.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub timestamp_ms: f64,
}

impl Frame {
    pub fn blank(width: usize, height: usize, timestamp_ms: f64) -> Self {
        Self {
            data: vec![0u8; width * height * 3],
            width,
            height,
            timestamp_ms,
        }
    }
}

/// Everything the detector produced for one control cycle.
///
/// `detections` are in the detector's priority order; index 0 is the
/// preferred target.
#[derive(Debug, Clone)]
pub struct FrameResult {
    pub detections: Vec<Detection>,
    pub fps: f32,
    pub frame: Frame,
}

impl FrameResult {
    pub fn has_detections(&self) -> bool {
        !self.detections.is_empty()
    }
}

/// A single lidar reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum RangingSample {
    /// Distance in metres, always > 0.
    Distance(f32),
    NoReading,
}

impl RangingSample {
    /// Drivers report `<= 0` (or garbage) when they have nothing.
    pub fn from_meters(meters: f32) -> Self {
        if meters.is_finite() && meters > 0.0 {
            Self::Distance(meters)
        } else {
            Self::NoReading
        }
    }

    pub fn distance(&self) -> Option<f32> {
        match self {
            Self::Distance(d) => Some(*d),
            Self::NoReading => None,
        }
    }
}

/// Bounded outputs handed to the vehicle for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ControlCommand {
    /// Yaw rate, degrees per second (positive = clockwise / right).
    pub yaw_command: f32,
    /// Forward body velocity, metres per second (positive = towards target).
    pub forward_velocity_command: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_center_and_size() {
        let bbox = BoundingBox::new(100.0, 50.0, 300.0, 450.0);
        assert_eq!(bbox.center(), (200.0, 250.0));
        assert_eq!(bbox.width(), 200.0);
        assert_eq!(bbox.height(), 400.0);
        assert_eq!(BoundingBox::from_center(200.0, 250.0, 200.0, 400.0), bbox);
    }

    #[test]
    fn test_ranging_sample_sentinel() {
        assert_eq!(RangingSample::from_meters(3.0).distance(), Some(3.0));
        assert_eq!(RangingSample::from_meters(0.0), RangingSample::NoReading);
        assert_eq!(RangingSample::from_meters(-1.0), RangingSample::NoReading);
        assert_eq!(RangingSample::from_meters(f32::NAN), RangingSample::NoReading);
    }
}

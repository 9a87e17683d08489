// src/vision/yolo.rs
//
// YOLOv8 pre/post-processing that does not need the runtime: letterbox a
// BGR frame into the 640x640 RGB CHW tensor, and turn the [1, 84, 8400]
// output back into person boxes in frame coordinates.

use super::resample::resize_bilinear;
use crate::types::{BoundingBox, Detection};
use tracing::debug;

pub const INPUT_SIZE: usize = 640;
const CLASSES: usize = 80;
const PREDICTIONS: usize = 8400;
const PERSON_CLASS: usize = 0;
const NMS_IOU: f32 = 0.45;
const PAD_VALUE: u8 = 114;

/// How a frame was fitted into the square network input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    pub fn fit(src_w: usize, src_h: usize) -> Self {
        let target = INPUT_SIZE as f32;
        let scale = (target / src_w as f32).min(target / src_h as f32);
        let scaled_w = (src_w as f32 * scale) as usize;
        let scaled_h = (src_h as f32 * scale) as usize;
        Self {
            scale,
            pad_x: (INPUT_SIZE - scaled_w) as f32 / 2.0,
            pad_y: (INPUT_SIZE - scaled_h) as f32 / 2.0,
        }
    }

    /// Network coordinates back to frame coordinates.
    pub fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// BGR HWC bytes -> normalised RGB CHW tensor data.
pub fn preprocess(bgr: &[u8], src_w: usize, src_h: usize) -> (Vec<f32>, Letterbox) {
    let letterbox = Letterbox::fit(src_w, src_h);
    let scaled_w = (src_w as f32 * letterbox.scale) as usize;
    let scaled_h = (src_h as f32 * letterbox.scale) as usize;
    let resized = resize_bilinear(bgr, src_w, src_h, scaled_w, scaled_h);

    let mut canvas = vec![PAD_VALUE; INPUT_SIZE * INPUT_SIZE * 3];
    let (off_x, off_y) = (letterbox.pad_x as usize, letterbox.pad_y as usize);
    for y in 0..scaled_h {
        let src_row = &resized[y * scaled_w * 3..(y + 1) * scaled_w * 3];
        let dst_start = ((y + off_y) * INPUT_SIZE + off_x) * 3;
        canvas[dst_start..dst_start + scaled_w * 3].copy_from_slice(src_row);
    }

    let plane = INPUT_SIZE * INPUT_SIZE;
    let mut input = vec![0.0f32; 3 * plane];
    for (i, pixel) in canvas.chunks_exact(3).enumerate() {
        // BGR in, RGB planes out.
        input[i] = pixel[2] as f32 / 255.0;
        input[plane + i] = pixel[1] as f32 / 255.0;
        input[2 * plane + i] = pixel[0] as f32 / 255.0;
    }

    (input, letterbox)
}

/// Person boxes from raw network output, most confident first.
pub fn postprocess(
    output: &[f32],
    letterbox: Letterbox,
    frame_size: (usize, usize),
    conf_thresh: f32,
) -> Vec<Detection> {
    if output.len() < (4 + CLASSES) * PREDICTIONS {
        debug!("Unexpected YOLO output length {}", output.len());
        return Vec::new();
    }
    let (max_x, max_y) = (frame_size.0 as f32, frame_size.1 as f32);
    let mut detections = Vec::new();

    for i in 0..PREDICTIONS {
        let (best_class, confidence) = (0..CLASSES)
            .map(|c| (c, output[PREDICTIONS * (4 + c) + i]))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
        if best_class != PERSON_CLASS || confidence < conf_thresh {
            continue;
        }

        let cx = output[i];
        let cy = output[PREDICTIONS + i];
        let w = output[PREDICTIONS * 2 + i];
        let h = output[PREDICTIONS * 3 + i];
        let (left, top) = letterbox.unmap(cx - w / 2.0, cy - h / 2.0);
        let (right, bottom) = letterbox.unmap(cx + w / 2.0, cy + h / 2.0);

        let bbox = BoundingBox::new(
            left.clamp(0.0, max_x),
            top.clamp(0.0, max_y),
            right.clamp(0.0, max_x),
            bottom.clamp(0.0, max_y),
        );
        if bbox.area() > 0.0 {
            detections.push(Detection::new(bbox, confidence));
        }
    }

    nms(detections, NMS_IOU)
}

/// Greedy NMS; the result is sorted by confidence, descending.
pub fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| iou(&k.bbox, &det.bbox) < iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let overlap = BoundingBox::new(
        a.left.max(b.left),
        a.top.max(b.top),
        a.right.min(b.right),
        a.bottom.min(b.bottom),
    );
    let intersection = overlap.area();
    let union = a.area() + b.area() - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

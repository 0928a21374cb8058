//! SCRFD face detector
//!
//! Decodes the multi-stride outputs of an InsightFace SCRFD model into
//! bounding boxes, confidence scores and 5-point landmarks in source image
//! coordinates.

use anyhow::{Context, Result};
use image::DynamicImage;
use openvino::InferRequest;
use tracing::{debug, warn};

use super::host::{write_input_tensor, read_output_f32, SafeCompiledModel};
use super::preprocess::{self, Letterbox};

/// One raw detection in source image coordinates.
#[derive(Debug, Clone)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub landmarks: [(f32, f32); 5],
}

/// SCRFD detector bound to a fixed input resolution.
pub struct FaceDetector {
    model: SafeCompiledModel,
    input_size: (u32, u32),
    confidence_threshold: f32,
    nms_threshold: f32,
}

impl FaceDetector {
    pub fn new(model: SafeCompiledModel, input_size: (u32, u32), confidence_threshold: f32) -> Self {
        Self {
            model,
            input_size,
            confidence_threshold,
            nms_threshold: 0.4,
        }
    }

    /// Detect faces in a decoded image.
    pub fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        let (tensor, letterbox) = preprocess::detection_tensor(image, self.input_size);

        let mut request = self
            .model
            .create_infer_request()
            .context("Failed to create detector infer request")?;

        let (w, h) = self.input_size;
        write_input_tensor(&mut request, &tensor, &[1, 3, h as i64, w as i64])?;
        request.infer().context("Detector inference failed")?;

        let candidates = self.decode_outputs(&request, &letterbox)?;
        let kept = nms(candidates, self.nms_threshold);
        debug!("Detected {} faces after NMS", kept.len());

        Ok(kept)
    }

    /// Decode the stride-ordered SCRFD output tensors.
    ///
    /// The det_10g model emits 9 tensors: scores, box distances and landmark
    /// offsets for strides 8/16/32. Smaller exports use other layouts, which
    /// are recognized by output count.
    fn decode_outputs(&self, request: &InferRequest, letterbox: &Letterbox) -> Result<Vec<FaceBox>> {
        let mut output_count = 0;
        while output_count < 20 && request.get_output_tensor_by_index(output_count).is_ok() {
            output_count += 1;
        }

        let (stride_count, has_landmarks, anchors_per_cell) = match output_count {
            6 => (3, false, 2),
            9 => (3, true, 2),
            10 => (5, false, 1),
            15 => (5, true, 1),
            other => {
                warn!("Unexpected SCRFD output count {}, assuming det_10g layout", other);
                (3, true, 2)
            }
        };

        let strides: &[i32] = if stride_count == 3 {
            &[8, 16, 32]
        } else {
            &[8, 16, 32, 64, 128]
        };

        let (input_w, input_h) = (self.input_size.0 as i32, self.input_size.1 as i32);
        let mut boxes = Vec::new();

        for (idx, &stride) in strides.iter().enumerate() {
            let scores = read_output_f32(request, idx)?;
            let distances = read_output_f32(request, idx + stride_count)?;
            let landmark_offsets = if has_landmarks {
                Some(read_output_f32(request, idx + stride_count * 2)?)
            } else {
                None
            };

            let cells_x = input_w / stride;
            let cells_y = input_h / stride;

            for cell in 0..(cells_x * cells_y) {
                let cx = ((cell % cells_x) * stride) as f32;
                let cy = ((cell / cells_x) * stride) as f32;

                for anchor in 0..anchors_per_cell {
                    let i = (cell * anchors_per_cell + anchor) as usize;
                    let Some(&score) = scores.get(i) else { continue };
                    if score < self.confidence_threshold {
                        continue;
                    }
                    if distances.len() < (i + 1) * 4 {
                        continue;
                    }

                    // Box regression is distance-to-sides of the anchor center.
                    let s = stride as f32;
                    let x1 = cx - distances[i * 4] * s;
                    let y1 = cy - distances[i * 4 + 1] * s;
                    let x2 = cx + distances[i * 4 + 2] * s;
                    let y2 = cy + distances[i * 4 + 3] * s;

                    let mut landmarks = [(0.0f32, 0.0f32); 5];
                    if let Some(ref offsets) = landmark_offsets {
                        if offsets.len() >= (i + 1) * 10 {
                            for (j, point) in landmarks.iter_mut().enumerate() {
                                *point = letterbox.to_source(
                                    cx + offsets[i * 10 + j * 2] * s,
                                    cy + offsets[i * 10 + j * 2 + 1] * s,
                                );
                            }
                        }
                    }

                    let (x1, y1) = letterbox.to_source(x1, y1);
                    let (x2, y2) = letterbox.to_source(x2, y2);

                    boxes.push(clamp_to_image(
                        FaceBox {
                            x1,
                            y1,
                            x2,
                            y2,
                            confidence: score,
                            landmarks,
                        },
                        letterbox.source_width,
                        letterbox.source_height,
                    ));
                }
            }
        }

        debug!("{} candidates above threshold before NMS", boxes.len());
        Ok(boxes)
    }
}

/// Clamp a detection to the source image bounds.
fn clamp_to_image(mut face: FaceBox, width: u32, height: u32) -> FaceBox {
    let (w, h) = (width as f32, height as f32);
    face.x1 = face.x1.clamp(0.0, w);
    face.y1 = face.y1.clamp(0.0, h);
    face.x2 = face.x2.clamp(0.0, w);
    face.y2 = face.y2.clamp(0.0, h);
    face
}

/// Greedy non-maximum suppression, highest confidence first.
pub(crate) fn nms(mut boxes: Vec<FaceBox>, threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|kept| iou(kept, &candidate) <= threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Intersection over union of two boxes.
pub(crate) fn iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = (a.x2 - a.x1) * (a.y2 - a.y1) + (b.x2 - b.x1) * (b.y2 - b.y1) - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> FaceBox {
        FaceBox {
            x1,
            y1,
            x2,
            y2,
            confidence,
            landmarks: [(0.0, 0.0); 5],
        }
    }

    #[test]
    fn iou_of_half_overlapping_boxes() {
        let a = face(0.0, 0.0, 10.0, 10.0, 0.9);
        let b = face(5.0, 5.0, 15.0, 15.0, 0.8);
        // intersection 25, union 175
        assert!((iou(&a, &b) - 25.0 / 175.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = face(0.0, 0.0, 10.0, 10.0, 0.9);
        let b = face(20.0, 20.0, 30.0, 30.0, 0.8);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn nms_suppresses_overlapping_duplicates() {
        let boxes = vec![
            face(0.0, 0.0, 10.0, 10.0, 0.7),
            face(1.0, 1.0, 11.0, 11.0, 0.95),
            face(100.0, 100.0, 120.0, 120.0, 0.8),
        ];
        let kept = nms(boxes, 0.4);
        assert_eq!(kept.len(), 2);
        // Highest-confidence duplicate survives.
        assert!((kept[0].confidence - 0.95).abs() < 1e-6);
    }

    #[test]
    fn clamp_keeps_boxes_within_image() {
        let clamped = clamp_to_image(face(-5.0, -3.0, 700.0, 500.0, 0.9), 640, 480);
        assert_eq!(clamped.x1, 0.0);
        assert_eq!(clamped.y1, 0.0);
        assert_eq!(clamped.x2, 640.0);
        assert_eq!(clamped.y2, 480.0);
    }
}

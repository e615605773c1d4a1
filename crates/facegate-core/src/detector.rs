//! Face detector behind a capability trait, with an ONNX Runtime
//! implementation for single-scale anchor-grid detection models
//! (two outputs: per-anchor class scores and normalized corner boxes).

use std::path::Path;

use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use thiserror::Error;

use crate::preprocess::{resize_bilinear, GrayFrame};
use crate::types::FaceBox;

// --- Named constants ---
const DETECTOR_INPUT_WIDTH: usize = 320;
const DETECTOR_INPUT_HEIGHT: usize = 240;
const DETECTOR_MEAN: f32 = 127.0;
const DETECTOR_STD: f32 = 128.0;
/// Default minimum face score; overridable via [`OnnxFaceDetector::with_score_threshold`].
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.7;
const NMS_IOU_THRESHOLD: f32 = 0.3;
/// Values per anchor in the score tensor: [background, face].
const SCORE_CLASSES: usize = 2;
/// Values per anchor in the box tensor: [x1, y1, x2, y2], normalized.
const BOX_COORDS: usize = 4;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Capability interface for face detection: zero or more boxes per frame,
/// in the detector's own ordering. Callers that want "the" face take the
/// first box and must not re-sort.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &GrayFrame) -> Result<Vec<FaceBox>, DetectorError>;
}

/// ONNX-backed face detector.
pub struct OnnxFaceDetector {
    session: Session,
    score_threshold: f32,
    /// (scores, boxes) output tensor indices, discovered at load time.
    output_indices: (usize, usize),
}

impl OnnxFaceDetector {
    /// Load the detection model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded face detection model"
        );

        if output_names.len() < 2 {
            return Err(DetectorError::InferenceFailed(format!(
                "detection model requires 2 outputs (scores, boxes), got {}",
                output_names.len()
            )));
        }

        let output_indices = discover_output_indices(&output_names);
        tracing::debug!(?output_indices, "detector output tensor mapping");

        Ok(Self {
            session,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            output_indices,
        })
    }

    /// Override the minimum face score (default 0.7).
    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }

    /// Preprocess a grayscale frame into the detector's NCHW input tensor.
    fn preprocess(frame: &GrayFrame) -> Array4<f32> {
        let resized = resize_bilinear(
            &frame.data,
            frame.width as usize,
            frame.height as usize,
            DETECTOR_INPUT_WIDTH,
            DETECTOR_INPUT_HEIGHT,
        );

        let mut tensor =
            Array4::<f32>::zeros((1, 3, DETECTOR_INPUT_HEIGHT, DETECTOR_INPUT_WIDTH));
        for y in 0..DETECTOR_INPUT_HEIGHT {
            for x in 0..DETECTOR_INPUT_WIDTH {
                let pixel = resized[y * DETECTOR_INPUT_WIDTH + x] as f32;
                let normalized = (pixel - DETECTOR_MEAN) / DETECTOR_STD;
                // Grayscale → 3-channel: replicate Y into R, G, B.
                tensor[[0, 0, y, x]] = normalized;
                tensor[[0, 1, y, x]] = normalized;
                tensor[[0, 2, y, x]] = normalized;
            }
        }
        tensor
    }
}

impl FaceDetector for OnnxFaceDetector {
    fn detect(&mut self, frame: &GrayFrame) -> Result<Vec<FaceBox>, DetectorError> {
        let input = Self::preprocess(frame);
        let (scores_idx, boxes_idx) = self.output_indices;
        let score_threshold = self.score_threshold;

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, scores) = outputs[scores_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("scores: {e}")))?;
        let (_, boxes) = outputs[boxes_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("boxes: {e}")))?;

        let candidates = decode_anchors(
            scores,
            boxes,
            frame.width as f32,
            frame.height as f32,
            score_threshold,
        );

        Ok(nms(candidates, NMS_IOU_THRESHOLD))
    }
}

/// Discover (scores, boxes) output indices by name, falling back to the
/// conventional positional ordering [scores, boxes] when the names are
/// not recognized.
fn discover_output_indices(names: &[String]) -> (usize, usize) {
    let scores = names.iter().position(|n| n == "scores");
    let boxes = names.iter().position(|n| n == "boxes");
    match (scores, boxes) {
        (Some(s), Some(b)) => (s, b),
        _ => {
            tracing::info!(
                ?names,
                "detector output names not recognized, using positional mapping [0]=scores, [1]=boxes"
            );
            (0, 1)
        }
    }
}

/// Decode per-anchor (scores, boxes) tensors into frame-space boxes.
///
/// `scores` holds [background, face] pairs per anchor; `boxes` holds
/// normalized [x1, y1, x2, y2] corners per anchor. Anchors are visited in
/// tensor order.
fn decode_anchors(
    scores: &[f32],
    boxes: &[f32],
    frame_w: f32,
    frame_h: f32,
    threshold: f32,
) -> Vec<FaceBox> {
    let num_anchors = (scores.len() / SCORE_CLASSES).min(boxes.len() / BOX_COORDS);
    let mut detections = Vec::new();

    for i in 0..num_anchors {
        let score = scores[i * SCORE_CLASSES + 1];
        if score <= threshold {
            continue;
        }

        let off = i * BOX_COORDS;
        let x1 = boxes[off] * frame_w;
        let y1 = boxes[off + 1] * frame_h;
        let x2 = boxes[off + 2] * frame_w;
        let y2 = boxes[off + 3] * frame_h;

        detections.push(FaceBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            score,
        });
    }

    detections
}

/// Non-Maximum Suppression: drop boxes overlapping a higher-scoring box.
/// The survivors come back highest score first — that ordering is the
/// detector's native ordering as far as callers are concerned.
fn nms(mut detections: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    detections.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<FaceBox> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| iou(k, &det) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

/// Intersection-over-Union of two boxes.
fn iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width * a.height + b.width * b.height - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_box(x: f32, y: f32, w: f32, h: f32, score: f32) -> FaceBox {
        FaceBox {
            x,
            y,
            width: w,
            height: h,
            score,
        }
    }

    #[test]
    fn test_iou_identical() {
        let a = make_box(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = make_box(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_box(50.0, 50.0, 10.0, 10.0, 1.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = make_box(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_box(5.0, 0.0, 10.0, 10.0, 1.0);
        // Overlap 50, union 150.
        assert!((iou(&a, &b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let dets = vec![
            make_box(0.0, 0.0, 100.0, 100.0, 0.9),
            make_box(5.0, 5.0, 100.0, 100.0, 0.8),
            make_box(200.0, 200.0, 50.0, 50.0, 0.7),
        ];
        let kept = nms(dets, NMS_IOU_THRESHOLD);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].score - 0.9).abs() < 1e-6);
        assert!((kept[1].score - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_orders_by_score() {
        let dets = vec![
            make_box(0.0, 0.0, 10.0, 10.0, 0.75),
            make_box(100.0, 100.0, 10.0, 10.0, 0.95),
        ];
        let kept = nms(dets, NMS_IOU_THRESHOLD);
        assert!((kept[0].score - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], NMS_IOU_THRESHOLD).is_empty());
    }

    #[test]
    fn test_decode_anchors_filters_by_threshold() {
        // Two anchors: one background-dominant, one face-dominant.
        let scores = [0.9, 0.1, 0.2, 0.8];
        let boxes = [
            0.0, 0.0, 0.5, 0.5, // anchor 0
            0.25, 0.25, 0.75, 0.75, // anchor 1
        ];
        let dets = decode_anchors(&scores, &boxes, 320.0, 240.0, DEFAULT_SCORE_THRESHOLD);
        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        assert!((d.score - 0.8).abs() < 1e-6);
        // Normalized corners scaled to frame space.
        assert!((d.x - 80.0).abs() < 1e-3);
        assert!((d.y - 60.0).abs() < 1e-3);
        assert!((d.width - 160.0).abs() < 1e-3);
        assert!((d.height - 120.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_anchors_empty_tensors() {
        let dets = decode_anchors(&[], &[], 320.0, 240.0, DEFAULT_SCORE_THRESHOLD);
        assert!(dets.is_empty());
    }

    #[test]
    fn test_discover_output_indices_named() {
        let names: Vec<String> = ["boxes", "scores"].iter().map(|s| s.to_string()).collect();
        assert_eq!(discover_output_indices(&names), (1, 0));
    }

    #[test]
    fn test_discover_output_indices_positional_fallback() {
        let names: Vec<String> = ["517", "518"].iter().map(|s| s.to_string()).collect();
        assert_eq!(discover_output_indices(&names), (0, 1));
    }
}

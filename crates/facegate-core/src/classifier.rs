//! Identity classifier behind a capability trait, with an ONNX Runtime
//! implementation.
//!
//! The production model takes a 200×200 grayscale face crop and emits one
//! distance-style score per enrolled label (lower = closer to that
//! identity's references). The predicted label is the argmin slot.

use std::path::Path;

use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use thiserror::Error;

use crate::preprocess::CANONICAL_FACE_SIZE;
use crate::types::Prediction;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("face crop must be {expected}×{expected} grayscale, got {actual} bytes")]
    BadCropSize { expected: usize, actual: usize },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Capability interface for identity classification over a canonical
/// 200×200 grayscale face crop.
pub trait FaceClassifier: Send {
    fn predict(&mut self, face: &[u8]) -> Result<Prediction, ClassifierError>;
}

/// ONNX-backed identity classifier.
pub struct OnnxFaceClassifier {
    session: Session,
}

impl OnnxFaceClassifier {
    /// Load the trained classifier model from the given path.
    pub fn load(model_path: &str) -> Result<Self, ClassifierError> {
        if !Path::new(model_path).exists() {
            return Err(ClassifierError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded identity classifier model"
        );

        Ok(Self { session })
    }

    /// Scale a face crop into the classifier's NCHW input tensor
    /// (single channel, pixel range mapped to [0, 1]).
    fn preprocess(face: &[u8]) -> Array4<f32> {
        let size = CANONICAL_FACE_SIZE;
        let mut tensor = Array4::<f32>::zeros((1, 1, size, size));
        for y in 0..size {
            for x in 0..size {
                tensor[[0, 0, y, x]] = face[y * size + x] as f32 / 255.0;
            }
        }
        tensor
    }
}

impl FaceClassifier for OnnxFaceClassifier {
    fn predict(&mut self, face: &[u8]) -> Result<Prediction, ClassifierError> {
        let expected = CANONICAL_FACE_SIZE * CANONICAL_FACE_SIZE;
        if face.len() != expected {
            return Err(ClassifierError::BadCropSize {
                expected: CANONICAL_FACE_SIZE,
                actual: face.len(),
            });
        }

        let input = Self::preprocess(face);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, distances) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("distances: {e}")))?;

        let (label, confidence) = nearest_label(distances).ok_or_else(|| {
            ClassifierError::InferenceFailed("classifier produced no label scores".into())
        })?;

        Ok(Prediction { label, confidence })
    }
}

/// Pick the slot with the smallest distance. Slot index = trained label
/// (0 = unauthorized class, 1 = authorized identity).
fn nearest_label(distances: &[f32]) -> Option<(i32, f32)> {
    let mut best: Option<(i32, f32)> = None;
    for (i, &d) in distances.iter().enumerate() {
        match best {
            Some((_, prev)) if d >= prev => {}
            _ => best = Some((i as i32, d)),
        }
    }
    best
}

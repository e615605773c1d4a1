use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box for a detected face, in source-frame pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Detector confidence in [0, 1]. Higher = more likely a face.
    pub score: f32,
}

/// Classifier output for one face crop.
///
/// `confidence` is a distance-style score: lower means a *stronger* match.
/// This follows the convention of nearest-reference face classifiers; do
/// not invert it when swapping classifier families.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: i32,
    pub confidence: f32,
}

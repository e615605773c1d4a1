//! facegate-core — Face detection and identity classification pipeline.
//!
//! Detection and classification run via ONNX Runtime behind capability
//! traits, so the daemon (and its tests) can swap either model out. The
//! authentication decision rule itself is a pure function over the
//! classifier output.

pub mod classifier;
pub mod decision;
pub mod detector;
pub mod preprocess;
pub mod types;

pub use classifier::{FaceClassifier, OnnxFaceClassifier};
pub use decision::{decide, Verdict};
pub use detector::{FaceDetector, OnnxFaceDetector};
pub use preprocess::GrayFrame;
pub use types::{FaceBox, Prediction};

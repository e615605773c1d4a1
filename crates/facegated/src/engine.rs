//! Verification engine on a dedicated inference thread.
//!
//! ONNX sessions are mutable and the models load once, so all inference
//! runs on one OS thread; HTTP handlers reach it through a clone-safe
//! mpsc/oneshot handle.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use facegate_core::classifier::{ClassifierError, FaceClassifier, OnnxFaceClassifier};
use facegate_core::decision;
use facegate_core::detector::{DetectorError, FaceDetector, OnnxFaceDetector};
use facegate_core::preprocess::{GrayFrame, PreprocessError};
use facegate_core::Verdict;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid image: {0}")]
    InvalidImage(#[from] PreprocessError),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("engine thread exited")]
    ChannelClosed,
}

impl EngineError {
    /// Input-quality failures the caller can correct (HTTP 400); anything
    /// else is an internal processing failure (HTTP 500).
    pub fn is_client_fault(&self) -> bool {
        matches!(self, EngineError::InvalidImage(_) | EngineError::NoFaceDetected)
    }
}

/// Decision constants applied after classification. Defaults to the
/// built-in rule; overridable through configuration.
#[derive(Debug, Clone, Copy)]
pub struct DecisionPolicy {
    pub authorized_label: i32,
    pub match_threshold: f32,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            authorized_label: decision::AUTHORIZED_LABEL,
            match_threshold: decision::MATCH_THRESHOLD,
        }
    }
}

/// Result of one verification: the verdict plus the raw classifier output
/// it was derived from.
#[derive(Debug, Clone, Copy)]
pub struct VerifyOutcome {
    pub verdict: Verdict,
    pub label: i32,
    pub confidence: f32,
}

enum EngineRequest {
    Verify {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<VerifyOutcome, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Run the full verification pipeline on an encoded image.
    pub async fn verify(&self, image: Vec<u8>) -> Result<VerifyOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Verify {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Load both ONNX models and spawn the engine thread. Fails fast if
/// either model is missing or malformed.
pub fn spawn_engine(
    detector_path: &str,
    classifier_path: &str,
    detect_score_threshold: f32,
    policy: DecisionPolicy,
) -> Result<EngineHandle, EngineError> {
    let detector =
        OnnxFaceDetector::load(detector_path)?.with_score_threshold(detect_score_threshold);
    tracing::info!(path = detector_path, "face detector loaded");

    let classifier = OnnxFaceClassifier::load(classifier_path)?;
    tracing::info!(path = classifier_path, "identity classifier loaded");

    Ok(spawn_engine_with(
        Box::new(detector),
        Box::new(classifier),
        policy,
    ))
}

/// Spawn the engine thread around caller-supplied detector and classifier
/// implementations. Tests inject stand-ins here; production goes through
/// [`spawn_engine`].
pub fn spawn_engine_with(
    mut detector: Box<dyn FaceDetector>,
    mut classifier: Box<dyn FaceClassifier>,
    policy: DecisionPolicy,
) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Verify { image, reply } => {
                        let result = run_verify(
                            detector.as_mut(),
                            classifier.as_mut(),
                            policy,
                            &image,
                        );
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}

/// Decode → intensity → equalize → detect → crop first face → classify →
/// decide. The first box in the detector's returned order is used as-is;
/// the pipeline never re-sorts detections.
fn run_verify(
    detector: &mut dyn FaceDetector,
    classifier: &mut dyn FaceClassifier,
    policy: DecisionPolicy,
    image: &[u8],
) -> Result<VerifyOutcome, EngineError> {
    let mut frame = GrayFrame::decode(image)?;
    frame.equalize();

    let faces = detector.detect(&frame)?;
    let Some(face) = faces.first() else {
        return Err(EngineError::NoFaceDetected);
    };
    tracing::debug!(
        candidates = faces.len(),
        score = face.score,
        "face selected for classification"
    );

    let crop = frame.crop_face(face);
    let prediction = classifier.predict(&crop)?;
    let verdict = decision::decide_with(
        &prediction,
        policy.authorized_label,
        policy.match_threshold,
    );

    tracing::info!(
        label = prediction.label,
        confidence = prediction.confidence,
        verdict = %verdict,
        "verification decided"
    );

    Ok(VerifyOutcome {
        verdict,
        label: prediction.label,
        confidence: prediction.confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use facegate_core::types::{FaceBox, Prediction};

    struct StaticDetector {
        boxes: Vec<FaceBox>,
    }

    impl FaceDetector for StaticDetector {
        fn detect(&mut self, _frame: &GrayFrame) -> Result<Vec<FaceBox>, DetectorError> {
            Ok(self.boxes.clone())
        }
    }

    struct StaticClassifier {
        prediction: Prediction,
    }

    impl FaceClassifier for StaticClassifier {
        fn predict(&mut self, _face: &[u8]) -> Result<Prediction, ClassifierError> {
            Ok(self.prediction)
        }
    }

    fn face_box() -> FaceBox {
        FaceBox {
            x: 8.0,
            y: 8.0,
            width: 32.0,
            height: 32.0,
            score: 0.9,
        }
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::GrayImage::from_pixel(64, 64, image::Luma([200]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        img.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    fn handle(boxes: Vec<FaceBox>, prediction: Prediction) -> EngineHandle {
        spawn_engine_with(
            Box::new(StaticDetector { boxes }),
            Box::new(StaticClassifier { prediction }),
            DecisionPolicy::default(),
        )
    }

    #[tokio::test]
    async fn test_verify_authenticated() {
        let engine = handle(
            vec![face_box()],
            Prediction {
                label: decision::AUTHORIZED_LABEL,
                confidence: 12.5,
            },
        );
        let outcome = engine.verify(png_bytes()).await.unwrap();
        assert_eq!(outcome.verdict, Verdict::Authenticated);
        assert_eq!(outcome.label, decision::AUTHORIZED_LABEL);
        assert!((outcome.confidence - 12.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_verify_rejects_at_threshold_boundary() {
        let engine = handle(
            vec![face_box()],
            Prediction {
                label: decision::AUTHORIZED_LABEL,
                confidence: decision::MATCH_THRESHOLD,
            },
        );
        let outcome = engine.verify(png_bytes()).await.unwrap();
        assert_eq!(outcome.verdict, Verdict::NotAuthenticated);
    }

    #[tokio::test]
    async fn test_verify_no_face() {
        let engine = handle(
            vec![],
            Prediction {
                label: 0,
                confidence: 0.0,
            },
        );
        let err = engine.verify(png_bytes()).await.unwrap_err();
        assert!(matches!(err, EngineError::NoFaceDetected));
        assert!(err.is_client_fault());
    }

    #[tokio::test]
    async fn test_verify_invalid_image() {
        let engine = handle(
            vec![face_box()],
            Prediction {
                label: 0,
                confidence: 0.0,
            },
        );
        let err = engine.verify(b"not an image".to_vec()).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidImage(_)));
        assert!(err.is_client_fault());
    }

    #[tokio::test]
    async fn test_classifier_failure_is_not_client_fault() {
        struct FailingClassifier;
        impl FaceClassifier for FailingClassifier {
            fn predict(&mut self, _face: &[u8]) -> Result<Prediction, ClassifierError> {
                Err(ClassifierError::InferenceFailed("boom".into()))
            }
        }

        let engine = spawn_engine_with(
            Box::new(StaticDetector {
                boxes: vec![face_box()],
            }),
            Box::new(FailingClassifier),
            DecisionPolicy::default(),
        );
        let err = engine.verify(png_bytes()).await.unwrap_err();
        assert!(matches!(err, EngineError::Classifier(_)));
        assert!(!err.is_client_fault());
    }
}

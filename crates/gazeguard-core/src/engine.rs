//! Detection + encoding pipeline behind the [`FaceEncoder`] seam.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, Embedding};
use std::path::Path;
use thiserror::Error;

/// SCRFD detection model file name inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name inside the model directory.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// A face region together with its descriptor.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// Turns an image into one descriptor per detected face.
pub trait FaceEncoder {
    /// Detect and encode every face in an interleaved RGB image, most confident first.
    fn encode_faces(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<DetectedFace>, EngineError>;
}

/// SCRFD + ArcFace running on ONNX Runtime.
pub struct FaceEngine {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl FaceEngine {
    /// Load both models from `model_dir`. Fails fast if either is missing.
    pub fn load(model_dir: &Path) -> Result<Self, EngineError> {
        let detector = FaceDetector::load(&model_dir.join(SCRFD_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(ARCFACE_MODEL_FILE))?;
        tracing::info!(dir = %model_dir.display(), "face engine ready");
        Ok(Self { detector, recognizer })
    }
}

impl FaceEncoder for FaceEngine {
    fn encode_faces(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<DetectedFace>, EngineError> {
        let boxes = self.detector.detect(rgb, width, height)?;

        let mut faces = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            let embedding = self.recognizer.extract(rgb, width, height, &bbox)?;
            faces.push(DetectedFace { bbox, embedding });
        }

        tracing::debug!(count = faces.len(), width, height, "encoded faces");
        Ok(faces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_reports_missing_detector_first() {
        let err = FaceEngine::load(Path::new("/nonexistent/gazeguard-models"))
            .err()
            .expect("missing models must fail");
        match err {
            EngineError::Detector(DetectorError::ModelNotFound(path)) => {
                assert!(path.ends_with(SCRFD_MODEL_FILE), "path = {path}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

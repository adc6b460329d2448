//! gazeguard-core: face detection, recognition and roster matching.
//!
//! Uses SCRFD for face detection and ArcFace for face descriptors,
//! both running via ONNX Runtime for CPU inference.

pub mod alignment;
pub mod detector;
pub mod engine;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use detector::FaceDetector;
pub use engine::{DetectedFace, EngineError, FaceEncoder, FaceEngine};
pub use recognizer::FaceRecognizer;
pub use types::{BoundingBox, Embedding, MatchResult, Matcher, NearestMatcher, MATCH_TOLERANCE};

/// Default ONNX model directory: `$XDG_DATA_HOME/gazeguard/models`, falling
/// back to `~/.local/share/gazeguard/models`, then `./models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|home| PathBuf::from(home).join(".local/share")))
        .map(|data| data.join("gazeguard/models"))
        .unwrap_or_else(|_| PathBuf::from("models"))
}

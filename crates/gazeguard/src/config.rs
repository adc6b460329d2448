use std::path::PathBuf;

/// Runtime configuration, loaded from environment variables.
///
/// Every setting has a default, so running with no configuration reproduces
/// the stock layout: `./gazeguard_photos` in, `./gazeguard_attendance` out,
/// first V4L2 camera.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory of reference photos, one person per file.
    pub photos_dir: PathBuf,
    /// Directory the daily attendance workbooks are written to.
    pub attendance_dir: PathBuf,
    /// V4L2 device path.
    pub camera_device: String,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
}

impl Config {
    /// Load configuration from `GAZEGUARD_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path = |key: &str, default: &str| {
            lookup(key).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(default))
        };

        Self {
            photos_dir: path("GAZEGUARD_PHOTOS_DIR", "gazeguard_photos"),
            attendance_dir: path("GAZEGUARD_ATTENDANCE_DIR", "gazeguard_attendance"),
            camera_device: lookup("GAZEGUARD_CAMERA_DEVICE")
                .unwrap_or_else(|| "/dev/video0".to_string()),
            model_dir: lookup("GAZEGUARD_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(gazeguard_core::default_model_dir),
        }
    }
}

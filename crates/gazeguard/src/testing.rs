//! Shared fakes for unit tests.

use crate::live::{FrameSource, LabeledFace, PreviewSurface, SurfaceEvent};
use gazeguard_core::{BoundingBox, DetectedFace, Embedding, EngineError, FaceEncoder};
use gazeguard_hw::{CameraError, Frame};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

pub const RED: [u8; 3] = [220, 0, 0];
pub const GREEN: [u8; 3] = [0, 220, 0];
pub const BLACK: [u8; 3] = [0, 0, 0];

const FRAME_WIDTH: u32 = 64;
const FRAME_HEIGHT: u32 = 48;

/// Fresh, empty directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("gazeguard-test-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Write a solid-colour 32x32 photo; the format follows the extension.
pub fn write_photo(path: &Path, rgb: [u8; 3]) {
    image::RgbImage::from_pixel(32, 32, image::Rgb(rgb)).save(path).unwrap();
}

pub fn solid_frame(rgb: [u8; 3], sequence: u32) -> Frame {
    let data = (0..FRAME_WIDTH * FRAME_HEIGHT).flat_map(|_| rgb).collect();
    Frame::from_rgb(data, FRAME_WIDTH, FRAME_HEIGHT, sequence).unwrap()
}

/// Treats the mean colour of an image as its single face's descriptor.
/// Near-black images contain no face.
#[derive(Default)]
pub struct ColourEncoder {
    pub calls: usize,
    pub last_size: Option<(u32, u32)>,
}

impl FaceEncoder for ColourEncoder {
    fn encode_faces(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<DetectedFace>, EngineError> {
        self.calls += 1;
        self.last_size = Some((width, height));

        let pixels = (width * height) as f32;
        let mut mean = [0.0f32; 3];
        for px in rgb.chunks_exact(3) {
            for c in 0..3 {
                mean[c] += px[c] as f32 / pixels;
            }
        }
        if mean.iter().sum::<f32>() < 30.0 {
            return Ok(Vec::new());
        }

        Ok(vec![DetectedFace {
            bbox: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: width as f32,
                height: height as f32,
                confidence: 0.99,
                landmarks: None,
            },
            embedding: Embedding::new(mean.to_vec()),
        }])
    }
}

/// Plays back a fixed list of solid frames, then fails like an unplugged camera.
pub struct ScriptedSource {
    frames: VecDeque<[u8; 3]>,
    sequence: u32,
}

impl ScriptedSource {
    pub fn new(colours: Vec<[u8; 3]>) -> Self {
        Self { frames: colours.into(), sequence: 0 }
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let colour = self
            .frames
            .pop_front()
            .ok_or_else(|| CameraError::CaptureFailed("end of script".into()))?;
        self.sequence += 1;
        Ok(solid_frame(colour, self.sequence))
    }
}

/// Records everything presented; optionally ends the session on the nth frame.
#[derive(Default)]
pub struct ScriptedSurface {
    pub presented: usize,
    pub labels: Vec<Vec<String>>,
    pub boxes: Vec<Vec<BoundingBox>>,
    stop: Option<(usize, SurfaceEvent)>,
}

impl ScriptedSurface {
    pub fn quitting_after(frames: usize, event: SurfaceEvent) -> Self {
        Self {
            stop: Some((frames, event)),
            ..Self::default()
        }
    }
}

impl PreviewSurface for ScriptedSurface {
    fn present(&mut self, _frame: &Frame, faces: &[LabeledFace]) -> std::io::Result<SurfaceEvent> {
        self.presented += 1;
        self.labels.push(faces.iter().map(|f| f.label.clone()).collect());
        self.boxes.push(faces.iter().map(|f| f.bbox.clone()).collect());

        match self.stop {
            Some((n, event)) if n == self.presented => Ok(event),
            _ => Ok(SurfaceEvent::Continue),
        }
    }
}

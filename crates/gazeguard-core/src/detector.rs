//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes the frame into a square 640x640 input, decodes the three
//! anchor-free stride heads (8, 16, 32) and merges them with NMS.

use crate::types::BoundingBox;
use ndarray::Array4;
use ort::session::Session;
use ort::value::{DynValue, TensorRef};
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;
const SCRFD_OUTPUTS: usize = SCRFD_STRIDES.len() * 3;

const CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; download from insightface and place in models/")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("RGB frame too short: expected {expected} bytes, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Where the frame sits inside the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    width: usize,
    height: usize,
}

impl Letterbox {
    /// Fit a `width` x `height` frame into a `side` x `side` square, centred.
    fn fit(width: usize, height: usize, side: usize) -> Self {
        let scale = (side as f32 / width as f32).min(side as f32 / height as f32);
        let fitted_w = ((width as f32 * scale).round() as usize).clamp(1, side);
        let fitted_h = ((height as f32 * scale).round() as usize).clamp(1, side);
        Self {
            scale,
            pad_x: (side - fitted_w) as f32 / 2.0,
            pad_y: (side - fitted_h) as f32 / 2.0,
            width: fitted_w,
            height: fitted_h,
        }
    }

    /// Model-input point back to frame coordinates.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor positions of one stride head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrideHead {
    score: usize,
    bbox: usize,
    kps: usize,
}

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    heads: [StrideHead; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        tracing::info!(path = %model_path.display(), outputs = ?names, "loaded SCRFD model");

        if names.len() < SCRFD_OUTPUTS {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD needs {SCRFD_OUTPUTS} outputs (score/bbox/kps per stride), model has {}",
                names.len()
            )));
        }

        let heads = stride_heads(&names);
        tracing::debug!(?heads, "SCRFD output mapping");

        Ok(Self { session, heads })
    }

    /// Detect faces in an interleaved RGB frame, most confident first.
    pub fn detect(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<BoundingBox>, DetectorError> {
        let (width, height) = (width as usize, height as usize);
        let expected = width * height * CHANNELS;
        if expected == 0 || rgb.len() < expected {
            return Err(DetectorError::InvalidFrame { expected, actual: rgb.len() });
        }

        let letterbox = Letterbox::fit(width, height, SCRFD_INPUT_SIZE);
        let input = to_input_tensor(rgb, width, height, &letterbox);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (head, &stride) in self.heads.iter().zip(SCRFD_STRIDES.iter()) {
            let raw = StrideOutputs {
                scores: head_tensor(&outputs[head.score], "scores", stride)?,
                bboxes: head_tensor(&outputs[head.bbox], "bboxes", stride)?,
                kps: head_tensor(&outputs[head.kps], "kps", stride)?,
            };
            candidates.extend(decode_stride(&raw, stride, SCRFD_INPUT_SIZE, &letterbox));
        }

        let faces = nms(candidates, SCRFD_NMS_THRESHOLD);
        tracing::trace!(count = faces.len(), "SCRFD detections after NMS");
        Ok(faces)
    }
}

fn head_tensor<'a>(value: &'a DynValue, what: &str, stride: usize) -> Result<&'a [f32], DetectorError> {
    value
        .try_extract_tensor::<f32>()
        .map(|(_, data)| data)
        .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
}

/// Letterboxed, normalised planar NCHW tensor. Padding normalises to zero.
fn to_input_tensor(rgb: &[u8], width: usize, height: usize, letterbox: &Letterbox) -> Array4<f32> {
    let fitted = resize_bilinear(rgb, width, height, letterbox.width, letterbox.height);
    let left = letterbox.pad_x.floor() as usize;
    let top = letterbox.pad_y.floor() as usize;

    Array4::from_shape_fn((1, CHANNELS, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE), |(_, c, y, x)| {
        let (fx, fy) = (x.wrapping_sub(left), y.wrapping_sub(top));
        if fx < letterbox.width && fy < letterbox.height {
            (fitted[(fy * letterbox.width + fx) * CHANNELS + c] as f32 - SCRFD_MEAN) / SCRFD_STD
        } else {
            0.0
        }
    })
}

/// Bilinear resize of an interleaved RGB buffer, half-pixel centred.
fn resize_bilinear(rgb: &[u8], width: usize, height: usize, new_w: usize, new_h: usize) -> Vec<u8> {
    // Source sample index pair and weight of the second for each output coordinate.
    let taps = |out: usize, src: usize| -> Vec<(usize, usize, f32)> {
        let ratio = src as f32 / out as f32;
        (0..out)
            .map(|i| {
                let pos = ((i as f32 + 0.5) * ratio - 0.5).max(0.0);
                let lo = (pos.floor() as usize).min(src - 1);
                (lo, (lo + 1).min(src - 1), (pos - lo as f32).min(1.0))
            })
            .collect()
    };
    let xs = taps(new_w, width);
    let ys = taps(new_h, height);
    let px = |x: usize, y: usize, c: usize| rgb[(y * width + x) * CHANNELS + c] as f32;

    let mut out = Vec::with_capacity(new_w * new_h * CHANNELS);
    for &(y0, y1, wy) in &ys {
        for &(x0, x1, wx) in &xs {
            for c in 0..CHANNELS {
                let top = px(x0, y0, c) * (1.0 - wx) + px(x1, y0, c) * wx;
                let bottom = px(x0, y1, c) * (1.0 - wx) + px(x1, y1, c) * wx;
                out.push((top * (1.0 - wy) + bottom * wy).round().clamp(0.0, 255.0) as u8);
            }
        }
    }
    out
}

/// Map each stride to its output tensors.
///
/// Exports either name their outputs `score_8`, `bbox_16`, `kps_32`, ... or use
/// the conventional order: three score heads, then three bbox, then three kps.
fn stride_heads(names: &[String]) -> [StrideHead; 3] {
    let position = |prefix: &str, stride: usize| {
        let wanted = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == wanted)
    };
    let named = |i: usize| -> Option<StrideHead> {
        let stride = SCRFD_STRIDES[i];
        Some(StrideHead {
            score: position("score", stride)?,
            bbox: position("bbox", stride)?,
            kps: position("kps", stride)?,
        })
    };
    let positional = |i: usize| StrideHead { score: i, bbox: i + 3, kps: i + 6 };

    match (named(0), named(1), named(2)) {
        (Some(a), Some(b), Some(c)) => [a, b, c],
        _ => {
            tracing::debug!(?names, "SCRFD output names not recognised, using positional mapping");
            [positional(0), positional(1), positional(2)]
        }
    }
}

/// Raw head outputs for one stride.
struct StrideOutputs<'a> {
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

/// Decode the detections of one stride above the confidence threshold.
fn decode_stride(
    raw: &StrideOutputs<'_>,
    stride: usize,
    input_size: usize,
    letterbox: &Letterbox,
) -> Vec<BoundingBox> {
    let grid = input_size / stride;
    let step = stride as f32;
    let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;

    raw.scores
        .iter()
        .take(anchors)
        .zip(raw.bboxes.chunks_exact(4))
        .enumerate()
        .filter(|(_, (&score, _))| score > SCRFD_CONFIDENCE_THRESHOLD)
        .map(|(idx, (&score, dist))| {
            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let ax = (cell % grid) as f32 * step;
            let ay = (cell / grid) as f32 * step;

            let (x1, y1) = letterbox.unmap(ax - dist[0] * step, ay - dist[1] * step);
            let (x2, y2) = letterbox.unmap(ax + dist[2] * step, ay + dist[3] * step);

            let landmarks = raw.kps.chunks_exact(10).nth(idx).map(|offsets| {
                let mut points = [(0.0f32, 0.0f32); 5];
                for (point, xy) in points.iter_mut().zip(offsets.chunks_exact(2)) {
                    *point = letterbox.unmap(ax + xy[0] * step, ay + xy[1] * step);
                }
                points
            });

            BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
                landmarks,
            }
        })
        .collect()
}

/// Greedy non-maximum suppression; output is ordered by descending confidence.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<BoundingBox> = Vec::with_capacity(detections.len());
    for candidate in detections {
        if keep.iter().all(|kept| iou(kept, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter_w = (a.right().min(b.right()) - a.x.max(b.x)).max(0.0);
    let inter_h = (a.bottom().min(b.bottom()) - a.y.max(b.y)).max(0.0);
    let inter = inter_w * inter_h;

    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 { inter / union } else { 0.0 }
}

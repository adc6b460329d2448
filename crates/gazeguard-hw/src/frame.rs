//! Frame type and image processing: YUYV/MJPG to RGB, downscaling, luma.

use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};

/// A captured colour camera frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Interleaved RGB pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Driver frame counter.
    pub sequence: u32,
}

impl Frame {
    /// Wrap an interleaved RGB buffer, checking its length.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Result<Self, FrameError> {
        let expected = rgb_len(width, height);
        if data.len() != expected {
            return Err(FrameError::InvalidLength { expected, actual: data.len() });
        }
        Ok(Self {
            data,
            width,
            height,
            sequence,
        })
    }

    /// Shrink the frame by an integer factor in both dimensions (bilinear).
    ///
    /// Dimensions round to nearest and never drop below one pixel.
    pub fn downscale(&self, factor: u32) -> Result<Frame, FrameError> {
        if factor <= 1 {
            return Ok(self.clone());
        }

        let image = RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or(
            FrameError::InvalidLength {
                expected: rgb_len(self.width, self.height),
                actual: self.data.len(),
            },
        )?;

        let new_w = scaled_dim(self.width, factor);
        let new_h = scaled_dim(self.height, factor);
        let small = imageops::resize(&image, new_w, new_h, FilterType::Triangle);

        Ok(Frame {
            data: small.into_raw(),
            width: new_w,
            height: new_h,
            sequence: self.sequence,
        })
    }

    /// Luma plane (ITU-R BT.601 weights), one byte per pixel.
    pub fn to_luma(&self) -> Vec<u8> {
        self.data
            .chunks_exact(3)
            .map(|px| {
                let y = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                y.round().clamp(0.0, 255.0) as u8
            })
            .collect()
    }
}

fn rgb_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

fn scaled_dim(dim: u32, factor: u32) -> u32 {
    ((dim as f32 / factor as f32).round() as u32).max(1)
}

/// Convert packed YUYV (4:2:2) to interleaved RGB.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = width as usize * height as usize * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity(rgb_len(width, height));
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    Ok(rgb)
}

/// BT.601 full-range YCbCr → RGB.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;

    let r = y + 1.402 * v;
    let g = y - 0.344_136 * u - 0.714_136 * v;
    let b = y + 1.772 * u;

    [r, g, b].map(|c| c.round().clamp(0.0, 255.0) as u8)
}

/// Decode one Motion-JPEG buffer to interleaved RGB, returning (data, width, height).
pub fn mjpeg_to_rgb(buf: &[u8]) -> Result<(Vec<u8>, u32, u32), FrameError> {
    let decoded = image::load_from_memory_with_format(buf, ImageFormat::Jpeg)?.into_rgb8();
    let (width, height) = decoded.dimensions();
    Ok((decoded.into_raw(), width, height))
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("MJPG decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

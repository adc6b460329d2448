//! Face alignment via 4-DOF similarity transform.
//!
//! Warps a detected face onto a canonical 112×112 RGB crop so the five
//! landmarks land on the InsightFace reference positions.

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub(crate) const ALIGNED_SIZE: usize = 112;

/// Interleaved RGB.
const CHANNELS: usize = 3;

/// Scale + rotation + translation:
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Least-squares fit mapping `src` points onto `dst` points.
    ///
    /// Closed form on centred point sets. Coincident source points give the
    /// zero transform, which warps to an all-black crop.
    fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Self {
        let mean = |pts: &[(f32, f32); 5]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |acc, p| (acc.0 + p.0, acc.1 + p.1));
            (sx / pts.len() as f32, sy / pts.len() as f32)
        };
        let (smx, smy) = mean(src);
        let (dmx, dmy) = mean(dst);

        let (mut dot, mut cross, mut norm) = (0.0f32, 0.0f32, 0.0f32);
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst) {
            let (px, py) = (sx - smx, sy - smy);
            let (qx, qy) = (dx - dmx, dy - dmy);
            dot += px * qx + py * qy;
            cross += px * qy - py * qx;
            norm += px * px + py * py;
        }

        if norm < 1e-12 {
            return Self { a: 0.0, b: 0.0, tx: 0.0, ty: 0.0 };
        }

        let (a, b) = (dot / norm, cross / norm);
        Self {
            a,
            b,
            tx: dmx - (a * smx - b * smy),
            ty: dmy - (b * smx + a * smy),
        }
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (self.a * x - self.b * y + self.tx, self.b * x + self.a * y + self.ty)
    }

    /// Inverse transform, or `None` when the transform collapses the plane.
    fn inverse(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let (a, b) = (self.a / det, -self.b / det);
        Some(Self {
            a,
            b,
            tx: -(a * self.tx - b * self.ty),
            ty: -(b * self.tx + a * self.ty),
        })
    }
}

/// Warp an interleaved RGB frame into an `out_size`² crop.
///
/// Each output pixel samples the source bilinearly through the inverse
/// transform; samples outside the frame are black.
fn warp(frame: &[u8], width: usize, height: usize, transform: &Similarity, out_size: usize) -> Vec<u8> {
    let mut output = vec![0u8; out_size * out_size * CHANNELS];
    let Some(inverse) = transform.inverse() else {
        return output;
    };

    let sample = |x: i64, y: i64, c: usize| -> f32 {
        if (0..width as i64).contains(&x) && (0..height as i64).contains(&y) {
            frame[(y as usize * width + x as usize) * CHANNELS + c] as f32
        } else {
            0.0
        }
    };

    for (i, px) in output.chunks_exact_mut(CHANNELS).enumerate() {
        let (sx, sy) = inverse.apply((i % out_size) as f32, (i / out_size) as f32);
        let (x0, y0) = (sx.floor() as i64, sy.floor() as i64);
        let (fx, fy) = (sx - sx.floor(), sy - sy.floor());

        for (c, value) in px.iter_mut().enumerate() {
            let top = sample(x0, y0, c) * (1.0 - fx) + sample(x0 + 1, y0, c) * fx;
            let bottom = sample(x0, y0 + 1, c) * (1.0 - fx) + sample(x0 + 1, y0 + 1, c) * fx;
            *value = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
        }
    }

    output
}

/// Align a detected face to a canonical 112×112×3 crop for ArcFace.
pub fn align_face(rgb: &[u8], width: u32, height: u32, landmarks: &[(f32, f32); 5]) -> Vec<u8> {
    let transform = Similarity::estimate(landmarks, &REFERENCE_LANDMARKS_112);
    warp(rgb, width as usize, height as usize, &transform, ALIGNED_SIZE)
}

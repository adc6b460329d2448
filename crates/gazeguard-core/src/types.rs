/// Maximum cosine distance at which the nearest roster entry counts as a match.
///
/// Equivalent to a cosine similarity of 0.40 between ArcFace embeddings.
pub const MATCH_TOLERANCE: f32 = 0.6;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Map a box found on a downscaled frame back onto the full-size frame.
    pub fn scaled(&self, factor: f32) -> BoundingBox {
        BoundingBox {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
            confidence: self.confidence,
            landmarks: self
                .landmarks
                .map(|lms| lms.map(|(lx, ly)| (lx * factor, ly * factor))),
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// Face descriptor (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Cosine distance in [0, 2]. Lower = more similar.
    pub fn distance(&self, other: &Embedding) -> f32 {
        1.0 - self.similarity(other)
    }
}

/// Result of matching a probe embedding against the roster.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Distance to the nearest roster entry (`f32::INFINITY` for an empty roster).
    pub distance: f32,
    /// Index of the nearest roster entry, if the roster is non-empty.
    pub nearest: Option<usize>,
}

impl MatchResult {
    /// Index of the accepted roster entry, `None` for an unknown face.
    pub fn accepted(&self) -> Option<usize> {
        if self.matched { self.nearest } else { None }
    }
}

/// Strategy for comparing a probe embedding against the enrolled descriptors.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &[Embedding]) -> MatchResult;
}

/// Nearest-neighbour matcher over cosine distance with a fixed tolerance.
///
/// The nearest entry is also the only one that can pass the tolerance check,
/// so acceptance never picks a different entry than the nearest one. Ties
/// resolve to the lowest index.
pub struct NearestMatcher {
    tolerance: f32,
}

impl NearestMatcher {
    pub fn new() -> Self {
        Self { tolerance: MATCH_TOLERANCE }
    }

    #[cfg(test)]
    pub(crate) fn with_tolerance(tolerance: f32) -> Self {
        Self { tolerance }
    }
}

impl Default for NearestMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Matcher for NearestMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[Embedding]) -> MatchResult {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, candidate) in gallery.iter().enumerate() {
            let dist = probe.distance(candidate);
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        MatchResult {
            matched: best_idx.is_some() && best_dist <= self.tolerance,
            distance: best_dist,
            nearest: best_idx,
        }
    }
}

//! Enrollment: build the roster from a directory of reference photos.

use gazeguard_core::{Embedding, EngineError, FaceEncoder};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name suffixes accepted as reference photos.
const PHOTO_EXTENSIONS: [&str; 3] = [".jpg", ".jpeg", ".png"];

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("photos directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("face engine: {0}")]
    Engine(#[from] EngineError),
}

/// Enrolled identities as two parallel sequences: names and descriptors.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    names: Vec<String>,
    descriptors: Vec<Embedding>,
}

impl Roster {
    pub fn push(&mut self, name: String, descriptor: Embedding) {
        self.names.push(name);
        self.descriptors.push(descriptor);
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn descriptors(&self) -> &[Embedding] {
        &self.descriptors
    }

    pub fn name(&self, idx: usize) -> &str {
        &self.names[idx]
    }
}

/// Make sure the photos directory exists.
///
/// Returns `false` if it had to be created: there is nobody to enroll yet and
/// the caller should stop before touching the camera.
pub fn prepare_photos_dir(dir: &Path) -> Result<bool, EnrollError> {
    if dir.is_dir() {
        return Ok(true);
    }
    std::fs::create_dir_all(dir).map_err(|source| EnrollError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    tracing::info!(dir = %dir.display(), "created photos directory");
    Ok(false)
}

pub fn is_photo(file_name: &str) -> bool {
    PHOTO_EXTENSIONS.iter().any(|ext| file_name.ends_with(ext))
}

/// Encode the first face of every photo in `dir`.
///
/// Photos without a detectable face are skipped. Names come from the file
/// stem; order follows directory iteration.
pub fn load_roster<E: FaceEncoder>(dir: &Path, encoder: &mut E) -> Result<Roster, EnrollError> {
    if !dir.is_dir() {
        return Err(EnrollError::MissingDirectory(dir.to_path_buf()));
    }

    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| EnrollError::Io { path, source }
    };

    let mut roster = Roster::default();

    for entry in std::fs::read_dir(dir).map_err(io_err(dir))? {
        let path = entry.map_err(io_err(dir))?.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !is_photo(file_name) || !path.is_file() {
            continue;
        }

        let image = image::open(&path)
            .map_err(|source| EnrollError::Decode {
                path: path.clone(),
                source,
            })?
            .into_rgb8();
        let (width, height) = image.dimensions();

        let faces = encoder.encode_faces(image.as_raw(), width, height)?;
        let Some(face) = faces.into_iter().next() else {
            tracing::debug!(path = %path.display(), "no face found, skipping");
            continue;
        };

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::debug!(name, confidence = face.bbox.confidence, "enrolled");
        roster.push(name, face.embedding);
    }

    tracing::info!(dir = %dir.display(), enrolled = roster.len(), "roster loaded");
    Ok(roster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{scratch_dir, write_photo, ColourEncoder};

    #[test]
    fn test_is_photo() {
        assert!(is_photo("ada.jpg"));
        assert!(is_photo("grace.jpeg"));
        assert!(is_photo("linus.png"));
        assert!(!is_photo("notes.txt"));
        assert!(!is_photo("scan.JPG"));
        assert!(!is_photo("jpg"));
    }

    #[test]
    fn test_load_roster_counts_only_faces() {
        let dir = scratch_dir("roster-count");
        write_photo(&dir.join("ada.png"), [200, 0, 0]);
        write_photo(&dir.join("grace.png"), [0, 200, 0]);
        write_photo(&dir.join("linus.jpg"), [0, 0, 200]);
        // Black images carry no face for the colour encoder
        write_photo(&dir.join("empty.png"), [0, 0, 0]);
        write_photo(&dir.join("blank.jpeg"), [0, 0, 0]);
        std::fs::write(dir.join("notes.txt"), "not a photo").unwrap();

        let roster = load_roster(&dir, &mut ColourEncoder::default()).unwrap();
        assert_eq!(roster.len(), 3);

        let mut names = roster.names().to_vec();
        names.sort();
        assert_eq!(names, vec!["ada", "grace", "linus"]);
        assert_eq!(roster.descriptors().len(), 3);
    }

    #[test]
    fn test_load_roster_pairs_names_with_descriptors() {
        let dir = scratch_dir("roster-pairs");
        write_photo(&dir.join("ada.png"), [200, 0, 0]);
        write_photo(&dir.join("grace.png"), [0, 200, 0]);

        let roster = load_roster(&dir, &mut ColourEncoder::default()).unwrap();
        for (name, descriptor) in roster.names().iter().zip(roster.descriptors()) {
            let expected = if name == "ada" { 0 } else { 1 };
            let strongest = descriptor
                .values
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i);
            assert_eq!(strongest, Some(expected), "{name}");
        }
    }

    #[test]
    fn test_load_roster_empty_dir() {
        let dir = scratch_dir("roster-empty");
        let roster = load_roster(&dir, &mut ColourEncoder::default()).unwrap();
        assert!(roster.is_empty());
    }

    #[test]
    fn test_load_roster_missing_dir() {
        let dir = scratch_dir("roster-missing").join("absent");
        let err = load_roster(&dir, &mut ColourEncoder::default()).unwrap_err();
        assert!(matches!(err, EnrollError::MissingDirectory(_)));
    }

    #[test]
    fn test_malformed_photo_is_fatal() {
        let dir = scratch_dir("roster-malformed");
        std::fs::write(dir.join("broken.png"), b"definitely not a png").unwrap();
        let err = load_roster(&dir, &mut ColourEncoder::default()).unwrap_err();
        assert!(matches!(err, EnrollError::Decode { .. }));
    }

    #[test]
    fn test_prepare_photos_dir_creates_missing() {
        let dir = scratch_dir("roster-prepare").join("gazeguard_photos");
        assert!(!prepare_photos_dir(&dir).unwrap());
        assert!(dir.is_dir());
        assert!(prepare_photos_dir(&dir).unwrap());
    }
}

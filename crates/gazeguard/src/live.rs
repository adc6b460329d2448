//! The live matching loop: capture, detect every other frame, credit arrivals, preview.

use crate::session::Session;
use chrono::NaiveTime;
use gazeguard_core::{BoundingBox, EngineError, FaceEncoder};
use gazeguard_hw::{CameraError, CameraStream, Frame, FrameError};
use thiserror::Error;

/// Detection runs on a frame shrunk by this factor in each dimension.
pub const DOWNSCALE_FACTOR: u32 = 4;

/// Label shown for faces that match nobody on the roster.
pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Error, Debug)]
pub enum LiveError {
    #[error("face engine: {0}")]
    Engine(#[from] EngineError),
    #[error("frame: {0}")]
    Frame(#[from] FrameError),
}

/// Anything that yields camera frames, blocking until one is ready.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame, CameraError>;
}

impl FrameSource for CameraStream<'_> {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        CameraStream::next_frame(self)
    }
}

/// What the viewer did while the last frame was on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    Continue,
    Quit,
    Closed,
}

/// Where frames and face labels are shown.
pub trait PreviewSurface {
    fn present(&mut self, frame: &Frame, faces: &[LabeledFace]) -> std::io::Result<SurfaceEvent>;
}

/// A face box in full-frame coordinates with its resolved name.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledFace {
    pub bbox: BoundingBox,
    pub label: String,
}

/// Alternates between running detection and reusing the last result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    Detect,
    Skip,
}

impl FrameMode {
    pub fn toggle(self) -> Self {
        match self {
            FrameMode::Detect => FrameMode::Skip,
            FrameMode::Skip => FrameMode::Detect,
        }
    }
}

/// Why the live loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    CaptureFailed,
    QuitKey,
    WindowClosed,
}

/// Run until the camera fails, the viewer quits, or the preview goes away.
///
/// `now` supplies the wall-clock time stamped on new arrivals.
pub fn run_live_loop<S, E, P, C>(
    session: &mut Session,
    source: &mut S,
    encoder: &mut E,
    surface: &mut P,
    now: C,
) -> Result<TerminationReason, LiveError>
where
    S: FrameSource,
    E: FaceEncoder,
    P: PreviewSurface,
    C: Fn() -> NaiveTime,
{
    let mut mode = FrameMode::Detect;
    let mut faces: Vec<LabeledFace> = Vec::new();

    loop {
        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "camera read failed, ending session");
                return Ok(TerminationReason::CaptureFailed);
            }
        };

        if mode == FrameMode::Detect {
            faces = detect_and_label(session, encoder, &frame, &now)?;
        }
        mode = mode.toggle();

        // Between detections the previous boxes and labels stay on screen.
        match surface.present(&frame, &faces) {
            Ok(SurfaceEvent::Continue) => {}
            Ok(SurfaceEvent::Quit) => return Ok(TerminationReason::QuitKey),
            Ok(SurfaceEvent::Closed) => return Ok(TerminationReason::WindowClosed),
            Err(e) => {
                tracing::warn!(error = %e, "preview unavailable, ending session");
                return Ok(TerminationReason::WindowClosed);
            }
        }
    }
}

fn detect_and_label<E, C>(
    session: &mut Session,
    encoder: &mut E,
    frame: &Frame,
    now: &C,
) -> Result<Vec<LabeledFace>, LiveError>
where
    E: FaceEncoder,
    C: Fn() -> NaiveTime,
{
    let small = frame.downscale(DOWNSCALE_FACTOR)?;
    let detected = encoder.encode_faces(&small.data, small.width, small.height)?;

    let mut labeled = Vec::with_capacity(detected.len());
    for face in detected {
        let label = match session.identify(&face.embedding).map(str::to_owned) {
            Some(name) => {
                if !session.is_recognized(&name) {
                    session.record_arrival(&name, now());
                }
                name
            }
            None => UNKNOWN_LABEL.to_string(),
        };

        labeled.push(LabeledFace {
            bbox: face.bbox.scaled(DOWNSCALE_FACTOR as f32),
            label,
        });
    }

    tracing::trace!(seq = frame.sequence, faces = labeled.len(), "detect pass");
    Ok(labeled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::Roster;
    use crate::session::Status;
    use crate::testing::{ColourEncoder, ScriptedSource, ScriptedSurface, RED, GREEN, BLACK};
    use gazeguard_core::Embedding;
    use std::cell::Cell;

    fn session() -> Session {
        let mut roster = Roster::default();
        roster.push("ada".into(), Embedding::new(vec![1.0, 0.0, 0.0]));
        roster.push("grace".into(), Embedding::new(vec![0.0, 1.0, 0.0]));
        Session::new(roster)
    }

    /// A clock that advances one second per reading, starting at 09:00:00.
    fn ticking_clock() -> (Cell<u32>, impl Fn(&Cell<u32>) -> NaiveTime) {
        let read = |ticks: &Cell<u32>| {
            let t = ticks.get();
            ticks.set(t + 1);
            NaiveTime::from_hms_opt(9, 0, 0).unwrap() + chrono::Duration::seconds(t as i64)
        };
        (Cell::new(0), read)
    }

    #[test]
    fn test_frame_mode_toggles() {
        assert_eq!(FrameMode::Detect.toggle(), FrameMode::Skip);
        assert_eq!(FrameMode::Skip.toggle(), FrameMode::Detect);
    }

    #[test]
    fn test_capture_failure_ends_loop() {
        let mut session = session();
        let mut source = ScriptedSource::new(vec![BLACK, BLACK, BLACK]);
        let mut encoder = ColourEncoder::default();
        let mut surface = ScriptedSurface::default();

        let reason = run_live_loop(&mut session, &mut source, &mut encoder, &mut surface, || {
            NaiveTime::from_hms_opt(9, 0, 0).unwrap()
        })
        .unwrap();

        assert_eq!(reason, TerminationReason::CaptureFailed);
        assert_eq!(surface.presented, 3);
    }

    #[test]
    fn test_detection_runs_every_other_frame() {
        let mut session = session();
        let mut source = ScriptedSource::new(vec![BLACK; 5]);
        let mut encoder = ColourEncoder::default();
        let mut surface = ScriptedSurface::default();

        run_live_loop(&mut session, &mut source, &mut encoder, &mut surface, || {
            NaiveTime::from_hms_opt(9, 0, 0).unwrap()
        })
        .unwrap();

        // Frames 0, 2, 4 are detect passes
        assert_eq!(encoder.calls, 3);
        assert_eq!(encoder.last_size, Some((16, 12)));
    }

    #[test]
    fn test_known_face_becomes_present_and_stays() {
        let mut session = session();
        // ada appears on frame 2 (a detect frame) and keeps appearing
        let mut source = ScriptedSource::new(vec![BLACK, BLACK, RED, RED, RED, RED, RED]);
        let mut encoder = ColourEncoder::default();
        let mut surface = ScriptedSurface::default();
        let (ticks, read) = ticking_clock();

        run_live_loop(&mut session, &mut source, &mut encoder, &mut surface, || read(&ticks)).unwrap();

        let ada = &session.records()[0];
        assert_eq!(ada.status, Status::Present);
        // Only the first sighting reads the clock
        assert_eq!(ada.arrival_text(), "09:00:00");
        assert_eq!(ticks.get(), 1);
        assert_eq!(session.records()[1].status, Status::Absent);

        // Stale labels are drawn on skipped frames too
        assert_eq!(surface.labels[2], vec!["ada"]);
        assert_eq!(surface.labels[3], vec!["ada"]);
        assert_eq!(surface.labels[1], Vec::<String>::new());
    }

    #[test]
    fn test_face_seen_only_on_skip_frame_is_missed() {
        let mut session = session();
        let mut source = ScriptedSource::new(vec![BLACK, GREEN, BLACK]);
        let mut encoder = ColourEncoder::default();
        let mut surface = ScriptedSurface::default();

        run_live_loop(&mut session, &mut source, &mut encoder, &mut surface, || {
            NaiveTime::from_hms_opt(9, 0, 0).unwrap()
        })
        .unwrap();

        assert_eq!(session.summary().present(), 0);
    }

    #[test]
    fn test_unknown_face_never_credited() {
        let mut session = session();
        // Blue matches nobody on the red/green roster
        let mut source = ScriptedSource::new(vec![[0, 0, 220]; 4]);
        let mut encoder = ColourEncoder::default();
        let mut surface = ScriptedSurface::default();

        run_live_loop(&mut session, &mut source, &mut encoder, &mut surface, || {
            NaiveTime::from_hms_opt(9, 0, 0).unwrap()
        })
        .unwrap();

        assert_eq!(session.summary().present(), 0);
        assert_eq!(surface.labels[0], vec![UNKNOWN_LABEL]);
    }

    #[test]
    fn test_boxes_scaled_back_to_full_frame() {
        let mut session = session();
        let mut source = ScriptedSource::new(vec![RED]);
        let mut encoder = ColourEncoder::default();
        let mut surface = ScriptedSurface::default();

        run_live_loop(&mut session, &mut source, &mut encoder, &mut surface, || {
            NaiveTime::from_hms_opt(9, 0, 0).unwrap()
        })
        .unwrap();

        // The colour encoder reports the whole (16x12) image as the face
        let bbox = &surface.boxes[0][0];
        assert_eq!((bbox.width, bbox.height), (64.0, 48.0));
    }

    #[test]
    fn test_quit_key_ends_loop() {
        let mut session = session();
        let mut source = ScriptedSource::new(vec![GREEN; 10]);
        let mut encoder = ColourEncoder::default();
        let mut surface = ScriptedSurface::quitting_after(2, SurfaceEvent::Quit);

        let reason = run_live_loop(&mut session, &mut source, &mut encoder, &mut surface, || {
            NaiveTime::from_hms_opt(9, 0, 0).unwrap()
        })
        .unwrap();

        assert_eq!(reason, TerminationReason::QuitKey);
        assert_eq!(surface.presented, 2);
        assert_eq!(session.records()[1].status, Status::Present);
    }

    #[test]
    fn test_window_close_ends_loop() {
        let mut session = session();
        let mut source = ScriptedSource::new(vec![BLACK; 10]);
        let mut encoder = ColourEncoder::default();
        let mut surface = ScriptedSurface::quitting_after(1, SurfaceEvent::Closed);

        let reason = run_live_loop(&mut session, &mut source, &mut encoder, &mut surface, || {
            NaiveTime::from_hms_opt(9, 0, 0).unwrap()
        })
        .unwrap();

        assert_eq!(reason, TerminationReason::WindowClosed);
    }
}

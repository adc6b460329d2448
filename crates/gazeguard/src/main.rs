use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use gazeguard_core::FaceEngine;
use gazeguard_hw::Camera;
use std::path::PathBuf;
use std::process::ExitCode;

mod config;
mod live;
mod logging;
mod preview;
mod report;
mod roster;
mod session;
#[cfg(test)]
mod testing;

use config::Config;
use live::TerminationReason;
use logging::LogGate;
use session::Session;

#[derive(Parser)]
#[command(
    name = "gazeguard",
    version,
    about = "Record class attendance from a webcam by recognising enrolled faces"
)]
struct Cli {
    /// Directory of reference photos [env: GAZEGUARD_PHOTOS_DIR]
    #[arg(long)]
    photos_dir: Option<PathBuf>,
    /// Directory for the daily attendance workbook [env: GAZEGUARD_ATTENDANCE_DIR]
    #[arg(long)]
    attendance_dir: Option<PathBuf>,
    /// V4L2 camera device [env: GAZEGUARD_CAMERA_DEVICE]
    #[arg(long)]
    camera: Option<String>,
    /// Directory holding det_10g.onnx and w600k_r50.onnx [env: GAZEGUARD_MODEL_DIR]
    #[arg(long)]
    model_dir: Option<PathBuf>,
}

impl Cli {
    fn apply(self, mut config: Config) -> Config {
        if let Some(dir) = self.photos_dir {
            config.photos_dir = dir;
        }
        if let Some(dir) = self.attendance_dir {
            config.attendance_dir = dir;
        }
        if let Some(device) = self.camera {
            config.camera_device = device;
        }
        if let Some(dir) = self.model_dir {
            config.model_dir = dir;
        }
        config
    }
}

fn main() -> Result<ExitCode> {
    let logs = LogGate::default();
    logging::init_logging(&logs);

    let config = Cli::parse().apply(Config::from_env());
    tracing::debug!(?config, "gazeguard starting");

    match run(&config, &logs)? {
        Outcome::Recorded => Ok(ExitCode::SUCCESS),
        Outcome::NoPhotos => Ok(ExitCode::FAILURE),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    /// The session ran and the workbook was written.
    Recorded,
    /// The photos folder had to be created; nothing else happened.
    NoPhotos,
}

fn run(config: &Config, logs: &LogGate) -> Result<Outcome> {
    if !roster::prepare_photos_dir(&config.photos_dir)? {
        println!(
            "'{}' folder created. Please add photos of known faces to this folder and run the program again.",
            config.photos_dir.display()
        );
        return Ok(Outcome::NoPhotos);
    }

    std::fs::create_dir_all(&config.attendance_dir).with_context(|| {
        format!("creating attendance folder {}", config.attendance_dir.display())
    })?;
    let report_path = report::attendance_file_path(&config.attendance_dir, Local::now().date_naive());

    let mut engine = FaceEngine::load(&config.model_dir).context("loading face models")?;
    let roster = roster::load_roster(&config.photos_dir, &mut engine)?;
    if roster.is_empty() {
        tracing::warn!(dir = %config.photos_dir.display(), "no faces enrolled; everyone will be unknown");
    }
    let mut session = Session::new(roster);

    let reason = capture(config, logs, &mut session, &mut engine)?;
    tracing::info!(?reason, "live session ended");
    if reason == TerminationReason::CaptureFailed {
        println!("Failed to capture video. Exiting...");
    }

    let summary = report::write_report(&report_path, &session)
        .with_context(|| format!("writing {}", report_path.display()))?;

    println!(
        "Attendance saved to {} ({} of {} present).",
        report_path.display(),
        summary.present(),
        summary.total
    );
    println!(
        "Program has finished running. Please add more photos to the '{}' folder if needed.",
        config.photos_dir.display()
    );
    Ok(Outcome::Recorded)
}

/// Own the camera and preview for the length of the live loop.
///
/// Both are released before this returns, whichever way the loop ends. A
/// camera that cannot be opened counts as a capture failure. Log lines are
/// held back while the preview is on screen and written once it is gone.
fn capture(
    config: &Config,
    logs: &LogGate,
    session: &mut Session,
    engine: &mut FaceEngine,
) -> Result<TerminationReason> {
    let camera = match Camera::open(&config.camera_device) {
        Ok(camera) => camera,
        Err(e) => {
            tracing::error!(device = %config.camera_device, error = %e, "cannot open camera");
            return Ok(TerminationReason::CaptureFailed);
        }
    };
    let mut stream = match camera.stream() {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(error = %e, "cannot start capture stream");
            return Ok(TerminationReason::CaptureFailed);
        }
    };

    // Declared before the preview so it drops after the terminal is restored.
    let _held_logs = logs.hold();
    let mut preview = preview::TerminalPreview::open().context("opening terminal preview")?;
    let reason = live::run_live_loop(session, &mut stream, engine, &mut preview, || Local::now().time())?;
    Ok(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::scratch_dir;

    #[test]
    fn test_missing_photos_dir_returns_before_models_and_report() {
        let root = scratch_dir("main-missing-photos");
        let config = Config {
            photos_dir: root.join("gazeguard_photos"),
            attendance_dir: root.join("gazeguard_attendance"),
            camera_device: "/dev/gazeguard-must-not-open".into(),
            model_dir: root.join("models"),
        };

        // `run` returns before `capture`, so the camera is never opened. The
        // model dir does not exist either: reaching the engine would be an error.
        assert_eq!(run(&config, &LogGate::default()).unwrap(), Outcome::NoPhotos);
        assert!(config.photos_dir.is_dir(), "photos folder is created for the user");
        assert!(!config.attendance_dir.exists(), "no spreadsheet output");
    }

    #[test]
    fn test_missing_models_fail_before_capture() {
        let root = scratch_dir("main-missing-models");
        let config = Config {
            photos_dir: root.join("photos"),
            attendance_dir: root.join("out"),
            camera_device: "/dev/gazeguard-must-not-open".into(),
            model_dir: root.join("models"),
        };
        std::fs::create_dir_all(&config.photos_dir).unwrap();

        assert!(run(&config, &LogGate::default()).is_err());
        let written = std::fs::read_dir(&config.attendance_dir).unwrap().count();
        assert_eq!(written, 0);
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from(["gazeguard", "--photos-dir", "/tmp/p", "--camera", "/dev/video9"]);
        let config = cli.apply(Config {
            photos_dir: "a".into(),
            attendance_dir: "b".into(),
            camera_device: "c".into(),
            model_dir: "d".into(),
        });
        assert_eq!(config.photos_dir, PathBuf::from("/tmp/p"));
        assert_eq!(config.attendance_dir, PathBuf::from("b"));
        assert_eq!(config.camera_device, "/dev/video9");
        assert_eq!(config.model_dir, PathBuf::from("d"));
    }
}

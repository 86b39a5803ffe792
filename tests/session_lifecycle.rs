//! A scaled-down S5: start a session against the synthetic adapters, let it
//! run briefly, pause, resume, then stop. Expects exactly one `.mp4` at the
//! output path and no leftover `.partial.mp4`.

use std::time::Duration;

use castrail_core::adapters::{SyntheticAudioAdapter, SyntheticCaptureAdapter};
use castrail_core::encoder::hardware::NoHardware;
use castrail_core::power::UnknownPower;
use castrail_core::storage::StorageManager;
use castrail_core::{EncoderProfile, SessionController, SessionState};

#[test]
fn pause_resume_stop_yields_exactly_one_finalized_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut storage = StorageManager::new();
    storage.set_output_directory(dir.path().to_path_buf()).unwrap();

    let mut controller = SessionController::new(
        Box::new(SyntheticCaptureAdapter::new(64, 64, 30)),
        Box::new(SyntheticAudioAdapter::new()),
        Box::new(UnknownPower),
        Box::new(NoHardware),
    );
    controller.initialize(storage, Box::new(|_| {}), Box::new(|_| {}));
    controller.set_encoder_profile(EncoderProfile {
        width: 64,
        height: 64,
        fps: 30,
        bitrate_bps: 500_000,
        ..Default::default()
    });

    controller.start().expect("session should start");
    assert_eq!(controller.state(), SessionState::Recording);
    std::thread::sleep(Duration::from_millis(150));

    controller.pause().expect("session should pause");
    assert_eq!(controller.state(), SessionState::Paused);
    std::thread::sleep(Duration::from_millis(50));

    controller.resume().expect("session should resume");
    assert_eq!(controller.state(), SessionState::Recording);
    std::thread::sleep(Duration::from_millis(150));

    let output_path = controller.output_path().expect("output path should be set");
    controller.stop().expect("session should stop cleanly");
    assert_eq!(controller.state(), SessionState::Idle);

    assert!(output_path.exists(), "finalized file should exist at the output path");
    let partial = output_path.with_extension("partial.mp4");
    assert!(!partial.exists(), "no staging file should remain after a clean stop");

    let snapshot = controller.telemetry_snapshot();
    assert!(snapshot.frames_captured > 0);

    let _ = std::fs::remove_file(&output_path);
}

//! Minimal command-line harness: start a session, run until Ctrl+C, stop.
//!
//! Grounded on the teacher's root-level CLI (`src/main.rs`) — a `libc`
//! `SIGINT`/`SIGTERM` handler flips an atomic flag that the wait loop
//! polls — generalized onto [`SessionController`] instead of calling the
//! capture/writer modules directly.
//!
//! Usage: `castraild [output-dir]`. Stop with Ctrl+C.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use castrail_core::adapters::{SyntheticAudioAdapter, SyntheticCaptureAdapter};
use castrail_core::encoder::hardware::NoHardware;
use castrail_core::power::UnknownPower;
use castrail_core::{EncoderProfile, RecorderConfig, SessionController, SessionState};

static RUNNING: AtomicBool = AtomicBool::new(true);

extern "C" fn signal_handler(_sig: libc::c_int) {
    RUNNING.store(false, Ordering::SeqCst);
}

fn main() {
    castrail_core::init_logging();

    let config = RecorderConfig::load();
    let mut profile = EncoderProfile::default();
    config.merge_into(&mut profile);

    let mut controller = SessionController::new(
        Box::new(SyntheticCaptureAdapter::new(profile.width, profile.height, profile.fps)),
        Box::new(SyntheticAudioAdapter::new()),
        Box::new(UnknownPower),
        Box::new(NoHardware),
    );
    controller.set_encoder_profile(profile);
    let mut storage = castrail_core::storage::StorageManager::new();
    if let Some(dir) = config.output_dir.clone() {
        let _ = storage.set_output_directory(dir);
    }
    controller.initialize(
        storage,
        Box::new(|state: SessionState| tracing::info!(?state, "status")),
        Box::new(|message: String| tracing::error!(%message, "error")),
    );

    unsafe {
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
    }

    if let Err(e) = controller.start() {
        tracing::error!(%e, "failed to start session");
        std::process::exit(1);
    }

    tracing::info!("recording started, press Ctrl+C to stop");
    while RUNNING.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    if let Err(e) = controller.stop() {
        tracing::error!(%e, "failed to stop session cleanly");
        std::process::exit(1);
    }

    if let Some(path) = controller.output_path() {
        tracing::info!(path = %path.display(), "recording finalized");
    }
}

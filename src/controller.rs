//! C9 — wires C1-C8, runs the encode loop, and mediates the state machine
//! and external callbacks (`spec.md` §4.9).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::adapters::{AudioAdapter, CaptureAdapter};
use crate::clock::now_hns;
use crate::config::EncoderProfile;
use crate::encoder::VideoEncoder;
use crate::error::ControllerError;
use crate::frame::{AudioPacket, VideoFrame};
use crate::mux::MuxWriter;
use crate::pacer::{FramePacer, PaceAction};
use crate::power::PowerSource;
use crate::queue::{BoundedQueue, AUDIO_QUEUE_CAPACITY, VIDEO_QUEUE_CAPACITY};
use crate::state_machine::{SessionEvent, SessionMachine, SessionState};
use crate::storage::StorageManager;
use crate::sync_manager::SyncManager;
use crate::telemetry::{Telemetry, TelemetrySnapshot};

pub type StatusCallback = Box<dyn Fn(SessionState) + Send>;
pub type ErrorCallback = Box<dyn Fn(String) + Send>;

struct EncodeTaskHandles {
    running: Arc<AtomicBool>,
    handle: std::thread::JoinHandle<()>,
}

/// State touched only from the encode thread and the control surface —
/// never from the capture/audio/storage background threads directly, so
/// this mutex is never the one a device-lost or low-disk callback needs to
/// acquire (see `ControlHandles`).
struct Shared {
    machine: SessionMachine,
    sync: SyncManager,
    pacer: FramePacer,
    encoder: VideoEncoder,
    mux: MuxWriter,
    telemetry: Arc<Telemetry>,
    final_path: Option<std::path::PathBuf>,
    cached_frame: Option<VideoFrame>,
    encode_task: Option<EncodeTaskHandles>,
}

/// Clone-cheap bundle of everything an auto-stop path (device-lost, low
/// disk) needs to drive a full drain-and-finalize from whatever background
/// thread raised the event. Capture, audio, and storage each get their own
/// mutex, independent of `shared`'s — so `drain_and_finalize` can block
/// joining the capture/audio/poller thread while that thread's own
/// callback is, at the same moment, only ever waiting on `shared`'s lock,
/// never on the lock `drain_and_finalize` is already holding.
#[derive(Clone)]
struct ControlHandles {
    shared: Arc<Mutex<Shared>>,
    capture: Arc<Mutex<Box<dyn CaptureAdapter>>>,
    audio: Arc<Mutex<Box<dyn AudioAdapter>>>,
    storage: Arc<Mutex<StorageManager>>,
    on_status: Arc<Mutex<Option<StatusCallback>>>,
    on_error: Arc<Mutex<Option<ErrorCallback>>>,
}

pub struct SessionController {
    handles: ControlHandles,
    power: Box<dyn PowerSource>,
    video_queue: Arc<BoundedQueue<VideoFrame>>,
    audio_queue: Arc<BoundedQueue<AudioPacket>>,
    muted: Arc<AtomicBool>,
    profile: EncoderProfile,
}

impl SessionController {
    pub fn new(
        capture: Box<dyn CaptureAdapter>,
        audio: Box<dyn AudioAdapter>,
        power: Box<dyn PowerSource>,
        hardware_provider: Box<dyn crate::encoder::hardware::HardwareProvider>,
    ) -> Self {
        Self {
            handles: ControlHandles {
                shared: Arc::new(Mutex::new(Shared {
                    machine: SessionMachine::new(),
                    sync: SyncManager::new(crate::clock::HNS_PER_SEC),
                    pacer: FramePacer::new(30),
                    encoder: VideoEncoder::new(hardware_provider),
                    mux: MuxWriter::new(),
                    telemetry: Arc::new(Telemetry::new()),
                    final_path: None,
                    cached_frame: None,
                    encode_task: None,
                })),
                capture: Arc::new(Mutex::new(capture)),
                audio: Arc::new(Mutex::new(audio)),
                storage: Arc::new(Mutex::new(StorageManager::new())),
                on_status: Arc::new(Mutex::new(None)),
                on_error: Arc::new(Mutex::new(None)),
            },
            power,
            video_queue: Arc::new(BoundedQueue::new(VIDEO_QUEUE_CAPACITY)),
            audio_queue: Arc::new(BoundedQueue::new(AUDIO_QUEUE_CAPACITY)),
            muted: Arc::new(AtomicBool::new(false)),
            profile: EncoderProfile::default(),
        }
    }

    pub fn initialize(
        &mut self,
        storage: StorageManager,
        on_status: StatusCallback,
        on_error: ErrorCallback,
    ) {
        *self.handles.storage.lock().unwrap() = storage;
        *self.handles.on_status.lock().unwrap() = Some(on_status);
        *self.handles.on_error.lock().unwrap() = Some(on_error);
    }

    pub fn set_encoder_profile(&mut self, profile: EncoderProfile) {
        self.profile = profile;
    }

    pub fn state(&self) -> SessionState {
        self.handles.shared.lock().unwrap().machine.state()
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
        self.handles.audio.lock().unwrap().set_muted(muted);
    }

    pub fn output_path(&self) -> Option<std::path::PathBuf> {
        self.handles.shared.lock().unwrap().final_path.clone()
    }

    pub fn telemetry_snapshot(&self) -> TelemetrySnapshot {
        self.handles.shared.lock().unwrap().telemetry.snapshot()
    }

    fn notify_status(&self, state: SessionState) {
        if let Some(cb) = self.handles.on_status.lock().unwrap().as_ref() {
            cb(state);
        }
    }

    fn notify_error(&self, message: impl Into<String>) {
        let message = message.into();
        error!(%message, "session error");
        if let Some(cb) = self.handles.on_error.lock().unwrap().as_ref() {
            cb(message);
        }
    }

    /// `spec.md` §4.9 "Start".
    pub fn start(&mut self) -> Result<(), ControllerError> {
        {
            let mut shared = self.handles.shared.lock().unwrap();
            if !shared.machine.transition(SessionEvent::Start) {
                return Err(ControllerError::InvalidTransition {
                    state: shared.machine.state().to_string(),
                    event: "Start".to_string(),
                });
            }
        }

        let mut profile = self.profile;
        crate::power::clamp_for_power(&mut profile, self.power.as_ref());

        let staging_path = self.handles.storage.lock().unwrap().generate_filename();
        let final_path = StorageManager::partial_to_final(&staging_path);

        let mut shared = self.handles.shared.lock().unwrap();
        shared.sync.start(now_hns());

        let tier = match shared.encoder.initialize(&profile) {
            Ok(tier) => tier,
            Err(e) => {
                drop(shared);
                self.force_stop_after_init_failure();
                self.notify_error(format!("encoder initialization failed: {e}"));
                return Err(ControllerError::Encoder(e));
            }
        };
        shared.telemetry.set_tier(tier);

        let (sps, pps) = shared.encoder.parameter_sets();
        let audio_sample_rate = self.handles.audio.lock().unwrap().sample_rate();
        let audio_channels = self.handles.audio.lock().unwrap().channels();
        if let Err(e) = shared.mux.initialize(
            staging_path,
            final_path.clone(),
            &profile,
            audio_sample_rate,
            audio_channels,
            sps,
            pps,
        ) {
            drop(shared);
            self.force_stop_after_init_failure();
            self.notify_error(format!("mux initialization failed: {e}"));
            return Err(ControllerError::Mux(e));
        }
        shared.final_path = Some(final_path);
        shared.telemetry.reset();
        shared.pacer = FramePacer::new(profile.fps);
        shared.cached_frame = None;
        drop(shared);

        self.handles.capture.lock().unwrap().initialize(self.video_queue.clone());
        self.handles.audio.lock().unwrap().initialize(self.audio_queue.clone());

        let handles_for_device_lost = self.handles.clone();
        self.handles.capture.lock().unwrap().set_device_lost_callback(Box::new(move || {
            warn!("capture device lost, stopping session");
            auto_stop(&handles_for_device_lost, "capture device lost".to_string());
        }));

        self.spawn_encode_task();
        self.handles.capture.lock().unwrap().start();
        self.handles.audio.lock().unwrap().start();

        let handles_for_low_disk = self.handles.clone();
        self.handles.storage.lock().unwrap().start_polling(Duration::from_secs(5), move || {
            auto_stop(&handles_for_low_disk, "\u{26a0} Disk space critically low".to_string());
        });

        self.notify_status(SessionState::Recording);
        info!(tier = ?tier, "session started");
        Ok(())
    }

    fn force_stop_after_init_failure(&self) {
        let mut shared = self.handles.shared.lock().unwrap();
        shared.machine.transition(SessionEvent::Stop);
        shared.machine.transition(SessionEvent::Finalized);
    }

    /// `spec.md` §4.9 "Stop".
    pub fn stop(&mut self) -> Result<(), ControllerError> {
        {
            let mut shared = self.handles.shared.lock().unwrap();
            if !shared.machine.transition(SessionEvent::Stop) {
                return Err(ControllerError::InvalidTransition {
                    state: shared.machine.state().to_string(),
                    event: "Stop".to_string(),
                });
            }
        }

        let result = drain_and_finalize(&self.handles);
        self.notify_status(SessionState::Idle);
        result
    }

    /// `spec.md` §4.9 "Pause".
    pub fn pause(&mut self) -> Result<(), ControllerError> {
        let mut shared = self.handles.shared.lock().unwrap();
        if !shared.machine.transition(SessionEvent::Pause) {
            return Err(ControllerError::InvalidTransition {
                state: shared.machine.state().to_string(),
                event: "Pause".to_string(),
            });
        }
        shared.sync.pause(now_hns());
        shared.pacer.reset();
        drop(shared);
        self.notify_status(SessionState::Paused);
        Ok(())
    }

    /// `spec.md` §4.9 "Resume".
    pub fn resume(&mut self) -> Result<(), ControllerError> {
        let mut shared = self.handles.shared.lock().unwrap();
        if !shared.machine.transition(SessionEvent::Resume) {
            return Err(ControllerError::InvalidTransition {
                state: shared.machine.state().to_string(),
                event: "Resume".to_string(),
            });
        }
        shared.sync.resume(now_hns());
        shared.pacer.reset();
        shared.encoder.request_keyframe();
        drop(shared);
        self.notify_status(SessionState::Recording);
        Ok(())
    }

    /// Spawns the encode thread running the `spec.md` §4.9.2 hot loop.
    fn spawn_encode_task(&mut self) {
        let running = Arc::new(AtomicBool::new(true));
        let running_for_thread = running.clone();
        let shared = self.handles.shared.clone();
        let video_queue = self.video_queue.clone();
        let audio_queue = self.audio_queue.clone();

        let handle = std::thread::spawn(move || {
            loop {
                let mut made_progress = false;

                if let Some(frame) = video_queue.try_pop() {
                    made_progress = true;
                    let mut shared = shared.lock().unwrap();
                    let state = shared.machine.state();
                    if state == SessionState::Paused {
                        shared.telemetry.incr_dropped();
                    } else {
                        let queue_full = false;
                        let session_pts = shared.sync.to_pts(frame.pts);
                        let (action, out_pts) = shared.pacer.pace(session_pts, queue_full);
                        match action {
                            PaceAction::Drop => {
                                shared.telemetry.incr_dropped();
                            }
                            PaceAction::Duplicate => {
                                shared.telemetry.incr_duplicated();
                                if let Some(cached) = shared.cached_frame.clone() {
                                    let midpoint = (cached.pts + out_pts) / 2;
                                    let dup_frame = cached.as_duplicate(midpoint);
                                    match shared.encoder.encode(&dup_frame) {
                                        Ok(Some(sample)) => {
                                            if let Err(e) = shared.mux.write_video(
                                                sample.pts,
                                                &sample.data,
                                                sample.is_keyframe,
                                            ) {
                                                warn!(%e, "mux write failed for duplicate sample");
                                                shared.telemetry.incr_dropped();
                                            } else {
                                                shared.telemetry.incr_encoded();
                                            }
                                        }
                                        Ok(None) => {}
                                        Err(e) => {
                                            warn!(%e, "encode submit failed for duplicate frame");
                                            shared.telemetry.incr_dropped();
                                        }
                                    }
                                }
                            }
                            PaceAction::Accept => {}
                        }

                        if action != PaceAction::Drop {
                            let mut out_frame = frame.clone();
                            out_frame.pts = out_pts;
                            match shared.encoder.encode(&out_frame) {
                                Ok(Some(sample)) => {
                                    if let Err(e) = shared.mux.write_video(
                                        sample.pts,
                                        &sample.data,
                                        sample.is_keyframe,
                                    ) {
                                        warn!(%e, "mux write failed");
                                        shared.telemetry.incr_dropped();
                                    } else {
                                        shared.telemetry.incr_encoded();
                                    }
                                }
                                Ok(None) => {}
                                Err(e) => {
                                    warn!(%e, "encode submit failed");
                                    shared.telemetry.incr_dropped();
                                }
                            }
                            shared.cached_frame = Some(out_frame);
                        }
                    }
                    shared.telemetry.set_queue_depth(video_queue.size() as u32);
                }

                while let Some(packet) = audio_queue.try_pop() {
                    made_progress = true;
                    let mut shared = shared.lock().unwrap();
                    if shared.machine.state() == SessionState::Paused {
                        continue;
                    }
                    let audio_pts = shared.sync.to_pts(packet.pts);
                    if let Err(e) = shared.mux.write_audio(audio_pts, &packet.samples, packet.sample_rate) {
                        warn!(%e, "mux audio write failed");
                    } else {
                        shared.telemetry.incr_audio_muxed();
                    }
                }

                if !running_for_thread.load(Ordering::SeqCst) && video_queue.empty() {
                    break;
                }

                if !made_progress {
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        });

        self.handles.shared.lock().unwrap().encode_task = Some(EncodeTaskHandles { running, handle });
    }
}

/// Drains capture/audio/the storage poller/the encode thread and finalizes
/// the mux. Shared between the user-invoked `stop()` (called on the
/// caller's own thread) and `auto_stop` below (always dispatched onto a
/// freshly spawned thread). Each of capture/audio/storage carries its own
/// mutex, so blocking here to join one of their background threads never
/// contends with whatever mutex that thread's own device-lost/low-disk
/// callback needs (`shared`'s, via `auto_stop`) — see `ControlHandles`.
fn drain_and_finalize(handles: &ControlHandles) -> Result<(), ControllerError> {
    handles.storage.lock().unwrap().stop_polling();
    handles.capture.lock().unwrap().stop();
    handles.audio.lock().unwrap().stop();

    let task = handles.shared.lock().unwrap().encode_task.take();
    if let Some(task) = task {
        task.running.store(false, Ordering::SeqCst);
        if task.handle.thread().id() == std::thread::current().id() {
            warn!("drain_and_finalize called re-entrantly from the encode thread; not joining");
        } else {
            let _ = task.handle.join();
        }
    }

    let mut shared = handles.shared.lock().unwrap();
    match shared.encoder.flush() {
        Ok(samples) => {
            for sample in samples {
                if let Err(e) = shared.mux.write_video(sample.pts, &sample.data, sample.is_keyframe) {
                    warn!(%e, "failed to write flushed video sample");
                }
            }
        }
        Err(e) => warn!(%e, "encoder flush failed"),
    }

    let finalize_result = shared.mux.finalize();
    shared.machine.transition(SessionEvent::Finalized);
    finalize_result.map_err(ControllerError::Mux)
}

/// Drives the device-lost / low-disk auto-stop path (`spec.md` §4.9 step 9,
/// §4.8, §7's "`Stopping` always reaches `Finalized`"). Transitions to
/// `Stopping` synchronously (cheap, no I/O) so a racing user-initiated
/// `stop()` can't also win, then always finishes the drain and finalize on
/// a freshly spawned thread — never inline on the calling thread — so a
/// real adapter raising this event from its own background thread can
/// never end up joining itself inside `drain_and_finalize`.
fn auto_stop(handles: &ControlHandles, reason: String) {
    let transitioned = handles.shared.lock().unwrap().machine.transition(SessionEvent::Stop);
    if !transitioned {
        return;
    }
    if let Some(cb) = handles.on_error.lock().unwrap().as_ref() {
        cb(reason);
    }

    let handles = handles.clone();
    std::thread::spawn(move || {
        if let Err(e) = drain_and_finalize(&handles) {
            warn!(%e, "auto-stop finalize failed");
        }
        if let Some(cb) = handles.on_status.lock().unwrap().as_ref() {
            cb(SessionState::Idle);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{SyntheticAudioAdapter, SyntheticCaptureAdapter};
    use crate::encoder::hardware::NoHardware;
    use crate::power::UnknownPower;

    fn new_controller() -> SessionController {
        SessionController::new(
            Box::new(SyntheticCaptureAdapter::new(64, 64, 30)),
            Box::new(SyntheticAudioAdapter::new()),
            Box::new(UnknownPower),
            Box::new(NoHardware),
        )
    }

    #[test]
    fn starts_in_idle_state() {
        let controller = new_controller();
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[test]
    fn pause_before_start_is_rejected() {
        let mut controller = new_controller();
        assert!(controller.pause().is_err());
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[test]
    fn set_muted_is_observable_without_an_active_session() {
        let mut controller = new_controller();
        assert!(!controller.is_muted());
        controller.set_muted(true);
        assert!(controller.is_muted());
    }
}

//! Audio adapter interface (`spec.md` §6) and a synthetic reference
//! implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::now_hns;
use crate::frame::AudioPacket;
use crate::queue::BoundedQueue;

pub type DeviceInvalidCallback = Box<dyn Fn() + Send>;

pub trait AudioAdapter: Send {
    fn initialize(&mut self, audio_queue: Arc<BoundedQueue<AudioPacket>>);
    fn start(&mut self);
    fn stop(&mut self);
    fn set_muted(&mut self, muted: bool);
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;
    fn bits_per_sample(&self) -> u16;
    fn set_device_invalid_callback(&mut self, callback: DeviceInvalidCallback);
}

const SAMPLES_PER_PACKET: u32 = 480; // 10ms at 48kHz

/// Emits 48 kHz stereo packets on a fixed cadence; when muted, continues at
/// the same cadence with zeroed payload and `is_silence = true` (`spec.md`
/// §6, §4.9's Mute operation).
pub struct SyntheticAudioAdapter {
    sample_rate: u32,
    channels: u16,
    queue: Option<Arc<BoundedQueue<AudioPacket>>>,
    muted: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    device_invalid: Option<DeviceInvalidCallback>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl SyntheticAudioAdapter {
    pub fn new() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            queue: None,
            muted: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            device_invalid: None,
            handle: None,
        }
    }

    pub fn simulate_device_invalid(&self) {
        if let Some(cb) = self.device_invalid.as_ref() {
            cb();
        }
    }
}

impl Default for SyntheticAudioAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioAdapter for SyntheticAudioAdapter {
    fn initialize(&mut self, audio_queue: Arc<BoundedQueue<AudioPacket>>) {
        self.queue = Some(audio_queue);
    }

    fn start(&mut self) {
        let Some(queue) = self.queue.clone() else {
            return;
        };
        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let muted = self.muted.clone();
        let sample_rate = self.sample_rate;
        let channels = self.channels;
        let packet_interval =
            Duration::from_secs_f64(SAMPLES_PER_PACKET as f64 / sample_rate as f64);

        self.handle = Some(std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                let pts = now_hns();
                let packet = if muted.load(Ordering::SeqCst) {
                    AudioPacket::silence(SAMPLES_PER_PACKET, pts, sample_rate, channels)
                } else {
                    AudioPacket {
                        samples: vec![0u8; SAMPLES_PER_PACKET as usize * channels as usize * 2],
                        frame_count: SAMPLES_PER_PACKET,
                        pts,
                        is_silence: false,
                        sample_rate,
                        channels,
                    }
                };
                let _ = queue.push_drop_oldest(packet);
                std::thread::sleep(packet_interval);
            }
        }));
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn bits_per_sample(&self) -> u16 {
        16
    }

    fn set_device_invalid_callback(&mut self, callback: DeviceInvalidCallback) {
        self.device_invalid = Some(callback);
    }
}

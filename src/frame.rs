//! Core media types passed between the queues, pacer, encoder, and mux
//! (`spec.md` §3 "Video frame", "Audio packet", "File context").

use std::path::PathBuf;
use std::sync::Arc;

use crate::clock::Hns;

/// An opaque, reference-counted handle to a captured image.
///
/// Grounded on the teacher's `CMSampleBuffer`/IOSurface handle, which is
/// GPU-resident and never copied by the pipeline — here represented as an
/// `Arc<[u8]>` over an NV12-formatted plane so the pacer's duplicate action
/// can cheaply retain a second reference to the same texture (`spec.md` §9's
/// "shared ownership of GPU frames" note).
pub type ImageHandle = Arc<[u8]>;

/// Move-only through the video queue; `duplicate` is set by the pacer when
/// this frame is a re-encoded copy of a previously captured one, not a new
/// capture.
#[derive(Clone)]
pub struct VideoFrame {
    pub image: ImageHandle,
    pub width: u32,
    pub height: u32,
    pub pts: Hns,
    pub duplicate: bool,
}

impl VideoFrame {
    pub fn new(image: ImageHandle, width: u32, height: u32, pts: Hns) -> Self {
        Self {
            image,
            width,
            height,
            pts,
            duplicate: false,
        }
    }

    /// Build the pacer's re-encode of a cached frame at a midpoint PTS
    /// (`spec.md` §4.9.2 step 1.d). Shares the same image handle; no copy.
    pub fn as_duplicate(&self, pts: Hns) -> Self {
        Self {
            image: self.image.clone(),
            width: self.width,
            height: self.height,
            pts,
            duplicate: true,
        }
    }
}

/// A buffer of interleaved PCM samples. Copyable and small (~1-20 KB per
/// `spec.md` §3), so unlike `VideoFrame` this is plain owned data.
#[derive(Clone)]
pub struct AudioPacket {
    pub samples: Vec<u8>,
    pub frame_count: u32,
    pub pts: Hns,
    pub is_silence: bool,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioPacket {
    /// Duration in 100-ns units: `frame_count * 10_000_000 / sample_rate`
    /// (`spec.md` §4.9.2 step 2).
    pub fn duration_hns(&self) -> Hns {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.frame_count as i64 * 10_000_000) / self.sample_rate as i64
    }

    /// Construct a zeroed, silence-flagged packet of the same shape emitted
    /// while muted (`spec.md` §6 "audio adapter interface").
    pub fn silence(frame_count: u32, pts: Hns, sample_rate: u32, channels: u16) -> Self {
        let byte_count = frame_count as usize * channels as usize * 2; // 16-bit PCM
        Self {
            samples: vec![0u8; byte_count],
            frame_count,
            pts,
            is_silence: true,
            sample_rate,
            channels,
        }
    }
}

/// Tracks the staging/final path pair and lock handle for one session's
/// output file (`spec.md` §3 "File context", §4.7).
pub struct FileContext {
    pub staging_path: PathBuf,
    pub final_path: PathBuf,
    pub bytes_written: u64,
}

impl FileContext {
    pub fn new(staging_path: PathBuf, final_path: PathBuf) -> Self {
        Self {
            staging_path,
            final_path,
            bytes_written: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_shares_the_same_image_handle() {
        let image: ImageHandle = Arc::from(vec![0u8; 16]);
        let frame = VideoFrame::new(image.clone(), 1920, 1080, 1_000);
        let dup = frame.as_duplicate(1_500);
        assert!(Arc::ptr_eq(&frame.image, &dup.image));
        assert!(dup.duplicate);
        assert!(!frame.duplicate);
        assert_eq!(dup.pts, 1_500);
    }

    #[test]
    fn audio_duration_matches_sample_rate() {
        let packet = AudioPacket {
            samples: vec![],
            frame_count: 48_000,
            pts: 0,
            is_silence: false,
            sample_rate: 48_000,
            channels: 2,
        };
        assert_eq!(packet.duration_hns(), 10_000_000);
    }

    #[test]
    fn silence_packet_is_zeroed_and_flagged() {
        let packet = AudioPacket::silence(480, 1_000, 48_000, 2);
        assert!(packet.is_silence);
        assert!(packet.samples.iter().all(|&b| b == 0));
        assert_eq!(packet.samples.len(), 480 * 2 * 2);
    }
}

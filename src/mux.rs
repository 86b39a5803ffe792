//! C7 — staging-then-rename MP4 writer with an exclusive write lock
//! (`spec.md` §4.7).
//!
//! The teacher writes straight to the final path through `AVAssetWriter`
//! (`writer.rs`); there is no staging file because `AVAssetWriter` already
//! guarantees the `moov` atom is only written on a clean `finishWriting`.
//! This core runs on top of the `mp4` crate instead (the pack's Rust MP4
//! muxer, also a `waycap-rs` dependency) and gets the same all-or-nothing
//! guarantee by writing to `*.partial.mp4` and renaming atomically at
//! `finalize()` — `spec.md` §4.7's protocol, and the mechanism that backs
//! I5 and the orphan-recovery flow in §4.8.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use mp4::{AacConfig, AvcConfig, MediaConfig, Mp4Config, Mp4Sample, Mp4Writer, TrackConfig};
use tracing::{info, warn};

use crate::clock::Hns;
use crate::config::EncoderProfile;
use crate::error::MuxError;
use crate::frame::FileContext;

fn hns_to_mp4_timescale(pts: Hns, timescale: u32) -> u64 {
    (pts as i128 * timescale as i128 / 10_000_000) as u64
}

/// Holds the exclusive, deny-write lock on the staging file for the
/// session's lifetime (`spec.md` §4.7 step 2). Acquisition failure is
/// logged and non-fatal: recording proceeds with weaker external-writer
/// protection.
struct WriteLock {
    _file: File,
}

impl WriteLock {
    #[cfg(unix)]
    fn acquire(path: &Path) -> Option<Self> {
        use std::os::unix::io::AsRawFd;
        let file = OpenOptions::new().write(true).open(path).ok()?;
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            return None;
        }
        Some(Self { _file: file })
    }

    #[cfg(not(unix))]
    fn acquire(_path: &Path) -> Option<Self> {
        None
    }
}

pub struct MuxWriter {
    writer: Option<Mp4Writer<BufWriter<File>>>,
    lock: Option<WriteLock>,
    context: Option<FileContext>,
    video_track_id: u32,
    audio_track_id: u32,
    video_timescale: u32,
    finalized: bool,
}

impl MuxWriter {
    pub fn new() -> Self {
        Self {
            writer: None,
            lock: None,
            context: None,
            video_track_id: 1,
            audio_track_id: 2,
            video_timescale: 0,
            finalized: false,
        }
    }

    pub fn initialize(
        &mut self,
        staging_path: PathBuf,
        final_path: PathBuf,
        profile: &EncoderProfile,
        audio_sample_rate: u32,
        audio_channels: u16,
        seq_param_set: Vec<u8>,
        pic_param_set: Vec<u8>,
    ) -> Result<(), MuxError> {
        let file = File::create(&staging_path).map_err(|source| MuxError::CreateStaging {
            path: staging_path.clone(),
            source,
        })?;

        let mp4_config = Mp4Config {
            major_brand: str::parse("isom").unwrap(),
            minor_version: 512,
            compatible_brands: vec![
                str::parse("isom").unwrap(),
                str::parse("iso2").unwrap(),
                str::parse("mp41").unwrap(),
            ],
            timescale: 1000,
        };

        let mut writer =
            Mp4Writer::write_start(BufWriter::new(file), &mp4_config).map_err(|e| {
                MuxError::WriteFailed(format!("failed to start mp4 container: {e}"))
            })?;

        self.video_timescale = profile.fps.max(1) * 1000;
        writer
            .add_track(&TrackConfig {
                track_type: mp4::TrackType::Video,
                timescale: self.video_timescale,
                language: "und".to_string(),
                media_conf: MediaConfig::AvcConfig(AvcConfig {
                    width: profile.width as u16,
                    height: profile.height as u16,
                    seq_param_set,
                    pic_param_set,
                }),
            })
            .map_err(|e| MuxError::WriteFailed(format!("failed to add video track: {e}")))?;

        writer
            .add_track(&TrackConfig {
                track_type: mp4::TrackType::Audio,
                timescale: audio_sample_rate,
                language: "und".to_string(),
                media_conf: MediaConfig::AacConfig(AacConfig {
                    bitrate: 128_000,
                    profile: mp4::AudioObjectType::AacLowComplexity,
                    freq_index: mp4::SampleFreqIndex::Freq48000,
                    chan_conf: if audio_channels == 1 {
                        mp4::ChannelConfig::Mono
                    } else {
                        mp4::ChannelConfig::Stereo
                    },
                }),
            })
            .map_err(|e| MuxError::WriteFailed(format!("failed to add audio track: {e}")))?;

        // Step 2: a second handle requesting write-access with a deny-write
        // share mode. `flock` is the Unix equivalent the teacher's own root
        // CLI and the pack's `waycap-rs` already depend on `libc` for.
        self.lock = match WriteLock::acquire(&staging_path) {
            Some(lock) => Some(lock),
            None => {
                warn!(path = %staging_path.display(), "failed to acquire exclusive write lock; recording proceeds with weaker external-writer protection");
                None
            }
        };

        self.writer = Some(writer);
        self.context = Some(FileContext::new(staging_path, final_path));
        self.finalized = false;
        Ok(())
    }

    /// `data` must already be length-prefixed (AVCC) with parameter-set
    /// NALs stripped — the encoder tier owns that conversion before the
    /// sample ever reaches the mux.
    pub fn write_video(&mut self, pts: Hns, data: &[u8], is_keyframe: bool) -> Result<(), MuxError> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            MuxError::WriteFailed("write_video called before initialize".into())
        })?;
        let start_time = hns_to_mp4_timescale(pts, self.video_timescale);
        writer
            .write_sample(
                self.video_track_id,
                &Mp4Sample {
                    start_time,
                    duration: 0,
                    rendering_offset: 0,
                    is_sync: is_keyframe,
                    bytes: data.to_vec().into(),
                },
            )
            .map_err(|e| MuxError::WriteFailed(e.to_string()))?;
        if let Some(ctx) = self.context.as_mut() {
            ctx.bytes_written += data.len() as u64;
        }
        Ok(())
    }

    pub fn write_audio(
        &mut self,
        pts: Hns,
        data: &[u8],
        sample_rate: u32,
    ) -> Result<(), MuxError> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            MuxError::WriteFailed("write_audio called before initialize".into())
        })?;
        let start_time = hns_to_mp4_timescale(pts, sample_rate);
        writer
            .write_sample(
                self.audio_track_id,
                &Mp4Sample {
                    start_time,
                    duration: 0,
                    rendering_offset: 0,
                    is_sync: true,
                    bytes: data.to_vec().into(),
                },
            )
            .map_err(|e| MuxError::WriteFailed(e.to_string()))?;
        if let Some(ctx) = self.context.as_mut() {
            ctx.bytes_written += data.len() as u64;
        }
        Ok(())
    }

    /// Closes the muxer, drops the lock, and renames staging to final.
    /// Runs at most once per session (I5) — a second call is rejected.
    pub fn finalize(&mut self) -> Result<(), MuxError> {
        if self.finalized {
            return Err(MuxError::AlreadyFinalized);
        }
        self.finalized = true;

        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| MuxError::WriteFailed("finalize called before initialize".into()))?;
        writer
            .write_end()
            .map_err(|e| MuxError::WriteFailed(format!("failed to flush mp4 trailer: {e}")))?;
        drop(writer);

        self.lock.take();

        let context = self
            .context
            .take()
            .ok_or_else(|| MuxError::WriteFailed("no file context to finalize".into()))?;

        std::fs::rename(&context.staging_path, &context.final_path).map_err(|source| {
            MuxError::RenameFailed {
                from: context.staging_path.clone(),
                to: context.final_path.clone(),
                source,
            }
        })?;

        info!(path = %context.final_path.display(), bytes = context.bytes_written, "mux finalized");
        Ok(())
    }
}

impl Default for MuxWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hns_conversion_matches_whole_seconds() {
        assert_eq!(hns_to_mp4_timescale(10_000_000, 1000), 1000);
        assert_eq!(hns_to_mp4_timescale(0, 1000), 0);
    }

    #[test]
    fn finalize_before_initialize_is_an_error() {
        let mut mux = MuxWriter::new();
        assert!(mux.finalize().is_err());
    }
}

//! Encoder profile and persisted settings (`spec.md` §3 "Encoder profile",
//! §6 "Persisted settings").
//!
//! Grounded on the teacher's `RecordingQuality`/`RecordingState` shape
//! (`commands.rs`) and `ZoomConfig` (`zoom.rs`): plain serde structs with a
//! `Default` impl, loaded from and saved to a JSON file under the user's
//! config directory via `dirs`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum RateControlMode {
    ConstantBitrate,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProfileTag {
    Baseline,
    Main,
}

/// Encoder configuration resolved before `initialize()` (`spec.md` §3).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct EncoderProfile {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate_bps: u32,
    pub low_latency: bool,
    pub b_frames: u32,
    pub profile: ProfileTag,
    pub rate_control: RateControlMode,
}

impl EncoderProfile {
    /// GOP length in frames is always `2 * fps` (`spec.md` §4.6).
    pub fn gop_length_frames(&self) -> u32 {
        2 * self.fps
    }
}

impl Default for EncoderProfile {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
            bitrate_bps: 8_000_000,
            low_latency: true,
            b_frames: 0,
            profile: ProfileTag::Main,
            rate_control: RateControlMode::ConstantBitrate,
        }
    }
}

/// Persisted, user-overridable settings (`spec.md` §6, listed out of scope
/// beyond the key/value shape — loading/saving is ambient config-layer
/// plumbing we still need for `set_encoder_profile` to have something to
/// merge against).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecorderConfig {
    pub fps: u32,
    pub bitrate_bps: u32,
    pub output_dir: Option<PathBuf>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            bitrate_bps: 8_000_000,
            output_dir: None,
        }
    }
}

impl RecorderConfig {
    fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("castrail").join("settings.json"))
    }

    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            return Self::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::settings_path() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)
    }

    /// Merge this config's overrides onto a default profile, keeping
    /// resolution and every other field at its default (`spec.md` §4.9 step
    /// 5 merges "user overrides with defaults" before the power clamp).
    pub fn merge_into(&self, profile: &mut EncoderProfile) {
        profile.fps = self.fps;
        profile.bitrate_bps = self.bitrate_bps;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gop_length_is_twice_fps() {
        let mut p = EncoderProfile::default();
        p.fps = 60;
        assert_eq!(p.gop_length_frames(), 120);
    }

    #[test]
    fn merge_into_overrides_fps_and_bitrate_only() {
        let config = RecorderConfig {
            fps: 60,
            bitrate_bps: 4_000_000,
            output_dir: None,
        };
        let mut profile = EncoderProfile::default();
        let original_width = profile.width;
        config.merge_into(&mut profile);
        assert_eq!(profile.fps, 60);
        assert_eq!(profile.bitrate_bps, 4_000_000);
        assert_eq!(profile.width, original_width);
    }

    #[test]
    fn default_round_trips_through_json() {
        let config = RecorderConfig::default();
        let raw = serde_json::to_string(&config).unwrap();
        let back: RecorderConfig = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.fps, config.fps);
        assert_eq!(back.bitrate_bps, config.bitrate_bps);
    }
}

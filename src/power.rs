//! Power-source query used by the §4.9.1 clamp.
//!
//! The teacher has no equivalent (macOS builds read battery state through
//! IOKit, which isn't in this pack); modeled as a small trait so the
//! controller can be tested against a deterministic double rather than the
//! real OS API, the same seam the teacher uses for `HardwareProvider`
//! (`src/encoder/hardware.rs`).

use crate::telemetry::PowerBit;

pub trait PowerSource: Send + Sync {
    fn current(&self) -> PowerBit;
}

/// Reports `Unknown` unconditionally — the conservative default (`spec.md`
/// §4.9.1: "on AC or unknown, pass the profile through unchanged").
pub struct UnknownPower;

impl PowerSource for UnknownPower {
    fn current(&self) -> PowerBit {
        PowerBit::Unknown
    }
}

/// Deterministic test double.
pub struct FixedPower(pub PowerBit);

impl PowerSource for FixedPower {
    fn current(&self) -> PowerBit {
        self.0
    }
}

/// Apply the §4.9.1 clamp in place: on battery, `fps := min(fps, 30)` and
/// `bitrate := min(bitrate, 8 Mb/s)`. Resolution is never touched.
pub fn clamp_for_power(profile: &mut crate::config::EncoderProfile, power: &dyn PowerSource) {
    if power.current() == PowerBit::Battery {
        profile.fps = profile.fps.min(30);
        profile.bitrate_bps = profile.bitrate_bps.min(8_000_000);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncoderProfile;

    #[test]
    fn battery_clamps_fps_and_bitrate() {
        let mut profile = EncoderProfile {
            fps: 60,
            bitrate_bps: 20_000_000,
            ..Default::default()
        };
        clamp_for_power(&mut profile, &FixedPower(PowerBit::Battery));
        assert_eq!(profile.fps, 30);
        assert_eq!(profile.bitrate_bps, 8_000_000);
    }

    #[test]
    fn ac_and_unknown_pass_through_unchanged() {
        for power in [PowerBit::Ac, PowerBit::Unknown] {
            let mut profile = EncoderProfile {
                fps: 60,
                bitrate_bps: 20_000_000,
                ..Default::default()
            };
            clamp_for_power(&mut profile, &FixedPower(power));
            assert_eq!(profile.fps, 60);
            assert_eq!(profile.bitrate_bps, 20_000_000);
        }
    }

    #[test]
    fn resolution_is_never_clamped() {
        let mut profile = EncoderProfile {
            width: 3840,
            height: 2160,
            ..Default::default()
        };
        clamp_for_power(&mut profile, &FixedPower(PowerBit::Battery));
        assert_eq!(profile.width, 3840);
        assert_eq!(profile.height, 2160);
    }
}

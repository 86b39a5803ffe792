//! S8: with the hardware tier forced to fail, `VideoEncoder::initialize`
//! commits to the software tier at the configured resolution.

use castrail_core::config::EncoderProfile;
use castrail_core::encoder::hardware::{HardwareProvider, HardwareSession};
use castrail_core::encoder::{EncoderTier, VideoEncoder};
use castrail_core::error::EncoderError;

struct AlwaysFailsHardware;

impl HardwareProvider for AlwaysFailsHardware {
    fn attach(&self, _profile: &EncoderProfile) -> Result<Box<dyn HardwareSession>, EncoderError> {
        Err(EncoderError::HardwareUnavailable("test double, no hardware".into()))
    }
}

#[test]
fn falls_back_to_software_original_resolution() {
    let mut encoder = VideoEncoder::new(Box::new(AlwaysFailsHardware));
    let profile = EncoderProfile {
        width: 640,
        height: 480,
        fps: 30,
        bitrate_bps: 2_000_000,
        ..Default::default()
    };
    let tier = encoder
        .initialize(&profile)
        .expect("software tier should succeed when hardware is unavailable");
    assert_eq!(tier, EncoderTier::SoftwareOriginal);
    assert_eq!(encoder.committed_tier(), Some(EncoderTier::SoftwareOriginal));
}

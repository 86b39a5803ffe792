//! C6 — H.264 encoder with a three-tier fallback chain and on-demand IDR
//! (`spec.md` §4.6).

pub mod hardware;
pub mod software;

use tracing::{info, warn};

use crate::config::EncoderProfile;
use crate::error::EncoderError;
use crate::frame::VideoFrame;
use hardware::{HardwareProvider, HardwareSession};
use software::SoftwareSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderTier {
    Hardware,
    SoftwareOriginal,
    Software720p30,
}

pub struct EncodedSample {
    pub data: Vec<u8>,
    pub pts: crate::clock::Hns,
    pub is_keyframe: bool,
}

enum Session {
    Hardware(Box<dyn HardwareSession>),
    Software(SoftwareSession),
}

/// Once `initialize()` commits to a tier, that tier is fixed for the
/// session — `spec.md` §4.6's invariant.
pub struct VideoEncoder {
    hardware_provider: Box<dyn HardwareProvider>,
    session: Option<Session>,
    tier: Option<EncoderTier>,
    request_keyframe: bool,
}

impl VideoEncoder {
    pub fn new(hardware_provider: Box<dyn HardwareProvider>) -> Self {
        Self {
            hardware_provider,
            session: None,
            tier: None,
            request_keyframe: false,
        }
    }

    pub fn committed_tier(&self) -> Option<EncoderTier> {
        self.tier
    }

    /// Raw SPS/PPS NAL payloads from the committed tier, for the mux's
    /// `avcC` box. Empty until `initialize()` has committed a tier.
    pub fn parameter_sets(&self) -> (Vec<u8>, Vec<u8>) {
        match self.session.as_ref() {
            Some(Session::Hardware(session)) => session.parameter_sets(),
            Some(Session::Software(session)) => session.parameter_sets(),
            None => (Vec::new(), Vec::new()),
        }
    }

    /// Walks the three tiers in order, committing to the first that
    /// succeeds. Returns `AllTiersFailed` only if all three fail.
    pub fn initialize(&mut self, profile: &EncoderProfile) -> Result<EncoderTier, EncoderError> {
        if self.tier.is_some() {
            return Err(EncoderError::AlreadyCommitted);
        }

        match self.hardware_provider.attach(profile) {
            Ok(session) => {
                info!(tier = "hardware", "encoder tier committed");
                self.session = Some(Session::Hardware(session));
                self.tier = Some(EncoderTier::Hardware);
                return Ok(EncoderTier::Hardware);
            }
            Err(e) => warn!(%e, "hardware tier unavailable, falling back to software"),
        }

        match SoftwareSession::new(profile) {
            Ok(session) => {
                info!(tier = "software_original", w = profile.width, h = profile.height, "encoder tier committed");
                self.session = Some(Session::Software(session));
                self.tier = Some(EncoderTier::SoftwareOriginal);
                return Ok(EncoderTier::SoftwareOriginal);
            }
            Err(e) => warn!(%e, "software tier at original resolution failed, falling back to 720p30"),
        }

        let safe_profile = software::fallback_720p30(profile.bitrate_bps);
        match SoftwareSession::new(&safe_profile) {
            Ok(session) => {
                info!(tier = "software_720p30", "encoder tier committed");
                self.session = Some(Session::Software(session));
                self.tier = Some(EncoderTier::Software720p30);
                Ok(EncoderTier::Software720p30)
            }
            Err(e) => {
                warn!(%e, "all encoder tiers failed");
                Err(EncoderError::AllTiersFailed)
            }
        }
    }

    /// Sets a one-shot flag so the next `encode()` call is forced to an
    /// IDR. Callers MUST invoke this on every `resume()`.
    pub fn request_keyframe(&mut self) {
        self.request_keyframe = true;
    }

    pub fn encode(&mut self, frame: &VideoFrame) -> Result<Option<EncodedSample>, EncoderError> {
        let force_idr = std::mem::take(&mut self.request_keyframe);
        match self.session.as_mut() {
            Some(Session::Hardware(session)) => session.encode(frame, force_idr),
            Some(Session::Software(session)) => session.encode(frame, force_idr),
            None => Err(EncoderError::SubmitFailed("encoder not initialized".into())),
        }
    }

    pub fn flush(&mut self) -> Result<Vec<EncodedSample>, EncoderError> {
        match self.session.as_mut() {
            Some(Session::Hardware(session)) => session.flush(),
            Some(Session::Software(session)) => session.flush(),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EncoderError;
    use hardware::{HardwareProvider, HardwareSession, NoHardware};

    struct FailingHardware;
    impl HardwareProvider for FailingHardware {
        fn attach(&self, _profile: &EncoderProfile) -> Result<Box<dyn HardwareSession>, EncoderError> {
            Err(EncoderError::HardwareUnavailable("forced failure".into()))
        }
    }

    struct StubHardwareSession;
    impl HardwareSession for StubHardwareSession {
        fn encode(
            &mut self,
            frame: &VideoFrame,
            force_idr: bool,
        ) -> Result<Option<super::EncodedSample>, EncoderError> {
            Ok(Some(super::EncodedSample {
                data: vec![0u8; 4],
                pts: frame.pts,
                is_keyframe: force_idr,
            }))
        }
        fn flush(&mut self) -> Result<Vec<super::EncodedSample>, EncoderError> {
            Ok(Vec::new())
        }
    }

    struct WorkingHardware;
    impl HardwareProvider for WorkingHardware {
        fn attach(&self, _profile: &EncoderProfile) -> Result<Box<dyn HardwareSession>, EncoderError> {
            Ok(Box::new(StubHardwareSession))
        }
    }

    #[test]
    fn commits_to_hardware_tier_when_available() {
        let mut encoder = VideoEncoder::new(Box::new(WorkingHardware));
        let tier = encoder.initialize(&EncoderProfile::default()).unwrap();
        assert_eq!(tier, EncoderTier::Hardware);
        assert_eq!(encoder.committed_tier(), Some(EncoderTier::Hardware));
    }

    #[test]
    fn second_initialize_call_is_rejected() {
        let mut encoder = VideoEncoder::new(Box::new(WorkingHardware));
        encoder.initialize(&EncoderProfile::default()).unwrap();
        let result = encoder.initialize(&EncoderProfile::default());
        assert!(matches!(result, Err(EncoderError::AlreadyCommitted)));
    }

    #[test]
    fn default_provider_has_no_hardware() {
        let provider = NoHardware;
        let result = provider.attach(&EncoderProfile::default());
        assert!(result.is_err());
    }

    // S8's software-tier commitment (real `SoftwareSession`, not this
    // hardware stub) is exercised in `tests/encoder_fallback.rs`.
    #[test]
    fn failing_hardware_provider_is_rejected_during_initialize() {
        let result = FailingHardware.attach(&EncoderProfile::default());
        assert!(result.is_err());
    }
}

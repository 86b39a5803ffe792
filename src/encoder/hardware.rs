//! Tier 1 of the fallback chain: a hardware H.264 transform, enumerated and
//! attached through a `HardwareProvider` seam (`spec.md` §4.6 step 1).
//!
//! The teacher's hardware tier is VideoToolbox, reached through
//! `objc2-av-foundation` (`writer.rs`) — platform-specific glue this core
//! has no business depending on directly. `HardwareProvider` is the trait
//! boundary a real deployment plugs a VideoToolbox/NVENC/VAAPI backend into;
//! the default implementation reports no hardware transform available,
//! which is a legitimate outcome the fallback chain is built to handle.

use crate::config::EncoderProfile;
use crate::error::EncoderError;
use crate::frame::VideoFrame;

use super::{EncodedSample, EncoderTier};

pub trait HardwareProvider: Send {
    /// Attempt to attach a hardware transform configured for `profile`.
    /// Returns a boxed session on success.
    fn attach(
        &self,
        profile: &EncoderProfile,
    ) -> Result<Box<dyn HardwareSession>, EncoderError>;
}

pub trait HardwareSession: Send {
    fn encode(&mut self, frame: &VideoFrame, force_idr: bool) -> Result<Option<EncodedSample>, EncoderError>;
    fn flush(&mut self) -> Result<Vec<EncodedSample>, EncoderError>;

    /// Raw SPS/PPS NAL payloads (no start code) for the `avcC` box a
    /// mux writes once at stream open. A real hardware backend must
    /// override this; the default is only safe for test doubles that
    /// never reach `MuxWriter::initialize`.
    fn parameter_sets(&self) -> (Vec<u8>, Vec<u8>) {
        (Vec::new(), Vec::new())
    }
}

/// No host hardware transform is reachable from this environment; every
/// `attach` call fails, which routes `initialize()` straight to the
/// software tiers.
pub struct NoHardware;

impl HardwareProvider for NoHardware {
    fn attach(&self, _profile: &EncoderProfile) -> Result<Box<dyn HardwareSession>, EncoderError> {
        Err(EncoderError::HardwareUnavailable(
            "no hardware H.264 transform enumerated on this host".into(),
        ))
    }
}

pub const TIER: EncoderTier = EncoderTier::Hardware;

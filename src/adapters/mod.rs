//! External collaborator interfaces (`spec.md` §6): the capture and audio
//! adapters the controller drives but does not own the implementation of.
//!
//! The teacher's adapters are platform-specific (`capture.rs`'s
//! ScreenCaptureKit delegate, `platform/linux/portal.rs`'s xdg-desktop
//! -portal + GStreamer pipeline); this core defines the trait boundary
//! those adapters would implement, plus a synthetic reference
//! implementation usable in tests and headless environments where no real
//! capture backend is present.

pub mod audio;
pub mod capture;

pub use audio::{AudioAdapter, SyntheticAudioAdapter};
pub use capture::{CaptureAdapter, SyntheticCaptureAdapter};

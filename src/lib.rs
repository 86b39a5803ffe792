//! Media pipeline core for a single-host, single-process full-screen
//! recorder: session state, audio/video synchronization, encoder
//! fallback, and resilient MP4 finalization.
//!
//! The capture and audio backends, and any GUI shell, live outside this
//! crate (`spec.md` §6) — [`adapters`] only defines the trait boundary and
//! a synthetic reference implementation for environments without a real
//! capture backend.

pub mod adapters;
pub mod clock;
pub mod config;
pub mod controller;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod mux;
pub mod pacer;
pub mod power;
pub mod queue;
pub mod state_machine;
pub mod storage;
pub mod sync_manager;
pub mod telemetry;

pub use config::{EncoderProfile, RecorderConfig};
pub use controller::SessionController;
pub use state_machine::{SessionEvent, SessionMachine, SessionState};
pub use telemetry::TelemetrySnapshot;

/// Installs the process-wide `tracing` subscriber, honoring `RUST_LOG`.
/// Call once at process start (`castraild`'s `main`, or a test harness
/// that wants log output).
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}

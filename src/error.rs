//! Per-component error types.
//!
//! Each fallible component gets its own `thiserror` enum so callers deep in
//! the pipeline can match on specific failure modes; [`SessionController`]
//! collapses these to display strings at the control-surface boundary (see
//! `spec.md` §7), the same boundary shape the teacher's Tauri commands use.
//!
//! [`SessionController`]: crate::controller::SessionController

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue is full, item dropped")]
    Full,
}

#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("hardware H.264 transform unavailable: {0}")]
    HardwareUnavailable(String),

    #[error("software H.264 encoder failed to initialize: {0}")]
    SoftwareInitFailed(String),

    #[error("all encoder fallback tiers failed")]
    AllTiersFailed,

    #[error("encode submit failed: {0}")]
    SubmitFailed(String),

    #[error("encoder already committed to a tier; mid-session downgrade is not permitted")]
    AlreadyCommitted,
}

#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    #[error("failed to create staging container at {path}: {source}")]
    CreateStaging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to acquire exclusive write lock on {0}")]
    LockFailed(PathBuf),

    #[error("mux write failed: {0}")]
    WriteFailed(String),

    #[error("finalize rename failed: {from} -> {to}: {source}")]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("finalize called more than once for this session")]
    AlreadyFinalized,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("could not resolve or create output directory {path}: {source}")]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not read free space for {0}")]
    FreeSpaceUnavailable(PathBuf),
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("invalid state transition: cannot {event} from {state}")]
    InvalidTransition { state: String, event: String },

    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error(transparent)]
    Mux(#[from] MuxError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("no active session")]
    NoActiveSession,
}

//! C8 — output directory resolution, filename generation, disk-space
//! polling, and orphan scanning (`spec.md` §4.8).
//!
//! Grounded on the teacher's own output-path resolution in
//! `commands.rs`/`tray.rs` (`dirs::download_dir().or_else(dirs::home_dir)`,
//! timestamped filename, `create_dir_all`), generalized to the
//! `.partial.mp4`/`.mp4` pair this core's staging protocol needs.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::StorageError;

const PARTIAL_SUFFIX: &str = ".partial.mp4";
const FINAL_SUFFIX: &str = ".mp4";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const LOW_DISK_THRESHOLD_BYTES: u64 = 500 * 1024 * 1024;

pub struct StorageManager {
    output_dir: PathBuf,
    poll_handle: Option<JoinHandle<()>>,
    poll_running: Arc<AtomicBool>,
}

impl StorageManager {
    pub fn new() -> Self {
        Self {
            output_dir: Self::default_directory(),
            poll_handle: None,
            poll_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Resolves `<user-videos>/Recordings`, creating it if missing; falls
    /// back to a hard-coded path on failure (`spec.md` §4.8).
    pub fn default_directory() -> PathBuf {
        let base = dirs::video_dir()
            .or_else(dirs::download_dir)
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        let dir = base.join("Recordings");
        if std::fs::create_dir_all(&dir).is_err() {
            warn!(path = %dir.display(), "could not create default recordings directory, falling back to cwd");
            return PathBuf::from(".");
        }
        dir
    }

    pub fn set_output_directory(&mut self, path: PathBuf) -> Result<(), StorageError> {
        std::fs::create_dir_all(&path).map_err(|source| StorageError::DirectoryUnavailable {
            path: path.clone(),
            source,
        })?;
        self.output_dir = path;
        Ok(())
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_dir
    }

    /// Timestamp pattern `ScreenRec_YYYY-MM-DD_HH-MM-SS`; disambiguates
    /// with `_001`, `_002`, … when either sibling path already exists.
    /// Returns the `.partial.mp4` staging path.
    pub fn generate_filename(&self) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
        let base_name = format!("ScreenRec_{timestamp}");

        let mut candidate = base_name.clone();
        let mut suffix = 0u32;
        loop {
            let partial = self.output_dir.join(format!("{candidate}{PARTIAL_SUFFIX}"));
            let final_path = self.output_dir.join(format!("{candidate}{FINAL_SUFFIX}"));
            if !partial.exists() && !final_path.exists() {
                return partial;
            }
            suffix += 1;
            candidate = format!("{base_name}_{suffix:03}");
        }
    }

    /// Pure function: `{base}.partial.mp4 -> {base}.mp4`. Idempotent (P6).
    pub fn partial_to_final(staging: &Path) -> PathBuf {
        let s = staging.to_string_lossy();
        if let Some(stripped) = s.strip_suffix(PARTIAL_SUFFIX) {
            PathBuf::from(format!("{stripped}{FINAL_SUFFIX}"))
        } else {
            staging.to_path_buf()
        }
    }

    /// Enumerates `*.partial.mp4` in the output directory (`spec.md` §6's
    /// orphan recovery protocol).
    pub fn find_orphans(&self) -> Vec<PathBuf> {
        let mut orphans = Vec::new();
        let Ok(entries) = std::fs::read_dir(&self.output_dir) else {
            return orphans;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.to_string_lossy().ends_with(PARTIAL_SUFFIX) {
                orphans.push(path);
            }
        }
        orphans
    }

    pub fn free_bytes(&self) -> Result<u64, StorageError> {
        free_bytes_for(&self.output_dir)
    }

    pub fn is_low(&self) -> bool {
        matches!(self.free_bytes(), Ok(free) if free < LOW_DISK_THRESHOLD_BYTES)
    }

    /// Starts a background thread polling free space every `interval`,
    /// invoking `on_low` once when the threshold is crossed. Re-entrancy
    /// safe: calling `stop_polling()` from within `on_low` detaches rather
    /// than joining the calling thread (`spec.md` §5's poller note, §9's
    /// "cyclic controller/poller" design note).
    pub fn start_polling<F>(&mut self, interval: Duration, mut on_low: F)
    where
        F: FnMut() + Send + 'static,
    {
        if self.poll_running.swap(true, Ordering::SeqCst) {
            return;
        }
        let output_dir = self.output_dir.clone();
        let running = self.poll_running.clone();
        let interval = if interval.is_zero() {
            DEFAULT_POLL_INTERVAL
        } else {
            interval
        };
        let handle = std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                if let Ok(free) = free_bytes_for(&output_dir) {
                    if free < LOW_DISK_THRESHOLD_BYTES {
                        warn!(free_bytes = free, "disk space critically low");
                        on_low();
                        break;
                    }
                }
                std::thread::sleep(interval);
            }
        });
        self.poll_handle = Some(handle);
    }

    /// Idempotent; safe to call from the poller thread itself (it detaches
    /// instead of joining).
    pub fn stop_polling(&mut self) {
        self.poll_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.poll_handle.take() {
            if handle.thread().id() == std::thread::current().id() {
                info!("stop_polling called re-entrantly from the poller thread, detaching instead of joining");
                return;
            }
            let _ = handle.join();
        }
    }
}

impl Default for StorageManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn free_bytes_for(path: &Path) -> Result<u64, StorageError> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| StorageError::FreeSpaceUnavailable(path.to_path_buf()))?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(StorageError::FreeSpaceUnavailable(path.to_path_buf()));
    }
    Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
}

#[cfg(not(unix))]
fn free_bytes_for(_path: &Path) -> Result<u64, StorageError> {
    Ok(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_to_final_is_idempotent() {
        let p = PathBuf::from("dir/X.partial.mp4");
        let once = StorageManager::partial_to_final(&p);
        assert_eq!(once, PathBuf::from("dir/X.mp4"));
        let twice = StorageManager::partial_to_final(&once);
        assert_eq!(twice, once);
    }

    #[test]
    fn s6_find_orphans_matches_only_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("X.partial.mp4"), b"").unwrap();
        std::fs::write(dir.path().join("Y.mp4"), b"").unwrap();

        let mut storage = StorageManager::new();
        storage.set_output_directory(dir.path().to_path_buf()).unwrap();

        let orphans = storage.find_orphans();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].file_name().unwrap(), "X.partial.mp4");
    }

    #[test]
    fn generate_filename_disambiguates_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = StorageManager::new();
        storage.set_output_directory(dir.path().to_path_buf()).unwrap();

        let first = storage.generate_filename();
        std::fs::write(&first, b"").unwrap();
        let second = storage.generate_filename();
        assert_ne!(first, second);
    }

    #[test]
    fn stop_polling_is_idempotent_without_a_poller() {
        let mut storage = StorageManager::new();
        storage.stop_polling();
        storage.stop_polling();
    }
}

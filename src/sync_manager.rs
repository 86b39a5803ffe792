//! C3 — presentation-time origin and accumulated pause duration
//! (`spec.md` §4.3).

use crate::clock::{ticks_to_hns, Hns};

/// Anchors a session's PTS origin and tracks how much wall-clock time the
/// session has spent paused, so `to_pts` can subtract it back out.
pub struct SyncManager {
    anchor: i64,
    pause_start: i64,
    paused_accum_hns: Hns,
    ticks_per_sec: i64,
}

impl SyncManager {
    pub fn new(ticks_per_sec: i64) -> Self {
        Self {
            anchor: 0,
            pause_start: 0,
            paused_accum_hns: 0,
            ticks_per_sec,
        }
    }

    /// Capture the session's PTS origin and clear any stale pause state.
    pub fn start(&mut self, now_ticks: i64) {
        self.anchor = now_ticks;
        self.pause_start = 0;
        self.paused_accum_hns = 0;
    }

    pub fn pause(&mut self, now_ticks: i64) {
        self.pause_start = now_ticks;
    }

    /// No-op if called without a prior `pause()`.
    pub fn resume(&mut self, now_ticks: i64) {
        if self.pause_start != 0 {
            let elapsed = ticks_to_hns(now_ticks - self.pause_start, self.ticks_per_sec);
            self.paused_accum_hns += elapsed;
            self.pause_start = 0;
        }
    }

    /// Convert a raw tick reading to session PTS: elapsed-since-anchor minus
    /// total paused time.
    pub fn to_pts(&self, ticks: i64) -> Hns {
        ticks_to_hns(ticks - self.anchor, self.ticks_per_sec) - self.paused_accum_hns
    }

    pub fn now_pts(&self, now_ticks: i64) -> Hns {
        self.to_pts(now_ticks)
    }

    pub fn is_paused(&self) -> bool {
        self.pause_start != 0
    }
}

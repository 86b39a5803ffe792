//! C1 — monotonic clock in a 100-ns media timebase.
//!
//! A single process-wide instance anchors all raw tick readings to an
//! arbitrary origin captured once at first use (`spec.md` §4.1, §9's note on
//! treating the clock as an immutable, lazily-initialized constant).

use std::sync::OnceLock;
use std::time::Instant;

/// 100-ns units, as used throughout the pipeline for PTS and durations.
pub type Hns = i64;

pub const HNS_PER_SEC: i64 = 10_000_000;

struct ClockState {
    origin: Instant,
}

static CLOCK: OnceLock<ClockState> = OnceLock::new();

fn state() -> &'static ClockState {
    CLOCK.get_or_init(|| ClockState {
        origin: Instant::now(),
    })
}

/// Monotonic, high-resolution "now" in 100-ns units.
///
/// Carries no relationship to wall-clock time — only deltas between calls
/// are meaningful.
pub fn now_hns() -> Hns {
    let elapsed = state().origin.elapsed();
    ticks_to_hns(elapsed.as_nanos() as i64, 1_000_000_000)
}

/// Convert a raw tick count at the given ticks-per-second frequency to the
/// 100-ns media timebase.
///
/// `spec.md` §9 allows 128-bit intermediate arithmetic to avoid the rounding
/// drift that double-precision conversion would accumulate over multi-day
/// sessions; we use it unconditionally since it costs nothing at this scale.
pub fn ticks_to_hns(ticks: i64, ticks_per_sec: i64) -> Hns {
    if ticks_per_sec == 0 {
        return 0;
    }
    let scaled = (ticks as i128) * (HNS_PER_SEC as i128) / (ticks_per_sec as i128);
    scaled as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_to_hns_converts_seconds() {
        assert_eq!(ticks_to_hns(1, 1), HNS_PER_SEC);
        assert_eq!(ticks_to_hns(30, 30), HNS_PER_SEC);
    }

    #[test]
    fn ticks_to_hns_zero_frequency_is_zero() {
        assert_eq!(ticks_to_hns(100, 0), 0);
    }

    #[test]
    fn now_hns_is_monotonic() {
        let a = now_hns();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = now_hns();
        assert!(b > a);
    }
}

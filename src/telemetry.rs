//! Lock-free counters read by the control surface for display (`spec.md`
//! §3 "Telemetry counters"). Writes are per-event; reads never block a
//! writer, matching the "read under no lock" requirement.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::encoder::EncoderTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerBit {
    Ac,
    Battery,
    Unknown,
}

pub struct Telemetry {
    frames_captured: AtomicU64,
    frames_encoded: AtomicU64,
    frames_dropped: AtomicU64,
    frames_duplicated: AtomicU64,
    audio_packets_muxed: AtomicU64,
    queue_depth: AtomicU32,
    tier: AtomicU32,
    power: AtomicU32,
}

fn tier_to_u32(tier: EncoderTier) -> u32 {
    match tier {
        EncoderTier::Hardware => 0,
        EncoderTier::SoftwareOriginal => 1,
        EncoderTier::Software720p30 => 2,
    }
}

fn u32_to_tier(v: u32) -> EncoderTier {
    match v {
        0 => EncoderTier::Hardware,
        1 => EncoderTier::SoftwareOriginal,
        _ => EncoderTier::Software720p30,
    }
}

fn power_to_u32(p: PowerBit) -> u32 {
    match p {
        PowerBit::Ac => 0,
        PowerBit::Battery => 1,
        PowerBit::Unknown => 2,
    }
}

fn u32_to_power(v: u32) -> PowerBit {
    match v {
        0 => PowerBit::Ac,
        1 => PowerBit::Battery,
        _ => PowerBit::Unknown,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TelemetrySnapshot {
    pub frames_captured: u64,
    pub frames_encoded: u64,
    pub frames_dropped: u64,
    pub frames_duplicated: u64,
    pub audio_packets_muxed: u64,
    pub queue_depth: u32,
    pub tier: EncoderTier,
    pub power: PowerBit,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            frames_captured: AtomicU64::new(0),
            frames_encoded: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            frames_duplicated: AtomicU64::new(0),
            audio_packets_muxed: AtomicU64::new(0),
            queue_depth: AtomicU32::new(0),
            tier: AtomicU32::new(tier_to_u32(EncoderTier::SoftwareOriginal)),
            power: AtomicU32::new(power_to_u32(PowerBit::Unknown)),
        }
    }

    /// Reset all counters to zero at session start; called once per `Start`
    /// (`spec.md` §4.9 step 8).
    pub fn reset(&self) {
        self.frames_captured.store(0, Ordering::Relaxed);
        self.frames_encoded.store(0, Ordering::Relaxed);
        self.frames_dropped.store(0, Ordering::Relaxed);
        self.frames_duplicated.store(0, Ordering::Relaxed);
        self.audio_packets_muxed.store(0, Ordering::Relaxed);
        self.queue_depth.store(0, Ordering::Relaxed);
    }

    pub fn incr_captured(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }
    pub fn incr_encoded(&self) {
        self.frames_encoded.fetch_add(1, Ordering::Relaxed);
    }
    pub fn incr_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }
    pub fn incr_duplicated(&self) {
        self.frames_duplicated.fetch_add(1, Ordering::Relaxed);
    }
    pub fn incr_audio_muxed(&self) {
        self.audio_packets_muxed.fetch_add(1, Ordering::Relaxed);
    }
    pub fn set_queue_depth(&self, depth: u32) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }
    pub fn set_tier(&self, tier: EncoderTier) {
        self.tier.store(tier_to_u32(tier), Ordering::Relaxed);
    }
    pub fn set_power(&self, power: PowerBit) {
        self.power.store(power_to_u32(power), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_encoded: self.frames_encoded.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_duplicated: self.frames_duplicated.load(Ordering::Relaxed),
            audio_packets_muxed: self.audio_packets_muxed.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            tier: u32_to_tier(self.tier.load(Ordering::Relaxed)),
            power: u32_to_power(self.power.load(Ordering::Relaxed)),
        }
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_accumulate() {
        let t = Telemetry::new();
        t.incr_captured();
        t.incr_captured();
        t.incr_dropped();
        let snap = t.snapshot();
        assert_eq!(snap.frames_captured, 2);
        assert_eq!(snap.frames_dropped, 1);
        assert_eq!(snap.frames_encoded, 0);
    }

    #[test]
    fn reset_clears_counters_but_not_tier_or_power() {
        let t = Telemetry::new();
        t.incr_captured();
        t.set_tier(EncoderTier::Hardware);
        t.set_power(PowerBit::Battery);
        t.reset();
        let snap = t.snapshot();
        assert_eq!(snap.frames_captured, 0);
        assert_eq!(snap.tier, EncoderTier::Hardware);
        assert_eq!(snap.power, PowerBit::Battery);
    }
}

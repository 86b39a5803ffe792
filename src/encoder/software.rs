//! Tiers 2 and 3 of the fallback chain: a software H.264 transform, either
//! at the configured resolution or the hard-coded 720p30 safe profile
//! (`spec.md` §4.6 steps 2-3).
//!
//! The teacher has no software fallback — VideoToolbox is assumed always
//! present on macOS. `openh264` is the pack's software H.264 crate
//! (`waycap-rs`'s dependency list), used here the way that crate's own
//! encoder wrapper does: one `openh264::encoder::Encoder` per session,
//! fed frames converted to I420.

use std::sync::Arc;

use openh264::encoder::{Encoder, EncoderConfig, RateControlMode as OhRateControlMode};
use openh264::formats::YUVBuffer;
use openh264::OpenH264API;

use crate::config::EncoderProfile;
use crate::error::EncoderError;
use crate::frame::VideoFrame;

use super::EncodedSample;

/// Splits an Annex-B bytestream (`00 00 01` / `00 00 00 01` start codes)
/// into its constituent NAL units, start codes stripped.
fn split_annexb(data: &[u8]) -> Vec<&[u8]> {
    let mut nals = Vec::new();
    let mut start = None;
    let mut i = 0;
    while i < data.len() {
        let code_len = if data[i..].starts_with(&[0, 0, 0, 1]) {
            4
        } else if data[i..].starts_with(&[0, 0, 1]) {
            3
        } else {
            0
        };
        if code_len > 0 {
            if let Some(s) = start {
                nals.push(&data[s..i]);
            }
            i += code_len;
            start = Some(i);
        } else {
            i += 1;
        }
    }
    if let Some(s) = start {
        nals.push(&data[s..]);
    }
    nals
}

fn nal_type(nal: &[u8]) -> Option<u8> {
    nal.first().map(|b| b & 0x1F)
}

/// Pulls the first SPS/PPS pair out of an Annex-B bitstream, for the
/// `avcC` box a conformant mp4 needs once at stream open.
fn extract_parameter_sets(data: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut sps = Vec::new();
    let mut pps = Vec::new();
    for nal in split_annexb(data) {
        match nal_type(nal) {
            Some(7) if sps.is_empty() => sps = nal.to_vec(),
            Some(8) if pps.is_empty() => pps = nal.to_vec(),
            _ => {}
        }
    }
    (sps, pps)
}

/// Re-packs an Annex-B bitstream into length-prefixed (AVCC) NAL units,
/// dropping the SPS/PPS NALs that belong in the `avcC` box instead of
/// inline in the sample.
fn annexb_to_avcc_slices(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for nal in split_annexb(data) {
        if matches!(nal_type(nal), Some(7) | Some(8)) {
            continue;
        }
        out.extend_from_slice(&(nal.len() as u32).to_be_bytes());
        out.extend_from_slice(nal);
    }
    out
}

fn contains_idr_slice(data: &[u8]) -> bool {
    split_annexb(data)
        .iter()
        .any(|nal| nal_type(nal) == Some(5))
}

pub struct SoftwareSession {
    encoder: Encoder,
    width: u32,
    height: u32,
    sps: Vec<u8>,
    pps: Vec<u8>,
}

impl SoftwareSession {
    pub fn new(profile: &EncoderProfile) -> Result<Self, EncoderError> {
        let api = OpenH264API::from_source();
        let config = EncoderConfig::new(profile.width, profile.height)
            .max_frame_rate(profile.fps as f32)
            .bitrate_bps(profile.bitrate_bps)
            .rate_control_mode(OhRateControlMode::Bitrate);

        let encoder = Encoder::with_api_config(api, config)
            .map_err(|e| EncoderError::SoftwareInitFailed(e.to_string()))?;

        let mut session = Self {
            encoder,
            width: profile.width,
            height: profile.height,
            sps: Vec::new(),
            pps: Vec::new(),
        };
        session.bootstrap_parameter_sets()?;
        Ok(session)
    }

    /// Forces an immediate IDR on a blank frame to pull the SPS/PPS the
    /// encoder settled on out of its own bitstream, before any real frame
    /// is submitted. The encoded bytes themselves are discarded.
    fn bootstrap_parameter_sets(&mut self) -> Result<(), EncoderError> {
        let frame_bytes = (self.width as usize * self.height as usize * 3) / 2;
        let blank = VideoFrame::new(
            Arc::from(vec![0u8; frame_bytes]),
            self.width,
            self.height,
            0,
        );
        self.encoder.force_intra_frame();
        let yuv = self.to_yuv(&blank);
        let bitstream = self
            .encoder
            .encode(&yuv)
            .map_err(|e| EncoderError::SubmitFailed(e.to_string()))?;
        let (sps, pps) = extract_parameter_sets(&bitstream.to_vec());
        self.sps = sps;
        self.pps = pps;
        Ok(())
    }

    /// Raw SPS/PPS NAL payloads for `MuxWriter::initialize`'s `avcC` box.
    pub fn parameter_sets(&self) -> (Vec<u8>, Vec<u8>) {
        (self.sps.clone(), self.pps.clone())
    }

    /// Interprets `frame.image` as NV12 and converts to the I420 layout
    /// `openh264` expects. Screen-capture adapters hand the core NV12
    /// (`spec.md` §6's capture adapter note); the conversion cost is paid
    /// once per encode, not per queue hop.
    fn to_yuv(&self, frame: &VideoFrame) -> YUVBuffer {
        let w = self.width as usize;
        let h = self.height as usize;
        let y_size = w * h;
        let uv_size = y_size / 2;

        let mut i420 = vec![0u8; y_size + uv_size];
        let nv12 = &frame.image;

        i420[..y_size].copy_from_slice(&nv12[..y_size.min(nv12.len())]);

        let (u_plane, v_plane) = i420[y_size..].split_at_mut(uv_size / 2);
        let interleaved_uv = &nv12[y_size..nv12.len().min(y_size + uv_size)];
        for (i, chunk) in interleaved_uv.chunks_exact(2).enumerate() {
            if i < u_plane.len() {
                u_plane[i] = chunk[0];
            }
            if i < v_plane.len() {
                v_plane[i] = chunk[1];
            }
        }

        YUVBuffer::with_dimension(w, h).with_data(i420)
    }

    pub fn encode(
        &mut self,
        frame: &VideoFrame,
        force_idr: bool,
    ) -> Result<Option<EncodedSample>, EncoderError> {
        if force_idr {
            self.encoder.force_intra_frame();
        }
        let yuv = self.to_yuv(frame);
        let bitstream = self
            .encoder
            .encode(&yuv)
            .map_err(|e| EncoderError::SubmitFailed(e.to_string()))?;

        let raw = bitstream.to_vec();
        let is_keyframe = contains_idr_slice(&raw);
        let data = annexb_to_avcc_slices(&raw);
        if data.is_empty() {
            return Ok(None);
        }
        Ok(Some(EncodedSample {
            data,
            pts: frame.pts,
            is_keyframe,
        }))
    }

    pub fn flush(&mut self) -> Result<Vec<EncodedSample>, EncoderError> {
        // openh264 has no internal reorder buffer in this configuration
        // (zero B-frames), so there is nothing left to drain.
        Ok(Vec::new())
    }
}

/// The hard-coded safe profile for tier 3 (`spec.md` §4.6 step 3).
pub fn fallback_720p30(target_bitrate_bps: u32) -> EncoderProfile {
    EncoderProfile {
        width: 1280,
        height: 720,
        fps: 30,
        bitrate_bps: target_bitrate_bps,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_profile_is_pinned_720p30() {
        let profile = fallback_720p30(4_000_000);
        assert_eq!(profile.width, 1280);
        assert_eq!(profile.height, 720);
        assert_eq!(profile.fps, 30);
        assert_eq!(profile.bitrate_bps, 4_000_000);
    }

    #[test]
    fn splits_annexb_start_codes_of_both_widths() {
        let data = [
            0, 0, 0, 1, 0x67, 0xAA, 0xBB, // 4-byte start code, SPS
            0, 0, 1, 0x68, 0xCC, // 3-byte start code, PPS
            0, 0, 0, 1, 0x65, 0xDD, 0xEE, // IDR slice
        ];
        let nals = split_annexb(&data);
        assert_eq!(nals.len(), 3);
        assert_eq!(nal_type(nals[0]), Some(7));
        assert_eq!(nal_type(nals[1]), Some(8));
        assert_eq!(nal_type(nals[2]), Some(5));
    }

    #[test]
    fn avcc_conversion_drops_parameter_sets_and_length_prefixes_slices() {
        let data = [
            0, 0, 0, 1, 0x67, 0xAA, // SPS
            0, 0, 0, 1, 0x68, 0xBB, // PPS
            0, 0, 0, 1, 0x65, 0xCC, 0xDD, // IDR slice, 3 bytes
        ];
        let avcc = annexb_to_avcc_slices(&data);
        assert_eq!(avcc, vec![0, 0, 0, 3, 0x65, 0xCC, 0xDD]);
        assert!(contains_idr_slice(&data));

        let (sps, pps) = extract_parameter_sets(&data);
        assert_eq!(sps, vec![0x67, 0xAA]);
        assert_eq!(pps, vec![0x68, 0xBB]);
    }
}

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::peaks::Landmark;

/// Default number of targets paired with each anchor.
pub const DEFAULT_FAN_OUT: usize = 5;

/// A landmark-pair hash, not yet bound to any track.
///
/// `hash` depends only on `(freq1, freq2, target time - anchor time)`, so the
/// same relationship in two tracks collides on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub hash: u32,
    /// Anchor's frame index.
    pub time_offset: u32,
    pub freq1: u32,
    pub freq2: u32,
}

impl Fingerprint {
    pub fn frequency_pair(&self) -> (u32, u32) {
        (self.freq1, self.freq2)
    }
}

/// Fingerprints bound to the track they were computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackFingerprints {
    pub track_id: String,
    pub fingerprints: Vec<Fingerprint>,
}

/// Bind query-style fingerprints to a track at the ingestion boundary.
pub fn attach_track(track_id: impl Into<String>, fingerprints: Vec<Fingerprint>) -> TrackFingerprints {
    TrackFingerprints {
        track_id: track_id.into(),
        fingerprints,
    }
}

/// SHA-256 of `"{freq1}|{freq2}|{time_delta}"`, reduced modulo 2^32.
pub fn landmark_hash(freq1: u32, freq2: u32, time_delta: u32) -> u32 {
    let digest = Sha256::digest(format!("{freq1}|{freq2}|{time_delta}").as_bytes());
    // Big-endian integer mod 2^32 is just the trailing four bytes
    u32::from_be_bytes([digest[28], digest[29], digest[30], digest[31]])
}

/// Pair every anchor with the next `fan_out` landmarks in sequence.
///
/// Pairing follows frame-major order and may cross frames. Input that isn't
/// time-ascending is stably re-sorted by frame first, so deltas are never negative.
pub fn hash_landmarks(peaks: &[Landmark], fan_out: usize) -> Vec<Fingerprint> {
    if peaks.len() < 2 || fan_out == 0 {
        return Vec::new();
    }

    let ordered: Cow<'_, [Landmark]> = if peaks.is_sorted_by_key(|p| p.time_frame) {
        Cow::Borrowed(peaks)
    } else {
        log::debug!("Landmarks not in frame order, re-sorting {} peaks", peaks.len());
        let mut sorted = peaks.to_vec();
        sorted.sort_by_key(|p| p.time_frame);
        Cow::Owned(sorted)
    };

    let mut fingerprints = Vec::with_capacity(ordered.len() * fan_out);
    for (i, anchor) in ordered.iter().enumerate() {
        let end = (i + fan_out + 1).min(ordered.len());
        for target in &ordered[i + 1..end] {
            let time_delta = target.time_frame - anchor.time_frame;
            fingerprints.push(Fingerprint {
                hash: landmark_hash(anchor.frequency_bin, target.frequency_bin, time_delta),
                time_offset: anchor.time_frame,
                freq1: anchor.frequency_bin,
                freq2: target.frequency_bin,
            });
        }
    }

    fingerprints
}

use serde::{Deserialize, Serialize};

/// Metadata for an ingested track, keyed by `track_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub track_id: String,
    pub filename: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// Seconds
    pub duration: Option<f64>,
}

impl TrackRecord {
    /// A record with only the required fields set.
    pub fn new(track_id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            track_id: track_id.into(),
            filename: filename.into(),
            artist: None,
            album: None,
            duration: None,
        }
    }
}

/// One place a hash was seen: which track, at which anchor frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Occurrence {
    pub track_id: String,
    pub time_offset: u32,
}

/// Index-wide counters.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub total_tracks: i64,
    pub total_fingerprints: i64,
    pub distinct_hashes: i64,
    pub db_size_bytes: i64,
}

//! Hash collisions → ranked candidate tracks.
//!
//! A genuine match is a time-shifted excerpt of a stored track, so most of its
//! colliding hashes agree on one alignment delta. Spurious collisions scatter
//! across many deltas. Confidence is `total_matches / unique_deltas`.

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;

use serde::Serialize;

use crate::db::models::Occurrence;
use crate::db::{Database, DbError};
use crate::fingerprint::hashing::Fingerprint;

/// Default minimum colliding hashes before a track is reported.
pub const DEFAULT_MIN_MATCHES: usize = 5;

/// Point lookup from hash to stored occurrences.
pub trait HashIndex {
    type Error;

    fn lookup(&self, hash: u32) -> Result<Vec<Occurrence>, Self::Error>;
}

impl HashIndex for Database {
    type Error = DbError;

    fn lookup(&self, hash: u32) -> Result<Vec<Occurrence>, DbError> {
        Database::lookup(self, hash)
    }
}

impl HashIndex for HashMap<u32, Vec<Occurrence>> {
    type Error = Infallible;

    fn lookup(&self, hash: u32) -> Result<Vec<Occurrence>, Infallible> {
        Ok(self.get(&hash).cloned().unwrap_or_default())
    }
}

/// One candidate track and the evidence behind its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub track_id: String,
    pub confidence: f64,
    pub total_matches: usize,
    pub unique_deltas: usize,
    /// Most common alignment delta in frames (smallest on ties).
    pub offset: u32,
    /// Matches that agree on `offset`.
    pub aligned_matches: usize,
}

#[derive(Debug, Clone)]
pub struct MatchOptions {
    pub min_matches: usize,
    /// Truncate the ranked list. `None` keeps everything above threshold.
    pub max_results: Option<usize>,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            min_matches: DEFAULT_MIN_MATCHES,
            max_results: None,
        }
    }
}

/// Rank tracks by alignment consistency.
///
/// Confidence descending, ties by `track_id` ascending. Tracks with fewer than
/// `min_matches` colliding hashes are dropped.
pub fn match_fingerprints<I>(
    index: &I,
    query: &[Fingerprint],
    min_matches: usize,
) -> Result<Vec<MatchResult>, I::Error>
where
    I: HashIndex + ?Sized,
{
    match_with_options(
        index,
        query,
        &MatchOptions {
            min_matches,
            max_results: None,
        },
    )
}

pub fn match_with_options<I>(
    index: &I,
    query: &[Fingerprint],
    options: &MatchOptions,
) -> Result<Vec<MatchResult>, I::Error>
where
    I: HashIndex + ?Sized,
{
    // Each distinct hash hits the index once
    let mut offsets_by_hash: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    for fp in query {
        offsets_by_hash.entry(fp.hash).or_default().push(fp.time_offset);
    }

    // track_id → (delta → count)
    let mut deltas: HashMap<String, HashMap<u32, usize>> = HashMap::new();
    for (&hash, query_offsets) in &offsets_by_hash {
        for occ in index.lookup(hash)? {
            let histogram = deltas.entry(occ.track_id).or_default();
            for &q in query_offsets {
                *histogram.entry(q.abs_diff(occ.time_offset)).or_default() += 1;
            }
        }
    }

    let mut results: Vec<MatchResult> = deltas
        .into_iter()
        .filter_map(|(track_id, histogram)| {
            let total_matches: usize = histogram.values().sum();
            if total_matches < options.min_matches {
                return None;
            }
            let unique_deltas = histogram.len();
            let (offset, aligned_matches) = histogram
                .iter()
                .map(|(&delta, &count)| (delta, count))
                .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
                .unwrap_or((0, 0));
            Some(MatchResult {
                track_id,
                confidence: total_matches as f64 / unique_deltas.max(1) as f64,
                total_matches,
                unique_deltas,
                offset,
                aligned_matches,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.track_id.cmp(&b.track_id))
    });
    if let Some(limit) = options.max_results {
        results.truncate(limit);
    }

    log::debug!(
        "{} query fingerprints ({} distinct hashes) -> {} candidates",
        query.len(),
        offsets_by_hash.len(),
        results.len()
    );
    Ok(results)
}

//! Run many independent fingerprint pipelines on a worker pool.
//!
//! Each item is analyzed on its own buffer; nothing is shared between workers
//! except the read-only [`Fingerprinter`]. Results are folded into a map keyed
//! by `track_id` once every worker has finished, and a failing item is
//! recorded rather than aborting the batch.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use thiserror::Error;

use crate::fingerprint::hashing::Fingerprint;
use crate::fingerprint::{FingerprintError, Fingerprinter, TrackFingerprints, attach_track};
use crate::ingest::decode::{self, DecodeError};
use crate::scanner::AudioFile;

/// Why one item of a batch produced no fingerprints.
#[derive(Error, Debug)]
pub enum TrackError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Fingerprint error: {0}")]
    Fingerprint(#[from] FingerprintError),
}

/// Failures that stop a batch before any work is scheduled.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Track id {0:?} appears more than once in the batch")]
    DuplicateTrackId(String),
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Decoded samples for one track.
#[derive(Debug, Clone)]
pub struct TrackInput {
    pub track_id: String,
    pub samples: Vec<f32>,
}

#[derive(Debug)]
pub struct BatchFailure {
    pub track_id: String,
    pub error: TrackError,
}

#[derive(Debug, Default)]
pub struct BatchOutput {
    pub fingerprints: BTreeMap<String, Vec<Fingerprint>>,
    /// Sorted by `track_id`.
    pub failures: Vec<BatchFailure>,
    /// Items never started because the batch was cancelled.
    pub skipped: Vec<String>,
}

impl BatchOutput {
    /// Bind each result to its track for ingestion.
    pub fn into_tracks(self) -> Vec<TrackFingerprints> {
        self.fingerprints
            .into_iter()
            .map(|(track_id, fps)| attach_track(track_id, fps))
            .collect()
    }
}

enum Outcome {
    Done(String, Vec<Fingerprint>),
    Failed(String, TrackError),
    Skipped(String),
}

pub struct BatchFingerprinter<'a> {
    fingerprinter: &'a Fingerprinter,
    pool: rayon::ThreadPool,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> BatchFingerprinter<'a> {
    /// `jobs == 0` means one fewer than the available hardware threads.
    pub fn new(fingerprinter: &'a Fingerprinter, jobs: usize) -> Result<Self, BatchError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(crate::config::resolve_workers(jobs))
            .build()?;
        Ok(Self {
            fingerprinter,
            pool,
            cancel: None,
        })
    }

    /// Once the flag is set, items not yet started are skipped. Running ones finish.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Fingerprint already-decoded buffers.
    pub fn fingerprint_all(&self, inputs: &[TrackInput]) -> Result<BatchOutput, BatchError> {
        check_unique_ids(inputs.iter().map(|i| i.track_id.as_str()))?;
        Ok(self.run(inputs, |i| &i.track_id, |i| {
            Ok(self.fingerprinter.fingerprint(&i.samples)?)
        }))
    }

    /// Decode and fingerprint files; decode failures stay with their item.
    pub fn fingerprint_files(&self, files: &[AudioFile]) -> Result<BatchOutput, BatchError> {
        check_unique_ids(files.iter().map(|f| f.track_id.as_str()))?;
        let sample_rate = self.fingerprinter.config().sample_rate;
        Ok(self.run(files, |f| &f.track_id, |f| {
            let samples = decode::load_mono(&f.path, sample_rate)?;
            Ok(self.fingerprinter.fingerprint(&samples)?)
        }))
    }

    fn run<T, Id, Work>(&self, items: &[T], id: Id, work: Work) -> BatchOutput
    where
        T: Sync,
        Id: Fn(&T) -> &String + Sync,
        Work: Fn(&T) -> Result<Vec<Fingerprint>, TrackError> + Sync,
    {
        let outcomes: Vec<Outcome> = self.pool.install(|| {
            items
                .par_iter()
                .map(|item| {
                    let track_id = id(item).clone();
                    if self.cancelled() {
                        return Outcome::Skipped(track_id);
                    }
                    match work(item) {
                        Ok(fps) => {
                            log::debug!("{}: {} fingerprints", track_id, fps.len());
                            Outcome::Done(track_id, fps)
                        }
                        Err(e) => {
                            log::warn!("Fingerprinting {} failed: {}", track_id, e);
                            Outcome::Failed(track_id, e)
                        }
                    }
                })
                .collect()
        });

        let mut output = BatchOutput::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Done(track_id, fps) => {
                    output.fingerprints.insert(track_id, fps);
                }
                Outcome::Failed(track_id, error) => {
                    output.failures.push(BatchFailure { track_id, error });
                }
                Outcome::Skipped(track_id) => output.skipped.push(track_id),
            }
        }
        output.failures.sort_by(|a, b| a.track_id.cmp(&b.track_id));
        output.skipped.sort();

        log::info!(
            "Batch done: {} fingerprinted, {} failed, {} skipped",
            output.fingerprints.len(),
            output.failures.len(),
            output.skipped.len()
        );
        output
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Reject a batch in which two items claim the same track.
pub fn check_unique_ids<'s>(ids: impl IntoIterator<Item = &'s str>) -> Result<(), BatchError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(BatchError::DuplicateTrackId(id.to_string()));
        }
    }
    Ok(())
}

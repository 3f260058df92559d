pub mod decode;

use crate::batch::{self, BatchError, BatchFingerprinter};
use crate::db::Database;
use crate::db::models::TrackRecord;
use crate::fingerprint::Fingerprinter;
use crate::scanner::AudioFile;
use crate::scanner::metadata::read_track_record;
use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Database error: {0}")]
    Db(#[from] crate::db::DbError),
    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),
}

#[derive(Debug, Default, PartialEq)]
pub struct IngestResult {
    pub ingested: u64,
    pub failed: u64,
    /// Newly inserted fingerprint rows
    pub fingerprints: u64,
}

/// Fingerprint files and write them to the index.
///
/// Processes files in chunks: fingerprint a chunk in parallel, then write the
/// chunk's successes and their track records in one transaction. A file that
/// fails to decode or fingerprint is counted and skipped; a database failure
/// stops the run.
pub fn ingest_files(
    db: &Database,
    fingerprinter: &Fingerprinter,
    files: &[AudioFile],
    jobs: usize,
) -> Result<IngestResult, IngestError> {
    batch::check_unique_ids(files.iter().map(|f| f.track_id.as_str()))?;

    if files.is_empty() {
        log::info!("No files to ingest");
        return Ok(IngestResult::default());
    }

    let batch = BatchFingerprinter::new(fingerprinter, jobs)?;
    log::info!("Ingesting {} files with {} workers", files.len(), batch.workers());

    let pb = ProgressBar::new(files.len() as u64);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }

    let mut result = IngestResult::default();

    // Chunk size = workers * 2 keeps every worker busy with one chunk in memory
    let chunk_size = batch.workers() * 2;

    for chunk in files.chunks(chunk_size) {
        let output = batch.fingerprint_files(chunk)?;

        for failure in &output.failures {
            log::warn!("Skipping {}: {}", failure.track_id, failure.error);
        }
        result.failed += output.failures.len() as u64;

        let records: Vec<TrackRecord> = chunk
            .iter()
            .filter(|f| output.fingerprints.contains_key(&f.track_id))
            .map(read_track_record)
            .collect();
        let tracks = output.into_tracks();

        let inserted = db.ingest_tracks(&tracks, &records).map_err(|e| {
            log::error!("DB error storing {} tracks: {}", tracks.len(), e);
            e
        })?;
        result.ingested += tracks.len() as u64;
        result.fingerprints += inserted as u64;

        pb.inc(chunk.len() as u64);
        pb.set_message(format!("{} stored, {} failed", result.ingested, result.failed));
    }

    pb.finish_with_message(format!(
        "Done: {} ingested, {} failed",
        result.ingested, result.failed
    ));

    Ok(result)
}

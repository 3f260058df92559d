use crate::db::models::TrackRecord;
use crate::scanner::AudioFile;
use lofty::file::{AudioFile as _, TaggedFileExt};
use lofty::prelude::*;

/// Build the track record for a file from its tags.
/// Files without readable tags still get a record with just the filename.
pub fn read_track_record(file: &AudioFile) -> TrackRecord {
    let mut record = TrackRecord::new(file.track_id.clone(), file.filename());

    let tagged_file = match lofty::read_from_path(&file.path) {
        Ok(f) => f,
        Err(e) => {
            log::debug!("Could not read tags from {}: {}", file.path.display(), e);
            return record;
        }
    };

    let secs = tagged_file.properties().duration().as_secs_f64();
    record.duration = (secs > 0.0).then_some(secs);

    // Try primary tag, then fall back
    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        record.artist = tag.artist().map(|s| s.to_string());
        record.album = tag.album().map(|s| s.to_string());
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::test_signals::{noise, write_wav};
    use std::path::Path;

    #[test]
    fn test_duration_read_from_stream_properties() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two_seconds.wav");
        write_wav(&path, &noise(3, 32000), 16000);

        let file = AudioFile::from_path(&path).unwrap();
        let record = read_track_record(&file);
        assert_eq!(record.track_id, "two_seconds");
        let secs = record.duration.unwrap();
        assert!((secs - 2.0).abs() < 0.01, "duration {secs}");
        assert!(record.artist.is_none());
    }

    #[test]
    fn test_untagged_file_gets_bare_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mystery.wav");
        std::fs::write(&path, b"RIFF garbage").unwrap();

        let file = AudioFile::from_path(Path::new(&path)).unwrap();
        let record = read_track_record(&file);
        assert_eq!(record, TrackRecord::new("mystery", "mystery.wav"));
    }
}

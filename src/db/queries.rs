use super::models::{IndexStats, Occurrence, TrackRecord};
use super::{Database, Result};
use crate::fingerprint::TrackFingerprints;
use crate::fingerprint::hashing::Fingerprint;
use rusqlite::{Connection, OptionalExtension, params};

impl Database {
    /// Insert a track's fingerprints in one transaction.
    ///
    /// Idempotent: `(hash, track_id, time_offset)` tuples already present are
    /// skipped. Returns the number of rows actually added.
    pub fn ingest(&self, track_id: &str, fingerprints: &[Fingerprint]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let inserted = Self::insert_fingerprints(&tx, track_id, fingerprints)?;
        tx.commit()?;
        Ok(inserted)
    }

    /// Write several tracks' fingerprints and metadata in a single transaction.
    pub fn ingest_tracks(&self, tracks: &[TrackFingerprints], records: &[TrackRecord]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;

        let mut inserted = 0;
        for t in tracks {
            inserted += Self::insert_fingerprints(&tx, &t.track_id, &t.fingerprints)?;
        }
        for r in records {
            Self::upsert_track(&tx, r)?;
        }

        tx.commit()?;
        Ok(inserted)
    }

    /// Insert or replace a track's metadata (last write wins).
    pub fn ingest_metadata(&self, record: &TrackRecord) -> Result<()> {
        Self::upsert_track(&self.conn, record)
    }

    /// Every `(track_id, time_offset)` stored under `hash`.
    pub fn lookup(&self, hash: u32) -> Result<Vec<Occurrence>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT track_id, time_offset FROM fingerprints
             WHERE hash_value = ?1
             ORDER BY track_id, time_offset",
        )?;

        let occurrences = stmt
            .query_map(params![hash], |row| {
                Ok(Occurrence {
                    track_id: row.get(0)?,
                    time_offset: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(occurrences)
    }

    pub fn get_metadata(&self, track_id: &str) -> Result<Option<TrackRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT track_id, filename, artist, album, duration
                 FROM tracks WHERE track_id = ?1",
                params![track_id],
                track_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// All track records, ordered by `track_id`.
    pub fn list_tracks(&self) -> Result<Vec<TrackRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT track_id, filename, artist, album, duration
             FROM tracks ORDER BY track_id",
        )?;

        let tracks = stmt
            .query_map([], track_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tracks)
    }

    pub fn fingerprint_count(&self, track_id: &str) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM fingerprints WHERE track_id = ?1",
            params![track_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Remove a track's occurrences and metadata. Returns false if nothing was stored.
    pub fn remove_track(&self, track_id: &str) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let fps = tx.execute("DELETE FROM fingerprints WHERE track_id = ?1", params![track_id])?;
        let meta = tx.execute("DELETE FROM tracks WHERE track_id = ?1", params![track_id])?;
        tx.commit()?;
        Ok(fps + meta > 0)
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let total_tracks: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM (
                SELECT track_id FROM tracks
                UNION
                SELECT DISTINCT track_id FROM fingerprints
             )",
            [],
            |row| row.get(0),
        )?;

        let total_fingerprints: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM fingerprints", [], |row| row.get(0))?;

        let distinct_hashes: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT hash_value) FROM fingerprints",
            [],
            |row| row.get(0),
        )?;

        let page_count: i64 = self.conn.pragma_query_value(None, "page_count", |row| row.get(0))?;
        let page_size: i64 = self.conn.pragma_query_value(None, "page_size", |row| row.get(0))?;

        Ok(IndexStats {
            total_tracks,
            total_fingerprints,
            distinct_hashes,
            db_size_bytes: page_count * page_size,
        })
    }

    /// Batch insert used within a transaction.
    fn insert_fingerprints(conn: &Connection, track_id: &str, fingerprints: &[Fingerprint]) -> Result<usize> {
        let mut stmt = conn.prepare_cached(
            "INSERT OR IGNORE INTO fingerprints (hash_value, track_id, time_offset, freq1, freq2)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;

        let mut inserted = 0;
        for fp in fingerprints {
            inserted += stmt.execute(params![fp.hash, track_id, fp.time_offset, fp.freq1, fp.freq2])?;
        }
        Ok(inserted)
    }

    fn upsert_track(conn: &Connection, r: &TrackRecord) -> Result<()> {
        conn.execute(
            "INSERT INTO tracks (track_id, filename, artist, album, duration, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
             ON CONFLICT(track_id) DO UPDATE SET
                filename = excluded.filename,
                artist = excluded.artist,
                album = excluded.album,
                duration = excluded.duration,
                updated_at = datetime('now')",
            params![r.track_id, r.filename, r.artist, r.album, r.duration],
        )?;
        Ok(())
    }
}

fn track_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrackRecord> {
    Ok(TrackRecord {
        track_id: row.get(0)?,
        filename: row.get(1)?,
        artist: row.get(2)?,
        album: row.get(3)?,
        duration: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{attach_track, landmark_hash};
    use crate::matcher::match_fingerprints;

    fn fp(hash: u32, time_offset: u32) -> Fingerprint {
        Fingerprint { hash, time_offset, freq1: 1, freq2: 2 }
    }

    fn test_record() -> TrackRecord {
        TrackRecord {
            track_id: "scarlet_begonias".to_string(),
            filename: "scarlet_begonias.flac".to_string(),
            artist: Some("Grateful Dead".to_string()),
            album: Some("Cornell 5/8/77".to_string()),
            duration: Some(612.5),
        }
    }

    fn index_rows(db: &Database) -> Vec<(i64, String, i64)> {
        let mut stmt = db
            .conn
            .prepare("SELECT hash_value, track_id, time_offset FROM fingerprints ORDER BY 1, 2, 3")
            .unwrap();
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        rows
    }

    #[test]
    fn test_lookup_missing_hash_is_empty() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.lookup(12345).unwrap().is_empty());
    }

    #[test]
    fn test_ingest_and_lookup() {
        let db = Database::open_in_memory().unwrap();
        let inserted = db.ingest("t1", &[fp(7, 3), fp(7, 9), fp(8, 3)]).unwrap();
        assert_eq!(inserted, 3);

        let occ = db.lookup(7).unwrap();
        assert_eq!(
            occ,
            vec![
                Occurrence { track_id: "t1".into(), time_offset: 3 },
                Occurrence { track_id: "t1".into(), time_offset: 9 },
            ]
        );
    }

    #[test]
    fn test_ingest_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let fps = vec![fp(1, 0), fp(2, 1), fp(3, 2), fp(1, 0)];

        assert_eq!(db.ingest("t1", &fps).unwrap(), 3);
        let once = index_rows(&db);

        assert_eq!(db.ingest("t1", &fps).unwrap(), 0);
        assert_eq!(index_rows(&db), once);
    }

    #[test]
    fn test_full_u32_hash_round_trips() {
        let db = Database::open_in_memory().unwrap();
        db.ingest("t1", &[fp(u32::MAX, u32::MAX)]).unwrap();
        let occ = db.lookup(u32::MAX).unwrap();
        assert_eq!(occ[0].time_offset, u32::MAX);
    }

    #[test]
    fn test_same_relationship_collides_across_tracks() {
        let db = Database::open_in_memory().unwrap();
        let shared = landmark_hash(40, 75, 2);
        db.ingest("track_a", &[fp(shared, 10)]).unwrap();
        db.ingest("track_b", &[fp(shared, 300)]).unwrap();

        let ids: Vec<String> = db.lookup(shared).unwrap().into_iter().map(|o| o.track_id).collect();
        assert_eq!(ids, vec!["track_a".to_string(), "track_b".to_string()]);
    }

    #[test]
    fn test_metadata_upsert_last_write_wins() {
        let db = Database::open_in_memory().unwrap();
        let mut r = test_record();
        db.ingest_metadata(&r).unwrap();

        r.artist = Some("The Dead".to_string());
        r.duration = None;
        db.ingest_metadata(&r).unwrap();

        let got = db.get_metadata("scarlet_begonias").unwrap().unwrap();
        assert_eq!(got, r);
        assert_eq!(db.list_tracks().unwrap().len(), 1);
    }

    #[test]
    fn test_get_metadata_missing() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_metadata("nope").unwrap().is_none());
    }

    #[test]
    fn test_ingest_tracks_batches_metadata() {
        let db = Database::open_in_memory().unwrap();
        let tracks = vec![
            attach_track("a", vec![fp(1, 0), fp(2, 0)]),
            attach_track("b", vec![fp(1, 5)]),
        ];
        let records = vec![TrackRecord::new("a", "a.wav"), TrackRecord::new("b", "b.wav")];

        assert_eq!(db.ingest_tracks(&tracks, &records).unwrap(), 3);
        assert_eq!(db.list_tracks().unwrap().len(), 2);
        assert_eq!(db.fingerprint_count("a").unwrap(), 2);
        assert_eq!(db.lookup(1).unwrap().len(), 2);
    }

    #[test]
    fn test_remove_track() {
        let db = Database::open_in_memory().unwrap();
        db.ingest("a", &[fp(1, 0)]).unwrap();
        db.ingest("b", &[fp(1, 4)]).unwrap();
        db.ingest_metadata(&TrackRecord::new("a", "a.wav")).unwrap();

        assert!(db.remove_track("a").unwrap());
        assert!(!db.remove_track("a").unwrap());
        assert!(db.get_metadata("a").unwrap().is_none());
        assert_eq!(db.lookup(1).unwrap(), vec![Occurrence { track_id: "b".into(), time_offset: 4 }]);
    }

    #[test]
    fn test_reader_sees_snapshot_during_uncommitted_ingest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");

        let writer = Database::open(&path).unwrap();
        let base: Vec<Fingerprint> = (0..6).map(|i| fp(100 + i, i)).collect();
        writer.ingest("old", &base).unwrap();

        let reader = Database::open(&path).unwrap();

        let tx = writer.conn.unchecked_transaction().unwrap();
        let pending: Vec<Fingerprint> = (0..6).map(|i| fp(100 + i, i + 40)).collect();
        assert_eq!(Database::insert_fingerprints(&tx, "new", &pending).unwrap(), 6);

        // Uncommitted rows are invisible and the reader is not locked out
        assert_eq!(reader.lookup(100).unwrap(), vec![Occurrence { track_id: "old".into(), time_offset: 0 }]);
        let ids: Vec<String> = match_fingerprints(&reader, &base, 5)
            .unwrap()
            .into_iter()
            .map(|r| r.track_id)
            .collect();
        assert_eq!(ids, vec!["old".to_string()]);

        tx.commit().unwrap();

        assert_eq!(reader.lookup(100).unwrap().len(), 2);
        let results = match_fingerprints(&reader, &base, 5).unwrap();
        assert_eq!(results.len(), 2);
        let new = results.iter().find(|r| r.track_id == "new").unwrap();
        assert_eq!(new.offset, 40);
    }

    #[test]
    fn test_stats() {
        let db = Database::open_in_memory().unwrap();
        let empty = db.stats().unwrap();
        assert_eq!(empty.total_tracks, 0);
        assert_eq!(empty.total_fingerprints, 0);

        db.ingest("a", &[fp(1, 0), fp(2, 0)]).unwrap();
        db.ingest("b", &[fp(1, 4)]).unwrap();
        db.ingest_metadata(&TrackRecord::new("a", "a.wav")).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.total_tracks, 2);
        assert_eq!(stats.total_fingerprints, 3);
        assert_eq!(stats.distinct_hashes, 2);
        assert!(stats.db_size_bytes > 0);
    }
}

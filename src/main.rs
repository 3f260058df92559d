use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use earprint::db::Database;
use earprint::db::models::TrackRecord;
use earprint::fingerprint::Fingerprinter;
use earprint::matcher::{MatchOptions, MatchResult};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "earprint", version, about = "Landmark audio fingerprinting and identification")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fingerprint audio files and add them to the index
    Ingest {
        /// Files or directories to ingest
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Number of parallel workers (0 = auto-detect)
        #[arg(short, long, default_value = "0")]
        jobs: usize,
    },

    /// Identify an audio clip against the index
    Match {
        /// Audio file to identify
        file: PathBuf,

        /// Minimum colliding hashes for a candidate (default from config)
        #[arg(long)]
        min_matches: Option<usize>,

        /// Number of results (default from config)
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Emit results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show metadata and fingerprint count for a track
    Info {
        track_id: String,
    },

    /// List indexed tracks
    Tracks,

    /// Remove a track and its fingerprints from the index
    Remove {
        track_id: String,
    },

    /// Show index statistics
    Stats,
}

/// A ranked match joined with the track's stored metadata.
#[derive(Serialize)]
struct MatchRow {
    #[serde(flatten)]
    result: MatchResult,
    metadata: Option<TrackRecord>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = earprint::config::AppConfig::load();

    // Resolve database path: CLI > config > XDG default
    let db_path = cli
        .db_path
        .or(config.db_path.clone())
        .unwrap_or_else(earprint::config::default_db_path);
    log::info!("Database: {}", db_path.display());

    let db = Database::open(&db_path).context("Failed to open database")?;

    match cli.command {
        Commands::Ingest { paths, recursive, jobs } => {
            let fingerprinter = Fingerprinter::new(config.fingerprint.clone())
                .context("Invalid fingerprint configuration")?;
            let workers = if jobs > 0 { jobs } else { config.resolve_workers() };

            let files = earprint::scanner::collect_audio_files(&paths, recursive);
            if files.is_empty() {
                anyhow::bail!("No supported audio files found");
            }

            let start = Instant::now();
            let result = earprint::ingest::ingest_files(&db, &fingerprinter, &files, workers)
                .context("Ingest failed")?;
            log::info!("Ingest took {:.1}s", start.elapsed().as_secs_f64());

            println!(
                "Ingest complete: {} ingested, {} failed, {} fingerprints added",
                result.ingested, result.failed, result.fingerprints
            );
        }

        Commands::Match { file, min_matches, limit, json } => {
            let fingerprinter = Fingerprinter::new(config.fingerprint.clone())
                .context("Invalid fingerprint configuration")?;

            let start = Instant::now();
            let samples = earprint::ingest::decode::load_mono(&file, config.fingerprint.sample_rate)
                .with_context(|| format!("Failed to decode {}", file.display()))?;
            let query = fingerprinter
                .fingerprint(&samples)
                .context("Failed to fingerprint query")?;

            let options = MatchOptions {
                min_matches: min_matches.unwrap_or(config.matching.min_matches),
                max_results: Some(limit.unwrap_or(config.matching.max_results)),
            };
            let results = earprint::matcher::match_with_options(&db, &query, &options)
                .context("Match failed")?;
            log::info!(
                "Matched {} query fingerprints in {:.2}s",
                query.len(),
                start.elapsed().as_secs_f64()
            );

            let rows = results
                .into_iter()
                .map(|result| -> Result<MatchRow, earprint::db::DbError> {
                    let metadata = db.get_metadata(&result.track_id)?;
                    Ok(MatchRow { result, metadata })
                })
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to load track metadata")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
                return Ok(());
            }

            if rows.is_empty() {
                println!("No match found.");
                return Ok(());
            }

            println!(
                "{:<30} {:>10} {:>8} {:>7}  {:<20} {:<20}",
                "Track", "Confidence", "Matches", "Deltas", "Artist", "Album"
            );
            println!("{}", "-".repeat(100));
            for row in &rows {
                let (artist, album) = row
                    .metadata
                    .as_ref()
                    .map(|m| (m.artist.as_deref(), m.album.as_deref()))
                    .unwrap_or((None, None));
                println!(
                    "{:<30} {:>10.2} {:>8} {:>7}  {:<20} {:<20}",
                    truncate(&row.result.track_id, 30),
                    row.result.confidence,
                    row.result.total_matches,
                    row.result.unique_deltas,
                    truncate(artist.unwrap_or("-"), 20),
                    truncate(album.unwrap_or("-"), 20),
                );
            }
        }

        Commands::Info { track_id } => {
            let record = db.get_metadata(&track_id).context("Query failed")?;
            let count = db.fingerprint_count(&track_id).context("Query failed")?;

            if record.is_none() && count == 0 {
                println!("No track \"{}\" in the index.", track_id);
                return Ok(());
            }

            println!("Track:        {}", track_id);
            if let Some(r) = record {
                println!("File:         {}", r.filename);
                println!("Artist:       {}", r.artist.as_deref().unwrap_or("-"));
                println!("Album:        {}", r.album.as_deref().unwrap_or("-"));
                if let Some(secs) = r.duration {
                    println!("Duration:     {}", format_duration(secs));
                }
            }
            println!("Fingerprints: {}", count);
        }

        Commands::Tracks => {
            let tracks = db.list_tracks().context("Query failed")?;
            if tracks.is_empty() {
                println!("No tracks indexed. Run `earprint ingest` first.");
                return Ok(());
            }

            println!(
                "{:<30} {:<20} {:<20} {:>6}",
                "Track", "Artist", "Album", "Len"
            );
            println!("{}", "-".repeat(79));
            for t in &tracks {
                println!(
                    "{:<30} {:<20} {:<20} {:>6}",
                    truncate(&t.track_id, 30),
                    truncate(t.artist.as_deref().unwrap_or("-"), 20),
                    truncate(t.album.as_deref().unwrap_or("-"), 20),
                    t.duration.map(format_duration).unwrap_or_default(),
                );
            }
            println!();
            println!("{} tracks", tracks.len());
        }

        Commands::Remove { track_id } => {
            if db.remove_track(&track_id).context("Remove failed")? {
                println!("Removed \"{}\".", track_id);
            } else {
                println!("No track \"{}\" in the index.", track_id);
            }
        }

        Commands::Stats => {
            let stats = db.stats().context("Failed to get stats")?;
            println!("Index Statistics");
            println!("================");
            println!("Tracks:           {}", stats.total_tracks);
            println!("Fingerprints:     {}", stats.total_fingerprints);
            println!("Distinct hashes:  {}", stats.distinct_hashes);
            println!(
                "Database size:    {:.1} MB",
                stats.db_size_bytes as f64 / (1024.0 * 1024.0)
            );
        }
    }

    Ok(())
}

fn format_duration(secs: f64) -> String {
    let total = secs.round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max - 1).collect();
        format!("{cut}~")
    }
}

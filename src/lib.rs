pub mod batch;
pub mod config;
pub mod db;
pub mod fingerprint;
pub mod ingest;
pub mod matcher;
pub mod scanner;

/// Audio file extensions we fingerprint
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "ogg"];

/// Application name for XDG paths
pub const APP_NAME: &str = "earprint";

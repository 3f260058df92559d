use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("hop_length ({hop}) must not exceed n_fft ({n_fft})")]
    HopTooLarge { hop: usize, n_fft: usize },
}

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults; the config file is optional.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AppConfig {
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// Number of parallel workers. 0 = auto-detect (cores - 1, min 1).
    pub workers: usize,
    /// Fingerprint pipeline parameters.
    pub fingerprint: FingerprintConfig,
    /// Matching parameters.
    pub matching: MatchingConfig,
}

/// Parameters for the analyze → extract → hash pipeline.
///
/// Ingest and query must use identical values, otherwise hashes won't line up.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Sample rate the pipeline expects its input at (Hz).
    pub sample_rate: u32,
    /// FFT window size in samples.
    pub n_fft: usize,
    /// Samples between successive frames.
    pub hop_length: usize,
    /// Landmarks kept per frame, loudest first.
    pub max_peaks: usize,
    /// Targets paired with each anchor landmark.
    pub fan_out: usize,
    /// Half-width (in bins) of the local-maximum window.
    pub neighborhood: usize,
    /// Landmarks must be louder than this (dB relative to the buffer maximum).
    pub noise_floor_db: f32,
    /// Frames quieter than this many dB below the loudest frame are trimmed.
    pub trim_top_db: f32,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            n_fft: 2048,
            hop_length: 512,
            max_peaks: 100,
            fan_out: 5,
            neighborhood: 5,
            noise_floor_db: -40.0,
            trim_top_db: 60.0,
        }
    }
}

impl FingerprintConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Zero { field: "sample_rate" });
        }
        if self.n_fft == 0 {
            return Err(ConfigError::Zero { field: "n_fft" });
        }
        if self.hop_length == 0 {
            return Err(ConfigError::Zero { field: "hop_length" });
        }
        if self.hop_length > self.n_fft {
            return Err(ConfigError::HopTooLarge {
                hop: self.hop_length,
                n_fft: self.n_fft,
            });
        }
        Ok(())
    }
}

/// Matching configuration.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum colliding hashes before a track is reported.
    pub min_matches: usize,
    /// Maximum number of ranked results to show.
    pub max_results: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            min_matches: crate::matcher::DEFAULT_MIN_MATCHES,
            max_results: 10,
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/earprint/config.toml`.
    /// Returns default config if file doesn't exist.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Load config from an explicit path.
    /// Logs a warning if the file exists but can't be read or parsed.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    /// Resolve worker count: 0 → auto-detect (cores - 1, min 1).
    pub fn resolve_workers(&self) -> usize {
        resolve_workers(self.workers)
    }

    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// 0 means "one fewer than the available hardware threads".
pub fn resolve_workers(requested: usize) -> usize {
    if requested > 0 {
        requested
    } else {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        cores.saturating_sub(1).max(1)
    }
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.join("earprint.db")
    } else {
        PathBuf::from("earprint.db")
    }
}

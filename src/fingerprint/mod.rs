pub mod hashing;
pub mod peaks;
pub mod spectral;

use crate::config::{ConfigError, FingerprintConfig};
use hashing::Fingerprint;
use peaks::{Landmark, PeakExtractor};
use spectral::{FrameGrid, SpectralAnalyzer};
use thiserror::Error;

pub use hashing::{TrackFingerprints, attach_track, hash_landmarks, landmark_hash};
pub use peaks::extract_peaks;

#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("Empty audio input")]
    EmptyInput,
    #[error("Sample {index} is not finite")]
    NonFiniteSample { index: usize },
    #[error("Invalid fingerprint config: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// The analyze → extract → hash pipeline for one configuration.
///
/// Stateless after construction and `Sync`, so batch workers share one instance.
pub struct Fingerprinter {
    config: FingerprintConfig,
    analyzer: SpectralAnalyzer,
    extractor: PeakExtractor,
}

impl Fingerprinter {
    pub fn new(config: FingerprintConfig) -> Result<Self, FingerprintError> {
        config.validate()?;
        let analyzer = SpectralAnalyzer::new(config.n_fft, config.hop_length, config.trim_top_db);
        let extractor = PeakExtractor {
            neighborhood: config.neighborhood,
            noise_floor_db: config.noise_floor_db,
            max_peaks_per_frame: config.max_peaks,
        };
        Ok(Self {
            config,
            analyzer,
            extractor,
        })
    }

    pub fn config(&self) -> &FingerprintConfig {
        &self.config
    }

    pub fn analyze(&self, samples: &[f32]) -> Result<FrameGrid, FingerprintError> {
        self.analyzer.analyze(samples)
    }

    pub fn extract_peaks(&self, grid: &FrameGrid) -> Vec<Landmark> {
        self.extractor.extract(grid)
    }

    pub fn hash(&self, peaks: &[Landmark]) -> Vec<Fingerprint> {
        hash_landmarks(peaks, self.config.fan_out)
    }

    /// Fingerprint a mono buffer already at `config.sample_rate`.
    ///
    /// Silent or featureless input gives an empty vec rather than an error.
    pub fn fingerprint(&self, samples: &[f32]) -> Result<Vec<Fingerprint>, FingerprintError> {
        let grid = self.analyze(samples)?;
        let peaks = self.extract_peaks(&grid);
        let fingerprints = self.hash(&peaks);
        log::debug!(
            "{} samples -> {} frames -> {} landmarks -> {} fingerprints",
            samples.len(),
            grid.n_frames(),
            peaks.len(),
            fingerprints.len()
        );
        Ok(fingerprints)
    }
}


#[cfg(test)]
mod tests {
    use super::test_signals::{noise, tones};
    use super::*;

    fn fingerprinter() -> Fingerprinter {
        Fingerprinter::new(FingerprintConfig::default()).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = FingerprintConfig {
            n_fft: 0,
            ..FingerprintConfig::default()
        };
        assert!(matches!(
            Fingerprinter::new(config),
            Err(FingerprintError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(fingerprinter().fingerprint(&[]), Err(FingerprintError::EmptyInput)));
    }

    #[test]
    fn test_silence_gives_no_fingerprints() {
        let fps = fingerprinter().fingerprint(&vec![0.0; 16000]).unwrap();
        assert!(fps.is_empty());
    }

    #[test]
    fn test_noise_produces_fingerprints() {
        let fps = fingerprinter().fingerprint(&noise(7, 16000)).unwrap();
        assert!(!fps.is_empty());
        assert!(fps.windows(2).all(|w| w[0].time_offset <= w[1].time_offset));
    }

    #[test]
    fn test_pipeline_is_deterministic() {
        let fp = fingerprinter();
        let samples = noise(42, 24000);
        let a = fp.fingerprint(&samples).unwrap();
        let b = fp.fingerprint(&samples).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_peak_cap_bounds_landmarks_per_frame() {
        let config = FingerprintConfig {
            max_peaks: 3,
            ..FingerprintConfig::default()
        };
        let fp = Fingerprinter::new(config).unwrap();
        let grid = fp.analyze(&noise(3, 16000)).unwrap();
        let peaks = fp.extract_peaks(&grid);
        let mut per_frame = std::collections::HashMap::new();
        for p in &peaks {
            *per_frame.entry(p.time_frame).or_insert(0usize) += 1;
        }
        assert!(per_frame.values().all(|&n| n <= 3));
    }

    #[test]
    fn test_tone_landmarks_sit_on_tone_bins() {
        // 500 Hz → bin 64, 2000 Hz → bin 256
        let fp = fingerprinter();
        let grid = fp.analyze(&tones(&[500.0, 2000.0], 16000)).unwrap();
        let peaks = fp.extract_peaks(&grid);
        let mid = grid.n_frames() as u32 / 2;
        let mut bins: Vec<u32> = peaks
            .iter()
            .filter(|p| p.time_frame == mid)
            .map(|p| p.frequency_bin)
            .collect();
        bins.sort_unstable();
        assert_eq!(bins, vec![64, 256]);
    }
}

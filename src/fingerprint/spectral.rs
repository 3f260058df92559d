//! Sample buffer → log-magnitude frame grid.
//!
//! Steps run in a fixed order: peak-normalize, trim leading/trailing silence,
//! centred STFT with a periodic Hann window, then dB conversion referenced to
//! the grid's own maximum so absolute loudness drops out.

use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};

use super::FingerprintError;

/// Magnitude floor before taking logs.
const AMIN: f32 = 1e-5;
/// Power floor for the silence detector.
const POWER_AMIN: f64 = 1e-10;
/// Dynamic range kept below the grid maximum.
const TOP_DB: f32 = 80.0;

/// dB magnitudes indexed by (frequency bin, time frame), stored frame-major.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameGrid {
    n_bins: usize,
    frames: Vec<Vec<f32>>,
}

impl FrameGrid {
    /// Build a grid from per-frame columns. Every column must hold `n_bins` values.
    pub fn from_frames(n_bins: usize, frames: Vec<Vec<f32>>) -> Self {
        debug_assert!(frames.iter().all(|f| f.len() == n_bins));
        Self { n_bins, frames }
    }

    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// All bins of one time frame.
    pub fn frame(&self, t: usize) -> &[f32] {
        &self.frames[t]
    }

    pub fn frames(&self) -> impl Iterator<Item = &[f32]> {
        self.frames.iter().map(Vec::as_slice)
    }

    pub fn get(&self, bin: usize, frame: usize) -> Option<f32> {
        self.frames.get(frame).and_then(|f| f.get(bin)).copied()
    }
}

/// Short-time spectral analyzer with a pre-planned FFT.
///
/// Holds no mutable state, so one analyzer can be shared across worker threads.
pub struct SpectralAnalyzer {
    n_fft: usize,
    hop_length: usize,
    trim_top_db: f32,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl SpectralAnalyzer {
    pub fn new(n_fft: usize, hop_length: usize, trim_top_db: f32) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n_fft);
        Self {
            n_fft,
            hop_length,
            trim_top_db,
            window: hann_window(n_fft),
            fft,
        }
    }

    /// Number of frequency bins per frame (`n_fft / 2 + 1`).
    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Run the full analysis. Silent input yields an empty grid, not an error.
    pub fn analyze(&self, samples: &[f32]) -> Result<FrameGrid, FingerprintError> {
        if samples.is_empty() {
            return Err(FingerprintError::EmptyInput);
        }
        if let Some(index) = samples.iter().position(|s| !s.is_finite()) {
            return Err(FingerprintError::NonFiniteSample { index });
        }

        let normalized = normalize(samples);
        let trimmed = trim_silence(&normalized, self.n_fft, self.hop_length, self.trim_top_db);
        log::trace!(
            "Trimmed {} -> {} samples",
            normalized.len(),
            trimmed.len()
        );

        if trimmed.is_empty() {
            return Ok(FrameGrid::from_frames(self.n_bins(), Vec::new()));
        }

        let mut frames = self.stft_magnitude(trimmed);
        amplitude_to_db(&mut frames);
        Ok(FrameGrid::from_frames(self.n_bins(), frames))
    }

    /// Centred STFT magnitudes, one column per hop.
    fn stft_magnitude(&self, samples: &[f32]) -> Vec<Vec<f32>> {
        let half = self.n_fft / 2;
        let mut padded = vec![0.0f32; samples.len() + 2 * half];
        padded[half..half + samples.len()].copy_from_slice(samples);

        let n_frames = 1 + (padded.len() - self.n_fft) / self.hop_length;
        let n_bins = self.n_bins();
        let mut scratch = vec![Complex::new(0.0f32, 0.0); self.fft.get_inplace_scratch_len()];
        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.n_fft];
        let mut frames = Vec::with_capacity(n_frames);

        for t in 0..n_frames {
            let start = t * self.hop_length;
            let chunk = &padded[start..start + self.n_fft];
            for ((slot, &s), &w) in buffer.iter_mut().zip(chunk).zip(&self.window) {
                *slot = Complex::new(s * w, 0.0);
            }
            self.fft.process_with_scratch(&mut buffer, &mut scratch);
            frames.push(buffer[..n_bins].iter().map(|c| c.norm()).collect());
        }

        frames
    }
}

/// Scale so the loudest sample has magnitude 1. All-zero input is returned as is.
pub fn normalize(samples: &[f32]) -> Vec<f32> {
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > 0.0 {
        samples.iter().map(|s| s / peak).collect()
    } else {
        samples.to_vec()
    }
}

/// Drop leading and trailing frames quieter than `top_db` below the loudest frame.
///
/// Frame energy is the mean square over `frame_length` samples centred on
/// `i * hop_length`. Never lengthens the buffer.
pub fn trim_silence(samples: &[f32], frame_length: usize, hop_length: usize, top_db: f32) -> &[f32] {
    if samples.is_empty() {
        return samples;
    }

    let len = samples.len();
    let half = frame_length / 2;
    let n_frames = 1 + len / hop_length;

    let mse: Vec<f64> = (0..n_frames)
        .map(|i| {
            let center = i * hop_length;
            let start = center.saturating_sub(half);
            let end = (center + frame_length - half).min(len);
            let energy: f64 = samples[start.min(end)..end]
                .iter()
                .map(|&s| f64::from(s) * f64::from(s))
                .sum();
            energy / frame_length as f64
        })
        .collect();

    let reference = mse.iter().copied().fold(0.0f64, f64::max);
    if reference <= 0.0 {
        return &samples[..0];
    }

    let ref_db = 10.0 * reference.max(POWER_AMIN).log10();
    let threshold = -f64::from(top_db);
    let loud = |e: &f64| 10.0 * e.max(POWER_AMIN).log10() - ref_db > threshold;

    let Some(first) = mse.iter().position(loud) else {
        return &samples[..0];
    };
    let last = mse.iter().rposition(loud).unwrap_or(first);

    let start = (first * hop_length).min(len);
    let end = ((last + 1) * hop_length).min(len);
    &samples[start..end]
}

/// Convert magnitudes to dB relative to the grid maximum, floored at `-TOP_DB`.
pub fn amplitude_to_db(frames: &mut [Vec<f32>]) {
    let max = frames
        .iter()
        .flat_map(|f| f.iter())
        .fold(0.0f32, |m, &v| m.max(v));
    let ref_db = 20.0 * max.max(AMIN).log10();

    let mut top = f32::NEG_INFINITY;
    for frame in frames.iter_mut() {
        for v in frame.iter_mut() {
            *v = 20.0 * v.max(AMIN).log10() - ref_db;
            top = top.max(*v);
        }
    }

    let floor = top - TOP_DB;
    for frame in frames.iter_mut() {
        for v in frame.iter_mut() {
            *v = v.max(floor);
        }
    }
}

/// Periodic Hann window (the FFT-friendly variant).
fn hann_window(size: usize) -> Vec<f32> {
    let n = size as f32;
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / n).cos())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, n: usize, amp: f32) -> Vec<f32> {
        (0..n)
            .map(|i| amp * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_normalize_peak_is_one() {
        let out = normalize(&[0.1, -0.5, 0.25]);
        assert!((out[1] + 1.0).abs() < 1e-6);
        assert!((out[0] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_silence_untouched() {
        assert_eq!(normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_trim_removes_padding_silence() {
        let mut samples = vec![0.0f32; 8000];
        samples.extend(sine(440.0, 16000.0, 16000, 1.0));
        samples.extend(vec![0.0f32; 8000]);

        let trimmed = trim_silence(&samples, 2048, 512, 60.0);
        assert!(trimmed.len() < samples.len());
        // Keeps the tone, give or take one frame of context on each side
        assert!(trimmed.len() >= 16000);
        assert!(trimmed.len() <= 16000 + 2 * 2048);
    }

    #[test]
    fn test_trim_all_silent_is_empty() {
        let samples = vec![0.0f32; 4096];
        assert!(trim_silence(&samples, 2048, 512, 60.0).is_empty());
    }

    #[test]
    fn test_analyze_empty_input_errors() {
        let analyzer = SpectralAnalyzer::new(2048, 512, 60.0);
        assert!(matches!(analyzer.analyze(&[]), Err(FingerprintError::EmptyInput)));
    }

    #[test]
    fn test_analyze_rejects_nan() {
        let analyzer = SpectralAnalyzer::new(2048, 512, 60.0);
        let samples = vec![0.5, f32::NAN, 0.1];
        assert!(matches!(
            analyzer.analyze(&samples),
            Err(FingerprintError::NonFiniteSample { index: 1 })
        ));
    }

    #[test]
    fn test_analyze_silence_gives_empty_grid() {
        let analyzer = SpectralAnalyzer::new(2048, 512, 60.0);
        let grid = analyzer.analyze(&vec![0.0f32; 16000]).unwrap();
        assert!(grid.is_empty());
        assert_eq!(grid.n_bins(), 1025);
    }

    #[test]
    fn test_sine_peaks_at_expected_bin() {
        // 1000 Hz at 16 kHz with n_fft 2048 → bin 128
        let analyzer = SpectralAnalyzer::new(2048, 512, 60.0);
        let grid = analyzer.analyze(&sine(1000.0, 16000.0, 16000, 0.8)).unwrap();

        assert_eq!(grid.n_bins(), 1025);
        assert!(grid.n_frames() > 10);

        let mid = grid.frame(grid.n_frames() / 2);
        let (best, &db) = mid
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();
        assert_eq!(best, 128);
        assert!(db <= 0.0 && db > -3.0);
    }

    #[test]
    fn test_grid_is_loudness_invariant() {
        let analyzer = SpectralAnalyzer::new(2048, 512, 60.0);
        let quiet = analyzer.analyze(&sine(700.0, 16000.0, 8000, 0.01)).unwrap();
        let loud = analyzer.analyze(&sine(700.0, 16000.0, 8000, 0.9)).unwrap();
        assert_eq!(quiet.n_frames(), loud.n_frames());
        for (a, b) in quiet.frames().zip(loud.frames()) {
            for (x, y) in a.iter().zip(b) {
                assert!((x - y).abs() < 1e-2);
            }
        }
    }

    #[test]
    fn test_db_range_is_bounded() {
        let mut frames = vec![vec![1.0, 0.5, 0.0], vec![0.25, 1e-9, 2.0]];
        amplitude_to_db(&mut frames);
        let all: Vec<f32> = frames.concat();
        let max = all.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let min = all.iter().copied().fold(f32::INFINITY, f32::min);
        assert!(max.abs() < 1e-6);
        assert!((min + TOP_DB).abs() < 1e-4);
    }

    #[test]
    fn test_analyze_deterministic() {
        let analyzer = SpectralAnalyzer::new(1024, 256, 60.0);
        let samples = sine(523.0, 16000.0, 6000, 0.5);
        assert_eq!(analyzer.analyze(&samples).unwrap(), analyzer.analyze(&samples).unwrap());
    }
}

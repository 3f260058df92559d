use serde::{Deserialize, Serialize};

use super::spectral::FrameGrid;

/// Half-width of the local-maximum window in bins.
pub const DEFAULT_NEIGHBORHOOD: usize = 5;
/// Landmarks must exceed this level (dB relative to the buffer maximum).
pub const DEFAULT_NOISE_FLOOR_DB: f32 = -40.0;

/// A locally dominant time-frequency point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub time_frame: u32,
    pub frequency_bin: u32,
    pub magnitude_db: f32,
}

/// Per-frame peak picking policy.
#[derive(Debug, Clone)]
pub struct PeakExtractor {
    pub neighborhood: usize,
    pub noise_floor_db: f32,
    pub max_peaks_per_frame: usize,
}

impl Default for PeakExtractor {
    fn default() -> Self {
        Self {
            neighborhood: DEFAULT_NEIGHBORHOOD,
            noise_floor_db: DEFAULT_NOISE_FLOOR_DB,
            max_peaks_per_frame: 100,
        }
    }
}

impl PeakExtractor {
    /// Select landmarks frame by frame.
    ///
    /// Output is frame-major with frames ascending; within a frame landmarks are
    /// ordered by magnitude descending, ties by bin ascending.
    pub fn extract(&self, grid: &FrameGrid) -> Vec<Landmark> {
        let mut landmarks = Vec::new();

        for (t, frame) in grid.frames().enumerate() {
            let mut candidates = self.frame_candidates(frame);
            candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
            candidates.truncate(self.max_peaks_per_frame);

            landmarks.extend(candidates.into_iter().map(|(bin, magnitude_db)| Landmark {
                time_frame: t as u32,
                frequency_bin: bin as u32,
                magnitude_db,
            }));
        }

        log::debug!(
            "Extracted {} landmarks from {} frames",
            landmarks.len(),
            grid.n_frames()
        );
        landmarks
    }

    /// Bins that are the strict maximum of their clipped window and above the floor.
    fn frame_candidates(&self, frame: &[f32]) -> Vec<(usize, f32)> {
        let n = frame.len();
        (0..n)
            .filter_map(|f| {
                let m = frame[f];
                if m <= self.noise_floor_db {
                    return None;
                }
                let lo = f.saturating_sub(self.neighborhood);
                let hi = (f + self.neighborhood + 1).min(n);
                let strict = frame[lo..hi]
                    .iter()
                    .enumerate()
                    .all(|(i, &v)| lo + i == f || v < m);
                strict.then_some((f, m))
            })
            .collect()
    }
}

/// Extract landmarks with the default neighborhood and noise floor.
pub fn extract_peaks(grid: &FrameGrid, max_peaks_per_frame: usize) -> Vec<Landmark> {
    PeakExtractor {
        max_peaks_per_frame,
        ..PeakExtractor::default()
    }
    .extract(grid)
}

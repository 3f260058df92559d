pub mod metadata;

use crate::SUPPORTED_EXTENSIONS;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// An audio file scheduled for fingerprinting.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFile {
    /// File stem; the track's identity in the index.
    pub track_id: String,
    pub path: PathBuf,
}

impl AudioFile {
    /// Returns `None` for paths without a usable file stem.
    pub fn from_path(path: &Path) -> Option<Self> {
        let track_id = path.file_stem()?.to_str()?.to_string();
        Some(Self {
            track_id,
            path: path.to_path_buf(),
        })
    }

    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| self.track_id.clone())
    }
}

/// Collect supported audio files from files and directories.
///
/// Directories are only descended into when `recursive` is set. Output is
/// sorted by path so runs are reproducible.
pub fn collect_audio_files(paths: &[PathBuf], recursive: bool) -> Vec<AudioFile> {
    let mut files: Vec<AudioFile> = Vec::new();

    for path in paths {
        let max_depth = if recursive { usize::MAX } else { 1 };
        for entry in WalkDir::new(path)
            .follow_links(true)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() || !is_supported(entry.path()) {
                continue;
            }
            match AudioFile::from_path(entry.path()) {
                Some(file) => files.push(file),
                None => log::warn!("Skipping {}: no usable file name", entry.path().display()),
            }
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    files.dedup_by(|a, b| a.path == b.path);
    log::info!("Found {} audio files", files.len());
    files
}

fn is_supported(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}

use crate::core::hash::{compute_content_hash, compute_perceptual_hash, ContentHash, PerceptualHash};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

pub const PHOTO_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp"];

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Invalid path: {path}")]
    InvalidPath { path: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct NearPair {
    pub first: PathBuf,
    pub second: PathBuf,
    pub distance: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditReport {
    pub photos_scanned: usize,
    /// Groups of byte-identical photos.
    pub exact_groups: Vec<Vec<PathBuf>>,
    /// Visually similar pairs that are not byte-identical.
    pub near_pairs: Vec<NearPair>,
    /// Files that could not be read or decoded, with the reason.
    pub unreadable: Vec<(PathBuf, String)>,
}

struct HashedPhoto {
    path: PathBuf,
    exact: ContentHash,
    perceptual: Option<PerceptualHash>,
}

pub type ProgressCallback = Box<dyn Fn(usize) + Send + Sync>;

/// Offline duplicate audit of a photo directory (e.g. the bot's photo store).
pub struct AuditService {
    near_match_threshold: u32,
    progress: Option<ProgressCallback>,
}

impl AuditService {
    pub fn new(near_match_threshold: u32) -> Self {
        Self {
            near_match_threshold,
            progress: None,
        }
    }

    /// Called once per hashed photo.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Recursively collect photo files under `dir`, sorted by path.
    pub fn find_photos(&self, dir: &Path) -> Result<Vec<PathBuf>, AuditError> {
        if !dir.is_dir() {
            return Err(AuditError::InvalidPath {
                path: dir.to_string_lossy().to_string(),
            });
        }

        let mut photos: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| PHOTO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            })
            .collect();
        photos.sort();
        Ok(photos)
    }

    pub fn scan(&self, dir: &Path) -> Result<AuditReport, AuditError> {
        let photos = self.find_photos(dir)?;
        log::info!("Auditing {} photos in {}", photos.len(), dir.display());

        let results: Vec<Result<HashedPhoto, (PathBuf, String)>> = photos
            .par_iter()
            .map(|path| {
                let outcome = self.hash_photo(path);
                if let Some(progress) = &self.progress {
                    progress(1);
                }
                outcome
            })
            .collect();

        let mut report = AuditReport {
            photos_scanned: photos.len(),
            ..AuditReport::default()
        };
        let mut hashed = Vec::new();
        for result in results {
            match result {
                Ok(photo) => hashed.push(photo),
                Err(failure) => report.unreadable.push(failure),
            }
        }

        let mut by_hash: HashMap<&ContentHash, Vec<PathBuf>> = HashMap::new();
        for photo in &hashed {
            by_hash.entry(&photo.exact).or_default().push(photo.path.clone());
        }
        report.exact_groups = by_hash.into_values().filter(|v| v.len() > 1).collect();
        report.exact_groups.sort();

        for (i, a) in hashed.iter().enumerate() {
            for b in &hashed[i + 1..] {
                if a.exact == b.exact {
                    continue;
                }
                let distance = match (&a.perceptual, &b.perceptual) {
                    (Some(x), Some(y)) => x.distance(y),
                    _ => None,
                };
                if let Some(distance) = distance.filter(|d| *d < self.near_match_threshold) {
                    report.near_pairs.push(NearPair {
                        first: a.path.clone(),
                        second: b.path.clone(),
                        distance,
                    });
                }
            }
        }
        report
            .near_pairs
            .sort_by(|x, y| x.distance.cmp(&y.distance).then_with(|| x.first.cmp(&y.first)));

        Ok(report)
    }

    /// Undecodable files still take part in exact matching.
    fn hash_photo(&self, path: &Path) -> Result<HashedPhoto, (PathBuf, String)> {
        let bytes = fs::read(path).map_err(|e| (path.to_path_buf(), e.to_string()))?;
        let perceptual = match compute_perceptual_hash(&bytes) {
            Ok(hash) => Some(hash),
            Err(e) => {
                log::warn!("Failed to decode {}: {}", path.display(), e);
                None
            }
        };
        Ok(HashedPhoto {
            path: path.to_path_buf(),
            exact: compute_content_hash(&bytes),
            perceptual,
        })
    }
}

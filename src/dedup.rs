//! Duplicate reducer: hashes every chapter image and removes files whose
//! content appears more than once in the series.

use rayon::prelude::*;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::error::HarvestError;
use crate::layout::{has_image_extension, SeriesLayout, CACHE_DIR};
use crate::report::{Reporter, Stage};

/// What to do with a group of byte-identical images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupPolicy {
    /// Delete every member. Repeated pages across chapters are usually
    /// credits or ads, so none of them is worth keeping.
    #[default]
    RemoveAll,
    /// Keep the lexicographically first path, delete the rest
    KeepFirst,
}

#[derive(Debug, Default)]
pub struct DedupReport {
    pub scanned: usize,
    pub duplicate_groups: usize,
    pub removed: Vec<PathBuf>,
    pub failures: Vec<HarvestError>,
}

/// Streaming sha256 of a file, hex encoded
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Image files below `dir`, skipping any cache directory
pub fn discover_images(dir: &Path, reporter: &dyn Reporter) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && e.file_name() == CACHE_DIR))
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                reporter.warn(Stage::Duplicates, &format!("Skipping unreadable entry: {}", err));
                None
            }
        })
        .filter(|e| e.file_type().is_file() && has_image_extension(e.path()))
        .map(|e| e.into_path())
        .collect()
}

pub struct DuplicateReducer {
    policy: DedupPolicy,
    reporter: Arc<dyn Reporter>,
}

impl DuplicateReducer {
    pub fn new(policy: DedupPolicy, reporter: Arc<dyn Reporter>) -> Self {
        Self { policy, reporter }
    }

    /// Reduce the chapter tree of `layout`
    pub fn run(&self, layout: &SeriesLayout) -> DedupReport {
        let chapters = layout.chapters_dir();
        self.reporter.info(
            Stage::Duplicates,
            &format!("Series: {}. Looking for duplicates...", layout.name()),
        );

        if !chapters.is_dir() {
            self.reporter
                .warn(Stage::Duplicates, "Chapters directory does not exist. Nothing to do.");
            return DedupReport::default();
        }

        let report = self.reduce(&chapters, |p| layout.display_path(p));
        self.reporter.info(
            Stage::Duplicates,
            &format!(
                "Finished: {} files scanned, {} duplicate groups, {} removed",
                report.scanned,
                report.duplicate_groups,
                report.removed.len()
            ),
        );
        report
    }

    fn reduce(&self, dir: &Path, display: impl Fn(&Path) -> String) -> DedupReport {
        let paths = discover_images(dir, self.reporter.as_ref());
        let hashed: Vec<(PathBuf, io::Result<String>)> = paths
            .into_par_iter()
            .map(|p| {
                let h = hash_file(&p);
                (p, h)
            })
            .collect();

        let mut report = DedupReport {
            scanned: hashed.len(),
            ..DedupReport::default()
        };

        let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        for (path, hash) in hashed {
            match hash {
                Ok(h) => groups.entry(h).or_default().push(path),
                Err(source) => {
                    self.reporter
                        .error(Stage::Duplicates, &format!("Error hashing {}: {}", display(&path), source));
                    report.failures.push(HarvestError::HashFailure { path, source });
                }
            }
        }

        for (_, mut group) in groups.into_iter().filter(|(_, g)| g.len() > 1) {
            report.duplicate_groups += 1;
            group.sort();

            let doomed = match self.policy {
                DedupPolicy::RemoveAll => &group[..],
                DedupPolicy::KeepFirst => &group[1..],
            };

            for path in doomed {
                match fs::remove_file(path) {
                    Ok(()) => {
                        self.reporter
                            .info(Stage::Duplicates, &format!("Removed duplicate: {}", display(path)));
                        report.removed.push(path.clone());
                    }
                    Err(source) => {
                        self.reporter.error(
                            Stage::Duplicates,
                            &format!("Error removing {}: {}", display(path), source),
                        );
                        report.failures.push(HarvestError::DeleteFailure {
                            path: path.clone(),
                            source,
                        });
                    }
                }
            }
        }

        report
    }
}

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::HarvestError;
use crate::layout::SeriesLayout;
use crate::report::{Reporter, Stage};

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed_dirs: Vec<PathBuf>,
    pub removed_archives: Vec<PathBuf>,
    pub cache_removed: bool,
    pub failures: Vec<HarvestError>,
}

impl CleanupReport {
    pub fn removed_count(&self) -> usize {
        self.removed_dirs.len() + self.removed_archives.len()
    }
}

/// Removes downloaded chapters and built archives of a series.
/// The cache survives unless asked for, so later runs can reuse it.
pub struct Cleaner {
    archive_extension: String,
    include_cache: bool,
    reporter: Arc<dyn Reporter>,
}

impl Cleaner {
    pub fn new(archive_extension: impl Into<String>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            archive_extension: archive_extension.into().trim_start_matches('.').to_lowercase(),
            include_cache: false,
            reporter,
        }
    }

    pub fn with_cache(mut self, include_cache: bool) -> Self {
        self.include_cache = include_cache;
        self
    }

    pub fn run(&self, layout: &SeriesLayout) -> CleanupReport {
        self.reporter.info(
            Stage::Cleanup,
            &format!("Series: {}. Removing chapter folders and archives...", layout.name()),
        );
        let mut report = CleanupReport::default();

        let chapters = layout.chapters_dir();
        if let Ok(entries) = fs::read_dir(&chapters) {
            for entry in entries.flatten() {
                if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    continue;
                }
                let path = entry.path();
                match fs::remove_dir_all(&path) {
                    Ok(()) => {
                        self.reporter
                            .info(Stage::Cleanup, &format!("Removed folder: {}", layout.display_path(&path)));
                        report.removed_dirs.push(path);
                    }
                    Err(source) => self.fail(&mut report, layout, path, source),
                }
            }
        }

        let archives = layout.archives_dir();
        if let Ok(entries) = fs::read_dir(&archives) {
            for entry in entries.flatten() {
                let path = entry.path();
                let is_archive = entry.file_type().map(|t| t.is_file()).unwrap_or(false)
                    && path
                        .extension()
                        .and_then(|e| e.to_str())
                        .map(|e| e.to_lowercase() == self.archive_extension)
                        .unwrap_or(false);
                if !is_archive {
                    continue;
                }
                match fs::remove_file(&path) {
                    Ok(()) => {
                        self.reporter
                            .info(Stage::Cleanup, &format!("Removed file: {}", layout.display_path(&path)));
                        report.removed_archives.push(path);
                    }
                    Err(source) => self.fail(&mut report, layout, path, source),
                }
            }
        }

        if self.include_cache {
            let cache = layout.cache_dir();
            if cache.is_dir() {
                match fs::remove_dir_all(&cache) {
                    Ok(()) => {
                        self.reporter.info(Stage::Cleanup, "Removed cache folder");
                        report.cache_removed = true;
                    }
                    Err(source) => self.fail(&mut report, layout, cache, source),
                }
            }
        }

        self.reporter.info(
            Stage::Cleanup,
            &format!("Finished: {} items removed", report.removed_count()),
        );
        report
    }

    fn fail(&self, report: &mut CleanupReport, layout: &SeriesLayout, path: PathBuf, source: std::io::Error) {
        self.reporter.error(
            Stage::Cleanup,
            &format!("Error removing {}: {}", layout.display_path(&path), source),
        );
        report.failures.push(HarvestError::DeleteFailure { path, source });
    }
}

//! Per-image acquisition: cache lookup, HEAD size check, streamed download and
//! publication into the chapter directory.

use rayon::prelude::*;
use rayon::ThreadPool;
use regex::Regex;
use reqwest::Url;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{CacheLookup, CacheStore, StoreOutcome};
use crate::error::HarvestError;
use crate::http_client::{HttpError, HttpSource};
use crate::layout::shorten_url;
use crate::report::{Reporter, Stage};

/// Extension used when the URL path has none
pub const DEFAULT_IMAGE_EXTENSION: &str = ".webp";

/// Why a single image could not be acquired
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("cannot resolve '{0}' against the page URL")]
    InvalidUrl(String),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// One image discovered on a page, with its final index already assigned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageJob {
    pub index: usize,
    pub source: String,
}

#[derive(Debug)]
pub enum FetchOutcome {
    /// Copied from the cache without touching the network
    CacheHit { dest: PathBuf },
    Downloaded { dest: PathBuf, bytes: u64 },
    /// Asset below the minimum size, reported by the HEAD request or measured after download
    TooSmall { url: Url, bytes: u64 },
    /// Always a [`HarvestError::FetchFailure`]
    Failed { error: HarvestError },
}

impl FetchOutcome {
    pub fn dest(&self) -> Option<&Path> {
        match self {
            FetchOutcome::CacheHit { dest } | FetchOutcome::Downloaded { dest, .. } => Some(dest),
            _ => None,
        }
    }
}

/// Tally of one chapter's fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub discovered: usize,
    pub cache_hits: usize,
    pub downloaded: usize,
    pub too_small: usize,
    pub failed: usize,
}

impl FetchSummary {
    pub fn saved(&self) -> usize {
        self.cache_hits + self.downloaded
    }

    fn record(&mut self, outcome: &FetchOutcome) {
        match outcome {
            FetchOutcome::CacheHit { .. } => self.cache_hits += 1,
            FetchOutcome::Downloaded { .. } => self.downloaded += 1,
            FetchOutcome::TooSmall { .. } => self.too_small += 1,
            FetchOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

pub struct ImageFetcher<H> {
    http: H,
    cache: CacheStore,
    reporter: Arc<dyn Reporter>,
}

impl<H: HttpSource> ImageFetcher<H> {
    pub fn new(http: H, cache: CacheStore, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            http,
            cache,
            reporter,
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Fetch every job on `pool` and wait for all of them.
    ///
    /// Outcomes are returned in job order whatever the completion order.
    pub fn fetch_all(
        &self,
        pool: &ThreadPool,
        page_url: &Url,
        jobs: &[ImageJob],
        chapter_dir: &Path,
    ) -> (FetchSummary, Vec<FetchOutcome>) {
        let outcomes: Vec<FetchOutcome> = pool.install(|| {
            jobs.par_iter()
                .map(|job| self.fetch_one(page_url, job, chapter_dir))
                .collect()
        });

        let mut summary = FetchSummary {
            discovered: jobs.len(),
            ..FetchSummary::default()
        };
        for outcome in &outcomes {
            summary.record(outcome);
        }
        (summary, outcomes)
    }

    /// Acquire a single image. Never fails: errors become [`FetchOutcome::Failed`].
    pub fn fetch_one(&self, page_url: &Url, job: &ImageJob, chapter_dir: &Path) -> FetchOutcome {
        let url = match page_url.join(&job.source) {
            Ok(url) => url,
            Err(_) => {
                let error = FetchError::InvalidUrl(job.source.clone());
                self.reporter
                    .warn(Stage::Download, &format!("Skipping {}: {}", shorten_url(&job.source), error));
                return FetchOutcome::Failed {
                    error: HarvestError::FetchFailure {
                        url: job.source.clone(),
                        source: error,
                    },
                };
            }
        };

        match self.acquire(&url, job.index, chapter_dir) {
            Ok(outcome) => outcome,
            Err(source) => {
                self.reporter.error(
                    Stage::Download,
                    &format!("Error downloading {}: {}", shorten_url(url.as_str()), source),
                );
                FetchOutcome::Failed {
                    error: HarvestError::FetchFailure {
                        url: url.to_string(),
                        source,
                    },
                }
            }
        }
    }

    fn acquire(&self, url: &Url, index: usize, chapter_dir: &Path) -> Result<FetchOutcome, FetchError> {
        let ext = image_extension(url);
        let dest = chapter_dir.join(image_file_name(index, &ext));
        let short_url = shorten_url(url.as_str());

        match self.cache.lookup(url, &ext)? {
            CacheLookup::Hit { path, .. } => {
                fs::copy(&path, &dest)?;
                self.reporter
                    .info(Stage::Download, &format!("Used cache: {}", display_name(&dest)));
                return Ok(FetchOutcome::CacheHit { dest });
            }
            CacheLookup::Evicted { size, .. } => {
                self.reporter.debug(
                    Stage::Download,
                    &format!("Evicted undersized cache entry for {} ({} bytes)", short_url, size),
                );
            }
            CacheLookup::Miss { .. } => {}
        }

        match self.http.head(url) {
            Ok(head) => {
                if let Some(size) = head.reported_length() {
                    if size < self.cache.min_size() {
                        self.reporter.info(
                            Stage::Download,
                            &format!("Ignoring small image {} ({} bytes)", short_url, size),
                        );
                        return Ok(FetchOutcome::TooSmall {
                            url: url.clone(),
                            bytes: size,
                        });
                    }
                }
            }
            Err(e) => {
                self.reporter
                    .warn(Stage::Download, &format!("HEAD error for {}: {}", short_url, e));
            }
        }

        let stored = self
            .cache
            .store::<FetchError, _>(url, &ext, |sink| Ok(self.http.fetch(url, sink)?))?;

        match stored {
            StoreOutcome::Rejected { size } => {
                self.reporter.info(
                    Stage::Download,
                    &format!("Discarded small image {} ({} bytes)", short_url, size),
                );
                Ok(FetchOutcome::TooSmall {
                    url: url.clone(),
                    bytes: size,
                })
            }
            StoreOutcome::Stored { path, size } => {
                fs::copy(&path, &dest)?;
                self.reporter.info(
                    Stage::Download,
                    &format!("OK => {} ({} bytes)", display_name(&dest), size),
                );
                Ok(FetchOutcome::Downloaded { dest, bytes: size })
            }
        }
    }
}

/// `imagen_NNN<ext>`
pub fn image_file_name(index: usize, ext: &str) -> String {
    format!("imagen_{:03}{}", index, ext)
}

/// Extension of the URL path including the dot, or [`DEFAULT_IMAGE_EXTENSION`]
pub fn image_extension(url: &Url) -> String {
    let last = url.path_segments().and_then(|mut s| s.next_back()).unwrap_or("");
    match last.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < last.len() => last[dot..].to_string(),
        _ => DEFAULT_IMAGE_EXTENSION.to_string(),
    }
}

/// Highest `imagen_NNN` index already present in `chapter_dir`, or 0
pub fn last_image_index(chapter_dir: &Path) -> io::Result<usize> {
    let re = Regex::new(r"^imagen_(\d+)\.").expect("static pattern");
    let entries = match fs::read_dir(chapter_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut last = 0;
    for entry in entries {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(n) = re
            .captures(name)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<usize>().ok())
        {
            last = last.max(n);
        }
    }
    Ok(last)
}

/// Number discovered sources after whatever the chapter directory already holds
pub fn plan_jobs(sources: Vec<String>, last_index: usize) -> Vec<ImageJob> {
    sources
        .into_iter()
        .enumerate()
        .map(|(i, source)| ImageJob {
            index: last_index + i + 1,
            source,
        })
        .collect()
}

fn display_name(dest: &Path) -> String {
    let chapter = dest
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}/{}", chapter, file)
}

//! Chapter traversal: one page at a time from a start URL until the stop
//! chapter is reached or the series runs out of "next" links.
//!
//! ```text
//! Idle -> FetchingPage -> ExtractingNumber -> DownloadingImages -> LocatingNext
//!              ^                                                       |
//!              +--------------------- next link -----------------------+
//!                                    (else Done / Aborted)
//! ```

use chrono::{DateTime, Utc};
use rayon::{ThreadPool, ThreadPoolBuilder};
use reqwest::Url;
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::thread;

use crate::browser::{BrowserError, PageDriver, PageSource};
use crate::config::DownloadConfig;
use crate::error::{HarvestError, Result};
use crate::fetcher::{last_image_index, plan_jobs, FetchSummary, ImageFetcher};
use crate::harvester::{ChapterNumber, PageHarvester};
use crate::http_client::HttpSource;
use crate::layout::SeriesLayout;
use crate::report::{Reporter, Stage};

/// Observable phase of the walk, recorded in [`WalkOutcome::trace`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkPhase {
    Idle,
    FetchingPage,
    ExtractingNumber,
    DownloadingImages,
    LocatingNext,
    Done,
    Aborted,
}

/// Why the walk ended
#[derive(Debug)]
pub enum StopReason {
    /// A chapter number reached the stop value
    ReachedStop { chapter: String },
    /// The last page had no next link
    EndOfSeries,
    /// The next link pointed back to a page already visited
    Cycle { url: Url },
    /// A page could not be opened
    Aborted(HarvestError),
}

impl StopReason {
    pub fn is_aborted(&self) -> bool {
        matches!(self, StopReason::Aborted(_))
    }
}

/// What happened on one chapter page
#[derive(Debug, Clone)]
pub struct ChapterReport {
    pub chapter: String,
    pub url: Url,
    pub images: FetchSummary,
}

#[derive(Debug)]
pub struct WalkOutcome {
    pub chapters: Vec<ChapterReport>,
    pub stop: StopReason,
    pub trace: Vec<WalkPhase>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl WalkOutcome {
    pub fn chapter_labels(&self) -> Vec<&str> {
        self.chapters.iter().map(|c| c.chapter.as_str()).collect()
    }

    pub fn images_saved(&self) -> usize {
        self.chapters.iter().map(|c| c.images.saved()).sum()
    }
}

/// Internal state; pages travel with the state that needs them
enum WalkState<P> {
    Idle,
    FetchingPage(Url),
    ExtractingNumber(P),
    DownloadingImages(P, ChapterNumber),
    LocatingNext(P),
    Done(StopReason),
}

impl<P> WalkState<P> {
    fn phase(&self) -> WalkPhase {
        match self {
            WalkState::Idle => WalkPhase::Idle,
            WalkState::FetchingPage(_) => WalkPhase::FetchingPage,
            WalkState::ExtractingNumber(_) => WalkPhase::ExtractingNumber,
            WalkState::DownloadingImages(..) => WalkPhase::DownloadingImages,
            WalkState::LocatingNext(_) => WalkPhase::LocatingNext,
            WalkState::Done(StopReason::Aborted(_)) => WalkPhase::Aborted,
            WalkState::Done(_) => WalkPhase::Done,
        }
    }
}

/// Parse the operator's stop value
pub fn parse_stop_value(raw: &str) -> Result<f64> {
    let trimmed = raw.trim();
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(HarvestError::InvalidInput(format!(
            "stop chapter '{}' is not a number",
            trimmed
        ))),
    }
}

pub struct ChapterWalker<S, H> {
    layout: SeriesLayout,
    pages: S,
    harvester: PageHarvester,
    fetcher: ImageFetcher<H>,
    pool: ThreadPool,
    config: DownloadConfig,
    reporter: Arc<dyn Reporter>,
}

impl<S, H> ChapterWalker<S, H>
where
    S: PageSource,
    H: HttpSource,
{
    pub fn new(
        layout: SeriesLayout,
        pages: S,
        harvester: PageHarvester,
        fetcher: ImageFetcher<H>,
        config: DownloadConfig,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers.max(1))
            .thread_name(|i| format!("image-fetch-{}", i))
            .build()
            .map_err(|e| HarvestError::Config(format!("download pool: {}", e)))?;

        Ok(Self {
            layout,
            pages,
            harvester,
            fetcher,
            pool,
            config,
            reporter,
        })
    }

    pub fn layout(&self) -> &SeriesLayout {
        &self.layout
    }

    /// Walk from `start_url` until a chapter number ≥ `stop` is downloaded.
    ///
    /// Input is validated before any page is opened. A navigation failure or an
    /// I/O error while saving a chapter ends the walk with [`StopReason::Aborted`];
    /// chapters written so far stay on disk and in the outcome.
    pub fn run(&self, start_url: &str, stop: &str) -> Result<WalkOutcome> {
        let stop_value = parse_stop_value(stop)?;
        let start = Url::parse(start_url.trim()).map_err(|e| {
            HarvestError::InvalidInput(format!("start URL '{}' is invalid: {}", start_url, e))
        })?;
        self.layout.ensure_download_dirs()?;

        self.reporter.info(
            Stage::Download,
            &format!(
                "Series: {} | URL: {} | Stop chapter: {}",
                self.layout.name(),
                start,
                stop.trim()
            ),
        );

        let started_at = Utc::now();
        let mut chapters = Vec::new();
        let mut visited: HashSet<Url> = HashSet::new();
        let mut trace = Vec::new();
        let mut state: WalkState<S::Page> = WalkState::Idle;

        let reason = loop {
            trace.push(state.phase());
            state = match state {
                WalkState::Idle => WalkState::FetchingPage(start.clone()),

                WalkState::FetchingPage(url) => {
                    if !visited.insert(url.clone()) {
                        WalkState::Done(StopReason::Cycle { url })
                    } else {
                        self.reporter
                            .info(Stage::Download, &format!("Opening chapter: {}", url));
                        match self.open_page(&url) {
                            Ok(page) => WalkState::ExtractingNumber(page),
                            Err(source) => {
                                let error = HarvestError::NavigationFailure {
                                    url: url.to_string(),
                                    source,
                                };
                                self.reporter.error(Stage::Download, &error.to_string());
                                WalkState::Done(StopReason::Aborted(error))
                            }
                        }
                    }
                }

                WalkState::ExtractingNumber(page) => {
                    let number = self.harvester.extract_chapter_number(&page);
                    WalkState::DownloadingImages(page, number)
                }

                WalkState::DownloadingImages(page, number) => match self.download_chapter(&page, &number) {
                    Ok(report) => {
                        chapters.push(report);

                        if number.reaches(stop_value) {
                            self.reporter.info(
                                Stage::Download,
                                &format!("Reached final chapter {}. Stopping.", number.label()),
                            );
                            WalkState::Done(StopReason::ReachedStop {
                                chapter: number.label().to_string(),
                            })
                        } else {
                            WalkState::LocatingNext(page)
                        }
                    }
                    Err(error) => {
                        self.reporter.error(
                            Stage::Download,
                            &format!("Chapter {} could not be saved: {}", number.label(), error),
                        );
                        WalkState::Done(StopReason::Aborted(error))
                    }
                },

                WalkState::LocatingNext(page) => {
                    let next = self.harvester.locate_next_link(&page);
                    drop(page);
                    match next {
                        Some(url) => {
                            thread::sleep(self.config.inter_page_delay());
                            WalkState::FetchingPage(url)
                        }
                        None => {
                            self.reporter
                                .info(Stage::Download, "No next chapter link. End of series.");
                            WalkState::Done(StopReason::EndOfSeries)
                        }
                    }
                }

                WalkState::Done(reason) => break reason,
            };
        };

        let outcome = WalkOutcome {
            chapters,
            stop: reason,
            trace,
            started_at,
            finished_at: Utc::now(),
        };
        self.reporter.info(
            Stage::Download,
            &format!(
                "Download finished: {} chapters, {} images in {}s",
                outcome.chapters.len(),
                outcome.images_saved(),
                (outcome.finished_at - outcome.started_at).num_seconds()
            ),
        );
        Ok(outcome)
    }

    fn open_page(&self, url: &Url) -> std::result::Result<S::Page, BrowserError> {
        let attempts = self.config.navigation_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.pages.open(url) {
                Ok(page) => return Ok(page),
                Err(e) if attempt < attempts => {
                    self.reporter.warn(
                        Stage::Download,
                        &format!("Navigation attempt {}/{} failed: {}", attempt, attempts, e),
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn download_chapter(&self, page: &S::Page, number: &ChapterNumber) -> Result<ChapterReport> {
        let chapter_dir = self.layout.chapter_dir(number.label());
        fs::create_dir_all(&chapter_dir)?;
        self.reporter.info(
            Stage::Download,
            &format!("Downloading images into: {}", self.layout.display_path(&chapter_dir)),
        );

        self.harvester.stabilize(page);
        let sources = self.harvester.extract_image_urls(page);

        let current = page.current_url();
        let page_url = Url::parse(&current).map_err(|e| HarvestError::NavigationFailure {
            url: current.clone(),
            source: BrowserError::NavigationError(format!("page reports unusable URL: {}", e)),
        })?;

        let jobs = plan_jobs(sources, last_image_index(&chapter_dir)?);
        let (images, _) = self
            .fetcher
            .fetch_all(&self.pool, &page_url, &jobs, &chapter_dir);

        if images.failed > 0 {
            self.reporter.warn(
                Stage::Download,
                &format!(
                    "Chapter {}: {} of {} images failed",
                    number.label(),
                    images.failed,
                    images.discovered
                ),
            );
        }

        Ok(ChapterReport {
            chapter: number.label().to_string(),
            url: page_url,
            images,
        })
    }
}

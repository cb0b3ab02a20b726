//! Chapter harvester: walks a web reader chapter by chapter, downloads the
//! page images through a size-gated cache, and packages finished chapters
//! as CBZ archives.

pub mod browser;
pub mod cache;
pub mod cleanup;
pub mod config;
pub mod dedup;
pub mod error;
pub mod fetcher;
pub mod harvester;
pub mod http_client;
pub mod layout;
pub mod logging;
pub mod packager;
pub mod report;
pub mod walker;

pub use cache::CacheStore;
pub use cleanup::{Cleaner, CleanupReport};
pub use config::Config;
pub use dedup::{DedupPolicy, DedupReport, DuplicateReducer};
pub use error::{HarvestError, Result};
pub use fetcher::{FetchSummary, ImageFetcher};
pub use harvester::{ChapterNumber, PageHarvester};
pub use layout::SeriesLayout;
pub use packager::{ArchivePackager, PackageReport};
pub use report::{LogReporter, RecordingReporter, Reporter, Stage};
pub use walker::{ChapterWalker, StopReason, WalkOutcome};

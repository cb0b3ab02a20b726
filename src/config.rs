use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::browser::BrowserConfig;
use crate::dedup::DedupPolicy;
use crate::error::{HarvestError, Result};

/// File looked up when no explicit configuration path is given
pub const DEFAULT_CONFIG_FILE: &str = "harvester.toml";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Directory holding one sub-directory per series
    #[serde(default = "default_library_root")]
    pub library_root: PathBuf,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DownloadConfig {
    /// Images (and cache entries) smaller than this many bytes are discarded
    #[serde(default = "default_min_image_size")]
    pub min_image_size: u64,

    /// Width of the per-chapter download pool
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Pause between two chapter pages in milliseconds
    #[serde(default = "default_inter_page_delay")]
    pub inter_page_delay_ms: u64,

    /// How many times a chapter page is opened before the walk aborts
    #[serde(default = "default_navigation_attempts")]
    pub navigation_attempts: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HarvestConfig {
    #[serde(default = "default_settle_interval")]
    pub settle_interval_ms: u64,

    #[serde(default = "default_max_scroll_rounds")]
    pub max_scroll_rounds: u32,

    #[serde(default = "default_chapter_number_grace")]
    pub chapter_number_grace_ms: u64,

    #[serde(default = "default_chapter_number_timeout")]
    pub chapter_number_timeout_ms: u64,

    #[serde(default = "default_chapter_number_poll")]
    pub chapter_number_poll_ms: u64,

    #[serde(default = "default_next_link_timeout")]
    pub next_link_timeout_ms: u64,

    /// Only image sources ending with this extension are downloaded
    #[serde(default = "default_image_extension")]
    pub image_extension: String,

    /// Image sources containing any of these markers are ignored
    #[serde(default = "default_excluded_markers")]
    pub excluded_markers: Vec<String>,

    #[serde(default = "default_chapter_number_selector")]
    pub chapter_number_selector: String,

    #[serde(default = "default_next_link_selector")]
    pub next_link_selector: String,

    #[serde(default = "default_image_selector")]
    pub image_selector: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Retries for retryable statuses and connection errors; 0 disables retrying
    #[serde(default)]
    pub max_retries: usize,

    #[serde(default = "default_initial_retry_delay")]
    pub initial_retry_delay_ms: u64,

    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay_ms: u64,

    #[serde(default = "default_true")]
    pub enable_cookies: bool,

    #[serde(default = "default_true")]
    pub enable_compression: bool,

    #[serde(default = "default_true")]
    pub rotate_user_agent: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    #[serde(default = "default_archive_extension")]
    pub extension: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DedupConfig {
    #[serde(default)]
    pub policy: DedupPolicy,
}

fn default_true() -> bool { true }
fn default_library_root() -> PathBuf { PathBuf::from(".") }
fn default_min_image_size() -> u64 { 40 * 1024 }
fn default_workers() -> usize { 8 }
fn default_inter_page_delay() -> u64 { 2000 }
fn default_navigation_attempts() -> u32 { 1 }
fn default_settle_interval() -> u64 { 3000 }
fn default_max_scroll_rounds() -> u32 { 5 }
fn default_chapter_number_grace() -> u64 { 1000 }
fn default_chapter_number_timeout() -> u64 { 5000 }
fn default_chapter_number_poll() -> u64 { 250 }
fn default_next_link_timeout() -> u64 { 5000 }
fn default_image_extension() -> String { ".webp".to_string() }
fn default_excluded_markers() -> Vec<String> { vec!["/cover".to_string(), "discus".to_string()] }
fn default_chapter_number_selector() -> String { r"b.text-xs.md\:text-base".to_string() }
fn default_next_link_selector() -> String { "a:has(i[class*='chevron-right'])".to_string() }
fn default_image_selector() -> String { "img".to_string() }
fn default_timeout() -> u64 { 30 }
fn default_initial_retry_delay() -> u64 { 500 }
fn default_max_retry_delay() -> u64 { 8000 }
fn default_archive_extension() -> String { "cbz".to_string() }

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            min_image_size: default_min_image_size(),
            workers: default_workers(),
            inter_page_delay_ms: default_inter_page_delay(),
            navigation_attempts: default_navigation_attempts(),
        }
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            settle_interval_ms: default_settle_interval(),
            max_scroll_rounds: default_max_scroll_rounds(),
            chapter_number_grace_ms: default_chapter_number_grace(),
            chapter_number_timeout_ms: default_chapter_number_timeout(),
            chapter_number_poll_ms: default_chapter_number_poll(),
            next_link_timeout_ms: default_next_link_timeout(),
            image_extension: default_image_extension(),
            excluded_markers: default_excluded_markers(),
            chapter_number_selector: default_chapter_number_selector(),
            next_link_selector: default_next_link_selector(),
            image_selector: default_image_selector(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_retries: 0,
            initial_retry_delay_ms: default_initial_retry_delay(),
            max_retry_delay_ms: default_max_retry_delay(),
            enable_cookies: true,
            enable_compression: true,
            rotate_user_agent: true,
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            extension: default_archive_extension(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            library_root: default_library_root(),
            download: DownloadConfig::default(),
            harvest: HarvestConfig::default(),
            http: HttpConfig::default(),
            browser: BrowserConfig::default(),
            archive: ArchiveConfig::default(),
            dedup: DedupConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from [`DEFAULT_CONFIG_FILE`] when none is given.
    ///
    /// A missing default file yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !path.exists() {
            if explicit {
                return Err(HarvestError::Config(format!(
                    "configuration file {} not found",
                    path.display()
                )));
            }
            log::debug!("No {} found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        Self::from_toml(&content)
            .map_err(|e| HarvestError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str::<Config>(content)
    }
}

impl DownloadConfig {
    pub fn inter_page_delay(&self) -> Duration {
        Duration::from_millis(self.inter_page_delay_ms)
    }
}

impl HarvestConfig {
    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }

    pub fn chapter_number_grace(&self) -> Duration {
        Duration::from_millis(self.chapter_number_grace_ms)
    }

    pub fn chapter_number_timeout(&self) -> Duration {
        Duration::from_millis(self.chapter_number_timeout_ms)
    }

    pub fn chapter_number_poll(&self) -> Duration {
        Duration::from_millis(self.chapter_number_poll_ms)
    }

    pub fn next_link_timeout(&self) -> Duration {
        Duration::from_millis(self.next_link_timeout_ms)
    }
}

impl HttpConfig {
    /// Build the reqwest-backed HTTP source described by this section
    pub fn create_http_source(&self) -> std::result::Result<crate::http_client::ReqwestSource, crate::http_client::HttpError> {
        use crate::http_client::{HttpClientConfig, ReqwestSource};

        let config = HttpClientConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            max_retries: self.max_retries,
            initial_retry_delay_ms: self.initial_retry_delay_ms,
            max_retry_delay_ms: self.max_retry_delay_ms,
            enable_cookies: self.enable_cookies,
            enable_gzip: self.enable_compression,
            rotate_user_agent: self.rotate_user_agent,
        };

        ReqwestSource::with_config(config)
    }
}

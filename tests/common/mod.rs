//! In-memory stand-ins for the browser and the image host.
#![allow(dead_code)]

use reqwest::Url;
use serde_json::{json, Value};
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chapter_harvester::browser::{BrowserError, PageDriver, PageSource};
use chapter_harvester::config::{DownloadConfig, HarvestConfig};
use chapter_harvester::harvester::SCROLL_TO_BOTTOM_SCRIPT;
use chapter_harvester::http_client::{HeadResponse, HttpError, HttpSource};

/// Body size comfortably above the default minimum image size
pub const BIG: usize = 50_000;

pub fn fast_harvest_config() -> HarvestConfig {
    HarvestConfig {
        settle_interval_ms: 0,
        chapter_number_grace_ms: 0,
        chapter_number_timeout_ms: 0,
        chapter_number_poll_ms: 0,
        next_link_timeout_ms: 0,
        ..HarvestConfig::default()
    }
}

pub fn fast_download_config() -> DownloadConfig {
    DownloadConfig {
        workers: 4,
        inter_page_delay_ms: 0,
        ..DownloadConfig::default()
    }
}

/// Static description of one rendered page
#[derive(Debug, Clone, Default)]
pub struct PageSpec {
    pub chapter: Option<String>,
    pub images: Vec<String>,
    pub next: Option<String>,
    /// Image counts returned by successive count evaluations; the last repeats
    pub counts: Vec<usize>,
}

impl PageSpec {
    pub fn chapter(number: &str) -> Self {
        Self {
            chapter: Some(number.to_string()),
            ..Self::default()
        }
    }

    pub fn images(mut self, images: &[&str]) -> Self {
        self.images = images.iter().map(|s| s.to_string()).collect();
        self.counts = vec![self.images.len()];
        self
    }

    pub fn next(mut self, href: &str) -> Self {
        self.next = Some(href.to_string());
        self
    }

    pub fn counts(mut self, counts: &[usize]) -> Self {
        self.counts = counts.to_vec();
        self
    }
}

pub struct FakePage {
    url: String,
    spec: PageSpec,
    evaluations: Cell<usize>,
    scrolls: Cell<usize>,
}

impl FakePage {
    pub fn new(url: &str, spec: PageSpec) -> Self {
        Self {
            url: url.to_string(),
            spec,
            evaluations: Cell::new(0),
            scrolls: Cell::new(0),
        }
    }

    pub fn scrolls(&self) -> usize {
        self.scrolls.get()
    }
}

impl PageDriver for FakePage {
    fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        if script == SCROLL_TO_BOTTOM_SCRIPT {
            self.scrolls.set(self.scrolls.get() + 1);
            return Ok(Value::Null);
        }
        if script.contains("querySelectorAll") && script.ends_with(".length") {
            let i = self.evaluations.get();
            self.evaluations.set(i + 1);
            let count = self
                .spec
                .counts
                .get(i)
                .or_else(|| self.spec.counts.last())
                .copied()
                .unwrap_or(0);
            return Ok(json!(count));
        }
        Err(BrowserError::JavaScriptError(format!("unexpected script: {}", script)))
    }

    fn query_text(&self, _selector: &str) -> Result<Option<String>, BrowserError> {
        Ok(self.spec.chapter.clone())
    }

    fn query_attribute_all(&self, _selector: &str, _attribute: &str) -> Result<Vec<String>, BrowserError> {
        Ok(self.spec.images.clone())
    }

    fn wait_for_attribute(
        &self,
        _selector: &str,
        _attribute: &str,
        _timeout: Duration,
    ) -> Result<Option<String>, BrowserError> {
        Ok(self.spec.next.clone())
    }

    fn current_url(&self) -> String {
        self.url.clone()
    }
}

/// A reader site made of [`PageSpec`]s keyed by absolute URL
#[derive(Default)]
pub struct FakeSite {
    pages: HashMap<String, PageSpec>,
    broken: HashSet<String>,
    visits: Mutex<Vec<String>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, spec: PageSpec) -> Self {
        self.pages.insert(url.to_string(), spec);
        self
    }

    /// Opening `url` fails with a navigation error
    pub fn broken(mut self, url: &str) -> Self {
        self.broken.insert(url.to_string());
        self
    }

    /// Every URL `open` was called with, in order
    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }
}

impl PageSource for FakeSite {
    type Page = FakePage;

    fn open(&self, url: &Url) -> Result<FakePage, BrowserError> {
        self.visits.lock().unwrap().push(url.to_string());
        if self.broken.contains(url.as_str()) {
            return Err(BrowserError::NavigationError(format!("{} refused", url)));
        }
        match self.pages.get(url.as_str()) {
            Some(spec) => Ok(FakePage::new(url.as_str(), spec.clone())),
            None => Err(BrowserError::NavigationError(format!("{} not found", url))),
        }
    }
}

/// Image host with per-URL bodies and request counters
#[derive(Default)]
pub struct FakeHttp {
    bodies: HashMap<String, Vec<u8>>,
    reported: HashMap<String, Option<u64>>,
    failing: HashSet<String>,
    chunk_delay: Option<Duration>,
    heads: AtomicUsize,
    gets: AtomicUsize,
    fetched: Mutex<Vec<String>>,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(mut self, url: &str, body: Vec<u8>) -> Self {
        self.bodies.insert(url.to_string(), body);
        self
    }

    /// Distinct body of [`BIG`] bytes
    pub fn image(self, url: &str, fill: u8) -> Self {
        self.body(url, vec![fill; BIG])
    }

    /// Override the Content-Length the HEAD request reports (`None` hides it)
    pub fn reported_length(mut self, url: &str, length: Option<u64>) -> Self {
        self.reported.insert(url.to_string(), length);
        self
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    /// Stream every body in chunks with `delay` between them
    pub fn slow(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    pub fn heads(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

impl HttpSource for FakeHttp {
    fn head(&self, url: &Url) -> Result<HeadResponse, HttpError> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        if let Some(length) = self.reported.get(url.as_str()) {
            return Ok(HeadResponse { status: 200, content_length: *length });
        }
        match self.bodies.get(url.as_str()) {
            Some(body) => Ok(HeadResponse { status: 200, content_length: Some(body.len() as u64) }),
            None => Ok(HeadResponse { status: 404, content_length: None }),
        }
    }

    fn fetch(&self, url: &Url, sink: &mut dyn Write) -> Result<u64, HttpError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.fetched.lock().unwrap().push(url.to_string());
        if self.failing.contains(url.as_str()) {
            return Err(HttpError::Status(500));
        }
        match self.bodies.get(url.as_str()) {
            Some(body) => {
                match self.chunk_delay {
                    Some(delay) => {
                        for chunk in body.chunks(10_000) {
                            thread::sleep(delay);
                            sink.write_all(chunk)?;
                        }
                    }
                    None => sink.write_all(body)?,
                }
                Ok(body.len() as u64)
            }
            None => Err(HttpError::Status(404)),
        }
    }
}

pub fn shared(http: FakeHttp) -> Arc<FakeHttp> {
    Arc::new(http)
}

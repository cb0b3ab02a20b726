//! Reads one rendered chapter page: waits for lazy images, then extracts the
//! chapter number, the image sources and the link to the next chapter.

use reqwest::Url;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::browser::PageDriver;
use crate::config::HarvestConfig;
use crate::error::{HarvestError, Result};
use crate::report::{Reporter, Stage};

/// Label used when the page does not reveal its chapter number
pub const UNKNOWN_CHAPTER: &str = "unknown";

pub const SCROLL_TO_BOTTOM_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight)";

/// Chapter number as printed by the source, e.g. `"12"` or `"10.5"`
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterNumber {
    label: String,
    value: Option<f64>,
}

impl ChapterNumber {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into().trim().to_string();
        let value = label.parse::<f64>().ok().filter(|v| v.is_finite());
        Self { label, value }
    }

    pub fn unknown() -> Self {
        Self::new(UNKNOWN_CHAPTER)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Numeric value, when the label parses as a finite real number
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn is_known(&self) -> bool {
        self.label != UNKNOWN_CHAPTER
    }

    /// True only when the number parses and reaches `stop`
    pub fn reaches(&self, stop: f64) -> bool {
        self.value.map(|v| v >= stop).unwrap_or(false)
    }
}

pub struct PageHarvester {
    config: HarvestConfig,
    reporter: Arc<dyn Reporter>,
}

impl PageHarvester {
    pub fn new(config: HarvestConfig, reporter: Arc<dyn Reporter>) -> Self {
        Self { config, reporter }
    }

    fn count_images_script(&self) -> String {
        format!(
            "document.querySelectorAll({}).length",
            crate::browser::page::js_string(&self.config.image_selector)
        )
    }

    /// Scroll until the image count stops changing or the round budget is spent.
    /// Returns the last observed count.
    pub fn stabilize<P: PageDriver>(&self, page: &P) -> usize {
        let count_script = self.count_images_script();
        let mut last_count = 0;

        for round in 1..=self.config.max_scroll_rounds {
            if let Err(e) = page.evaluate(SCROLL_TO_BOTTOM_SCRIPT) {
                self.reporter
                    .warn(Stage::Download, &format!("Scroll #{} failed: {}", round, e));
            }
            thread::sleep(self.config.settle_interval());

            let count = match page.evaluate(&count_script) {
                Ok(value) => value.as_u64().unwrap_or(0) as usize,
                Err(e) => {
                    self.reporter
                        .warn(Stage::Download, &format!("Counting images failed: {}", e));
                    break;
                }
            };
            self.reporter.info(
                Stage::Download,
                &format!("Scroll #{}: {} images detected", round, count),
            );

            if count == last_count {
                break;
            }
            last_count = count;
        }

        last_count
    }

    /// Poll for the chapter number element; [`ChapterNumber::unknown`] after the timeout
    pub fn extract_chapter_number<P: PageDriver>(&self, page: &P) -> ChapterNumber {
        match self.find_chapter_number(page) {
            Ok(number) => {
                self.reporter
                    .info(Stage::Download, &format!("Chapter number: {}", number.label()));
                number
            }
            Err(e) => {
                self.reporter.warn(Stage::Download, &e.to_string());
                ChapterNumber::unknown()
            }
        }
    }

    /// Like [`extract_chapter_number`](Self::extract_chapter_number) but a
    /// missing element is [`HarvestError::ExtractionTimeout`]
    pub fn find_chapter_number<P: PageDriver>(&self, page: &P) -> Result<ChapterNumber> {
        let start = Instant::now();
        thread::sleep(self.config.chapter_number_grace());

        loop {
            match page.query_text(&self.config.chapter_number_selector) {
                Ok(Some(text)) if !text.trim().is_empty() => return Ok(ChapterNumber::new(text)),
                Ok(_) => {}
                Err(e) => {
                    self.reporter
                        .warn(Stage::Download, &format!("Error extracting chapter number: {}", e));
                }
            }

            if start.elapsed() >= self.config.chapter_number_timeout() {
                break;
            }
            thread::sleep(self.config.chapter_number_poll());
        }

        Err(HarvestError::ExtractionTimeout(format!(
            "chapter number after {:?}",
            self.config.chapter_number_timeout()
        )))
    }

    /// Image sources that look like chapter pages, in document order
    pub fn extract_image_urls<P: PageDriver>(&self, page: &P) -> Vec<String> {
        let sources = match page.query_attribute_all(&self.config.image_selector, "src") {
            Ok(sources) => sources,
            Err(e) => {
                self.reporter
                    .error(Stage::Download, &format!("Reading image sources failed: {}", e));
                return Vec::new();
            }
        };

        let extension = self.config.image_extension.to_lowercase();
        let urls: Vec<String> = sources
            .into_iter()
            .filter(|src| {
                let lower = src.to_lowercase();
                lower.ends_with(&extension)
                    && !self
                        .config
                        .excluded_markers
                        .iter()
                        .any(|m| lower.contains(&m.to_lowercase()))
            })
            .collect();

        self.reporter.info(
            Stage::Download,
            &format!("{} images ({}) to download", urls.len(), self.config.image_extension),
        );
        urls
    }

    /// Absolute URL of the next chapter, or `None` when there is no usable link
    pub fn locate_next_link<P: PageDriver>(&self, page: &P) -> Option<Url> {
        let href = match page.wait_for_attribute(
            &self.config.next_link_selector,
            "href",
            self.config.next_link_timeout(),
        ) {
            Ok(Some(href)) if !href.trim().is_empty() => href,
            Ok(_) => return None,
            Err(e) => {
                self.reporter
                    .warn(Stage::Download, &format!("Error reading next chapter link: {}", e));
                return None;
            }
        };

        let current = page.current_url();
        let resolved = Url::parse(&current)
            .and_then(|base| base.join(href.trim()))
            .or_else(|_| Url::parse(href.trim()));

        match resolved {
            Ok(url) => Some(url),
            Err(e) => {
                self.reporter.warn(
                    Stage::Download,
                    &format!("Unusable next chapter link '{}': {}", href, e),
                );
                None
            }
        }
    }
}

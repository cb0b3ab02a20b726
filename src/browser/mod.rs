//! Browser automation for chapter readers that render with JavaScript.
//!
//! The walker and harvester only see the [`PageSource`] / [`PageDriver`]
//! traits; [`ChromeBrowser`] is the headless Chrome implementation.
//!
//! # Example
//!
//! ```no_run
//! use chapter_harvester::browser::{BrowserConfig, ChromeBrowser, PageDriver, PageSource};
//! use reqwest::Url;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let browser = ChromeBrowser::new(BrowserConfig::default())?;
//! let page = browser.open(&Url::parse("https://example.com/chapter-1")?)?;
//! let sources = page.query_attribute_all("img", "src")?;
//! println!("{} images on {}", sources.len(), page.current_url());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod manager;
pub mod page;
pub mod tab;

pub use config::BrowserConfig;
pub use manager::{BrowserError, ChromeBrowser};
pub use page::{PageDriver, PageSource};
pub use tab::ChromePage;

use super::config::BrowserConfig;
use super::page::PageSource;
use super::tab::ChromePage;
use headless_chrome::{Browser, LaunchOptions};
use reqwest::Url;
use std::ffi::OsStr;

/// Owns the Chrome process; every chapter page gets a fresh tab
pub struct ChromeBrowser {
    browser: Browser,
    config: BrowserConfig,
}

impl ChromeBrowser {
    /// Launch Chrome with the given configuration
    pub fn new(config: BrowserConfig) -> Result<Self, BrowserError> {
        let args = config.launch_args();
        let launch_options = Self::build_launch_options(&config, &args)?;

        let browser = Browser::new(launch_options)
            .map_err(|e| BrowserError::InitializationError(e.to_string()))?;

        Ok(Self { browser, config })
    }

    fn build_launch_options<'a>(
        config: &BrowserConfig,
        args: &'a [String],
    ) -> Result<LaunchOptions<'a>, BrowserError> {
        LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some(config.window_size))
            .idle_browser_timeout(config.timeout() * 4)
            .args(args.iter().map(OsStr::new).collect())
            .build()
            .map_err(|e| BrowserError::ConfigurationError(e.to_string()))
    }
}

impl PageSource for ChromeBrowser {
    type Page = ChromePage;

    fn open(&self, url: &Url) -> Result<ChromePage, BrowserError> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| BrowserError::TabCreationError(e.to_string()))?;
        tab.set_default_timeout(self.config.timeout());

        let page = ChromePage::new(tab);
        page.navigate(url.as_str())?;
        Ok(page)
    }
}

/// Errors that can occur during browser operations
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("Browser initialization failed: {0}")]
    InitializationError(String),

    #[error("Browser configuration error: {0}")]
    ConfigurationError(String),

    #[error("Tab creation failed: {0}")]
    TabCreationError(String),

    #[error("Navigation error: {0}")]
    NavigationError(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("JavaScript execution error: {0}")]
    JavaScriptError(String),
}

use reqwest::Url;
use serde_json::Value;
use std::time::Duration;

use super::manager::BrowserError;

/// One rendered page. Dropping the handle releases it.
pub trait PageDriver {
    /// Run a script in the page and return its value (`Null` when it has none)
    fn evaluate(&self, script: &str) -> Result<Value, BrowserError>;

    /// Inner text of the first element matching `selector`
    fn query_text(&self, selector: &str) -> Result<Option<String>, BrowserError>;

    /// `attribute` of every element matching `selector`, in document order.
    /// Elements lacking the attribute are left out.
    fn query_attribute_all(&self, selector: &str, attribute: &str) -> Result<Vec<String>, BrowserError>;

    /// Wait for `selector` and read `attribute` from it. A timeout is `Ok(None)`.
    fn wait_for_attribute(
        &self,
        selector: &str,
        attribute: &str,
        timeout: Duration,
    ) -> Result<Option<String>, BrowserError>;

    fn current_url(&self) -> String;
}

/// Something that can render a URL into a [`PageDriver`]
pub trait PageSource {
    type Page: PageDriver;

    fn open(&self, url: &Url) -> Result<Self::Page, BrowserError>;
}

impl<S: PageSource + ?Sized> PageSource for &S {
    type Page = S::Page;

    fn open(&self, url: &Url) -> Result<Self::Page, BrowserError> {
        (**self).open(url)
    }
}

/// Quote `s` as a JavaScript string literal
pub(crate) fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

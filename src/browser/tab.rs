use super::manager::BrowserError;
use super::page::{js_string, PageDriver};
use headless_chrome::Tab;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// A Chrome tab showing one chapter page. The tab is closed on drop.
pub struct ChromePage {
    tab: Arc<Tab>,
}

impl ChromePage {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }

    /// Navigate to a URL and wait for page load
    pub fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.tab
            .navigate_to(url)
            .map_err(|e| BrowserError::NavigationError(format!("Failed to navigate to {}: {}", url, e)))?;

        self.tab
            .wait_until_navigated()
            .map_err(|e| BrowserError::NavigationError(format!("Navigation timeout for {}: {}", url, e)))?;

        Ok(())
    }

    /// Evaluate a script that returns `JSON.stringify(...)` and decode it.
    /// Arrays come back from CDP as remote references, not values.
    fn evaluate_json(&self, script: &str) -> Result<Value, BrowserError> {
        match self.evaluate(script)? {
            Value::String(json) => serde_json::from_str(&json)
                .map_err(|e| BrowserError::JavaScriptError(format!("Unexpected script result: {}", e))),
            other => Ok(other),
        }
    }
}

impl PageDriver for ChromePage {
    fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;

        Ok(result.value.unwrap_or(Value::Null))
    }

    fn query_text(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); return el ? el.innerText : null; }})()",
            js_string(selector)
        );

        match self.evaluate(&script)? {
            Value::String(text) => Ok(Some(text)),
            _ => Ok(None),
        }
    }

    fn query_attribute_all(&self, selector: &str, attribute: &str) -> Result<Vec<String>, BrowserError> {
        let script = format!(
            "JSON.stringify(Array.from(document.querySelectorAll({})).map(e => e.getAttribute({})).filter(v => v !== null))",
            js_string(selector),
            js_string(attribute)
        );

        match self.evaluate_json(&script)? {
            Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    fn wait_for_attribute(
        &self,
        selector: &str,
        attribute: &str,
        timeout: Duration,
    ) -> Result<Option<String>, BrowserError> {
        let element = match self.tab.wait_for_element_with_custom_timeout(selector, timeout) {
            Ok(element) => element,
            Err(e) => {
                log::debug!("No element for {} within {:?}: {}", selector, timeout, e);
                return Ok(None);
            }
        };

        element
            .get_attribute_value(attribute)
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))
    }

    fn current_url(&self) -> String {
        self.tab.get_url()
    }
}

impl Drop for ChromePage {
    fn drop(&mut self) {
        if let Err(e) = self.tab.close(true) {
            log::debug!("Closing tab failed: {}", e);
        }
    }
}

use serde::Deserialize;
use std::time::Duration;

/// Flags that hide the most obvious automation fingerprints
const STEALTH_FLAGS: [&str; 3] = [
    "--disable-blink-features=AutomationControlled",
    "--disable-dev-shm-usage",
    "--no-sandbox",
];

/// Configuration for the Chrome instance driving chapter pages
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,

    /// Browser window size
    pub window_size: (u32, u32),

    /// Custom user agent
    pub user_agent: Option<String>,

    /// Navigation timeout in seconds
    pub timeout_seconds: u64,

    /// Block image loading. Lazy readers often only assign `src` once the
    /// image actually loads, so this stays off unless the site is known safe.
    pub disable_images: bool,

    /// Additional Chrome flags
    pub chrome_flags: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: (1920, 1080),
            user_agent: Some(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36"
                    .to_string(),
            ),
            timeout_seconds: 30,
            disable_images: false,
            chrome_flags: STEALTH_FLAGS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl BrowserConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Every command-line flag passed to Chrome
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = self.chrome_flags.clone();
        if self.disable_images {
            args.push("--blink-settings=imagesEnabled=false".to_string());
        }
        if let Some(ua) = &self.user_agent {
            args.push(format!("--user-agent={}", ua));
        }
        args
    }
}

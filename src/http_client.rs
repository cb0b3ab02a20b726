use rand::Rng;
use reqwest::blocking::{Client, ClientBuilder, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH};
use reqwest::{StatusCode, Url};
use std::io::Write;
use std::time::Duration;

/// User agents to rotate through to avoid bot detection
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// Errors from the HTTP collaborator
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("HTTP status {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("writing response body failed: {0}")]
    Body(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result of a header-only request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadResponse {
    pub status: u16,
    pub content_length: Option<u64>,
}

impl HeadResponse {
    /// Length the server vouched for with a 200 response, if any
    pub fn reported_length(&self) -> Option<u64> {
        if self.status == 200 {
            self.content_length
        } else {
            None
        }
    }
}

/// Blocking HTTP operations needed to acquire one image.
///
/// Implementations are shared by every worker of the download pool.
pub trait HttpSource: Send + Sync {
    /// Header-only request used to estimate the asset size
    fn head(&self, url: &Url) -> Result<HeadResponse, HttpError>;

    /// Stream the body of a 200 response into `sink`, returning bytes written
    fn fetch(&self, url: &Url, sink: &mut dyn Write) -> Result<u64, HttpError>;
}

impl<T: HttpSource + ?Sized> HttpSource for std::sync::Arc<T> {
    fn head(&self, url: &Url) -> Result<HeadResponse, HttpError> {
        (**self).head(url)
    }

    fn fetch(&self, url: &Url, sink: &mut dyn Write) -> Result<u64, HttpError> {
        (**self).fetch(url, sink)
    }
}

/// Configuration for the reqwest-backed source
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub max_retries: usize,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub enable_cookies: bool,
    pub enable_gzip: bool,
    pub rotate_user_agent: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 0,
            initial_retry_delay_ms: 500,
            max_retry_delay_ms: 8000,
            enable_cookies: true,
            enable_gzip: true,
            rotate_user_agent: true,
        }
    }
}

/// [`HttpSource`] over a blocking reqwest client
pub struct ReqwestSource {
    client: Client,
    config: HttpClientConfig,
}

impl ReqwestSource {
    pub fn new() -> Result<Self, HttpError> {
        Self::with_config(HttpClientConfig::default())
    }

    pub fn with_config(config: HttpClientConfig) -> Result<Self, HttpError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Accept",
            HeaderValue::from_static("image/avif,image/webp,image/apng,image/*,*/*;q=0.8"),
        );
        headers.insert("Accept-Language", HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("image"));
        headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("no-cors"));

        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .user_agent(USER_AGENTS[0])
            .cookie_store(config.enable_cookies)
            .gzip(config.enable_gzip)
            .brotli(config.enable_gzip)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .default_headers(headers)
            .build()?;

        Ok(Self { client, config })
    }

    fn random_user_agent() -> &'static str {
        let mut rng = rand::thread_rng();
        USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())]
    }

    fn decorate(&self, request: RequestBuilder) -> RequestBuilder {
        if self.config.rotate_user_agent {
            request.header("User-Agent", Self::random_user_agent())
        } else {
            request
        }
    }

    /// Exponential backoff with ±25% jitter
    fn calculate_retry_delay(&self, attempt: usize) -> Duration {
        let base_delay = self.config.initial_retry_delay_ms;
        let max_delay = self.config.max_retry_delay_ms;

        let delay_ms = base_delay
            .saturating_mul(2u64.saturating_pow(attempt as u32))
            .min(max_delay);

        let mut rng = rand::thread_rng();
        let jitter = rng.gen_range(0.75..=1.25);
        Duration::from_millis((delay_ms as f64 * jitter) as u64)
    }

    fn is_retryable_status(status: StatusCode) -> bool {
        matches!(
            status.as_u16(),
            429 | 500 | 502 | 503 | 504 | 520 | 521 | 522 | 523 | 524 | 525 | 526 | 527
        )
    }

    fn is_retryable_error(e: &reqwest::Error) -> bool {
        e.is_timeout() || e.is_connect()
    }

    /// GET with the configured retry budget. Returns the final response whatever its status.
    fn get_with_retry(&self, url: &Url) -> Result<Response, HttpError> {
        let mut attempt = 0;
        loop {
            match self.decorate(self.client.get(url.clone())).send() {
                Ok(response) => {
                    let status = response.status();
                    if Self::is_retryable_status(status) && attempt < self.config.max_retries {
                        log::warn!(
                            "Received retryable status {} for {}, attempt {}/{}",
                            status,
                            url,
                            attempt + 1,
                            self.config.max_retries + 1
                        );
                        std::thread::sleep(self.calculate_retry_delay(attempt));
                        attempt += 1;
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) if Self::is_retryable_error(&e) && attempt < self.config.max_retries => {
                    log::warn!(
                        "Request failed for {}, attempt {}/{}: {}",
                        url,
                        attempt + 1,
                        self.config.max_retries + 1,
                        e
                    );
                    std::thread::sleep(self.calculate_retry_delay(attempt));
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl HttpSource for ReqwestSource {
    fn head(&self, url: &Url) -> Result<HeadResponse, HttpError> {
        let response = self.decorate(self.client.head(url.clone())).send()?;

        // Read the header itself: the body of a HEAD response is always empty
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        Ok(HeadResponse {
            status: response.status().as_u16(),
            content_length,
        })
    }

    fn fetch(&self, url: &Url, sink: &mut dyn Write) -> Result<u64, HttpError> {
        let mut response = self.get_with_retry(url)?;
        if response.status() != StatusCode::OK {
            return Err(HttpError::Status(response.status().as_u16()));
        }

        let written = std::io::copy(&mut response, sink)?;
        sink.flush()?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        assert!(ReqwestSource::new().is_ok());
    }

    #[test]
    fn test_random_user_agent() {
        let ua = ReqwestSource::random_user_agent();
        assert!(USER_AGENTS.contains(&ua));
    }

    #[test]
    fn test_retry_delay_calculation() {
        let source = ReqwestSource::with_config(HttpClientConfig {
            max_retries: 3,
            ..HttpClientConfig::default()
        })
        .unwrap();

        let delay0 = source.calculate_retry_delay(0);
        let delay3 = source.calculate_retry_delay(3);
        let delay30 = source.calculate_retry_delay(30);

        assert!(delay0.as_millis() >= 375 && delay0.as_millis() <= 625);
        assert!(delay3.as_millis() >= 3000);
        // capped at max_retry_delay_ms plus jitter
        assert!(delay30.as_millis() <= 10_000);
    }

    #[test]
    fn test_retryable_status() {
        assert!(ReqwestSource::is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(ReqwestSource::is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(ReqwestSource::is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!ReqwestSource::is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!ReqwestSource::is_retryable_status(StatusCode::FORBIDDEN));
    }

    #[test]
    fn test_head_reported_length_requires_ok() {
        let ok = HeadResponse { status: 200, content_length: Some(30_000) };
        let redirected = HeadResponse { status: 404, content_length: Some(120) };
        assert_eq!(ok.reported_length(), Some(30_000));
        assert_eq!(redirected.reported_length(), None);
    }
}

//! Blocking HTTP client with configurable politeness (delay between requests) and optional retries.

use super::ScraperError;
use reqwest::blocking::{RequestBuilder, Response};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; epscrape/0.1; +https://github.com/epscrape)";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DELAY_SECS: u64 = 1;
const MAX_REDIRECTS: usize = 10;

/// Default number of attempts for get_with_retry (initial plus retries).
const DEFAULT_RETRY_COUNT: u32 = 3;
/// Default backoff delays in seconds after each failed attempt.
const DEFAULT_BACKOFF_SECS: [u64; 2] = [1, 2];
/// Backoff for HTTP 429 (rate limit): wait longer so the server can recover.
const BACKOFF_429_SECS: [u64; 4] = [30, 60, 90, 120];

/// Blocking HTTP client that enforces a delay between requests.
#[derive(Debug)]
pub struct PoliteClient {
    inner: reqwest::blocking::Client,
    delay: Duration,
    last_request: Option<Instant>,
    retry_count: u32,
    backoff_secs: Vec<u64>,
}

impl PoliteClient {
    /// Build a polite client with default User-Agent, timeout, and delay.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::builder().build()
    }

    /// Builder for custom User-Agent and/or delay.
    pub fn builder() -> PoliteClientBuilder {
        PoliteClientBuilder::default()
    }

    /// Perform a GET request. Sleeps until the configured delay has passed since the last request.
    pub fn get(&mut self, url: &str) -> Result<Response, reqwest::Error> {
        self.get_with_headers(url, &[])
    }

    /// GET with extra request headers (e.g. `Authorization`).
    pub fn get_with_headers(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<Response, reqwest::Error> {
        let request = with_headers(self.inner.get(url), headers);
        self.send(request)
    }

    /// POST a JSON body with extra request headers.
    pub fn post_json<T: Serialize + ?Sized>(
        &mut self,
        url: &str,
        body: &T,
        headers: &[(&str, &str)],
    ) -> Result<Response, reqwest::Error> {
        let request = with_headers(self.inner.post(url).json(body), headers);
        self.send(request)
    }

    /// GET a page and return its body as text, mapping failures to [ScraperError].
    pub fn fetch_text(&mut self, url: &str, context: &str) -> Result<String, ScraperError> {
        debug!(url, context, "fetching");
        let response = self.get(url).map_err(|e| ScraperError::Network {
            url: url.to_string(),
            source: e,
        })?;
        read_body(response, url, Some(context))
    }

    /// Perform a GET request with retries for transient failures.
    ///
    /// Retries on: timeout, connection errors, HTTP 5xx, and HTTP 429. The final response is
    /// returned as-is (callers check the status), so only transport errors surface as Err.
    pub fn get_with_retry(&mut self, url: &str) -> Result<Response, reqwest::Error> {
        let max_attempts = self.retry_count.max(1);
        let mut attempt = 0;
        loop {
            self.wait_delay();
            let result = self.inner.get(url).send();
            self.last_request = Some(Instant::now());
            let retryable = match &result {
                Ok(response) if response.status().as_u16() == 429 => {
                    Some(backoff_at(&BACKOFF_429_SECS, attempt))
                }
                Ok(response) if response.status().is_server_error() => {
                    Some(backoff_at(&self.backoff_secs, attempt))
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    Some(backoff_at(&self.backoff_secs, attempt))
                }
                _ => None,
            };
            let backoff = match retryable {
                Some(secs) if attempt + 1 < max_attempts => secs,
                _ => return result,
            };
            debug!(url, attempt, backoff, "retrying");
            std::thread::sleep(Duration::from_secs(backoff));
            attempt += 1;
        }
    }

    fn send(&mut self, request: RequestBuilder) -> Result<Response, reqwest::Error> {
        self.wait_delay();
        let response = request.send();
        self.last_request = Some(Instant::now());
        response
    }

    fn wait_delay(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                std::thread::sleep(self.delay - elapsed);
            }
        }
    }
}

fn with_headers(mut request: RequestBuilder, headers: &[(&str, &str)]) -> RequestBuilder {
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    request
}

fn backoff_at(table: &[u64], attempt: u32) -> u64 {
    table
        .get(attempt as usize)
        .or_else(|| table.last())
        .copied()
        .unwrap_or(1)
}

/// Check response status and read body as UTF-8. Returns body or ScraperError.
pub(crate) fn read_body(
    response: Response,
    url: &str,
    context: Option<&str>,
) -> Result<String, ScraperError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ScraperError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
            context: context.map(String::from),
        });
    }
    response
        .text()
        .map_err(|e| ScraperError::BodyRead { source: e })
}

/// Builder for PoliteClient with optional User-Agent, delay, timeout, and retry settings.
#[derive(Debug)]
pub struct PoliteClientBuilder {
    user_agent: Option<String>,
    delay_secs: u64,
    timeout_secs: u64,
    retry_count: u32,
    retry_backoff_secs: Vec<u64>,
}

impl Default for PoliteClientBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            delay_secs: DEFAULT_DELAY_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_backoff_secs: DEFAULT_BACKOFF_SECS.to_vec(),
        }
    }
}

impl PoliteClientBuilder {
    /// Set a custom User-Agent. If not set, a crate-identifying default is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set delay between requests in seconds. Default 1.
    pub fn delay_secs(mut self, secs: u64) -> Self {
        self.delay_secs = secs;
        self
    }

    /// Set request timeout in seconds. Default 30.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set number of HTTP attempts for get_with_retry (default 3).
    pub fn retry_count(mut self, n: u32) -> Self {
        self.retry_count = n.max(1);
        self
    }

    /// Set backoff delays in seconds before each retry. If shorter than needed, the last value is reused.
    pub fn retry_backoff_secs(mut self, secs: Vec<u64>) -> Self {
        self.retry_backoff_secs = secs;
        self
    }

    /// Build the blocking client and polite wrapper.
    pub fn build(self) -> Result<PoliteClient, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        let backoff_secs = if self.retry_backoff_secs.is_empty() {
            let n = self.retry_count.saturating_sub(1) as usize;
            (0..n).map(|i| 1u64 << i.min(4)).collect::<Vec<_>>()
        } else {
            self.retry_backoff_secs
        };
        Ok(PoliteClient {
            inner,
            delay: Duration::from_secs(self.delay_secs),
            last_request: None,
            retry_count: self.retry_count,
            backoff_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_reuses_last_value_past_the_table() {
        assert_eq!(backoff_at(&[1, 2], 0), 1);
        assert_eq!(backoff_at(&[1, 2], 1), 2);
        assert_eq!(backoff_at(&[1, 2], 5), 2);
        assert_eq!(backoff_at(&[], 0), 1);
    }

    #[test]
    fn builder_clamps_retry_count() {
        let builder = PoliteClient::builder().retry_count(0);
        assert_eq!(builder.retry_count, 1);
    }

    #[test]
    fn builder_derives_backoff_when_empty() -> Result<(), reqwest::Error> {
        let client = PoliteClient::builder()
            .retry_count(4)
            .retry_backoff_secs(Vec::new())
            .build()?;
        assert_eq!(client.backoff_secs, vec![1, 2, 4]);
        Ok(())
    }
}

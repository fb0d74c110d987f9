use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use url::Url;

use crate::config::FetchConfig;

#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Blocking page/image retrieval. Retries and politeness are the
/// implementation's concern; callers see one result per URL.
pub trait Fetcher: Send + Sync {
    fn fetch_page(&self, url: &Url) -> anyhow::Result<String>;
    fn fetch_image(&self, url: &Url) -> anyhow::Result<FetchedImage>;
}

#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    user_agent: String,
    attempts: u32,
    delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build http client")?;

        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
            attempts: config.attempts.max(1),
            delay: Duration::from_millis(config.delay_ms),
            last_request: Mutex::new(None),
        })
    }

    /// Spaces consecutive requests by at least `delay`, across all workers.
    fn throttle(&self) {
        let mut last = match self.last_request.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.delay {
                std::thread::sleep(self.delay - elapsed);
            }
        }
        *last = Some(Instant::now());
    }

    fn get_with_retry(
        &self,
        url: &Url,
        accept: &str,
    ) -> anyhow::Result<reqwest::blocking::Response> {
        let mut last_err = None;
        for attempt in 1..=self.attempts {
            self.throttle();
            let result = self
                .client
                .get(url.clone())
                .header(USER_AGENT, &self.user_agent)
                .header(ACCEPT, accept)
                .send()
                .and_then(reqwest::blocking::Response::error_for_status);
            match result {
                Ok(response) => return Ok(response),
                Err(err) => {
                    tracing::warn!(%url, attempt, attempts = self.attempts, %err, "request failed");
                    last_err = Some(err);
                }
            }
        }

        let err = last_err.ok_or_else(|| anyhow::anyhow!("no request attempted for {url}"))?;
        Err(anyhow::Error::new(err).context(format!(
            "GET {url} failed after {} attempt(s)",
            self.attempts
        )))
    }
}

impl Fetcher for HttpFetcher {
    fn fetch_page(&self, url: &Url) -> anyhow::Result<String> {
        let response =
            self.get_with_retry(url, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")?;
        response
            .text()
            .with_context(|| format!("read page body: {url}"))
    }

    fn fetch_image(&self, url: &Url) -> anyhow::Result<FetchedImage> {
        let response = self.get_with_retry(url, "image/*,*/*;q=0.8")?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let bytes = response
            .bytes()
            .with_context(|| format!("read image body: {url}"))?;

        Ok(FetchedImage {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

//! Client for the Câmara dos Deputados open data API.
//!
//! Every response of the API is wrapped as `{"dados": ...}`. The client
//! retries transport failures and timeouts with exponential backoff and
//! fails fast on HTTP error statuses.

use crate::config::ApiSettings;
use crate::error::{Error, Result};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Attempts and backoff for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub multiplier: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            multiplier: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &ApiSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            multiplier: Duration::from_secs(settings.backoff_multiplier_secs),
            max_delay: Duration::from_secs(settings.backoff_max_secs),
        }
    }

    /// Wait before retrying after failed attempt `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.multiplier
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Fixed-count pause: sleep `pause` before every request that follows a
/// multiple of `every` requests.
#[derive(Debug)]
pub struct RequestThrottle {
    every: u64,
    pause: Duration,
    count: AtomicU64,
}

impl RequestThrottle {
    pub fn new(every: u64, pause: Duration) -> Self {
        Self {
            every,
            pause,
            count: AtomicU64::new(0),
        }
    }

    /// Requests admitted so far
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub async fn admit(&self) {
        let issued = self.count.fetch_add(1, Ordering::Relaxed);
        if self.every > 0 && issued > 0 && issued % self.every == 0 {
            info!(
                requests = issued,
                pause_secs = self.pause.as_secs(),
                "request budget reached, pausing"
            );
            tokio::time::sleep(self.pause).await;
        }
    }
}

pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
    throttle: RequestThrottle,
}

impl ApiClient {
    pub fn new(settings: &ApiSettings) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .default_headers(headers)
            .build()
            .map_err(Error::Transport)?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::from_settings(settings),
            throttle: RequestThrottle::new(settings.pause_every, settings.pause_for()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn requests_issued(&self) -> u64 {
        self.throttle.count()
    }

    /// Resolve a path against the base URL. Absolute URLs (the API hands
    /// some out, e.g. `uriAutores`) are used as given.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// Issue a request and parse the JSON body, retrying transient failures.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Value> {
        let url = self.url_for(path);
        let mut attempt = 1;
        loop {
            self.throttle.admit().await;
            match self.send_once(method.clone(), &url, params).await {
                Ok(body) => return Ok(body),
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        url = %url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_once(&self, method: Method, url: &str, params: &[(&str, String)]) -> Result<Value> {
        debug!(method = %method, url = %url, "request");
        let resp = self.client.request(method, url).query(params).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                url: resp.url().to_string(),
            });
        }
        Ok(resp.json::<Value>().await?)
    }

    pub async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
        self.request(Method::GET, path, params).await
    }

    /// GET and decode the `dados` payload.
    pub async fn get_dados<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let body = self.get(path, params).await?;
        let dados = match body {
            Value::Object(mut map) => map.remove("dados"),
            _ => None,
        }
        .ok_or_else(|| Error::Validation(format!("no 'dados' in response of {}", path)))?;

        serde_json::from_value(dados)
            .map_err(|e| Error::Validation(format!("unexpected 'dados' shape in {}: {}", path, e)))
    }

    /// GET a collection; any failure degrades to an empty list.
    pub async fn get_list<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Vec<T> {
        match self.get_dados::<Vec<T>>(path, params).await {
            Ok(items) => items,
            Err(e) => {
                warn!(path = %path, error = %e, "listing failed, continuing with no items");
                Vec::new()
            }
        }
    }

    /// Walk `pagina=1..` until a short page, an empty page or `limit` items.
    pub async fn get_pages<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        page_size: usize,
        limit: Option<usize>,
    ) -> Result<Vec<T>> {
        let mut all = Vec::new();
        let mut page = 1usize;
        loop {
            let mut query: Vec<(&str, String)> = params.to_vec();
            query.push(("itens", page_size.to_string()));
            query.push(("pagina", page.to_string()));

            let batch: Vec<T> = self.get_dados(path, &query).await?;
            let fetched = batch.len();
            all.extend(batch);

            if let Some(limit) = limit {
                if all.len() >= limit {
                    all.truncate(limit);
                    break;
                }
            }
            if fetched < page_size || fetched == 0 {
                break;
            }
            page += 1;
        }
        debug!(path = %path, pages = page, count = all.len(), "paged listing done");
        Ok(all)
    }
}

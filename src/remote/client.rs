use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::{Method, StatusCode, header};
use serde_json::Value;

use super::{Deduplicator, RemoteError};
use crate::cache::{CacheService, Partition};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// TTLs for read-through caching of GET responses. Record endpoints churn
/// faster than metadata endpoints.
const RECORD_READ_TTL: Duration = Duration::from_secs(180);
const DEFAULT_READ_TTL: Duration = Duration::from_secs(300);

/// Retry schedule for remote calls: bounded attempts with exponential
/// backoff and jitter. Rate-limit responses (429) back off harder than
/// generic failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_millis(1000),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy with no delay between attempts, for tests.
    #[must_use]
    pub fn immediate(retries: u32) -> Self {
        Self {
            retries,
            base_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Whether a failed attempt should be retried. Client errors other than
    /// 429 are programming/config mistakes and retrying cannot help.
    #[must_use]
    pub fn should_retry(&self, status: Option<StatusCode>, attempt: u32) -> bool {
        if attempt >= self.retries {
            return false;
        }
        match status {
            None => true,
            Some(s) if s == StatusCode::TOO_MANY_REQUESTS => true,
            Some(s) if s.is_client_error() => false,
            _ => true,
        }
    }

    /// Delay before the attempt after `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32, status: Option<StatusCode>) -> Duration {
        let base = self.base_delay.as_millis() as f64;
        let (delay, jitter_max) = if status == Some(StatusCode::TOO_MANY_REQUESTS) {
            (base * 2f64.powi(attempt as i32), 1000)
        } else {
            (base * 1.5f64.powi(attempt as i32), 500)
        };
        let jitter = if self.jitter && self.base_delay > Duration::ZERO {
            rand::thread_rng().gen_range(0..=jitter_max)
        } else {
            0
        };
        Duration::from_millis(delay as u64 + jitter)
    }
}

/// Thin HTTP client over the hosted record store. Attaches bearer auth,
/// serializes JSON bodies, enforces a per-call timeout, and retries
/// transient failures per [`RetryPolicy`].
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    policy: RetryPolicy,
    cache: Option<Arc<CacheService>>,
    dedup: Deduplicator,
}

impl RemoteClient {
    pub fn new(
        base_url: impl Into<String>,
        api_token: &str,
        extra_headers: &[(&'static str, String)],
    ) -> Result<Self, RemoteError> {
        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {api_token}"))
            .map_err(|e| RemoteError::network("", format!("invalid api token: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        for (name, value) in extra_headers {
            let value = header::HeaderValue::from_str(value)
                .map_err(|e| RemoteError::network("", format!("invalid header {name}: {e}")))?;
            headers.insert(*name, value);
        }

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| RemoteError::network("", format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            policy: RetryPolicy::default(),
            cache: None,
            dedup: Deduplicator::new(),
        })
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Enables read-through caching of successful GET responses.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<CacheService>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Issues a request with bounded retries. The body is only sent for
    /// POST/PUT/PATCH. On exhaustion the last failure is surfaced.
    pub async fn call(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value, RemoteError> {
        self.call_with_headers(method, endpoint, body, &[]).await
    }

    /// Like [`call`](Self::call) but with per-request headers (e.g. the
    /// PostgREST `Prefer` header).
    pub async fn call_with_headers(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        headers: &[(&'static str, &str)],
    ) -> Result<Value, RemoteError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut last_error = RemoteError::network(&url, "no attempt made");

        for attempt in 1..=self.policy.retries {
            let mut request = self.http.request(method.clone(), &url);
            if body.is_some()
                && matches!(method, Method::POST | Method::PUT | Method::PATCH)
            {
                request = request.json(body.unwrap_or(&Value::Null));
            }
            for (name, value) in headers {
                request = request.header(*name, *value);
            }

            let (status, error) = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let raw = response.text().await.unwrap_or_default();
                    let parsed: Value = serde_json::from_str(&raw)
                        .unwrap_or_else(|_| serde_json::json!({ "raw": raw }));
                    if status.is_success() {
                        return Ok(parsed);
                    }
                    let message = parsed
                        .get("message")
                        .or_else(|| parsed.get("msg"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("remote api error: {}", status.as_u16()));
                    (
                        Some(status),
                        RemoteError {
                            status: Some(status.as_u16()),
                            message,
                            details: Some(parsed),
                            url: url.clone(),
                        },
                    )
                }
                Err(e) => (None, RemoteError::network(&url, e.to_string())),
            };

            tracing::warn!(
                "remote call failed (attempt {attempt}/{}): {} {} status={:?}",
                self.policy.retries,
                method,
                endpoint,
                status.map(|s| s.as_u16()),
            );
            last_error = error;

            if !self.policy.should_retry(status, attempt) {
                break;
            }
            let delay = self.policy.backoff(attempt, status);
            if delay > Duration::ZERO {
                tokio::time::sleep(delay).await;
            }
        }

        Err(last_error)
    }

    /// GET with in-flight deduplication and read-through caching. Successful
    /// responses land in the general cache partition keyed by the request
    /// signature; concurrent identical calls share one underlying fetch.
    pub async fn get_cached(&self, endpoint: &str) -> Result<Value, RemoteError> {
        let key = format!("remote:GET:{endpoint}");

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(Partition::General, &key) {
                return Ok(hit);
            }
        }

        let result = self
            .dedup
            .run(&key, self.call(Method::GET, endpoint, None))
            .await;

        if let (Some(cache), Ok(value)) = (&self.cache, &result) {
            let ttl = if endpoint.contains("/records") || endpoint.contains("/rest/") {
                RECORD_READ_TTL
            } else {
                DEFAULT_READ_TTL
            };
            cache.set(Partition::General, &key, value.clone(), ttl);
        }
        result
    }

    /// Drops cached GET responses whose endpoint starts with `prefix`.
    /// Called after every successful mutation so same-process reads never
    /// serve a pre-write copy.
    pub fn invalidate_reads(&self, prefix: &str) {
        if let Some(cache) = &self.cache {
            cache.clear_prefix(Partition::General, &format!("remote:GET:{prefix}"));
        }
    }
}

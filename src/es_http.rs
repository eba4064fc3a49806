use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

/// Thin JSON-over-HTTP wrapper around the cluster REST endpoint.
///
/// Server errors (5xx) and transport failures are retried here with linear
/// backoff; every other non-success status is surfaced to the caller.
#[derive(Clone)]
pub struct EsHttp {
    client: Client,
    base_url: Arc<str>,
    user: Arc<str>,
    pass: Arc<str>,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl EsHttp {
    pub fn new(
        base_url: impl Into<Arc<str>>,
        user: impl Into<Arc<str>>,
        pass: impl Into<Arc<str>>,
        timeout: Duration,
        gzip: bool,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).gzip(gzip).build()?;
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url.into()),
            user: user.into(),
            pass: pass.into(),
            max_attempts: 3,
            retry_backoff: Duration::from_secs(1),
        })
    }

    pub fn with_retry(mut self, max_attempts: u32, retry_backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_backoff = retry_backoff;
        self
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.client.request(method, self.url(path));
        if self.user.is_empty() {
            req
        } else {
            req.basic_auth(&*self.user, Some(&*self.pass))
        }
    }

    pub async fn send_expect(
        &self,
        mut req: RequestBuilder,
        context: &'static str,
        ok: impl Fn(StatusCode) -> bool,
    ) -> Result<Response> {
        let mut attempt = 1u32;
        loop {
            let retry = (attempt < self.max_attempts)
                .then(|| req.try_clone())
                .flatten();

            match req.send().await {
                Ok(resp) if ok(resp.status()) => return Ok(resp),
                Ok(resp) if resp.status().is_server_error() && retry.is_some() => {
                    warn!(
                        "es_http: {} status={} attempt={}/{}, retrying",
                        context,
                        resp.status(),
                        attempt,
                        self.max_attempts
                    );
                }
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    anyhow::bail!(
                        "{} status={} body_sample={}",
                        context,
                        status,
                        truncate_body_snippet(&text, 500)
                    );
                }
                Err(err) if retry.is_some() => {
                    warn!(
                        "es_http: {} transport error attempt={}/{}: {err}",
                        context, attempt, self.max_attempts
                    );
                }
                Err(err) => return Err(err).context(context),
            }

            let Some(next) = retry else {
                anyhow::bail!("{context}: request could not be retried");
            };
            tokio::time::sleep(self.retry_backoff * attempt).await;
            req = next;
            attempt += 1;
        }
    }

    pub async fn send_ok(&self, req: RequestBuilder, context: &'static str) -> Result<Response> {
        self.send_expect(req, context, |s| s.is_success()).await
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        context: &'static str,
    ) -> Result<T> {
        let resp = self
            .send_ok(self.request(Method::GET, path), context)
            .await?;
        resp.json().await.context(context)
    }

    /// GET that maps a 404 to `None` instead of an error.
    pub async fn get_json_opt<T: DeserializeOwned>(
        &self,
        path: &str,
        context: &'static str,
    ) -> Result<Option<T>> {
        let resp = self
            .send_expect(self.request(Method::GET, path), context, |s| {
                s.is_success() || s == StatusCode::NOT_FOUND
            })
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        resp.json().await.map(Some).context(context)
    }

    pub async fn put_value(
        &self,
        path: &str,
        body: &Value,
        context: &'static str,
    ) -> Result<Value> {
        let resp = self
            .send_ok(self.request(Method::PUT, path).json(body), context)
            .await?;
        resp.json().await.context(context)
    }

    pub async fn delete_allow_404(&self, path: &str, context: &'static str) -> Result<bool> {
        let resp = self
            .send_expect(self.request(Method::DELETE, path), context, |s| {
                s.is_success() || s == StatusCode::NOT_FOUND
            })
            .await?;
        Ok(resp.status() != StatusCode::NOT_FOUND)
    }
}

fn normalize_base_url(base_url: Arc<str>) -> Arc<str> {
    if base_url.ends_with('/') {
        Arc::<str>::from(base_url.trim_end_matches('/'))
    } else {
        base_url
    }
}

fn truncate_body_snippet(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

use super::request::StepRequest;
use super::response::HttpResponse;
use crate::error::{Error, Result};

const MAX_REDIRECTS: usize = 10;

/// Sends a step's request and returns the raw result.
///
/// The runner only talks to this trait so that other executors (kubectl,
/// SSH, canned responses in tests) can stand in for HTTP.
pub trait Transport: Send + Sync {
    fn send<'a>(
        &'a self,
        request: &'a StepRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send + 'a>>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn send<'a>(
        &'a self,
        request: &'a StepRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send + 'a>> {
        Box::pin(async move {
            let url = reqwest::Url::parse(&request.url)
                .map_err(|e| Error::transport(format!("Invalid URL `{}`: {e}", request.url)))?;
            let mut builder = self
                .client
                .request(request.method.into(), url)
                .headers(build_headers(&request.headers)?);

            if let Some(ms) = request.timeout_ms.filter(|ms| *ms > 0) {
                builder = builder.timeout(Duration::from_millis(ms));
            }
            if request.method.carries_body() {
                if let Some(body) = request.body.as_ref().filter(|b| !b.trim().is_empty()) {
                    builder = builder.body(body.clone());
                }
            }

            let started = Instant::now();
            let response = builder
                .send()
                .await
                .map_err(|e| Error::transport(format!("Request failed: {e}")))?;
            let status = response.status().as_u16();
            let headers = collect_headers(response.headers());
            let bytes = response
                .bytes()
                .await
                .map_err(|e| Error::transport(format!("Failed to read response: {e}")))?;
            let duration_ms = started.elapsed().as_millis();
            debug!(method = %request.method, url = %request.url, status, elapsed_ms = duration_ms as u64, "Step request finished");

            Ok(HttpResponse {
                status,
                headers,
                body: String::from_utf8_lossy(&bytes).into_owned(),
                duration_ms,
            })
        })
    }
}

pub fn build_headers(input: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (key, value) in input {
        if key.trim().is_empty() {
            continue;
        }
        let name = HeaderName::from_bytes(key.trim().as_bytes())
            .map_err(|e| Error::transport(format!("Invalid header name `{key}`: {e}")))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|e| Error::transport(format!("Invalid header value for `{key}`: {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_ascii_lowercase(),
                value.to_str().unwrap_or("<binary>").to_string(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_headers_and_skips_blank_names() {
        let mut input = BTreeMap::new();
        input.insert("Content-Type".to_string(), "application/json".to_string());
        input.insert(" ".to_string(), "ignored".to_string());
        let headers = build_headers(&input).unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["content-type"], "application/json");
    }

    #[test]
    fn rejects_invalid_header_names() {
        let mut input = BTreeMap::new();
        input.insert("bad header".to_string(), "x".to_string());
        assert!(matches!(build_headers(&input), Err(Error::Transport(_))));
    }

    #[test]
    fn collects_response_headers() {
        let mut map = HeaderMap::new();
        map.insert("x-request-id", HeaderValue::from_static("42"));
        let collected = collect_headers(&map);
        assert_eq!(collected.get("x-request-id").map(String::as_str), Some("42"));
    }
}

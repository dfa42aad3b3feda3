//! HTTP capability used by discovery and the data fetch.

use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    /// Raw `Date` response header, if the server sent one.
    pub date: Option<String>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait HttpClient: Send + Sync {
    /// Blocking GET. Transport failures are errors; HTTP error statuses are not.
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse>;
}

/// `reqwest` blocking client over rustls.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("lamplink/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .with_context(|| format!("GET {url} failed"))?;

        let status = response.status().as_u16();
        let date = response
            .headers()
            .get(reqwest::header::DATE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .with_context(|| format!("Failed to read body from {url}"))?;

        Ok(HttpResponse { status, body, date })
    }
}

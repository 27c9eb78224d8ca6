//! HTTP fetching of raw response bodies.

use crate::error::FetchError;
use anyhow::{Context, Result};
use reqwest::Url;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// A response body together with its HTTP status.
///
/// The status is informational: a non-2xx answer is still returned as a
/// body and left for the caller to judge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub status: u16,
    pub body: String,
}

impl Fetched {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Source of raw response bodies for a URL.
pub trait Fetch {
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<Fetched, FetchError>> + Send;
}

/// Fetcher backed by a reqwest client. One GET per call, no retries.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher. Without a timeout the client default applies.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("langtally/", env!("CARGO_PKG_VERSION")));

        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<Fetched, FetchError>> + Send {
        let request = self.client.get(url.clone());
        let url = url.to_string();

        async move {
            debug!("GET {}", url);

            let response = request
                .send()
                .await
                .map_err(|e| FetchError::from_send(&url, e))?;

            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|source| FetchError::Body {
                    url: url.clone(),
                    source,
                })?;

            debug!("{} answered {} ({} bytes)", url, status, body.len());

            Ok(Fetched { status, body })
        }
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP transport seam.
//!
//! All remote traffic goes through the [`Transport`] trait so tests can
//! substitute a scripted mock. Paths are passed as segments, not joined
//! strings: document ids may contain `/`, which must travel
//! percent-encoded inside a single path segment.

use std::future::Future;
use std::pin::Pin;

use reqwest::Url;
use serde_json::Value;
use tracing::trace;

use crate::error::{RemoteError, Result};

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// HTTP method subset the protocol uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Put => reqwest::Method::PUT,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// One JSON request/response exchange with the remote.
///
/// Implementations encode each element of `path` as one URL segment and
/// answer the decoded JSON body of a 2xx response. Non-2xx statuses
/// become [`RemoteError::Transport`] with the status attached.
pub trait Transport: Send + Sync {
    fn request(
        &self,
        method: Method,
        path: &[&str],
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> BoxFuture<'_, Value>;
}

/// Production transport over reqwest.
///
/// The client carries no overall timeout: long polls are held open by
/// the server and bounded by the puller's watchdog instead.
pub struct HttpTransport {
    base: Url,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|err| RemoteError::Config(format!("invalid base url: {err}")))?;
        if base.cannot_be_a_base() {
            return Err(RemoteError::Config(format!(
                "base url has no path: {base_url}"
            )));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| RemoteError::Config(format!("http client: {err}")))?;
        Ok(Self { base, client })
    }

    fn build_url(&self, path: &[&str], query: &[(&str, String)]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Config("base url cannot carry paths".to_string()))?
            .extend(path.iter().copied());
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

impl Transport for HttpTransport {
    fn request(
        &self,
        method: Method,
        path: &[&str],
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> BoxFuture<'_, Value> {
        let url = match self.build_url(path, query) {
            Ok(url) => url,
            Err(err) => return Box::pin(async move { Err(err) }),
        };
        trace!(method = %method, url = %url, "request");

        let mut request = self.client.request(method.into(), url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        Box::pin(async move {
            let response = request.send().await.map_err(|err| {
                RemoteError::transport(err.status().map(|s| s.as_u16()), err.to_string())
            })?;

            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(RemoteError::transport(Some(status.as_u16()), message));
            }

            response
                .json::<Value>()
                .await
                .map_err(|err| RemoteError::BadResponse(err.to_string()))
        })
    }
}

/// Borrow a `String` path as transport segments.
pub(crate) fn segment_refs(path: &[String]) -> Vec<&str> {
    path.iter().map(String::as_str).collect()
}

//! HTTP transport seam.
//!
//! Everything above this module works on fully-buffered [`Response`] values,
//! so rate-limit bookkeeping and tests never touch a live connection.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use std::sync::Arc;

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// A buffered HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self { status, headers: HeaderMap::new(), body: Vec::new() }
    }

    /// Add a header. Invalid names or values are a programming error in the
    /// caller and are silently ignored.
    pub fn with_header(mut self, name: &'static str, value: impl AsRef<str>) -> Self {
        if let Ok(value) = HeaderValue::from_str(value.as_ref()) {
            self.headers.insert(HeaderName::from_static(name), value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_json(self, value: &serde_json::Value) -> Self {
        self.with_header("content-type", "application/json").with_body(value.to_string())
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        serde_json::from_slice(&self.body).or_raise(|| ErrorKind::Decode(url.to_string()))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Performs a single GET request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<Response>;
}

pub type TransportHandle = Arc<dyn Transport + Send + Sync>;

/// [`Transport`] backed by a [`reqwest::Client`].
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Client for the metadata API: JSON accept headers and an optional
    /// bearer credential on every request.
    pub fn api(user_agent: &str, token: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));
        headers.insert(HeaderName::from_static("x-github-api-version"), HeaderValue::from_static(GITHUB_API_VERSION));
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}")).or_raise(|| ErrorKind::Client)?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        Self::build(user_agent, headers)
    }

    /// Anonymous client for public HTML pages.
    pub fn page(user_agent: &str) -> Result<Self> {
        Self::build(user_agent, HeaderMap::new())
    }

    fn build(user_agent: &str, headers: HeaderMap) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .build()
            .or_raise(|| ErrorKind::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn get(&self, url: &str) -> Result<Response> {
        let response = self.client.get(url).send().await.or_raise(|| ErrorKind::Request(url.to_string()))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.or_raise(|| ErrorKind::Request(url.to_string()))?;
        tracing::debug!(status = status.as_u16(), bytes = body.len(), "Received response");
        Ok(Response { status, headers, body: body.to_vec() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_json() {
        let response = Response::new(StatusCode::OK).with_json(&json!({"message": "hello"}));
        let value: serde_json::Value = response.json("https://example.com").unwrap();
        assert_eq!(value["message"], "hello");
        assert!(response.is_success());
    }

    #[test]
    fn test_response_json_decode_error() {
        let response = Response::new(StatusCode::OK).with_body("<html>");
        let err = response.json::<serde_json::Value>("https://example.com").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Decode(url) if url == "https://example.com"));
    }

    #[test]
    fn test_clients_build() {
        assert!(HttpTransport::api("gharvest-test", Some("token")).is_ok());
        assert!(HttpTransport::api("gharvest-test", None).is_ok());
        assert!(HttpTransport::page("gharvest-test").is_ok());
    }

    #[test]
    fn test_invalid_token_is_rejected() {
        assert!(HttpTransport::api("gharvest-test", Some("bad\ntoken")).is_err());
    }
}

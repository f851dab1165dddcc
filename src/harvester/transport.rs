//! HTTP transport used by the harvester.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, redirect, Client};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::HarvesterConfig;
use crate::error::HarvestError;

/// Default `User-Agent` when none is configured
pub const DEFAULT_USER_AGENT: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Optional identification headers sent with every request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    /// `User-Agent`; the transport default is used when unset
    pub user_agent: Option<String>,

    /// `From`, a contact email address
    pub from: Option<String>,
}

/// A response as received, before any interpretation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,

    /// Raw `Retry-After` header value, if present
    pub retry_after: Option<String>,

    /// `Location` header value, if present
    pub location: Option<String>,

    pub body: Bytes,

    /// Set when the status and headers arrived but the body could not be read
    pub body_error: Option<String>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            retry_after: None,
            location: None,
            body: body.into(),
            body_error: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: impl Into<String>) -> Self {
        self.retry_after = Some(retry_after.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Mark the body as unreadable, e.g. a connection dropped mid-transfer
    pub fn with_body_error(mut self, error: impl Into<String>) -> Self {
        self.body_error = Some(error.into());
        self
    }

    /// `Retry-After` as a number of seconds. HTTP dates are not supported.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after.as_deref()?.trim().parse().ok()
    }
}

/// Performs GET requests against the repository.
///
/// Implementations must not follow redirects; 3xx responses are returned as
/// they are. An `Err` means no response was received at all; a response
/// whose body failed to arrive is returned with [`RawResponse::body_error`] set.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn get(&self, uri: &Url, headers: &RequestHeaders) -> Result<RawResponse, HarvestError>;
}

/// [`Transport`] backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Arc<Client>,
}

impl ReqwestTransport {
    /// Create a transport with default timeouts
    pub fn new() -> Result<Self, HarvestError> {
        Self::with_timeouts(Duration::from_secs(120), Duration::from_secs(10))
    }

    /// Create a transport using the configured timeouts
    pub fn from_config(config: &HarvesterConfig) -> Result<Self, HarvestError> {
        Self::with_timeouts(
            Duration::from_secs(config.request_timeout_secs),
            Duration::from_secs(config.connect_timeout_secs),
        )
    }

    pub fn with_timeouts(request_timeout: Duration, connect_timeout: Duration) -> Result<Self, HarvestError> {
        let client = Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| HarvestError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::from_client(Arc::new(client)))
    }

    /// Wrap an existing client. It should be built with redirects disabled.
    pub fn from_client(client: Arc<Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, uri: &Url, headers: &RequestHeaders) -> Result<RawResponse, HarvestError> {
        let mut request = self.client.get(uri.clone());
        if let Some(user_agent) = &headers.user_agent {
            request = request.header(header::USER_AGENT, user_agent);
        }
        if let Some(from) = &headers.from {
            request = request.header(header::FROM, from);
        }

        let response = request.send().await?;

        let header_value = |name: header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let status = response.status().as_u16();
        let retry_after = header_value(header::RETRY_AFTER);
        let location = header_value(header::LOCATION);

        let (body, body_error) = match response.bytes().await {
            Ok(body) => (body, None),
            Err(e) => (Bytes::new(), Some(e.to_string())),
        };

        Ok(RawResponse {
            status,
            retry_after,
            location,
            body,
            body_error,
        })
    }
}

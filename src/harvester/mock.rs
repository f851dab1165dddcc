//! Scripted transport for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use url::Url;

use super::transport::{RawResponse, RequestHeaders, Transport};
use crate::error::HarvestError;

/// A request seen by [`MockTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub uri: Url,
    pub headers: RequestHeaders,
}

/// A transport that replays queued responses in order.
///
/// When the queue runs dry every further request fails with a transport
/// error.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<RawResponse, HarvestError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response
    pub fn push_response(&self, response: RawResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue a 200 response with the given body
    pub fn push_ok(&self, body: impl Into<String>) {
        self.push_response(RawResponse::new(200, body.into()));
    }

    /// Queue a 503 with a `Retry-After` header
    pub fn push_retry_after(&self, seconds: u64) {
        self.push_response(RawResponse::new(503, "").with_retry_after(seconds.to_string()));
    }

    /// Queue a failure where no response is received
    pub fn push_error(&self, error: HarvestError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Every request made so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests made so far
    pub fn attempts(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Number of queued responses not yet consumed
    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, uri: &Url, headers: &RequestHeaders) -> Result<RawResponse, HarvestError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            uri: uri.clone(),
            headers: headers.clone(),
        });

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(HarvestError::Transport("No scripted response".to_string())))
    }
}

//! Typed responses returned by the harvester.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::article::ArticleMetadata;
use super::request::{GetRecordRequest, ListRecordsRequest, ResumeListRecordsRequest};

/// Response to a [`GetRecordRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetRecordResponse {
    /// When the repository produced the response
    pub response_date: DateTime<FixedOffset>,

    /// The request that was sent
    pub request: GetRecordRequest,

    /// The record, or `None` if the repository has no such identifier
    pub record: Option<ArticleMetadata>,
}

/// Response to a [`ListRecordsRequest`] or one of its resumptions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRecordsResponse {
    /// When the repository produced the response
    pub response_date: DateTime<FixedOffset>,

    /// The original ListRecords request, even when this page came from a
    /// resumption
    pub request: ListRecordsRequest,

    /// Records in this page; empty if nothing matched
    pub records: Vec<ArticleMetadata>,

    /// Token for the next page, if there is one
    pub resumption_token: Option<String>,

    /// Position of this page in the complete list, when reported
    pub cursor: Option<u64>,

    /// Size of the complete list, when reported
    pub complete_list_size: Option<u64>,
}

impl ListRecordsResponse {
    /// Build the request for the next page.
    ///
    /// Returns `None` when the repository sent no resumption token, or a blank
    /// one, meaning this was the last page.
    pub fn resumption(&self) -> Option<ResumeListRecordsRequest> {
        self.resumption_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| ResumeListRecordsRequest::new(token, self.request.clone()))
    }

    /// Whether another page is available
    pub fn has_more(&self) -> bool {
        self.resumption().is_some()
    }
}

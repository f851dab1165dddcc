//! Requests that can be sent to the arXiv OAI repository.
//!
//! Every request knows its verb and the query parameters it sends. The
//! repository base URL is supplied by the harvester, so the same request can be
//! pointed at a mirror or a test server with [`OaiRequest::uri_for`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::HarvestError;

/// The only metadata format this crate decodes
pub const METADATA_PREFIX: &str = "arXivRaw";

/// The public arXiv OAI-PMH endpoint
pub const DEFAULT_BASE_URL: &str = "http://export.arxiv.org/oai2";

/// Prefix shared by every arXiv OAI identifier
pub const IDENTIFIER_PREFIX: &str = "oai:arXiv.org:";

/// OAI-PMH verbs supported by the harvester
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    GetRecord,
    ListRecords,
}

impl Verb {
    /// The verb as it appears in the request URI
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::GetRecord => "GetRecord",
            Verb::ListRecords => "ListRecords",
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Common interface of every request type
pub trait OaiRequest {
    /// The OAI-PMH verb
    fn verb(&self) -> Verb;

    /// Query parameters after `verb`, in the order they are sent
    fn parameters(&self) -> Vec<(&'static str, String)>;

    /// The encoded query string, e.g. `verb=ListRecords&resumptionToken=T`
    fn query(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        serializer.append_pair("verb", self.verb().as_str());
        for (key, value) in self.parameters() {
            serializer.append_pair(key, &value);
        }
        serializer.finish()
    }

    /// The request URI against the public repository
    fn uri(&self) -> String {
        format!("{}?{}", DEFAULT_BASE_URL, self.query())
    }

    /// The full request URI against the given repository base URL
    fn uri_for(&self, base: &Url) -> Url {
        let mut uri = base.clone();
        uri.set_query(Some(&self.query()));
        uri
    }
}

/// Retrieve a single record by identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GetRecordRequest {
    identifier: String,
}

impl GetRecordRequest {
    /// Create a request for the given identifier.
    ///
    /// Accepts identifiers with or without the `oai:arXiv.org:` prefix, e.g.
    /// "1302.2146", "nucl-ex/0511023" or "oai:arXiv.org:1302.2146".
    pub fn new(identifier: impl AsRef<str>) -> Result<Self, HarvestError> {
        let identifier = identifier.as_ref().trim();
        if identifier.is_empty() || identifier == IDENTIFIER_PREFIX {
            return Err(HarvestError::InvalidRequest(
                "Empty record identifier".to_string(),
            ));
        }

        let identifier = if identifier.starts_with(IDENTIFIER_PREFIX) {
            identifier.to_string()
        } else {
            format!("{}{}", IDENTIFIER_PREFIX, identifier)
        };

        Ok(Self { identifier })
    }

    /// Full OAI identifier, always prefixed
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl OaiRequest for GetRecordRequest {
    fn verb(&self) -> Verb {
        Verb::GetRecord
    }

    fn parameters(&self) -> Vec<(&'static str, String)> {
        vec![
            ("metadataPrefix", METADATA_PREFIX.to_string()),
            ("identifier", self.identifier.clone()),
        ]
    }
}

/// Retrieve every record in a datestamp range, optionally restricted to a set.
///
/// Responses may be paginated; see
/// [`ListRecordsResponse::resumption`](crate::models::ListRecordsResponse::resumption).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListRecordsRequest {
    from_date: Option<NaiveDate>,
    until_date: Option<NaiveDate>,
    set_spec: Option<String>,
}

impl ListRecordsRequest {
    /// Create a request. All bounds are optional, but `from_date` may not be
    /// after `until_date`.
    pub fn new(
        from_date: Option<NaiveDate>,
        until_date: Option<NaiveDate>,
        set_spec: Option<String>,
    ) -> Result<Self, HarvestError> {
        if let (Some(from), Some(until)) = (from_date, until_date) {
            if from > until {
                return Err(HarvestError::InvalidRequest(format!(
                    "Invalid datestamp range: from {} is after until {}",
                    from, until
                )));
            }
        }

        Ok(Self {
            from_date,
            until_date,
            set_spec,
        })
    }

    /// Lower bound of the datestamp range
    pub fn from_date(&self) -> Option<NaiveDate> {
        self.from_date
    }

    /// Upper bound of the datestamp range
    pub fn until_date(&self) -> Option<NaiveDate> {
        self.until_date
    }

    /// Set the request is restricted to
    pub fn set_spec(&self) -> Option<&str> {
        self.set_spec.as_deref()
    }
}

impl OaiRequest for ListRecordsRequest {
    fn verb(&self) -> Verb {
        Verb::ListRecords
    }

    fn parameters(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("metadataPrefix", METADATA_PREFIX.to_string())];
        if let Some(from) = self.from_date {
            params.push(("from", from.format("%Y-%m-%d").to_string()));
        }
        if let Some(until) = self.until_date {
            params.push(("until", until.format("%Y-%m-%d").to_string()));
        }
        if let Some(set) = &self.set_spec {
            params.push(("set", set.clone()));
        }
        params
    }
}

/// Continue a paginated ListRecords request.
///
/// Only the resumption token is sent; the protocol forbids repeating the
/// original filters. The original request is carried along so responses can
/// report it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResumeListRecordsRequest {
    resumption_token: String,
    original_request: ListRecordsRequest,
}

impl ResumeListRecordsRequest {
    pub fn new(resumption_token: impl Into<String>, original_request: ListRecordsRequest) -> Self {
        Self {
            resumption_token: resumption_token.into(),
            original_request,
        }
    }

    pub fn resumption_token(&self) -> &str {
        &self.resumption_token
    }

    /// The ListRecords request this continues
    pub fn original_request(&self) -> &ListRecordsRequest {
        &self.original_request
    }
}

impl OaiRequest for ResumeListRecordsRequest {
    fn verb(&self) -> Verb {
        Verb::ListRecords
    }

    fn parameters(&self) -> Vec<(&'static str, String)> {
        vec![("resumptionToken", self.resumption_token.clone())]
    }
}

//! OAI-PMH error codes and how seriously to take them.

use std::str::FromStr;

/// Error codes defined by OAI-PMH v2.0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OaiErrorCode {
    BadVerb,
    CannotDisseminateFormat,
    NoMetadataFormats,
    NoSetHierarchy,
    BadArgument,
    BadResumptionToken,
    IdDoesNotExist,
    NoRecordsMatch,
}

/// How a reported error is surfaced. Lower ordinal is more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Should never come back from a working repository for our requests
    Internal = 1,
    /// The caller sent something the repository rejected
    CallerInput = 2,
    /// Nothing matched; not an error at all
    EmptyResult = 3,
}

/// Severity of every known code
const SEVERITY_TABLE: &[(OaiErrorCode, Severity)] = &[
    (OaiErrorCode::BadVerb, Severity::Internal),
    (OaiErrorCode::CannotDisseminateFormat, Severity::Internal),
    (OaiErrorCode::NoMetadataFormats, Severity::Internal),
    (OaiErrorCode::NoSetHierarchy, Severity::Internal),
    (OaiErrorCode::BadArgument, Severity::CallerInput),
    (OaiErrorCode::BadResumptionToken, Severity::CallerInput),
    (OaiErrorCode::IdDoesNotExist, Severity::EmptyResult),
    (OaiErrorCode::NoRecordsMatch, Severity::EmptyResult),
];

impl OaiErrorCode {
    /// The code as it appears in the `code` attribute
    pub fn as_str(&self) -> &'static str {
        match self {
            OaiErrorCode::BadVerb => "badVerb",
            OaiErrorCode::CannotDisseminateFormat => "cannotDisseminateFormat",
            OaiErrorCode::NoMetadataFormats => "noMetadataFormats",
            OaiErrorCode::NoSetHierarchy => "noSetHierarchy",
            OaiErrorCode::BadArgument => "badArgument",
            OaiErrorCode::BadResumptionToken => "badResumptionToken",
            OaiErrorCode::IdDoesNotExist => "idDoesNotExist",
            OaiErrorCode::NoRecordsMatch => "noRecordsMatch",
        }
    }

    pub fn severity(&self) -> Severity {
        SEVERITY_TABLE
            .iter()
            .find(|(code, _)| code == self)
            .map(|(_, severity)| *severity)
            .unwrap_or(Severity::Internal)
    }
}

impl FromStr for OaiErrorCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SEVERITY_TABLE
            .iter()
            .map(|(code, _)| *code)
            .find(|code| code.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

impl std::fmt::Display for OaiErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One `<error>` element from a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryErrorReport {
    /// Raw `code` attribute
    pub raw_code: String,

    /// Parsed code; `None` for codes outside the protocol
    pub code: Option<OaiErrorCode>,

    /// Human-readable message from the element body
    pub message: String,
}

impl RepositoryErrorReport {
    pub fn new(raw_code: impl Into<String>, message: impl Into<String>) -> Self {
        let raw_code = raw_code.into();
        Self {
            code: raw_code.parse().ok(),
            raw_code,
            message: message.into(),
        }
    }

    /// Unknown codes are treated as internal errors
    pub fn severity(&self) -> Severity {
        self.code
            .map(|code| code.severity())
            .unwrap_or(Severity::Internal)
    }
}

/// The report that governs the response: the most severe one.
pub fn most_severe(reports: &[RepositoryErrorReport]) -> Option<&RepositoryErrorReport> {
    reports.iter().min_by_key(|report| report.severity())
}

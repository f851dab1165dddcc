//! Error taxonomy for harvesting operations.

use crate::xml::ParseError;

/// Broad classification of a [`HarvestError`].
///
/// Callers that only need to decide how to react (fix the input, back off and
/// try later, give up) can match on this instead of the full error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Could not reach the repository or read its response
    Transport,
    /// Retry budget exhausted, or the repository asked us to wait too long
    Timeout,
    /// A wait was cancelled from outside
    Interrupted,
    /// The repository answered with a redirect
    UnsupportedRedirect,
    /// The repository's response was invalid or reported an internal error
    Repository,
    /// The repository rejected one of the request arguments
    BadArgument,
    /// The repository rejected the resumption token
    BadResumptionToken,
    /// The request or configuration was invalid before anything was sent
    InvalidRequest,
}

/// Errors that can occur while harvesting from the repository
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// Network or IO failure talking to the repository
    #[error("Transport error: {0}")]
    Transport(String),

    /// Too many retries, or the suggested wait exceeded the configured maximum
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A spacing or retry wait was cancelled
    #[error("Interrupted: {0}")]
    Interrupted(String),

    /// 302 responses are not followed
    #[error("Unsupported redirect: {0}")]
    UnsupportedRedirect(String),

    /// Unexpected status code, or a protocol error that should never happen
    #[error("Repository error: {0}")]
    Repository(String),

    /// The response body could not be decoded
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// The repository reported `badArgument`
    #[error("Bad argument: {0}")]
    BadArgument(String),

    /// The repository reported `badResumptionToken`
    #[error("Bad resumption token: {0}")]
    BadResumptionToken(String),

    /// Invalid request parameters or flow-control settings
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl HarvestError {
    /// Classify this error.
    ///
    /// Decoding failures count as repository errors: a document that cannot be
    /// decoded is as unusable as one the repository flagged itself.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HarvestError::Transport(_) => ErrorKind::Transport,
            HarvestError::Timeout(_) => ErrorKind::Timeout,
            HarvestError::Interrupted(_) => ErrorKind::Interrupted,
            HarvestError::UnsupportedRedirect(_) => ErrorKind::UnsupportedRedirect,
            HarvestError::Repository(_) | HarvestError::Parse(_) => ErrorKind::Repository,
            HarvestError::BadArgument(_) => ErrorKind::BadArgument,
            HarvestError::BadResumptionToken(_) => ErrorKind::BadResumptionToken,
            HarvestError::InvalidRequest(_) | HarvestError::Config(_) => ErrorKind::InvalidRequest,
        }
    }

    /// Whether the caller can fix this by changing its input
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::BadArgument | ErrorKind::BadResumptionToken | ErrorKind::InvalidRequest
        )
    }
}

impl From<reqwest::Error> for HarvestError {
    fn from(err: reqwest::Error) -> Self {
        HarvestError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_errors_are_repository_errors() {
        let err = HarvestError::from(ParseError::Structure("no envelope".to_string()));
        assert_eq!(err.kind(), ErrorKind::Repository);
        assert!(!err.is_caller_error());
    }

    #[test]
    fn test_caller_errors() {
        assert!(HarvestError::BadArgument("from".to_string()).is_caller_error());
        assert!(HarvestError::BadResumptionToken("x".to_string()).is_caller_error());
        assert!(!HarvestError::Timeout("slow".to_string()).is_caller_error());
        assert!(!HarvestError::Interrupted("ctrl-c".to_string()).is_caller_error());
    }

    #[test]
    fn test_display() {
        let err = HarvestError::UnsupportedRedirect("http://example.com".to_string());
        assert_eq!(err.to_string(), "Unsupported redirect: http://example.com");
    }
}

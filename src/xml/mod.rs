//! Decoding of OAI-PMH response documents

pub mod error_code;
pub mod parser;

pub use error_code::{most_severe, OaiErrorCode, RepositoryErrorReport, Severity};
pub use parser::{ParseError, ParsedXmlResponse, XmlParser};

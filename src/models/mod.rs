//! Typed requests, responses and records.

mod article;
mod request;
mod response;

pub use article::{ArticleMetadata, ArticleMetadataBuilder, ArticleVersion};
pub use request::{
    GetRecordRequest, ListRecordsRequest, OaiRequest, ResumeListRecordsRequest, Verb,
    DEFAULT_BASE_URL, IDENTIFIER_PREFIX, METADATA_PREFIX,
};
pub use response::{GetRecordResponse, ListRecordsResponse};

//! # arXiv OAI Harvester
//!
//! A client for the arXiv OAI-PMH repository that fetches article metadata in
//! the arXivRaw format.
//!
//! ## Architecture
//!
//! - [`models`]: Requests, responses and article records
//! - [`xml`]: Streaming decoder for response documents
//! - [`harvester`]: The harvester facade, flow control and HTTP transport
//! - [`config`]: Configuration management
//! - [`display`]: Plain-text output for the CLI
//!
//! ## Example
//!
//! ```no_run
//! use arxiv_oai_harvester::{ArxivOaiHarvester, ListRecordsRequest};
//!
//! # async fn run() -> Result<(), arxiv_oai_harvester::HarvestError> {
//! let mut harvester = ArxivOaiHarvester::new()?.with_from("me@example.com");
//! let request = ListRecordsRequest::new(None, None, Some("physics:hep-ph".to_string()))?;
//!
//! let mut page = harvester.list_records(&request).await?;
//! loop {
//!     for record in &page.records {
//!         println!("{}", record.identifier);
//!     }
//!     match page.resumption() {
//!         Some(next) => page = harvester.resume_list_records(&next).await?,
//!         None => break,
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod display;
pub mod error;
pub mod harvester;
pub mod models;
pub mod xml;

// Re-export commonly used types
pub use error::{ErrorKind, HarvestError};
pub use harvester::{ArxivOaiHarvester, FlowControl};
pub use models::{
    ArticleMetadata, ArticleVersion, GetRecordRequest, GetRecordResponse, ListRecordsRequest,
    ListRecordsResponse, ResumeListRecordsRequest,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Article metadata harvested from arXivRaw records.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Base URL for arXiv abstract pages
const ARXIV_ABS_URL: &str = "https://arxiv.org/abs";

/// One submitted version of an article
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArticleVersion {
    /// Version number, starting at 1
    pub version_number: u32,

    /// When this version was submitted
    pub submission_time: DateTime<FixedOffset>,

    /// Size of the submission, e.g. "853kb"
    pub size: String,

    /// Source type code, e.g. "D"
    pub source_type: String,
}

/// Metadata for one repository record.
///
/// Header fields (`identifier`, `datestamp`, `sets`, `deleted`) are always
/// present. Everything else comes from the arXivRaw payload and is empty for
/// deleted records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleMetadata {
    /// Time the repository produced the response this record came from
    pub retrieval_date_time: DateTime<FixedOffset>,

    // Header
    /// OAI identifier, e.g. "oai:arXiv.org:1302.2146"
    pub identifier: String,

    /// Date the record last changed in the repository
    pub datestamp: NaiveDate,

    /// Sets this record belongs to. May be incomplete when the request was
    /// restricted to a single set.
    pub sets: BTreeSet<String>,

    /// Whether the record was deleted from the repository
    pub deleted: bool,

    // arXivRaw metadata
    /// arXiv ID, e.g. "1302.2146"
    pub id: Option<String>,

    /// Name of the version 1 submitter
    pub submitter: Option<String>,

    /// Every submitted version
    pub versions: BTreeSet<ArticleVersion>,

    /// Article title
    pub title: Option<String>,

    /// Author string, in no fixed format
    pub authors: Option<String>,

    /// Categories in source order; the first is the primary category
    pub categories: Vec<String>,

    /// Free-text comments
    pub comments: Option<String>,

    /// Proxy used for third-party submissions
    pub proxy: Option<String>,

    /// Institutional report number
    pub report_no: Option<String>,

    /// ACM classification
    pub acm_class: Option<String>,

    /// MSC classification
    pub msc_class: Option<String>,

    /// Journal reference of the published version
    pub journal_ref: Option<String>,

    /// DOI(s) of published or other versions
    pub doi: Option<String>,

    /// License URL
    pub license: Option<String>,

    /// Abstract text
    pub r#abstract: Option<String>,
}

impl ArticleMetadata {
    /// Start building a record retrieved at the given time
    pub fn builder(retrieval_date_time: DateTime<FixedOffset>) -> ArticleMetadataBuilder {
        ArticleMetadataBuilder::new(retrieval_date_time)
    }

    /// The primary (first listed) category
    pub fn primary_category(&self) -> Option<&str> {
        self.categories.first().map(String::as_str)
    }

    /// The most recent version, if any were reported
    pub fn latest_version(&self) -> Option<&ArticleVersion> {
        self.versions.iter().next_back()
    }

    /// Abstract page URL, when the arXiv ID is known
    pub fn arxiv_url(&self) -> Option<String> {
        self.id.as_ref().map(|id| format!("{}/{}", ARXIV_ABS_URL, id))
    }
}

/// Builder for [`ArticleMetadata`].
///
/// `identifier` and `datestamp` must be set before [`build`](Self::build);
/// they are mandatory in every OAI record header.
#[derive(Debug, Clone)]
pub struct ArticleMetadataBuilder {
    retrieval_date_time: DateTime<FixedOffset>,
    identifier: Option<String>,
    datestamp: Option<NaiveDate>,
    sets: BTreeSet<String>,
    deleted: bool,
    id: Option<String>,
    submitter: Option<String>,
    versions: BTreeSet<ArticleVersion>,
    title: Option<String>,
    authors: Option<String>,
    categories: Vec<String>,
    comments: Option<String>,
    proxy: Option<String>,
    report_no: Option<String>,
    acm_class: Option<String>,
    msc_class: Option<String>,
    journal_ref: Option<String>,
    doi: Option<String>,
    license: Option<String>,
    r#abstract: Option<String>,
}

impl ArticleMetadataBuilder {
    /// Create a builder with empty sets and versions
    pub fn new(retrieval_date_time: DateTime<FixedOffset>) -> Self {
        Self {
            retrieval_date_time,
            identifier: None,
            datestamp: None,
            sets: BTreeSet::new(),
            deleted: false,
            id: None,
            submitter: None,
            versions: BTreeSet::new(),
            title: None,
            authors: None,
            categories: Vec::new(),
            comments: None,
            proxy: None,
            report_no: None,
            acm_class: None,
            msc_class: None,
            journal_ref: None,
            doi: None,
            license: None,
            r#abstract: None,
        }
    }

    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// The identifier set so far
    pub fn current_identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn datestamp(mut self, datestamp: NaiveDate) -> Self {
        self.datestamp = Some(datestamp);
        self
    }

    /// Add a set membership
    pub fn set(mut self, set_spec: impl Into<String>) -> Self {
        self.sets.insert(set_spec.into());
        self
    }

    pub fn deleted(mut self, deleted: bool) -> Self {
        self.deleted = deleted;
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn submitter(mut self, submitter: impl Into<String>) -> Self {
        self.submitter = Some(submitter.into());
        self
    }

    /// Add a version
    pub fn version(mut self, version: ArticleVersion) -> Self {
        self.versions.insert(version);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn authors(mut self, authors: impl Into<String>) -> Self {
        self.authors = Some(authors.into());
        self
    }

    pub fn categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }

    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn report_no(mut self, report_no: impl Into<String>) -> Self {
        self.report_no = Some(report_no.into());
        self
    }

    pub fn acm_class(mut self, acm_class: impl Into<String>) -> Self {
        self.acm_class = Some(acm_class.into());
        self
    }

    pub fn msc_class(mut self, msc_class: impl Into<String>) -> Self {
        self.msc_class = Some(msc_class.into());
        self
    }

    pub fn journal_ref(mut self, journal_ref: impl Into<String>) -> Self {
        self.journal_ref = Some(journal_ref.into());
        self
    }

    pub fn doi(mut self, doi: impl Into<String>) -> Self {
        self.doi = Some(doi.into());
        self
    }

    pub fn license(mut self, license: impl Into<String>) -> Self {
        self.license = Some(license.into());
        self
    }

    /// Set abstract
    pub fn abstract_text(mut self, abstract_text: impl Into<String>) -> Self {
        self.r#abstract = Some(abstract_text.into());
        self
    }

    /// Build the record.
    ///
    /// Returns the name of the first missing header field on failure. A deleted
    /// record keeps only its header; any metadata that was set is dropped.
    pub fn build(self) -> Result<ArticleMetadata, &'static str> {
        let identifier = self.identifier.ok_or("identifier")?;
        let datestamp = self.datestamp.ok_or("datestamp")?;

        if self.deleted {
            return Ok(ArticleMetadata {
                retrieval_date_time: self.retrieval_date_time,
                identifier,
                datestamp,
                sets: self.sets,
                deleted: true,
                id: None,
                submitter: None,
                versions: BTreeSet::new(),
                title: None,
                authors: None,
                categories: Vec::new(),
                comments: None,
                proxy: None,
                report_no: None,
                acm_class: None,
                msc_class: None,
                journal_ref: None,
                doi: None,
                license: None,
                r#abstract: None,
            });
        }

        Ok(ArticleMetadata {
            retrieval_date_time: self.retrieval_date_time,
            identifier,
            datestamp,
            sets: self.sets,
            deleted: false,
            id: self.id,
            submitter: self.submitter,
            versions: self.versions,
            title: self.title,
            authors: self.authors,
            categories: self.categories,
            comments: self.comments,
            proxy: self.proxy,
            report_no: self.report_no,
            acm_class: self.acm_class,
            msc_class: self.msc_class,
            journal_ref: self.journal_ref,
            doi: self.doi,
            license: self.license,
            r#abstract: self.r#abstract,
        })
    }
}

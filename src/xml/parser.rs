//! Streaming decoder for OAI-PMH responses with arXivRaw metadata.
//!
//! The decoder is a depth-tracked state machine over quick-xml events. Every
//! opened element is pushed onto a stack and must be closed by the same name,
//! so truncated or reordered documents are rejected instead of silently
//! accepted. Leaf text is buffered across events and whitespace-normalized when
//! its element closes; the repository is known to break long values (titles,
//! abstracts) across lines.
//!
//! Supports the `GetRecord` and `ListRecords` verbs only.

use chrono::{DateTime, FixedOffset, NaiveDate};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::HashMap;
use std::io::BufRead;

use super::error_code::{most_severe, OaiErrorCode, RepositoryErrorReport, Severity};
use crate::error::HarvestError;
use crate::models::{ArticleMetadata, ArticleMetadataBuilder, ArticleVersion};

const ROOT: &str = "OAI-PMH";
const METADATA: &str = "arXivRaw";

/// Everything decoded from one successful response
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedXmlResponse {
    /// When the repository produced the response
    pub response_date: DateTime<FixedOffset>,

    /// Records in document order; may be empty
    pub records: Vec<ArticleMetadata>,

    /// Token for the next page, if the repository sent a non-blank one
    pub resumption_token: Option<String>,

    /// Position of this page, when reported
    pub cursor: Option<u64>,

    /// Size of the complete list, when reported
    pub complete_list_size: Option<u64>,
}

impl ParsedXmlResponse {
    /// A response with no records and no pagination
    pub fn empty(response_date: DateTime<FixedOffset>) -> Self {
        Self {
            response_date,
            records: Vec::new(),
            resumption_token: None,
            cursor: None,
            complete_list_size: None,
        }
    }
}

/// Errors decoding a response document
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The byte stream is not well-formed XML
    #[error("XML: {0}")]
    Xml(#[from] quick_xml::Error),

    /// A closing tag did not match the innermost open element
    #[error("{}opening tag '{expected}' does not match closing tag '{found}'", at_record(.identifier))]
    MismatchedTag {
        identifier: Option<String>,
        expected: String,
        found: String,
    },

    /// The document does not have the expected shape
    #[error("{0}")]
    Structure(String),

    /// A field value is not in the expected format
    #[error("{}could not parse {field} '{value}'", at_record(.identifier))]
    Field {
        identifier: Option<String>,
        field: &'static str,
        value: String,
    },
}

fn at_record(identifier: &Option<String>) -> String {
    match identifier {
        Some(id) => format!("identifier = '{}': ", id),
        None => String::new(),
    }
}

/// Decoder for repository responses. Holds no state between documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlParser;

impl XmlParser {
    pub fn new() -> Self {
        Self
    }

    /// Decode one response document.
    ///
    /// Repository-reported errors are classified here: `noRecordsMatch` and
    /// `idDoesNotExist` produce an empty response, `badArgument` and
    /// `badResumptionToken` produce the matching caller errors, and every
    /// other code is a repository error.
    pub fn parse<R: BufRead>(&self, input: R) -> Result<ParsedXmlResponse, HarvestError> {
        let mut reader = Reader::from_reader(input);
        let config = reader.config_mut();
        config.expand_empty_elements = true;
        // End names are checked against our own stack, with record context
        config.check_end_names = false;

        let mut state = ParseState::default();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf).map_err(ParseError::from)? {
                Event::Start(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    let attributes = collect_attributes(&e)?;
                    state.on_open(&name, &attributes)?;
                }
                Event::End(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    state.on_close(&name)?;
                }
                Event::Text(e) => {
                    let text = e.unescape().map_err(ParseError::from)?;
                    state.on_text(&text);
                }
                Event::CData(e) => {
                    state.on_text(&String::from_utf8_lossy(&e.into_inner()));
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        state.finish()
    }

    /// Decode a document held in memory
    pub fn parse_bytes(&self, input: &[u8]) -> Result<ParsedXmlResponse, HarvestError> {
        self.parse(input)
    }
}

fn collect_attributes(element: &BytesStart) -> Result<HashMap<String, String>, ParseError> {
    let mut attributes = HashMap::new();
    for attribute in element.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        attributes.insert(key, value);
    }
    Ok(attributes)
}

/// A version being decoded
#[derive(Debug)]
struct VersionInProgress {
    version_number: u32,
    submission_time: Option<DateTime<FixedOffset>>,
    size: Option<String>,
    source_type: Option<String>,
}

/// Decoder state for a single document
#[derive(Debug, Default)]
struct ParseState {
    /// Names of the currently open elements, outermost first
    stack: Vec<String>,
    /// Text of the innermost element, accumulated across events
    text: String,
    root_closed: bool,

    response_date: Option<DateTime<FixedOffset>>,
    records: Option<Vec<ArticleMetadata>>,
    record: Option<ArticleMetadataBuilder>,
    version: Option<VersionInProgress>,

    resumption_token: Option<String>,
    cursor: Option<u64>,
    complete_list_size: Option<u64>,

    error_code: Option<String>,
    errors: Vec<RepositoryErrorReport>,

    parsed: Option<ParsedXmlResponse>,
}

impl ParseState {
    fn on_open(&mut self, name: &str, attributes: &HashMap<String, String>) -> Result<(), ParseError> {
        if self.stack.is_empty() {
            if self.root_closed {
                return Err(ParseError::Structure(format!(
                    "Found <{}> after the end of <{}>",
                    name, ROOT
                )));
            }
            if name != ROOT {
                return Err(ParseError::Structure(format!(
                    "Expected <{}> root element, found <{}>",
                    ROOT, name
                )));
            }
        } else if name == ROOT {
            return Err(ParseError::Structure(format!("Found nested <{}> tags", ROOT)));
        }

        let parent = self.stack.last().cloned();
        self.stack.push(name.to_string());
        self.text.clear();

        match (parent.as_deref(), name) {
            (Some(ROOT), "GetRecord" | "ListRecords") => {
                self.records = Some(Vec::new());
            }
            (_, "record") => {
                let retrieved = self.response_date.ok_or_else(|| {
                    ParseError::Structure("Found <record> before <responseDate>".to_string())
                })?;
                self.record = Some(ArticleMetadata::builder(retrieved));
            }
            (Some("record"), "header") => {
                let deleted = attributes.get("status").map(String::as_str) == Some("deleted");
                self.update_record(|record| record.deleted(deleted))?;
            }
            (Some(METADATA), "version") => {
                if !self.record_is_deleted() {
                    let version_number = parse_version_number(
                        attributes.get("version").map(String::as_str),
                        self.current_identifier(),
                    )?;
                    self.version = Some(VersionInProgress {
                        version_number,
                        submission_time: None,
                        size: None,
                        source_type: None,
                    });
                }
            }
            (_, "resumptionToken") => {
                self.cursor = parse_optional_count(attributes.get("cursor"));
                self.complete_list_size = parse_optional_count(attributes.get("completeListSize"));
            }
            (Some(ROOT), "error") => {
                self.error_code = Some(attributes.get("code").cloned().unwrap_or_default());
            }
            _ => {}
        }

        Ok(())
    }

    fn on_text(&mut self, chunk: &str) {
        if !self.stack.is_empty() {
            self.text.push_str(chunk);
        }
    }

    fn on_close(&mut self, name: &str) -> Result<(), ParseError> {
        let open = self.stack.pop().ok_or_else(|| {
            ParseError::Structure(format!("Found closing tag '{}' with no open element", name))
        })?;
        if open != name {
            return Err(ParseError::MismatchedTag {
                identifier: self.current_identifier(),
                expected: open,
                found: name.to_string(),
            });
        }

        let value = normalize_whitespace(&std::mem::take(&mut self.text));
        let parent = self.stack.last().cloned();

        match (parent.as_deref(), name) {
            (None, ROOT) => self.root_closed = true,
            (Some(ROOT), "responseDate") => {
                self.response_date = Some(parse_response_date(&value)?);
            }
            (Some(ROOT), "error") => {
                let code = self.error_code.take().unwrap_or_default();
                self.errors.push(RepositoryErrorReport::new(code, value));
            }
            (Some(ROOT), "GetRecord" | "ListRecords") => {
                let response_date = self.response_date.ok_or_else(|| {
                    ParseError::Structure(format!("Found <{}> without <responseDate>", name))
                })?;
                self.parsed = Some(ParsedXmlResponse {
                    response_date,
                    records: self.records.take().unwrap_or_default(),
                    resumption_token: self.resumption_token.take(),
                    cursor: self.cursor.take(),
                    complete_list_size: self.complete_list_size.take(),
                });
            }
            (_, "record") => {
                let builder = self.record.take().ok_or_else(|| {
                    ParseError::Structure("Closed <record> that was never opened".to_string())
                })?;
                let identifier = builder.current_identifier().map(str::to_string);
                let record = builder.build().map_err(|missing| {
                    ParseError::Structure(format!(
                        "{}record is missing its <{}>",
                        at_record(&identifier),
                        missing
                    ))
                })?;
                self.records.get_or_insert_with(Vec::new).push(record);
            }
            (_, "resumptionToken") => {
                self.resumption_token = Some(value).filter(|token| !token.is_empty());
            }
            (Some("header"), "identifier") => {
                self.update_record(|record| record.identifier(value))?;
            }
            (Some("header"), "datestamp") => {
                let datestamp = parse_datestamp(&value, self.current_identifier())?;
                self.update_record(|record| record.datestamp(datestamp))?;
            }
            (Some("header"), "setSpec") => {
                if !value.is_empty() {
                    self.update_record(|record| record.set(value))?;
                }
            }
            (Some(METADATA), "version") => {
                if let Some(version) = self.version.take() {
                    let version = self.finish_version(version)?;
                    self.update_record(|record| record.version(version))?;
                }
            }
            (Some("version"), field) => self.set_version_field(field, value)?,
            (Some(METADATA), _) if self.record_is_deleted() => {}
            (Some(METADATA), field) => self.set_metadata_field(field, value)?,
            _ => {}
        }

        Ok(())
    }

    fn finish(self) -> Result<ParsedXmlResponse, HarvestError> {
        if let Some(open) = self.stack.last() {
            return Err(ParseError::Structure(format!(
                "Document ended inside <{}>",
                open
            ))
            .into());
        }
        if !self.root_closed {
            return Err(ParseError::Structure(format!("No <{}> element found", ROOT)).into());
        }

        if let Some(report) = most_severe(&self.errors) {
            return match (report.severity(), report.code) {
                (Severity::EmptyResult, _) => {
                    let response_date = self.response_date.ok_or_else(|| {
                        ParseError::Structure("Error response without <responseDate>".to_string())
                    })?;
                    tracing::debug!(
                        "Repository reported {}; treating as an empty result",
                        report.raw_code
                    );
                    Ok(ParsedXmlResponse::empty(response_date))
                }
                (Severity::CallerInput, Some(OaiErrorCode::BadResumptionToken)) => {
                    Err(HarvestError::BadResumptionToken(report.message.clone()))
                }
                (Severity::CallerInput, _) => Err(HarvestError::BadArgument(report.message.clone())),
                (Severity::Internal, _) => Err(HarvestError::Repository(format!(
                    "Repository reported error '{}': {}",
                    report.raw_code, report.message
                ))),
            };
        }

        self.parsed.ok_or_else(|| {
            ParseError::Structure(format!(
                "<{}> contains neither <GetRecord> nor <ListRecords>",
                ROOT
            ))
            .into()
        })
    }

    fn update_record(
        &mut self,
        update: impl FnOnce(ArticleMetadataBuilder) -> ArticleMetadataBuilder,
    ) -> Result<(), ParseError> {
        let record = self.record.take().ok_or_else(|| {
            ParseError::Structure("Found record field outside of <record>".to_string())
        })?;
        self.record = Some(update(record));
        Ok(())
    }

    fn record_is_deleted(&self) -> bool {
        self.record.as_ref().is_some_and(|record| record.is_deleted())
    }

    fn current_identifier(&self) -> Option<String> {
        self.record
            .as_ref()
            .and_then(|record| record.current_identifier())
            .map(str::to_string)
    }

    fn set_version_field(&mut self, field: &str, value: String) -> Result<(), ParseError> {
        let identifier = self.current_identifier();
        let Some(version) = self.version.as_mut() else {
            return Ok(());
        };

        match field {
            "date" => version.submission_time = Some(parse_version_date(&value, identifier)?),
            "size" => version.size = Some(value),
            "source_type" => version.source_type = Some(value),
            _ => {}
        }
        Ok(())
    }

    fn finish_version(&self, version: VersionInProgress) -> Result<ArticleVersion, ParseError> {
        let submission_time = version.submission_time.ok_or_else(|| {
            ParseError::Structure(format!(
                "{}version v{} has no <date>",
                at_record(&self.current_identifier()),
                version.version_number
            ))
        })?;

        Ok(ArticleVersion {
            version_number: version.version_number,
            submission_time,
            size: version.size.unwrap_or_default(),
            source_type: version.source_type.unwrap_or_default(),
        })
    }

    fn set_metadata_field(&mut self, field: &str, value: String) -> Result<(), ParseError> {
        if field == "categories" {
            let categories = parse_categories(&value);
            return self.update_record(|record| record.categories(categories));
        }
        if value.is_empty() {
            return Ok(());
        }

        match field {
            "id" => self.update_record(|record| record.id(value)),
            "submitter" => self.update_record(|record| record.submitter(value)),
            "title" => self.update_record(|record| record.title(value)),
            "authors" => self.update_record(|record| record.authors(value)),
            "comments" => self.update_record(|record| record.comments(value)),
            "proxy" => self.update_record(|record| record.proxy(value)),
            "report-no" => self.update_record(|record| record.report_no(value)),
            "acm-class" => self.update_record(|record| record.acm_class(value)),
            "msc-class" => self.update_record(|record| record.msc_class(value)),
            "journal-ref" => self.update_record(|record| record.journal_ref(value)),
            "doi" => self.update_record(|record| record.doi(value)),
            "license" => self.update_record(|record| record.license(value)),
            "abstract" => self.update_record(|record| record.abstract_text(value)),
            other => {
                tracing::debug!("Ignoring unknown {} field <{}>", METADATA, other);
                Ok(())
            }
        }
    }
}

/// Collapse whitespace runs to single spaces and trim both ends
pub(crate) fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split a category string, keeping source order. The first is the primary.
pub(crate) fn parse_categories(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

/// Parse a `v<N>` version label
pub(crate) fn parse_version_number(
    label: Option<&str>,
    identifier: Option<String>,
) -> Result<u32, ParseError> {
    let label = label.ok_or_else(|| ParseError::Field {
        identifier: identifier.clone(),
        field: "version label",
        value: String::new(),
    })?;

    label
        .trim()
        .strip_prefix('v')
        .and_then(|number| number.parse::<u32>().ok())
        .filter(|number| *number >= 1)
        .ok_or_else(|| ParseError::Field {
            identifier,
            field: "version label",
            value: label.to_string(),
        })
}

/// Parse `responseDate`, an ISO offset date-time
pub(crate) fn parse_response_date(value: &str) -> Result<DateTime<FixedOffset>, ParseError> {
    DateTime::parse_from_rfc3339(value).map_err(|_| ParseError::Field {
        identifier: None,
        field: "responseDate",
        value: value.to_string(),
    })
}

/// Parse a record `datestamp`, a calendar date
pub(crate) fn parse_datestamp(
    value: &str,
    identifier: Option<String>,
) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| ParseError::Field {
        identifier,
        field: "datestamp",
        value: value.to_string(),
    })
}

/// Parse a version submission date, an RFC 2822 mail date
pub(crate) fn parse_version_date(
    value: &str,
    identifier: Option<String>,
) -> Result<DateTime<FixedOffset>, ParseError> {
    DateTime::parse_from_rfc2822(value).map_err(|_| ParseError::Field {
        identifier,
        field: "version date",
        value: value.to_string(),
    })
}

/// Pagination hints are optional; anything unparseable is unknown
fn parse_optional_count(value: Option<&String>) -> Option<u64> {
    value.and_then(|v| v.trim().parse().ok())
}

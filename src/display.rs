//! Plain-text formatting for CLI output.

use std::fmt::Write;

use crate::models::{ArticleMetadata, ListRecordsResponse};

/// Abstracts longer than this are truncated in plain output
pub const ABSTRACT_PREVIEW_CHARS: usize = 300;

/// Truncate text to at most `max_chars` characters, appending an ellipsis if
/// anything was cut.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= 3 {
        return ".".repeat(max_chars);
    }

    let kept: String = text.chars().take(max_chars - 3).collect();
    format!("{}...", kept.trim_end())
}

/// Format one record as an indented block
pub fn format_record(record: &ArticleMetadata) -> String {
    let mut out = String::new();

    if record.deleted {
        let _ = writeln!(out, "{} [deleted]", record.identifier);
        let _ = writeln!(out, "  Datestamp: {}", record.datestamp);
        return out;
    }

    let _ = writeln!(
        out,
        "{} - {}",
        record.identifier,
        record.title.as_deref().unwrap_or("(untitled)")
    );
    if let Some(authors) = &record.authors {
        let _ = writeln!(out, "  Authors: {}", authors);
    }
    if !record.categories.is_empty() {
        let _ = writeln!(out, "  Categories: {}", record.categories.join(" "));
    }
    let _ = writeln!(out, "  Datestamp: {}", record.datestamp);
    if let Some(version) = record.latest_version() {
        let _ = writeln!(
            out,
            "  Latest version: v{} ({})",
            version.version_number,
            version.submission_time.to_rfc2822()
        );
    }
    if let Some(doi) = &record.doi {
        let _ = writeln!(out, "  DOI: {}", doi);
    }
    if let Some(journal_ref) = &record.journal_ref {
        let _ = writeln!(out, "  Journal: {}", journal_ref);
    }
    if let Some(url) = record.arxiv_url() {
        let _ = writeln!(out, "  URL: {}", url);
    }
    if let Some(abstract_text) = &record.r#abstract {
        let _ = writeln!(
            out,
            "  Abstract: {}",
            truncate_with_ellipsis(abstract_text, ABSTRACT_PREVIEW_CHARS)
        );
    }

    out
}

/// One-line summary of a ListRecords page
pub fn format_page_summary(page: usize, response: &ListRecordsResponse) -> String {
    let mut summary = format!("Page {}: {} records", page, response.records.len());

    match (response.cursor, response.complete_list_size) {
        (Some(cursor), Some(size)) => {
            let _ = write!(summary, " (cursor {} of {})", cursor, size);
        }
        (Some(cursor), None) => {
            let _ = write!(summary, " (cursor {})", cursor);
        }
        (None, Some(size)) => {
            let _ = write!(summary, " ({} total)", size);
        }
        (None, None) => {}
    }

    if !response.has_more() {
        summary.push_str(", last page");
    }
    summary
}

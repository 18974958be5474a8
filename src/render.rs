//! Plain-text rendering of list views for the terminal

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::certificate::Verification;
use crate::constants::{DETAIL_COLUMN_WIDTH, EXCERPT_LENGTH, NAME_COLUMN_WIDTH};
use crate::list::{LoaderIndicator, ViewStatus};
use crate::records::{Record, types::format_date};

pub const LOADING_MESSAGE: &str = "Loading...";
pub const LOADING_MORE_MESSAGE: &str = "Loading more...";
pub const END_OF_RESULTS_MESSAGE: &str = "No more results";
pub const EMPTY_MESSAGE: &str = "No results found";
pub const ERROR_MESSAGE: &str = "Something went wrong. Please try again later.";

/// Display width of a string (accounting for wide characters)
pub fn display_width(s: &str) -> usize {
    s.width()
}

/// Truncate to fit `max_width` columns, marking the cut with "..."
pub fn truncate_to_width(s: &str, max_width: usize) -> String {
    if s.width() <= max_width {
        return s.to_string();
    }
    if max_width < 4 {
        return s.chars().take(max_width).collect();
    }

    let mut width = 0;
    let mut result = String::new();
    for c in s.chars() {
        let char_width = c.width().unwrap_or(1);
        if width + char_width > max_width - 3 {
            break;
        }
        width += char_width;
        result.push(c);
    }
    result.push_str("...");
    result
}

/// Truncate then pad with spaces to exactly `width` columns
pub fn fit_to_width(s: &str, width: usize) -> String {
    let mut out = truncate_to_width(s, width);
    let pad = width.saturating_sub(display_width(&out));
    out.extend(std::iter::repeat_n(' ', pad));
    out
}

pub fn render_row<R: Record>(index: usize, record: &R) -> String {
    format!(
        "{:>4}  {}  {}",
        index,
        fit_to_width(record.display_name(), NAME_COLUMN_WIDTH),
        truncate_to_width(&record.detail(), DETAIL_COLUMN_WIDTH)
    )
    .trim_end()
    .to_string()
}

/// Indented id, summary and image lines shown under a row in long listings
pub fn render_details<R: Record>(record: &R) -> Vec<String> {
    let mut lines = vec![format!("      id: {}", record.id())];
    if let Some(summary) = record.summary() {
        lines.push(format!("      {}", truncate_to_width(&summary, EXCERPT_LENGTH)));
    }
    if let Some(image) = record.image() {
        lines.push(format!("      image: {}", image));
    }
    lines
}

/// Lines for a list view: rows first, then whatever the status adds below.
pub fn render_view<R: Record>(view: &[&R], status: &ViewStatus, long: bool) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, record) in view.iter().enumerate() {
        lines.push(render_row(i + 1, *record));
        if long {
            lines.extend(render_details(*record));
        }
    }

    match status {
        ViewStatus::Loading => lines.push(LOADING_MESSAGE.to_string()),
        ViewStatus::Failed(e) => {
            tracing::debug!("Rendering error state: {} (status {:?})", e, e.status());
            lines.push(ERROR_MESSAGE.to_string());
        }
        ViewStatus::Empty => lines.push(EMPTY_MESSAGE.to_string()),
        ViewStatus::Ready(LoaderIndicator::LoadingMore) => {
            lines.push(LOADING_MORE_MESSAGE.to_string())
        }
        ViewStatus::Ready(LoaderIndicator::EndOfResults) => {
            lines.push(END_OF_RESULTS_MESSAGE.to_string())
        }
        ViewStatus::Ready(LoaderIndicator::Hidden) => {}
    }
    lines
}

pub fn render_verification(code: &str, verification: &Verification) -> Vec<String> {
    let mut lines = vec![format!("Certificate {}: {}", code, verification.label())];
    if let Some(cert) = verification.certificate() {
        lines.push(format!("  Code:    {}", cert.code_or_id()));
        lines.push(format!("  Holder:  {}", cert.display_name()));
        lines.push(format!("  Program: {}", cert.detail()));
        lines.push(format!("  Issued:  {}", format_date(cert.issued_at)));
        lines.push(format!("  Expires: {}", format_date(cert.expires_at)));
    }
    lines
}

use std::sync::LazyLock;

use ::scraper::{ElementRef, Html, Selector};
use jiff::civil::DateTime;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::ExtractedOccupancy;

pub const COUNT_MARKER: &str = "Last Count:";
pub const UPDATED_MARKER: &str = "Updated:";

const NOT_AVAILABLE: &str = "NA";
const TIMESTAMP_FORMAT: &str = "%m/%d/%Y %I:%M %p";
const VALUE_CLASS: &str = "barChart__value";

static WIDGET: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.barChart").expect("bad hardcoded widget selector"));

static VALUE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".barChart__value").expect("bad hardcoded value selector"));

/// `<name> Last Count: <count> Updated: <timestamp up to end of line>`
static GRAMMAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?s)^(?P<name>.*?){}(?P<count>.*?){}[ \t]*(?P<updated>[^\n]*)",
        regex::escape(COUNT_MARKER),
        regex::escape(UPDATED_MARKER),
    ))
    .expect("bad hardcoded widget grammar")
});

/// Why a single widget was dropped from a run.
#[derive(Debug, Error, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FragmentError {
    #[error("widget text has no `{marker}` marker")]
    MissingMarker { marker: &'static str },
    #[error("`Updated:` appears before `Last Count:`")]
    MarkersOutOfOrder,
    #[error("widget has no facility name")]
    EmptyName,
    #[error("invalid count {value:?}: {reason}")]
    InvalidCount { value: String, reason: String },
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp { value: String, reason: String },
    #[error("invalid percentage {value:?}: {reason}")]
    InvalidPercentage { value: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFragment {
    /// Position of the widget in the document, counting skipped ones.
    pub index: usize,
    pub error: FragmentError,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Extraction {
    pub fragments: usize,
    pub entries: Vec<ExtractedOccupancy>,
    pub skipped: Vec<SkippedFragment>,
}

/// Parses every occupancy widget in `body`, in document order. A widget that fails to parse
/// is recorded in `skipped` and never stops the others.
pub fn extract(body: &str) -> Extraction {
    let document = Html::parse_document(body);
    let mut extraction = Extraction::default();

    for (index, fragment) in document.select(&WIDGET).enumerate() {
        extraction.fragments += 1;
        match parse_fragment(fragment) {
            Ok(entry) => {
                debug!(
                    name = %entry.name,
                    count = entry.occupancy_count,
                    percentage = ?entry.percentage_full,
                    "extracted facility"
                );
                extraction.entries.push(entry);
            }
            Err(error) => extraction.skipped.push(SkippedFragment { index, error }),
        }
    }

    extraction
}

pub fn parse_fragment(fragment: ElementRef<'_>) -> Result<ExtractedOccupancy, FragmentError> {
    let mut entry = parse_widget_text(&widget_text(fragment))?;
    entry.percentage_full = match fragment.select(&VALUE).next() {
        Some(value) => parse_percentage(&value.text().collect::<String>())?,
        None => None,
    };
    Ok(entry)
}

/// Parses the name, count and timestamp out of a widget's text. `percentage_full` is left
/// empty; it lives in its own element.
pub fn parse_widget_text(text: &str) -> Result<ExtractedOccupancy, FragmentError> {
    let Some(captures) = GRAMMAR.captures(text) else {
        return Err(grammar_mismatch(text));
    };

    let name = captures["name"].trim();
    if name.is_empty() {
        return Err(FragmentError::EmptyName);
    }

    Ok(ExtractedOccupancy {
        name: name.to_string(),
        occupancy_count: parse_count(&captures["count"])?,
        percentage_full: None,
        updated_at: parse_updated(&captures["updated"])?,
    })
}

fn grammar_mismatch(text: &str) -> FragmentError {
    for marker in [COUNT_MARKER, UPDATED_MARKER] {
        if !text.contains(marker) {
            return FragmentError::MissingMarker { marker };
        }
    }
    FragmentError::MarkersOutOfOrder
}

// an empty count is reported the same as NA
fn parse_count(raw: &str) -> Result<u32, FragmentError> {
    let raw = raw.trim();
    if raw.is_empty() || raw == NOT_AVAILABLE {
        return Ok(0);
    }
    raw.parse().map_err(|e: std::num::ParseIntError| FragmentError::InvalidCount {
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_updated(raw: &str) -> Result<Option<DateTime>, FragmentError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    DateTime::strptime(TIMESTAMP_FORMAT, raw)
        .map(Some)
        .map_err(|e| FragmentError::InvalidTimestamp {
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

fn parse_percentage(raw: &str) -> Result<Option<f64>, FragmentError> {
    let raw = raw.trim();
    if raw == NOT_AVAILABLE {
        return Ok(None);
    }
    let invalid = |reason: String| FragmentError::InvalidPercentage {
        value: raw.to_string(),
        reason,
    };
    let number = raw.strip_suffix('%').unwrap_or(raw).trim();
    match number.parse::<f64>() {
        Ok(percentage) if percentage.is_finite() => Ok(Some(percentage)),
        Ok(_) => Err(invalid("not a finite number".to_string())),
        Err(e) => Err(invalid(e.to_string())),
    }
}

/// Concatenated text of the widget, minus the percentage element so that it cannot run into
/// the timestamp line.
fn widget_text(fragment: ElementRef<'_>) -> String {
    fragment
        .descendants()
        .filter_map(|node| node.value().as_text().map(|text| (node, text)))
        .filter(|(node, _)| {
            !node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|element| element.value().classes().any(|c| c == VALUE_CLASS))
        })
        .map(|(_, text)| &**text)
        .collect()
}

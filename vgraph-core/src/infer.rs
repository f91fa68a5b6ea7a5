//! Semantic type inference for raw attribute columns.
//!
//! A column starts with the native type of its first value. Columns whose
//! name mentions a time or date, or ends in a timestamp suffix such as
//! `createdAt` or `updated_at`, are checked for timestamps and, when the
//! sample parses, rewritten to epoch milliseconds. Columns whose name
//! mentions a colour are checked for packed RGBA integers or CSS colour
//! strings and keep their values.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace};

use crate::color::parse_css_color;
use crate::metadata::AttributeMetadata;
use crate::types::{AttributeColumn, RawColumn, SemanticType, Values};

static DATE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i:time|date)|[a-z]At$|(?i:_at)$").unwrap());
static COLOR_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)color").unwrap());

/// Years accepted when a number is read as Unix seconds.
const PLAUSIBLE_YEARS: std::ops::RangeInclusive<i32> = 500..=5000;

/// Largest magnitude of a millisecond timestamp (±100,000,000 days).
const MAX_EPOCH_MILLIS: f64 = 8.64e15;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Infer the semantic type of a column, rewriting date values in place.
///
/// When the column turns out to be a date, value-based aggregations in its
/// metadata are dropped because they describe the raw values.
pub fn infer_column(raw: RawColumn, metadata: Option<&mut AttributeMetadata>) -> AttributeColumn {
    let RawColumn {
        name,
        target,
        mut values,
    } = raw;
    let mut inferred_type = values.native_type();

    if DATE_NAME.is_match(&name) {
        debug!("Attempting to cast {} to a date", name);
        match as_dates(&values) {
            Some(millis) => {
                debug!("Successfully cast {} as a date", name);
                inferred_type = SemanticType::Date;
                values = Values::Number(millis);
                if let Some(meta) = metadata {
                    meta.invalidate_value_aggregations();
                }
            }
            None => trace!("Failed to cast {} as a date", name),
        }
    }

    if inferred_type != SemanticType::Date && COLOR_NAME.is_match(&name) {
        if is_color_sample(&values) {
            inferred_type = SemanticType::Color;
        } else {
            trace!("Failed to cast {} as a color", name);
        }
    }

    AttributeColumn {
        name,
        target,
        inferred_type,
        values,
    }
}

/// Convert every value to epoch milliseconds if the first one parses.
fn as_dates(values: &Values) -> Option<Vec<f64>> {
    match values {
        Values::Number(numbers) => {
            numbers.first().copied().and_then(number_to_millis)?;
            Some(
                numbers
                    .iter()
                    .map(|&n| number_to_millis(n).unwrap_or(f64::NAN))
                    .collect(),
            )
        }
        Values::Text(strings) => {
            strings.first().and_then(|s| string_to_millis(s))?;
            Some(
                strings
                    .iter()
                    .map(|s| string_to_millis(s).unwrap_or(f64::NAN))
                    .collect(),
            )
        }
        Values::Bool(_) => None,
    }
}

/// Read a number as Unix seconds, falling back to milliseconds when the
/// resulting year is implausible.
pub fn number_to_millis(value: f64) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    let as_seconds = value * 1000.0;
    if as_seconds.abs() <= MAX_EPOCH_MILLIS {
        if let Some(dt) = DateTime::<Utc>::from_timestamp_millis(as_seconds as i64) {
            if PLAUSIBLE_YEARS.contains(&dt.year()) {
                return Some(as_seconds);
            }
        }
    }
    (value.abs() <= MAX_EPOCH_MILLIS).then_some(value)
}

/// Parse a date string into epoch milliseconds. Zoneless forms are UTC.
pub fn string_to_millis(value: &str) -> Option<f64> {
    let s = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis() as f64);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.timestamp_millis() as f64);
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.and_utc().timestamp_millis() as f64);
        }
    }
    for format in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc().timestamp_millis() as f64);
        }
    }
    None
}

fn is_color_sample(values: &Values) -> bool {
    match values {
        Values::Number(numbers) => numbers
            .first()
            .is_some_and(|&n| n > 0.0 && n <= u32::MAX as f64),
        Values::Text(strings) => strings
            .first()
            .is_some_and(|s| parse_css_color(s).is_some()),
        Values::Bool(_) => false,
    }
}

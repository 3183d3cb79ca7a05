//! Stock record parser
//!
//! # Format
//! ```text
//! PointOfSale;Product;Date;Stock
//! 121017;17240503103734;2019-08-01;2
//! ```
//!
//! Exactly four `;`-separated fields. Point of sale and product are kept
//! verbatim, the date must match `yyyy-MM-dd` and the stock is a base-10
//! `i32` that may be signed and padded with whitespace. Any deviation is a [`RecordFormatError`]; there
//! is no skip-and-continue mode.

use chrono::NaiveDate;
use stockimport_common::types::{DATE_FORMAT, ELEMENT_FIELD_COUNT, FIELD_DELIMITER};
use stockimport_common::{Element, ImportError};
use thiserror::Error;

/// A record that could not be turned into an [`Element`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct RecordFormatError {
    /// Offending line, lossily decoded
    pub line: String,
    pub reason: String,
}

impl RecordFormatError {
    fn new(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            reason: reason.into(),
        }
    }

    /// Attach the position of the record in the resource
    pub fn at(self, resource: &str, chunk: u64, line_number: u64) -> ImportError {
        ImportError::Format {
            resource: resource.to_string(),
            chunk,
            line_number,
            line: self.line,
            reason: self.reason,
        }
    }
}

/// Whether `line` splits into exactly `expected` fields.
///
/// An empty string counts as one field.
pub fn is_complete(line: &str, expected: usize) -> bool {
    line.split(FIELD_DELIMITER).count() == expected
}

/// Whether a raw, possibly undecodable, fragment has all fields of a record
pub fn is_complete_record(raw: &[u8]) -> bool {
    // replacement characters never introduce a delimiter
    is_complete(&String::from_utf8_lossy(raw), ELEMENT_FIELD_COUNT)
}

/// Parse one record line
pub fn parse_element(line: &str) -> Result<Element, RecordFormatError> {
    let fields: Vec<&str> = line.split(FIELD_DELIMITER).collect();

    let [point_of_sale, product, date, stock] = fields.as_slice() else {
        return Err(RecordFormatError::new(
            line,
            format!(
                "expected {} fields, found {}",
                ELEMENT_FIELD_COUNT,
                fields.len()
            ),
        ));
    };

    let date = parse_date(date).ok_or_else(|| {
        RecordFormatError::new(line, format!("invalid date '{}', expected yyyy-MM-dd", date))
    })?;

    let stock: i32 = stock
        .trim()
        .parse()
        .map_err(|e| RecordFormatError::new(line, format!("invalid stock '{}': {}", stock, e)))?;

    Ok(Element::new(*point_of_sale, *product, date, stock))
}

/// Decode and parse a line as produced by the reassembler
pub fn parse_line_bytes(raw: &[u8]) -> Result<Element, RecordFormatError> {
    let line = std::str::from_utf8(raw).map_err(|e| {
        RecordFormatError::new(
            String::from_utf8_lossy(raw),
            format!("record is not valid UTF-8: {}", e),
        )
    })?;
    parse_element(line)
}

/// Strict `yyyy-MM-dd`: chrono alone accepts unpadded months and days
fn parse_date(value: &str) -> Option<NaiveDate> {
    let bytes = value.as_bytes();
    let shape_ok = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());

    if !shape_ok {
        return None;
    }

    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}

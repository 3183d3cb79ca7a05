//! Common types used across stockimport

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Field delimiter of a stock record
pub const FIELD_DELIMITER: char = ';';

/// Number of fields in a well-formed stock record
pub const ELEMENT_FIELD_COUNT: usize = 4;

/// `chrono` pattern of the record date field (`yyyy-MM-dd`)
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Stock level of one product at one point of sale on one day.
///
/// Parsed from a record of the form `point_of_sale;product;date;stock`.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use stockimport_common::Element;
///
/// let date = NaiveDate::from_ymd_opt(2019, 8, 1).unwrap();
/// let element = Element::new("121017", "17240503103734", date, 2);
/// assert_eq!(element.id, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    /// Identifier assigned by the destination store; never set by the import core
    pub id: Option<i64>,

    /// Point of sale identifier, kept verbatim
    pub point_of_sale: String,

    /// Product identifier, kept verbatim
    pub product: String,

    /// Calendar date of the stock reading
    pub date: NaiveDate,

    /// Units in stock; may be negative
    pub stock: i32,
}

impl Element {
    /// Persisted columns, in record field order
    pub const COLUMNS: [&'static str; ELEMENT_FIELD_COUNT] =
        ["point_of_sale", "product", "date", "stock"];

    pub fn new(
        point_of_sale: impl Into<String>,
        product: impl Into<String>,
        date: NaiveDate,
        stock: i32,
    ) -> Self {
        Self {
            id: None,
            point_of_sale: point_of_sale.into(),
            product: product.into(),
            date,
            stock,
        }
    }

    /// Render back to record text
    pub fn to_record(&self) -> String {
        format!(
            "{}{d}{}{d}{}{d}{}",
            self.point_of_sale,
            self.product,
            self.date.format(DATE_FORMAT),
            self.stock,
            d = FIELD_DELIMITER
        )
    }
}

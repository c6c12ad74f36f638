//! Booking input and the date / label conventions of the monthly ledger.

use crate::error::{LedgerError, Result};
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Deserializer, de};
use std::sync::LazyLock;

static DATE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日\s*$").expect("valid regex")
});

/// One booking as received from the caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Booking {
    /// `YYYY-MM-DD`
    pub date: String,
    pub customer_name: String,
    pub staff_name: String,
    #[serde(deserialize_with = "visit_count")]
    pub visit_count: u32,
}

impl Booking {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn parsed_date(&self) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d")
            .map_err(|_| LedgerError::InvalidDate(self.date.clone()))
    }

    /// `"10月27日"`; the raw date string when it does not parse.
    pub fn date_label(&self) -> String {
        match self.parsed_date() {
            Ok(date) => format_date_label(date),
            Err(_) => self.date.clone(),
        }
    }

    pub fn visit_label(&self) -> String {
        format!("{}回目", self.visit_count)
    }
}

/// The count arrives either as a JSON number or as a numeric string.
fn visit_count<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Number(u32),
        Text(String),
    }

    match Count::deserialize(d)? {
        Count::Number(n) => Ok(n),
        Count::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("visit_count is not a number: {s:?}"))),
    }
}

pub fn format_date_label(date: NaiveDate) -> String {
    format!("{}月{}日", date.month(), date.day())
}

/// Reads a `"M月D日"` label back as a date in `year`. Anything else, including
/// impossible dates such as `"2月30日"`, gives `None`.
pub fn parse_date_label(label: &str, year: i32) -> Option<NaiveDate> {
    let caps = DATE_LABEL.captures(label)?;
    let month = caps[1].parse().ok()?;
    let day = caps[2].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// `"2024年 10月売上.xlsx"`
pub fn workbook_file_name(date: NaiveDate) -> String {
    format!("{}年 {:02}月売上.xlsx", date.year(), date.month())
}

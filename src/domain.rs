use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Validity marker the feed uses for placeholder rows.
pub const INVALID_FLAG: &str = "0";

/// One observation from the price file, fields kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatRow {
    pub country: String,
    pub region: String,
    pub day: String,
    pub hour: String,
    pub offset: String,
    pub valid: String,
    pub price: String,
}

impl FlatRow {
    pub fn is_valid(&self) -> bool {
        self.valid != INVALID_FLAG
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub hour: String,
    pub offset: String,
    pub price: String,
    pub valid: String,
}

impl TimeSlot {
    pub fn is_valid(&self) -> bool {
        self.valid != INVALID_FLAG
    }
}

impl From<&FlatRow> for TimeSlot {
    fn from(row: &FlatRow) -> Self {
        Self {
            hour: row.hour.clone(),
            offset: row.offset.clone(),
            price: row.price.clone(),
            valid: row.valid.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayBucket {
    pub date: String,
    #[serde(rename = "time")]
    pub slots: Vec<TimeSlot>,
}

impl DayBucket {
    pub fn has_valid_slot(&self) -> bool {
        self.slots.iter().any(TimeSlot::is_valid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDocument {
    pub name: String,
    pub days: Vec<DayBucket>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryDocument {
    pub name: String,
    #[serde(rename = "isoCode")]
    pub iso_code: String,
    pub regions: Vec<RegionDocument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryIndexEntry {
    pub name: String,
    #[serde(rename = "isoCode")]
    pub iso_code: String,
    pub regions: Vec<String>,
}

impl From<&CountryDocument> for CountryIndexEntry {
    fn from(country: &CountryDocument) -> Self {
        Self {
            name: country.name.clone(),
            iso_code: country.iso_code.clone(),
            regions: country
                .regions
                .iter()
                .map(|region| region.name.clone())
                .collect(),
        }
    }
}

/// Compact day identifier as it appears in the feed, e.g. `20240101`.
///
/// The year is the first four characters, the month the next two and the day
/// of month the last two. Anything between is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayKey<'a>(&'a str);

impl<'a> DayKey<'a> {
    pub fn new(raw: &'a str) -> Self {
        Self(raw)
    }

    pub fn to_date(&self) -> Option<NaiveDate> {
        let raw = self.0;
        if raw.len() < 6 || !raw.is_ascii() {
            return None;
        }
        let year = raw.get(0..4)?.parse::<i32>().ok()?;
        let month = raw.get(4..6)?.parse::<u32>().ok()?;
        let day = raw.get(raw.len() - 2..)?.parse::<u32>().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    }
}

impl fmt::Display for DayKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

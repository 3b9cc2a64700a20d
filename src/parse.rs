//! Reads the semicolon separated price file into [`FlatRow`]s.
//!
//! Rows may carry fewer or more fields than the header; missing trailing
//! fields read as empty strings. Only the header is strict. Bytes that are not
//! valid UTF-8 are replaced with U+FFFD rather than failing the file.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::ByteRecord;
use tracing::debug;

use crate::domain::FlatRow;
use crate::error::ElprisError;

pub const DELIMITER: u8 = b';';

pub const COUNTRY: &str = "COUNTRY";
pub const REGION: &str = "REGION";
pub const DAY: &str = "DAG";
pub const HOUR: &str = "TIMMA";
pub const OFFSET: &str = "OFFSET";
pub const VALID: &str = "GILTLIG";
pub const PRICE: &str = "PRIS";

const REQUIRED: [&str; 7] = [COUNTRY, REGION, DAY, HOUR, OFFSET, VALID, PRICE];

/// Column positions for the required fields.
#[derive(Debug, Clone, Copy)]
struct Columns {
    country: usize,
    region: usize,
    day: usize,
    hour: usize,
    offset: usize,
    valid: usize,
    price: usize,
}

impl Columns {
    fn from_headers(headers: &ByteRecord) -> Result<Self, ElprisError> {
        let mut idx = HashMap::new();
        for (i, header) in headers.iter().enumerate() {
            let name = String::from_utf8_lossy(header);
            idx.entry(name.trim().to_ascii_uppercase()).or_insert(i);
        }
        for required in REQUIRED {
            if !idx.contains_key(required) {
                return Err(ElprisError::MissingHeader(required.to_string()));
            }
        }
        let at = |name: &str| idx[name];
        Ok(Self {
            country: at(COUNTRY),
            region: at(REGION),
            day: at(DAY),
            hour: at(HOUR),
            offset: at(OFFSET),
            valid: at(VALID),
            price: at(PRICE),
        })
    }

    fn row(&self, record: &ByteRecord) -> FlatRow {
        let get = |i: usize| {
            record
                .get(i)
                .map(|field| String::from_utf8_lossy(field).into_owned())
                .unwrap_or_default()
        };
        FlatRow {
            country: get(self.country),
            region: get(self.region),
            day: get(self.day),
            hour: get(self.hour),
            offset: get(self.offset),
            valid: get(self.valid),
            price: get(self.price),
        }
    }
}

pub fn parse_price_file(path: &Path) -> Result<Vec<FlatRow>, ElprisError> {
    let file = File::open(path)
        .map_err(|err| ElprisError::Filesystem(format!("open {}: {err}", path.display())))?;
    parse_price_reader(file)
}

pub fn parse_price_reader<R: Read>(input: R) -> Result<Vec<FlatRow>, ElprisError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .flexible(true)
        .from_reader(input);

    let headers = reader
        .byte_headers()
        .map_err(|err| ElprisError::CsvRead(err.to_string()))?
        .clone();
    let columns = Columns::from_headers(&headers)?;

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record.map_err(|err| ElprisError::CsvRead(err.to_string()))?;
        if record.iter().all(|field| field.trim_ascii().is_empty()) {
            continue;
        }
        rows.push(columns.row(&record));
    }
    debug!(rows = rows.len(), "parsed price file");
    Ok(rows)
}

use std::io::{self, Write};

use serde::Serialize;

use crate::app::{CountryListResponse, CountryResponse, IngestReport};

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &IngestReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_country(response: &CountryResponse) -> io::Result<()> {
        Self::print_json(response)
    }

    pub fn print_countries(response: &CountryListResponse) -> io::Result<()> {
        Self::print_json(response)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl crate::app::ProgressSink for JsonOutput {
    fn event(&self, _event: crate::app::ProgressEvent) {}
}

//! Groups flat price rows into per-country documents and the country index.
//!
//! Grouping runs country → region → day over ordered maps, so a given input
//! always produces the same documents in the same order. Countries and
//! regions without a single valid observation are dropped before any day
//! filtering; groups left empty by the day filters are dropped as well.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::domain::{
    CountryDocument, CountryIndexEntry, DayBucket, DayKey, FlatRow, RegionDocument, TimeSlot,
};
use crate::error::ElprisError;
use crate::iso::iso_code;

/// Which day buckets survive aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayPolicy {
    /// Days keep only when they hold strictly more slots than this.
    pub min_slots: usize,
    pub window: Option<Window>,
}

/// Trailing window: `today` and later, at most `max_days` days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub today: NaiveDate,
    pub max_days: usize,
}

impl DayPolicy {
    /// Keeps every day that has at least one valid slot.
    pub fn unfiltered() -> Self {
        Self {
            min_slots: 0,
            window: None,
        }
    }

    pub fn new(min_slots: usize, window: Option<Window>) -> Self {
        Self { min_slots, window }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregation {
    pub countries: Vec<CountryDocument>,
    pub index: Vec<CountryIndexEntry>,
}

impl Aggregation {
    pub fn region_count(&self) -> usize {
        self.countries.iter().map(|c| c.regions.len()).sum()
    }

    pub fn day_count(&self) -> usize {
        self.countries
            .iter()
            .flat_map(|c| &c.regions)
            .map(|r| r.days.len())
            .sum()
    }
}

type Grouped<'a> = BTreeMap<&'a str, BTreeMap<&'a str, BTreeMap<&'a str, Vec<&'a FlatRow>>>>;

fn group_rows(rows: &[FlatRow]) -> Grouped<'_> {
    let mut countries: Grouped<'_> = BTreeMap::new();
    for row in rows {
        countries
            .entry(row.country.as_str())
            .or_default()
            .entry(row.region.as_str())
            .or_default()
            .entry(row.day.as_str())
            .or_default()
            .push(row);
    }
    countries
}

fn any_valid<'a, I>(rows: I) -> bool
where
    I: IntoIterator<Item = &'a FlatRow>,
{
    rows.into_iter().any(FlatRow::is_valid)
}

pub fn aggregate(rows: &[FlatRow], policy: &DayPolicy) -> Result<Aggregation, ElprisError> {
    let mut aggregation = Aggregation::default();

    for (country, regions) in group_rows(rows) {
        let country_valid = regions
            .values()
            .any(|days| days.values().any(|rows| any_valid(rows.iter().copied())));
        if !country_valid {
            debug!(country, "dropping country without valid rows");
            continue;
        }
        let iso = iso_code(country)?;

        let mut documents = Vec::new();
        for (region, days) in regions {
            if !days.values().any(|rows| any_valid(rows.iter().copied())) {
                debug!(country, region, "dropping region without valid rows");
                continue;
            }
            let buckets = select_days(days, policy);
            if buckets.is_empty() {
                debug!(country, region, "no days left after filtering");
                continue;
            }
            documents.push(RegionDocument {
                name: region.to_string(),
                days: buckets,
            });
        }

        if documents.is_empty() {
            continue;
        }
        let document = CountryDocument {
            name: country.to_string(),
            iso_code: iso.to_string(),
            regions: documents,
        };
        aggregation.index.push(CountryIndexEntry::from(&document));
        aggregation.countries.push(document);
    }

    Ok(aggregation)
}

fn select_days(days: BTreeMap<&str, Vec<&FlatRow>>, policy: &DayPolicy) -> Vec<DayBucket> {
    let populated = days
        .into_iter()
        .filter(|(_, rows)| rows.len() > policy.min_slots)
        .map(|(date, rows)| DayBucket {
            date: date.to_string(),
            slots: rows.into_iter().map(TimeSlot::from).collect(),
        })
        .filter(DayBucket::has_valid_slot);

    match policy.window {
        None => populated.collect(),
        Some(window) => apply_window(populated, window),
    }
}

fn apply_window<I>(buckets: I, window: Window) -> Vec<DayBucket>
where
    I: Iterator<Item = DayBucket>,
{
    let mut dated: Vec<(NaiveDate, DayBucket)> = buckets
        .filter_map(|bucket| {
            let key = DayKey::new(&bucket.date);
            match key.to_date() {
                Some(date) => Some((date, bucket)),
                None => {
                    warn!(day = %key, "skipping day with unreadable key");
                    None
                }
            }
        })
        .filter(|(date, _)| *date >= window.today)
        .collect();
    dated.sort_by_key(|(date, _)| *date);
    dated.truncate(window.max_days);
    dated.into_iter().map(|(_, bucket)| bucket).collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn row(country: &str, region: &str, day: &str, hour: usize, valid: &str) -> FlatRow {
        FlatRow {
            country: country.to_string(),
            region: region.to_string(),
            day: day.to_string(),
            hour: format!("{hour:02}"),
            offset: "+01".to_string(),
            valid: valid.to_string(),
            price: format!("{hour},5"),
        }
    }

    fn full_day(country: &str, region: &str, day: &str) -> Vec<FlatRow> {
        (0..24).map(|h| row(country, region, day, h, "1")).collect()
    }

    #[test]
    fn well_populated_policy_drops_sparse_and_invalid_days() {
        let mut rows: Vec<FlatRow> = (0..11)
            .map(|h| row("SWEDEN", "SE1", "20240101", h, "1"))
            .collect();
        rows.push(row("SWEDEN", "SE1", "20240102", 0, "0"));

        let result = aggregate(&rows, &DayPolicy::new(10, None)).unwrap();
        assert_eq!(result.countries.len(), 1);
        let country = &result.countries[0];
        assert_eq!(country.iso_code, "SE");
        assert_eq!(country.regions.len(), 1);
        assert_eq!(country.regions[0].name, "SE1");
        let days: Vec<_> = country.regions[0].days.iter().map(|d| d.date.as_str()).collect();
        assert_eq!(days, vec!["20240101"]);
        assert_eq!(country.regions[0].days[0].slots.len(), 11);
    }

    #[test]
    fn ten_slots_is_not_enough() {
        let rows: Vec<FlatRow> = (0..10)
            .map(|h| row("SWEDEN", "SE1", "20240101", h, "1"))
            .collect();
        let result = aggregate(&rows, &DayPolicy::new(10, None)).unwrap();
        assert!(result.countries.is_empty());
        assert!(result.index.is_empty());
    }

    #[test]
    fn invalid_countries_and_regions_are_dropped() {
        let mut rows = full_day("SWEDEN", "SE1", "20240101");
        rows.extend((0..24).map(|h| row("SWEDEN", "SE2", "20240101", h, "0")));
        rows.extend((0..24).map(|h| row("NORWAY", "NO1", "20240101", h, "0")));

        let result = aggregate(&rows, &DayPolicy::unfiltered()).unwrap();
        assert_eq!(result.countries.len(), 1);
        assert_eq!(result.index.len(), 1);
        assert_eq!(result.index[0].regions, vec!["SE1".to_string()]);
    }

    #[test]
    fn invalid_country_needs_no_iso_code() {
        let rows = vec![row("ATLANTIS", "A1", "20240101", 0, "0")];
        let result = aggregate(&rows, &DayPolicy::unfiltered()).unwrap();
        assert!(result.countries.is_empty());
    }

    #[test]
    fn unknown_valid_country_fails() {
        let mut rows = full_day("SWEDEN", "SE1", "20240101");
        rows.push(row("ATLANTIS", "A1", "20240101", 0, "1"));
        let result = aggregate(&rows, &DayPolicy::unfiltered());
        assert_matches!(result, Err(ElprisError::UnknownCountry(name)) if name == "ATLANTIS");
    }

    #[test]
    fn window_keeps_today_onwards_capped_and_sorted() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let mut rows = Vec::new();
        for day in (5..=25).rev() {
            rows.extend(full_day("FINLAND", "FI", &format!("202403{day:02}")));
        }

        let policy = DayPolicy::new(10, Some(Window { today, max_days: 8 }));
        let result = aggregate(&rows, &policy).unwrap();
        let days: Vec<_> = result.countries[0].regions[0]
            .days
            .iter()
            .map(|d| d.date.clone())
            .collect();
        let expected: Vec<_> = (10..=17).map(|d| format!("202403{d:02}")).collect();
        assert_eq!(days, expected);
    }

    #[test]
    fn region_emptied_by_window_is_dropped_everywhere() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let mut rows = full_day("DENMARK", "DK1", "20240301");
        rows.extend(full_day("DENMARK", "DK2", "20240311"));
        rows.extend(full_day("GERMANY", "DE", "20240301"));

        let policy = DayPolicy::new(10, Some(Window { today, max_days: 8 }));
        let result = aggregate(&rows, &policy).unwrap();
        assert_eq!(result.index.len(), 1);
        assert_eq!(result.index[0].name, "DENMARK");
        assert_eq!(result.index[0].regions, vec!["DK2".to_string()]);
        assert_eq!(result.countries[0].regions.len(), 1);
    }

    #[test]
    fn unreadable_day_keys_fall_outside_the_window() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let mut rows = full_day("SPAIN", "ES", "garbage");
        rows.extend(full_day("SPAIN", "ES", "20240312"));
        let policy = DayPolicy::new(10, Some(Window { today, max_days: 8 }));
        let result = aggregate(&rows, &policy).unwrap();
        assert_eq!(result.countries[0].regions[0].days.len(), 1);

        let result = aggregate(&rows, &DayPolicy::unfiltered()).unwrap();
        assert_eq!(result.countries[0].regions[0].days.len(), 2);
    }

    #[test]
    fn slots_keep_file_order_and_raw_text() {
        let rows = vec![
            row("ITALY", "NORD", "20240101", 5, "1"),
            row("ITALY", "NORD", "20240101", 1, "0"),
        ];
        let result = aggregate(&rows, &DayPolicy::unfiltered()).unwrap();
        let slots = &result.countries[0].regions[0].days[0].slots;
        assert_eq!(slots[0].hour, "05");
        assert_eq!(slots[0].price, "5,5");
        assert_eq!(slots[1].valid, "0");
    }

    #[test]
    fn empty_input_gives_empty_index() {
        let result = aggregate(&[], &DayPolicy::new(10, None)).unwrap();
        assert!(result.countries.is_empty());
        assert!(result.index.is_empty());
    }

    #[test]
    fn index_matches_documents() {
        let mut rows = full_day("SWEDEN", "SE4", "20240101");
        rows.extend(full_day("SWEDEN", "SE1", "20240101"));
        rows.extend(full_day("AUSTRIA", "AT", "20240101"));
        let result = aggregate(&rows, &DayPolicy::unfiltered()).unwrap();

        let derived: Vec<_> = result.countries.iter().map(CountryIndexEntry::from).collect();
        assert_eq!(result.index, derived);
        assert_eq!(result.index[0].name, "AUSTRIA");
        assert_eq!(result.index[1].regions, vec!["SE1".to_string(), "SE4".to_string()]);
    }
}

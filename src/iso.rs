use std::collections::HashMap;
use std::sync::LazyLock;

use crate::error::ElprisError;

/// Country names as spelled in the feed.
const COUNTRY_CODES: &[(&str, &str)] = &[
    ("ALBANIA", "AL"),
    ("AUSTRIA", "AT"),
    ("BELARUS", "BY"),
    ("BELGIUM", "BE"),
    ("BOSNIA AND HERZEGOVINA", "BA"),
    ("BULGARIA", "BG"),
    ("CROATIA", "HR"),
    ("CYPRUS", "CY"),
    ("CZECH REPUBLIC", "CZ"),
    ("DENMARK", "DK"),
    ("ESTONIA", "EE"),
    ("FINLAND", "FI"),
    ("FRANCE", "FR"),
    ("GERMANY", "DE"),
    ("GREECE", "GR"),
    ("HUNGARY", "HU"),
    ("ICELAND", "IS"),
    ("IRELAND", "IE"),
    ("ITALY", "IT"),
    ("KOSOVO", "XK"),
    ("LATVIA", "LV"),
    ("LITHUANIA", "LT"),
    ("LUXEMBOURG", "LU"),
    ("MALTA", "MT"),
    ("MOLDOVA", "MD"),
    ("MONTENEGRO", "ME"),
    ("MOROCCO", "MA"),
    ("NETHERLANDS", "NL"),
    ("NORTH MACEDONIA", "MK"),
    ("NORWAY", "NO"),
    ("POLAND", "PL"),
    ("PORTUGAL", "PT"),
    ("ROMANIA", "RO"),
    ("RUSSIA", "RU"),
    ("SERBIA", "RS"),
    ("SLOVAKIA", "SK"),
    ("SLOVENIA", "SI"),
    ("SPAIN", "ES"),
    ("SWEDEN", "SE"),
    ("SWITZERLAND", "CH"),
    ("TURKEY", "TR"),
    ("UNITED KINGDOM", "GB"),
];

static ISO_TABLE: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| COUNTRY_CODES.iter().copied().collect());

/// Resolves a feed country name to its ISO-3166 alpha-2 code.
///
/// Names match exactly; an unknown name means the feed and the table have
/// drifted apart.
pub fn iso_code(country: &str) -> Result<&'static str, ElprisError> {
    ISO_TABLE
        .get(country)
        .copied()
        .ok_or_else(|| ElprisError::UnknownCountry(country.to_string()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn resolves_known_countries() {
        assert_eq!(iso_code("SWEDEN").unwrap(), "SE");
        assert_eq!(iso_code("UNITED KINGDOM").unwrap(), "GB");
        assert_eq!(iso_code("KOSOVO").unwrap(), "XK");
    }

    #[test]
    fn unknown_country_is_an_error() {
        assert_matches!(iso_code("ATLANTIS"), Err(ElprisError::UnknownCountry(name)) if name == "ATLANTIS");
        assert_matches!(iso_code("sweden"), Err(ElprisError::UnknownCountry(_)));
    }

    #[test]
    fn table_has_no_duplicate_names() {
        assert_eq!(ISO_TABLE.len(), COUNTRY_CODES.len());
    }
}

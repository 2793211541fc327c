use crate::error::{PingError, Result};

const COUNTRY_NAMES: &[(&str, &str)] = &[
    ("AE", "United Arab Emirates"),
    ("AU", "Australia"),
    ("BE", "Belgium"),
    ("BH", "Bahrain"),
    ("BR", "Brazil"),
    ("CA", "Canada"),
    ("CH", "Switzerland"),
    ("CN", "China"),
    ("CL", "Chile"),
    ("DE", "Germany"),
    ("FI", "Finland"),
    ("FR", "France"),
    ("HK", "Hong Kong"),
    ("ID", "Indonesia"),
    ("IE", "Ireland"),
    ("IN", "India"),
    ("IT", "Italy"),
    ("JP", "Japan"),
    ("KR", "South Korea"),
    ("NL", "Netherlands"),
    ("NO", "Norway"),
    ("MY", "Malaysia"),
    ("SE", "Sweden"),
    ("SA", "Saudi Arabia"),
    ("SG", "Singapore"),
    ("TW", "Taiwan"),
    ("UK", "United Kingdom"),
    ("US", "United States"),
    ("ZA", "South Africa"),
];

/// Display name for a catalog country code.
///
/// An unknown code means the catalog is broken, so this fails instead of
/// falling back to the raw code.
pub fn country_name(code: &str) -> Result<&'static str> {
    let upper = code.to_ascii_uppercase();
    COUNTRY_NAMES
        .iter()
        .find(|(c, _)| *c == upper)
        .map(|(_, name)| *name)
        .ok_or_else(|| PingError::CountryNotFound(code.to_string()))
}

pub fn provider_logo(provider_key: &str) -> String {
    format!("/images/provider/{}.svg", provider_key)
}

pub fn country_flag(code: &str) -> String {
    format!("/images/country/{}.svg", code.to_ascii_lowercase())
}

use crate::error::{PingError, Result};
use crate::filter::FilterState;
use crate::metadata;
use crate::types::RegionLatency;
use colored::{ColoredString, Colorize};
use reqwest::Url;
use serde::Serialize;
use std::cmp::Ordering;

const FAST_MS: f64 = 80.0;
const MODERATE_MS: f64 = 200.0;
const BAR_WIDTH: usize = 20;

const SHARE_ENDPOINT: &str = "https://twitter.com/intent/tweet";
const SHARE_SITE: &str = "https://webping.cloud";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Fast,
    Moderate,
    Slow,
}

pub fn band(latency_ms: f64) -> Band {
    if latency_ms < FAST_MS {
        Band::Fast
    } else if latency_ms < MODERATE_MS {
        Band::Moderate
    } else {
        Band::Slow
    }
}

/// Entries matching the filter, measured rows first in ascending latency.
pub fn visible_rows(entries: Vec<RegionLatency>, filter: &FilterState) -> Vec<RegionLatency> {
    let mut rows: Vec<RegionLatency> = entries
        .into_iter()
        .filter(|e| filter.allows(&e.provider.key, &e.region.country))
        .collect();
    rows.sort_by(compare_rows);
    rows
}

fn compare_rows(a: &RegionLatency, b: &RegionLatency) -> Ordering {
    let by_latency = match (a.latency_ms, b.latency_ms) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    // Deterministic output for equal latencies
    by_latency.then_with(|| a.key.cmp(&b.key))
}

fn format_latency(latency_ms: Option<f64>) -> String {
    match latency_ms {
        Some(ms) => format!("{}ms", ms.round() as u64),
        None => "-".to_string(),
    }
}

fn paint(text: String, latency_ms: Option<f64>) -> ColoredString {
    let text = text.as_str();
    match latency_ms.map(band) {
        Some(Band::Fast) => text.green(),
        Some(Band::Moderate) => text.yellow(),
        Some(Band::Slow) => text.red(),
        None => text.dimmed(),
    }
}

fn bar(latency_ms: Option<f64>, max_ms: f64) -> String {
    let Some(ms) = latency_ms else {
        return String::new();
    };
    if max_ms <= 0.0 {
        return String::new();
    }
    let filled = ((ms / max_ms) * BAR_WIDTH as f64).round() as usize;
    "█".repeat(filled.clamp(1, BAR_WIDTH))
}

/// Ranked table for the terminal.
///
/// Fails if a row's country is missing from the metadata table.
pub fn render_table(rows: &[RegionLatency]) -> Result<String> {
    let max_ms = rows
        .iter()
        .filter_map(|r| r.latency_ms)
        .fold(0.0_f64, f64::max);

    let mut out = String::new();
    out.push_str(&format!(
        "{:<4} {:<10} {:<14} {:<26} {:<36} {}\n",
        "RANK", "LATENCY", "PROVIDER", "REGION", "LOCATION", "RELATIVE"
    ));
    out.push_str(&format!("{}\n", "-".repeat(112)));

    for (i, row) in rows.iter().enumerate() {
        let location = format!(
            "{}, {}",
            row.region.location,
            metadata::country_name(&row.region.country)?
        );
        let latency = paint(format!("{:<10}", format_latency(row.latency_ms)), row.latency_ms);
        let relative = paint(bar(row.latency_ms, max_ms), row.latency_ms);

        out.push_str(&format!(
            "{:<4} {} {:<14} {:<26} {:<36} {}\n",
            i + 1,
            latency,
            truncate(&row.provider.key, 14),
            truncate(&row.region.key, 26),
            truncate(&location, 36),
            relative
        ));
    }
    Ok(out)
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let cut: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", cut)
}

/// The measured row with the lowest latency.
pub fn nearest(rows: &[RegionLatency]) -> Option<&RegionLatency> {
    rows.iter().find(|r| r.latency_ms.is_some())
}

/// Pre-filled tweet naming the nearest region.
pub fn share_link(row: &RegionLatency) -> Result<String> {
    let latency = row
        .latency_ms
        .ok_or_else(|| PingError::Custom(format!("{} has no latency yet", row.key)))?;
    let text = format!(
        "My nearest cloud region is {} {} ({}, {}) at {}ms. What's yours?",
        row.provider.display_name,
        row.region.display_name,
        row.region.location,
        metadata::country_name(&row.region.country)?,
        latency.round() as u64
    );

    let url = Url::parse_with_params(SHARE_ENDPOINT, &[("text", text.as_str()), ("url", SHARE_SITE)])
        .map_err(|e| PingError::Custom(format!("invalid share link: {}", e)))?;
    Ok(url.to_string())
}

/// Flattened row for JSON output.
#[derive(Debug, Serialize)]
pub struct RowReport {
    pub rank: usize,
    pub key: String,
    pub provider: String,
    pub provider_name: String,
    pub provider_logo: String,
    pub region: String,
    pub region_name: String,
    pub location: String,
    pub country: String,
    pub country_name: String,
    pub country_flag: String,
    pub geo: String,
    pub latency_ms: Option<f64>,
    pub band: Option<Band>,
    pub samples: Vec<u64>,
}

pub fn report(rows: &[RegionLatency]) -> Result<Vec<RowReport>> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| -> Result<RowReport> {
            Ok(RowReport {
                rank: i + 1,
                key: row.key.clone(),
                provider: row.provider.key.clone(),
                provider_name: row.provider.display_name.clone(),
                provider_logo: metadata::provider_logo(&row.provider.key),
                region: row.region.key.clone(),
                region_name: row.region.display_name.clone(),
                location: row.region.location.clone(),
                country: row.region.country.clone(),
                country_name: metadata::country_name(&row.region.country)?.to_string(),
                country_flag: metadata::country_flag(&row.region.country),
                geo: row.region.geo.clone(),
                latency_ms: row.latency_ms,
                band: row.latency_ms.map(band),
                samples: row.samples.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Provider, Region};

    fn row(provider: &str, region: &str, country: &str, latency_ms: Option<f64>) -> RegionLatency {
        let mut entry = RegionLatency::new(
            Provider {
                key: provider.to_string(),
                display_name: provider.to_uppercase(),
            },
            Region {
                key: region.to_string(),
                display_name: region.to_string(),
                country: country.to_string(),
                location: "Somewhere".to_string(),
                geo: "Europe".to_string(),
                ping_url: Some("https://example.com".to_string()),
            },
        );
        entry.latency_ms = latency_ms;
        entry
    }

    fn keys(rows: &[RegionLatency]) -> Vec<&str> {
        rows.iter().map(|r| r.key.as_str()).collect()
    }

    #[test]
    fn test_bands() {
        assert_eq!(band(0.0), Band::Fast);
        assert_eq!(band(79.9), Band::Fast);
        assert_eq!(band(80.0), Band::Moderate);
        assert_eq!(band(199.0), Band::Moderate);
        assert_eq!(band(200.0), Band::Slow);
    }

    #[test]
    fn test_visible_rows_is_exact_intersection() {
        let entries = vec![
            row("aws", "a", "US", Some(10.0)),
            row("aws", "b", "DE", Some(20.0)),
            row("gcp", "c", "US", Some(30.0)),
            row("gcp", "d", "JP", Some(40.0)),
        ];
        let filter = FilterState::new(
            vec!["aws".to_string(), "gcp".to_string()],
            vec!["US".to_string()],
        );
        assert_eq!(keys(&visible_rows(entries.clone(), &filter)), vec!["aws-a", "gcp-c"]);

        let filter = FilterState::new(vec!["gcp".to_string()], vec!["US".to_string(), "JP".to_string()]);
        assert_eq!(keys(&visible_rows(entries.clone(), &filter)), vec!["gcp-c", "gcp-d"]);

        let filter = FilterState::default();
        assert!(visible_rows(entries, &filter).is_empty());
    }

    #[test]
    fn test_sorting_unmeasured_last() {
        let entries = vec![
            row("aws", "slow", "US", Some(250.0)),
            row("aws", "none1", "US", None),
            row("aws", "fast", "US", Some(12.0)),
            row("aws", "none2", "US", None),
            row("aws", "mid", "US", Some(100.0)),
        ];
        let filter = FilterState::new(vec!["aws".to_string()], vec!["US".to_string()]);
        let rows = visible_rows(entries, &filter);
        assert_eq!(&keys(&rows)[..3], &["aws-fast", "aws-mid", "aws-slow"]);
        assert!(rows[3..].iter().all(|r| r.latency_ms.is_none()));
        assert_eq!(nearest(&rows).unwrap().key, "aws-fast");
    }

    #[test]
    fn test_nearest_skips_unmeasured() {
        let rows = vec![row("aws", "x", "US", None)];
        assert!(nearest(&rows).is_none());
    }

    #[test]
    fn test_render_table() {
        colored::control::set_override(false);
        let rows = vec![row("aws", "eu-west-1", "IE", Some(42.4)), row("gcp", "x", "US", None)];
        let table = render_table(&rows).unwrap();
        assert!(table.contains("42ms"));
        assert!(table.contains("Somewhere, Ireland"));
        assert!(table.contains("eu-west-1"));
    }

    #[test]
    fn test_render_unknown_country_fails() {
        let rows = vec![row("aws", "x", "ZZ", Some(10.0))];
        assert!(matches!(render_table(&rows), Err(PingError::CountryNotFound(_))));
    }

    #[test]
    fn test_bar() {
        assert_eq!(bar(Some(100.0), 100.0).chars().count(), BAR_WIDTH);
        assert_eq!(bar(Some(50.0), 100.0).chars().count(), BAR_WIDTH / 2);
        assert_eq!(bar(Some(0.0), 100.0).chars().count(), 1);
        assert!(bar(None, 100.0).is_empty());
    }

    #[test]
    fn test_share_link() {
        let link = share_link(&row("aws", "eu-west-1", "IE", Some(33.0))).unwrap();
        assert!(link.starts_with("https://twitter.com/intent/tweet?text="));
        assert!(link.contains("Ireland"));
        assert!(link.contains("33ms"));
        assert!(link.contains("url=https%3A%2F%2Fwebping.cloud"));

        assert!(share_link(&row("aws", "x", "IE", None)).is_err());
    }

    #[test]
    fn test_report() {
        let rows = vec![row("aws", "eu-west-1", "IE", Some(150.0))];
        let report = report(&rows).unwrap();
        assert_eq!(report[0].rank, 1);
        assert_eq!(report[0].country_name, "Ireland");
        assert_eq!(report[0].band, Some(Band::Moderate));
        assert_eq!(report[0].provider_logo, "/images/provider/aws.svg");
    }
}

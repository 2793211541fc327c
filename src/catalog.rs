use crate::error::{PingError, Result};
use crate::types::{CloudProvider, Provider, Region};
use directories::ProjectDirs;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::info;

// Include the JSON file at compile time
const CATALOG_JSON: &str = include_str!("../assets/catalog.json");

const FETCH_TIMEOUT: u64 = 10;

/// Static list of providers and their regions.
///
/// Never mutated after loading; the scheduler and the view only read it.
#[derive(Debug, Clone)]
pub struct Catalog {
    providers: Vec<CloudProvider>,
}

impl Catalog {
    pub fn new(providers: Vec<CloudProvider>) -> Self {
        Self { providers }
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let providers: Vec<CloudProvider> = serde_json::from_str(content)?;
        Ok(Self::new(providers))
    }

    pub fn builtin() -> Result<Self> {
        Self::from_json(CATALOG_JSON)
    }

    /// Resolve the catalog to use
    /// Strategy:
    /// 1. Explicit source (file path, or http(s) URL)
    /// 2. User Config (~/.config/webping/catalog.json)
    /// 3. Fallback to built-in assets/catalog.json
    pub async fn load(source: Option<&str>) -> Result<Self> {
        if let Some(source) = source {
            if source.starts_with("http://") || source.starts_with("https://") {
                return Self::fetch(source).await;
            }
            return Self::read(Path::new(source)).await;
        }

        if let Some(proj_dirs) = ProjectDirs::from("", "", "webping") {
            let path = proj_dirs.config_dir().join("catalog.json");
            if fs::try_exists(&path).await.unwrap_or(false) {
                return Self::read(&path).await;
            }
        }

        info!("Using built-in catalog");
        Self::builtin()
    }

    pub async fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let catalog = Self::from_json(&content)?;
        info!(path = ?path, providers = catalog.providers.len(), "Loaded catalog from file");
        Ok(catalog)
    }

    /// Download the catalog from a `/api/regions` style endpoint
    pub async fn fetch(url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT))
            .build()?;
        let providers: Vec<CloudProvider> = client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        info!(url, providers = providers.len(), "Fetched catalog");
        Ok(Self::new(providers))
    }

    pub fn providers(&self) -> &[CloudProvider] {
        &self.providers
    }

    pub fn provider(&self, key: &str) -> Result<&CloudProvider> {
        self.providers
            .iter()
            .find(|p| p.key.eq_ignore_ascii_case(key))
            .ok_or_else(|| {
                PingError::UnknownProvider(format!(
                    "'{}'. Available: {}",
                    key,
                    self.provider_keys().join(", ")
                ))
            })
    }

    pub fn provider_keys(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.key.clone()).collect()
    }

    /// All (provider, region) pairs in catalog order.
    pub fn pairs(&self) -> Vec<(Provider, Region)> {
        self.providers
            .iter()
            .flat_map(|p| {
                let provider = p.provider();
                p.regions
                    .iter()
                    .map(move |r| (provider.clone(), r.clone()))
            })
            .collect()
    }

    /// Every country that appears in the catalog, first-seen order, no duplicates.
    pub fn countries(&self) -> Vec<String> {
        let mut countries: Vec<String> = Vec::new();
        for region in self.providers.iter().flat_map(|p| &p.regions) {
            if !countries.contains(&region.country) {
                countries.push(region.country.clone());
            }
        }
        countries
    }

    /// Geo groups (continents) with the countries they contain, first-seen order.
    pub fn geo_groups(&self) -> Vec<(String, Vec<String>)> {
        let mut groups: Vec<(String, Vec<String>)> = Vec::new();
        for region in self.providers.iter().flat_map(|p| &p.regions) {
            let idx = match groups.iter().position(|(geo, _)| *geo == region.geo) {
                Some(idx) => idx,
                None => {
                    groups.push((region.geo.clone(), Vec::new()));
                    groups.len() - 1
                }
            };
            let countries = &mut groups[idx].1;
            if !countries.contains(&region.country) {
                countries.push(region.country.clone());
            }
        }
        groups
    }

    pub fn geo_countries(&self, geo: &str) -> Result<Vec<String>> {
        self.geo_groups()
            .into_iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(geo))
            .map(|(_, countries)| countries)
            .ok_or_else(|| PingError::UnknownGeo(geo.to_string()))
    }
}

#[cfg(test)]
pub(crate) fn sample_catalog() -> Catalog {
    Catalog::from_json(
        r#"[
          {"key":"aws","display_name":"AWS","regions":[
            {"key":"us-east-1","display_name":"N. Virginia","country":"US","location":"N. Virginia","geo":"North America","ping_url":"http://dynamodb.us-east-1.amazonaws.com/ping"},
            {"key":"eu-west-1","display_name":"Ireland","country":"IE","location":"Dublin","geo":"Europe","ping_url":"http://dynamodb.eu-west-1.amazonaws.com/ping"}
          ]},
          {"key":"gcp","display_name":"Google Cloud","regions":[
            {"key":"europe-west3","display_name":"Frankfurt","country":"DE","location":"Frankfurt","geo":"Europe","ping_url":"https://gcp.example/ping"},
            {"key":"us-central1","display_name":"Iowa","country":"US","location":"Council Bluffs","geo":"North America"}
          ]}
        ]"#,
    )
    .unwrap()
}

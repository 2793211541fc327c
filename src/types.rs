use serde::{Deserialize, Deserializer, Serialize};

/// 云服务商
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub key: String,          // 例如: "aws"
    pub display_name: String, // 例如: "Amazon Web Services"
}

/// 服务商下的一个区域 (可用区所在地)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub key: String,
    pub display_name: String,
    /// ISO alpha-2 code (the catalog uses "UK" rather than "GB")
    pub country: String,
    pub location: String,
    pub geo: String,
    /// Regions without a probe endpoint are never probed.
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub ping_url: Option<String>,
}

impl Region {
    pub fn is_probeable(&self) -> bool {
        self.ping_url.is_some()
    }
}

/// One catalog entry: a provider together with its regions.
/// Same shape as the `/api/regions` response of the web version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudProvider {
    pub key: String,
    pub display_name: String,
    #[serde(default)]
    pub regions: Vec<Region>,
}

impl CloudProvider {
    pub fn provider(&self) -> Provider {
        Provider {
            key: self.key.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// Accumulated measurements for one (provider, region) pair.
#[derive(Debug, Clone, Serialize)]
pub struct RegionLatency {
    pub key: String,
    pub provider: Provider,
    pub region: Region,
    pub samples: Vec<u64>,
    /// 聚合后的延迟 (毫秒), 没有样本时为 None
    pub latency_ms: Option<f64>,
}

impl RegionLatency {
    pub fn new(provider: Provider, region: Region) -> Self {
        Self {
            key: latency_key(&provider.key, &region.key),
            provider,
            region,
            samples: Vec::new(),
            latency_ms: None,
        }
    }
}

pub fn latency_key(provider_key: &str, region_key: &str) -> String {
    format!("{}-{}", provider_key, region_key)
}

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PingError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Country name not found for code '{0}'")]
    CountryNotFound(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Unknown geo group: {0}")]
    UnknownGeo(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("{0}")]
    Custom(String),
}

pub type Result<T> = std::result::Result<T, PingError>;

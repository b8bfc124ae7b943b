use crate::datasource::polymarket::{DEFAULT_DATA_API_URL, DEFAULT_GAMMA_API_URL};
use crate::domain::{Category, Decimal};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub wallet_address: String,
    pub port: u16,
    pub data_api_url: String,
    pub gamma_api_url: String,
    pub refresh_interval_ms: u64,
    pub page_size: usize,
    pub max_pages: usize,
    pub pnl_mode: PnlMode,
    pub dust_threshold: Decimal,
    /// Market or condition id -> category.
    pub category_overrides: HashMap<String, Category>,
}

/// How fees enter the reported realized P&L.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PnlMode {
    /// Fees reported separately.
    Gross,
    /// Fees reduce realized P&L when incurred.
    #[default]
    Net,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let wallet_address = env_map
            .get("POLYMARKET_WALLET_ADDRESS")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingEnv("POLYMARKET_WALLET_ADDRESS".to_string()))?;
        if !is_wallet_address(&wallet_address) {
            return Err(ConfigError::InvalidValue(
                "POLYMARKET_WALLET_ADDRESS".to_string(),
                "must be 0x followed by hex digits".to_string(),
            ));
        }

        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let data_api_url = env_map
            .get("DATA_API_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_DATA_API_URL.to_string());

        let gamma_api_url = env_map
            .get("GAMMA_API_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_GAMMA_API_URL.to_string());

        let refresh_interval_ms = parse_positive(&env_map, "REFRESH_INTERVAL_MS", 30_000)?;
        let page_size = parse_positive(&env_map, "PAGE_SIZE", 500)? as usize;
        let max_pages = parse_positive(&env_map, "MAX_PAGES", 20)? as usize;

        let pnl_mode = match env_map
            .get("PNL_MODE")
            .map(|s| s.as_str())
            .unwrap_or("net")
        {
            "gross" => PnlMode::Gross,
            "net" => PnlMode::Net,
            other => {
                return Err(ConfigError::InvalidValue(
                    "PNL_MODE".to_string(),
                    format!("must be gross or net, got {}", other),
                ))
            }
        };

        let dust_threshold = env_map
            .get("DUST_THRESHOLD")
            .map(|s| s.as_str())
            .unwrap_or("0.01")
            .parse::<Decimal>()
            .ok()
            .filter(|d| !d.is_negative())
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "DUST_THRESHOLD".to_string(),
                    "must be a non-negative decimal".to_string(),
                )
            })?;

        let category_overrides = parse_category_overrides(&env_map)?;

        Ok(Config {
            wallet_address,
            port,
            data_api_url,
            gamma_api_url,
            refresh_interval_ms,
            page_size,
            max_pages,
            pnl_mode,
            dust_threshold,
            category_overrides,
        })
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

fn is_wallet_address(s: &str) -> bool {
    s.strip_prefix("0x")
        .map(|hex| !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

fn parse_positive(
    env_map: &HashMap<String, String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(key.to_string(), "must be a positive integer".to_string())
            }),
    }
}

/// `CATEGORY_OVERRIDES=0xabc=politics,0xdef:Yes=sports`
fn parse_category_overrides(
    env_map: &HashMap<String, String>,
) -> Result<HashMap<String, Category>, ConfigError> {
    let Some(raw) = env_map.get("CATEGORY_OVERRIDES") else {
        return Ok(HashMap::new());
    };

    let mut overrides = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match entry.split_once('=') {
            Some((id, category)) if !id.trim().is_empty() && !category.trim().is_empty() => {
                overrides.insert(id.trim().to_string(), Category::new(category.trim()));
            }
            _ => {
                return Err(ConfigError::InvalidValue(
                    "CATEGORY_OVERRIDES".to_string(),
                    format!("expected id=category, got {}", entry),
                ))
            }
        }
    }
    Ok(overrides)
}

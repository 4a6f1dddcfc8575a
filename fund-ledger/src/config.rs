//! Configuration for the fund ledger

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the persisted store
    pub data_dir: PathBuf,

    /// Fixed key the whole aggregate is stored under
    pub store_key: String,

    /// Service name
    pub service_name: String,

    /// How reversal anomalies are handled
    pub reversal_policy: ReversalPolicy,

    /// Dashboard configuration
    pub dashboard: DashboardConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/fund-ledger"),
            store_key: "appsheet_db".to_string(),
            service_name: "fund-ledger".to_string(),
            reversal_policy: ReversalPolicy::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

/// Handling of missing rows during reversals and repayments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReversalPolicy {
    /// Apply the operation, skip the side effect and report a diagnostic
    #[default]
    Lenient,
    /// Reject the operation before anything changes
    Strict,
}

/// Dashboard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Number of recent transactions shown
    pub recent_transactions: usize,

    /// Flat monthly rate used for the interest estimate
    pub estimated_interest_rate: Decimal,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            recent_transactions: 5,
            estimated_interest_rate: Decimal::new(1, 2), // 1%
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("FUND_LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(key) = std::env::var("FUND_LEDGER_STORE_KEY") {
            if key.is_empty() {
                return Err(crate::Error::Config(
                    "FUND_LEDGER_STORE_KEY must not be empty".to_string(),
                ));
            }
            config.store_key = key;
        }

        if let Ok(strict) = std::env::var("FUND_LEDGER_STRICT_REVERSALS") {
            config.reversal_policy = match strict.as_str() {
                "1" | "true" => ReversalPolicy::Strict,
                "0" | "false" => ReversalPolicy::Lenient,
                other => {
                    return Err(crate::Error::Config(format!(
                        "FUND_LEDGER_STRICT_REVERSALS: expected true/false, got {}",
                        other
                    )))
                }
            };
        }

        Ok(config)
    }

    /// Path of the persisted blob
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.json", self.store_key))
    }
}

//! # Register Configuration
//!
//! ## Sources (later wins)
//! 1. Defaults (this file)
//! 2. `register.toml` in the platform config directory, or an explicit path
//! 3. Environment variables (`IRONBOX_*`)
//!
//! ```toml
//! store_name = "Ironbox Hardware"
//! default_tax_rate_bps = 1300
//! database_path = "/var/lib/ironbox/ironbox.db"
//! ```
//!
//! The configured tax rate is handed to the Pricing Engine explicitly by
//! the Sale Transaction Manager; nothing reads it as a global.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use ironbox_core::TaxRate;

pub const CONFIG_FILE_NAME: &str = "register.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegisterConfig {
    /// Printed on receipts.
    pub store_name: String,

    pub currency_symbol: String,

    /// e.g. 1300 = 13%
    pub default_tax_rate_bps: u32,

    /// Minimum stock level suggested for new products.
    pub default_min_stock_level: i64,

    pub database_path: PathBuf,
}

impl Default for RegisterConfig {
    fn default() -> Self {
        RegisterConfig {
            store_name: "Ironbox Hardware".to_string(),
            currency_symbol: "$".to_string(),
            default_tax_rate_bps: 1300,
            default_min_stock_level: 10,
            database_path: default_database_path(),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "ironbox", "pos")
}

/// Platform data directory, or the working directory when there is none.
fn default_database_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("ironbox.db"))
        .unwrap_or_else(|| PathBuf::from("ironbox.db"))
}

/// `register.toml` in the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

impl RegisterConfig {
    /// Loads defaults, then the file, then the environment.
    ///
    /// An explicit `path` must exist. The default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => RegisterConfig::default(),
            },
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        info!(
            store = %config.store_name,
            tax_rate_bps = config.default_tax_rate_bps,
            database = %config.database_path.display(),
            "Register configuration loaded"
        );
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(path = %path.display(), "Reading register configuration");
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Applies `IRONBOX_STORE_NAME`, `IRONBOX_TAX_RATE` (a percentage such
    /// as `"13"` or `"8.25"`) and `IRONBOX_DB_PATH` from `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(name) = lookup("IRONBOX_STORE_NAME") {
            self.store_name = name;
        }

        if let Some(rate) = lookup("IRONBOX_TAX_RATE") {
            let pct: f64 = rate.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("IRONBOX_TAX_RATE is not a number: {rate}"))
            })?;
            if !(0.0..=100.0).contains(&pct) {
                return Err(ConfigError::Invalid(format!(
                    "IRONBOX_TAX_RATE must be between 0 and 100, got {pct}"
                )));
            }
            self.default_tax_rate_bps = TaxRate::from_percentage(pct).bps();
        }

        if let Some(path) = lookup("IRONBOX_DB_PATH") {
            self.database_path = PathBuf::from(path);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store_name.trim().is_empty() {
            return Err(ConfigError::Invalid("store_name is empty".to_string()));
        }
        if self.default_tax_rate_bps > 10_000 {
            return Err(ConfigError::Invalid(format!(
                "default_tax_rate_bps {} exceeds 100%",
                self.default_tax_rate_bps
            )));
        }
        if self.default_min_stock_level < 0 {
            return Err(ConfigError::Invalid(
                "default_min_stock_level is negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.default_tax_rate_bps)
    }

    /// Formats cents for display, e.g. `-$28.24`.
    pub fn format_currency(&self, cents: i64) -> String {
        format!(
            "{}{}{}.{:02}",
            if cents < 0 { "-" } else { "" },
            self.currency_symbol,
            (cents / 100).abs(),
            (cents % 100).abs()
        )
    }
}

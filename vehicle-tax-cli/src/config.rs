//! Settings read from `vtax.toml`.
//!
//! Every section is optional. Command-line flags win over the file, the file
//! wins over the built-in defaults.
//!
//! ```toml
//! log_level = "debug"
//! store_timeout_secs = 10
//! cache_capacity = 4096
//! non_indexed_keys = ["co2_reference_wltp", "mma_reference"]
//!
//! [database]
//! backend = "sqlite"
//! connection = "vehicle_tax.db"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use vehicle_tax_core::ResolverConfig;
use vehicle_tax_core::db::{DEFAULT_CACHE_CAPACITY, DbConfig};

pub const DEFAULT_CONFIG_FILE: &str = "vtax.toml";

/// Ratio-type brackets and parameters. Indexing them would change the shape
/// of a formula rather than its amounts.
pub const DEFAULT_NON_INDEXED_KEYS: [&str; 14] = [
    "co2_reference_wltp",
    "co2_reference_nedc",
    "mma_reference",
    "energy_thermal",
    "energy_hybrid",
    "energy_electric_kw",
    "formula_divisor",
    "co2_correction_x",
    "co2_correction_percent",
    "wltp_q_factor",
    "fuel_factor_default",
    "fuel_factor_lpg",
    "fuel_factor_cng",
    "displacement_cc",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSection {
    pub backend: String,
    pub connection: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_string(),
            connection: "vehicle_tax.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub database: DatabaseSection,
    pub store_timeout_secs: u64,
    /// Rule lookups kept in memory before the oldest are evicted.
    pub cache_capacity: usize,
    pub non_indexed_keys: Vec<String>,
    pub log_level: Option<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            database: DatabaseSection::default(),
            store_timeout_secs: ResolverConfig::default().store_timeout.as_secs(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            non_indexed_keys: DEFAULT_NON_INDEXED_KEYS.iter().map(|k| k.to_string()).collect(),
            log_level: None,
        }
    }
}

/// Values given on the command line. `None` keeps whatever the file says.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub backend: Option<String>,
    pub db: Option<String>,
    pub store_timeout_secs: Option<u64>,
    pub log_level: Option<String>,
}

impl CliConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid vtax configuration")
    }

    /// Reads `path` when given; it must exist. Otherwise reads
    /// `vtax.toml` from the working directory if there is one, and falls back
    /// to the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read config file '{}'", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in '{}'", path.display()))
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(backend) = overrides.backend {
            self.database.backend = backend;
        }
        if let Some(db) = overrides.db {
            self.database.connection = db;
        }
        if let Some(secs) = overrides.store_timeout_secs {
            self.store_timeout_secs = secs;
        }
        if overrides.log_level.is_some() {
            self.log_level = overrides.log_level;
        }
        self
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig {
            backend: self.database.backend.clone(),
            connection_string: self.database.connection.clone(),
        }
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            store_timeout: Duration::from_secs(self.store_timeout_secs.max(1)),
        }
    }
}

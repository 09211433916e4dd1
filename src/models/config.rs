use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::utils::error::ConfigError;

/// One resolution tier definition: a fixed-capacity ring of historical
/// samples spaced `spacing_secs` apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    /// Human-readable tier name used in logs and reports
    pub name: String,

    /// Seconds between samples once the tier is full
    pub spacing_secs: u64,

    /// Maximum number of samples the tier retains
    pub capacity: usize,
}

/// Application configuration. Owned by the caller, read-only to the
/// accounting engine after validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Network interface to capture from
    pub interface: Option<String>,

    /// BPF filter expression applied to the capture
    pub filter: Option<String>,

    /// Enable promiscuous mode
    pub promiscuous: bool,

    /// Port for the REST reporting API
    pub port: u16,

    /// Sampling interval in seconds
    pub interval_secs: u64,

    /// Number of intervals to skip between expensive report generations
    pub skip_intervals: u64,

    /// Include subnets (CIDR). Empty means all addresses are included.
    pub subnets: Vec<String>,

    /// Exclude subnets (CIDR); exclusion overrides inclusion
    pub not_subnets: Vec<String>,

    /// Subnets whose host pairs are tracked (CIDR); pair accounting is
    /// opt-in and independent of host-level inclusion
    pub txrx_subnets: Vec<String>,

    /// Resolution tiers, finest first. Empty means the built-in defaults.
    pub tiers: Vec<TierConfig>,

    /// Path of the SQLite database to persist interval snapshots to
    pub sqlite_path: Option<PathBuf>,

    /// Directory to write per-day CSV snapshot files to
    pub csv_dir: Option<PathBuf>,

    /// Path the CDF report is written to every `skip_intervals + 1` cycles
    pub cdf_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            interface: None,
            filter: None,
            promiscuous: false,
            port: 3000,
            interval_secs: 200,
            skip_intervals: 0,
            subnets: Vec::new(),
            not_subnets: Vec::new(),
            txrx_subnets: Vec::new(),
            tiers: Vec::new(),
            sqlite_path: None,
            csv_dir: None,
            cdf_path: None,
        }
    }
}

impl AppConfig {
    /// Built-in tiers: roughly two days of fine samples, two weeks of
    /// hourly samples, and a year of half-day samples.
    pub fn default_tiers(interval_secs: u64) -> Vec<TierConfig> {
        vec![
            TierConfig {
                name: "recent".to_string(),
                spacing_secs: interval_secs,
                capacity: 864,
            },
            TierConfig {
                name: "hourly".to_string(),
                spacing_secs: 3600,
                capacity: 336,
            },
            TierConfig {
                name: "half-daily".to_string(),
                spacing_secs: 43200,
                capacity: 730,
            },
        ]
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: AppConfig = toml_edit::de::from_str(&text)?;
        Ok(config)
    }

    /// The configured tiers, or the built-in defaults when none are set
    pub fn effective_tiers(&self) -> Vec<TierConfig> {
        if self.tiers.is_empty() {
            Self::default_tiers(self.interval_secs)
        } else {
            self.tiers.clone()
        }
    }

    /// Validate the configuration contract. Violations are fatal at
    /// startup; subnet rules are validated separately when the matcher
    /// tables are built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        let tiers = self.effective_tiers();
        if tiers.is_empty() {
            return Err(ConfigError::EmptyTiers);
        }
        for tier in &tiers {
            if tier.capacity == 0 {
                return Err(ConfigError::ZeroCapacity(tier.name.clone()));
            }
            if tier.spacing_secs == 0 {
                return Err(ConfigError::ZeroSpacing(tier.name.clone()));
            }
        }
        Ok(())
    }
}

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::processor::DashboardError;

/// Dashboard settings, read from a TOML file. Every key is optional.
///
/// ```toml
/// data_path = "data/superstore.csv"
/// top_n = 10
/// cache_capacity = 128
/// parallel_aggregates = true
/// log_level = "debug"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardConfig {
    /// CSV or workbook to load
    pub data_path: Option<PathBuf>,
    /// Worksheet to read; the first sheet when unset
    pub sheet: Option<String>,
    /// Rows kept by the top-N tables
    pub top_n: usize,
    /// Snapshots remembered per session
    pub cache_capacity: usize,
    /// Spread aggregations over the rayon pool
    pub parallel_aggregates: bool,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            data_path: None,
            sheet: None,
            top_n: 10,
            cache_capacity: 128,
            parallel_aggregates: false,
            log_level: "info".to_string(),
        }
    }
}

impl DashboardConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, DashboardError> {
        Ok(toml::from_str(contents)?)
    }

    /// Reads a config file. A relative `data_path` is resolved against the
    /// directory holding the file.
    pub fn from_file(path: &Path) -> Result<Self, DashboardError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&contents)?;

        if let (Some(data), Some(dir)) = (&config.data_path, path.parent()) {
            if data.is_relative() {
                config.data_path = Some(dir.join(data));
            }
        }

        tracing::info!("Loaded config from: {}", path.display());
        Ok(config)
    }
}

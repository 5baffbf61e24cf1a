//! Configuration loading from TOML files

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global configuration for tabpool
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub limits: LimitsConfig,
    pub search: SearchConfig,
    pub pacing: PacingConfig,
    pub storage: StorageConfig,
    pub registry: RegistryConfig,
}

/// Acceptance and shape bounds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Global cap on accepted files across the whole run.
    pub max_total_files: usize,
    pub min_rows: usize,
    pub max_rows: usize,
    pub min_cols: usize,
    /// Maximum files kept per dataset.
    pub per_dataset_cap: usize,
    /// Maximum tabular entries inspected per archive.
    pub scan_cap: usize,
    /// Pre-check ceiling on dataset size.
    pub max_dataset_mb: f64,
    /// Download datasets whose size could not be determined.
    pub allow_unknown_size: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_total_files: 8000,
            min_rows: 300,
            max_rows: 50_000,
            min_cols: 4,
            per_dataset_cap: 5,
            scan_cap: 200,
            max_dataset_mb: 2048.0,
            allow_unknown_size: true,
        }
    }
}

impl LimitsConfig {
    /// The curator's view of these bounds.
    pub fn curation(&self) -> tabpool_core::CurationLimits {
        tabpool_core::CurationLimits {
            min_rows: self.min_rows,
            max_rows: self.max_rows,
            min_cols: self.min_cols,
            per_dataset_cap: self.per_dataset_cap,
            scan_cap: self.scan_cap,
            ..tabpool_core::CurationLimits::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub keywords: Vec<String>,
    pub pages_per_keyword: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let keywords = [
            "csv",
            "tabular",
            "dataset",
            "business",
            "finance",
            "sales",
            "marketing",
            "education",
            "university",
            "students",
            "sports",
            "football",
            "basketball",
            "movies",
            "film",
            "imdb",
            "health",
            "medical",
            "government",
            "census",
            "technology",
            "startup",
            "traffic",
            "transportation",
            "climate",
            "energy",
            "retail",
            "consumer",
            "real estate",
            "housing",
        ];
        Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            pages_per_keyword: 50,
        }
    }
}

/// Inter-request pacing, to stay under the registry's rate limits.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub base_sleep_secs: f64,
    pub jitter_secs: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            base_sleep_secs: 0.6,
            jitter_secs: 0.6,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub base_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./pool"),
        }
    }
}

impl StorageConfig {
    /// Staging area for downloaded archives and metadata scratch files.
    pub fn raw_dir(&self) -> PathBuf {
        self.base_dir.join("raw_datasets")
    }

    /// Permanent home of accepted files.
    pub fn output_dir(&self) -> PathBuf {
        self.base_dir.join("all_csv")
    }

    pub fn index_path(&self) -> PathBuf {
        self.base_dir.join("index.csv")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Name or path of the registry's command-line client.
    pub binary: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            binary: "kaggle".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./tabpool.toml (current directory)
    /// 2. ~/.config/tabpool/config.toml
    ///
    /// If no config file is found, returns the default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("tabpool.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "tabpool") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.limits.max_total_files, 8000);
        assert_eq!(config.limits.min_rows, 300);
        assert_eq!(config.limits.min_cols, 4);
        assert_eq!(config.search.pages_per_keyword, 50);
        assert!(config.search.keywords.contains(&"finance".to_string()));
        assert_eq!(config.registry.binary, "kaggle");
    }

    #[test]
    fn storage_paths_hang_off_base_dir() {
        let storage = StorageConfig {
            base_dir: PathBuf::from("/data/pool"),
        };
        assert_eq!(storage.raw_dir(), PathBuf::from("/data/pool/raw_datasets"));
        assert_eq!(storage.output_dir(), PathBuf::from("/data/pool/all_csv"));
        assert_eq!(storage.index_path(), PathBuf::from("/data/pool/index.csv"));
    }

    #[test]
    fn curation_limits_carry_the_bounds() {
        let limits = LimitsConfig::default().curation();
        assert_eq!(limits.min_rows, 300);
        assert_eq!(limits.max_rows, 50_000);
        assert_eq!(limits.per_dataset_cap, 5);
        assert_eq!(limits.group_cap, 20);
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
[limits]
max_total_files = 100
min_rows = 10

[search]
keywords = ["weather"]
pages_per_keyword = 2

[storage]
base_dir = "/tmp/pool"

[registry]
binary = "/opt/kaggle/bin/kaggle"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.limits.max_total_files, 100);
        assert_eq!(config.limits.min_rows, 10);
        // Untouched fields keep their defaults.
        assert_eq!(config.limits.max_rows, 50_000);
        assert_eq!(config.search.keywords, vec!["weather"]);
        assert_eq!(config.storage.base_dir, PathBuf::from("/tmp/pool"));
        assert_eq!(config.registry.binary, "/opt/kaggle/bin/kaggle");
    }
}

//! Configuration for the analysis infrastructure.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration, loaded from the file passed on the command line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Analysis configuration
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Progress reporting configuration
    #[serde(default)]
    pub progress: ProgressConfig,
}

/// Analysis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Root of the product-line source tree to analyze
    #[serde(default = "default_source_tree")]
    pub source_tree: PathBuf,

    /// Number of pipeline workers classifying artifacts concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Directory receiving archived analysis summaries
    #[serde(default)]
    pub archive_dir: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            source_tree: default_source_tree(),
            workers: default_workers(),
            archive_dir: None,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address as HOST::PORT (default: 127.0.0.1::3141)
    #[serde(default)]
    pub address: Option<String>,
}

/// Progress reporting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Progress reporting interval in seconds
    #[serde(default = "default_progress_interval")]
    pub interval_secs: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_progress_interval(),
        }
    }
}

fn default_source_tree() -> PathBuf {
    PathBuf::from(".")
}
fn default_workers() -> usize {
    4
}
fn default_progress_interval() -> u64 {
    30
}

impl Config {
    /// Load configuration from a YAML or JSON file.
    /// Format is auto-detected from file extension (.yaml, .yml, or .json).
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => {
                // Try YAML first (it's a superset of JSON)
                serde_yaml::from_str(&contents)?
            }
        };
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.analysis.workers == 0 {
            anyhow::bail!("Worker count must be > 0");
        }
        if self.progress.interval_secs == 0 {
            anyhow::bail!("Progress interval must be > 0 seconds");
        }
        if let Some(address) = &self.server.address {
            address.parse::<crate::net::Address>()?;
        }
        Ok(())
    }
}

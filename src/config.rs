// ⚙️ Configuration
// Everything the toolkit needs from the outside world, passed in explicitly.
// There is no built-in database location: the caller always supplies one.

use crate::changes::{parse_windows, DEFAULT_WINDOWS};
use crate::error::{PpiError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const BLS_METADATA_URL: &str = "https://download.bls.gov/pub/time.series/wp/wp.series";
pub const BLS_DATA_URL: &str = "https://download.bls.gov/pub/time.series/wp/wp.data.0.Current";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file
    pub db_path: Option<PathBuf>,

    /// wp.series location
    pub metadata_url: String,

    /// wp.data.* location
    pub data_url: String,

    /// BLS rejects anonymous clients; use a contact address
    pub user_agent: String,

    /// HTTP timeout for each download
    pub timeout_secs: u64,

    /// Lookback windows in months
    pub windows: Vec<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: None,
            metadata_url: BLS_METADATA_URL.to_string(),
            data_url: BLS_DATA_URL.to_string(),
            user_agent: String::new(),
            timeout_secs: 120,
            windows: DEFAULT_WINDOWS.to_vec(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file. Missing keys take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            PpiError::Config(format!("Failed to read config file {:?}: {}", path.as_ref(), e))
        })?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| PpiError::Config(format!("Failed to parse config JSON: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn with_db_path<P: Into<PathBuf>>(mut self, db_path: P) -> Self {
        self.db_path = Some(db_path.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    /// Database path, or a Config error when none was supplied
    pub fn require_db_path(&self) -> Result<&Path> {
        self.db_path
            .as_deref()
            .ok_or_else(|| PpiError::Config("no database path configured".to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        parse_windows(&self.windows)?;

        if self.timeout_secs == 0 {
            return Err(PpiError::Config("timeout_secs must be positive".to_string()));
        }

        Ok(())
    }
}

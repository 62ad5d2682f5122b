//! Settings storage
//!
//! Stores service and batch configuration in a JSON file in the user data
//! directory. Every field has a default, so a missing or partial file is fine.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "cdi-engine";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Root of the EuropePMC REST API
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Edges requested per page from the references/citations endpoints
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Save the working table after this many articles
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
    /// Pause between date lookups when back-filling publication dates
    #[serde(default = "default_date_fill_delay_ms")]
    pub date_fill_delay_ms: u64,
    /// Working table, rewritten at every checkpoint
    #[serde(default = "default_input_path")]
    pub input_path: PathBuf,
    /// Final table with derived year/month columns
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
}

fn default_base_url() -> String {
    "https://www.ebi.ac.uk/europepmc/webservices/rest/".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("cdi-engine/{}", env!("CARGO_PKG_VERSION"))
}

fn default_page_size() -> u32 {
    1000
}

fn default_checkpoint_every() -> usize {
    100
}

fn default_date_fill_delay_ms() -> u64 {
    100
}

fn default_input_path() -> PathBuf {
    PathBuf::from("data/dat_sofar.csv")
}

fn default_output_path() -> PathBuf {
    PathBuf::from("output/dat_toplot.csv")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            page_size: default_page_size(),
            checkpoint_every: default_checkpoint_every(),
            date_fill_delay_ms: default_date_fill_delay_ms(),
            input_path: default_input_path(),
            output_path: default_output_path(),
        }
    }
}

impl Settings {
    /// `{data_dir}/cdi-engine/settings.json`, or `./settings.json` without a data dir
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .map(|p| p.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("settings.json")
    }

    /// Load settings from disk or fall back to defaults
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Settings::default();
        }
        match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), "ignoring unreadable settings: {}", e);
                Settings::default()
            }),
            Err(_) => Settings::default(),
        }
    }

    /// Save settings to disk
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(path, content)
            .map_err(|e| format!("Failed to write settings: {}", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("nope.json"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.checkpoint_every, 100);
        assert!(settings.base_url.ends_with("/rest/"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"checkpoint_every": 25, "timeout_secs": 5}"#).unwrap();

        let settings = Settings::load(&path);
        assert_eq!(settings.checkpoint_every, 25);
        assert_eq!(settings.timeout_secs, 5);
        assert_eq!(settings.page_size, 1000);
        assert_eq!(settings.output_path, PathBuf::from("output/dat_toplot.csv"));
    }

    #[test]
    fn test_corrupt_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(Settings::load(&path), Settings::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings {
            date_fill_delay_ms: 250,
            ..Settings::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path), settings);
    }
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub spreadsheet: Option<SpreadsheetConfig>,
    pub server: ServerConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Source workbook for ingestion.
#[derive(Debug, Deserialize, Clone)]
pub struct SpreadsheetConfig {
    /// `http(s)://` export link or `file://` path of an `.xlsx` workbook.
    pub url: String,
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

/// Outbound notification sent after a project is created.
#[derive(Debug, Deserialize, Clone)]
pub struct NotifyConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_notify_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_notify_timeout_secs(),
        }
    }
}

fn default_notify_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            final_limit: default_final_limit(),
        }
    }
}

fn default_final_limit() -> usize {
    20
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate spreadsheet source
    if let Some(sheet) = &config.spreadsheet {
        if sheet.url.trim().is_empty() {
            anyhow::bail!("spreadsheet.url must not be empty");
        }
        match sheet.url.split_once("://").map(|(scheme, _)| scheme) {
            Some("http") | Some("https") | Some("file") => {}
            _ => anyhow::bail!(
                "spreadsheet.url must start with http://, https:// or file:// (got '{}')",
                sheet.url
            ),
        }
        if sheet.timeout_secs == 0 {
            anyhow::bail!("spreadsheet.timeout_secs must be > 0");
        }
    }

    // Validate notify
    if config.notify.timeout_secs == 0 {
        anyhow::bail!("notify.timeout_secs must be > 0");
    }

    // Validate retrieval
    if config.retrieval.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }

    Ok(config)
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use tally_core::SignPolicy;
use tally_engine::EngineSettings;
use tally_import::Categorizer;

pub const DEFAULT_BIND: &str = "127.0.0.1:5001";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const CONFIG_FILE: &str = "tally.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CategorizationConfig {
    pub rules_file: Option<PathBuf>,
    pub fuzzy_threshold: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub default_sign_policy: SignPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind: String,
    pub data_dir: Option<PathBuf>,
    /// Defaults to `<data_dir>/tally.db`.
    pub database: Option<PathBuf>,
    pub max_upload_bytes: usize,
    pub log_format: LogFormat,
    pub categorization: CategorizationConfig,
    pub import: ImportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            data_dir: None,
            database: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            log_format: LogFormat::default(),
            categorization: CategorizationConfig::default(),
            import: ImportConfig::default(),
        }
    }
}

impl Config {
    /// Reads `$TALLY_CONFIG`, else `./tally.toml` if present, then applies
    /// `TALLY_BIND` / `TALLY_DATA_DIR` overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os("TALLY_CONFIG")
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from(CONFIG_FILE)).filter(|p| p.exists()));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bind) = lookup("TALLY_BIND").filter(|v| !v.is_empty()) {
            self.bind = bind;
        }
        if let Some(dir) = lookup("TALLY_DATA_DIR").filter(|v| !v.is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("com", "tally", "Tally")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from("data"))
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.data_dir().join("tally.db"))
    }

    pub fn engine_settings(&self) -> Result<EngineSettings> {
        let categorizer = match &self.categorization.rules_file {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read rules file {}", path.display()))?;
                Categorizer::from_toml(&content)
                    .with_context(|| format!("Invalid rules file {}", path.display()))?
            }
            None => Categorizer::default(),
        };
        let categorizer = match self.categorization.fuzzy_threshold {
            Some(threshold) if (0.0..=100.0).contains(&threshold) => {
                categorizer.with_fuzzy_threshold(threshold)
            }
            Some(threshold) => anyhow::bail!("fuzzy_threshold must be within 0..=100, got {threshold}"),
            None => categorizer,
        };

        Ok(EngineSettings {
            categorizer,
            default_sign_policy: self.import.default_sign_policy,
        })
    }
}

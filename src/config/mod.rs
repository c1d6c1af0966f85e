use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CLUSTER_URL: &str = "http://127.0.0.1:8080";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub cluster_url: String,
    pub database_url: String,
    pub request_timeout_secs: u64,
    /// Where migration reports are written.
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let database_url = crate::paths::data_dir()
            .map(|dir| format!("sqlite:{}", dir.join("dmt.db").display()))
            .unwrap_or_else(|_| "sqlite:dmt.db".to_string());
        Self {
            cluster_url: DEFAULT_CLUSTER_URL.to_string(),
            database_url,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            output_dir: PathBuf::from("."),
        }
    }
}

/// Values given on the command line; they win over every other source.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub cluster_url: Option<String>,
    pub database_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::load(ConfigOverrides::default())
    }

    pub fn load(overrides: ConfigOverrides) -> Result<Self> {
        let mut config = Self::default();

        if let Some(file_config) = Self::from_conf_file()? {
            config.apply_file(file_config);
        }

        if let Ok(url) = std::env::var("DMT_CLUSTER_URL") {
            config.cluster_url = url;
        }

        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            config.database_url = db_url;
        }

        if let Ok(secs) = std::env::var("DMT_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = secs.parse().unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        }

        if let Ok(dir) = std::env::var("DMT_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }

        config.finish(overrides, &crate::paths::install_root()?)
    }

    /// Applies command-line values, then normalises and validates the result.
    fn finish(mut self, overrides: ConfigOverrides, root: &Path) -> Result<Self> {
        self.apply_overrides(overrides);
        self.database_url = normalize_sqlite_url(&self.database_url, root)?;
        self.validate()?;
        Ok(self)
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(cluster_url) = overrides.cluster_url {
            self.cluster_url = cluster_url;
        }
        if let Some(database_url) = overrides.database_url {
            self.database_url = database_url;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn from_conf_file() -> Result<Option<FileConfig>> {
        let path = crate::paths::conf_dir()?.join("config.json");
        if !path.is_file() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let file_config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(Some(file_config))
    }

    fn apply_file(&mut self, file_config: FileConfig) {
        if let Some(cluster_url) = file_config.cluster_url {
            self.cluster_url = cluster_url;
        }
        if let Some(database_url) = file_config.database_url {
            self.database_url = database_url;
        }
        if let Some(secs) = file_config.request_timeout_secs {
            self.request_timeout_secs = secs;
        }
        if let Some(output_dir) = file_config.output_dir {
            self.output_dir = PathBuf::from(output_dir);
        }
    }

    fn validate(&self) -> Result<()> {
        let url = self.cluster_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("cluster_url must be an http(s) URL: {}", self.cluster_url);
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request timeout must be at least one second");
        }
        Ok(())
    }
}

/// Resolves a relative SQLite path against `root`, refusing paths that leave it.
fn normalize_sqlite_url(database_url: &str, root: &Path) -> Result<String> {
    let Some(path_str) = database_url.strip_prefix("sqlite:") else {
        return Ok(database_url.to_string());
    };

    let path = Path::new(path_str);

    if path.is_absolute() {
        if !path.starts_with(root) {
            anyhow::bail!(
                "SQLite database path must be under install root: {}",
                root.display()
            );
        }
        return Ok(database_url.to_string());
    }

    if path
        .components()
        .any(|component| matches!(component, std::path::Component::ParentDir))
    {
        anyhow::bail!("SQLite database path cannot contain '..'");
    }

    Ok(format!("sqlite:{}", root.join(path).display()))
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    cluster_url: Option<String>,
    database_url: Option<String>,
    request_timeout_secs: Option<u64>,
    output_dir: Option<String>,
}

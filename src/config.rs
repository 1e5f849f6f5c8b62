//! Configuration file handling for Zenith.
//!
//! The configuration file is stored at `$ZENITH_HOME/config.json` and carries
//! the hosted backend's project URL and anon API key, plus the dashboard's
//! monthly-income setting and an optional cache directory override.

use crate::cache::Cache;
use crate::model::Amount;
use crate::store::RestStore;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

const APP_NAME: &str = "zenith";
const CONFIG_VERSION: u8 = 1;
const CONFIG_JSON: &str = "config.json";

/// The serialized shape of `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    app_name: String,
    config_version: u8,
    /// Base URL of the hosted backend project, e.g.
    /// `https://abcdefgh.example.co/`.
    project_url: String,
    /// The project's anon API key.
    api_key: String,
    /// Income the dashboard measures monthly spend against.
    #[serde(default = "default_monthly_income")]
    monthly_income: Amount,
    /// Overrides where the best-effort expense cache lives.
    #[serde(default)]
    cache_dir: Option<PathBuf>,
}

fn default_monthly_income() -> Amount {
    Amount::from(15_000)
}

/// The `Config` object represents the configuration of the app. Instantiate
/// it by providing the path to `$ZENITH_HOME` and from there it loads
/// `$ZENITH_HOME/config.json`.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    project_url: Url,
}

impl Config {
    /// Creates the home directory and an initial `config.json` inside it.
    ///
    /// # Errors
    ///
    /// - Returns an error if `project_url` is not a valid URL.
    /// - Returns an error if any file operation fails.
    pub async fn create(
        dir: impl Into<PathBuf>,
        project_url: &str,
        api_key: &str,
    ) -> anyhow::Result<Self> {
        let root = dir.into();
        tokio::fs::create_dir_all(&root)
            .await
            .context("Unable to create the zenith home directory")?;

        let project_url: Url = project_url
            .parse()
            .with_context(|| format!("Invalid project URL '{project_url}'"))?;

        let config_file = ConfigFile {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            project_url: project_url.to_string(),
            api_key: api_key.to_string(),
            monthly_income: default_monthly_income(),
            cache_dir: None,
        };
        let config_path = root.join(CONFIG_JSON);
        let json = serde_json::to_string_pretty(&config_file)
            .context("Unable to serialize the config file")?;
        tokio::fs::write(&config_path, json)
            .await
            .with_context(|| format!("Unable to write {}", config_path.display()))?;

        Ok(Self {
            root,
            config_path,
            config_file,
            project_url,
        })
    }

    /// Loads and validates `$ZENITH_HOME/config.json`.
    pub async fn load(home: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = home.into();
        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let content = tokio::fs::read_to_string(&config_path)
            .await
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config_file: ConfigFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;
        let project_url: Url = config_file
            .project_url
            .parse()
            .with_context(|| format!("Invalid project URL '{}'", config_file.project_url))?;

        Ok(Self {
            root,
            config_path,
            config_file,
            project_url,
        })
    }

    /// The default home directory, `zenith` under the platform config dir.
    pub fn default_home() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_NAME))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn project_url(&self) -> &Url {
        &self.project_url
    }

    pub fn api_key(&self) -> &str {
        &self.config_file.api_key
    }

    pub fn monthly_income(&self) -> Amount {
        self.config_file.monthly_income
    }

    /// The expense cache, in the configured directory or the home directory.
    pub fn cache(&self) -> Cache {
        match &self.config_file.cache_dir {
            Some(dir) => Cache::new(dir),
            None => Cache::new(&self.root),
        }
    }

    /// Builds the hosted-backend store this config points at.
    pub fn store(&self) -> crate::Result<RestStore> {
        RestStore::new(&self.project_url, self.api_key())
    }
}

//! Configuration loader and validator for the publish pipeline.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub app: App,
    pub publish: Publish,
    pub revalidation: Revalidation,
    #[serde(default)]
    pub indexing: Indexing,
}

/// Site and process settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    /// Public base URL of the content site; revalidation and canonical page
    /// URLs are built from it.
    #[serde(default = "App::default_base_url")]
    pub base_url: String,
    #[serde(default = "App::default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "App::default_database_url")]
    pub database_url: String,
}

/// Invocation guard and batch selection.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Publish {
    pub cron_secret: String,
    #[serde(default = "Publish::default_batch_limit")]
    pub batch_limit: u32,
    #[serde(default = "Publish::default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

/// Cache revalidation endpoint of the content site.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Revalidation {
    pub secret: String,
    #[serde(default = "Revalidation::default_path")]
    pub path: String,
    #[serde(default = "default_call_timeout_ms")]
    pub timeout_ms: u64,
}

/// Search indexing notifications. The stage is disabled unless
/// `service_account_json` carries a credential document.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Indexing {
    #[serde(default)]
    pub service_account_json: Option<String>,
    #[serde(default = "Indexing::default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default = "default_call_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "Indexing::default_page_path")]
    pub page_path: String,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub publish_url: Option<String>,
}

fn default_call_timeout_ms() -> u64 {
    5_000
}

impl App {
    fn default_base_url() -> String {
        "http://localhost:3000".into()
    }

    fn default_listen_addr() -> String {
        "127.0.0.1:8080".into()
    }

    fn default_database_url() -> String {
        "sqlite://./data/content.db".into()
    }
}

impl Default for App {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            listen_addr: Self::default_listen_addr(),
            database_url: Self::default_database_url(),
        }
    }
}

impl Publish {
    fn default_batch_limit() -> u32 {
        100
    }

    fn default_store_timeout_ms() -> u64 {
        5_000
    }
}

impl Revalidation {
    fn default_path() -> String {
        "api/revalidate".into()
    }
}

impl Indexing {
    fn default_pacing_ms() -> u64 {
        150
    }

    fn default_page_path() -> String {
        "ideas".into()
    }

    /// The credential document, if one is configured and non-blank.
    pub fn credential(&self) -> Option<&str> {
        self.service_account_json
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

impl Default for Indexing {
    fn default() -> Self {
        Self {
            service_account_json: None,
            pacing_ms: Self::default_pacing_ms(),
            timeout_ms: default_call_timeout_ms(),
            page_path: Self::default_page_path(),
            token_url: None,
            publish_url: None,
        }
    }
}

/// Values the orchestrator needs at run time, resolved once at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub cron_secret: String,
    pub batch_limit: u32,
    pub store_timeout: Duration,
}

impl std::fmt::Debug for PipelineSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineSettings")
            .field("batch_limit", &self.batch_limit)
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for Publish {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publish")
            .field("batch_limit", &self.batch_limit)
            .field("store_timeout_ms", &self.store_timeout_ms)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for Revalidation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Revalidation")
            .field("path", &self.path)
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for Indexing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexing")
            .field("enabled", &self.credential().is_some())
            .field("pacing_ms", &self.pacing_ms)
            .field("timeout_ms", &self.timeout_ms)
            .field("page_path", &self.page_path)
            .field("token_url", &self.token_url)
            .field("publish_url", &self.publish_url)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            cron_secret: self.publish.cron_secret.clone(),
            batch_limit: self.publish.batch_limit,
            store_timeout: Duration::from_millis(self.publish.store_timeout_ms),
        }
    }

    /// Apply deployment overrides. `lookup` is normally `std::env::var(..).ok()`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DATABASE_URL") {
            self.app.database_url = v;
        }
        if let Some(v) = get("APP_BASE_URL").or_else(|| get("NEXT_PUBLIC_APP_URL")) {
            self.app.base_url = v;
        }
        if let Some(v) = get("CRON_SECRET") {
            self.publish.cron_secret = v;
        }
        if let Some(v) = get("REVALIDATION_SECRET") {
            self.revalidation.secret = v;
        }
        if let Some(v) = get("GOOGLE_SERVICE_ACCOUNT_JSON") {
            self.indexing.service_account_json = Some(v);
        }
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Load, apply overrides from the process environment, then validate.
pub fn load_with_env(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_overrides(|key| std::env::var(key).ok());
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    let base = cfg.app.base_url.trim();
    if base.is_empty() {
        return Err(ConfigError::Invalid("app.base_url must be non-empty"));
    }
    if reqwest::Url::parse(base).is_err() {
        return Err(ConfigError::Invalid("app.base_url must be an absolute URL"));
    }
    if cfg.app.listen_addr.trim().is_empty() {
        return Err(ConfigError::Invalid("app.listen_addr must be non-empty"));
    }
    if cfg.app.database_url.trim().is_empty() {
        return Err(ConfigError::Invalid("app.database_url must be non-empty"));
    }

    if cfg.publish.cron_secret.trim().is_empty() {
        return Err(ConfigError::Invalid("publish.cron_secret must be non-empty"));
    }
    if cfg.publish.batch_limit == 0 || cfg.publish.batch_limit > 1000 {
        return Err(ConfigError::Invalid("publish.batch_limit must be in 1..=1000"));
    }
    if cfg.publish.store_timeout_ms == 0 {
        return Err(ConfigError::Invalid("publish.store_timeout_ms must be > 0"));
    }

    if cfg.revalidation.secret.trim().is_empty() {
        return Err(ConfigError::Invalid("revalidation.secret must be non-empty"));
    }
    if cfg.revalidation.timeout_ms == 0 {
        return Err(ConfigError::Invalid("revalidation.timeout_ms must be > 0"));
    }

    if cfg.indexing.timeout_ms == 0 {
        return Err(ConfigError::Invalid("indexing.timeout_ms must be > 0"));
    }
    if cfg.indexing.page_path.trim().is_empty() {
        return Err(ConfigError::Invalid("indexing.page_path must be non-empty"));
    }
    // pacing_ms = 0 is allowed and disables pacing.

    Ok(())
}

/// Example configuration with every recognised key.
pub fn example() -> &'static str {
    r#"app:
  base_url: "https://valifye.com"
  listen_addr: "127.0.0.1:8080"
  database_url: "sqlite://./data/content.db"

publish:
  cron_secret: "YOUR_CRON_SECRET"
  batch_limit: 100
  store_timeout_ms: 5000

revalidation:
  secret: "YOUR_REVALIDATION_SECRET"
  path: "api/revalidate"
  timeout_ms: 5000

indexing:
  # Paste the service account JSON here (or set GOOGLE_SERVICE_ACCOUNT_JSON)
  # to enable indexing notifications.
  service_account_json: null
  pacing_ms: 150
  timeout_ms: 5000
  page_path: "ideas"
"#
}

//! Configuration loader and validator for the release watcher.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::dispatch::RetryPolicy;
use crate::resolver::{FetchPolicy, ResolverOptions, TagFallback};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub github: Github,
    #[serde(default)]
    pub scan: Scan,
    pub email: Email,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub scratch_dir: String,
}

/// GitHub API settings and the organizations to watch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Github {
    pub token: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub orgs: Vec<String>,
    #[serde(default = "default_github_timeout")]
    pub timeout_seconds: u64,
}

/// Discovery pipeline knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Scan {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_window_hours")]
    pub window_hours: u64,
    #[serde(default = "default_clone_threshold")]
    pub clone_threshold: usize,
    #[serde(default = "default_clone_timeout")]
    pub clone_timeout_seconds: u64,
    #[serde(default)]
    pub tag_fallback: TagFallback,
    #[serde(default)]
    pub on_fetch_error: FetchPolicy,
}

/// SMTP relay and recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Email {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub receiver: String,
    #[serde(default = "default_email_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub retry: Retry,
}

/// Delivery retry settings. `max_attempts: null` retries forever.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Retry {
    pub backoff_ms: u64,
    pub max_attempts: Option<u32>,
}

impl Default for Scan {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            window_hours: default_window_hours(),
            clone_threshold: default_clone_threshold(),
            clone_timeout_seconds: default_clone_timeout(),
            tag_fallback: TagFallback::default(),
            on_fetch_error: FetchPolicy::default(),
        }
    }
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            backoff_ms: 1000,
            max_attempts: Some(10),
        }
    }
}

/// Ten years.
const MAX_WINDOW_HOURS: u64 = 24 * 365 * 10;

fn default_api_base() -> String {
    "https://api.github.com/".into()
}

fn default_github_timeout() -> u64 {
    30
}

fn default_workers() -> usize {
    16
}

fn default_window_hours() -> u64 {
    24
}

fn default_clone_threshold() -> usize {
    100
}

fn default_clone_timeout() -> u64 {
    600
}

fn default_smtp_port() -> u16 {
    465
}

fn default_email_timeout() -> u64 {
    10
}

impl Config {
    /// Ensure required directories exist (creates `app.scratch_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        fs::create_dir_all(&self.app.scratch_dir)
    }

    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.scan.window_hours.min(MAX_WINDOW_HOURS) as i64)
    }

    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.scan.clone_timeout_seconds)
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            clone_threshold: self.scan.clone_threshold,
            tag_fallback: self.scan.tag_fallback,
            on_fetch_error: self.scan.on_fetch_error,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            backoff: Duration::from_millis(self.email.retry.backoff_ms),
            max_attempts: self.email.retry.max_attempts,
        }
    }

    /// Secrets may come from the environment instead of the file.
    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            if !token.trim().is_empty() {
                self.github.token = token;
            }
        }
        if let Ok(pass) = std::env::var("EMAIL_PASS") {
            if !pass.trim().is_empty() {
                self.email.pass = pass;
            }
        }
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_env_overrides();
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.scratch_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.scratch_dir must be non-empty"));
    }

    if cfg.github.token.trim().is_empty() {
        return Err(ConfigError::Invalid("github.token must be non-empty"));
    }
    if reqwest::Url::parse(&cfg.github.api_base).is_err() {
        return Err(ConfigError::Invalid("github.api_base must be a valid URL"));
    }
    if cfg.github.orgs.iter().any(|o| o.trim().is_empty()) {
        return Err(ConfigError::Invalid("github.orgs entries must be non-empty"));
    }
    if cfg.github.timeout_seconds == 0 {
        return Err(ConfigError::Invalid("github.timeout_seconds must be > 0"));
    }

    if !(1..=32).contains(&cfg.scan.workers) {
        return Err(ConfigError::Invalid("scan.workers must be between 1 and 32"));
    }
    if cfg.scan.window_hours == 0 || cfg.scan.window_hours > MAX_WINDOW_HOURS {
        return Err(ConfigError::Invalid("scan.window_hours must be between 1 and 87600"));
    }
    if cfg.scan.clone_timeout_seconds == 0 {
        return Err(ConfigError::Invalid("scan.clone_timeout_seconds must be > 0"));
    }

    if cfg.email.host.trim().is_empty() {
        return Err(ConfigError::Invalid("email.host must be non-empty"));
    }
    if cfg.email.user.trim().is_empty() {
        return Err(ConfigError::Invalid("email.user must be non-empty"));
    }
    if cfg.email.receiver.trim().is_empty() {
        return Err(ConfigError::Invalid("email.receiver must be non-empty"));
    }
    if cfg.email.timeout_seconds == 0 {
        return Err(ConfigError::Invalid("email.timeout_seconds must be > 0"));
    }
    if cfg.email.retry.max_attempts == Some(0) {
        return Err(ConfigError::Invalid("email.retry.max_attempts must be > 0 or null"));
    }

    Ok(())
}

/// Returns the example YAML content shipped with the binary.
pub fn example() -> &'static str {
    r#"app:
  scratch_dir: "./scratch"

github:
  token: "YOUR_GITHUB_TOKEN"
  orgs:
    - "rust-lang"
    - "tokio-rs"
  timeout_seconds: 30

scan:
  workers: 16
  window_hours: 24
  clone_threshold: 100
  clone_timeout_seconds: 600
  tag_fallback: when_no_fresh_release
  on_fetch_error: abort

email:
  host: "smtp.example.com"
  port: 465
  user: "bot@example.com"
  pass: "YOUR_SMTP_PASSWORD"
  receiver: "me@example.com"
  timeout_seconds: 10
  retry:
    backoff_ms: 1000
    max_attempts: 10
"#
}

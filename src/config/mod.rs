//! Configuration module for hambot.
//!
//! Loads configuration from environment variables (with `.env` support), or
//! from a JSON file whose path is passed as the first command-line argument.
//! Values missing from the file fall back to the environment.

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{field} is not a valid URL: {source}")]
    InvalidUrl {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Slack credentials.
#[derive(Debug, Clone)]
pub struct SlackConfig {
    /// Bot token (xoxb-...) for Web API calls.
    pub bot_token: String,
    /// App-level token (xapp-...) for Socket Mode.
    pub app_token: String,
}

/// S3 upload settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub region: String,
    pub bucket: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Custom endpoint for S3-compatible stores.
    pub endpoint: Option<String>,
    /// Object key the prompt script is written to.
    pub key: String,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub slack: SlackConfig,
    pub storage: StorageConfig,

    /// Name of the channel announcements are posted to.
    pub ham_base: String,

    /// User name allowed to trigger announcements. Announcing is disabled
    /// when unset.
    pub announcer: Option<String>,

    /// Public URL included in prompt announcements.
    pub hamagrams_url: String,
}

/// On-disk configuration file. Every field is optional so the environment can
/// fill in the gaps.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileConfig {
    slack_token: Option<String>,
    slack_app_token: Option<String>,
    aws_region: Option<String>,
    aws_bucket: Option<String>,
    aws_access_key: Option<String>,
    aws_secret_access_key: Option<String>,
    aws_endpoint: Option<String>,
    upload_key: Option<String>,
    ham_base: Option<String>,
    announcer: Option<String>,
    hamagrams_url: Option<String>,
}

impl FileConfig {
    fn read(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Config {
    /// Load configuration for the running process.
    pub fn load() -> Result<Self, ConfigError> {
        match env::args_os().nth(1) {
            Some(path) => {
                info!("Loading configuration from {}", Path::new(&path).display());
                Self::from_file(Path::new(&path))
            }
            None => {
                info!("Loading configuration from environment");
                Self::from_env()
            }
        }
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(FileConfig::default(), |key| env::var(key).ok())
    }

    /// Load configuration from a JSON file, falling back to the environment.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::resolve(FileConfig::read(path)?, |key| env::var(key).ok())
    }

    fn resolve(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let lookup = |value: Option<String>, key: &str| {
            value.or_else(|| env(key)).filter(|s| !s.trim().is_empty())
        };
        let required = |value: Option<String>, key: &'static str| {
            lookup(value, key).ok_or(ConfigError::Missing(key))
        };

        let endpoint = lookup(file.aws_endpoint, "AWS_ENDPOINT");
        if let Some(endpoint) = &endpoint {
            validate_url("AWS_ENDPOINT", endpoint)?;
        }

        let hamagrams_url = required(file.hamagrams_url, "HAMAGRAMS_URL")?;
        validate_url("HAMAGRAMS_URL", &hamagrams_url)?;

        Ok(Self {
            slack: SlackConfig {
                bot_token: required(file.slack_token, "SLACK_BOT_TOKEN")?,
                app_token: required(file.slack_app_token, "SLACK_APP_TOKEN")?,
            },
            storage: StorageConfig {
                region: lookup(file.aws_region, "AWS_REGION")
                    .unwrap_or_else(|| "us-east-1".to_string()),
                bucket: required(file.aws_bucket, "AWS_BUCKET")?,
                access_key: lookup(file.aws_access_key, "AWS_ACCESS_KEY_ID"),
                secret_key: lookup(file.aws_secret_access_key, "AWS_SECRET_ACCESS_KEY"),
                endpoint,
                key: lookup(file.upload_key, "UPLOAD_KEY")
                    .unwrap_or_else(|| "config.js".to_string()),
            },
            ham_base: lookup(file.ham_base, "HAM_BASE")
                .map(|s| s.trim_start_matches('#').to_string())
                .unwrap_or_else(|| "ham-base".to_string()),
            announcer: lookup(file.announcer, "ANNOUNCER")
                .map(|s| s.trim_start_matches('@').to_string()),
            hamagrams_url,
        })
    }
}

fn validate_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|source| ConfigError::InvalidUrl { field, source })
}

//! Configuration management for the sync agent.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Store identifier used when `LOUNGE_STORE_ID` is unset.
pub const DEFAULT_STORE_ID: &str = "Rush Lounge";
/// Document store base URL used when `LOUNGE_DOCUMENT_URL` is unset.
pub const DEFAULT_DOCUMENT_URL: &str = "http://localhost:3000";

/// Agent configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Name of the shared store on the relay
    pub store_id: String,
    /// Directory holding the local snapshot file
    pub data_dir: PathBuf,
    /// Relay base URL; realtime sync is off when unset
    pub relay_url: Option<String>,
    /// Versioned document store; off when unset
    pub document: Option<DocumentConfig>,
    /// Document store polling interval
    pub poll_interval: Duration,
    /// Use the shorter touch-device activity windows
    pub touch_device: bool,
}

/// Location of and credential for the versioned document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentConfig {
    pub base_url: String,
    pub document_id: String,
    pub token: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let store_id = var("LOUNGE_STORE_ID").unwrap_or_else(|| DEFAULT_STORE_ID.to_string());

        let data_dir = var("LOUNGE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let relay_url = var("LOUNGE_RELAY_URL").map(|url| url.trim_end_matches('/').to_string());

        let document = match (var("LOUNGE_DOCUMENT_ID"), var("LOUNGE_DOCUMENT_TOKEN")) {
            (Some(document_id), Some(token)) => Some(DocumentConfig {
                base_url: var("LOUNGE_DOCUMENT_URL")
                    .unwrap_or_else(|| DEFAULT_DOCUMENT_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                document_id,
                token,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("LOUNGE_DOCUMENT_TOKEN")),
            (None, Some(_)) => return Err(ConfigError::Missing("LOUNGE_DOCUMENT_ID")),
        };

        let poll_secs: u64 = var("LOUNGE_POLL_SECS")
            .unwrap_or_else(|| "30".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPollInterval)?;
        if poll_secs == 0 {
            return Err(ConfigError::InvalidPollInterval);
        }

        let touch_device = match var("LOUNGE_TOUCH_DEVICE").as_deref() {
            None | Some("0") | Some("false") => false,
            Some("1") | Some("true") => true,
            Some(_) => return Err(ConfigError::InvalidFlag("LOUNGE_TOUCH_DEVICE")),
        };

        Ok(Self {
            store_id,
            data_dir,
            relay_url,
            document,
            poll_interval: Duration::from_secs(poll_secs),
            touch_device,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("Invalid LOUNGE_POLL_SECS value")]
    InvalidPollInterval,

    #[error("Invalid {0} value, expected true or false")]
    InvalidFlag(&'static str),
}

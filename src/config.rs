//! Configuration for the listshare client

use std::fmt;
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

pub const ENV_URL: &str = "LISTSHARE_URL";
pub const ENV_PROJECT_ID: &str = "LISTSHARE_PROJECT_ID";
pub const ENV_API_KEY: &str = "LISTSHARE_API_KEY";
pub const ENV_STORAGE_BUCKET: &str = "LISTSHARE_STORAGE_BUCKET";

/// Connection parameters for the remote document store and identity provider.
///
/// All four values are required; initialization fails when any is missing.
#[derive(Clone)]
pub struct StoreConfig {
    pub url: Url,
    pub project_id: String,
    pub api_key: String,
    pub storage_bucket: String,
}

impl StoreConfig {
    pub fn new(url_str: &str, project_id: &str, api_key: &str, storage_bucket: &str) -> Result<Self> {
        let url = Url::parse(url_str).map_err(|e| Error::config(format!("invalid url {url_str:?}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(format!("unsupported url scheme: {}", url.scheme())));
        }
        for (name, value) in [
            ("project_id", project_id),
            ("api_key", api_key),
            ("storage_bucket", storage_bucket),
        ] {
            if value.trim().is_empty() {
                return Err(Error::config(format!("{name} cannot be empty")));
            }
        }
        Ok(Self {
            url,
            project_id: project_id.to_string(),
            api_key: api_key.to_string(),
            storage_bucket: storage_bucket.to_string(),
        })
    }

    /// Read the configuration from `LISTSHARE_*` environment variables,
    /// loading a `.env` file first if one is present.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let config = Self::from_lookup(|name| std::env::var(name).ok())?;
        debug!(url = %config.url, project_id = %config.project_id, "loaded store config from environment");
        Ok(config)
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name).ok_or_else(|| Error::config(format!("{name} environment variable not found")))
        };
        Self::new(
            &var(ENV_URL)?,
            &var(ENV_PROJECT_ID)?,
            &var(ENV_API_KEY)?,
            &var(ENV_STORAGE_BUCKET)?,
        )
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("url", &self.url.as_str())
            .field("project_id", &self.project_id)
            .field("api_key", &"<redacted>")
            .field("storage_bucket", &self.storage_bucket)
            .finish()
    }
}

/// Configuration options for the listshare client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// The request timeout for store and auth calls
    pub request_timeout: Option<Duration>,

    /// How often polling watches re-run their query
    pub poll_interval: Duration,

    /// How many times a grant or task read-modify-write is retried after a
    /// concurrent writer got there first
    pub max_write_retries: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
            poll_interval: Duration::from_secs(2),
            max_write_retries: 5,
        }
    }
}

impl ClientOptions {
    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the watch poll interval
    pub fn with_poll_interval(mut self, value: Duration) -> Self {
        self.poll_interval = value;
        self
    }

    /// Set the write retry budget
    pub fn with_max_write_retries(mut self, value: u32) -> Self {
        self.max_write_retries = value;
        self
    }
}

//! Configuration management.
//!
//! Settings come from an optional TOML file, overridden by environment
//! variables prefixed with `ARXIV_HARVESTER_`, e.g.
//! `ARXIV_HARVESTER_MAX_RETRIES=5`.
//!
//! ```toml
//! base_url = "http://export.arxiv.org/oai2"
//! max_retries = 3
//! min_wait_secs = 10
//! max_wait_secs = 300
//! wait_padding = 1.1
//! user_agent = "my-harvester/1.0"
//! from = "me@example.com"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::HarvestError;
use crate::harvester::FlowControl;
use crate::models::DEFAULT_BASE_URL;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "ARXIV_HARVESTER";

/// File name looked up by [`find_config_file`]
pub const CONFIG_FILE_NAME: &str = "arxiv-oai-harvester.toml";

/// Harvester configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvesterConfig {
    /// Repository base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Retries after the first attempt when the repository asks us to wait
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Minimum spacing between requests, and the floor for retry waits
    #[serde(default = "default_min_wait_secs")]
    pub min_wait_secs: u64,

    /// Longest repository-suggested wait we will honor
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,

    /// Factor applied to suggested waits
    #[serde(default = "default_wait_padding")]
    pub wait_padding: f64,

    /// `User-Agent` header
    #[serde(default)]
    pub user_agent: Option<String>,

    /// `From` header, a contact email address
    #[serde(default)]
    pub from: Option<String>,

    /// Whole-request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Connection timeout
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            max_retries: default_max_retries(),
            min_wait_secs: default_min_wait_secs(),
            max_wait_secs: default_max_wait_secs(),
            wait_padding: default_wait_padding(),
            user_agent: None,
            from: None,
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl HarvesterConfig {
    /// Build the flow-control policy, validating the wait settings
    pub fn flow_control(&self) -> Result<FlowControl, HarvestError> {
        FlowControl::new(
            self.max_retries,
            Duration::from_secs(self.min_wait_secs),
            Duration::from_secs(self.max_wait_secs),
            self.wait_padding,
        )
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_max_retries() -> u32 {
    FlowControl::DEFAULT_MAX_RETRIES
}

fn default_min_wait_secs() -> u64 {
    FlowControl::DEFAULT_MIN_WAIT.as_secs()
}

fn default_max_wait_secs() -> u64 {
    FlowControl::DEFAULT_MAX_WAIT.as_secs()
}

fn default_wait_padding() -> f64 {
    FlowControl::DEFAULT_WAIT_PADDING
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_connect_timeout_secs() -> u64 {
    10
}

/// Load configuration from an optional file plus environment overrides
pub fn load_config(path: Option<&Path>) -> Result<HarvesterConfig, config::ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }

    let settings = builder
        .add_source(config::Environment::with_prefix(ENV_PREFIX))
        .build()?;

    settings.try_deserialize()
}

/// Look for a config file in the working directory, then the user config
/// directory
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("arxiv-oai-harvester").join("config.toml"))
        .filter(|path| path.is_file())
}

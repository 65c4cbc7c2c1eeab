use indexmap::IndexMap;
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use update_center::upstream::DEFAULT_UPSTREAM_URL;
use url::Url;

pub const DEFAULT_PROVIDER: &str = "tsinghua";
pub const DEFAULT_JSON_SERVER: &str = "https://gitlab.com/jenkins-zh/update-center-mirror/raw/master";
pub const DEFAULT_PLUGIN_MIRROR_HOST: &str = "https://mirrors.tuna.tsinghua.edu.cn";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Default provider cannot be empty")]
    EmptyDefaultProvider,

    #[error("Invalid default JSON server: {0}")]
    InvalidJsonServer(String),

    #[error("Plugin path prefix must start with '/': {0}")]
    InvalidPluginPathPrefix(String),

    #[error("Work pool capacity cannot be 0")]
    InvalidWorkPoolCapacity,
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 7070,
        }
    }
}

/// Where plugin binaries are redirected to.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PluginMirror {
    /// Requests under this path are treated as plugin downloads.
    pub path_prefix: String,
    /// Mirror host the request path is appended to.
    pub host: String,
}

impl Default for PluginMirror {
    fn default() -> Self {
        PluginMirror {
            path_prefix: "/jenkins/plugins/".into(),
            host: DEFAULT_PLUGIN_MIRROR_HOST.into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Main listener for update center and plugin requests
    pub listener: Listener,
    /// Optional second listener serving the same routes, for LTS clients
    pub lts_listener: Option<Listener>,
    /// Optional listener for health and readiness probes
    pub admin_listener: Option<Listener>,
    pub default_provider: String,
    pub default_json_server: String,
    /// Known mirror providers. The default provider is always offered too.
    pub providers: Vec<String>,
    /// JSON server alias to base URL, in configuration order.
    pub json_servers: IndexMap<String, String>,
    /// Official update center endpoint versions are resolved against.
    pub upstream_url: Url,
    /// YAML file caching resolved URLs per version
    pub cache_file: PathBuf,
    /// Directory holding one download ledger per year
    pub data_dir: PathBuf,
    pub plugin_mirror: PluginMirror,
    /// Number of queued statistics updates before request handlers wait
    pub work_pool_capacity: usize,
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: Listener::default(),
            lts_listener: None,
            admin_listener: None,
            default_provider: DEFAULT_PROVIDER.into(),
            default_json_server: DEFAULT_JSON_SERVER.into(),
            providers: Vec::new(),
            json_servers: IndexMap::new(),
            upstream_url: Url::parse(DEFAULT_UPSTREAM_URL).expect("default upstream URL is valid"),
            cache_file: "cache.yaml".into(),
            data_dir: "data".into(),
            plugin_mirror: PluginMirror::default(),
            work_pool_capacity: 5,
            metrics: None,
            logging: None,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        if let Some(lts) = &self.lts_listener {
            lts.validate()?;
        }
        if let Some(admin) = &self.admin_listener {
            admin.validate()?;
        }

        if self.default_provider.is_empty() {
            return Err(ValidationError::EmptyDefaultProvider);
        }

        if let Err(e) = Url::parse(&self.default_json_server) {
            return Err(ValidationError::InvalidJsonServer(format!(
                "{}: {e}",
                self.default_json_server
            )));
        }

        if !self.plugin_mirror.path_prefix.starts_with('/') {
            return Err(ValidationError::InvalidPluginPathPrefix(
                self.plugin_mirror.path_prefix.clone(),
            ));
        }

        if self.work_pool_capacity == 0 {
            return Err(ValidationError::InvalidWorkPoolCapacity);
        }

        Ok(())
    }
}

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the configured access token.
pub const TOKEN_ENV_VAR: &str = "TSPULL_ACCESS_TOKEN";

/// Top-level configuration loaded from tspull.toml.
///
/// Immutable once loaded; components borrow the sections they need at
/// construction time.
#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PullerConfig {
    pub api: ApiConfig,
    pub discovery: DiscoveryConfig,
    pub metric: MetricConfig,
    pub replica: ReplicaConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Flow names whose sessions are pulled.
    pub flows: Vec<String>,
    /// Page size for the API discovery variant.
    pub num_sessions: u32,
    /// Trailing window, in hours, for the database discovery variant.
    pub window_hours: i64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MetricConfig {
    /// Time-series key and label category to pull.
    pub category: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct ReplicaConfig {
    /// Postgres connection URL for the replica. Empty disables the
    /// database discovery variant.
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub root: PathBuf,
}

/// Errors from loading the configuration file.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        detail: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, detail } => {
                write!(f, "failed to parse config {}: {}", path.display(), detail)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { .. } => None,
        }
    }
}

impl PullerConfig {
    /// Load configuration from the given TOML file.
    ///
    /// A missing file yields the defaults (everything overridable on the
    /// command line); an unreadable or unparsable file is an error. The
    /// `TSPULL_ACCESS_TOKEN` environment variable, when set, wins over the
    /// token in the file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut cfg = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PullerConfig::default(),
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
            if !token.is_empty() {
                cfg.api.access_token = token;
            }
        }

        Ok(cfg)
    }
}

// --- Default implementations ---

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://meta-api.headspin.io/v0".to_string(),
            access_token: String::new(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            flows: Vec::new(),
            num_sessions: 1,
            window_hours: 3,
        }
    }
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self {
            category: "video_quality_mos".to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("processed_data"),
        }
    }
}

//! Configuration management for gridview.
//!
//! Layered configuration with the following precedence:
//! 1. Command-line arguments (highest priority)
//! 2. Environment variables
//! 3. JSON config file
//! 4. Default values (lowest priority)

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::dataset::engine::is_url;
use crate::dataset::EngineKind;
use crate::error::{Result, ViewerError};

/// Command-line arguments for gridview
#[derive(Parser, Debug)]
#[command(name = "gridview")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Local path or http(s) URL of the dataset to view
    pub dataset: String,

    /// Host address to bind to
    #[arg(short = 'H', long, env = "GRIDVIEW_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "GRIDVIEW_PORT")]
    pub port: Option<u16>,

    /// Number of worker threads
    #[arg(short, long, env = "GRIDVIEW_WORKERS")]
    pub workers: Option<usize>,

    /// Path to JSON configuration file
    #[arg(short, long, env = "GRIDVIEW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "GRIDVIEW_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Storage engines to try, in order (e.g. "zarr,netcdf")
    #[arg(long, env = "GRIDVIEW_ENGINES")]
    pub engines: Option<String>,

    /// Username for the authenticated vendor opener
    #[arg(long, env = "GRIDVIEW_VENDOR_USERNAME")]
    pub vendor_username: Option<String>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads (None = number of CPU cores)
    #[serde(default)]
    pub workers: Option<usize>,

    /// Sessions untouched for this many seconds are dropped
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

/// Authenticated vendor store access
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorConfig {
    /// Registered username; the vendor opener refuses to run without it
    #[serde(default)]
    pub username: Option<String>,

    /// Request header carrying the username
    #[serde(default = "default_username_header")]
    pub username_header: String,

    /// User agent sent to the vendor store
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Dataset access configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Storage engines, tried in order
    #[serde(default = "EngineKind::default_order")]
    pub engines: Vec<EngineKind>,

    #[serde(default)]
    pub vendor: VendorConfig,
}

/// Map rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotConfig {
    /// Image width in pixels
    #[serde(default = "default_plot_width")]
    pub width: u32,

    /// Image height in pixels
    #[serde(default = "default_plot_height")]
    pub height: u32,
}

/// Complete configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub plot: PlotConfig,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources; returns it with the dataset location
    pub fn load() -> Result<(Self, String)> {
        Self::from_args(Args::parse())
    }

    /// Build the configuration from parsed arguments
    pub fn from_args(args: Args) -> Result<(Self, String)> {
        let mut config = Config::default();

        if let Some(config_path) = &args.config {
            let json_config = Self::load_from_file(config_path)?;
            config.merge(json_config);
        }

        if let Some(host) = args.host {
            config.server.host = host;
        }
        if let Some(port) = args.port {
            config.server.port = port;
        }
        if args.workers.is_some() {
            config.server.workers = args.workers;
        }
        if let Some(log_level) = args.log_level {
            config.log_level = log_level;
        }
        if let Some(engines) = &args.engines {
            config.data.engines = EngineKind::parse_list(engines)?;
        }
        if args.vendor_username.is_some() {
            config.data.vendor.username = args.vendor_username;
        }

        Ok((config, args.dataset))
    }

    /// Load configuration from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        self.server.host = other.server.host;
        self.server.port = other.server.port;
        if other.server.workers.is_some() {
            self.server.workers = other.server.workers;
        }
        self.server.session_idle_secs = other.server.session_idle_secs;
        self.data = other.data;
        self.plot = other.plot;
        self.log_level = other.log_level;
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(ViewerError::Config {
                message: "Server host cannot be empty".to_string(),
            });
        }

        if self.server.port == 0 {
            return Err(ViewerError::Config {
                message: "Server port cannot be 0".to_string(),
            });
        }

        if self.server.workers == Some(0) {
            return Err(ViewerError::Config {
                message: "Worker count cannot be 0".to_string(),
            });
        }

        if self.server.session_idle_secs == 0 {
            return Err(ViewerError::Config {
                message: "Session idle timeout cannot be 0".to_string(),
            });
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ViewerError::Config {
                    message: format!(
                        "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                        self.log_level
                    ),
                });
            }
        }

        if self.data.engines.is_empty() {
            return Err(ViewerError::Config {
                message: "At least one storage engine must be configured".to_string(),
            });
        }

        if self.plot.width == 0 || self.plot.height == 0 {
            return Err(ViewerError::Config {
                message: format!(
                    "Plot size must be positive, got {}x{}",
                    self.plot.width, self.plot.height
                ),
            });
        }

        Ok(())
    }
}

/// Local datasets must exist before the server starts; URLs are checked on open
pub fn validate_source(source: &str) -> Result<()> {
    if source.trim().is_empty() {
        return Err(ViewerError::Config {
            message: "Dataset location cannot be empty".to_string(),
        });
    }
    if !is_url(source) && !Path::new(source).exists() {
        return Err(ViewerError::Config {
            message: format!("Dataset path does not exist: {}", source),
        });
    }
    Ok(())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            data: DataConfig::default(),
            plot: PlotConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            engines: EngineKind::default_order(),
            vendor: VendorConfig::default(),
        }
    }
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            username: None,
            username_header: default_username_header(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: default_plot_width(),
            height: default_plot_height(),
        }
    }
}

// Default value functions for serde
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8050
}

fn default_session_idle_secs() -> u64 {
    3600
}

fn default_username_header() -> String {
    "x-vendor-username".to_string()
}

fn default_user_agent() -> String {
    format!("gridview/{}", env!("CARGO_PKG_VERSION"))
}

fn default_plot_width() -> u32 {
    800
}

fn default_plot_height() -> u32 {
    600
}

fn default_log_level() -> String {
    "info".to_string()
}

//! Application configuration loaded from environment variables.

use serde::Deserialize;
use url::Url;

/// Filter used when verbose logging is enabled.
pub const VERBOSE_LOG_DIRECTIVE: &str = "stats_history=debug,info";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Storage Service ===
    /// Base URL of the Fledge storage service.
    #[serde(default = "default_storage_url")]
    pub storage_url: String,

    /// Per-request timeout for storage calls.
    #[serde(default = "default_storage_timeout")]
    pub storage_timeout_ms: u64,

    /// Connection establishment timeout for storage calls.
    #[serde(default = "default_storage_connect_timeout")]
    pub storage_connect_timeout_ms: u64,

    // === Scheduling ===
    /// Seconds between statistics history rolls.
    #[serde(default = "default_interval")]
    pub history_interval_seconds: u64,

    // === Server Configuration ===
    /// HTTP port for the management API.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,

    // === Metrics ===
    /// Expose Prometheus metrics.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Port for the Prometheus exporter.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_storage_url() -> String {
    "http://localhost:8080/".to_string()
}

fn default_storage_timeout() -> u64 {
    5000
}

fn default_storage_connect_timeout() -> u64 {
    1000
}

fn default_interval() -> u64 {
    15
}

fn default_port() -> u16 {
    8081
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9091
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_url: default_storage_url(),
            storage_timeout_ms: default_storage_timeout(),
            storage_connect_timeout_ms: default_storage_connect_timeout(),
            history_interval_seconds: default_interval(),
            port: default_port(),
            rust_log: default_log_level(),
            verbose: false,
            metrics_enabled: default_true(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.storage_url.is_empty() {
            return Err("STORAGE_URL is required".to_string());
        }

        let url = Url::parse(&self.storage_url)
            .map_err(|e| format!("STORAGE_URL is not a valid URL: {}", e))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err("STORAGE_URL must use http or https".to_string());
        }

        if self.history_interval_seconds == 0 {
            return Err("HISTORY_INTERVAL_SECONDS must be greater than 0".to_string());
        }

        if self.storage_timeout_ms == 0 || self.storage_connect_timeout_ms == 0 {
            return Err("storage timeouts must be greater than 0".to_string());
        }

        if self.metrics_enabled && self.metrics_port == self.port {
            return Err("METRICS_PORT must differ from PORT".to_string());
        }

        Ok(())
    }

    /// Parsed storage base URL with a trailing `/`, so table paths nest under
    /// any path prefix instead of replacing its last segment.
    pub fn storage_base_url(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&self.storage_url)?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// Tracing filter directive. Verbose mode from either the CLI or `VERBOSE`
    /// wins over `RUST_LOG`.
    pub fn log_directive(&self, verbose_flag: bool) -> String {
        if verbose_flag || self.verbose {
            VERBOSE_LOG_DIRECTIVE.to_string()
        } else {
            self.rust_log.clone()
        }
    }

    /// Interval between rolls.
    pub fn history_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.history_interval_seconds)
    }
}

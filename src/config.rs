//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub refresh: RefreshConfig,

    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,

    #[serde(default = "default_remediations")]
    pub remediations: Vec<RemediationConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Analytics backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Status code the backend uses for "required state missing"
    #[serde(default = "default_precondition_status")]
    pub precondition_status: u16,

    /// Body markers that must accompany the precondition status
    #[serde(default = "default_precondition_markers")]
    pub precondition_markers: Vec<String>,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout() -> u64 {
    10_000 // 10 seconds
}

fn default_precondition_status() -> u16 {
    400
}

fn default_precondition_markers() -> Vec<String> {
    vec![
        "not trained".to_string(),
        "não treinad".to_string(),
        "train-models".to_string(),
    ]
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout(),
            precondition_status: default_precondition_status(),
            precondition_markers: default_precondition_markers(),
        }
    }
}

/// Refresh loop timing
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    /// Delay between the end of one cycle and the start of the next
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    #[serde(default = "default_remediation_timeout")]
    pub remediation_timeout_ms: u64,
}

fn default_interval() -> u64 {
    30_000 // 30 seconds
}

fn default_remediation_timeout() -> u64 {
    120_000
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            remediation_timeout_ms: default_remediation_timeout(),
        }
    }
}

/// Which panel renders a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelKind {
    Resumo,
    Produtos,
    Categorias,
    Alertas,
    Insights,
    /// Pretty-printed JSON, for sources without a dedicated panel
    Raw,
}

/// A polled data source
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub path: String,
    #[serde(default = "default_panel")]
    pub panel: PanelKind,
    /// Remediation to run on a precondition failure
    #[serde(default)]
    pub recovery: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_panel() -> PanelKind {
    PanelKind::Raw
}

fn default_enabled() -> bool {
    true
}

impl SourceConfig {
    fn new(name: &str, path: &str, panel: PanelKind) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            panel,
            recovery: None,
            enabled: true,
        }
    }
}

fn default_sources() -> Vec<SourceConfig> {
    let mut insights = SourceConfig::new("insights", "/api/v1/ai/insights", PanelKind::Insights);
    insights.recovery = Some("train-models".to_string());

    vec![
        SourceConfig::new("resumo", "/api/v1/analytics/resumo", PanelKind::Resumo),
        SourceConfig::new("produtos", "/api/v1/analytics/produtos", PanelKind::Produtos),
        SourceConfig::new("categorias", "/api/v1/analytics/categorias", PanelKind::Categorias),
        SourceConfig::new("alertas", "/api/v1/analytics/alertas", PanelKind::Alertas),
        insights,
    ]
}

/// A named remediation endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct RemediationConfig {
    pub name: String,
    pub path: String,
}

fn default_remediations() -> Vec<RemediationConfig> {
    vec![RemediationConfig {
        name: "train-models".to_string(),
        path: "/api/v1/ai/train-models-safe".to_string(),
    }]
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config = Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })?;

        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("painel").join("config.toml")),
            Some(PathBuf::from("/etc/painel/config.toml")),
            Some(PathBuf::from("./painel.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Sources that take part in refresh cycles
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "refresh.interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api.base_url must not be empty".to_string()));
        }
        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("PAINEL_API_URL") {
            self.api.base_url = url;
        }
        if let Ok(timeout) = std::env::var("PAINEL_REQUEST_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.api.request_timeout_ms = ms;
            }
        }

        if let Ok(interval) = std::env::var("PAINEL_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                self.refresh.interval_ms = ms;
            }
        }

        if let Ok(level) = std::env::var("PAINEL_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("PAINEL_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            refresh: RefreshConfig::default(),
            sources: default_sources(),
            remediations: default_remediations(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Painel Configuration
#
# Environment variables override these settings:
# - PAINEL_API_URL
# - PAINEL_REQUEST_TIMEOUT_MS
# - PAINEL_INTERVAL_MS
# - PAINEL_LOG_LEVEL
# - PAINEL_LOG_FORMAT

[api]
# Analytics backend URL
base_url = "http://localhost:8000"

# Per-request timeout (ms)
request_timeout_ms = 10000

# A response with this status and one of the markers means the backend
# is missing state (e.g. AI models not trained) and a remediation may help
precondition_status = 400
precondition_markers = ["not trained", "não treinad", "train-models"]

[refresh]
# Delay between the end of one refresh and the start of the next (ms)
interval_ms = 30000

# Upper bound for a remediation action such as model training (ms)
remediation_timeout_ms = 120000

# Data sources. panel: resumo, produtos, categorias, alertas, insights, raw
[[sources]]
name = "resumo"
path = "/api/v1/analytics/resumo"
panel = "resumo"

[[sources]]
name = "produtos"
path = "/api/v1/analytics/produtos"
panel = "produtos"

[[sources]]
name = "categorias"
path = "/api/v1/analytics/categorias"
panel = "categorias"

[[sources]]
name = "alertas"
path = "/api/v1/analytics/alertas"
panel = "alertas"

[[sources]]
name = "insights"
path = "/api/v1/ai/insights"
panel = "insights"
recovery = "train-models"

[[remediations]]
name = "train-models"
path = "/api/v1/ai/train-models-safe"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

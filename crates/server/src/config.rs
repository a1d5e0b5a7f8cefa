use objgate::ServiceConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::Duration;

/// Key handed out when no API keys are configured. Development only.
pub const DEV_API_KEY: &str = "objgate-dev-key";

static SCOPE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_\.]*$").expect("scope name pattern compiles"));

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum request body size in MB
    #[serde(default = "default_max_body_size_mb")]
    pub max_body_size_mb: usize,

    /// Rate limit: requests per minute per API key
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,

    /// API key -> space-delimited scopes, e.g.
    /// `"objgate.objects.bookstore.books.read objgate.objects.bookstore.books.insert"`
    #[serde(default)]
    pub api_keys: HashMap<String, String>,

    /// First segment of every required scope
    #[serde(default = "default_system_name")]
    pub system_name: String,

    /// Second segment of every required scope
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Metrics endpoint enabled
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Store, compiler and health probe settings
    #[serde(default)]
    pub service: ServiceConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            max_body_size_mb: default_max_body_size_mb(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
            api_keys: HashMap::new(),
            system_name: default_system_name(),
            service_name: default_service_name(),
            enable_cors: default_true(),
            log_level: default_log_level(),
            metrics_enabled: default_true(),
            service: ServiceConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from `.env`, an optional `server.*` file and
    /// `OBJGATE_SERVER__*` environment variables, in that order of precedence.
    pub fn load() -> anyhow::Result<Self> {
        // A missing .env file is fine
        let _ = dotenvy::dotenv();

        let builder = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::with_name("server").required(false))
            // Override with environment variables
            .add_source(config::Environment::with_prefix("OBJGATE_SERVER").separator("__"));

        let mut config: ServerConfig = builder.build()?.try_deserialize()?;

        // Add a development key if none configured
        if config.api_keys.is_empty() {
            tracing::warn!(
                "No API keys configured, using development key '{}' with access to every collection",
                DEV_API_KEY
            );
            let scopes = config.dev_scopes();
            config.api_keys.insert(DEV_API_KEY.to_string(), scopes);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (field, value) in [
            ("system_name", &self.system_name),
            ("service_name", &self.service_name),
        ] {
            if value.trim().is_empty() || !SCOPE_NAME.is_match(value) {
                anyhow::bail!("{field} must be non-empty and match [a-zA-Z0-9_.]");
            }
        }
        self.service.validate()?;
        Ok(())
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.bind_addr, self.port);
        Ok(addr_str.parse()?)
    }

    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get max body size in bytes
    pub fn max_body_size(&self) -> usize {
        self.max_body_size_mb * 1024 * 1024
    }

    /// Scopes granted to `key`, or `None` for an unknown key.
    pub fn scopes_for(&self, key: &str) -> Option<HashSet<String>> {
        self.api_keys
            .get(key)
            .map(|scopes| scopes.split_whitespace().map(str::to_string).collect())
    }

    /// Every action on every collection, via `*` segments.
    fn dev_scopes(&self) -> String {
        ["read", "insert", "update", "delete"]
            .iter()
            .map(|action| format!("{}.{}.*.*.{action}", self.system_name, self.service_name))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn with_api_key(mut self, key: impl Into<String>, scopes: &[&str]) -> Self {
        self.api_keys.insert(key.into(), scopes.join(" "));
        self
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_body_size_mb() -> usize {
    10
}

fn default_rate_limit_per_minute() -> u32 {
    100
}

fn default_system_name() -> String {
    "objgate".to_string()
}

fn default_service_name() -> String {
    "objects".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

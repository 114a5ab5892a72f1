use std::fmt;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Whole-request timeout for upstream calls, in seconds.
    pub timeout: u64,
    pub http_pool_max_idle_per_host: usize,
    pub http_pool_idle_timeout_secs: u64,
    pub base_path: String,
    pub runtime_worker_threads: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout: default_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            base_path: String::new(),
            runtime_worker_threads: None,
        }
    }
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    180
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}

/// Upstream chat-completion deployment configuration.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base endpoint of the hosted API, e.g. `https://example.openai.azure.com`.
    pub api_base: String,
    /// Model deployment name to call.
    pub deployment: String,
    /// API key sent as the `api-key` header. May be empty when the gateway
    /// in front of the deployment does its own auth.
    pub api_key: String,
    pub api_version: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

fn default_api_version() -> String {
    "2023-09-01-preview".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    1000
}

/// Telemetry sink and tagging configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Value of the `function` tag on every usage event.
    pub service_name: String,
    /// Application Insights style connection string; when absent no metric
    /// exporter is installed and the meter stays no-op.
    pub connection_string: Option<String>,
    /// Encoding table used for streaming token counting.
    pub token_encoding: String,
    pub log_level: String,
}

fn default_service_name() -> String {
    "chatmeter".to_string()
}
fn default_token_encoding() -> String {
    "cl100k_base".to_string()
}
fn default_log_level() -> String {
    "INFO".to_string()
}

/// Full application configuration, constructed once at startup and shared
/// immutably through `AppState`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub telemetry: TelemetryConfig,
}

impl fmt::Display for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "api_base={} deployment={} service_name={} listen={}:{}",
            self.upstream.api_base,
            self.upstream.deployment,
            self.telemetry.service_name,
            self.server.host,
            self.server.port
        )
    }
}

/// Load configuration from process environment variables.
///
/// # Errors
///
/// Fails when `API_BASE` or `ENGINE` is absent or any recognized variable
/// fails to parse. Callers are expected to abort startup on error; nothing
/// here is recoverable per-request.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(|name| std::env::var(name).ok())
}

/// Load configuration through an injectable variable lookup.
pub fn load_config_from<F>(get: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let api_base = require(&get, "API_BASE")?;
    validate_endpoint(&api_base)?;
    let deployment = require(&get, "ENGINE")?;

    let server = ServerConfig {
        host: get("HOST").unwrap_or_else(default_host),
        port: parse_var(&get, "PORT", default_port())?,
        timeout: parse_var(&get, "TIMEOUT", default_timeout())?,
        http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
        http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
        base_path: get("BASE_PATH").unwrap_or_default(),
        runtime_worker_threads: match get("WORKER_THREADS") {
            None => None,
            Some(raw) => Some(parse_raw("WORKER_THREADS", &raw)?),
        },
    };

    let upstream = UpstreamConfig {
        api_base,
        deployment,
        api_key: get("APIM_KEY").unwrap_or_default(),
        api_version: get("API_VERSION").unwrap_or_else(default_api_version),
        temperature: default_temperature(),
        max_tokens: default_max_tokens(),
    };

    let telemetry = TelemetryConfig {
        service_name: get("OTEL_SERVICE_NAME").unwrap_or_else(default_service_name),
        connection_string: get("APPLICATIONINSIGHTS_CONNECTION_STRING").filter(|s| !s.is_empty()),
        token_encoding: get("TOKEN_ENCODING").unwrap_or_else(default_token_encoding),
        log_level: get("LOG_LEVEL").unwrap_or_else(default_log_level),
    };

    Ok(AppConfig {
        server,
        upstream,
        telemetry,
    })
}

fn require<F>(get: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn parse_var<F, T>(get: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match get(name) {
        None => Ok(default),
        Some(raw) => parse_raw(name, &raw),
    }
}

fn parse_raw<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

fn validate_endpoint(api_base: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(api_base).map_err(|e| ConfigError::Invalid {
        name: "API_BASE",
        reason: e.to_string(),
    })?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ConfigError::Invalid {
            name: "API_BASE",
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    Ok(())
}

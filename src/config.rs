use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub cache: CacheConfig,
    pub loki: LokiConfig,
    pub logs: LogsConfig,
    pub context_rules: ContextRulesConfig,
    pub reports: ReportsConfig,
    pub logging: LoggingConfig,
    /// `[[projects]]` TOML tables, loaded into a `models::search::ProjectRegistry`.
    pub projects: Vec<crate::models::search::ProjectDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

/// LLM provider selection + per-provider endpoint/model/key. Mirrors the
/// two concrete providers behind `services::llm_providers::LlmProvider`:
/// a local daemon (no auth) and a remote OpenAI-compatible gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// "local" or "remote".
    pub provider: String,
    pub model_id: String,
    pub local_host: String,
    pub remote_api_base: String,
    pub remote_api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub l2_enabled: bool,
    pub namespace: Option<String>,
    pub l1_max_entries: usize,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub l1_default_ttl_secs: u64,
    pub gateway_version: String,
    pub prompt_version: String,
    pub lock_ttl_ms: u64,
    pub lock_wait_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LokiConfig {
    pub endpoint: String,
    pub cache_dir: String,
}

/// Root directory for file-based log projects (spec.md `ProjectSource::File`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    pub root_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextRulesConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    pub output_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// Command line arguments for configuration overrides
#[derive(Parser, Debug, Clone)]
#[command(name = "logtrace")]
#[command(version, about = "Logtrace - log-analysis backend")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Server host (overrides config file)
    #[arg(long, value_name = "HOST")]
    pub server_host: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,

    /// LLM provider to use: "local" or "remote" (overrides config file)
    #[arg(long, value_name = "PROVIDER")]
    pub llm_provider: Option<String>,

    /// Loki query_range endpoint (overrides config file)
    #[arg(long, value_name = "URL")]
    pub loki_endpoint: Option<String>,

    /// Logging level (overrides config file, e.g., "info,logtrace=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with command line, environment variable, and file support
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables (prefixed with APP_)
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load() -> Result<Self, anyhow::Error> {
        let cli_args = CommandLineArgs::parse();

        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(&cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - APP_SERVER_HOST / APP_SERVER_PORT
    /// - APP_DATABASE_URL
    /// - APP_LLM_PROVIDER / APP_LLM_MODEL_ID / APP_LLM_LOCAL_HOST /
    ///   APP_LLM_REMOTE_API_BASE / APP_LLM_REMOTE_API_KEY
    /// - APP_CACHE_ENABLED / APP_CACHE_L2_ENABLED
    /// - APP_LOKI_ENDPOINT / APP_LOKI_CACHE_DIR
    /// - APP_LOGS_ROOT_DIR
    /// - APP_LOG_LEVEL
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("APP_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("APP_SERVER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
        }
        if let Ok(db_url) = std::env::var("APP_DATABASE_URL") {
            self.database.url = db_url;
        }
        if let Ok(provider) = std::env::var("APP_LLM_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Ok(model_id) = std::env::var("APP_LLM_MODEL_ID") {
            self.llm.model_id = model_id;
        }
        if let Ok(host) = std::env::var("APP_LLM_LOCAL_HOST") {
            self.llm.local_host = host;
        }
        if let Ok(base) = std::env::var("APP_LLM_REMOTE_API_BASE") {
            self.llm.remote_api_base = base;
        }
        if let Ok(key) = std::env::var("APP_LLM_REMOTE_API_KEY") {
            self.llm.remote_api_key = key;
        }
        if let Ok(enabled) = std::env::var("APP_CACHE_ENABLED")
            && let Ok(val) = enabled.parse()
        {
            self.cache.enabled = val;
        }
        if let Ok(enabled) = std::env::var("APP_CACHE_L2_ENABLED")
            && let Ok(val) = enabled.parse()
        {
            self.cache.l2_enabled = val;
        }
        if let Ok(endpoint) = std::env::var("APP_LOKI_ENDPOINT") {
            self.loki.endpoint = endpoint;
        }
        if let Ok(dir) = std::env::var("APP_LOKI_CACHE_DIR") {
            self.loki.cache_dir = dir;
        }
        if let Ok(dir) = std::env::var("APP_LOGS_ROOT_DIR") {
            self.logs.root_dir = dir;
        }
        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Apply command line argument overrides (highest priority)
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(host) = &args.server_host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.server_port {
            self.server.port = port;
        }
        if let Some(db_url) = &args.database_url {
            self.database.url = db_url.clone();
        }
        if let Some(provider) = &args.llm_provider {
            self.llm.provider = provider.clone();
        }
        if let Some(endpoint) = &args.loki_endpoint {
            self.loki.endpoint = endpoint.clone();
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }
        if self.llm.provider != "local" && self.llm.provider != "remote" {
            anyhow::bail!("llm.provider must be 'local' or 'remote', got '{}'", self.llm.provider);
        }
        if self.cache.l1_max_entries == 0 {
            anyhow::bail!("cache.l1_max_entries must be > 0");
        }
        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://data/logtrace.db".to_string() }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            model_id: "gpt-4o-mini".to_string(),
            local_host: "http://127.0.0.1:11434".to_string(),
            remote_api_base: "https://api.openai.com/v1".to_string(),
            remote_api_key: String::new(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            l2_enabled: true,
            namespace: None,
            l1_max_entries: 10_000,
            l1_default_ttl_secs: 3600,
            gateway_version: "v1".to_string(),
            prompt_version: "v1".to_string(),
            lock_ttl_ms: 30_000,
            lock_wait_ms: 2_000,
        }
    }
}

impl Default for LokiConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:3100/loki/api/v1/query_range".to_string(),
            cache_dir: "data/loki_cache".to_string(),
        }
    }
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self { root_dir: "data/logs".to_string() }
    }
}

impl Default for ContextRulesConfig {
    fn default() -> Self {
        Self { path: "conf/context_rules.csv".to_string() }
    }
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self { output_dir: "data/reports".to_string() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,logtrace=debug".to_string(), file: Some("logs/logtrace.log".to_string()) }
    }
}

// =========================
// Helpers for parsing values
// =========================

fn parse_duration_to_secs(input: &str) -> Result<u64, String> {
    if let Ok(val) = input.parse::<u64>() {
        return Ok(val);
    }

    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: u64 = num_str.parse().map_err(|_| "invalid number".to_string())?;
    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Ok(n),
        "m" | "min" | "mins" | "minute" | "minutes" => Ok(n * 60),
        "h" | "hr" | "hour" | "hours" => Ok(n * 60 * 60),
        "d" | "day" | "days" => Ok(n * 60 * 60 * 24),
        _ => Err(format!("unsupported unit: {}", unit)),
    }
}

fn deserialize_duration_secs<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = u64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a number of seconds or a string like '30s', '5m', '1h'")
        }
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v)
        }
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if v >= 0 { Ok(v as u64) } else { Err(E::custom("negative not allowed")) }
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(v).map_err(E::custom)
        }
        fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(&v).map_err(E::custom)
        }
    }
    deserializer.deserialize_any(Visitor)
}

//! Configuration for the CapStack API
//!
//! Settings are resolved once at startup from the process environment (and an
//! optional `.env` file), then shared read-only for the lifetime of the process.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Placeholder written over secrets when settings are displayed
const REDACTED: &str = "***";

/// Errors raised while resolving settings
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("Unsupported DATABASE_URL {0:?}: only SQLite URLs are supported")]
    UnsupportedDatabase(String),
}

/// Main settings for the service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub app_name: String,
    pub app_env: AppEnv,
    pub debug: bool,

    /// Address the HTTP server binds to
    pub host: String,
    pub port: u16,

    pub database_url: String,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Shared secret for `/api/*` routes. Auth is disabled when unset.
    pub api_key: Option<String>,

    pub cors_origins: Vec<String>,

    /// Telemetry settings
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    #[default]
    Development,
    Staging,
    Production,
}

impl AppEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppEnv::Development => "development",
            AppEnv::Staging => "staging",
            AppEnv::Production => "production",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "development" => Some(AppEnv::Development),
            "staging" => Some(AppEnv::Staging),
            "production" => Some(AppEnv::Production),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model used when a request does not name one
    pub model: String,

    pub openai_api_key: Option<String>,
    pub openai_base_url: String,

    pub azure_api_key: Option<String>,
    pub azure_endpoint: Option<String>,
    pub azure_api_version: String,

    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: String,

    /// OpenAI-compatible endpoint of a local Ollama instance
    pub ollama_base_url: String,

    /// Seconds allowed to establish a provider connection
    pub connect_timeout_secs: u64,

    /// Seconds allowed between two reads from a provider, streaming included
    pub read_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Directory for log files
    pub log_dir: PathBuf,

    /// Enable verbose logging
    pub verbose: bool,

    /// OTLP/HTTP collector endpoint (e.g. http://localhost:4318)
    pub otel_endpoint: Option<String>,
}

/// Where the item store keeps its data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    Memory,
    File(PathBuf),
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "CapStack API".to_string(),
            app_env: AppEnv::Development,
            debug: true,
            host: "127.0.0.1".to_string(),
            port: 8000,
            database_url: "sqlite://./capstack.db".to_string(),
            llm: LlmConfig::default(),
            api_key: None,
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
            ],
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            azure_api_key: None,
            azure_endpoint: None,
            azure_api_version: "2024-10-21".to_string(),
            anthropic_api_key: None,
            anthropic_base_url: "https://api.anthropic.com/v1".to_string(),
            ollama_base_url: "http://localhost:11434/v1".to_string(),
            connect_timeout_secs: 10,
            read_timeout_secs: 120,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_dir: dirs::data_dir()
                .map(|dir| dir.join("capstack").join("logs"))
                .unwrap_or_else(|| PathBuf::from(".capstack_logs")),
            verbose: false,
            otel_endpoint: None,
        }
    }
}

impl LlmConfig {
    /// Azure is usable only with both a key and an endpoint
    pub fn azure_configured(&self) -> bool {
        self.azure_api_key.is_some() && self.azure_endpoint.is_some()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl Settings {
    /// Load settings from the process environment, reading `.env` first if present
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut settings = Settings::default();

        if let Some(name) = get("APP_NAME") {
            settings.app_name = name;
        }
        if let Some(env) = get("APP_ENV") {
            settings.app_env = AppEnv::parse(&env).ok_or_else(|| ConfigError::Invalid {
                key: "APP_ENV",
                value: env.clone(),
                reason: "expected development, staging or production".to_string(),
            })?;
        }
        if let Some(debug) = get("DEBUG") {
            settings.debug = parse_bool("DEBUG", &debug)?;
        }
        if let Some(host) = get("HOST") {
            settings.host = host;
        }
        if let Some(port) = get("PORT") {
            settings.port = port.parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                key: "PORT",
                value: port.clone(),
                reason: e.to_string(),
            })?;
        }
        if let Some(url) = get("DATABASE_URL") {
            settings.database_url = url;
        }
        settings.database_location()?;

        let llm = &mut settings.llm;
        if let Some(model) = get("LLM_MODEL") {
            llm.model = model;
        }
        llm.openai_api_key = get("OPENAI_API_KEY");
        if let Some(url) = get("OPENAI_BASE_URL") {
            llm.openai_base_url = url;
        }
        llm.azure_api_key = get("AZURE_OPENAI_API_KEY");
        llm.azure_endpoint = get("AZURE_OPENAI_ENDPOINT");
        if let Some(version) = get("AZURE_OPENAI_API_VERSION") {
            llm.azure_api_version = version;
        }
        llm.anthropic_api_key = get("ANTHROPIC_API_KEY");
        if let Some(url) = get("ANTHROPIC_BASE_URL") {
            llm.anthropic_base_url = url;
        }
        if let Some(url) = get("OLLAMA_BASE_URL") {
            llm.ollama_base_url = url;
        }
        if let Some(secs) = get("LLM_CONNECT_TIMEOUT") {
            llm.connect_timeout_secs = parse_secs("LLM_CONNECT_TIMEOUT", &secs)?;
        }
        if let Some(secs) = get("LLM_READ_TIMEOUT") {
            llm.read_timeout_secs = parse_secs("LLM_READ_TIMEOUT", &secs)?;
        }

        settings.api_key = get("API_KEY");
        if let Some(origins) = get("CORS_ORIGINS") {
            settings.cors_origins = parse_origins(&origins)?;
        }

        if let Some(dir) = get("LOG_DIR") {
            settings.telemetry.log_dir = PathBuf::from(dir);
        }
        settings.telemetry.verbose = settings.debug;
        settings.telemetry.otel_endpoint = get("OTEL_EXPORTER_OTLP_ENDPOINT");

        Ok(settings)
    }

    pub fn is_production(&self) -> bool {
        self.app_env == AppEnv::Production
    }

    /// True when at least one hosted provider has usable credentials
    pub fn llm_configured(&self) -> bool {
        self.llm.openai_api_key.is_some()
            || self.llm.azure_configured()
            || self.llm.anthropic_api_key.is_some()
    }

    /// Resolve `database_url` into a SQLite location
    pub fn database_location(&self) -> Result<DatabaseLocation, ConfigError> {
        let url = self.database_url.as_str();
        if matches!(url, ":memory:" | "sqlite::memory:" | "sqlite://:memory:") {
            return Ok(DatabaseLocation::Memory);
        }

        ["sqlite+aiosqlite:///", "sqlite:///", "sqlite://", "sqlite:"]
            .iter()
            .find_map(|prefix| url.strip_prefix(prefix))
            .filter(|path| !path.is_empty())
            .map(|path| DatabaseLocation::File(PathBuf::from(path)))
            .ok_or_else(|| ConfigError::UnsupportedDatabase(url.to_string()))
    }

    /// Set verbose logging
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.telemetry.verbose = self.telemetry.verbose || verbose;
        self
    }

    /// Set the default model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.llm.model = model.into();
        self
    }

    /// Set the bind address
    pub fn with_bind(mut self, host: Option<String>, port: Option<u16>) -> Self {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        self
    }

    /// Set the database URL
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    /// Copy of the settings safe to print
    pub fn redacted(&self) -> Self {
        let hide = |secret: &Option<String>| secret.as_ref().map(|_| REDACTED.to_string());
        let mut copy = self.clone();
        copy.api_key = hide(&self.api_key);
        copy.llm.openai_api_key = hide(&self.llm.openai_api_key);
        copy.llm.azure_api_key = hide(&self.llm.azure_api_key);
        copy.llm.anthropic_api_key = hide(&self.llm.anthropic_api_key);
        copy
    }
}

/// Whole seconds, at least one
fn parse_secs(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "expected a positive number of seconds".to_string(),
        }),
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

/// Accepts either a JSON array or a comma separated list
fn parse_origins(value: &str) -> Result<Vec<String>, ConfigError> {
    if value.starts_with('[') {
        return serde_json::from_str(value).map_err(|e| ConfigError::Invalid {
            key: "CORS_ORIGINS",
            value: value.to_string(),
            reason: e.to_string(),
        });
    }

    Ok(value
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = settings_from(&[]).unwrap();

        assert_eq!(settings.app_name, "CapStack API");
        assert_eq!(settings.llm.model, "gpt-4o-mini");
        assert_eq!(settings.port, 8000);
        assert!(!settings.llm_configured());
        assert!(!settings.is_production());
        assert_eq!(
            settings.database_location().unwrap(),
            DatabaseLocation::File(PathBuf::from("./capstack.db"))
        );
    }

    #[test]
    fn test_empty_values_are_unset() {
        let settings = settings_from(&[("OPENAI_API_KEY", ""), ("API_KEY", "  ")]).unwrap();

        assert!(settings.llm.openai_api_key.is_none());
        assert!(settings.api_key.is_none());
    }

    #[test]
    fn test_azure_needs_key_and_endpoint() {
        let key_only = settings_from(&[("AZURE_OPENAI_API_KEY", "k")]).unwrap();
        assert!(!key_only.llm_configured());

        let both = settings_from(&[
            ("AZURE_OPENAI_API_KEY", "k"),
            ("AZURE_OPENAI_ENDPOINT", "https://example.openai.azure.com"),
        ])
        .unwrap();
        assert!(both.llm_configured());
    }

    #[test]
    fn test_provider_timeouts() {
        let defaults = settings_from(&[]).unwrap();
        assert_eq!(defaults.llm.connect_timeout(), Duration::from_secs(10));
        assert_eq!(defaults.llm.read_timeout(), Duration::from_secs(120));

        let tuned = settings_from(&[("LLM_CONNECT_TIMEOUT", "3"), ("LLM_READ_TIMEOUT", "30")])
            .unwrap();
        assert_eq!(tuned.llm.connect_timeout_secs, 3);
        assert_eq!(tuned.llm.read_timeout_secs, 30);

        assert!(matches!(
            settings_from(&[("LLM_READ_TIMEOUT", "0")]),
            Err(ConfigError::Invalid { key: "LLM_READ_TIMEOUT", .. })
        ));
    }

    #[test]
    fn test_cors_origins_formats() {
        let csv = settings_from(&[("CORS_ORIGINS", "http://a.test, http://b.test")]).unwrap();
        assert_eq!(csv.cors_origins, vec!["http://a.test", "http://b.test"]);

        let json = settings_from(&[("CORS_ORIGINS", r#"["http://c.test"]"#)]).unwrap();
        assert_eq!(json.cors_origins, vec!["http://c.test"]);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            settings_from(&[("PORT", "eighty")]),
            Err(ConfigError::Invalid { key: "PORT", .. })
        ));
        assert!(matches!(
            settings_from(&[("APP_ENV", "qa")]),
            Err(ConfigError::Invalid { key: "APP_ENV", .. })
        ));
        assert!(matches!(
            settings_from(&[("DATABASE_URL", "postgres://db/app")]),
            Err(ConfigError::UnsupportedDatabase(_))
        ));
    }

    #[test]
    fn test_database_locations() {
        let memory = settings_from(&[("DATABASE_URL", "sqlite::memory:")]).unwrap();
        assert_eq!(memory.database_location().unwrap(), DatabaseLocation::Memory);

        let legacy = settings_from(&[("DATABASE_URL", "sqlite+aiosqlite:///./data/app.db")]).unwrap();
        assert_eq!(
            legacy.database_location().unwrap(),
            DatabaseLocation::File(PathBuf::from("./data/app.db"))
        );
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let settings = settings_from(&[("OPENAI_API_KEY", "sk-secret"), ("API_KEY", "hunter2")])
            .unwrap()
            .redacted();

        assert_eq!(settings.llm.openai_api_key.as_deref(), Some("***"));
        assert_eq!(settings.api_key.as_deref(), Some("***"));
        assert!(settings.llm.azure_api_key.is_none());
    }
}

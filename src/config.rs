use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::schema::SchemaDescription;
use crate::util::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub connection_string: String,
    pub pool_size: usize,
    pub connect_timeout_secs: u64,
    pub connect_attempts: u32,
    pub connect_retry_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub backend: String, // "remote" or "ollama"
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub proxy: Option<String>,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_step_ms: u64,
    pub temperature: f32,
    pub max_tokens: usize,
    pub context_limit_tokens: usize,
    /// When false, translation failures are reported instead of answered by the fallback generator.
    pub fallback_enabled: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub llm: LlmConfig,
    pub schema: Option<SchemaDescription>,
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// DuckDB database file (or :memory:)
    #[arg(long)]
    pub database: Option<String>,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder();

        // Add configuration from file if specified
        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            // Check for config in default locations
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/nl-query/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        // NLQ__LLM__API_KEY, NLQ__DATABASE__CONNECTION_STRING, ...
        config_builder = config_builder.add_source(
            Environment::with_prefix("NLQ")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        config.apply_env_overrides(|key| std::env::var(key).ok());

        // Override with command line args if provided
        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(database) = &args.database {
            config.database.connection_string = database.clone();
        }

        config.validate()?;
        Ok(config)
    }

    /// Applies the plain environment variables the service has always been deployed with.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup("DATABASE_URL") {
            self.database.connection_string = url;
        }
        if let Some(key) = lookup("GROQ_API_KEY").or_else(|| lookup("LLM_API_KEY")) {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = lookup("GROQ_MODEL") {
            self.llm.model = model;
        }
        if let Some(base) = lookup("GROQ_BASE_URL") {
            self.llm.api_url = Some(base);
        }
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.web.port = port;
        }
    }

    /// Rejects settings the service cannot start without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.connection_string.trim().is_empty() {
            return Err(ConfigError::Message(
                "database.connection_string (or DATABASE_URL) is required".to_string(),
            ));
        }
        if self.database.pool_size == 0 {
            return Err(ConfigError::Message(
                "database.pool_size must be at least 1".to_string(),
            ));
        }
        if let Some(schema) = &self.schema {
            schema
                .validate()
                .map_err(|e| ConfigError::Message(format!("invalid schema description: {}", e)))?;
        }
        Ok(())
    }

    pub fn schema_description(&self) -> SchemaDescription {
        self.schema.clone().unwrap_or_default()
    }
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn connect_retry(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.connect_attempts,
            Duration::from_millis(self.connect_retry_delay_ms),
        )
    }
}

impl LlmConfig {
    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy::linear(self.max_attempts, Duration::from_millis(self.backoff_step_ms))
    }

    /// The API key, treating an empty value as absent.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection_string: "nl-query.duckdb".to_string(),
            pool_size: 5,
            connect_timeout_secs: 5,
            connect_attempts: 3,
            connect_retry_delay_ms: 1000,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            request_timeout_secs: 120,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: "remote".to_string(),
            model: "mixtral-8x7b-32768".to_string(),
            api_key: None,
            api_url: Some("https://api.groq.com/openai/v1".to_string()),
            proxy: None,
            request_timeout_secs: 10,
            max_attempts: 3,
            backoff_step_ms: 1000,
            temperature: 0.1,
            max_tokens: 1024,
            context_limit_tokens: 32768,
            fallback_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_are_usable() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.llm.retry().max_attempts, 3);
        assert_eq!(config.database.connect_timeout(), Duration::from_secs(5));
        assert!(config.llm.credential().is_none());
    }

    #[test]
    fn well_known_env_vars_override_file_values() {
        let mut config = AppConfig::default();
        let vars = env(&[
            ("DATABASE_URL", "/srv/invoices.duckdb"),
            ("GROQ_API_KEY", "gsk-test"),
            ("GROQ_MODEL", "llama3-70b"),
            ("PORT", "9090"),
        ]);

        config.apply_env_overrides(|k| vars.get(k).cloned());

        assert_eq!(config.database.connection_string, "/srv/invoices.duckdb");
        assert_eq!(config.llm.credential(), Some("gsk-test"));
        assert_eq!(config.llm.model, "llama3-70b");
        assert_eq!(config.web.port, 9090);
    }

    #[test]
    fn blank_env_vars_are_ignored() {
        let mut config = AppConfig::default();
        let vars = env(&[("DATABASE_URL", "  "), ("GROQ_API_KEY", "")]);

        config.apply_env_overrides(|k| vars.get(k).cloned());

        assert_eq!(config.database.connection_string, "nl-query.duckdb");
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn empty_api_key_counts_as_missing() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("   ".to_string());
        assert!(config.llm.credential().is_none());
    }

    #[test]
    fn missing_database_target_is_fatal() {
        let mut config = AppConfig::default();
        config.database.connection_string = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_file_with_partial_sections_and_schema() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[database]
connection_string = "from-file.duckdb"

[llm]
max_attempts = 5
fallback_enabled = false

[schema]
version = "custom-2"

[[schema.tables]]
name = "orders"
columns = [{{ name = "id", semantic_type = "integer" }}]
"#
        )
        .unwrap();

        let args = CliArgs {
            config: Some(file.path().to_path_buf()),
            port: Some(7000),
            ..Default::default()
        };
        let config = AppConfig::new(&args).unwrap();

        assert_eq!(config.database.connection_string, "from-file.duckdb");
        assert_eq!(config.database.pool_size, 5);
        assert_eq!(config.llm.max_attempts, 5);
        assert!(!config.llm.fallback_enabled);
        assert_eq!(config.web.port, 7000);
        let schema = config.schema_description();
        assert_eq!(schema.version, "custom-2");
        assert_eq!(schema.tables[0].name, "orders");
    }
}

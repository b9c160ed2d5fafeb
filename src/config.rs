use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    /// Application database holding the conversation log
    pub connection_string: String,
    pub pool_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub backend: String, // "remote" or "ollama"
    pub model: String,   // Model name
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
}

/// Knobs for the generate/execute/repair loop.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    /// Regeneration attempts allowed after the first failed execution
    pub max_retries: u32,
    /// Number of trailing history entries shown to the model
    pub history_window: usize,
    /// Row-limit hint passed to the model
    pub top_k: usize,
    /// Sample rows collected per table during introspection
    pub sample_rows: usize,
    /// Consecutive backend failures tolerated before giving up
    pub max_backend_failures: u32,
    pub backend_retry_delay_ms: u64,
    /// Open project databases in read-only access mode
    pub read_only: bool,
    pub request_timeout_secs: u64,
}

impl AgentConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backend_retry_delay(&self) -> Duration {
        Duration::from_millis(self.backend_retry_delay_ms)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            history_window: 10,
            top_k: 5,
            sample_rows: 5,
            max_backend_failures: 2,
            backend_retry_delay_ms: 250,
            read_only: true,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    pub data_dir: String,
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

    /// Directory holding one sub-directory per project database
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        // Start with the built-in defaults so partial files are accepted
        let mut config_builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

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

        // NLQ__LLM__API_KEY, NLQ__AGENT__MAX_RETRIES, ...
        config_builder = config_builder.add_source(Environment::with_prefix("NLQ").separator("__"));

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        // Override with command line args if provided
        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(data_dir) = &args.data_dir {
            config.data_dir = data_dir.clone();
        }

        Ok(config)
    }
}

// Default implementation
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                connection_string: "nl-query.db".to_string(),
                pool_size: 5,
            },
            web: WebConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            llm: LlmConfig {
                backend: "remote".to_string(),
                model: "gpt-4o-mini".to_string(),
                api_key: None,
                api_url: Some("https://api.openai.com/v1/chat/completions".to_string()),
                temperature: 0.2,
                timeout_secs: 60,
            },
            agent: AgentConfig::default(),
            data_dir: "data".to_string(),
        }
    }
}

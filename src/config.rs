use crate::llm::{LlmSettings, Provider};
use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8888;
const DEFAULT_BODY_LIMIT_BYTES: usize = 1024 * 1024;
const DEFAULT_SESSION_TTL_SECS: u64 = 5 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10 * 60;

const DEFAULT_LLM_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_LLM_MODEL: &str = "gemma";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Seconds a session lives after its last write
    #[arg(long, env = "SESSION_TTL_SECS")]
    pub session_ttl_secs: Option<u64>,

    /// Seconds between sweeps of expired sessions
    #[arg(long, env = "SWEEP_INTERVAL_SECS")]
    pub sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            host: DEFAULT_HOST.to_string(),
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_SESSION_TTL_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_secs == 0 {
            return Err(ConfigError::Message(
                "session.ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.sweep_interval_secs <= self.ttl_secs {
            return Err(ConfigError::Message(format!(
                "session.sweep_interval_secs ({}) must be longer than session.ttl_secs ({})",
                self.sweep_interval_secs, self.ttl_secs
            )));
        }
        Ok(())
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_args(std::env::args())
    }

    /// Load configuration with precedence CLI > environment > file > defaults.
    pub fn load_from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args).map_err(|e| ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder()
            .set_default("server.port", i64::from(DEFAULT_PORT))?
            .set_default("server.host", DEFAULT_HOST)?
            .set_default("server.body_limit_bytes", DEFAULT_BODY_LIMIT_BYTES as u64)?
            .set_default("session.ttl_secs", DEFAULT_SESSION_TTL_SECS)?
            .set_default("session.sweep_interval_secs", DEFAULT_SWEEP_INTERVAL_SECS)?;

        // An explicit file must exist; ./config.{yaml,toml,json} is optional.
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // E.g. RELAY_SERVER__PORT=8000, RELAY_SESSION__TTL_SECS=60
        builder = builder.add_source(
            Environment::with_prefix("RELAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(ttl) = cli.session_ttl_secs {
            builder = builder.set_override("session.ttl_secs", ttl)?;
        }
        if let Some(interval) = cli.sweep_interval_secs {
            builder = builder.set_override("session.sweep_interval_secs", interval)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.session.validate()?;
        Ok(cfg)
    }
}

/// Backend settings from `LLM_*` environment variables.
///
/// Defaults target a local Ollama server running `gemma`.
pub fn load_llm_settings() -> Result<LlmSettings, ConfigError> {
    let base_url = non_blank_env("LLM_BASE_URL", DEFAULT_LLM_BASE_URL)?;
    let model = non_blank_env("LLM_MODEL", DEFAULT_LLM_MODEL)?;

    let api_key = env::var("LLM_API_KEY")
        .ok()
        .filter(|s| !s.trim().is_empty());

    let provider = Provider::detect_from_url(&base_url).with_azure_deployment(
        env::var("AZURE_DEPLOYMENT_NAME").ok(),
        env::var("AZURE_API_VERSION").ok(),
    );

    Ok(LlmSettings {
        base_url,
        api_key,
        model,
        provider,
    })
}

fn non_blank_env(key: &str, default: &str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) if value.trim().is_empty() => {
            Err(ConfigError::Message(format!("{key} cannot be empty")))
        }
        Ok(value) => Ok(value),
        Err(_) => Ok(default.to_string()),
    }
}

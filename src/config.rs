//! Layered settings: defaults, optional YAML file, `AGENT_CHAT_*`
//! environment, then CLI flags.

use std::time::Duration;

use clap::{Parser, ValueEnum};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::stream::StreamPolicy;

/// Default service root, matching the universal agent's mount point.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/universal-agent";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Assistant service base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Abort a stream whose handshake takes longer than this many seconds
    #[arg(long)]
    pub handshake_timeout_secs: Option<u64>,

    /// Abort a stream that stays silent longer than this many seconds
    #[arg(long)]
    pub idle_timeout_secs: Option<u64>,

    /// Log output format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub service: ServiceConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    pub threads: ThreadsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StreamConfig {
    /// No limit when unset.
    pub handshake_timeout_secs: Option<u64>,
    /// No limit when unset.
    pub idle_timeout_secs: Option<u64>,
}

impl StreamConfig {
    #[must_use]
    pub fn policy(&self) -> StreamPolicy {
        StreamPolicy {
            handshake_timeout: self.handshake_timeout_secs.map(Duration::from_secs),
            idle_timeout: self.idle_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ThreadsConfig {
    /// Thread shown when the service reports none.
    pub default_thread_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence.
    pub filter: String,
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args).map_err(|e| ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder()
            .set_default("service.base_url", DEFAULT_BASE_URL)?
            .set_default("threads.default_thread_id", "1")?
            .set_default("logging.filter", "info")?
            .set_default("logging.format", "pretty")?;

        // Explicit file must exist; the implicit ./agent-chat.{yaml,...} may not.
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None => builder.add_source(File::with_name("agent-chat").required(false)),
        };

        // E.g. AGENT_CHAT_SERVICE__BASE_URL, AGENT_CHAT_STREAM__IDLE_TIMEOUT_SECS
        builder = builder.add_source(
            Environment::with_prefix("AGENT_CHAT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // CLI flags win over everything else.
        if let Some(url) = cli.base_url {
            builder = builder.set_override("service.base_url", url)?;
        }
        if let Some(secs) = cli.handshake_timeout_secs {
            builder = builder.set_override("stream.handshake_timeout_secs", secs)?;
        }
        if let Some(secs) = cli.idle_timeout_secs {
            builder = builder.set_override("stream.idle_timeout_secs", secs)?;
        }
        if let Some(format) = cli.log_format {
            let format = match format {
                LogFormat::Pretty => "pretty",
                LogFormat::Json => "json",
            };
            builder = builder.set_override("logging.format", format)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.service.base_url).map_err(|e| {
            ConfigError::Message(format!("service.base_url {:?}: {e}", self.service.base_url))
        })?;
        if self.threads.default_thread_id.trim().is_empty() {
            return Err(ConfigError::Message(
                "threads.default_thread_id cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

//! Service configuration
//!
//! Resolution order: built-in defaults, then the TOML file, then
//! `SYNAPSE_*` environment variables, then command-line flags (applied by
//! the binary).
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [training]
//! workers = 4
//! max_attempts = 5
//!
//! [execution]
//! default_timeout_ms = 10000
//! readiness = "allow_while_training"
//!
//! [execution.operation_timeouts_ms]
//! "make.ocr_document" = 60000
//!
//! [logging]
//! level = "debug"
//! json = true
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dispatch::{DispatcherConfig, ReadinessPolicy};
use crate::handlers::Operation;
use crate::training::{RetryPolicy, TrainingSettings};

pub const ENV_CONFIG_PATH: &str = "SYNAPSE_CONFIG_PATH";
pub const ENV_HOST: &str = "SYNAPSE_HOST";
pub const ENV_PORT: &str = "SYNAPSE_PORT";
pub const ENV_TRAINING_WORKERS: &str = "SYNAPSE_TRAINING_WORKERS";
pub const ENV_EXECUTION_TIMEOUT_MS: &str = "SYNAPSE_EXECUTION_TIMEOUT_MS";
pub const ENV_LOG_LEVEL: &str = "SYNAPSE_LOG_LEVEL";

/// Config file looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "synapse.toml";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Result type for configuration
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value '{value}' for {var}")]
    Env { var: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "InternalError",
            Self::Parse { .. } | Self::Env { .. } | Self::Invalid(_) => "ValidationError",
        }
    }
}

/// HTTP listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Training worker pool and retry schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSection {
    pub workers: usize,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// Artificial duration of each simulated pipeline run
    pub simulated_delay_ms: u64,
}

impl Default for TrainingSection {
    fn default() -> Self {
        Self {
            workers: 2,
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 5_000,
            backoff_multiplier: 2.0,
            simulated_delay_ms: 0,
        }
    }
}

impl TrainingSection {
    pub fn settings(&self) -> TrainingSettings {
        TrainingSettings {
            workers: self.workers,
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                initial_backoff: Duration::from_millis(self.initial_backoff_ms),
                max_backoff: Duration::from_millis(self.max_backoff_ms),
                multiplier: self.backoff_multiplier,
            },
        }
    }

    pub fn simulated_delay(&self) -> Duration {
        Duration::from_millis(self.simulated_delay_ms)
    }
}

/// Operation dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    pub default_timeout_ms: u64,
    /// Per-operation overrides keyed by `type.operation` or operation name
    pub operation_timeouts_ms: BTreeMap<String, u64>,
    pub readiness: ReadinessPolicy,
    pub serialize_per_agent: bool,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            operation_timeouts_ms: BTreeMap::new(),
            readiness: ReadinessPolicy::default(),
            serialize_per_agent: false,
        }
    }
}

impl ExecutionSection {
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            default_timeout: Duration::from_millis(self.default_timeout_ms),
            operation_timeouts: self
                .operation_timeouts_ms
                .iter()
                .map(|(op, ms)| (op.clone(), Duration::from_millis(*ms)))
                .collect(),
            readiness: self.readiness,
            serialize_per_agent: self.serialize_per_agent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynapseConfig {
    pub server: ServerSection,
    pub training: TrainingSection,
    pub execution: ExecutionSection,
    pub logging: LoggingSection,
}

impl SynapseConfig {
    /// Load, apply environment overrides and validate.
    ///
    /// An explicit `path` (or `SYNAPSE_CONFIG_PATH`) must exist; otherwise
    /// `./synapse.toml` is used when present and defaults when not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(ENV_CONFIG_PATH).map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                if local.is_file() {
                    Self::from_file(local)?
                } else {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            }
        };

        config.merge_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without overrides or validation
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Invalid(message) => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Apply `SYNAPSE_*` overrides from the process environment
    pub fn merge_env_vars(&mut self) -> Result<()> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from any variable source
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            debug!("Overriding server host from environment: {}", host);
            self.server.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.server.port = parse_var(ENV_PORT, &port)?;
        }
        if let Some(workers) = lookup(ENV_TRAINING_WORKERS) {
            self.training.workers = parse_var(ENV_TRAINING_WORKERS, &workers)?;
        }
        if let Some(timeout) = lookup(ENV_EXECUTION_TIMEOUT_MS) {
            self.execution.default_timeout_ms = parse_var(ENV_EXECUTION_TIMEOUT_MS, &timeout)?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level.to_lowercase();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid("server.host must not be empty".to_string()));
        }

        let training = &self.training;
        if training.workers == 0 {
            return Err(ConfigError::Invalid("training.workers must be greater than 0".to_string()));
        }
        if training.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "training.max_attempts must be greater than 0".to_string(),
            ));
        }
        if !training.backoff_multiplier.is_finite() || training.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "training.backoff_multiplier must be at least 1.0, got {}",
                training.backoff_multiplier
            )));
        }
        if training.initial_backoff_ms > training.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "training.initial_backoff_ms cannot be greater than training.max_backoff_ms"
                    .to_string(),
            ));
        }

        if self.execution.default_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "execution.default_timeout_ms must be greater than 0".to_string(),
            ));
        }
        let known = Operation::all();
        for (key, ms) in &self.execution.operation_timeouts_ms {
            if !known.iter().any(|op| op.to_string() == *key || op.name() == key) {
                return Err(ConfigError::Invalid(format!(
                    "execution.operation_timeouts_ms: unknown operation '{}'",
                    key
                )));
            }
            if *ms == 0 {
                return Err(ConfigError::Invalid(format!(
                    "execution.operation_timeouts_ms.{} must be greater than 0",
                    key
                )));
            }
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }

    /// Listener address as `host:port`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = SynapseConfig::default();
        config.validate().unwrap();
        assert_eq!(config.training.workers, 2);
        assert_eq!(config.execution.default_timeout_ms, 30_000);
        assert_eq!(config.execution.readiness, ReadinessPolicy::RejectUntilReady);
        assert_eq!(config.bind_address(), "127.0.0.1:3000");
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9090

[training]
workers = 4
backoff_multiplier = 1.5

[execution]
readiness = "allow_while_training"
serialize_per_agent = true

[execution.operation_timeouts_ms]
"make.ocr_document" = 60000
"#
        )
        .unwrap();

        let config = SynapseConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.training.workers, 4);
        assert_eq!(config.training.max_attempts, 3);
        assert_eq!(config.execution.readiness, ReadinessPolicy::AllowWhileTraining);

        let dispatcher = config.execution.dispatcher_config();
        assert!(dispatcher.serialize_per_agent);
        assert_eq!(
            dispatcher.operation_timeouts.get("make.ocr_document"),
            Some(&Duration::from_secs(60))
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synapse.toml");
        std::fs::write(&path, "[logging]\nlevel = \"debug\"\njson = true\n").unwrap();

        let config = SynapseConfig::load(Some(&path)).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);

        let missing = SynapseConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }

    #[test]
    fn test_parse_errors_name_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = \"not a number\"").unwrap();

        let err = SynapseConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert_eq!(err.code(), "ValidationError");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_HOST, "0.0.0.0"),
            (ENV_PORT, "8081"),
            (ENV_TRAINING_WORKERS, "6"),
            (ENV_EXECUTION_TIMEOUT_MS, "1500"),
            (ENV_LOG_LEVEL, "WARN"),
        ]);

        let mut config = SynapseConfig::default();
        config
            .apply_overrides(|var| vars.get(var).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:8081");
        assert_eq!(config.training.workers, 6);
        assert_eq!(config.execution.default_timeout_ms, 1500);
        assert_eq!(config.logging.level, "warn");
        config.validate().unwrap();
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = SynapseConfig::default();
        let err = config
            .apply_overrides(|var| (var == ENV_PORT).then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: ENV_PORT, .. }));
    }

    #[test]
    fn test_validation_rejections() {
        let cases: Vec<fn(&mut SynapseConfig)> = vec![
            |c| c.training.workers = 0,
            |c| c.training.max_attempts = 0,
            |c| c.training.backoff_multiplier = 0.5,
            |c| c.training.initial_backoff_ms = c.training.max_backoff_ms + 1,
            |c| c.execution.default_timeout_ms = 0,
            |c| {
                c.execution
                    .operation_timeouts_ms
                    .insert("insights.teleport".to_string(), 10);
            },
            |c| {
                c.execution
                    .operation_timeouts_ms
                    .insert("digital_checkin".to_string(), 0);
            },
            |c| c.logging.level = "loud".to_string(),
        ];

        for (i, mutate) in cases.into_iter().enumerate() {
            let mut config = SynapseConfig::default();
            mutate(&mut config);
            assert!(config.validate().is_err(), "case {} should be rejected", i);
        }
    }

    #[test]
    fn test_toml_round_trip_is_loadable() {
        let mut config = SynapseConfig::default();
        config
            .execution
            .operation_timeouts_ms
            .insert("send_reminder".to_string(), 2_000);
        let text = config.to_toml().unwrap();
        assert_eq!(SynapseConfig::from_toml(&text).unwrap(), config);
    }
}

use std::env;

use crate::telemetry::error::TelemetryError;

/// Connection string used when none is configured (local OTLP collector)
pub const DEFAULT_CONNECTION_STRING: &str = "http://localhost:4317";

/// Backend options, passed to the client factory without inspection.
pub type ClientOptions = serde_json::Map<String, serde_json::Value>;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Pretty human-readable format with colors (for local dev)
    #[default]
    Pretty,
    /// JSON structured format (for cloud environments)
    Json,
}

/// What a [`ClientFactory`](crate::telemetry::api::ClientFactory) receives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientConfig {
    /// Opaque name of the telemetry destination
    pub connection_string: String,
    pub options: ClientOptions,
}

impl ClientConfig {
    pub fn new(connection_string: impl Into<String>, options: Option<ClientOptions>) -> Self {
        Self {
            connection_string: connection_string.into(),
            options: options.unwrap_or_default(),
        }
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|value| value.as_str())
    }

    pub fn option_bool(&self, key: &str) -> Option<bool> {
        self.options.get(key).and_then(|value| value.as_bool())
    }
}

/// Configuration of the exception logger and its own diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct LoggerConfig {
    pub connection_string: String,
    pub options: ClientOptions,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl LoggerConfig {
    /// Create config from environment variables
    /// - EXCEPTION_LOGGER_CONNECTION_STRING names the destination
    /// - EXCEPTION_LOGGER_OPTIONS holds a JSON object of backend options
    pub fn from_env() -> Result<Self, TelemetryError> {
        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("pretty") => LogFormat::Pretty,
            _ => LogFormat::Pretty,
        };

        let options = match env::var("EXCEPTION_LOGGER_OPTIONS") {
            Ok(raw) => parse_options(&raw)?,
            Err(_) => ClientOptions::new(),
        };

        Ok(Self {
            connection_string: env::var("EXCEPTION_LOGGER_CONNECTION_STRING")
                .unwrap_or_else(|_| DEFAULT_CONNECTION_STRING.to_string()),
            options,
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            log_format,
        })
    }

    /// Create a new config with explicit values
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            options: ClientOptions::new(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }

    pub fn builder() -> LoggerConfigBuilder {
        LoggerConfigBuilder::default()
    }

    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.connection_string.clone(), Some(self.options.clone()))
    }
}

/// Parse a JSON object of backend options.
pub fn parse_options(raw: &str) -> Result<ClientOptions, TelemetryError> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(options)) => Ok(options),
        Ok(other) => Err(TelemetryError::Config(format!(
            "options must be a JSON object, got {}",
            other
        ))),
        Err(e) => Err(TelemetryError::Config(format!("invalid options JSON: {}", e))),
    }
}

#[derive(Default)]
pub struct LoggerConfigBuilder {
    connection_string: Option<String>,
    options: ClientOptions,
    log_level: Option<String>,
    log_format: Option<LogFormat>,
}

impl LoggerConfigBuilder {
    pub fn connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = Some(connection_string.into());
        self
    }

    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.log_format = Some(format);
        self
    }

    pub fn json(self) -> Self {
        self.log_format(LogFormat::Json)
    }

    pub fn pretty(self) -> Self {
        self.log_format(LogFormat::Pretty)
    }

    pub fn build(self) -> LoggerConfig {
        LoggerConfig {
            connection_string: self
                .connection_string
                .unwrap_or_else(|| DEFAULT_CONNECTION_STRING.to_string()),
            options: self.options,
            log_level: self.log_level.unwrap_or_else(|| "info".to_string()),
            log_format: self.log_format.unwrap_or_default(),
        }
    }
}

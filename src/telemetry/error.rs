use thiserror::Error;

/// Failures of the setup paths around exception logging.
///
/// None of these ever reach a `log_exception` caller: dispatch, interception
/// and teardown log and swallow backend failures.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Client creation error: {0}")]
    Create(String),

    #[error("Exporter error: {0}")]
    Exporter(String),

    #[error("Flush error: {0}")]
    Flush(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Initialization error: {0}")]
    Init(String),
}

impl From<opentelemetry_sdk::error::OTelSdkError> for TelemetryError {
    fn from(err: opentelemetry_sdk::error::OTelSdkError) -> Self {
        Self::Flush(err.to_string())
    }
}

impl From<opentelemetry_otlp::ExporterBuildError> for TelemetryError {
    fn from(err: opentelemetry_otlp::ExporterBuildError) -> Self {
        Self::Exporter(err.to_string())
    }
}

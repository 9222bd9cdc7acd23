use std::future::Future;
use std::sync::Arc;

use crate::telemetry::config::ClientConfig;
use crate::telemetry::error::TelemetryError;
use crate::telemetry::record::ExceptionRecord;

/// A created connection to the telemetry backend.
///
/// Transport results are the client's business: `load` and `send` report
/// nothing back, and only `flush` may fail.
pub trait TelemetryClient: Send + Sync {
    /// Finish loading. Called once, before anything is sent.
    fn load(&self);

    /// Hand one record to the backend.
    fn send(&self, record: &ExceptionRecord);

    /// Force out anything the client is still holding.
    fn flush(&self) -> Result<(), TelemetryError>;
}

impl<T: TelemetryClient + ?Sized> TelemetryClient for Arc<T> {
    fn load(&self) {
        (**self).load()
    }

    fn send(&self, record: &ExceptionRecord) {
        (**self).send(record)
    }

    fn flush(&self) -> Result<(), TelemetryError> {
        (**self).flush()
    }
}

/// Trait for telemetry backends (OpenTelemetry, in-memory, etc.)
pub trait ClientFactory: Send + Sync + 'static {
    type Client: TelemetryClient + 'static;

    /// Create a client for the destination named by the config
    fn create(
        &self,
        config: &ClientConfig,
    ) -> impl Future<Output = Result<Self::Client, TelemetryError>> + Send;
}

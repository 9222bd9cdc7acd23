use opentelemetry::trace::{Span, Status, Tracer, TracerProvider};
use opentelemetry::KeyValue;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_semantic_conventions::attribute::{
    EXCEPTION_MESSAGE, EXCEPTION_STACKTRACE, EXCEPTION_TYPE,
};
use tracing::debug;

use crate::telemetry::api::TelemetryClient;
use crate::telemetry::config::ClientConfig;
use crate::telemetry::error::TelemetryError;
use crate::telemetry::record::ExceptionRecord;

/// Option that turns `send` into a no-op
pub const DISABLE_TELEMETRY_OPTION: &str = "disableTelemetry";

/// Severity name attribute
pub const EXCEPTION_SEVERITY: &str = "exception.severity";

/// Severity number attribute (0 = Verbose .. 4 = Critical)
pub const EXCEPTION_SEVERITY_LEVEL: &str = "exception.severity_level";

const INSTRUMENTATION_SCOPE: &str = "exception-logger";

/// Client recording each exception as an `exception` span.
pub struct OtelClient {
    provider: SdkTracerProvider,
    disabled: bool,
}

impl OtelClient {
    pub(crate) fn new(provider: SdkTracerProvider, config: &ClientConfig) -> Self {
        Self {
            provider,
            disabled: config.option_bool(DISABLE_TELEMETRY_OPTION).unwrap_or(false),
        }
    }
}

impl TelemetryClient for OtelClient {
    fn load(&self) {
        debug!(disabled = self.disabled, "OpenTelemetry exception client loaded");
    }

    fn send(&self, record: &ExceptionRecord) {
        if self.disabled {
            return;
        }

        let tracer = self.provider.tracer(INSTRUMENTATION_SCOPE);
        let mut span = tracer.start("exception");
        span.add_event("exception", exception_attributes(record));
        span.set_status(Status::error(record.error.message.clone()));
        span.end();
    }

    fn flush(&self) -> Result<(), TelemetryError> {
        self.provider.force_flush()?;
        Ok(())
    }
}

/// Attributes of the `exception` event for one record.
pub fn exception_attributes(record: &ExceptionRecord) -> Vec<KeyValue> {
    let mut attrs = vec![
        KeyValue::new(EXCEPTION_TYPE, record.error.kind.clone()),
        KeyValue::new(EXCEPTION_MESSAGE, record.error.message.clone()),
        KeyValue::new(EXCEPTION_SEVERITY, record.severity_level.as_str()),
        KeyValue::new(EXCEPTION_SEVERITY_LEVEL, record.severity_level as i64),
    ];

    if let Some(stack) = &record.error.stack {
        attrs.push(KeyValue::new(EXCEPTION_STACKTRACE, stack.clone()));
    }

    for (key, value) in record.properties.iter().flatten() {
        attrs.push(property_attribute(key, value));
    }

    attrs
}

fn property_attribute(key: &str, value: &serde_json::Value) -> KeyValue {
    let key = key.to_string();
    match value {
        serde_json::Value::String(s) => KeyValue::new(key, s.clone()),
        serde_json::Value::Bool(b) => KeyValue::new(key, *b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => KeyValue::new(key, i),
            None => KeyValue::new(key, n.as_f64().unwrap_or_default()),
        },
        other => KeyValue::new(key, other.to_string()),
    }
}

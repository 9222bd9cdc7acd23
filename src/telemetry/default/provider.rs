use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing::info;

use crate::telemetry::api::ClientFactory;
use crate::telemetry::config::ClientConfig;
use crate::telemetry::default::client::OtelClient;
use crate::telemetry::default::connection::Destination;
use crate::telemetry::error::TelemetryError;
use crate::telemetry::resource::build_base_resource;

/// Factory for the OpenTelemetry backend
/// - Exports over OTLP/gRPC to the endpoint named by the connection string
/// - Adds GCP authentication when the endpoint is Google's (`telemetry-gcp`)
#[derive(Debug, Clone, Copy, Default)]
pub struct OtelClientFactory;

impl ClientFactory for OtelClientFactory {
    type Client = OtelClient;

    async fn create(&self, config: &ClientConfig) -> Result<OtelClient, TelemetryError> {
        let destination = Destination::parse(&config.connection_string)?;

        #[cfg(feature = "telemetry-gcp")]
        if destination.is_gcp() {
            return crate::telemetry::gcp::build_client(config, &destination).await;
        }

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&destination.endpoint)
            .build()?;

        let provider = SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(build_base_resource(config))
            .build();

        info!(endpoint = %destination.endpoint, "OpenTelemetry exception client created");
        Ok(OtelClient::new(provider, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn factory_with_otlp_endpoint_succeeds() {
        let config = ClientConfig::new("http://localhost:4317", None);

        let result = OtelClientFactory.create(&config).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn factory_accepts_key_value_connection_string() {
        let config = ClientConfig::new("Endpoint=http://localhost:4317;InstrumentationKey=abc", None);

        let result = OtelClientFactory.create(&config).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn factory_with_invalid_endpoint_succeeds_build() {
        // Invalid URL format doesn't fail at build time, only when connecting
        let config = ClientConfig::new("invalid-url", None);

        let result = OtelClientFactory.create(&config).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn factory_rejects_empty_connection_string() {
        let config = ClientConfig::new("", None);

        let result = OtelClientFactory.create(&config).await;

        assert!(matches!(result, Err(TelemetryError::Config(_))));
    }
}

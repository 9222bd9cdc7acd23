//! GCP destination for the OpenTelemetry backend.
//!
//! Selected when the connection string's endpoint is on `googleapis.com`.
//! Requests carry Application Default Credentials and the records land in
//! the project named by `ProjectId` (or the usual project variables).
//!
//! # Example
//!
//! ```rust,ignore
//! let connection_string =
//!     "Endpoint=https://telemetry.googleapis.com;ProjectId=my-project-id";
//! with_exception_logger(app, connection_string, None).mount(OtelClientFactory)?;
//! ```
//!
//! # Environment Variables
//!
//! - `GOOGLE_CLOUD_PROJECT` / `GCLOUD_PROJECT` / `GCP_PROJECT`: Project ID
//!   when the connection string has none

mod auth;
pub mod config;

use opentelemetry::KeyValue;
use opentelemetry_otlp::{SpanExporter, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_semantic_conventions::resource::{CLOUD_ACCOUNT_ID, CLOUD_PROVIDER};
use tracing::info;

use crate::telemetry::config::ClientConfig;
use crate::telemetry::default::{Destination, OtelClient};
use crate::telemetry::error::TelemetryError;
use crate::telemetry::resource::build_resource;

pub use auth::auth_metadata;
pub use config::GcpConfig;

/// GCP cloud provider value (semconv)
pub const CLOUD_PROVIDER_GCP: &str = "gcp";

/// GCP project ID attribute (required by Cloud Trace)
pub const GCP_PROJECT_ID: &str = "gcp.project_id";

/// Resource attributes identifying the GCP project
pub fn gcp_attributes(gcp: &GcpConfig) -> Vec<KeyValue> {
    vec![
        KeyValue::new(CLOUD_PROVIDER, CLOUD_PROVIDER_GCP),
        KeyValue::new(CLOUD_ACCOUNT_ID, gcp.project_id.clone()),
        KeyValue::new(GCP_PROJECT_ID, gcp.project_id.clone()),
    ]
}

/// Build an authenticated client for a GCP destination
pub async fn build_client(
    config: &ClientConfig,
    destination: &Destination,
) -> Result<OtelClient, TelemetryError> {
    let gcp = GcpConfig::resolve(destination)?;
    let metadata = auth_metadata(&gcp.project_id).await?;

    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&gcp.endpoint)
        .with_metadata(metadata)
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(build_resource(config, gcp_attributes(&gcp)))
        .build();

    info!(project_id = %gcp.project_id, "GCP exception client created");
    Ok(OtelClient::new(provider, config))
}

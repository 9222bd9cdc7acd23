use tonic::metadata::{MetadataMap, MetadataValue};

use crate::telemetry::error::TelemetryError;

const TRACE_SCOPE: &str = "https://www.googleapis.com/auth/trace.append";

/// gRPC metadata authenticating OTLP requests with Application Default
/// Credentials
pub async fn auth_metadata(project_id: &str) -> Result<MetadataMap, TelemetryError> {
    let provider = gcp_auth::provider()
        .await
        .map_err(|e| TelemetryError::Auth(format!("Failed to create auth provider: {}", e)))?;

    let token = provider
        .token(&[TRACE_SCOPE])
        .await
        .map_err(|e| TelemetryError::Auth(format!("Failed to get token: {}", e)))?;

    metadata_for(token.as_str(), project_id)
}

fn metadata_for(token: &str, project_id: &str) -> Result<MetadataMap, TelemetryError> {
    let mut metadata = MetadataMap::new();

    metadata.insert(
        "authorization",
        MetadataValue::try_from(format!("Bearer {}", token))
            .map_err(|e| TelemetryError::Auth(format!("Invalid token format: {}", e)))?,
    );

    if !project_id.is_empty() {
        metadata.insert(
            "x-goog-user-project",
            MetadataValue::try_from(project_id)
                .map_err(|e| TelemetryError::Auth(format!("Invalid project ID: {}", e)))?,
        );
    }

    Ok(metadata)
}

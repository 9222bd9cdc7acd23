use std::env;

use crate::telemetry::default::Destination;
use crate::telemetry::error::TelemetryError;

/// GCP project a GCP-bound connection string reports to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcpConfig {
    pub project_id: String,
    pub endpoint: String,
}

impl GcpConfig {
    pub fn new(project_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Resolve the project for a destination
    /// - `ProjectId` from the connection string wins
    /// - otherwise GOOGLE_CLOUD_PROJECT / GCLOUD_PROJECT / GCP_PROJECT
    pub fn resolve(destination: &Destination) -> Result<Self, TelemetryError> {
        let project_id = destination
            .project_id
            .clone()
            .or_else(project_from_env)
            .ok_or_else(|| {
                TelemetryError::Config(format!(
                    "no GCP project for {}; set ProjectId or GOOGLE_CLOUD_PROJECT",
                    destination.endpoint
                ))
            })?;

        Ok(Self::new(project_id, destination.endpoint.clone()))
    }
}

fn project_from_env() -> Option<String> {
    env::var("GOOGLE_CLOUD_PROJECT")
        .or_else(|_| env::var("GCLOUD_PROJECT"))
        .or_else(|_| env::var("GCP_PROJECT"))
        .ok()
}

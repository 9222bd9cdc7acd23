use std::str::FromStr;

use crate::telemetry::error::TelemetryError;

/// Where the OpenTelemetry backend sends records, read from a connection
/// string.
///
/// Two forms are accepted:
/// - a bare endpoint URL, `http://collector:4317`
/// - `Key=Value` pairs separated by `;`, e.g.
///   `Endpoint=https://telemetry.googleapis.com;ProjectId=my-project`.
///   Keys are case-insensitive and unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub endpoint: String,
    pub project_id: Option<String>,
}

impl Destination {
    pub fn parse(connection_string: &str) -> Result<Self, TelemetryError> {
        let raw = connection_string.trim();
        if raw.is_empty() {
            return Err(TelemetryError::Config("connection string is empty".into()));
        }

        if !is_key_value_form(raw) {
            return Ok(Self {
                endpoint: raw.to_string(),
                project_id: None,
            });
        }

        let mut endpoint = None;
        let mut project_id = None;
        for segment in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let Some((key, value)) = segment.split_once('=') else {
                return Err(TelemetryError::Config(format!(
                    "malformed connection string segment: {}",
                    segment
                )));
            };
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "endpoint" | "ingestionendpoint" => endpoint = Some(value.to_string()),
                "projectid" => project_id = Some(value.to_string()),
                _ => {}
            }
        }

        let endpoint = endpoint
            .filter(|e| !e.is_empty())
            .ok_or_else(|| TelemetryError::Config("connection string has no Endpoint".into()))?;

        Ok(Self {
            endpoint,
            project_id: project_id.filter(|p| !p.is_empty()),
        })
    }

    /// True when the endpoint is Google's telemetry API
    pub fn is_gcp(&self) -> bool {
        self.endpoint.contains("googleapis.com")
    }
}

impl FromStr for Destination {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// `a=b` before any `scheme://` means pairs; a URL may carry `=` in its query.
fn is_key_value_form(raw: &str) -> bool {
    match (raw.find('='), raw.find("://")) {
        (Some(eq), Some(scheme)) => eq < scheme,
        (Some(_), None) => true,
        _ => false,
    }
}

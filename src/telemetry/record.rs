use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::telemetry::error::TelemetryError;

/// Property key added to records that went through the pending queue.
pub const PROVENANCE_KEY: &str = "isCaughtInQueue";

/// Property value paired with [`PROVENANCE_KEY`].
pub const PROVENANCE_VALUE: &str = "Yes";

/// Free-form properties attached to an exception record.
pub type Properties = BTreeMap<String, serde_json::Value>;

/// Severity of a logged exception, numbered like the backend expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SeverityLevel {
    Verbose = 0,
    #[default]
    Information = 1,
    Warning = 2,
    Error = 3,
    Critical = 4,
}

impl SeverityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verbose => "Verbose",
            Self::Information => "Information",
            Self::Warning => "Warning",
            Self::Error => "Error",
            Self::Critical => "Critical",
        }
    }
}

impl fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeverityLevel {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "verbose" | "0" => Ok(Self::Verbose),
            "information" | "info" | "1" => Ok(Self::Information),
            "warning" | "warn" | "2" => Ok(Self::Warning),
            "error" | "3" => Ok(Self::Error),
            "critical" | "4" => Ok(Self::Critical),
            other => Err(TelemetryError::Config(format!(
                "unknown severity level: {}",
                other
            ))),
        }
    }
}

/// The error object carried by a record: a message plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionError {
    pub message: String,
    /// Type name reported as `exception.type`, `"Error"` when unknown.
    pub kind: String,
    pub stack: Option<String>,
}

impl ExceptionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: "Error".to_string(),
            stack: None,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Capture a Rust error. The source chain stands in for the stack.
    pub fn from_error<E>(err: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {}", cause));
            source = cause.source();
        }

        let kind = std::any::type_name::<E>()
            .rsplit("::")
            .next()
            .unwrap_or("Error")
            .to_string();

        Self {
            message: err.to_string(),
            kind,
            stack: (!chain.is_empty()).then(|| chain.join("\n")),
        }
    }
}

impl From<&str> for ExceptionError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ExceptionError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl fmt::Display for ExceptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// One exception as handed to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionRecord {
    pub error: ExceptionError,
    pub severity_level: SeverityLevel,
    pub properties: Option<Properties>,
}

impl ExceptionRecord {
    pub fn new(
        error: impl Into<ExceptionError>,
        severity_level: SeverityLevel,
        properties: Option<Properties>,
    ) -> Self {
        Self {
            error: error.into(),
            severity_level,
            properties,
        }
    }

    /// Mark the record as sent from the pending queue rather than live.
    pub fn mark_buffered(mut self) -> Self {
        self.properties.get_or_insert_with(Properties::new).insert(
            PROVENANCE_KEY.to_string(),
            serde_json::Value::String(PROVENANCE_VALUE.to_string()),
        );
        self
    }

    pub fn is_buffered(&self) -> bool {
        self.properties
            .as_ref()
            .and_then(|props| props.get(PROVENANCE_KEY))
            .and_then(|value| value.as_str())
            == Some(PROVENANCE_VALUE)
    }
}

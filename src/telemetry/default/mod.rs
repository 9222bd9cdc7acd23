//! OpenTelemetry backend.
//!
//! Each exception becomes a span named `exception` carrying one
//! `exception` event with the semantic-convention attributes
//! (`exception.type`, `exception.message`, `exception.stacktrace`), the
//! severity, and the record's properties. Spans go out through an OTLP/gRPC
//! batch exporter.
//!
//! # Recognized options
//!
//! | Option | Effect |
//! |--------|--------|
//! | `serviceName` | `service.name` resource attribute |
//! | `serviceVersion` | `service.version` resource attribute |
//! | `disableTelemetry` | `true` drops every record |
//!
//! # Example
//!
//! ```rust,ignore
//! use exception_logger::telemetry::{with_exception_logger, OtelClientFactory};
//!
//! let mounted = with_exception_logger(app, "http://localhost:4317", None)
//!     .mount(OtelClientFactory)?;
//! ```

mod client;
mod connection;
mod provider;

pub use client::{exception_attributes, OtelClient, DISABLE_TELEMETRY_OPTION};
pub use connection::Destination;
pub use provider::OtelClientFactory;

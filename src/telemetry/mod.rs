//! Exception logging that survives a slow-starting telemetry client.
//!
//! The telemetry backend's client is created and loaded asynchronously.
//! Exceptions logged before then, including panics, are buffered and sent
//! in order once the client is usable, each marked with
//! `isCaughtInQueue = "Yes"`.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use exception_logger::telemetry::{self, with_exception_logger, OtelClientFactory};
//!
//! telemetry::interceptor::install(telemetry::PendingExceptions::global());
//!
//! let app = |request: Request, logger: &ExceptionLogger| handle(request, logger);
//! let mounted = with_exception_logger(app, "http://localhost:4317", None)
//!     .mount(OtelClientFactory)?;
//!
//! mounted.logger().log_exception(err, Some(SeverityLevel::Error), None);
//! ```
//!
//! # Getting the logger
//!
//! - Explicit: the wrapped [`Component`] receives it as an extra input, and
//!   [`Mounted::logger`] hands out clones.
//! - Ambient: [`current_logger`] / [`consume`] inside [`provide`] or
//!   [`provide_async`]; a no-op logger outside.
//! - Pull: [`exception_logger`], which still buffers when called before any
//!   logger was provided.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `EXCEPTION_LOGGER_CONNECTION_STRING` | Telemetry destination | `http://localhost:4317` |
//! | `EXCEPTION_LOGGER_OPTIONS` | JSON object of backend options | `{}` |
//! | `RUST_LOG` | Log level filter | `info` |
//! | `LOG_FORMAT` | `pretty` or `json` | `pretty` |
//!
//! # Module Structure
//!
//! - [`pending`]: Pending queue and readiness gate
//! - [`facade`]: `log_exception` dispatch
//! - [`lifecycle`]: Client creation, drain and teardown
//! - [`propagate`]: Ambient and pull access to the logger
//! - [`interceptor`]: Panic-hook interception
//! - [`host`]: Mounting a component
//! - [`api`]: Backend traits
//! - [`default`]: OpenTelemetry backend
//! - [`memory`]: In-memory backend
//! - [`gcp`]: GCP destination (feature-gated)

pub mod api;
pub mod config;
pub mod default;
pub mod error;
pub mod facade;
pub mod host;
pub mod interceptor;
pub mod lifecycle;
pub mod logging;
pub mod memory;
pub mod pending;
pub mod propagate;
pub mod record;
pub mod resource;

#[cfg(feature = "telemetry-gcp")]
pub mod gcp;
#[cfg(feature = "telemetry-gcp")]
pub use gcp::GcpConfig;

// Re-exports
pub use api::{ClientFactory, TelemetryClient};
pub use config::{ClientConfig, ClientOptions, LogFormat, LoggerConfig, LoggerConfigBuilder};
pub use default::OtelClientFactory;
pub use error::TelemetryError;
pub use facade::{ExceptionLogger, LoggingFacade};
pub use host::{with_exception_logger, Component, Mounted, WithExceptionLogger};
pub use interceptor::{GlobalErrorInterceptor, UncaughtError};
pub use lifecycle::{ClientLifecycle, LifecycleState};
pub use logging::init_logging;
pub use pending::{GateState, PendingExceptions};
pub use propagate::{consume, current_logger, exception_logger, provide, provide_async};
pub use record::{ExceptionError, ExceptionRecord, Properties, SeverityLevel};

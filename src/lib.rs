//! Buffered exception telemetry for hosts whose telemetry client loads
//! asynchronously. See [`telemetry`].

pub mod telemetry;

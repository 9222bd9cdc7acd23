//! Initialization entry point: wrap a component so it gets a logger.

use std::sync::Arc;

use crate::telemetry::api::ClientFactory;
use crate::telemetry::config::{ClientConfig, ClientOptions};
use crate::telemetry::error::TelemetryError;
use crate::telemetry::facade::{ExceptionLogger, LoggingFacade};
use crate::telemetry::lifecycle::{ClientLifecycle, LifecycleState};
use crate::telemetry::pending::PendingExceptions;
use crate::telemetry::propagate;

/// Something that renders `P` into an output and accepts a logger as an
/// extra input.
pub trait Component<P> {
    type Output;

    fn render(&self, props: P, logger: &ExceptionLogger) -> Self::Output;
}

impl<P, O, F> Component<P> for F
where
    F: Fn(P, &ExceptionLogger) -> O,
{
    type Output = O;

    fn render(&self, props: P, logger: &ExceptionLogger) -> O {
        self(props, logger)
    }
}

/// A component bound to a telemetry destination but not mounted yet.
pub struct WithExceptionLogger<C> {
    component: C,
    config: ClientConfig,
}

/// Wrap `component` so that mounting it creates a client for
/// `connection_string`. `options` reach the backend unchanged.
pub fn with_exception_logger<C>(
    component: C,
    connection_string: impl Into<String>,
    options: Option<ClientOptions>,
) -> WithExceptionLogger<C> {
    WithExceptionLogger {
        component,
        config: ClientConfig::new(connection_string, options),
    }
}

impl<C> WithExceptionLogger<C> {
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Mount on the process-wide pending queue.
    pub fn mount<F: ClientFactory>(self, factory: F) -> Result<Mounted<C>, TelemetryError> {
        self.mount_with(Arc::new(factory), PendingExceptions::global())
    }

    /// Mount on an explicit pending queue. Must run inside a tokio runtime;
    /// client creation continues in the background.
    pub fn mount_with<F: ClientFactory>(
        self,
        factory: Arc<F>,
        pending: Arc<PendingExceptions>,
    ) -> Result<Mounted<C>, TelemetryError> {
        let facade = LoggingFacade::new(pending);
        let logger = ExceptionLogger::from_facade(facade.clone());
        let lifecycle = ClientLifecycle::new(facade);
        lifecycle.start(factory, self.config)?;

        Ok(Mounted {
            component: self.component,
            logger,
            lifecycle,
        })
    }
}

/// A mounted component. Dropping it tears the client down.
pub struct Mounted<C> {
    component: C,
    logger: ExceptionLogger,
    lifecycle: ClientLifecycle,
}

impl<C> Mounted<C> {
    pub fn logger(&self) -> ExceptionLogger {
        self.logger.clone()
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub async fn ready(&self) -> LifecycleState {
        self.lifecycle.ready().await
    }

    /// Render with the logger injected and provided to everything below.
    pub fn render<P>(&self, props: P) -> C::Output
    where
        C: Component<P>,
    {
        propagate::provide(&self.logger, || self.component.render(props, &self.logger))
    }

    /// Flush the client. Idempotent; also runs on drop.
    pub fn unmount(&self) {
        self.lifecycle.teardown();
    }
}

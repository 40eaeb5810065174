//! Per-service loggers, materialized on demand.
//!
//! The reference user of the dependency-tracker protocol: services declare
//! an (optional or required) dependency on [`Logger`], and a
//! [`LoggerAdmin`] registered as tracker for that interface materializes one
//! logger per requesting service — tagged with a filter matching only that
//! requestor, so the injection machinery wires it nowhere else — and tears
//! it down again when the requestor goes away.
//!
//! [`TracingLogger`] bridges the interface onto the `tracing` ecosystem;
//! alternative back-ends implement [`Logger`] + [`Service`] and plug into
//! the same admin.
//!
//! # Example
//!
//! ```no_run
//! use weft_runtime::{DependencyManager, LoggerAdmin, ServiceSpec, TracingLogger};
//!
//! let dm = DependencyManager::new();
//! dm.create_service(LoggerAdmin::spec(TracingLogger::from_properties)).unwrap();
//! ```

use crate::context::ServiceContext;
use crate::lifecycle::ServiceSpec;
use crate::registration::DependencyTrackerRegistration;
use std::collections::HashMap;
use std::rc::Rc;
use weft_service::{DependencyRequest, DependencyTracker, Service, StartBehaviour};
use weft_types::{keys, Filter, LogLevel, Properties, PropertyValue, ServiceId};

/// Level-gated logging interface exposed by logger services.
pub trait Logger: 'static {
    /// Current threshold.
    fn log_level(&self) -> LogLevel;

    /// Changes the threshold.
    fn set_log_level(&mut self, level: LogLevel);

    /// Emits a message at `level`. Implementations apply the threshold.
    fn log(&mut self, level: LogLevel, message: &str);

    /// `true` if `level` passes the threshold.
    fn enabled(&self, level: LogLevel) -> bool {
        level >= self.log_level()
    }
}

/// [`Logger`] back-end forwarding to the `tracing` ecosystem.
///
/// Carries the id of the service it was created for, so log lines stay
/// attributable after aggregation.
pub struct TracingLogger {
    level: LogLevel,
    target: Option<ServiceId>,
}

impl TracingLogger {
    /// Builds a logger from the properties the admin attaches: `log-level`
    /// and `target-service-id`.
    #[must_use]
    pub fn from_properties(properties: &Properties) -> Self {
        Self {
            level: properties.get_log_level(keys::LOG_LEVEL).unwrap_or_default(),
            target: properties.target_service_id(),
        }
    }
}

impl Service for TracingLogger {
    fn start(&mut self) -> StartBehaviour {
        StartBehaviour::Succeeded
    }

    fn stop(&mut self) -> StartBehaviour {
        StartBehaviour::Succeeded
    }
}

impl Logger for TracingLogger {
    fn log_level(&self) -> LogLevel {
        self.level
    }

    fn set_log_level(&mut self, level: LogLevel) {
        self.level = level;
    }

    fn log(&mut self, level: LogLevel, message: &str) {
        if !self.enabled(level) {
            return;
        }
        let service = self.target.map(|id| id.raw());
        match level {
            LogLevel::Trace => tracing::trace!(service, "{message}"),
            LogLevel::Debug => tracing::debug!(service, "{message}"),
            LogLevel::Info => tracing::info!(service, "{message}"),
            LogLevel::Warn => tracing::warn!(service, "{message}"),
            LogLevel::Error => tracing::error!(service, "{message}"),
        }
    }
}

/// Factory service materializing one logger per requestor.
///
/// Generic over the logger back-end; the factory closure receives the
/// properties the admin assembled (requested level, target service id).
pub struct LoggerAdmin<L> {
    ctx: ServiceContext,
    factory: Rc<dyn Fn(&Properties) -> L>,
    loggers: HashMap<ServiceId, ServiceId>,
    registration: Option<DependencyTrackerRegistration>,
}

impl<L: Service + Logger> LoggerAdmin<L> {
    /// Creates an admin with the given back-end factory.
    pub fn new(ctx: &ServiceContext, factory: impl Fn(&Properties) -> L + 'static) -> Self {
        Self {
            ctx: ctx.clone(),
            factory: Rc::new(factory),
            loggers: HashMap::new(),
            registration: None,
        }
    }

    /// Convenience [`ServiceSpec`] for registering the admin.
    #[must_use]
    pub fn spec(factory: impl Fn(&Properties) -> L + 'static) -> ServiceSpec<Self> {
        ServiceSpec::new(move |_reg, _props, ctx| Self::new(ctx, factory))
    }

    /// Number of loggers currently materialized.
    #[must_use]
    pub fn logger_count(&self) -> usize {
        self.loggers.len()
    }
}

impl<L: Service + Logger> Service for LoggerAdmin<L> {
    fn start(&mut self) -> StartBehaviour {
        match self
            .ctx
            .manager()
            .register_dependency_tracker::<dyn Logger, Self>(self.ctx.service_id())
        {
            Ok(registration) => {
                self.registration = Some(registration);
                StartBehaviour::Succeeded
            }
            Err(err) => {
                tracing::warn!(%err, "logger admin failed to register tracker");
                StartBehaviour::FailedDoNotRetry
            }
        }
    }

    fn stop(&mut self) -> StartBehaviour {
        self.registration = None;
        StartBehaviour::Succeeded
    }
}

impl<L: Service + Logger> DependencyTracker<dyn Logger> for LoggerAdmin<L> {
    fn on_request(&mut self, request: &DependencyRequest) {
        if self.loggers.contains_key(&request.requestor) {
            return;
        }

        let level = request
            .properties
            .as_ref()
            .and_then(|p| p.get_log_level(keys::LOG_LEVEL))
            .unwrap_or_default();

        // The filter scopes the new logger to its one requestor.
        let properties = Properties::new()
            .with(keys::LOG_LEVEL, PropertyValue::LogLevel(level))
            .with(
                keys::TARGET_SERVICE_ID,
                PropertyValue::Uint(request.requestor.raw()),
            )
            .with(
                keys::FILTER,
                PropertyValue::Filter(Filter::service_id(request.requestor)),
            );

        let factory = self.factory.clone();
        let spec = ServiceSpec::new(move |_reg, props, _ctx| factory(props))
            .with_properties(properties)
            .exposes::<dyn Logger, _>(|s| s);

        match self.ctx.manager().create_service(spec) {
            Ok(logger) => {
                tracing::debug!(requestor = %request.requestor, %logger, "logger materialized");
                self.loggers.insert(request.requestor, logger);
            }
            Err(err) => {
                tracing::warn!(requestor = %request.requestor, %err, "logger construction failed");
            }
        }
    }

    fn on_undo_request(&mut self, request: &DependencyRequest) {
        if let Some(logger) = self.loggers.remove(&request.requestor) {
            tracing::debug!(requestor = %request.requestor, %logger, "logger torn down");
            self.ctx
                .manager()
                .remove_service(self.ctx.service_id(), logger);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_logger_defaults() {
        let logger = TracingLogger::from_properties(&Properties::new());
        assert_eq!(logger.log_level(), LogLevel::Info);
        assert!(logger.enabled(LogLevel::Error));
        assert!(!logger.enabled(LogLevel::Debug));
    }

    #[test]
    fn tracing_logger_reads_properties() {
        let props = Properties::new()
            .with(keys::LOG_LEVEL, PropertyValue::LogLevel(LogLevel::Trace))
            .with(keys::TARGET_SERVICE_ID, PropertyValue::Uint(4));
        let mut logger = TracingLogger::from_properties(&props);
        assert_eq!(logger.log_level(), LogLevel::Trace);
        assert!(logger.enabled(LogLevel::Trace));

        logger.set_log_level(LogLevel::Error);
        assert!(!logger.enabled(LogLevel::Warn));
        // Suppressed by the threshold; must not panic either way.
        logger.log(LogLevel::Debug, "dropped");
    }
}

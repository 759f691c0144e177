//! # The Container: a reference registry for service entries
//!
//! Stores type-erased entries by name and drives them through the
//! narrowing traits in [`crate::erased`]. Typed access goes through
//! [`Container::invoke`] / [`Container::invoke_named`].
//!
//! # Architecture
//! ```text
//! ContainerBuilder ──build()──> Container ──clone_container()──> Container
//!                                   │
//!                     DashMap<name, Arc<dyn AnyService>>
//! ```
//!
//! # Examples
//! ```rust
//! use khidma_service::prelude::*;
//! use std::sync::Arc;
//!
//! struct Config { url: String }
//! struct Database { url: String }
//!
//! let container = Container::new();
//! container.provide_value(Arc::new(Config { url: "postgres://localhost".into() })).unwrap();
//! container.provide(|i| {
//!     let config: Arc<Config> = invoke(i)?;
//!     Ok(Arc::new(Database { url: config.url.clone() }))
//! }).unwrap();
//!
//! let db: Arc<Database> = container.invoke().unwrap();
//! assert_eq!(db.url, "postgres://localhost");
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use khidma_support::rendering::{ServiceRow, render_service_table};
use tracing::{debug, info, instrument, trace, warn};

use crate::context::Context;
use crate::capability::Capabilities;
use crate::erased::{AnyService, GetNamerService};
use crate::error::{AlreadyProvidedError, KhidmaError, Result, ShutdownErrors};
use crate::inference::infer_service_name;
use crate::info::{ServiceInfo, infer_service_info};
use crate::injector::{self, Injector};
use crate::service::{Service, ServiceEager};

// ============================================================
// ContainerBuilder
// ============================================================

/// Settings applied by a [`Container`].
#[derive(Debug, Clone, Default)]
pub struct ContainerOptions {
    /// Replace an existing entry instead of failing with `AlreadyProvided`.
    pub allow_override: bool,
    /// Upper bound for each service's health check.
    pub health_check_timeout: Option<Duration>,
    /// Upper bound for each service's shutdown hook.
    pub shutdown_timeout: Option<Duration>,
}

/// Builds a [`Container`] with custom options.
///
/// # Examples
/// ```rust
/// use khidma_service::container::Container;
/// use std::time::Duration;
///
/// let container = Container::builder()
///     .allow_override(true)
///     .health_check_timeout(Duration::from_secs(1))
///     .build();
/// assert!(container.options().allow_override);
/// ```
#[derive(Debug, Default)]
pub struct ContainerBuilder {
    options: ContainerOptions,
}

impl ContainerBuilder {
    /// Allow overriding previously provided services.
    pub fn allow_override(mut self, allow: bool) -> Self {
        self.options.allow_override = allow;
        self
    }

    /// Bound every health check by `timeout`.
    pub fn health_check_timeout(mut self, timeout: Duration) -> Self {
        self.options.health_check_timeout = Some(timeout);
        self
    }

    /// Bound every shutdown hook by `timeout`.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.options.shutdown_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Container {
        Container::with_options(self.options)
    }
}

// ═══════════════════════════════════════════
// Container
// ═══════════════════════════════════════════

struct Registered {
    order: u64,
    service: Arc<dyn AnyService>,
}

/// Thread-safe registry of named service entries.
pub struct Container {
    services: DashMap<String, Registered>,
    next_order: AtomicU64,
    options: ContainerOptions,
}

impl Container {
    /// An empty container with default options.
    pub fn new() -> Self {
        Self::with_options(ContainerOptions::default())
    }

    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::default()
    }

    pub fn with_options(options: ContainerOptions) -> Self {
        Self {
            services: DashMap::new(),
            next_order: AtomicU64::new(0),
            options,
        }
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.options
    }

    // ── Registration ──
    //
    // The plain `provide*` methods register without capabilities: a generic
    // `T` cannot be inspected for protocols. The `*_with` forms take a
    // declared table, and the `provide!` macro detects one where `T` is
    // concrete.

    /// Provide a lazy service named after `T`.
    #[track_caller]
    pub fn provide<T: Clone + Send + Sync + 'static>(
        &self,
        provider: impl Fn(&dyn Injector) -> Result<T> + Send + Sync + 'static,
    ) -> Result<()> {
        self.provide_with(provider, Capabilities::none())
    }

    #[track_caller]
    pub fn provide_with<T: Clone + Send + Sync + 'static>(
        &self,
        provider: impl Fn(&dyn Injector) -> Result<T> + Send + Sync + 'static,
        capabilities: Capabilities<T>,
    ) -> Result<()> {
        self.provide_named_with(infer_service_name::<T>(), provider, capabilities)
    }

    /// Provide a lazy service named `name`.
    #[track_caller]
    pub fn provide_named<T: Clone + Send + Sync + 'static>(
        &self,
        name: impl Into<String>,
        provider: impl Fn(&dyn Injector) -> Result<T> + Send + Sync + 'static,
    ) -> Result<()> {
        self.provide_named_with(name, provider, Capabilities::none())
    }

    #[track_caller]
    pub fn provide_named_with<T: Clone + Send + Sync + 'static>(
        &self,
        name: impl Into<String>,
        provider: impl Fn(&dyn Injector) -> Result<T> + Send + Sync + 'static,
        capabilities: Capabilities<T>,
    ) -> Result<()> {
        self.register(Service::lazy(name, provider).with_capabilities(capabilities))
    }

    /// Provide an already-built value, named after `T`.
    #[track_caller]
    pub fn provide_value<T: Clone + Send + Sync + 'static>(&self, value: T) -> Result<()> {
        self.provide_value_with(value, Capabilities::none())
    }

    #[track_caller]
    pub fn provide_value_with<T: Clone + Send + Sync + 'static>(
        &self,
        value: T,
        capabilities: Capabilities<T>,
    ) -> Result<()> {
        self.provide_named_value_with(infer_service_name::<T>(), value, capabilities)
    }

    /// Provide an already-built value named `name`.
    #[track_caller]
    pub fn provide_named_value<T: Clone + Send + Sync + 'static>(
        &self,
        name: impl Into<String>,
        value: T,
    ) -> Result<()> {
        self.provide_named_value_with(name, value, Capabilities::none())
    }

    #[track_caller]
    pub fn provide_named_value_with<T: Clone + Send + Sync + 'static>(
        &self,
        name: impl Into<String>,
        value: T,
        capabilities: Capabilities<T>,
    ) -> Result<()> {
        self.register(Service::eager(name, value).with_capabilities(capabilities))
    }

    /// Run `provider` now and provide its result under `name`.
    ///
    /// # Errors
    /// [`KhidmaError::AlreadyProvided`] before the provider runs, or the
    /// provider's own error.
    #[track_caller]
    pub fn provide_eager<T: Clone + Send + Sync + 'static>(
        &self,
        name: impl Into<String>,
        provider: impl FnOnce(&dyn Injector) -> Result<T>,
    ) -> Result<()> {
        self.provide_eager_with(name, provider, Capabilities::none())
    }

    #[track_caller]
    pub fn provide_eager_with<T: Clone + Send + Sync + 'static>(
        &self,
        name: impl Into<String>,
        provider: impl FnOnce(&dyn Injector) -> Result<T>,
        capabilities: Capabilities<T>,
    ) -> Result<()> {
        let service = self.build_eager(name, provider)?;
        self.register(service.with_capabilities(capabilities))
    }

    /// Runs `provider` against this container and wraps the result, without
    /// registering it.
    ///
    /// # Errors
    /// [`KhidmaError::AlreadyProvided`] if `name` is taken (the provider does
    /// not run), or the provider's own error.
    #[track_caller]
    pub fn build_eager<T: Clone + Send + Sync + 'static>(
        &self,
        name: impl Into<String>,
        provider: impl FnOnce(&dyn Injector) -> Result<T>,
    ) -> Result<Service<T>> {
        let name = name.into();
        if !self.options.allow_override && self.services.contains_key(&name) {
            return Err(already_provided(name));
        }
        Ok(ServiceEager::build(name, self, provider)?.into())
    }

    /// Provide a transient service named `name`.
    pub fn provide_transient<T: Clone + Send + Sync + 'static>(
        &self,
        name: impl Into<String>,
        provider: impl Fn(&dyn Injector) -> Result<T> + Send + Sync + 'static,
    ) -> Result<()> {
        self.provide_transient_with(name, provider, Capabilities::none())
    }

    pub fn provide_transient_with<T: Clone + Send + Sync + 'static>(
        &self,
        name: impl Into<String>,
        provider: impl Fn(&dyn Injector) -> Result<T> + Send + Sync + 'static,
        capabilities: Capabilities<T>,
    ) -> Result<()> {
        self.register(Service::transient(name, provider).with_capabilities(capabilities))
    }

    /// Install a fully configured entry.
    ///
    /// # Errors
    /// [`KhidmaError::AlreadyProvided`] if the name is taken and override
    /// is disabled.
    pub fn register<T: Clone + Send + Sync + 'static>(&self, service: impl Into<Service<T>>) -> Result<()> {
        let service: Service<T> = service.into();
        let name = service.name().to_string();
        self.insert(name, Arc::new(service))
    }

    fn insert(&self, name: String, service: Arc<dyn AnyService>) -> Result<()> {
        let kind = service.service_type();
        let order = self.next_order.fetch_add(1, Ordering::Relaxed);

        match self.services.entry(name) {
            Entry::Occupied(mut occupied) => {
                if !self.options.allow_override {
                    return Err(already_provided(occupied.key().clone()));
                }
                debug!(service = %occupied.key(), kind = %kind, "Overriding service");
                occupied.insert(Registered { order, service });
            }
            Entry::Vacant(vacant) => {
                debug!(service = %vacant.key(), kind = %kind, "Provided service");
                vacant.insert(Registered { order, service });
            }
        }
        Ok(())
    }

    // ── Resolution ──

    /// Resolve the service named after `T`.
    pub fn invoke<T: Clone + Send + Sync + 'static>(&self) -> Result<T> {
        injector::invoke(self)
    }

    /// Resolve the service named `name`.
    pub fn invoke_named<T: Clone + Send + Sync + 'static>(&self, name: &str) -> Result<T> {
        injector::invoke_named(self, name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    // ── Introspection ──

    pub fn service_info(&self, name: &str) -> Option<ServiceInfo> {
        infer_service_info(self, name)
    }

    /// Summaries of every service, in registration order.
    pub fn list_provided_services(&self) -> Vec<ServiceInfo> {
        self.snapshot()
            .into_iter()
            .map(|(name, service)| ServiceInfo::describe(name, service.as_ref()))
            .collect()
    }

    /// Human-readable listing with glyphs, capabilities and registration sites.
    pub fn describe(&self) -> String {
        let rows: Vec<ServiceRow> = self
            .snapshot()
            .into_iter()
            .map(|(name, service)| {
                let info = ServiceInfo::describe(name, service.as_ref());
                ServiceRow {
                    glyph: info.service_type.glyph().to_string(),
                    kind: info.service_type.to_string(),
                    tags: info.tags().into_iter().map(String::from).collect(),
                    source: info
                        .service_type
                        .has_provenance()
                        .then(|| service.source().map(|p| p.frame.to_string()))
                        .flatten(),
                    name: info.name,
                }
            })
            .collect();

        render_service_table(&rows)
    }

    // ── Lifecycle ──

    /// Health-check every service. Entries without a health protocol pass.
    ///
    /// The configured timeout applies to each service separately.
    #[instrument(skip(self, ctx), name = "container_health_check")]
    pub async fn health_check(&self, ctx: &Context) -> BTreeMap<String, Result<()>> {
        let mut results = BTreeMap::new();

        for (name, service) in self.snapshot() {
            let ctx = bounded_context(ctx, self.options.health_check_timeout);
            let result = within_deadline(&ctx, service.healthcheck(&ctx)).await;
            match result {
                Err(ref err) if err.is_context_error() => {
                    warn!(service = %name, error = %err, "Health check interrupted");
                }
                Err(ref err) => warn!(service = %name, error = %err, "Health check failed"),
                Ok(()) => {}
            }
            results.insert(name, result);
        }

        results
    }

    /// Health-check one service.
    pub async fn health_check_named(&self, name: &str, ctx: &Context) -> Result<()> {
        let service = self
            .service_get(name)
            .ok_or_else(|| injector::not_found(self, name))?;
        let ctx = bounded_context(ctx, self.options.health_check_timeout);
        within_deadline(&ctx, service.healthcheck(&ctx)).await
    }

    /// Shut every service down, most recently registered first.
    ///
    /// Transient services own no instance and are skipped. Every other
    /// service is attempted; failures are collected into
    /// [`KhidmaError::Shutdown`].
    #[instrument(skip(self, ctx), name = "container_shutdown")]
    pub async fn shutdown(&self, ctx: &Context) -> Result<()> {
        let services = self.snapshot();
        info!(services = services.len(), "Shutting down container");

        let mut errors = ShutdownErrors::default();

        for (name, service) in services.into_iter().rev() {
            if !service.service_type().is_cached() {
                trace!(service = %name, "Skipping uncached service");
                continue;
            }
            let ctx = bounded_context(ctx, self.options.shutdown_timeout);
            if let Err(err) = within_deadline(&ctx, service.shutdown(&ctx)).await {
                warn!(service = %name, error = %err, "Shutdown failed");
                errors.failures.push((name, err));
            }
        }

        if errors.is_empty() {
            info!("Container shut down");
            Ok(())
        } else {
            Err(KhidmaError::Shutdown(errors))
        }
    }

    /// Shut one service down.
    pub async fn shutdown_named(&self, name: &str, ctx: &Context) -> Result<()> {
        let service = self
            .service_get(name)
            .ok_or_else(|| injector::not_found(self, name))?;
        let ctx = bounded_context(ctx, self.options.shutdown_timeout);
        within_deadline(&ctx, service.shutdown(&ctx)).await
    }

    /// A child container holding copies of every entry.
    ///
    /// Lazy services are rebuilt independently in the child; eager
    /// instances are shared.
    pub fn clone_container(&self) -> Container {
        let child = Container::with_options(self.options.clone());
        for entry in self.services.iter() {
            child.services.insert(
                entry.key().clone(),
                Registered {
                    order: entry.order,
                    service: entry.service.clone_service(),
                },
            );
        }
        child
            .next_order
            .store(self.next_order.load(Ordering::Relaxed), Ordering::Relaxed);

        debug!(services = child.len(), "Cloned container");
        child
    }

    /// Entries in registration order, detached from the map.
    fn snapshot(&self) -> Vec<(String, Arc<dyn AnyService>)> {
        let mut entries: Vec<(u64, String, Arc<dyn AnyService>)> = self
            .services
            .iter()
            .map(|e| (e.order, e.key().clone(), Arc::clone(&e.service)))
            .collect();
        entries.sort_by_key(|(order, _, _)| *order);
        entries
            .into_iter()
            .map(|(_, name, service)| (name, service))
            .collect()
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Injector for Container {
    fn service_get(&self, name: &str) -> Option<Arc<dyn AnyService>> {
        self.services.get(name).map(|entry| Arc::clone(&entry.service))
    }

    fn service_names(&self) -> Vec<String> {
        self.snapshot().into_iter().map(|(name, _)| name).collect()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("provided", &self.services.len())
            .field("options", &self.options)
            .finish()
    }
}

fn already_provided(name: String) -> KhidmaError {
    KhidmaError::AlreadyProvided(AlreadyProvidedError { name })
}

fn bounded_context(ctx: &Context, timeout: Option<Duration>) -> Context {
    match timeout {
        Some(timeout) => ctx.with_timeout(timeout),
        None => ctx.clone(),
    }
}

/// Races `hook` against the context deadline.
async fn within_deadline(ctx: &Context, hook: impl Future<Output = Result<()>>) -> Result<()> {
    match ctx.deadline() {
        Some(deadline) => tokio::time::timeout_at(deadline, hook)
            .await
            .unwrap_or(Err(KhidmaError::DeadlineExceeded)),
        None => hook.await,
    }
}

/// Registers a service with the capabilities its concrete type implements.
///
/// Expands to [`Container::register`] (or [`Container::build_eager`] then
/// `register`) with a table built by [`detect_capabilities!`](crate::detect_capabilities).
///
/// ```
/// use khidma_service::prelude::*;
/// use std::sync::Arc;
///
/// struct Broker;
///
/// impl HealthCheck for Broker {
///     fn health_check(&self) -> HookResult { Err("unreachable".into()) }
/// }
///
/// let container = Container::new();
/// provide!(container, value "broker" => Arc::new(Broker)).unwrap();
/// provide!(container, lazy "answer" => |_| Ok(42u32)).unwrap();
/// provide!(container, transient "id" => |_| Ok(String::from("req-1"))).unwrap();
/// provide!(container, eager "limit" => |_| Ok(10usize)).unwrap();
///
/// assert!(container.service_info("broker").unwrap().healthchecker);
/// assert!(!container.service_info("answer").unwrap().healthchecker);
/// ```
#[macro_export]
macro_rules! provide {
    ($container:expr, lazy $name:expr => $provider:expr $(,)?) => {
        $container.register($crate::detect_capabilities!($crate::service::Service::lazy(
            $name, $provider
        )))
    };
    ($container:expr, value $name:expr => $value:expr $(,)?) => {
        $container.register($crate::detect_capabilities!($crate::service::Service::eager(
            $name, $value
        )))
    };
    ($container:expr, transient $name:expr => $provider:expr $(,)?) => {
        $container.register($crate::detect_capabilities!($crate::service::Service::transient(
            $name, $provider
        )))
    };
    ($container:expr, eager $name:expr => $provider:expr $(,)?) => {{
        let container = &$container;
        match container.build_eager($name, $provider) {
            Ok(service) => container.register($crate::detect_capabilities!(service)),
            Err(err) => Err(err),
        }
    }};
}

/// Commonly used items: `use khidma_service::prelude::*;`
pub mod prelude {
    pub use super::{Container, ContainerBuilder, ContainerOptions};
    pub use crate::{capabilities, detect_capabilities, provide};
    pub use crate::capability::{
        Capabilities, HealthCheck, HealthCheckWithContext, HookResult, Shutdown, ShutdownWithContext,
        ShutdownWithContextAndError, ShutdownWithError,
    };
    pub use crate::context::Context;
    pub use crate::erased::{
        AnyService, ClonerService, GetNamerService, GetTyperService, HealthcheckerService,
        IsHealthcheckerService, IsShutdownerService, ShutdownerService, SourcerService,
    };
    pub use crate::error::{BoxError, KhidmaError, Result};
    pub use crate::inference::{infer_service_name, infer_service_stacktrace, infer_service_type};
    pub use crate::info::{ServiceInfo, infer_service_info};
    pub use crate::injector::{Injector, invoke, invoke_named};
    pub use crate::service::{Service, ServiceEager, ServiceLazy, ServiceTransient};
    pub use crate::service_type::ServiceType;
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

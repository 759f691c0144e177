//! Health-check and shutdown protocols for constructed instances.
//!
//! An instance opts into health checking by implementing one of
//! [`HealthCheck`] / [`HealthCheckWithContext`], and into shutdown by
//! implementing one of [`Shutdown`], [`ShutdownWithError`],
//! [`ShutdownWithContext`], [`ShutdownWithContextAndError`].
//!
//! A service entry learns which shape its element type satisfies through a
//! [`Capabilities`] table built at registration. [`capabilities!`] and
//! [`detect_capabilities!`] fill the table from the protocols the concrete
//! type implements; the builder methods declare shapes by hand. Each builder
//! method is only available when the type implements the matching protocol,
//! and the table keeps the highest-precedence shape it was offered:
//!
//! | protocol | precedence |
//! |---|---|
//! | `HealthCheckWithContext` | over `HealthCheck` |
//! | `ShutdownWithContextAndError` | over all other shutdown shapes |
//! | `ShutdownWithContext` | over `ShutdownWithError` and `Shutdown` |
//! | `ShutdownWithError` | over `Shutdown` |
//!
//! ```
//! use khidma_service::capability::{Capabilities, HealthCheck, Shutdown, ShutdownShape};
//! use khidma_service::error::BoxError;
//! use std::sync::Arc;
//!
//! struct Cache;
//!
//! impl HealthCheck for Cache {
//!     fn health_check(&self) -> Result<(), BoxError> { Ok(()) }
//! }
//!
//! impl Shutdown for Cache {
//!     fn shutdown(&self) {}
//! }
//!
//! let caps = Capabilities::<Arc<Cache>>::none().health_check().shutdown();
//! assert!(caps.is_healthchecker());
//! assert_eq!(caps.shutdown_shape(), Some(ShutdownShape::Bare));
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::context::Context;
use crate::error::{BoxError, KhidmaError, Result};

/// Boxed, `Send` future used by the capability dispatch table.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of a user hook.
pub type HookResult = std::result::Result<(), BoxError>;

// ── Protocols ──

/// Health check that ignores cancellation.
pub trait HealthCheck {
    fn health_check(&self) -> HookResult;
}

/// Health check that observes a [`Context`].
#[async_trait]
pub trait HealthCheckWithContext {
    async fn health_check_with_context(&self, ctx: &Context) -> HookResult;
}

/// Fire-and-forget shutdown.
pub trait Shutdown {
    fn shutdown(&self);
}

/// Shutdown that may fail.
pub trait ShutdownWithError {
    fn shutdown(&self) -> HookResult;
}

/// Shutdown that observes a [`Context`].
#[async_trait]
pub trait ShutdownWithContext {
    async fn shutdown(&self, ctx: &Context);
}

/// Shutdown that observes a [`Context`] and may fail.
#[async_trait]
pub trait ShutdownWithContextAndError {
    async fn shutdown(&self, ctx: &Context) -> HookResult;
}

impl<S: HealthCheck + ?Sized> HealthCheck for Arc<S> {
    fn health_check(&self) -> HookResult {
        (**self).health_check()
    }
}

#[async_trait]
impl<S: HealthCheckWithContext + Send + Sync + ?Sized> HealthCheckWithContext for Arc<S> {
    async fn health_check_with_context(&self, ctx: &Context) -> HookResult {
        (**self).health_check_with_context(ctx).await
    }
}

impl<S: Shutdown + ?Sized> Shutdown for Arc<S> {
    fn shutdown(&self) {
        <S as Shutdown>::shutdown(self)
    }
}

impl<S: ShutdownWithError + ?Sized> ShutdownWithError for Arc<S> {
    fn shutdown(&self) -> HookResult {
        <S as ShutdownWithError>::shutdown(self)
    }
}

#[async_trait]
impl<S: ShutdownWithContext + Send + Sync + ?Sized> ShutdownWithContext for Arc<S> {
    async fn shutdown(&self, ctx: &Context) {
        <S as ShutdownWithContext>::shutdown(self, ctx).await
    }
}

#[async_trait]
impl<S: ShutdownWithContextAndError + Send + Sync + ?Sized> ShutdownWithContextAndError for Arc<S> {
    async fn shutdown(&self, ctx: &Context) -> HookResult {
        <S as ShutdownWithContextAndError>::shutdown(self, ctx).await
    }
}

// ── Shapes ──

/// Which health protocol an element type was registered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HealthShape {
    Plain,
    WithContext,
}

/// Which shutdown protocol an element type was registered with.
///
/// Ordered by precedence, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShutdownShape {
    Bare,
    WithError,
    WithContext,
    WithContextAndError,
}

type Hook<T> = for<'a> fn(&'a T, &'a Context) -> BoxFuture<'a, HookResult>;

struct Hooked<S, T> {
    shape: S,
    call: Hook<T>,
}

impl<S: Copy, T> Clone for Hooked<S, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: Copy, T> Copy for Hooked<S, T> {}

// ── Dispatch table ──

/// Capability dispatch table for element type `T`.
///
/// Built once per registration, then shared by every instance the entry
/// produces.
pub struct Capabilities<T> {
    health: Option<Hooked<HealthShape, T>>,
    shutdown: Option<Hooked<ShutdownShape, T>>,
}

impl<T> Clone for Capabilities<T> {
    fn clone(&self) -> Self {
        Self {
            health: self.health,
            shutdown: self.shutdown,
        }
    }
}

impl<T> Default for Capabilities<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T> fmt::Debug for Capabilities<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("health", &self.health_shape())
            .field("shutdown", &self.shutdown_shape())
            .finish()
    }
}

impl<T> Capabilities<T> {
    /// A table with no capabilities: both flags report `false`.
    pub fn none() -> Self {
        Self {
            health: None,
            shutdown: None,
        }
    }

    pub fn health_shape(&self) -> Option<HealthShape> {
        self.health.map(|p| p.shape)
    }

    pub fn shutdown_shape(&self) -> Option<ShutdownShape> {
        self.shutdown.map(|p| p.shape)
    }

    pub fn is_healthchecker(&self) -> bool {
        self.health.is_some()
    }

    pub fn is_shutdowner(&self) -> bool {
        self.shutdown.is_some()
    }

    fn offer_health(mut self, shape: HealthShape, call: Hook<T>) -> Self {
        if self.health.is_none_or(|current| shape > current.shape) {
            self.health = Some(Hooked { shape, call });
        }
        self
    }

    fn offer_shutdown(mut self, shape: ShutdownShape, call: Hook<T>) -> Self {
        if self.shutdown.is_none_or(|current| shape > current.shape) {
            self.shutdown = Some(Hooked { shape, call });
        }
        self
    }

    /// Runs the registered health check against `instance`.
    ///
    /// Succeeds trivially when no health protocol was declared.
    pub(crate) async fn run_healthcheck(&self, name: &str, instance: &T, ctx: &Context) -> Result<()> {
        let Some(hook) = self.health else {
            return Ok(());
        };
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        trace!(service = name, shape = ?hook.shape, "Running health check");
        (hook.call)(instance, ctx)
            .await
            .map_err(|source| KhidmaError::HealthCheckFailed {
                name: name.to_string(),
                source,
            })
    }

    /// Runs the registered shutdown hook against `instance`.
    ///
    /// Succeeds trivially when no shutdown protocol was declared.
    pub(crate) async fn run_shutdown(&self, name: &str, instance: &T, ctx: &Context) -> Result<()> {
        let Some(hook) = self.shutdown else {
            return Ok(());
        };
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        trace!(service = name, shape = ?hook.shape, "Running shutdown hook");
        (hook.call)(instance, ctx)
            .await
            .map_err(|source| KhidmaError::ShutdownFailed {
                name: name.to_string(),
                source,
            })
    }
}

impl<T: Send + Sync + 'static> Capabilities<T> {
    pub fn health_check(self) -> Self
    where
        T: HealthCheck,
    {
        self.offer_health(HealthShape::Plain, health_plain::<T>)
    }

    pub fn health_check_with_context(self) -> Self
    where
        T: HealthCheckWithContext,
    {
        self.offer_health(HealthShape::WithContext, health_with_context::<T>)
    }

    pub fn shutdown(self) -> Self
    where
        T: Shutdown,
    {
        self.offer_shutdown(ShutdownShape::Bare, shutdown_bare::<T>)
    }

    pub fn shutdown_with_error(self) -> Self
    where
        T: ShutdownWithError,
    {
        self.offer_shutdown(ShutdownShape::WithError, shutdown_with_error::<T>)
    }

    pub fn shutdown_with_context(self) -> Self
    where
        T: ShutdownWithContext,
    {
        self.offer_shutdown(ShutdownShape::WithContext, shutdown_with_context::<T>)
    }

    pub fn shutdown_with_context_and_error(self) -> Self
    where
        T: ShutdownWithContextAndError,
    {
        self.offer_shutdown(
            ShutdownShape::WithContextAndError,
            shutdown_with_context_and_error::<T>,
        )
    }
}

// ── Detection ──

/// Protocol detection for concrete element types.
///
/// Each protocol has a pair of traits sharing one method name: the `Detect*`
/// trait is implemented for `&Detect<T>` when `T` satisfies the protocol,
/// the `Fallback*` trait for `Detect<T>` unconditionally. Calling the method
/// on `&&Detect<T>` resolves to the `Detect*` impl first, so the protocol is
/// recorded exactly when `T` implements it.
///
/// The choice is made where the call is written. Inside a function generic
/// over `T`, the fallback always wins; call [`capabilities!`] or
/// [`detect_capabilities!`] where the type is concrete.
#[doc(hidden)]
pub mod detect {
    use std::marker::PhantomData;

    use super::{
        Capabilities, HealthCheck, HealthCheckWithContext, Shutdown, ShutdownWithContext,
        ShutdownWithContextAndError, ShutdownWithError,
    };
    use crate::service::Service;

    pub struct Detect<T>(PhantomData<fn() -> T>);

    impl<T> Detect<T> {
        pub fn new() -> Self {
            Detect(PhantomData)
        }

        pub fn for_service(_service: &Service<T>) -> Self {
            Self::new()
        }
    }

    impl<T> Default for Detect<T> {
        fn default() -> Self {
            Self::new()
        }
    }

    macro_rules! protocol {
        ($detect:ident, $fallback:ident, $method:ident, $protocol:ident, $builder:ident) => {
            pub trait $detect<T> {
                fn $method(&self, capabilities: Capabilities<T>) -> Capabilities<T>;
            }

            impl<T: $protocol + Send + Sync + 'static> $detect<T> for &Detect<T> {
                fn $method(&self, capabilities: Capabilities<T>) -> Capabilities<T> {
                    capabilities.$builder()
                }
            }

            pub trait $fallback<T> {
                fn $method(&self, capabilities: Capabilities<T>) -> Capabilities<T>;
            }

            impl<T> $fallback<T> for Detect<T> {
                fn $method(&self, capabilities: Capabilities<T>) -> Capabilities<T> {
                    capabilities
                }
            }
        };
    }

    protocol!(DetectHealthCheck, FallbackHealthCheck, detect_health_check, HealthCheck, health_check);
    protocol!(
        DetectHealthCheckWithContext,
        FallbackHealthCheckWithContext,
        detect_health_check_with_context,
        HealthCheckWithContext,
        health_check_with_context
    );
    protocol!(DetectShutdown, FallbackShutdown, detect_shutdown, Shutdown, shutdown);
    protocol!(
        DetectShutdownWithError,
        FallbackShutdownWithError,
        detect_shutdown_with_error,
        ShutdownWithError,
        shutdown_with_error
    );
    protocol!(
        DetectShutdownWithContext,
        FallbackShutdownWithContext,
        detect_shutdown_with_context,
        ShutdownWithContext,
        shutdown_with_context
    );
    protocol!(
        DetectShutdownWithContextAndError,
        FallbackShutdownWithContextAndError,
        detect_shutdown_with_context_and_error,
        ShutdownWithContextAndError,
        shutdown_with_context_and_error
    );
}

#[doc(hidden)]
#[macro_export]
macro_rules! __detect_from {
    ($detect:expr) => {{
        #[allow(unused_imports)]
        use $crate::capability::detect::*;
        let detect = $detect;
        let capabilities = $crate::capability::Capabilities::none();
        let capabilities = (&&detect).detect_health_check(capabilities);
        let capabilities = (&&detect).detect_health_check_with_context(capabilities);
        let capabilities = (&&detect).detect_shutdown(capabilities);
        let capabilities = (&&detect).detect_shutdown_with_error(capabilities);
        let capabilities = (&&detect).detect_shutdown_with_context(capabilities);
        (&&detect).detect_shutdown_with_context_and_error(capabilities)
    }};
}

/// Builds the [`Capabilities`] table for a concrete type from the protocols
/// it implements.
///
/// ```
/// use khidma_service::capabilities;
/// use khidma_service::capability::{HealthCheck, HookResult, ShutdownShape};
/// use std::sync::Arc;
///
/// struct Cache;
///
/// impl HealthCheck for Cache {
///     fn health_check(&self) -> HookResult { Ok(()) }
/// }
///
/// let caps = capabilities!(Arc<Cache>);
/// assert!(caps.is_healthchecker());
/// assert!(!caps.is_shutdowner());
///
/// let none = capabilities!(String);
/// assert_eq!(none.shutdown_shape(), None::<ShutdownShape>);
/// ```
#[macro_export]
macro_rules! capabilities {
    ($ty:ty) => {
        $crate::__detect_from!($crate::capability::detect::Detect::<$ty>::new())
    };
}

/// Attaches the detected [`Capabilities`] to a [`Service`](crate::service::Service).
///
/// ```
/// use khidma_service::detect_capabilities;
/// use khidma_service::prelude::*;
/// use std::sync::Arc;
///
/// struct Pool;
///
/// impl Shutdown for Pool {
///     fn shutdown(&self) {}
/// }
///
/// let service = detect_capabilities!(Service::eager("pool", Arc::new(Pool)));
/// assert!(service.is_shutdowner());
/// assert!(!service.is_healthchecker());
/// ```
#[macro_export]
macro_rules! detect_capabilities {
    ($service:expr) => {{
        let service = $service;
        let capabilities =
            $crate::__detect_from!($crate::capability::detect::Detect::for_service(&service));
        service.with_capabilities(capabilities)
    }};
}

// Adapters from each protocol to the uniform hook signature.

fn health_plain<'a, T: HealthCheck + Sync>(instance: &'a T, _ctx: &'a Context) -> BoxFuture<'a, HookResult> {
    Box::pin(async move { instance.health_check() })
}

fn health_with_context<'a, T: HealthCheckWithContext + Sync>(
    instance: &'a T,
    ctx: &'a Context,
) -> BoxFuture<'a, HookResult> {
    instance.health_check_with_context(ctx)
}

fn shutdown_bare<'a, T: Shutdown + Sync>(instance: &'a T, _ctx: &'a Context) -> BoxFuture<'a, HookResult> {
    Box::pin(async move {
        <T as Shutdown>::shutdown(instance);
        Ok(())
    })
}

fn shutdown_with_error<'a, T: ShutdownWithError + Sync>(
    instance: &'a T,
    _ctx: &'a Context,
) -> BoxFuture<'a, HookResult> {
    Box::pin(async move { <T as ShutdownWithError>::shutdown(instance) })
}

fn shutdown_with_context<'a, T: ShutdownWithContext + Sync>(
    instance: &'a T,
    ctx: &'a Context,
) -> BoxFuture<'a, HookResult> {
    Box::pin(async move {
        <T as ShutdownWithContext>::shutdown(instance, ctx).await;
        Ok(())
    })
}

fn shutdown_with_context_and_error<'a, T: ShutdownWithContextAndError + Sync>(
    instance: &'a T,
    ctx: &'a Context,
) -> BoxFuture<'a, HookResult> {
    <T as ShutdownWithContextAndError>::shutdown(instance, ctx)
}

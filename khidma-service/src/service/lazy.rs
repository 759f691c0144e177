use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{Provenance, ProviderFn};
use crate::capability::Capabilities;
use crate::context::Context;
use crate::error::Result;
use crate::injector::Injector;
use crate::service_type::ServiceType;

/// A service built on first request and cached afterwards.
///
/// Construction happens at most once, even under concurrent first calls:
/// the cache lock is held while the provider runs. A provider that fails
/// leaves the cache empty, so the next request tries again.
///
/// The provider must not request this same service, directly or through
/// other services, while it runs.
pub struct ServiceLazy<T> {
    name: String,
    provider: ProviderFn<T>,
    capabilities: Capabilities<T>,
    provenance: Provenance,
    instance: Mutex<Option<T>>,
    built: AtomicBool,
}

impl<T: Clone + Send + Sync + 'static> ServiceLazy<T> {
    #[track_caller]
    pub fn new(
        name: impl Into<String>,
        provider: impl Fn(&dyn Injector) -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            provider: Arc::new(provider),
            capabilities: Capabilities::none(),
            provenance: Provenance::capture(),
            instance: Mutex::new(None),
            built: AtomicBool::new(false),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities<T>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service_type(&self) -> ServiceType {
        ServiceType::Lazy
    }

    /// Returns `true` once an instance is cached.
    pub fn is_built(&self) -> bool {
        self.built.load(Ordering::Acquire)
    }

    pub fn get_instance(&self, injector: &dyn Injector) -> Result<T> {
        let mut slot = self.instance.lock();
        if let Some(instance) = slot.as_ref() {
            trace!(service = %self.name, "Lazy cache hit");
            return Ok(instance.clone());
        }

        debug!(service = %self.name, "Building lazy service");
        let instance = (self.provider)(injector)?;
        *slot = Some(instance.clone());
        self.built.store(true, Ordering::Release);
        Ok(instance)
    }

    /// `false` until the instance exists.
    pub fn is_healthchecker(&self) -> bool {
        self.is_built() && self.capabilities.is_healthchecker()
    }

    /// Checks the cached instance; an unbuilt service is trivially healthy.
    pub async fn healthcheck(&self, ctx: &Context) -> Result<()> {
        let instance = self.instance.lock().clone();
        match instance {
            Some(instance) => self.capabilities.run_healthcheck(&self.name, &instance, ctx).await,
            None => Ok(()),
        }
    }

    /// `false` until the instance exists.
    pub fn is_shutdowner(&self) -> bool {
        self.is_built() && self.capabilities.is_shutdowner()
    }

    /// Shuts the cached instance down and drops it from the cache.
    ///
    /// The next [`get_instance`](Self::get_instance) builds a new one.
    pub async fn shutdown(&self, ctx: &Context) -> Result<()> {
        let instance = {
            let mut slot = self.instance.lock();
            self.built.store(false, Ordering::Release);
            slot.take()
        };

        match instance {
            Some(instance) => self.capabilities.run_shutdown(&self.name, &instance, ctx).await,
            None => Ok(()),
        }
    }

    /// An unbuilt copy sharing the provider.
    pub fn clone_entry(&self) -> Self {
        Self {
            name: self.name.clone(),
            provider: Arc::clone(&self.provider),
            capabilities: self.capabilities.clone(),
            provenance: self.provenance.clone(),
            instance: Mutex::new(None),
            built: AtomicBool::new(false),
        }
    }

    pub fn source(&self) -> &Provenance {
        &self.provenance
    }
}

impl<T> fmt::Debug for ServiceLazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceLazy")
            .field("name", &self.name)
            .field("built", &self.built.load(Ordering::Acquire))
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{HealthCheck, HookResult, ShutdownWithError};
    use crate::container::Container;
    use crate::error::KhidmaError;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[derive(Default)]
    struct Pool {
        closed: AtomicBool,
    }

    impl HealthCheck for Pool {
        fn health_check(&self) -> HookResult {
            Ok(())
        }
    }

    impl ShutdownWithError for Pool {
        fn shutdown(&self) -> HookResult {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn counting(counter: &Arc<AtomicU32>) -> ServiceLazy<Arc<Pool>> {
        let counter = Arc::clone(counter);
        ServiceLazy::new("pool", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Pool::default()))
        })
    }

    #[test]
    fn provider_called_once() {
        let container = Container::new();
        let counter = Arc::new(AtomicU32::new(0));
        let service = counting(&counter);

        assert!(!service.is_built());
        let a = service.get_instance(&container).unwrap();
        let b = service.get_instance(&container).unwrap();
        let c = service.get_instance(&container).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&b, &c));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(service.is_built());
    }

    #[test]
    fn concurrent_first_calls_build_once() {
        let container = Container::new();
        let counter = Arc::new(AtomicU32::new(0));
        let service = {
            let counter = Arc::clone(&counter);
            ServiceLazy::new("slow", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                Ok(Arc::new(Pool::default()))
            })
        };

        let instances: Vec<Arc<Pool>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| service.get_instance(&container).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn failed_construction_is_retried() {
        let container = Container::new();
        let attempts = Arc::new(AtomicU32::new(0));
        let service = {
            let attempts = Arc::clone(&attempts);
            ServiceLazy::new("flaky", move |_| {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(KhidmaError::construction("flaky", "not yet"));
                }
                Ok(5u32)
            })
        };

        let err = service.get_instance(&container).unwrap_err();
        assert!(matches!(err, KhidmaError::ConstructionFailed { ref name, .. } if name == "flaky"));
        assert!(!service.is_built());

        assert_eq!(service.get_instance(&container).unwrap(), 5);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn capability_flags_wait_for_construction() {
        let container = Container::new();
        let counter = Arc::new(AtomicU32::new(0));
        let service = counting(&counter)
            .with_capabilities(Capabilities::none().health_check().shutdown_with_error());

        assert!(!service.is_healthchecker());
        assert!(!service.is_shutdowner());

        service.get_instance(&container).unwrap();
        assert!(service.is_healthchecker());
        assert!(service.is_shutdowner());
    }

    #[tokio::test]
    async fn shutdown_resets_cache() {
        let container = Container::new();
        let counter = Arc::new(AtomicU32::new(0));
        let service = counting(&counter).with_capabilities(Capabilities::none().shutdown_with_error());

        let first = service.get_instance(&container).unwrap();
        service.shutdown(&Context::background()).await.unwrap();

        assert!(first.closed.load(Ordering::SeqCst));
        assert!(!service.is_built());

        let second = service.get_instance(&container).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unbuilt_hooks_are_noops() {
        let counter = Arc::new(AtomicU32::new(0));
        let service = counting(&counter)
            .with_capabilities(Capabilities::none().health_check().shutdown_with_error());

        service.healthcheck(&Context::background()).await.unwrap();
        service.shutdown(&Context::background()).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clone_entry_starts_unbuilt() {
        let container = Container::new();
        let counter = Arc::new(AtomicU32::new(0));
        let service = counting(&counter);

        let original = service.get_instance(&container).unwrap();
        let copy = service.clone_entry();
        assert!(!copy.is_built());
        assert_eq!(copy.source(), service.source());

        let copied = copy.get_instance(&container).unwrap();
        assert!(!Arc::ptr_eq(&original, &copied));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn source_is_registration_site() {
        let service = ServiceLazy::new("x", |_| Ok(1u8));
        assert!(service.source().frame.file.ends_with("lazy.rs"));
        assert_eq!(service.service_type(), ServiceType::Lazy);
        assert_eq!(service.name(), "x");
    }
}

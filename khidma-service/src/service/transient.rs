use std::fmt;
use std::sync::Arc;

use tracing::trace;

use super::ProviderFn;
use crate::capability::Capabilities;
use crate::context::Context;
use crate::error::Result;
use crate::injector::Injector;
use crate::service_type::ServiceType;

/// A service that builds a fresh instance on every request.
///
/// No instance is retained, so health checks and shutdown have nothing to
/// act on and succeed immediately. The capability flags still describe what
/// every produced instance supports.
pub struct ServiceTransient<T> {
    name: String,
    provider: ProviderFn<T>,
    capabilities: Capabilities<T>,
}

impl<T: Clone + Send + Sync + 'static> ServiceTransient<T> {
    pub fn new(
        name: impl Into<String>,
        provider: impl Fn(&dyn Injector) -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            provider: Arc::new(provider),
            capabilities: Capabilities::none(),
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
        ServiceType::Transient
    }

    pub fn get_instance(&self, injector: &dyn Injector) -> Result<T> {
        trace!(service = %self.name, "Building transient instance");
        (self.provider)(injector)
    }

    pub fn is_healthchecker(&self) -> bool {
        self.capabilities.is_healthchecker()
    }

    pub async fn healthcheck(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    pub fn is_shutdowner(&self) -> bool {
        self.capabilities.is_shutdowner()
    }

    pub async fn shutdown(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    pub fn clone_entry(&self) -> Self {
        Self {
            name: self.name.clone(),
            provider: Arc::clone(&self.provider),
            capabilities: self.capabilities.clone(),
        }
    }
}

impl<T> fmt::Debug for ServiceTransient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceTransient")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Shutdown;
    use crate::container::Container;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct RequestId(u32);

    impl Shutdown for RequestId {
        fn shutdown(&self) {}
    }

    #[test]
    fn provider_called_every_time() {
        let container = Container::new();
        let counter = Arc::new(AtomicU32::new(0));
        let service = {
            let counter = Arc::clone(&counter);
            ServiceTransient::new("request_id", move |_| {
                Ok(Arc::new(RequestId(counter.fetch_add(1, Ordering::SeqCst))))
            })
        };

        let a = service.get_instance(&container).unwrap();
        let b = service.get_instance(&container).unwrap();
        assert_eq!(a.0, 0);
        assert_eq!(b.0, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn flags_follow_capabilities_without_building() {
        let container = Container::new();
        let counter = Arc::new(AtomicU32::new(0));
        let service = {
            let counter = Arc::clone(&counter);
            ServiceTransient::new("request_id", move |_| {
                Ok(Arc::new(RequestId(counter.fetch_add(1, Ordering::SeqCst))))
            })
            .with_capabilities(Capabilities::none().shutdown())
        };

        assert!(service.is_shutdowner());
        assert!(!service.is_healthchecker());
        service.shutdown(&Context::background()).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        let copy = service.clone_entry();
        assert!(copy.is_shutdowner());
        copy.get_instance(&container).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}

use std::fmt;

use tracing::debug;

use super::Provenance;
use crate::capability::Capabilities;
use crate::context::Context;
use crate::error::Result;
use crate::injector::Injector;
use crate::service_type::ServiceType;

/// A service whose instance exists from registration on.
pub struct ServiceEager<T> {
    name: String,
    instance: T,
    capabilities: Capabilities<T>,
    provenance: Provenance,
}

impl<T: Clone + Send + Sync + 'static> ServiceEager<T> {
    /// Wraps an already-built instance.
    #[track_caller]
    pub fn new(name: impl Into<String>, instance: T) -> Self {
        Self {
            name: name.into(),
            instance,
            capabilities: Capabilities::none(),
            provenance: Provenance::capture(),
        }
    }

    /// Runs `provider` now and wraps its result.
    ///
    /// # Errors
    /// Whatever the provider returns; no entry is created.
    #[track_caller]
    pub fn build(
        name: impl Into<String>,
        injector: &dyn Injector,
        provider: impl FnOnce(&dyn Injector) -> Result<T>,
    ) -> Result<Self> {
        let provenance = Provenance::capture();
        let name = name.into();
        debug!(service = %name, "Building eager service");

        let instance = provider(injector)?;
        Ok(Self {
            name,
            instance,
            capabilities: Capabilities::none(),
            provenance,
        })
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities<T>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service_type(&self) -> ServiceType {
        ServiceType::Eager
    }

    pub fn get_instance(&self, _injector: &dyn Injector) -> Result<T> {
        Ok(self.instance.clone())
    }

    pub fn is_healthchecker(&self) -> bool {
        self.capabilities.is_healthchecker()
    }

    pub async fn healthcheck(&self, ctx: &Context) -> Result<()> {
        self.capabilities.run_healthcheck(&self.name, &self.instance, ctx).await
    }

    pub fn is_shutdowner(&self) -> bool {
        self.capabilities.is_shutdowner()
    }

    pub async fn shutdown(&self, ctx: &Context) -> Result<()> {
        self.capabilities.run_shutdown(&self.name, &self.instance, ctx).await
    }

    /// A copy holding a clone of the same instance.
    ///
    /// For `Arc<_>` element types both entries share one object.
    pub fn clone_entry(&self) -> Self {
        Self {
            name: self.name.clone(),
            instance: self.instance.clone(),
            capabilities: self.capabilities.clone(),
            provenance: self.provenance.clone(),
        }
    }

    pub fn source(&self) -> &Provenance {
        &self.provenance
    }
}

impl<T> fmt::Debug for ServiceEager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEager")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

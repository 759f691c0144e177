//! Service entries: the unit a container stores.
//!
//! [`Service<T>`] is a closed sum of the three lifecycle variants:
//!
//! ```text
//! Service<T>
//!   ├── Lazy(ServiceLazy<T>)            provider runs on first request, result cached
//!   ├── Eager(ServiceEager<T>)          instance built at registration
//!   └── Transient(ServiceTransient<T>)  provider runs on every request
//! ```
//!
//! The generic surface here covers typed construction only. Everything a
//! container does without knowing `T` goes through the narrowing traits in
//! [`crate::erased`].

mod eager;
mod lazy;
mod transient;

use std::fmt;
use std::sync::Arc;

use khidma_support::rendering::render_stack;
use khidma_support::stacktrace::{Frame, capture_stack};
use serde::Serialize;

use crate::capability::Capabilities;
use crate::error::Result;
use crate::injector::Injector;

pub use eager::ServiceEager;
pub use lazy::ServiceLazy;
pub use transient::ServiceTransient;

/// Type alias for provider functions.
///
/// A provider receives the [`Injector`] (to resolve its own dependencies)
/// and returns the constructed instance or an error.
pub type ProviderFn<T> = Arc<dyn Fn(&dyn Injector) -> Result<T> + Send + Sync>;

/// Where a service was registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    /// The registration call site.
    pub frame: Frame,
    /// Ancestor frames, innermost first. Empty unless backtraces are enabled.
    pub stack: Vec<Frame>,
}

impl Provenance {
    /// Captures the caller's location and the surrounding stack.
    #[track_caller]
    pub fn capture() -> Self {
        Self {
            frame: Frame::caller(),
            stack: capture_stack(),
        }
    }
}

/// The call site, followed by the captured stack when there is one.
impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.frame)?;
        if !self.stack.is_empty() {
            write!(f, "\n{}", render_stack(&self.stack).trim_end())?;
        }
        Ok(())
    }
}

/// A registered service producing instances of `T`.
///
/// # Examples
/// ```
/// use khidma_service::prelude::*;
/// use std::sync::Arc;
///
/// struct Connection;
///
/// let container = Container::new();
/// let service = Service::lazy("db", |_| Ok(Arc::new(Connection)));
/// assert_eq!(service.service_type(), ServiceType::Lazy);
///
/// let first = service.get_instance(&container).unwrap();
/// let second = service.get_instance(&container).unwrap();
/// assert!(Arc::ptr_eq(&first, &second));
/// ```
pub enum Service<T> {
    Lazy(ServiceLazy<T>),
    Eager(ServiceEager<T>),
    Transient(ServiceTransient<T>),
}

impl<T: Clone + Send + Sync + 'static> Service<T> {
    /// A lazy service named `name`.
    #[track_caller]
    pub fn lazy(
        name: impl Into<String>,
        provider: impl Fn(&dyn Injector) -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        Service::Lazy(ServiceLazy::new(name, provider))
    }

    /// An eager service wrapping an already-built instance.
    #[track_caller]
    pub fn eager(name: impl Into<String>, instance: T) -> Self {
        Service::Eager(ServiceEager::new(name, instance))
    }

    /// A transient service named `name`.
    pub fn transient(
        name: impl Into<String>,
        provider: impl Fn(&dyn Injector) -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        Service::Transient(ServiceTransient::new(name, provider))
    }

    /// Declares which health/shutdown protocols `T` satisfies.
    pub fn with_capabilities(self, capabilities: Capabilities<T>) -> Self {
        match self {
            Service::Lazy(s) => Service::Lazy(s.with_capabilities(capabilities)),
            Service::Eager(s) => Service::Eager(s.with_capabilities(capabilities)),
            Service::Transient(s) => Service::Transient(s.with_capabilities(capabilities)),
        }
    }

    /// Returns an instance, constructing it according to the lifecycle.
    ///
    /// # Errors
    /// Whatever the provider returns, unchanged.
    pub fn get_instance(&self, injector: &dyn Injector) -> Result<T> {
        match self {
            Service::Lazy(s) => s.get_instance(injector),
            Service::Eager(s) => s.get_instance(injector),
            Service::Transient(s) => s.get_instance(injector),
        }
    }

    /// Copies the entry for installation into another container.
    ///
    /// Lazy copies start unbuilt, Eager copies share the instance.
    pub fn clone_entry(&self) -> Self {
        match self {
            Service::Lazy(s) => Service::Lazy(s.clone_entry()),
            Service::Eager(s) => Service::Eager(s.clone_entry()),
            Service::Transient(s) => Service::Transient(s.clone_entry()),
        }
    }
}

impl<T> From<ServiceLazy<T>> for Service<T> {
    fn from(service: ServiceLazy<T>) -> Self {
        Service::Lazy(service)
    }
}

impl<T> From<ServiceEager<T>> for Service<T> {
    fn from(service: ServiceEager<T>) -> Self {
        Service::Eager(service)
    }
}

impl<T> From<ServiceTransient<T>> for Service<T> {
    fn from(service: ServiceTransient<T>) -> Self {
        Service::Transient(service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::erased::{GetNamerService, GetTyperService, SourcerService};
    use crate::service_type::ServiceType;

    #[derive(Debug)]
    struct Connection;

    #[test]
    fn variants_report_their_kind() {
        let lazy = Service::lazy("a", |_| Ok(Arc::new(Connection)));
        let eager = Service::eager("b", Arc::new(Connection));
        let transient = Service::transient("c", |_| Ok(Arc::new(Connection)));

        assert_eq!(lazy.service_type(), ServiceType::Lazy);
        assert_eq!(eager.service_type(), ServiceType::Eager);
        assert_eq!(transient.service_type(), ServiceType::Transient);
        assert_eq!(transient.name(), "c");
    }

    #[test]
    fn provenance_points_at_registration() {
        let lazy = Service::lazy("a", |_| Ok(1u8));
        let eager = Service::eager("b", 2u8);
        let transient = Service::transient("c", |_| Ok(3u8));

        for service in [&lazy, &eager] {
            let provenance = service.source().expect("lazy and eager keep provenance");
            assert!(provenance.frame.file.ends_with("mod.rs"));
            assert!(provenance.frame.line > 0);
        }
        assert!(transient.source().is_none());
    }

    #[test]
    fn provenance_display_lists_stack() {
        let provenance = Provenance {
            frame: Frame {
                file: "src/main.rs".into(),
                line: 12,
                column: 5,
                function: None,
            },
            stack: vec![Frame {
                file: "src/app.rs".into(),
                line: 40,
                column: 9,
                function: Some("app::boot".into()),
            }],
        };

        let rendered = provenance.to_string();
        let mut lines = rendered.lines();
        assert!(lines.next().unwrap().starts_with("src/main.rs:12:5"));
        assert!(lines.next().unwrap().starts_with("  at "));
        assert!(lines.next().is_none());
    }

    #[test]
    fn with_capabilities_keeps_variant() {
        let service = Service::transient("c", |_| Ok(3u8)).with_capabilities(Capabilities::none());
        assert!(matches!(service, Service::Transient(_)));
    }

    #[test]
    fn get_instance_dispatches() {
        let container = Container::new();
        let service: Service<u8> = ServiceTransient::new("n", |_| Ok(7)).into();
        assert_eq!(service.get_instance(&container).unwrap(), 7);
    }
}

//! The registry-lookup boundary between service entries and a container.
//!
//! Providers receive a `&dyn Injector` so they can resolve their own
//! dependencies; typed resolution goes through [`invoke`] and
//! [`invoke_named`].

use std::any::type_name;
use std::sync::Arc;

use khidma_support::rendering::suggest_similar;
use tracing::trace;

use crate::erased::AnyService;
use crate::error::{KhidmaError, Result, ServiceNotFoundError};
use crate::inference::infer_service_name;
use crate::service::Service;

/// Maximum number of "did you mean?" suggestions in a not-found error.
const MAX_SUGGESTIONS: usize = 3;

/// Read-only, type-erased view of a container's registry.
pub trait Injector: Send + Sync {
    /// Looks up an entry by name.
    fn service_get(&self, name: &str) -> Option<Arc<dyn AnyService>>;

    /// Names of all registered entries.
    fn service_names(&self) -> Vec<String>;
}

/// Resolves the service registered under `T`'s inferred name.
///
/// ```rust,ignore
/// container.provide(|_| Ok(Arc::new(Database::connect())))?;
///
/// // inside another provider
/// let db: Arc<Database> = invoke(injector)?;
/// ```
pub fn invoke<T: Clone + Send + Sync + 'static>(injector: &dyn Injector) -> Result<T> {
    invoke_named(injector, &infer_service_name::<T>())
}

/// Resolves the service registered under `name` as a `T`.
///
/// # Errors
/// - [`KhidmaError::NotFound`]: no entry named `name`
/// - [`KhidmaError::TypeMismatch`]: the entry produces another type
/// - whatever the provider returns
pub fn invoke_named<T: Clone + Send + Sync + 'static>(injector: &dyn Injector, name: &str) -> Result<T> {
    trace!(service = name, "Invoking");

    let service = injector
        .service_get(name)
        .ok_or_else(|| not_found(injector, name))?;

    let typed = service
        .as_any()
        .downcast_ref::<Service<T>>()
        .ok_or_else(|| KhidmaError::TypeMismatch {
            name: name.to_string(),
            expected: type_name::<T>(),
        })?;

    typed.get_instance(injector)
}

pub(crate) fn not_found(injector: &dyn Injector, name: &str) -> KhidmaError {
    let names = injector.service_names();
    let available: Vec<&str> = names.iter().map(String::as_str).collect();

    KhidmaError::NotFound(ServiceNotFoundError {
        requested: name.to_string(),
        suggestions: suggest_similar(name, &available, MAX_SUGGESTIONS),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Minimal injector over a fixed map, independent of `Container`.
    struct MapInjector {
        services: HashMap<String, Arc<dyn AnyService>>,
    }

    impl MapInjector {
        fn with(services: Vec<Arc<dyn AnyService>>) -> Self {
            Self {
                services: services
                    .into_iter()
                    .map(|s| (s.name().to_string(), s))
                    .collect(),
            }
        }
    }

    impl Injector for MapInjector {
        fn service_get(&self, name: &str) -> Option<Arc<dyn AnyService>> {
            self.services.get(name).cloned()
        }

        fn service_names(&self) -> Vec<String> {
            self.services.keys().cloned().collect()
        }
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Config {
        url: String,
    }

    #[test]
    fn invoke_by_inferred_name() {
        let injector = MapInjector::with(vec![Arc::new(Service::eager(
            infer_service_name::<Config>(),
            Config { url: "postgres://localhost".into() },
        ))]);

        let config: Config = invoke(&injector).unwrap();
        assert_eq!(config.url, "postgres://localhost");
    }

    #[test]
    fn provider_resolves_dependencies() {
        let injector = MapInjector::with(vec![
            Arc::new(Service::eager("url", String::from("postgres://localhost"))),
            Arc::new(Service::transient("bytes", |i| {
                let url: String = invoke_named(i, "url")?;
                Ok(url.into_bytes())
            })),
        ]);

        let bytes: Vec<u8> = invoke_named(&injector, "bytes").unwrap();
        assert_eq!(bytes, b"postgres://localhost");
    }

    #[test]
    fn not_found_suggests_similar() {
        let injector = MapInjector::with(vec![Arc::new(Service::eager("database", 1u8))]);

        match invoke_named::<u8>(&injector, "datbase").unwrap_err() {
            KhidmaError::NotFound(e) => {
                assert_eq!(e.requested, "datbase");
                assert_eq!(e.suggestions, vec!["database".to_string()]);
            }
            other => panic!("Expected NotFound, got: {other:?}"),
        }
    }

    #[test]
    fn wrong_type_is_mismatch() {
        let injector = MapInjector::with(vec![Arc::new(Service::eager("port", 5432u16))]);

        match invoke_named::<u32>(&injector, "port").unwrap_err() {
            KhidmaError::TypeMismatch { name, expected } => {
                assert_eq!(name, "port");
                assert_eq!(expected, "u32");
            }
            other => panic!("Expected TypeMismatch, got: {other:?}"),
        }
    }
}

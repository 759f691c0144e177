//! Recovering lifecycle, provenance and default names from entries and types.

use std::any::type_name;

use khidma_support::stacktrace::Frame;

use crate::service::Service;
use crate::service_type::ServiceType;

/// Canonical service name for `T`, used when none is given at registration.
///
/// Deterministic: the same `T` always yields the same name.
///
/// ```
/// use khidma_service::inference::infer_service_name;
///
/// assert_eq!(infer_service_name::<String>(), "alloc::string::String");
/// ```
pub fn infer_service_name<T: ?Sized + 'static>() -> String {
    type_name::<T>().to_string()
}

/// Lifecycle kind of `service`, read from its variant.
pub fn infer_service_type<T>(service: &Service<T>) -> ServiceType {
    match service {
        Service::Lazy(_) => ServiceType::Lazy,
        Service::Eager(_) => ServiceType::Eager,
        Service::Transient(_) => ServiceType::Transient,
    }
}

/// Registration frame of `service`; `None` for transient services.
pub fn infer_service_stacktrace<T: Clone + Send + Sync + 'static>(service: &Service<T>) -> Option<Frame> {
    match service {
        Service::Lazy(s) => Some(s.source().frame.clone()),
        Service::Eager(s) => Some(s.source().frame.clone()),
        Service::Transient(_) => None,
    }
}

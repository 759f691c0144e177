//! Introspection records for diagnostic tooling.

use std::fmt;

use serde::Serialize;

use crate::erased::{GetTyperService, IsHealthcheckerService, IsShutdownerService};
use crate::injector::Injector;
use crate::service_type::ServiceType;

/// Snapshot of one registered service.
///
/// Built from a live registry lookup and owns no reference into the entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub service_type: ServiceType,
    pub healthchecker: bool,
    pub shutdowner: bool,
}

impl ServiceInfo {
    /// Reads kind and capability flags from any type-erased entry.
    pub fn describe<S>(name: impl Into<String>, service: &S) -> Self
    where
        S: GetTyperService + IsHealthcheckerService + IsShutdownerService + ?Sized,
    {
        Self {
            name: name.into(),
            service_type: service.service_type(),
            healthchecker: service.is_healthchecker(),
            shutdowner: service.is_shutdowner(),
        }
    }

    /// Capability tags for listings.
    pub fn tags(&self) -> Vec<&'static str> {
        let mut tags = Vec::new();
        if self.healthchecker {
            tags.push("healthchecker");
        }
        if self.shutdowner {
            tags.push("shutdowner");
        }
        tags
    }
}

impl fmt::Display for ServiceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.service_type.glyph(), self.name, self.service_type)?;
        let tags = self.tags();
        if !tags.is_empty() {
            write!(f, " [{}]", tags.join(", "))?;
        }
        Ok(())
    }
}

/// Looks `name` up and summarizes it, without constructing anything.
///
/// Returns `None` when the injector has no service by that name.
pub fn infer_service_info(injector: &dyn Injector, name: &str) -> Option<ServiceInfo> {
    injector
        .service_get(name)
        .map(|service| ServiceInfo::describe(name, service.as_ref()))
}

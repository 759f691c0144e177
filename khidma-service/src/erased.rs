//! Type-erased views of a service entry.
//!
//! A container holds services of many element types at once, so it cannot
//! name `Service<T>` when it walks its registry. Each trait here exposes one
//! behavior without a type parameter; [`AnyService`] bundles them so the
//! registry can store `Arc<dyn AnyService>`.
//!
//! New behaviors needed by container-level code get their own trait here
//! rather than a new method on `Service<T>`.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::Result;
use crate::inference::infer_service_type;
use crate::service::{Provenance, Service};
use crate::service_type::ServiceType;

pub trait GetNamerService {
    fn name(&self) -> &str;
}

pub trait GetTyperService {
    fn service_type(&self) -> ServiceType;
}

pub trait IsHealthcheckerService {
    fn is_healthchecker(&self) -> bool;
}

#[async_trait]
pub trait HealthcheckerService {
    async fn healthcheck(&self, ctx: &Context) -> Result<()>;
}

pub trait IsShutdownerService {
    fn is_shutdowner(&self) -> bool;
}

#[async_trait]
pub trait ShutdownerService {
    async fn shutdown(&self, ctx: &Context) -> Result<()>;
}

/// Copies an entry for another container; see [`Service::clone_entry`].
pub trait ClonerService {
    fn clone_service(&self) -> Arc<dyn AnyService>;
}

/// Registration provenance; `None` for transient services.
pub trait SourcerService {
    fn source(&self) -> Option<&Provenance>;
}

/// Everything a container can do with an entry without knowing its type.
pub trait AnyService:
    GetNamerService
    + GetTyperService
    + IsHealthcheckerService
    + HealthcheckerService
    + IsShutdownerService
    + ShutdownerService
    + ClonerService
    + SourcerService
    + Send
    + Sync
{
    /// Used by typed lookups to recover `Service<T>`.
    fn as_any(&self) -> &dyn Any;
}

impl fmt::Debug for dyn AnyService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyService")
            .field("name", &self.name())
            .field("type", &self.service_type())
            .finish()
    }
}

// ── Service<T> ──

impl<T: Clone + Send + Sync + 'static> GetNamerService for Service<T> {
    fn name(&self) -> &str {
        match self {
            Service::Lazy(s) => s.name(),
            Service::Eager(s) => s.name(),
            Service::Transient(s) => s.name(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> GetTyperService for Service<T> {
    fn service_type(&self) -> ServiceType {
        infer_service_type(self)
    }
}

impl<T: Clone + Send + Sync + 'static> IsHealthcheckerService for Service<T> {
    fn is_healthchecker(&self) -> bool {
        match self {
            Service::Lazy(s) => s.is_healthchecker(),
            Service::Eager(s) => s.is_healthchecker(),
            Service::Transient(s) => s.is_healthchecker(),
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> HealthcheckerService for Service<T> {
    async fn healthcheck(&self, ctx: &Context) -> Result<()> {
        match self {
            Service::Lazy(s) => s.healthcheck(ctx).await,
            Service::Eager(s) => s.healthcheck(ctx).await,
            Service::Transient(s) => s.healthcheck(ctx).await,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> IsShutdownerService for Service<T> {
    fn is_shutdowner(&self) -> bool {
        match self {
            Service::Lazy(s) => s.is_shutdowner(),
            Service::Eager(s) => s.is_shutdowner(),
            Service::Transient(s) => s.is_shutdowner(),
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> ShutdownerService for Service<T> {
    async fn shutdown(&self, ctx: &Context) -> Result<()> {
        match self {
            Service::Lazy(s) => s.shutdown(ctx).await,
            Service::Eager(s) => s.shutdown(ctx).await,
            Service::Transient(s) => s.shutdown(ctx).await,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ClonerService for Service<T> {
    fn clone_service(&self) -> Arc<dyn AnyService> {
        Arc::new(self.clone_entry())
    }
}

impl<T: Clone + Send + Sync + 'static> SourcerService for Service<T> {
    fn source(&self) -> Option<&Provenance> {
        match self {
            Service::Lazy(s) => Some(s.source()),
            Service::Eager(s) => Some(s.source()),
            Service::Transient(_) => None,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> AnyService for Service<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

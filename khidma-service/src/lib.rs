//! Service entries, lifecycles and capability probing for Khidma DI.

pub mod capability;
pub mod container;
pub mod context;
pub mod erased;
pub mod error;
pub mod inference;
pub mod info;
pub mod injector;
pub mod service;
pub mod service_type;

pub use container::prelude;
pub use container::{Container, ContainerBuilder};
pub use context::Context;
pub use error::{KhidmaError, Result};
pub use service::Service;
pub use service_type::ServiceType;

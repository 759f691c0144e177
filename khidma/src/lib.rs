//! # Khidma: service entries and lifecycles for dependency injection
//!
//! Re-exports the service layer ([`khidma_service`]) and the diagnostics
//! helpers ([`khidma_support`]).
//!
//! ```rust
//! use khidma::prelude::*;
//!
//! let container = Container::new();
//! container.provide_named("greeting", |_| Ok(String::from("salaam"))).unwrap();
//!
//! let greeting: String = container.invoke_named("greeting").unwrap();
//! assert_eq!(greeting, "salaam");
//! assert_eq!(container.service_info("greeting").unwrap().service_type, ServiceType::Lazy);
//! ```

pub use khidma_service::*;
pub use khidma_support::*;

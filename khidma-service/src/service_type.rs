//! Service lifecycle kinds.
//!
//! A service is constructed in one of three ways:
//! - [`ServiceType::Lazy`]: built on first request, then cached
//! - [`ServiceType::Eager`]: built at registration time
//! - [`ServiceType::Transient`]: built again on every request
use std::fmt;

use serde::Serialize;

/// How a service entry produces its instance.
///
/// # Examples
/// ```
/// use khidma_service::service_type::ServiceType;
///
/// assert_eq!(ServiceType::Lazy.to_string(), "lazy");
/// assert_eq!(ServiceType::Transient.glyph(), "🏭");
/// assert!(!ServiceType::Transient.is_cached());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    /// Created on first request and cached for the lifetime of the entry.
    ///
    /// The provider runs at most once per entry (until shutdown resets it).
    Lazy,

    /// Created immediately at registration.
    ///
    /// The provider never runs again; every request returns the same instance.
    Eager,

    /// Created anew on every request.
    ///
    /// Nothing is cached and no registration frame is kept.
    Transient,
}

impl ServiceType {
    /// All lifecycle kinds, in declaration order.
    pub const ALL: [ServiceType; 3] = [ServiceType::Lazy, ServiceType::Eager, ServiceType::Transient];

    /// Short glyph used in human-readable listings.
    #[inline]
    pub const fn glyph(&self) -> &'static str {
        match self {
            ServiceType::Lazy => "😴",
            ServiceType::Eager => "🔁",
            ServiceType::Transient => "🏭",
        }
    }

    /// Lowercase name, as used by `Display` and serialization.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Lazy => "lazy",
            ServiceType::Eager => "eager",
            ServiceType::Transient => "transient",
        }
    }

    /// Returns `true` if entries of this kind hold on to an instance.
    #[inline]
    pub fn is_cached(&self) -> bool {
        matches!(self, ServiceType::Lazy | ServiceType::Eager)
    }

    /// Returns `true` if entries of this kind record where they were registered.
    #[inline]
    pub fn has_provenance(&self) -> bool {
        !matches!(self, ServiceType::Transient)
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Error types for Khidma service operations.
//!
//! Errors carry the service name and, where it helps, a hint about what
//! to do next.

use std::fmt;

/// Boxed error returned by user-supplied hooks (health checks, shutdown).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for all Khidma operations.
#[derive(Debug, thiserror::Error)]
pub enum KhidmaError {
    /// Requested service was never provided.
    #[error("{}", .0)]
    NotFound(ServiceNotFoundError),

    /// A service with the same name already exists (when override is disabled).
    #[error("{}", .0)]
    AlreadyProvided(AlreadyProvidedError),

    /// The entry exists but holds another element type.
    #[error("Service {name} is not of type {expected}")]
    TypeMismatch { name: String, expected: &'static str },

    /// Provider failed during construction.
    #[error("Failed to construct {name}: {source}")]
    ConstructionFailed {
        name: String,
        #[source]
        source: BoxError,
    },

    /// A health check hook reported a failure.
    #[error("Health check failed for {name}: {source}")]
    HealthCheckFailed {
        name: String,
        #[source]
        source: BoxError,
    },

    /// A shutdown hook reported a failure.
    #[error("Shutdown failed for {name}: {source}")]
    ShutdownFailed {
        name: String,
        #[source]
        source: BoxError,
    },

    /// One or more services failed while the container shut down.
    #[error("{}", .0)]
    Shutdown(ShutdownErrors),

    /// The context was cancelled before or during the call.
    #[error("Context cancelled")]
    Cancelled,

    /// The context deadline passed before or during the call.
    #[error("Context deadline exceeded")]
    DeadlineExceeded,
}

impl KhidmaError {
    /// Wraps a foreign error raised while constructing `name`.
    ///
    /// ```
    /// use khidma_service::error::KhidmaError;
    ///
    /// let err = KhidmaError::construction("db", std::io::Error::other("refused"));
    /// assert_eq!(err.to_string(), "Failed to construct db: refused");
    /// ```
    pub fn construction(
        name: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        KhidmaError::ConstructionFailed {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Returns `true` for [`KhidmaError::Cancelled`] and [`KhidmaError::DeadlineExceeded`].
    pub fn is_context_error(&self) -> bool {
        matches!(self, KhidmaError::Cancelled | KhidmaError::DeadlineExceeded)
    }
}

/// Error when a service name is not in the registry.
#[derive(Debug)]
pub struct ServiceNotFoundError {
    /// The name that was requested
    pub requested: String,
    /// Registered names that look similar ("did you mean?")
    pub suggestions: Vec<String>,
}

impl fmt::Display for ServiceNotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service not found: {}", self.requested)?;

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        write!(
            f,
            "\n  Hint: Did you forget to provide {:?} before invoking it?",
            self.requested
        )
    }
}

/// Error when trying to provide a service whose name is taken.
#[derive(Debug)]
pub struct AlreadyProvidedError {
    pub name: String,
}

impl fmt::Display for AlreadyProvidedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service already provided: {}", self.name)?;
        write!(
            f,
            "\n  Hint: Use a distinct name, or enable allow_override on the container builder"
        )
    }
}

/// Shutdown failures collected across a container, in shutdown order.
#[derive(Debug, Default)]
pub struct ShutdownErrors {
    pub failures: Vec<(String, KhidmaError)>,
}

impl ShutdownErrors {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|(name, _)| name.as_str())
    }
}

impl fmt::Display for ShutdownErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} service(s) failed to shut down:", self.failures.len())?;
        for (name, err) in &self.failures {
            write!(f, "\n  - {name}: {err}")?;
        }
        Ok(())
    }
}

/// Convenient Result type for Khidma operations.
pub type Result<T> = std::result::Result<T, KhidmaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_error_display() {
        let err = KhidmaError::NotFound(ServiceNotFoundError {
            requested: "datbase".to_string(),
            suggestions: vec!["database".to_string()],
        });

        let msg = format!("{err}");
        assert!(msg.contains("not found"));
        assert!(msg.contains("datbase"));
        assert!(msg.contains("- database"));
    }

    #[test]
    fn already_provided_error_display() {
        let err = KhidmaError::AlreadyProvided(AlreadyProvidedError { name: "db".into() });
        let msg = format!("{err}");
        assert!(msg.contains("already provided: db"));
        assert!(msg.contains("allow_override"));
    }

    #[test]
    fn construction_keeps_source() {
        use std::error::Error;

        let err = KhidmaError::construction("db", "connection refused");
        assert!(err.source().is_some());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn shutdown_errors_display() {
        let errors = ShutdownErrors {
            failures: vec![
                ("db".into(), KhidmaError::Cancelled),
                (
                    "cache".into(),
                    KhidmaError::ShutdownFailed {
                        name: "cache".into(),
                        source: "flush failed".into(),
                    },
                ),
            ],
        };

        let msg = KhidmaError::Shutdown(errors).to_string();
        assert!(msg.starts_with("2 service(s)"));
        assert!(msg.contains("db: Context cancelled"));
        assert!(msg.contains("flush failed"));
    }

    #[test]
    fn context_errors() {
        assert!(KhidmaError::Cancelled.is_context_error());
        assert!(KhidmaError::DeadlineExceeded.is_context_error());
        assert!(!KhidmaError::TypeMismatch { name: "x".into(), expected: "u8" }.is_context_error());
    }
}

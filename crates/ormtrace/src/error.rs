//! Error types for ormtrace

use std::fmt;
use thiserror::Error;

/// Result type alias for ormtrace operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors reported by the instrumented operation itself.
///
/// Adapters surface these through [`Operation::error`](crate::Operation::error); the hook
/// engine only classifies them and never alters them.
#[derive(Debug, Error)]
pub enum OrmError {
    /// Query execution error
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// A single failed callback registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    /// A callback with the same name already exists on the processor.
    #[error("callback `{name}` is already registered on the {processor} processor")]
    DuplicateName {
        processor: &'static str,
        name: String,
    },

    /// The referenced hook point does not exist on the processor.
    #[error("hook point `{anchor}` does not exist on the {processor} processor")]
    UnknownHookPoint {
        processor: &'static str,
        anchor: String,
    },
}

/// Every callback registration that failed during one [`register`](crate::register) call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationError {
    errors: Vec<CallbackError>,
}

impl RegistrationError {
    pub(crate) fn push(&mut self, err: CallbackError) {
        self.errors.push(err);
    }

    pub(crate) fn into_result(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Registration(self))
        }
    }

    /// The individual failures, in registration order.
    pub fn errors(&self) -> &[CallbackError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RegistrationError {}

/// Crate-level errors: wiring, configuration and background task failures.
#[derive(Debug, Error)]
pub enum Error {
    /// One or more instrumentation callbacks could not be registered.
    #[error("callback registration failed:\n{0}")]
    Registration(RegistrationError),

    /// A view with the same name but a different definition is already registered.
    #[error("view `{0}` is already registered with a different definition")]
    ViewConflict(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pool error
    #[error("Pool error: {0}")]
    Pool(String),

    /// Background task could not be joined
    #[error("sampler task join error: {0}")]
    Join(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// The aggregated registration failures, if this is a registration error.
    pub fn registration(&self) -> Option<&RegistrationError> {
        match self {
            Self::Registration(errs) => Some(errs),
            _ => None,
        }
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for Error {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

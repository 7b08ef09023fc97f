//! Operation adapter for the legacy ORM generation.
//!
//! Legacy scopes carry no context field; request-scoped values live in a string-keyed
//! settings map, and the propagated context is stored there under
//! [`CONTEXT_SCOPE_KEY`].

use crate::error::OrmError;
use crate::operation::Operation;
use opentelemetry::Context;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Settings key the propagated context is stored under.
pub const CONTEXT_SCOPE_KEY: &str = "ormtrace:context";

/// A legacy operation scope.
#[derive(Default)]
pub struct Scope {
    /// Target table.
    pub table_name: String,
    /// SQL text built for this scope.
    pub sql: String,
    /// Error produced by the operation, if any.
    pub db_error: Option<OrmError>,
    settings: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Scope {
    /// Create a scope targeting `table_name`.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Self::default()
        }
    }

    /// Store a setting value under `key`, replacing any previous value.
    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.settings.insert(key.into(), Box::new(value));
    }

    /// Fetch a setting value of type `T`.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.settings.get(key).and_then(|v| v.downcast_ref::<T>())
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("table_name", &self.table_name)
            .field("sql", &self.sql)
            .field("db_error", &self.db_error)
            .field("settings", &self.settings.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Set the propagated context on a legacy scope for instrumentation.
pub fn with_context(cx: Context, mut scope: Scope) -> Scope {
    scope.set(CONTEXT_SCOPE_KEY, cx);
    scope
}

impl Operation for Scope {
    const DRIVER: &'static str = "orm_v1";

    fn table(&self) -> &str {
        &self.table_name
    }

    fn sql(&self) -> &str {
        &self.sql
    }

    fn context(&self) -> Option<&Context> {
        self.get::<Context>(CONTEXT_SCOPE_KEY)
    }

    fn set_context(&mut self, cx: Context) {
        self.set(CONTEXT_SCOPE_KEY, cx);
    }

    fn clear_context(&mut self) {
        self.settings.remove(CONTEXT_SCOPE_KEY);
    }

    fn error(&self) -> Option<&OrmError> {
        self.db_error.as_ref()
    }
}

//! Operation adapter for the current ORM generation, where the propagated context is a
//! first-class field of the statement.

use crate::error::OrmError;
use crate::operation::Operation;
use opentelemetry::Context;

/// A single statement flowing through the callback chain.
#[derive(Debug, Default)]
pub struct Statement {
    /// Target table.
    pub table: String,
    /// SQL text. Anchor callbacks may build or rewrite it during execution.
    pub sql: String,
    context: Option<Context>,
    error: Option<OrmError>,
}

impl Statement {
    /// Create a statement targeting `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Set the SQL text.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = sql.into();
        self
    }

    /// Attach a propagated context (parent span, tags) for instrumentation.
    pub fn with_context(mut self, cx: Context) -> Self {
        self.context = Some(cx);
        self
    }

    /// Record the error produced by executing the statement.
    pub fn set_error(&mut self, err: OrmError) {
        self.error = Some(err);
    }

    /// Take the error out of the statement, leaving it successful.
    pub fn take_error(&mut self) -> Option<OrmError> {
        self.error.take()
    }
}

impl Operation for Statement {
    const DRIVER: &'static str = "orm";

    fn table(&self) -> &str {
        &self.table
    }

    fn sql(&self) -> &str {
        &self.sql
    }

    fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    fn set_context(&mut self, cx: Context) {
        self.context = Some(cx);
    }

    fn clear_context(&mut self) {
        self.context = None;
    }

    fn error(&self) -> Option<&OrmError> {
        self.error.as_ref()
    }
}

//! The capability interface the hook engine needs from an ORM operation.

use crate::callbacks::ProcessorKind;
use crate::error::OrmError;
use opentelemetry::Context;
use std::fmt;

/// The kind of database operation being instrumented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// INSERT through the create processor
    Create,
    /// SELECT through the query processor
    Query,
    /// Raw row query
    RowQuery,
    /// UPDATE through the update processor
    Update,
    /// DELETE through the delete processor
    Delete,
}

impl OperationKind {
    /// All kinds, in registration order.
    pub const ALL: [OperationKind; 5] = [
        OperationKind::Create,
        OperationKind::Query,
        OperationKind::RowQuery,
        OperationKind::Update,
        OperationKind::Delete,
    ];

    /// Label used in span names and the `operation` metric tag.
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Query => "query",
            OperationKind::RowQuery => "row_query",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }

    /// The processor and anchor callback this kind is instrumented around.
    pub fn hook_point(self) -> (ProcessorKind, &'static str) {
        let processor = match self {
            OperationKind::Create => ProcessorKind::Create,
            OperationKind::Query => ProcessorKind::Query,
            OperationKind::RowQuery => ProcessorKind::Row,
            OperationKind::Update => ProcessorKind::Update,
            OperationKind::Delete => ProcessorKind::Delete,
        };
        (processor, processor.anchor())
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the hook engine reads from and writes to a single ORM operation.
///
/// One implementation exists per supported ORM generation; see
/// [`Statement`](crate::Statement) and [`Scope`](crate::Scope).
pub trait Operation {
    /// Prefix for span names, identifying the driver/ORM generation.
    const DRIVER: &'static str;

    /// Table the operation targets (may be empty).
    fn table(&self) -> &str;

    /// SQL text as currently known. Some kinds only finalize it during execution.
    fn sql(&self) -> &str;

    /// The propagated context attached to this operation, if any.
    fn context(&self) -> Option<&Context>;

    /// Replace the propagated context.
    fn set_context(&mut self, cx: Context);

    /// Remove the propagated context.
    fn clear_context(&mut self);

    /// The error reported by the operation, if it failed.
    fn error(&self) -> Option<&OrmError>;
}

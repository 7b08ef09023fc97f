//! Operation lifecycle registry.
//!
//! Each [`Processor`] is an ordered chain of named callbacks run for one kind of
//! operation. The ORM owns the anchor callbacks (`orm:create`, `orm:query`, ...) that
//! actually execute SQL; instrumentation registers around them:
//!
//! ```rust,ignore
//! let mut callbacks = Callbacks::<Statement>::new();
//! callbacks.query().replace("orm:query", |stmt| run_select(stmt))?;
//! callbacks
//!     .query()
//!     .before("orm:query")
//!     .register("audit:before_query", |stmt| audit(stmt))?;
//!
//! callbacks.query().execute(&mut stmt);
//! ```

mod processor;


pub use processor::{Callback, Processor, Registration};

use std::fmt;

/// Identifies one processor chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessorKind {
    Create,
    Query,
    Row,
    Update,
    Delete,
}

impl ProcessorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessorKind::Create => "create",
            ProcessorKind::Query => "query",
            ProcessorKind::Row => "row",
            ProcessorKind::Update => "update",
            ProcessorKind::Delete => "delete",
        }
    }

    /// The anchor callback the ORM installs on this processor.
    pub fn anchor(self) -> &'static str {
        match self {
            ProcessorKind::Create => "orm:create",
            ProcessorKind::Query => "orm:query",
            ProcessorKind::Row => "orm:row_query",
            ProcessorKind::Update => "orm:update",
            ProcessorKind::Delete => "orm:delete",
        }
    }
}

impl fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The full set of processors for operations of type `O`.
pub struct Callbacks<O> {
    create: Processor<O>,
    query: Processor<O>,
    row: Processor<O>,
    update: Processor<O>,
    delete: Processor<O>,
}

impl<O: 'static> Callbacks<O> {
    /// Create a registry with only the (no-op) anchor callbacks installed.
    pub fn new() -> Self {
        Self {
            create: Processor::new(ProcessorKind::Create),
            query: Processor::new(ProcessorKind::Query),
            row: Processor::new(ProcessorKind::Row),
            update: Processor::new(ProcessorKind::Update),
            delete: Processor::new(ProcessorKind::Delete),
        }
    }

    pub fn create(&mut self) -> &mut Processor<O> {
        &mut self.create
    }

    pub fn query(&mut self) -> &mut Processor<O> {
        &mut self.query
    }

    pub fn row(&mut self) -> &mut Processor<O> {
        &mut self.row
    }

    pub fn update(&mut self) -> &mut Processor<O> {
        &mut self.update
    }

    pub fn delete(&mut self) -> &mut Processor<O> {
        &mut self.delete
    }

    /// Get a processor by kind.
    pub fn processor(&self, kind: ProcessorKind) -> &Processor<O> {
        match kind {
            ProcessorKind::Create => &self.create,
            ProcessorKind::Query => &self.query,
            ProcessorKind::Row => &self.row,
            ProcessorKind::Update => &self.update,
            ProcessorKind::Delete => &self.delete,
        }
    }

    /// Get a mutable processor by kind.
    pub fn processor_mut(&mut self, kind: ProcessorKind) -> &mut Processor<O> {
        match kind {
            ProcessorKind::Create => &mut self.create,
            ProcessorKind::Query => &mut self.query,
            ProcessorKind::Row => &mut self.row,
            ProcessorKind::Update => &mut self.update,
            ProcessorKind::Delete => &mut self.delete,
        }
    }

    /// Run the chain for `kind` against `op`.
    pub fn execute(&self, kind: ProcessorKind, op: &mut O) {
        self.processor(kind).execute(op);
    }
}

impl<O: 'static> Default for Callbacks<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> fmt::Debug for Callbacks<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("create", &self.create)
            .field("query", &self.query)
            .field("row", &self.row)
            .field("update", &self.update)
            .field("delete", &self.delete)
            .finish()
    }
}

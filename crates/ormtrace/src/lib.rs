//! # ormtrace
//!
//! Tracing and metrics instrumentation for ORM operation lifecycles.
//!
//! ## Features
//!
//! - **Lifecycle hooks**: a span and query metrics around every create, query, row query,
//!   update and delete, registered next to the ORM's own callbacks
//! - **Context propagation**: spans join the caller's trace; the caller's context is
//!   restored once the operation finishes
//! - **Two ORM generations**: one engine over the [`Operation`] trait, with adapters for
//!   [`Statement`] and the legacy [`Scope`]
//! - **Pool sampling**: a cancellable background task recording connection-pool health
//!
//! ## Usage
//!
//! ```ignore
//! use ormtrace::{Callbacks, InstrumentationConfig, InstrumentationHooks, Statement};
//! use ormtrace::stats::{OtelRecorder, ViewRegistry};
//! use std::sync::Arc;
//!
//! let views = ViewRegistry::with_default_views()?;
//! let recorder = Arc::new(OtelRecorder::new(&opentelemetry::global::meter("orm"), &views));
//!
//! let hooks = InstrumentationHooks::new(opentelemetry::global::tracer("orm"), recorder)
//!     .with_config(InstrumentationConfig::new().record_query_text(true));
//!
//! let mut callbacks = Callbacks::<Statement>::new();
//! ormtrace::register(&mut callbacks, hooks)?;
//!
//! let mut stmt = Statement::new("orders").with_context(opentelemetry::Context::current());
//! callbacks.query().execute(&mut stmt);
//! ```

pub mod callbacks;
pub mod config;
pub mod error;
pub mod hooks;
pub mod operation;
pub mod sampler;
pub mod scope;
pub mod statement;
pub mod stats;
pub mod tags;
pub mod trace;

pub use callbacks::{Callbacks, Processor, ProcessorKind};
pub use config::{HookOption, InstrumentationConfig, SpanStartOptions};
pub use error::{CallbackError, Error, OrmError, RegistrationError, Result};
pub use hooks::{InstrumentationHooks, register};
pub use operation::{Operation, OperationKind};
pub use sampler::{
    ConnectionPool, PingError, PoolSampler, PoolStats, SamplerConfig, SamplerExit,
    start_sampling,
};
pub use scope::Scope;
pub use statement::Statement;
pub use stats::{StatsRecorder, ViewRegistry};
pub use tags::{Mutator, TagContextExt, TagKey, TagMap};

#[cfg(feature = "pool")]
pub use sampler::{TrackedPool, create_pool, create_pool_with_config};

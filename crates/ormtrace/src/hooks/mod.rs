//! The instrumentation hook engine.
//!
//! [`register`] installs a before/after pair around the anchor callback of each
//! operation kind. `before` opens a span (when allowed) and stamps the start time into
//! the operation's tags; `after` closes the span, records query metrics, and puts the
//! caller's context back on the operation.
//!
//! # Example
//!
//! ```rust,ignore
//! use ormtrace::{Callbacks, InstrumentationConfig, InstrumentationHooks, Statement, register};
//!
//! let hooks = InstrumentationHooks::new(tracer, recorder).with_config(
//!     InstrumentationConfig::new()
//!         .allow_root_span(true)
//!         .record_query_text(true),
//! );
//!
//! let mut callbacks = Callbacks::<Statement>::new();
//! register(&mut callbacks, hooks)?;
//! ```

#[cfg(test)]
mod tests;

use crate::callbacks::Callbacks;
use crate::config::{HookOption, InstrumentationConfig};
use crate::error::{RegistrationError, Result};
use crate::operation::{Operation, OperationKind};
use crate::stats::{StatsRecorder, measure};
use crate::tags::{self, Mutator, TagContextExt, TagKey};
use crate::trace;
use chrono::Utc;
use opentelemetry::Context;
use opentelemetry::trace::Tracer;
use std::sync::Arc;

/// Marker stored in an operation's context between `before` and `after`.
#[derive(Clone)]
struct OperationScope {
    /// The context the operation carried before instrumentation, if any.
    parent: Option<Context>,
    /// Whether `before` opened a span that `after` must close.
    span_open: bool,
}

/// Before/after callbacks sharing one configuration, tracer and recorder.
pub struct InstrumentationHooks<T> {
    tracer: T,
    config: InstrumentationConfig,
    recorder: Arc<dyn StatsRecorder>,
    start_key: TagKey,
}

impl<T> InstrumentationHooks<T>
where
    T: Tracer + Send + Sync + 'static,
    T::Span: Send + Sync + 'static,
{
    /// Create hooks with the default configuration.
    pub fn new(tracer: T, recorder: Arc<dyn StatsRecorder>) -> Self {
        Self {
            tracer,
            config: InstrumentationConfig::default(),
            recorder,
            start_key: tags::QUERY_START,
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: InstrumentationConfig) -> Self {
        self.config = config;
        self
    }

    /// Apply `options` in order on top of the current configuration. Later options win.
    pub fn with_options(mut self, options: impl IntoIterator<Item = HookOption>) -> Self {
        self.config = options.into_iter().fold(self.config, InstrumentationConfig::apply);
        self
    }

    /// Get the current configuration.
    pub fn config(&self) -> &InstrumentationConfig {
        &self.config
    }

    /// Instrument the start of an operation of `kind`.
    pub fn before<O: Operation>(&self, op: &mut O, kind: OperationKind) {
        let parent = op.context().cloned();
        let incoming = parent.clone().unwrap_or_else(Context::new);

        let (cx, span_open) =
            match trace::start_span(&self.tracer, &self.config, &incoming, op, kind) {
                Some(cx) => (cx, true),
                None => (incoming, false),
            };
        let cx = self.start_stats(cx, op, kind);

        op.set_context(cx.with_value(OperationScope { parent, span_open }));
    }

    /// Instrument the end of an operation.
    ///
    /// Does nothing if `before` did not run for this operation.
    pub fn after<O: Operation>(&self, op: &mut O) {
        let Some(cx) = op.context().cloned() else {
            return;
        };
        let Some(scope) = cx.get::<OperationScope>().cloned() else {
            return;
        };

        if scope.span_open {
            trace::end_span(&self.config, &cx, op);
        }
        self.end_stats(&cx, op);

        match scope.parent {
            Some(parent) => op.set_context(parent),
            None => op.clear_context(),
        }
    }

    fn start_stats<O: Operation>(&self, cx: Context, op: &O, kind: OperationKind) -> Context {
        let mutators = [
            Mutator::upsert(tags::OPERATION, kind.as_str()),
            Mutator::upsert(tags::TABLE, op.table()),
            Mutator::upsert(self.start_key, tags::format_timestamp(Utc::now())),
        ];

        let mut tag_map = cx.tag_map().cloned().unwrap_or_default();
        for mutator in &mutators {
            match tag_map.apply([mutator]) {
                Ok(next) => tag_map = next,
                Err(err) => tracing::debug!(
                    target: "ormtrace",
                    error = %err,
                    operation = kind.as_str(),
                    "tag rejected, recording without it"
                ),
            }
        }
        cx.with_tag_map(tag_map)
    }

    fn end_stats<O: Operation>(&self, cx: &Context, op: &O) {
        if op.error().is_some() {
            return;
        }

        let mut tag_map = cx.tag_map().cloned().unwrap_or_default();
        let started = tag_map.remove(self.start_key);

        let mut measurements = Vec::with_capacity(2);
        if let Some(raw) = started {
            match tags::parse_timestamp(&raw) {
                Ok(start) => measurements.push(
                    measure::LATENCY.float_value(tags::elapsed_ms(start, Utc::now())),
                ),
                Err(err) => tracing::debug!(
                    target: "ormtrace",
                    error = %err,
                    value = %raw,
                    "unparseable query start timestamp, skipping latency"
                ),
            }
        }
        measurements.push(measure::QUERY_COUNT.int_value(1));

        self.recorder.record(&tag_map, &measurements);
    }
}

/// Register instrumentation callbacks for all five operation kinds.
///
/// Every registration is attempted; all failures are returned together.
pub fn register<O, T>(callbacks: &mut Callbacks<O>, hooks: InstrumentationHooks<T>) -> Result<()>
where
    O: Operation + 'static,
    T: Tracer + Send + Sync + 'static,
    T::Span: Send + Sync + 'static,
{
    let hooks = Arc::new(hooks);
    let mut errors = RegistrationError::default();

    for kind in OperationKind::ALL {
        let (processor, anchor) = kind.hook_point();

        let name = format!("instrumentation:before_{kind}");
        let h = hooks.clone();
        let result = callbacks
            .processor_mut(processor)
            .before(anchor)
            .register(name.clone(), move |op: &mut O| h.before(op, kind));
        track(&mut errors, result, &name);

        let name = format!("instrumentation:after_{kind}");
        let h = hooks.clone();
        let result = callbacks
            .processor_mut(processor)
            .after(anchor)
            .register(name.clone(), move |op: &mut O| h.after(op));
        track(&mut errors, result, &name);
    }

    errors.into_result()
}

fn track(
    errors: &mut RegistrationError,
    result: std::result::Result<(), crate::error::CallbackError>,
    name: &str,
) {
    match result {
        Ok(()) => tracing::debug!(target: "ormtrace", callback = name, "registered"),
        Err(err) => {
            tracing::warn!(
                target: "ormtrace",
                callback = name,
                error = %err,
                "registration failed"
            );
            errors.push(err);
        }
    }
}

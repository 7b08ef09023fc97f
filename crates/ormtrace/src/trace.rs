//! Span naming, attributes and status mapping.

use crate::config::InstrumentationConfig;
use crate::error::OrmError;
use crate::operation::{Operation, OperationKind};
use opentelemetry::trace::{
    SamplingResult, SpanBuilder, SpanKind, Status, TraceContextExt, TraceState, Tracer,
};
use opentelemetry::{Context, KeyValue};

/// Query text, under the attribute APM backends aggregate queries by.
pub const RESOURCE_NAME_ATTRIBUTE: &str = "resource.name";
/// Default attribute key for the target table.
pub const TABLE_ATTRIBUTE: &str = "gorm.table";
/// Canonical status code of the operation (`OK`, `NOT_FOUND`, `UNKNOWN`).
pub const STATUS_CODE_ATTRIBUTE: &str = "status.code";

/// Terminal status of an instrumented operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanStatus {
    Ok,
    NotFound(String),
    Unknown(String),
}

impl SpanStatus {
    /// Classify an operation outcome.
    pub fn from_error(err: Option<&OrmError>) -> Self {
        match err {
            None => SpanStatus::Ok,
            Some(e) if e.is_not_found() => SpanStatus::NotFound(e.to_string()),
            Some(e) => SpanStatus::Unknown(e.to_string()),
        }
    }

    /// Canonical code name.
    pub fn code(&self) -> &'static str {
        match self {
            SpanStatus::Ok => "OK",
            SpanStatus::NotFound(_) => "NOT_FOUND",
            SpanStatus::Unknown(_) => "UNKNOWN",
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            SpanStatus::Ok => None,
            SpanStatus::NotFound(m) | SpanStatus::Unknown(m) => Some(m),
        }
    }

    /// The OpenTelemetry status this maps to.
    pub fn to_otel(&self) -> Status {
        match self {
            SpanStatus::Ok => Status::Ok,
            SpanStatus::NotFound(m) | SpanStatus::Unknown(m) => Status::error(m.clone()),
        }
    }
}

/// `"<driver>:<kind>"`.
pub fn span_name<O: Operation>(kind: OperationKind) -> String {
    format!("{}:{}", O::DRIVER, kind.as_str())
}

/// Start the span for `op` if the configuration and `cx` allow one.
///
/// Returns `cx` with the new span active, or `None` when no span is created (no
/// active parent and root spans disallowed).
pub(crate) fn start_span<T, O>(
    tracer: &T,
    config: &InstrumentationConfig,
    cx: &Context,
    op: &O,
    kind: OperationKind,
) -> Option<Context>
where
    T: Tracer,
    T::Span: Send + Sync + 'static,
    O: Operation,
{
    let has_parent = cx.has_active_span();
    if !has_parent && !config.allow_root_span {
        return None;
    }

    let mut attributes = Vec::with_capacity(config.default_attributes.len() + 1);
    attributes.extend(config.default_attributes.iter().cloned());
    attributes.push(KeyValue::new(config.table_attribute, op.table().to_string()));

    let builder = SpanBuilder::from_name(span_name::<O>(kind)).with_attributes(attributes);

    let span = if has_parent {
        tracer.build_with_context(builder.with_kind(SpanKind::Client), cx)
    } else {
        let options = &config.span_start_options;
        let mut builder = builder.with_kind(options.kind.clone());
        if let Some(decision) = options.sampling.clone() {
            builder = builder.with_sampling_result(SamplingResult {
                decision,
                attributes: Vec::new(),
                trace_state: TraceState::default(),
            });
        }
        tracer.build_with_context(builder, &Context::new())
    };

    Some(cx.with_span(span))
}

/// Finish the span active in `cx`: query text, status, end.
///
/// The query text is only attached here, once it is final.
pub(crate) fn end_span<O: Operation>(config: &InstrumentationConfig, cx: &Context, op: &O) {
    let span = cx.span();

    if config.record_query_text && !op.sql().is_empty() {
        span.set_attribute(KeyValue::new(RESOURCE_NAME_ATTRIBUTE, op.sql().to_string()));
    }

    let status = SpanStatus::from_error(op.error());
    span.set_attribute(KeyValue::new(STATUS_CODE_ATTRIBUTE, status.code()));
    span.set_status(status.to_otel());
    span.end();
}

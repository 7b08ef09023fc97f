use super::*;
use crate::callbacks::ProcessorKind;
use crate::config::{HookOption, InstrumentationConfig, SpanStartOptions};
use crate::error::{CallbackError, Error, OrmError};
use crate::scope::{self, Scope};
use crate::stats::{InMemoryRecorder, MeasureValue};
use crate::statement::Statement;
use crate::trace::{RESOURCE_NAME_ATTRIBUTE, STATUS_CODE_ATTRIBUTE, TABLE_ATTRIBUTE};
use opentelemetry::KeyValue;
use opentelemetry::trace::{
    SamplingDecision, Span as _, SpanKind, Status, TraceContextExt, Tracer as _,
    TracerProvider as _,
};
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
use opentelemetry_sdk::trace::TracerProvider;

struct Harness<O> {
    exporter: InMemorySpanExporter,
    provider: TracerProvider,
    recorder: Arc<InMemoryRecorder>,
    callbacks: Callbacks<O>,
}

impl<O: Operation + 'static> Harness<O> {
    fn new(config: InstrumentationConfig) -> Self {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let recorder = Arc::new(InMemoryRecorder::new());

        let hooks = InstrumentationHooks::new(provider.tracer("ormtrace-test"), recorder.clone())
            .with_config(config);
        let mut callbacks = Callbacks::new();
        register(&mut callbacks, hooks).unwrap();

        Self {
            exporter,
            provider,
            recorder,
            callbacks,
        }
    }

    fn spans(&self) -> Vec<SpanData> {
        self.exporter.get_finished_spans().unwrap()
    }

    fn run(&self, kind: OperationKind, op: &mut O) {
        let (processor, _) = kind.hook_point();
        self.callbacks.execute(processor, op);
    }
}

fn attr(span: &SpanData, key: &str) -> Option<String> {
    span.attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| kv.value.as_str().into_owned())
}

fn fail_with(err: fn() -> OrmError) -> impl Fn(&mut Statement) + Send + Sync + 'static {
    move |stmt: &mut Statement| stmt.set_error(err())
}

#[test]
fn registers_ten_callbacks_around_anchors() {
    let harness = Harness::<Statement>::new(InstrumentationConfig::new());

    let names: Vec<_> = harness
        .callbacks
        .processor(ProcessorKind::Query)
        .names()
        .collect();
    assert_eq!(
        names,
        vec![
            "instrumentation:before_query",
            "orm:query",
            "instrumentation:after_query"
        ]
    );

    let row: Vec<_> = harness
        .callbacks
        .processor(ProcessorKind::Row)
        .names()
        .collect();
    assert_eq!(
        row,
        vec![
            "instrumentation:before_row_query",
            "orm:row_query",
            "instrumentation:after_row_query"
        ]
    );
}

#[test]
fn double_registration_reports_every_failure() {
    let mut harness = Harness::<Statement>::new(InstrumentationConfig::new());
    let tracer = harness.provider.tracer("second");
    let hooks = InstrumentationHooks::new(tracer, harness.recorder.clone());

    let err = register(&mut harness.callbacks, hooks).unwrap_err();
    let errors = err.registration().expect("registration error");
    assert_eq!(errors.len(), 10);
    assert!(
        errors
            .errors()
            .iter()
            .all(|e| matches!(e, CallbackError::DuplicateName { .. }))
    );
    assert!(matches!(err, Error::Registration(_)));
}

#[test]
fn missing_hook_point_is_reported() {
    let mut callbacks = Callbacks::<Statement>::new();
    callbacks.delete().remove("orm:delete").unwrap();

    let provider = TracerProvider::builder().build();
    let hooks = InstrumentationHooks::new(
        provider.tracer("t"),
        Arc::new(InMemoryRecorder::new()),
    );
    let err = register(&mut callbacks, hooks).unwrap_err();
    let errors = err.registration().unwrap();
    assert_eq!(errors.len(), 2);
    assert!(errors.errors().iter().all(|e| matches!(
        e,
        CallbackError::UnknownHookPoint { processor: "delete", .. }
    )));
    // The other kinds are still instrumented.
    assert!(callbacks.query().contains("instrumentation:before_query"));
}

#[test]
fn options_are_folded_in_order() {
    let provider = TracerProvider::builder().build();
    let hooks = InstrumentationHooks::new(provider.tracer("t"), Arc::new(InMemoryRecorder::new()))
        .with_options([
            HookOption::AllowRootSpan(true),
            HookOption::RecordQueryText(true),
            HookOption::AllowRootSpan(false),
        ]);
    assert!(!hooks.config().allow_root_span);
    assert!(hooks.config().record_query_text);
}

#[test]
fn no_parent_and_no_root_creates_no_span() {
    let harness = Harness::<Statement>::new(InstrumentationConfig::new());
    let mut stmt = Statement::new("orders");

    harness.run(OperationKind::Query, &mut stmt);

    assert!(harness.spans().is_empty());
    // Stats do not depend on tracing.
    assert_eq!(
        harness
            .recorder
            .records_for(&measure::QUERY_COUNT)
            .len(),
        1
    );
}

#[test]
fn root_span_when_allowed() {
    let harness = Harness::<Statement>::new(InstrumentationConfig::new().allow_root_span(true));
    let mut stmt = Statement::new("users");

    harness.run(OperationKind::Create, &mut stmt);

    let spans = harness.spans();
    assert_eq!(spans.len(), 1);
    let span = &spans[0];
    assert_eq!(span.name, "orm:create");
    assert_eq!(span.span_kind, SpanKind::Client);
    assert_eq!(span.parent_span_id, opentelemetry::trace::SpanId::INVALID);
    assert_eq!(attr(span, TABLE_ATTRIBUTE).as_deref(), Some("users"));
    assert_eq!(attr(span, RESOURCE_NAME_ATTRIBUTE), None);
    assert_eq!(span.status, Status::Ok);
}

#[test]
fn root_span_respects_sampling_override() {
    let config = InstrumentationConfig::new()
        .allow_root_span(true)
        .with_span_start_options(SpanStartOptions::new().with_sampling(SamplingDecision::Drop));
    let harness = Harness::<Statement>::new(config);
    let mut stmt = Statement::new("users");

    harness.run(OperationKind::Query, &mut stmt);

    assert!(harness.spans().is_empty());
    assert_eq!(harness.recorder.records_for(&measure::QUERY_COUNT).len(), 1);
}

#[test]
fn child_span_under_parent() {
    let harness = Harness::<Statement>::new(InstrumentationConfig::new());
    let parent = harness.provider.tracer("http").start("GET /orders");
    let parent_id = parent.span_context().span_id();
    let cx = Context::new().with_span(parent);

    let mut stmt = Statement::new("orders").with_context(cx);
    harness.run(OperationKind::Update, &mut stmt);

    let spans = harness.spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].name, "orm:update");
    assert_eq!(spans[0].parent_span_id, parent_id);
    assert_eq!(spans[0].span_kind, SpanKind::Client);

    // The caller's span is still the active one and was not ended by the hooks.
    let restored = stmt.context().unwrap();
    assert_eq!(restored.span().span_context().span_id(), parent_id);
}

#[test]
fn successful_query_records_span_and_metrics() {
    let config = InstrumentationConfig::new()
        .record_query_text(true)
        .with_default_attribute(KeyValue::new("span.type", "sql"));
    let harness = Harness::<Statement>::new(config);

    let parent = harness.provider.tracer("http").start("request");
    let mut stmt = Statement::new("orders")
        .with_sql("SELECT * FROM orders")
        .with_context(Context::new().with_span(parent));
    harness.run(OperationKind::Query, &mut stmt);

    let spans = harness.spans();
    assert_eq!(spans.len(), 1);
    let span = &spans[0];
    assert_eq!(span.name, "orm:query");
    assert_eq!(attr(span, TABLE_ATTRIBUTE).as_deref(), Some("orders"));
    assert_eq!(
        attr(span, RESOURCE_NAME_ATTRIBUTE).as_deref(),
        Some("SELECT * FROM orders")
    );
    assert_eq!(attr(span, "span.type").as_deref(), Some("sql"));
    assert_eq!(attr(span, STATUS_CODE_ATTRIBUTE).as_deref(), Some("OK"));
    assert_eq!(span.status, Status::Ok);

    let counts = harness.recorder.records_for(&measure::QUERY_COUNT);
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].value, MeasureValue::Int(1));
    assert_eq!(counts[0].tags.value(tags::OPERATION), Some("query"));
    assert_eq!(counts[0].tags.value(tags::TABLE), Some("orders"));
    assert!(!counts[0].tags.contains(tags::QUERY_START));

    let latencies = harness.recorder.records_for(&measure::LATENCY);
    assert_eq!(latencies.len(), 1);
    let ms = latencies[0].value.as_f64();
    assert!((0.0..5_000.0).contains(&ms), "latency {ms}ms out of bounds");
    assert_eq!(harness.recorder.batch_count(), 1);
}

#[test]
fn query_text_finalized_during_execution_is_recorded() {
    let config = InstrumentationConfig::new()
        .allow_root_span(true)
        .record_query_text(true);
    let mut harness = Harness::<Statement>::new(config);
    harness
        .callbacks
        .create()
        .replace("orm:create", |stmt: &mut Statement| {
            stmt.sql = "INSERT INTO users (name) VALUES ($1)".to_string();
        })
        .unwrap();

    let mut stmt = Statement::new("users");
    harness.run(OperationKind::Create, &mut stmt);

    let spans = harness.spans();
    assert_eq!(
        attr(&spans[0], RESOURCE_NAME_ATTRIBUTE).as_deref(),
        Some("INSERT INTO users (name) VALUES ($1)")
    );
}

#[test]
fn rewritten_query_text_is_recorded_once() {
    let config = InstrumentationConfig::new()
        .allow_root_span(true)
        .record_query_text(true);
    let mut harness = Harness::<Statement>::new(config);
    harness
        .callbacks
        .update()
        .replace("orm:update", |stmt: &mut Statement| {
            stmt.sql = "UPDATE orders SET status = $1 WHERE id = $2".to_string();
        })
        .unwrap();

    let mut stmt = Statement::new("orders").with_sql("UPDATE orders SET status = ?");
    harness.run(OperationKind::Update, &mut stmt);

    let spans = harness.spans();
    let texts: Vec<_> = spans[0]
        .attributes
        .iter()
        .filter(|kv| kv.key.as_str() == RESOURCE_NAME_ATTRIBUTE)
        .map(|kv| kv.value.as_str().into_owned())
        .collect();
    assert_eq!(texts, vec!["UPDATE orders SET status = $1 WHERE id = $2"]);
}

#[test]
fn empty_query_text_is_not_recorded() {
    let config = InstrumentationConfig::new()
        .allow_root_span(true)
        .record_query_text(true);
    let harness = Harness::<Statement>::new(config);

    let mut stmt = Statement::new("orders");
    harness.run(OperationKind::Delete, &mut stmt);

    let spans = harness.spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(attr(&spans[0], RESOURCE_NAME_ATTRIBUTE), None);
}

#[test]
fn table_attribute_key_is_configurable() {
    let config = InstrumentationConfig::new()
        .allow_root_span(true)
        .with_table_attribute("db.sql.table");
    let harness = Harness::<Statement>::new(config);

    let mut stmt = Statement::new("invoices");
    harness.run(OperationKind::Query, &mut stmt);

    let spans = harness.spans();
    assert_eq!(attr(&spans[0], "db.sql.table").as_deref(), Some("invoices"));
    assert_eq!(attr(&spans[0], TABLE_ATTRIBUTE), None);
}

#[test]
fn not_found_is_distinct_and_skips_metrics() {
    let mut harness = Harness::<Statement>::new(InstrumentationConfig::new().allow_root_span(true));
    harness
        .callbacks
        .query()
        .replace("orm:query", fail_with(|| OrmError::not_found("record not found")))
        .unwrap();

    let mut stmt = Statement::new("orders");
    harness.run(OperationKind::Query, &mut stmt);

    let spans = harness.spans();
    assert_eq!(attr(&spans[0], STATUS_CODE_ATTRIBUTE).as_deref(), Some("NOT_FOUND"));
    assert_eq!(
        spans[0].status,
        Status::error("Not found: record not found".to_string())
    );
    assert!(harness.recorder.records().is_empty());
    // The error is left for the caller.
    assert!(stmt.take_error().unwrap().is_not_found());
}

#[test]
fn other_errors_map_to_unknown() {
    let mut harness = Harness::<Statement>::new(InstrumentationConfig::new().allow_root_span(true));
    harness
        .callbacks
        .delete()
        .replace("orm:delete", fail_with(|| OrmError::other("permission denied")))
        .unwrap();

    let mut stmt = Statement::new("orders");
    harness.run(OperationKind::Delete, &mut stmt);

    let spans = harness.spans();
    assert_eq!(attr(&spans[0], STATUS_CODE_ATTRIBUTE).as_deref(), Some("UNKNOWN"));
    assert_eq!(spans[0].status, Status::error("permission denied".to_string()));
    assert!(harness.recorder.records().is_empty());
}

#[test]
fn start_tag_does_not_leak_into_next_operation() {
    let harness = Harness::<Statement>::new(InstrumentationConfig::new().allow_root_span(true));
    let base = Context::new()
        .with_tags(&[Mutator::upsert(tags::DATABASE, "primary")])
        .unwrap();

    let mut stmt = Statement::new("orders").with_context(base);
    harness.run(OperationKind::Query, &mut stmt);

    let cx = stmt.context().unwrap();
    let tags_after = cx.tag_map().unwrap();
    assert!(!tags_after.contains(tags::QUERY_START));
    assert!(!tags_after.contains(tags::OPERATION));
    assert_eq!(tags_after.value(tags::DATABASE), Some("primary"));
    assert!(cx.get::<OperationScope>().is_none());
    assert!(!cx.has_active_span());

    // A second operation on the same lineage starts clean: a fresh root span.
    harness.run(OperationKind::Update, &mut stmt);
    let spans = harness.spans();
    assert_eq!(spans.len(), 2);
    assert_eq!(spans[1].parent_span_id, opentelemetry::trace::SpanId::INVALID);

    let counts = harness.recorder.records_for(&measure::QUERY_COUNT);
    assert_eq!(counts[1].tags.value(tags::OPERATION), Some("update"));
    assert_eq!(counts[1].tags.value(tags::DATABASE), Some("primary"));
}

#[test]
fn after_without_before_is_noop() {
    let recorder = Arc::new(InMemoryRecorder::new());
    let exporter = InMemorySpanExporter::default();
    let provider = TracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    let hooks = InstrumentationHooks::new(provider.tracer("t"), recorder.clone())
        .with_config(InstrumentationConfig::new().allow_root_span(true));

    let mut bare = Statement::new("orders");
    hooks.after(&mut bare);
    assert!(bare.context().is_none());

    let parent = provider.tracer("http").start("request");
    let mut with_parent = Statement::new("orders").with_context(Context::new().with_span(parent));
    hooks.after(&mut with_parent);
    hooks.after(&mut with_parent);

    assert!(exporter.get_finished_spans().unwrap().is_empty());
    assert!(recorder.records().is_empty());
}

#[test]
fn span_is_closed_exactly_once() {
    let recorder = Arc::new(InMemoryRecorder::new());
    let exporter = InMemorySpanExporter::default();
    let provider = TracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    let hooks = InstrumentationHooks::new(provider.tracer("t"), recorder.clone())
        .with_config(InstrumentationConfig::new().allow_root_span(true));

    let mut stmt = Statement::new("orders");
    hooks.before(&mut stmt, OperationKind::Query);
    hooks.after(&mut stmt);
    hooks.after(&mut stmt);

    assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
    assert_eq!(recorder.records_for(&measure::QUERY_COUNT).len(), 1);
}

#[test]
fn unparseable_start_still_counts() {
    let recorder = Arc::new(InMemoryRecorder::new());
    let provider = TracerProvider::builder().build();
    let hooks = InstrumentationHooks::new(provider.tracer("t"), recorder.clone());

    let cx = Context::new()
        .with_tags(&[
            Mutator::upsert(tags::OPERATION, "query"),
            Mutator::upsert(tags::QUERY_START, "not-a-timestamp"),
        ])
        .unwrap()
        .with_value(OperationScope {
            parent: None,
            span_open: false,
        });
    let mut stmt = Statement::new("orders").with_context(cx);
    hooks.after(&mut stmt);

    assert!(recorder.records_for(&measure::LATENCY).is_empty());
    let counts = recorder.records_for(&measure::QUERY_COUNT);
    assert_eq!(counts.len(), 1);
    assert!(!counts[0].tags.contains(tags::QUERY_START));
}

#[test]
fn non_ascii_table_is_tagged_and_timed() {
    let harness = Harness::<Statement>::new(InstrumentationConfig::new());
    let mut stmt = Statement::new("commandes_été");

    harness.run(OperationKind::Query, &mut stmt);

    let counts = harness.recorder.records_for(&measure::QUERY_COUNT);
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].tags.value(tags::OPERATION), Some("query"));
    assert_eq!(counts[0].tags.value(tags::TABLE), Some("commandes_été"));

    let latencies = harness.recorder.records_for(&measure::LATENCY);
    assert_eq!(latencies.len(), 1);
    assert_eq!(latencies[0].tags.value(tags::TABLE), Some("commandes_été"));
}

#[test]
fn rejected_table_tag_keeps_operation_and_latency() {
    let harness = Harness::<Statement>::new(InstrumentationConfig::new());
    let mut stmt = Statement::new("orders\n; DROP");

    harness.run(OperationKind::Query, &mut stmt);

    let counts = harness.recorder.records_for(&measure::QUERY_COUNT);
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].tags.value(tags::OPERATION), Some("query"));
    assert!(!counts[0].tags.contains(tags::TABLE));

    let latencies = harness.recorder.records_for(&measure::LATENCY);
    assert_eq!(latencies.len(), 1);
    assert!(!latencies[0].tags.contains(tags::TABLE));
}

#[test]
fn missing_context_stays_missing() {
    let harness = Harness::<Statement>::new(InstrumentationConfig::new().allow_root_span(true));
    let mut stmt = Statement::new("orders");

    harness.run(OperationKind::Create, &mut stmt);

    assert_eq!(harness.spans().len(), 1);
    assert_eq!(harness.recorder.records_for(&measure::QUERY_COUNT).len(), 1);
    assert!(stmt.context().is_none());

    let harness = Harness::<Scope>::new(InstrumentationConfig::new().allow_root_span(true));
    let mut op = Scope::new("orders");

    harness.run(OperationKind::Delete, &mut op);

    assert_eq!(harness.spans().len(), 1);
    assert!(op.context().is_none());
    assert!(op.get::<Context>(scope::CONTEXT_SCOPE_KEY).is_none());
}

#[test]
fn legacy_scope_adapter_is_instrumented() {
    let mut harness = Harness::<Scope>::new(InstrumentationConfig::new().record_query_text(true));
    harness
        .callbacks
        .row()
        .replace("orm:row_query", |scope: &mut Scope| {
            scope.sql = "SELECT count(*) FROM invoices".to_string();
        })
        .unwrap();

    let parent = harness.provider.tracer("job").start("nightly");
    let mut op = scope::with_context(Context::new().with_span(parent), Scope::new("invoices"));
    harness.run(OperationKind::RowQuery, &mut op);

    let spans = harness.spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].name, "orm_v1:row_query");
    assert_eq!(
        attr(&spans[0], RESOURCE_NAME_ATTRIBUTE).as_deref(),
        Some("SELECT count(*) FROM invoices")
    );

    let counts = harness.recorder.records_for(&measure::QUERY_COUNT);
    assert_eq!(counts[0].tags.value(tags::OPERATION), Some("row_query"));
    assert_eq!(counts[0].tags.value(tags::TABLE), Some("invoices"));
    assert!(op.context().unwrap().get::<OperationScope>().is_none());
}

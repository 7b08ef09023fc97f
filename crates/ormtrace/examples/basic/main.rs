//! Example: instrument an in-process ORM callback chain and print what was recorded.
//!
//! Run with:
//!   cargo run --example basic -p ormtrace
//!
//! Set `RUST_LOG=ormtrace=debug` to see registration logs.

use opentelemetry::Context;
use opentelemetry::trace::{TraceContextExt, Tracer, TracerProvider as _};
use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
use opentelemetry_sdk::trace::TracerProvider;
use ormtrace::stats::InMemoryRecorder;
use ormtrace::{
    Callbacks, HookOption, InstrumentationConfig, InstrumentationHooks, OrmError, Statement,
    register,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let exporter = InMemorySpanExporter::default();
    let provider = TracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    let recorder = Arc::new(InMemoryRecorder::new());

    let config = InstrumentationConfig::from_options([
        HookOption::AllowRootSpan(true),
        HookOption::RecordQueryText(true),
    ]);
    let hooks =
        InstrumentationHooks::new(provider.tracer("orm"), recorder.clone()).with_config(config);

    let mut callbacks = Callbacks::<Statement>::new();
    register(&mut callbacks, hooks)?;

    // Stand-ins for the ORM's own SQL execution.
    callbacks.query().replace("orm:query", |stmt: &mut Statement| {
        stmt.sql = format!("SELECT * FROM {} WHERE id = $1", stmt.table);
        if stmt.table == "missing" {
            stmt.set_error(OrmError::not_found("record not found"));
        }
    })?;
    callbacks.create().replace("orm:create", |stmt: &mut Statement| {
        stmt.sql = format!("INSERT INTO {} DEFAULT VALUES", stmt.table);
    })?;

    let request = provider.tracer("http").start("POST /orders");
    let cx = Context::new().with_span(request);

    let mut insert = Statement::new("orders").with_context(cx.clone());
    callbacks.create().execute(&mut insert);

    let mut select = Statement::new("orders").with_context(cx.clone());
    callbacks.query().execute(&mut select);

    let mut lookup = Statement::new("missing").with_context(cx.clone());
    callbacks.query().execute(&mut lookup);

    cx.span().end();

    println!("spans:");
    let spans = exporter
        .get_finished_spans()
        .map_err(|e| anyhow::anyhow!("{e:?}"))?;
    for span in spans {
        println!("  {} {:?} {:?}", span.name, span.span_kind, span.status);
        for kv in &span.attributes {
            println!("    {} = {}", kv.key, kv.value);
        }
    }

    println!("measurements:");
    for record in recorder.records() {
        let tags: Vec<String> = record
            .tags
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        println!(
            "  {} {:.3} [{}]",
            record.measure,
            record.value.as_f64(),
            tags.join(", ")
        );
    }

    Ok(())
}

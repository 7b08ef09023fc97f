use super::StatsRecorder;
use super::measure::Measurement;
use super::view::{Aggregation, ViewRegistry};
use crate::tags::{TagKey, TagMap};
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};

enum Instrument {
    Count(Counter<u64>),
    Sum(Counter<f64>),
    LastValue(Gauge<f64>),
    Distribution(Histogram<f64>),
}

struct BoundView {
    measure: &'static str,
    tag_keys: Vec<TagKey>,
    instrument: Instrument,
}

/// Records measurements into OpenTelemetry instruments, one per registered view.
///
/// Each view only receives the tags it declares, so dimensions stay bounded even
/// when callers attach extra tags.
pub struct OtelRecorder {
    views: Vec<BoundView>,
}

impl OtelRecorder {
    /// Create instruments on `meter` for every view in `registry`.
    pub fn new(meter: &Meter, registry: &ViewRegistry) -> Self {
        let views = registry
            .iter()
            .map(|view| {
                let unit = view.measure.unit;
                let instrument = match view.aggregation {
                    Aggregation::Count => Instrument::Count(
                        meter
                            .u64_counter(view.name)
                            .with_description(view.description)
                            .build(),
                    ),
                    Aggregation::Sum => Instrument::Sum(
                        meter
                            .f64_counter(view.name)
                            .with_description(view.description)
                            .with_unit(unit)
                            .build(),
                    ),
                    Aggregation::LastValue => Instrument::LastValue(
                        meter
                            .f64_gauge(view.name)
                            .with_description(view.description)
                            .with_unit(unit)
                            .build(),
                    ),
                    Aggregation::Distribution => Instrument::Distribution(
                        meter
                            .f64_histogram(view.name)
                            .with_description(view.description)
                            .with_unit(unit)
                            .build(),
                    ),
                };
                BoundView {
                    measure: view.measure.name,
                    tag_keys: view.tag_keys.clone(),
                    instrument,
                }
            })
            .collect();

        Self { views }
    }

    /// Number of bound views.
    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

impl StatsRecorder for OtelRecorder {
    fn record(&self, tags: &TagMap, measurements: &[Measurement]) {
        for m in measurements {
            for view in self.views.iter().filter(|v| v.measure == m.measure.name) {
                let attributes: Vec<KeyValue> = view
                    .tag_keys
                    .iter()
                    .filter_map(|k| tags.value(*k).map(|v| KeyValue::new(k.name(), v.to_string())))
                    .collect();
                let value = m.value.as_f64();
                match &view.instrument {
                    Instrument::Count(c) => c.add(1, &attributes),
                    Instrument::Sum(c) => c.add(value, &attributes),
                    Instrument::LastValue(g) => g.record(value, &attributes),
                    Instrument::Distribution(h) => h.record(value, &attributes),
                }
            }
        }
    }
}

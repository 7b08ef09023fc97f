use super::measure::{self, Measure};
use crate::error::{Error, Result};
use crate::tags::{self, TagKey};
use std::collections::BTreeMap;

/// How recorded values of a view are aggregated by the metrics backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Number of measurements.
    Count,
    /// Sum of values.
    Sum,
    /// Most recent value.
    LastValue,
    /// Value distribution (histogram).
    Distribution,
}

/// A named aggregation of one measure over a fixed set of tag keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub name: &'static str,
    pub description: &'static str,
    pub measure: &'static Measure,
    pub tag_keys: Vec<TagKey>,
    pub aggregation: Aggregation,
}

impl View {
    fn new(measure: &'static Measure, tag_keys: Vec<TagKey>, aggregation: Aggregation) -> Self {
        Self {
            name: measure.name,
            description: measure.description,
            measure,
            tag_keys,
            aggregation,
        }
    }
}

/// Query count and latency per operation and table, plus pool gauges per database.
pub fn default_views() -> Vec<View> {
    let per_query = || vec![tags::OPERATION, tags::TABLE];
    let per_db = || vec![tags::DATABASE];

    vec![
        View::new(&measure::QUERY_COUNT, per_query(), Aggregation::Count),
        View::new(&measure::LATENCY, per_query(), Aggregation::Distribution),
        View::new(&measure::OPEN_CONNECTIONS, per_db(), Aggregation::LastValue),
        View::new(&measure::IDLE_CONNECTIONS, per_db(), Aggregation::LastValue),
        View::new(&measure::ACTIVE_CONNECTIONS, per_db(), Aggregation::LastValue),
        View::new(&measure::WAIT_COUNT, per_db(), Aggregation::LastValue),
        View::new(&measure::WAIT_DURATION, per_db(), Aggregation::LastValue),
        View::new(&measure::IDLE_CLOSED, per_db(), Aggregation::LastValue),
        View::new(&measure::LIFETIME_CLOSED, per_db(), Aggregation::LastValue),
    ]
}

/// The set of views a recorder aggregates into.
///
/// Built once at startup and handed to [`OtelRecorder`](super::OtelRecorder). A
/// registration error means the metrics wiring is inconsistent and startup should
/// abort.
#[derive(Debug, Clone, Default)]
pub struct ViewRegistry {
    views: BTreeMap<&'static str, View>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding [`default_views`].
    pub fn with_default_views() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(default_views())?;
        Ok(registry)
    }

    /// Register `views`.
    ///
    /// Re-registering an identical view is a no-op. A different view under an
    /// existing name fails, and nothing from this call is registered.
    pub fn register(&mut self, views: impl IntoIterator<Item = View>) -> Result<()> {
        let views: Vec<View> = views.into_iter().collect();
        for view in &views {
            if let Some(existing) = self.views.get(view.name) {
                if existing != view {
                    return Err(Error::ViewConflict(view.name.to_string()));
                }
            }
        }
        for view in views {
            self.views.insert(view.name, view);
        }
        Ok(())
    }

    /// Remove the view named `name`.
    pub fn unregister(&mut self, name: &str) -> Option<View> {
        self.views.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&View> {
        self.views.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &View> {
        self.views.values()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

use crate::trace::TABLE_ATTRIBUTE;
use opentelemetry::KeyValue;
use opentelemetry::trace::{SamplingDecision, SpanKind};

/// Overrides applied when the hooks start a root span.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanStartOptions {
    /// Span kind for root spans. Defaults to [`SpanKind::Client`].
    pub kind: SpanKind,
    /// Force a sampling decision for root spans instead of the provider's sampler.
    pub sampling: Option<SamplingDecision>,
}

impl Default for SpanStartOptions {
    fn default() -> Self {
        Self {
            kind: SpanKind::Client,
            sampling: None,
        }
    }
}

impl SpanStartOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_sampling(mut self, decision: SamplingDecision) -> Self {
        self.sampling = Some(decision);
        self
    }
}

/// Configuration shared by every instrumentation callback.
///
/// By default no root spans are created and SQL text is not recorded.
#[derive(Debug, Clone)]
pub struct InstrumentationConfig {
    /// Start a root span when the operation's context has no active span.
    pub allow_root_span: bool,
    /// Attach the SQL text to spans under `resource.name`.
    ///
    /// Only enable this if queries never embed sensitive literals.
    pub record_query_text: bool,
    /// Root span overrides.
    pub span_start_options: SpanStartOptions,
    /// Attributes added to every span.
    pub default_attributes: Vec<KeyValue>,
    /// Span attribute key holding the target table.
    pub table_attribute: &'static str,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            allow_root_span: false,
            record_query_text: false,
            span_start_options: SpanStartOptions::default(),
            default_attributes: Vec::new(),
            table_attribute: TABLE_ATTRIBUTE,
        }
    }
}

/// One configuration change. A list of options is applied in order; later options win.
#[derive(Debug, Clone)]
pub enum HookOption {
    AllowRootSpan(bool),
    RecordQueryText(bool),
    SpanStartOptions(SpanStartOptions),
    TableAttribute(&'static str),
    DefaultAttributes(Vec<KeyValue>),
}

impl InstrumentationConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration by applying `options` in order.
    pub fn from_options(options: impl IntoIterator<Item = HookOption>) -> Self {
        options.into_iter().fold(Self::default(), Self::apply)
    }

    /// Apply a single option.
    pub fn apply(self, option: HookOption) -> Self {
        match option {
            HookOption::AllowRootSpan(v) => self.allow_root_span(v),
            HookOption::RecordQueryText(v) => self.record_query_text(v),
            HookOption::SpanStartOptions(o) => self.with_span_start_options(o),
            HookOption::DefaultAttributes(a) => self.with_default_attributes(a),
            HookOption::TableAttribute(key) => self.with_table_attribute(key),
        }
    }

    /// Allow creating root spans in the absence of a parent span.
    pub fn allow_root_span(mut self, allow: bool) -> Self {
        self.allow_root_span = allow;
        self
    }

    /// Record SQL text on spans.
    pub fn record_query_text(mut self, record: bool) -> Self {
        self.record_query_text = record;
        self
    }

    /// Set root span start options.
    pub fn with_span_start_options(mut self, options: SpanStartOptions) -> Self {
        self.span_start_options = options;
        self
    }

    /// Replace the default span attributes.
    pub fn with_default_attributes(mut self, attributes: Vec<KeyValue>) -> Self {
        self.default_attributes = attributes;
        self
    }

    /// Use `key` instead of `gorm.table` for the table attribute.
    pub fn with_table_attribute(mut self, key: &'static str) -> Self {
        self.table_attribute = key;
        self
    }

    /// Append one default span attribute.
    pub fn with_default_attribute(mut self, attribute: KeyValue) -> Self {
        self.default_attributes.push(attribute);
        self
    }
}

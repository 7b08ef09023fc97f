/// Whether a measure carries integer or floating-point values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureType {
    Int64,
    Float64,
}

/// A named quantity that can be recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measure {
    pub name: &'static str,
    pub description: &'static str,
    pub unit: &'static str,
    pub kind: MeasureType,
}

impl Measure {
    const fn int(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            unit: "1",
            kind: MeasureType::Int64,
        }
    }

    const fn millis(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            unit: "ms",
            kind: MeasureType::Float64,
        }
    }

    /// A measurement of this measure with an integer value.
    pub fn int_value(&'static self, value: i64) -> Measurement {
        Measurement {
            measure: self,
            value: MeasureValue::Int(value),
        }
    }

    /// A measurement of this measure with a floating-point value.
    pub fn float_value(&'static self, value: f64) -> Measurement {
        Measurement {
            measure: self,
            value: MeasureValue::Float(value),
        }
    }
}

pub static QUERY_COUNT: Measure = Measure::int("orm/client/queries", "Number of queries");
pub static LATENCY: Measure = Measure::millis("orm/client/latency", "Query latency");

pub static OPEN_CONNECTIONS: Measure =
    Measure::int("orm/client/connections/open", "Number of open connections");
pub static IDLE_CONNECTIONS: Measure =
    Measure::int("orm/client/connections/idle", "Number of idle connections");
pub static ACTIVE_CONNECTIONS: Measure =
    Measure::int("orm/client/connections/active", "Number of connections in use");
pub static WAIT_COUNT: Measure = Measure::int(
    "orm/client/connections/wait_count",
    "Total number of connections waited for",
);
pub static WAIT_DURATION: Measure = Measure::millis(
    "orm/client/connections/wait_duration",
    "Total time blocked waiting for a new connection",
);
pub static IDLE_CLOSED: Measure = Measure::int(
    "orm/client/connections/idle_closed",
    "Total number of connections closed due to idle time",
);
pub static LIFETIME_CLOSED: Measure = Measure::int(
    "orm/client/connections/lifetime_closed",
    "Total number of connections closed due to max lifetime",
);

/// A recorded value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeasureValue {
    Int(i64),
    Float(f64),
}

impl MeasureValue {
    pub fn as_f64(self) -> f64 {
        match self {
            MeasureValue::Int(v) => v as f64,
            MeasureValue::Float(v) => v,
        }
    }
}

/// One value of one measure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub measure: &'static Measure,
    pub value: MeasureValue,
}

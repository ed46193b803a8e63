use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Write};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, PartialOrd, Serialize)]
pub enum Kind {
    Gauge,
    Sum,
}

/// A single sample, kept in the numeric type it was reported with.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, PartialOrd, Serialize)]
#[serde(untagged)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Display for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! impl_from_int {
    ($typ:ty) => {
        impl From<$typ> for Number {
            fn from(value: $typ) -> Self {
                Number::Int(value as i64)
            }
        }
    };
}

impl_from_int!(i64);
impl_from_int!(i32);

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number::Float(value)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricValue {
    Sum(Number),
    Gauge(Number),
}

impl MetricValue {
    pub fn number(&self) -> Number {
        match self {
            MetricValue::Sum(n) | MetricValue::Gauge(n) => *n,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, PartialOrd, Serialize)]
pub struct MetricSeries {
    pub name: String,
    pub tags: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, PartialOrd, Serialize)]
pub struct Metric {
    #[serde(flatten)]
    pub series: MetricSeries,

    pub description: Option<String>,

    pub timestamp: Option<DateTime<Utc>>,

    /// When the cumulative value started accumulating, only set for sums.
    pub start_timestamp: Option<DateTime<Utc>>,

    pub value: MetricValue,
}

impl Display for Metric {
    /// Display a metric using something like Prometheus's text format
    ///
    /// ```text
    /// TIMESTAMP NAME{TAGS} VALUE
    /// ```
    ///
    /// example:
    /// ```text
    /// 2023-10-18T06:10:43.523615Z redis_db_keys{db="0"} 1
    /// ```
    fn fmt(&self, fmt: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(timestamp) = &self.timestamp {
            write!(fmt, "{timestamp:?} ")?;
        }

        write!(fmt, "{}", self.name())?;

        if !self.series.tags.is_empty() {
            fmt.write_char('{')?;

            let mut n = 0;
            for (k, v) in self.tags() {
                n += 1;
                write!(fmt, "{k}=\"{v}\"")?;
                if n != self.series.tags.len() {
                    fmt.write_char(',')?;
                }
            }

            fmt.write_char('}')?;
        }

        write!(fmt, " {}", self.value.number())
    }
}

impl Metric {
    fn new(
        name: impl Into<String>,
        desc: impl Into<String>,
        tags: BTreeMap<String, String>,
        value: MetricValue,
    ) -> Metric {
        Self {
            series: MetricSeries {
                name: name.into(),
                tags,
            },
            description: Some(desc.into()),
            timestamp: None,
            start_timestamp: None,
            value,
        }
    }

    pub fn gauge_with_tags<N, D, V>(
        name: N,
        desc: D,
        value: V,
        tags: BTreeMap<String, String>,
    ) -> Metric
    where
        N: Into<String>,
        D: Into<String>,
        V: Into<Number>,
    {
        Self::new(name, desc, tags, MetricValue::Gauge(value.into()))
    }

    pub fn sum_with_tags<N, D, V>(name: N, desc: D, value: V, tags: BTreeMap<String, String>) -> Metric
    where
        N: Into<String>,
        D: Into<String>,
        V: Into<Number>,
    {
        Self::new(name, desc, tags, MetricValue::Sum(value.into()))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.series.name
    }

    #[inline]
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.series.tags
    }

    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.series.tags.get(name).map(String::as_str)
    }

    pub fn with_timestamp(mut self, ts: Option<DateTime<Utc>>) -> Self {
        self.timestamp = ts;
        self
    }

    pub fn with_start_timestamp(mut self, ts: Option<DateTime<Utc>>) -> Self {
        self.start_timestamp = ts;
        self
    }
}

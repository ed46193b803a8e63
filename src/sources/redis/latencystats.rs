use std::collections::BTreeMap;

use super::{ParseError, split_pair};

/// Latency percentiles of one command from the `latencystats` section
/// (Redis 7.0+), e.g.
///
/// ```text
/// latency_percentiles_usec_info:p50=10.123,p99=110.234,p99.9=120.234
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct LatencyStat {
    pub command: String,
    /// Percentile label, e.g. `p99.9`, to microseconds.
    pub stats: BTreeMap<String, f64>,
}

impl LatencyStat {
    pub fn parse(command: &str, value: &str) -> Result<Self, ParseError> {
        let mut stats = BTreeMap::new();

        for pair in value.split(',') {
            let (percentile, value) = split_pair("latencystats", pair)?;

            if stats.contains_key(percentile) {
                return Err(ParseError::DuplicatePercentile {
                    command: command.to_string(),
                    percentile: percentile.to_string(),
                });
            }

            stats.insert(percentile.to_string(), value.parse::<f64>()?);
        }

        Ok(LatencyStat {
            command: command.to_string(),
            stats,
        })
    }
}

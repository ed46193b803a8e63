use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use event::{Kind, Metric, Number};

use super::ParseError;

/// Identity of an emitted metric.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MetricDesc {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: Kind,
    /// A fixed tag added to every data point, e.g. the CPU `state`.
    pub attribute: Option<(&'static str, &'static str)>,
}

impl MetricDesc {
    pub const fn gauge(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind: Kind::Gauge,
            attribute: None,
        }
    }

    pub const fn sum(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind: Kind::Sum,
            attribute: None,
        }
    }

    pub const fn with_attribute(mut self, key: &'static str, value: &'static str) -> Self {
        self.attribute = Some((key, value));
        self
    }
}

/// How the value of a plain INFO field is recorded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Recorder {
    Int(MetricDesc),
    Float(MetricDesc),
}

impl Recorder {
    #[cfg(test)]
    pub(crate) fn desc(&self) -> &MetricDesc {
        match self {
            Recorder::Int(desc) | Recorder::Float(desc) => desc,
        }
    }

    /// Parse `value` as this recorder's numeric type and record it.
    pub fn record(
        &self,
        builder: &mut MetricsBuilder,
        timestamp: DateTime<Utc>,
        value: &str,
    ) -> Result<(), ParseError> {
        match self {
            Recorder::Int(desc) => {
                let value = value.parse::<i64>()?;
                builder.record(desc, timestamp, value, BTreeMap::new());
            }
            Recorder::Float(desc) => {
                let value = value.parse::<f64>()?;
                builder.record(desc, timestamp, value, BTreeMap::new());
            }
        }

        Ok(())
    }
}

/// Plain INFO fields that are turned into metrics, by field name.
pub static RECORDERS: LazyLock<BTreeMap<&'static str, Recorder>> = LazyLock::new(|| {
    use Recorder::{Float, Int};

    BTreeMap::from([
        // # Server
        (
            "uptime_in_seconds",
            Int(MetricDesc::sum(
                "redis_uptime_seconds",
                "Number of seconds since Redis server start",
            )),
        ),
        // # Clients
        (
            "connected_clients",
            Int(MetricDesc::gauge(
                "redis_clients_connected",
                "Number of client connections (excluding connections from replicas)",
            )),
        ),
        (
            "blocked_clients",
            Int(MetricDesc::gauge(
                "redis_clients_blocked",
                "Number of clients pending on a blocking call",
            )),
        ),
        (
            "client_recent_max_input_buffer",
            Int(MetricDesc::gauge(
                "redis_clients_max_input_buffer_bytes",
                "Biggest input buffer among current client connections",
            )),
        ),
        (
            "client_recent_max_output_buffer",
            Int(MetricDesc::gauge(
                "redis_clients_max_output_buffer_bytes",
                "Longest output list among current client connections",
            )),
        ),
        // # Memory
        (
            "used_memory",
            Int(MetricDesc::gauge(
                "redis_memory_used_bytes",
                "Total number of bytes allocated by Redis using its allocator",
            )),
        ),
        (
            "used_memory_peak",
            Int(MetricDesc::gauge(
                "redis_memory_peak_bytes",
                "Peak memory consumed by Redis",
            )),
        ),
        (
            "used_memory_rss",
            Int(MetricDesc::gauge(
                "redis_memory_rss_bytes",
                "Number of bytes that Redis allocated as seen by the operating system",
            )),
        ),
        (
            "used_memory_lua",
            Int(MetricDesc::gauge(
                "redis_memory_lua_bytes",
                "Number of bytes used by the Lua engine",
            )),
        ),
        (
            "maxmemory",
            Int(MetricDesc::gauge(
                "redis_maxmemory_bytes",
                "The value of the maxmemory configuration directive",
            )),
        ),
        (
            "mem_fragmentation_ratio",
            Float(MetricDesc::gauge(
                "redis_memory_fragmentation_ratio",
                "Ratio between used_memory_rss and used_memory",
            )),
        ),
        // # Persistence
        (
            "rdb_changes_since_last_save",
            Int(MetricDesc::gauge(
                "redis_rdb_changes_since_last_save",
                "Number of changes since the last dump",
            )),
        ),
        // # Stats
        (
            "total_connections_received",
            Int(MetricDesc::sum(
                "redis_connections_received_total",
                "Total number of connections accepted by the server",
            )),
        ),
        (
            "rejected_connections",
            Int(MetricDesc::sum(
                "redis_connections_rejected_total",
                "Number of connections rejected because of maxclients limit",
            )),
        ),
        (
            "total_commands_processed",
            Int(MetricDesc::sum(
                "redis_commands_processed_total",
                "Total number of commands processed by the server",
            )),
        ),
        (
            "instantaneous_ops_per_sec",
            Int(MetricDesc::gauge(
                "redis_commands_per_second",
                "Number of commands processed per second",
            )),
        ),
        (
            "total_net_input_bytes",
            Int(MetricDesc::sum(
                "redis_net_input_bytes_total",
                "The total number of bytes read from the network",
            )),
        ),
        (
            "total_net_output_bytes",
            Int(MetricDesc::sum(
                "redis_net_output_bytes_total",
                "The total number of bytes written to the network",
            )),
        ),
        (
            "expired_keys",
            Int(MetricDesc::sum(
                "redis_keys_expired_total",
                "Total number of key expiration events",
            )),
        ),
        (
            "evicted_keys",
            Int(MetricDesc::sum(
                "redis_keys_evicted_total",
                "Number of evicted keys due to maxmemory limit",
            )),
        ),
        (
            "keyspace_hits",
            Int(MetricDesc::sum(
                "redis_keyspace_hits_total",
                "Number of successful lookup of keys in the main dictionary",
            )),
        ),
        (
            "keyspace_misses",
            Int(MetricDesc::sum(
                "redis_keyspace_misses_total",
                "Number of failed lookup of keys in the main dictionary",
            )),
        ),
        (
            "latest_fork_usec",
            Int(MetricDesc::gauge(
                "redis_latest_fork_usec",
                "Duration of the latest fork operation in microseconds",
            )),
        ),
        // # Replication
        (
            "connected_slaves",
            Int(MetricDesc::gauge(
                "redis_slaves_connected",
                "Number of connected replicas",
            )),
        ),
        (
            "master_repl_offset",
            Int(MetricDesc::gauge(
                "redis_replication_offset",
                "The server's current replication offset",
            )),
        ),
        (
            "repl_backlog_first_byte_offset",
            Int(MetricDesc::gauge(
                "redis_replication_backlog_first_byte_offset",
                "The master offset of the replication backlog buffer",
            )),
        ),
        // # CPU
        (
            "used_cpu_sys",
            Float(CPU_TIME.with_attribute("state", "sys")),
        ),
        (
            "used_cpu_user",
            Float(CPU_TIME.with_attribute("state", "user")),
        ),
        (
            "used_cpu_sys_children",
            Float(CPU_TIME.with_attribute("state", "sys_children")),
        ),
        (
            "used_cpu_user_children",
            Float(CPU_TIME.with_attribute("state", "user_children")),
        ),
    ])
});

const CPU_TIME: MetricDesc = MetricDesc::sum(
    "redis_cpu_time_seconds_total",
    "System CPU consumed by the Redis server in seconds since server start",
);

// # Keyspace, tagged with `db`
pub const DB_KEYS: MetricDesc = MetricDesc::gauge("redis_db_keys", "Number of keyspace keys");
pub const DB_EXPIRES: MetricDesc =
    MetricDesc::gauge("redis_db_expires", "Number of keyspace keys with an expiration");
pub const DB_AVG_TTL: MetricDesc =
    MetricDesc::gauge("redis_db_avg_ttl_milliseconds", "Average keyspace keys TTL");

// # Commandstats, tagged with `cmd`
pub const CMD_CALLS: MetricDesc = MetricDesc::sum(
    "redis_cmd_calls_total",
    "Total number of calls for a command",
);
pub const CMD_USEC: MetricDesc = MetricDesc::sum(
    "redis_cmd_usec_total",
    "Total time for all executions of this command",
);
pub const CMD_USEC_PER_CALL: MetricDesc = MetricDesc::gauge(
    "redis_cmd_usec_per_call",
    "Average time per call of this command",
);
pub const CMD_REJECTED_CALLS: MetricDesc = MetricDesc::sum(
    "redis_cmd_rejected_calls_total",
    "Number of rejected calls, errors prior command execution",
);
pub const CMD_FAILED_CALLS: MetricDesc = MetricDesc::sum(
    "redis_cmd_failed_calls_total",
    "Number of failed calls, errors within the command execution",
);

// # Latencystats, tagged with `command`

/// Percentiles that are recorded, others are parsed but dropped.
pub static LATENCY_PERCENTILES: [(&str, MetricDesc); 6] = [
    (
        "p50",
        MetricDesc::gauge("redis_latencystat_p50", "Command latency 50th percentile in microseconds"),
    ),
    (
        "p90",
        MetricDesc::gauge("redis_latencystat_p90", "Command latency 90th percentile in microseconds"),
    ),
    (
        "p99",
        MetricDesc::gauge("redis_latencystat_p99", "Command latency 99th percentile in microseconds"),
    ),
    (
        "p99.9",
        MetricDesc::gauge(
            "redis_latencystat_p99_9",
            "Command latency 99.9th percentile in microseconds",
        ),
    ),
    (
        "p99.99",
        MetricDesc::gauge(
            "redis_latencystat_p99_99",
            "Command latency 99.99th percentile in microseconds",
        ),
    ),
    (
        "p100",
        MetricDesc::gauge("redis_latencystat_p100", "Command latency 100th percentile in microseconds"),
    ),
];

pub fn latency_percentile(label: &str) -> Option<&'static MetricDesc> {
    LATENCY_PERCENTILES
        .iter()
        .find(|(percentile, _)| *percentile == label)
        .map(|(_, desc)| desc)
}

/// Collects the data points of one scrape.
///
/// Sums are stamped with the start time, which only moves when the scraper
/// notices the server restarted.
#[derive(Debug)]
pub struct MetricsBuilder {
    start_time: DateTime<Utc>,
    metrics: Vec<Metric>,
}

impl Default for MetricsBuilder {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl MetricsBuilder {
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            metrics: Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Start a new accumulation period for every sum.
    pub fn reset(&mut self, start_time: DateTime<Utc>) {
        self.start_time = start_time;
    }

    pub fn record(
        &mut self,
        desc: &MetricDesc,
        timestamp: DateTime<Utc>,
        value: impl Into<Number>,
        mut tags: BTreeMap<String, String>,
    ) {
        if let Some((key, value)) = desc.attribute {
            tags.insert(key.to_string(), value.to_string());
        }

        let metric = match desc.kind {
            Kind::Gauge => Metric::gauge_with_tags(desc.name, desc.description, value, tags),
            Kind::Sum => Metric::sum_with_tags(desc.name, desc.description, value, tags)
                .with_start_timestamp(Some(self.start_time)),
        }
        .with_timestamp(Some(timestamp));

        self.metrics.push(metric);
    }

    /// Hand out everything recorded since the last call.
    pub fn emit(&mut self) -> Vec<Metric> {
        std::mem::take(&mut self.metrics)
    }
}

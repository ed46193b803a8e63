use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use event::{Metric, tags};

use super::Error;
use super::client::Client;
use super::commandstats::CommandStat;
use super::info::Info;
use super::keyspace::Keyspace;
use super::latencystats::LatencyStat;
use super::metrics::{
    CMD_CALLS, CMD_FAILED_CALLS, CMD_REJECTED_CALLS, CMD_USEC, CMD_USEC_PER_CALL, DB_AVG_TTL,
    DB_EXPIRES, DB_KEYS, MetricsBuilder, RECORDERS, latency_percentile,
};

/// Redis has 16 logical databases unless configured otherwise.
const MAX_DATABASES: u8 = 16;
const COMMAND_STATS_PREFIX: &str = "cmdstat_";
const LATENCY_STATS_PREFIX: &str = "latency_percentiles_usec_";

/// Turns INFO reports into metrics, one report per `scrape` call.
///
/// The scraper remembers the uptime it saw last, and uses it to notice
/// server restarts. Calls must not overlap, which `&mut self` enforces.
pub struct Scraper<C> {
    client: C,
    builder: MetricsBuilder,
    /// Zero until the first successful scrape.
    uptime: Duration,
}

impl<C: Client> Scraper<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            builder: MetricsBuilder::default(),
            uptime: Duration::ZERO,
        }
    }

    /// The start time currently stamped on cumulative metrics.
    #[cfg(test)]
    pub(crate) fn start_time(&self) -> DateTime<Utc> {
        self.builder.start_time()
    }

    /// Fetch one report and convert it. Nothing is emitted if the report
    /// cannot be fetched or carries no usable uptime.
    pub async fn scrape(&mut self) -> Result<Vec<Metric>, Error> {
        let text = self.client.retrieve().await?;

        self.collect(&text, Utc::now())
    }

    pub(crate) fn collect(&mut self, text: &str, now: DateTime<Utc>) -> Result<Vec<Metric>, Error> {
        let info = Info::parse(text, self.client.delimiter());
        let uptime = info.uptime()?;

        // a shrinking uptime means the server restarted and its counters
        // started over
        if self.uptime.is_zero() || uptime < self.uptime {
            let start_time = TimeDelta::from_std(uptime)
                .ok()
                .and_then(|elapsed| now.checked_sub_signed(elapsed))
                .unwrap_or(now);

            debug!(
                message = "reset start time of cumulative metrics",
                previous_uptime = ?self.uptime,
                ?uptime,
                %start_time,
            );

            self.builder.reset(start_time);
        }
        self.uptime = uptime;

        self.record_common_metrics(&info, now);
        self.record_keyspace_metrics(&info, now);
        self.record_command_stats_metrics(&info, now);
        self.record_latency_stats_metrics(&info, now);

        Ok(self.builder.emit())
    }

    fn record_common_metrics(&mut self, info: &Info<'_>, now: DateTime<Utc>) {
        for (key, value) in info.iter() {
            let Some(recorder) = RECORDERS.get(key) else {
                continue;
            };

            if let Err(err) = recorder.record(&mut self.builder, now, value) {
                warn!(
                    message = "failed to parse info value",
                    key,
                    value,
                    %err,
                );
            }
        }
    }

    /// Databases are looked up from `db0` upwards, the first one missing
    /// ends the lookup, so any database after a gap is not reported.
    fn record_keyspace_metrics(&mut self, info: &Info<'_>, now: DateTime<Utc>) {
        for db in 0..MAX_DATABASES {
            let key = format!("db{db}");
            let Some(value) = info.get(&key) else {
                break;
            };

            let keyspace = match Keyspace::parse(db, value) {
                Ok(keyspace) => keyspace,
                Err(err) => {
                    warn!(
                        message = "failed to parse keyspace string",
                        %key,
                        value,
                        %err,
                    );

                    continue;
                }
            };

            let db = keyspace.db.to_string();
            self.builder
                .record(&DB_KEYS, now, keyspace.keys, tags!("db" => db.clone()));
            self.builder
                .record(&DB_EXPIRES, now, keyspace.expires, tags!("db" => db.clone()));
            self.builder
                .record(&DB_AVG_TTL, now, keyspace.avg_ttl, tags!("db" => db));
        }
    }

    fn record_command_stats_metrics(&mut self, info: &Info<'_>, now: DateTime<Utc>) {
        for (command, value) in info.with_prefix(COMMAND_STATS_PREFIX) {
            let stat = match CommandStat::parse(command, value) {
                Ok(stat) => stat,
                Err(err) => {
                    warn!(
                        message = "failed to parse commandstat string",
                        command,
                        value,
                        %err,
                    );

                    continue;
                }
            };

            let builder = &mut self.builder;
            builder.record(&CMD_CALLS, now, stat.calls, tags!("cmd" => command));
            builder.record(&CMD_USEC, now, stat.usec, tags!("cmd" => command));
            builder.record(
                &CMD_USEC_PER_CALL,
                now,
                stat.usec_per_call,
                tags!("cmd" => command),
            );
            builder.record(
                &CMD_REJECTED_CALLS,
                now,
                stat.rejected_calls,
                tags!("cmd" => command),
            );
            builder.record(
                &CMD_FAILED_CALLS,
                now,
                stat.failed_calls,
                tags!("cmd" => command),
            );
        }
    }

    fn record_latency_stats_metrics(&mut self, info: &Info<'_>, now: DateTime<Utc>) {
        for (command, value) in info.with_prefix(LATENCY_STATS_PREFIX) {
            // nothing after the prefix
            if command.is_empty() {
                continue;
            }

            let stat = match LatencyStat::parse(command, value) {
                Ok(stat) => stat,
                Err(err) => {
                    warn!(
                        message = "failed to parse latency stats string",
                        command,
                        value,
                        %err,
                    );

                    continue;
                }
            };

            for (percentile, latency) in &stat.stats {
                if let Some(desc) = latency_percentile(percentile) {
                    self.builder
                        .record(desc, now, *latency, tags!("command" => command));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use event::{MetricValue, Number};
    use pretty_assertions::assert_eq;

    use super::super::client;
    use super::super::info::Delimiter;
    use super::*;

    const LATENCY_METRIC_PREFIX: &str = "redis_latencystat_";
    const INFO: &str = include_str!("../../../tests/redis/info.txt");

    /// Serves a fixed text, LF delimited.
    struct FakeClient {
        text: String,
    }

    impl FakeClient {
        fn new(text: impl Into<String>) -> Self {
            Self { text: text.into() }
        }
    }

    #[async_trait::async_trait]
    impl Client for FakeClient {
        async fn retrieve(&mut self) -> Result<String, client::Error> {
            Ok(self.text.clone())
        }

        fn delimiter(&self) -> Delimiter {
            Delimiter::Lf
        }
    }

    struct FailingClient;

    #[async_trait::async_trait]
    impl Client for FailingClient {
        async fn retrieve(&mut self) -> Result<String, client::Error> {
            Err(client::Error::Io(std::io::ErrorKind::ConnectionRefused.into()))
        }

        fn delimiter(&self) -> Delimiter {
            Delimiter::Crlf
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn find<'a>(metrics: &'a [Metric], name: &str, tag: (&str, &str)) -> Option<&'a Metric> {
        metrics
            .iter()
            .find(|m| m.name() == name && m.tag_value(tag.0) == Some(tag.1))
    }

    #[tokio::test]
    async fn scrape_fixture() {
        let mut scraper = Scraper::new(FakeClient::new(INFO));
        let metrics = scraper.scrape().await.unwrap();

        // every registered field appears in the fixture once, plus
        // 2 keyspace lines * 3, 2 commandstats lines * 5 and
        // 5 latencystats lines * 3 percentiles
        assert_eq!(metrics.len(), RECORDERS.len() + 2 * 3 + 2 * 5 + 5 * 3);

        let m = find(&metrics, "redis_latencystat_p50", ("command", "dbsize")).unwrap();
        assert_eq!(m.value, MetricValue::Gauge(Number::Float(30.345)));

        let m = find(&metrics, "redis_cmd_usec_per_call", ("cmd", "info")).unwrap();
        assert_eq!(m.value, MetricValue::Gauge(Number::Float(271.77)));

        let m = find(&metrics, "redis_db_avg_ttl_milliseconds", ("db", "1")).unwrap();
        assert_eq!(m.value, MetricValue::Gauge(Number::Int(45000)));

        let m = find(&metrics, "redis_cpu_time_seconds_total", ("state", "user")).unwrap();
        assert_eq!(m.value, MetricValue::Sum(Number::Float(99.876543)));
    }

    #[tokio::test]
    async fn no_latency_stats() {
        let text = INFO
            .lines()
            .filter(|line| !line.starts_with("latency_percentiles_usec_"))
            .collect::<Vec<_>>()
            .join("\n");
        let mut scraper = Scraper::new(FakeClient::new(text));
        let metrics = scraper.scrape().await.unwrap();

        assert!(!metrics.is_empty());
        assert!(
            metrics
                .iter()
                .all(|m| !m.name().starts_with(LATENCY_METRIC_PREFIX))
        );
    }

    #[tokio::test]
    async fn retrieve_failure() {
        let mut scraper = Scraper::new(FailingClient);
        let err = scraper.scrape().await.unwrap_err();

        assert!(matches!(err, Error::Retrieve(_)), "unexpected {err}");
        assert!(scraper.uptime.is_zero());
    }

    #[test]
    fn missing_uptime() {
        let mut scraper = Scraper::new(FakeClient::new(""));
        let result = scraper.collect("connected_clients:1\ndb0:keys=1,expires=0,avg_ttl=0\n", at(0));

        assert!(matches!(result, Err(Error::MissingUptime)));
        assert!(scraper.builder.emit().is_empty());
    }

    #[test]
    fn keyspace_stops_at_gap() {
        let mut scraper = Scraper::new(FakeClient::new(""));
        let metrics = scraper
            .collect(
                "uptime_in_seconds:10\ndb0:keys=1,expires=0,avg_ttl=0\ndb2:keys=5,expires=1,avg_ttl=7\n",
                at(0),
            )
            .unwrap();

        let dbs = metrics
            .iter()
            .filter_map(|m| m.tag_value("db"))
            .collect::<Vec<_>>();
        assert_eq!(dbs, vec!["0", "0", "0"]);
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let text = [
            "uptime_in_seconds:10",
            "connected_clients:abc",
            "blocked_clients:2",
            "db0:keys=1,expires",
            "db1:keys=1,expires=0,avg_ttl=0",
            "cmdstat_get:calls",
            "cmdstat_set:calls=1,usec=2,usec_per_call=2.00,rejected_calls=0,failed_calls=0",
            "latency_percentiles_usec_get:p50=1,p50=2",
            "latency_percentiles_usec_:p50=1",
            "latency_percentiles_usec_set:p50=1,p75=2",
        ]
        .join("\n");

        let mut scraper = Scraper::new(FakeClient::new(""));
        let metrics = scraper.collect(&text, at(0)).unwrap();

        assert!(metrics.iter().all(|m| m.name() != "redis_clients_connected"));
        assert!(metrics.iter().any(|m| m.name() == "redis_clients_blocked"));

        // db0 fails, db1 is still recorded
        assert!(find(&metrics, "redis_db_keys", ("db", "0")).is_none());
        assert!(find(&metrics, "redis_db_keys", ("db", "1")).is_some());

        assert!(find(&metrics, "redis_cmd_calls_total", ("cmd", "get")).is_none());
        assert!(find(&metrics, "redis_cmd_calls_total", ("cmd", "set")).is_some());

        let latencies = metrics
            .iter()
            .filter(|m| m.name().starts_with(LATENCY_METRIC_PREFIX))
            .map(|m| (m.name(), m.tag_value("command").unwrap()))
            .collect::<Vec<_>>();
        assert_eq!(latencies, vec![("redis_latencystat_p50", "set")]);

        // uptime, blocked_clients, db1 * 3, cmdstat_set * 5, one latency
        assert_eq!(metrics.len(), 2 + 3 + 5 + 1);
    }

    #[test]
    fn restart_detection() {
        let mut scraper = Scraper::new(FakeClient::new(""));

        let metrics = scraper.collect("uptime_in_seconds:100\n", at(1000)).unwrap();
        assert_eq!(scraper.start_time(), at(900));
        assert_eq!(metrics[0].start_timestamp, Some(at(900)));

        // uptime went down, the server restarted
        let metrics = scraper.collect("uptime_in_seconds:50\n", at(1100)).unwrap();
        assert_eq!(scraper.start_time(), at(1050));
        assert_eq!(metrics[0].start_timestamp, Some(at(1050)));

        // uptime keeps growing, start time stays
        let metrics = scraper.collect("uptime_in_seconds:60\n", at(1113)).unwrap();
        assert_eq!(scraper.start_time(), at(1050));
        assert_eq!(metrics[0].start_timestamp, Some(at(1050)));
        assert_eq!(metrics[0].timestamp, Some(at(1113)));
        assert_eq!(scraper.uptime, Duration::from_secs(60));
    }

    #[test]
    fn zero_uptime_stays_cold() {
        let mut scraper = Scraper::new(FakeClient::new(""));

        scraper.collect("uptime_in_seconds:0\n", at(10)).unwrap();
        assert_eq!(scraper.start_time(), at(10));

        scraper.collect("uptime_in_seconds:0\n", at(20)).unwrap();
        assert_eq!(scraper.start_time(), at(20));
    }

    #[test]
    fn failed_cycle_keeps_uptime() {
        let mut scraper = Scraper::new(FakeClient::new(""));

        scraper.collect("uptime_in_seconds:100\n", at(1000)).unwrap();
        assert!(scraper.collect("uptime_in_seconds:x\n", at(1010)).is_err());
        assert_eq!(scraper.uptime, Duration::from_secs(100));

        scraper.collect("uptime_in_seconds:120\n", at(1020)).unwrap();
        assert_eq!(scraper.start_time(), at(900));
    }
}

mod client;
mod commandstats;
mod info;
mod keyspace;
mod latencystats;
mod metrics;
mod scraper;

use std::future::Future;
use std::num::{ParseFloatError, ParseIntError};
use std::time::Duration;

use event::Metric;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

pub use client::{Client, Error as ClientError, RedisClient, Transport};
pub use commandstats::CommandStat;
pub use info::{Delimiter, Info};
pub use keyspace::Keyspace;
pub use latencystats::LatencyStat;
pub use metrics::{MetricDesc, MetricsBuilder, RECORDERS, Recorder};
pub use scraper::Scraper;

/// Errors of a single `key=value` list entry.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("unexpected {kind} pair '{pair}'")]
    UnexpectedPair { kind: &'static str, pair: String },

    #[error("multiple stats in one command '{command}' for the same percentile '{percentile}'")]
    DuplicatePercentile { command: String, percentile: String },

    #[error("field {0} is missing")]
    MissingField(&'static str),

    #[error("parse integer failed, {0}")]
    Integer(#[from] ParseIntError),

    #[error("parse float failed, {0}")]
    Float(#[from] ParseFloatError),
}

/// Split `key=value`, anything but exactly one `=` is rejected.
pub(crate) fn split_pair<'a>(
    kind: &'static str,
    pair: &'a str,
) -> Result<(&'a str, &'a str), ParseError> {
    let mut parts = pair.split('=');

    match (parts.next(), parts.next(), parts.next()) {
        (Some(key), Some(value), None) => Ok((key, value)),
        _ => Err(ParseError::UnexpectedPair {
            kind,
            pair: pair.to_string(),
        }),
    }
}

/// Errors that abort a whole scrape cycle.
#[derive(Debug, Error)]
pub enum Error {
    #[error("retrieve info failed, {0}")]
    Retrieve(#[from] client::Error),

    #[error("uptime_in_seconds is missing")]
    MissingUptime,

    #[error("invalid uptime_in_seconds '{value}', {err}")]
    InvalidUptime { value: String, err: ParseIntError },
}

const fn default_interval() -> Duration {
    Duration::from_secs(15)
}

const fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Redis address, e.g. `localhost:6379`
    pub endpoint: String,

    /// `tcp` or `unix`, with `unix` the endpoint is a socket path.
    #[serde(default)]
    pub transport: Transport,

    /// Duration between each scrape.
    #[serde(default = "default_interval", with = "humanize::duration::serde")]
    pub interval: Duration,

    /// Deadline of one scrape, connecting included.
    #[serde(default = "default_timeout", with = "humanize::duration::serde")]
    pub timeout: Duration,
}

impl Config {
    pub fn build(&self) -> RedisSource<RedisClient> {
        let client = RedisClient::new(self.endpoint.clone(), self.transport, self.timeout);

        RedisSource::new(client, self.interval)
    }
}

pub struct RedisSource<C> {
    scraper: Scraper<C>,
    interval: Duration,
}

impl<C: Client> RedisSource<C> {
    pub fn new(client: C, interval: Duration) -> Self {
        Self {
            scraper: Scraper::new(client),
            interval,
        }
    }

    /// Scrape on every tick until `shutdown` resolves, or the receiving
    /// side of `output` is gone.
    pub async fn run(
        mut self,
        output: mpsc::Sender<Vec<Metric>>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), ()> {
        let mut ticker = tokio::time::interval(self.interval);
        // a slow scrape pushes the next one back instead of bursting
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::pin!(shutdown);

        info!(message = "start scraping redis", interval = ?self.interval);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            // dropping an in-flight scrape leaves the scraper state untouched
            let result = tokio::select! {
                biased;

                _ = &mut shutdown => break,
                result = self.scraper.scrape() => result,
            };

            let metrics = match result {
                Ok(metrics) => metrics,
                Err(err) => {
                    warn!(
                        message = "scrape redis metrics failed",
                        %err
                    );

                    continue;
                }
            };

            if let Err(err) = output.send(metrics).await {
                error!(
                    message = "Error sending redis metrics",
                    %err,
                );

                return Err(());
            }
        }

        info!(message = "redis source stopped");

        Ok(())
    }
}

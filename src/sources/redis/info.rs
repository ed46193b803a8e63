use std::collections::BTreeMap;
use std::ops::Bound;
use std::time::Duration;

use super::Error;

pub const UPTIME_FIELD: &str = "uptime_in_seconds";

/// Line terminator of the INFO text.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Delimiter {
    /// What a live server sends.
    #[default]
    Crlf,
    /// Plain text files, e.g. captured INFO output.
    Lf,
}

impl Delimiter {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Delimiter::Crlf => "\r\n",
            Delimiter::Lf => "\n",
        }
    }
}

/// Fields of one INFO report, borrowed from the raw text.
///
/// The text looks like
///
/// ```text
/// # Server
/// redis_version:7.0.11
/// uptime_in_seconds:104946
///
/// # Keyspace
/// db0:keys=1,expires=0,avg_ttl=0
/// ```
///
/// Section headers and blank lines are dropped, section boundaries are not
/// kept, so a field repeated by a later section replaces the earlier value.
#[derive(Debug, Default)]
pub struct Info<'a> {
    fields: BTreeMap<&'a str, &'a str>,
}

impl<'a> Info<'a> {
    pub fn parse(text: &'a str, delimiter: Delimiter) -> Self {
        let mut fields = BTreeMap::new();

        for line in text.split(delimiter.as_str()) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // lines without a colon are not fields, ignore them
            if let Some((key, value)) = line.split_once(':') {
                fields.insert(key, value);
            }
        }

        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.fields.get(key).copied()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.fields.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a str)> + '_ {
        self.fields.iter().map(|(k, v)| (*k, *v))
    }

    /// Fields whose name starts with `prefix`, with the prefix stripped.
    pub fn with_prefix<'b>(
        &'b self,
        prefix: &'b str,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'b {
        self.fields
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .map_while(move |(&key, &value)| {
                key.strip_prefix(prefix)
                    .map(|stripped| (stripped, value))
            })
    }

    pub fn uptime(&self) -> Result<Duration, Error> {
        let value = self.get(UPTIME_FIELD).ok_or(Error::MissingUptime)?;

        value
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|err| Error::InvalidUptime {
                value: value.to_string(),
                err,
            })
    }
}

use super::{ParseError, split_pair};

/// Counters of one logical database, e.g.
///
/// ```text
/// db0:keys=1,expires=2,avg_ttl=3
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Keyspace {
    pub db: u8,
    pub keys: i64,
    pub expires: i64,
    /// Milliseconds, as reported by the server.
    pub avg_ttl: i64,
}

impl Keyspace {
    /// Parse the value part of a `dbN` line. All three counters must be
    /// present, anything else in the line is skipped.
    pub fn parse(db: u8, value: &str) -> Result<Self, ParseError> {
        let mut keys = None;
        let mut expires = None;
        let mut avg_ttl = None;

        for pair in value.split(',') {
            let (key, value) = split_pair("keyspace", pair)?;

            let field = match key {
                "keys" => &mut keys,
                "expires" => &mut expires,
                "avg_ttl" => &mut avg_ttl,
                _ => continue,
            };

            *field = Some(value.parse::<i64>()?);
        }

        Ok(Keyspace {
            db,
            keys: keys.ok_or(ParseError::MissingField("keys"))?,
            expires: expires.ok_or(ParseError::MissingField("expires"))?,
            avg_ttl: avg_ttl.ok_or(ParseError::MissingField("avg_ttl"))?,
        })
    }
}

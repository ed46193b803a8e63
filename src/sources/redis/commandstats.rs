use std::fmt::{Display, Formatter};

use super::{ParseError, split_pair};

/// Per command counters from the `commandstats` section, e.g.
///
/// ```text
/// cmdstat_get:calls=3890526,usec=12797690,usec_per_call=3.29,rejected_calls=9,failed_calls=0
/// ```
///
/// Older servers only report the first three fields, the others stay zero.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandStat {
    pub command: String,
    pub calls: i64,
    pub usec: i64,
    pub usec_per_call: f64,
    pub rejected_calls: i64,
    pub failed_calls: i64,
}

impl CommandStat {
    /// A pair without exactly one `=` fails the whole line, well formed
    /// pairs with an unknown key are skipped.
    pub fn parse(command: &str, value: &str) -> Result<Self, ParseError> {
        let mut stat = CommandStat {
            command: command.to_string(),
            ..Default::default()
        };

        for pair in value.split(',') {
            let (key, value) = split_pair("commandstat", pair)?;

            let field = match key {
                "calls" => &mut stat.calls,
                "usec" => &mut stat.usec,
                "rejected_calls" => &mut stat.rejected_calls,
                "failed_calls" => &mut stat.failed_calls,
                "usec_per_call" => {
                    stat.usec_per_call = value.parse::<f64>()?;
                    continue;
                }
                _ => continue,
            };

            *field = value.parse::<i64>()?;
        }

        Ok(stat)
    }
}

impl Display for CommandStat {
    /// Writes the five canonical fields in the order the server does.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "calls={},usec={},usec_per_call={},rejected_calls={},failed_calls={}",
            self.calls, self.usec, self.usec_per_call, self.rejected_calls, self.failed_calls
        )
    }
}

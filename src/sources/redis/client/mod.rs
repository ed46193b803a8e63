mod resp;

use std::time::Duration;

use resp::Connection;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

use super::info::Delimiter;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("server error {0}")]
    Server(String),

    #[error("parse frame failed, {0}")]
    Parse(String),

    #[error("unexpected frame type")]
    UnexpectedFrame,

    #[error("timeout after {0:?}")]
    Timeout(Duration),
}

/// Where the raw INFO text comes from.
///
/// The scraper never splits lines on its own guess, implementations
/// report which delimiter their text uses.
#[async_trait::async_trait]
pub trait Client: Send {
    /// Fetch the full status text, all sections concatenated.
    async fn retrieve(&mut self) -> Result<String, Error>;

    fn delimiter(&self) -> Delimiter;
}

/// Sections requested from the server, joined in this order.
const SECTIONS: [&[&str]; 3] = [&["info"], &["info", "commandstats"], &["info", "latencystats"]];

/// Socket type used to reach the server.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// `endpoint` is `host:port`
    #[default]
    Tcp,
    /// `endpoint` is the path of a unix socket
    Unix,
}

pub struct RedisClient {
    endpoint: String,
    transport: Transport,
    timeout: Duration,
}

impl RedisClient {
    pub fn new(endpoint: impl Into<String>, transport: Transport, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport,
            timeout,
        }
    }

    async fn fetch(&self) -> Result<String, Error> {
        match self.transport {
            Transport::Tcp => {
                let conn = Connection::connect_tcp(self.endpoint.as_str()).await?;
                query_sections(conn).await
            }
            #[cfg(unix)]
            Transport::Unix => {
                let conn = Connection::connect_unix(&self.endpoint).await?;
                query_sections(conn).await
            }
            #[cfg(not(unix))]
            Transport::Unix => Err(Error::Io(std::io::ErrorKind::Unsupported.into())),
        }
    }
}

async fn query_sections<S>(mut conn: Connection<S>) -> Result<String, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut replies = Vec::with_capacity(SECTIONS.len());
    for args in SECTIONS {
        replies.push(conn.query(args).await?);
    }

    Ok(replies.join(Delimiter::Crlf.as_str()))
}

#[async_trait::async_trait]
impl Client for RedisClient {
    async fn retrieve(&mut self) -> Result<String, Error> {
        tokio::time::timeout(self.timeout, self.fetch())
            .await
            .map_err(|_elapsed| Error::Timeout(self.timeout))?
    }

    // Redis terminates every INFO line with CRLF
    fn delimiter(&self) -> Delimiter {
        Delimiter::Crlf
    }
}

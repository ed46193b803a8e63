use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
#[cfg(unix)]
use tokio::net::UnixStream;

use super::Error;

/// A RESP2 frame, borrowing from the read buffer.
#[cfg_attr(test, derive(PartialEq))]
#[derive(Clone, Debug)]
pub enum Frame<'a> {
    Simple(&'a str),
    Error(&'a str),
    Integer(i64),
    Bulk(&'a [u8]),
    Null,
    Array(Vec<Frame<'a>>),
}

impl<'a> Frame<'a> {
    /// Parse one frame from the head of `buf`.
    ///
    /// Returns `Ok(None)` when `buf` does not hold a complete frame yet,
    /// otherwise the frame and the number of bytes it occupies.
    ///
    /// https://redis.io/docs/latest/develop/reference/protocol-spec/
    pub fn parse(buf: &'a [u8]) -> Result<Option<(Frame<'a>, usize)>, Error> {
        let mut reader = Reader { buf, pos: 0 };

        Ok(reader.frame()?.map(|frame| (frame, reader.pos)))
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn frame(&mut self) -> Result<Option<Frame<'a>>, Error> {
        let Some(&typ) = self.buf.get(self.pos) else {
            return Ok(None);
        };
        self.pos += 1;

        let Some(line) = self.line() else {
            return Ok(None);
        };

        let frame = match typ {
            b'+' => Frame::Simple(as_str(line)?),
            b'-' => Frame::Error(as_str(line)?),
            b':' => Frame::Integer(parse_number(line)?),
            b'$' => {
                if line == b"-1" {
                    return Ok(Some(Frame::Null));
                }

                let len = parse_number::<usize>(line)?;
                // payload and the trailing CRLF
                let need = len
                    .checked_add(2)
                    .ok_or_else(|| Error::Parse(format!("bulk length {len} is too large")))?;
                if self.buf.len() - self.pos < need {
                    return Ok(None);
                }

                let data = &self.buf[self.pos..self.pos + len];
                if &self.buf[self.pos + len..self.pos + len + 2] != b"\r\n" {
                    return Err(Error::Parse("bulk string is not terminated by CRLF".into()));
                }
                self.pos += len + 2;

                Frame::Bulk(data)
            }
            b'*' => {
                if line == b"-1" {
                    return Ok(Some(Frame::Null));
                }

                let len = parse_number::<usize>(line)?;
                // bounded by the bytes at hand, not by the header
                let mut frames = Vec::with_capacity(len.min(self.buf.len() - self.pos));
                for _ in 0..len {
                    match self.frame()? {
                        Some(frame) => frames.push(frame),
                        None => return Ok(None),
                    }
                }

                Frame::Array(frames)
            }
            other => return Err(Error::Parse(format!("unknown frame type {:?}", other as char))),
        };

        Ok(Some(frame))
    }

    /// Read until the next CRLF, returning the content without it.
    fn line(&mut self) -> Option<&'a [u8]> {
        let start = self.pos;
        let len = self.buf[start..]
            .windows(2)
            .position(|window| window == b"\r\n")?;

        self.pos += len + 2;

        Some(&self.buf[start..start + len])
    }
}

fn as_str(line: &[u8]) -> Result<&str, Error> {
    std::str::from_utf8(line).map_err(|err| Error::Parse(err.to_string()))
}

fn parse_number<T>(line: &[u8]) -> Result<T, Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    as_str(line)?
        .parse::<T>()
        .map_err(|err| Error::Parse(err.to_string()))
}

/// Encode a command as a RESP array of bulk strings.
pub fn encode_command(args: &[&str], buf: &mut BytesMut) {
    buf.put_u8(b'*');
    buf.put_slice(args.len().to_string().as_bytes());
    buf.put_slice(b"\r\n");

    for arg in args {
        buf.put_u8(b'$');
        buf.put_slice(arg.len().to_string().as_bytes());
        buf.put_slice(b"\r\n");
        buf.put_slice(arg.as_bytes());
        buf.put_slice(b"\r\n");
    }
}

#[derive(Debug)]
pub struct Connection<S> {
    stream: S,
    buf: BytesMut,
}

impl Connection<TcpStream> {
    pub async fn connect_tcp<A: ToSocketAddrs>(addr: A) -> Result<Self, Error> {
        let stream = TcpStream::connect(addr).await?;

        Ok(Self::new(stream))
    }
}

#[cfg(unix)]
impl Connection<UnixStream> {
    pub async fn connect_unix(path: &str) -> Result<Self, Error> {
        let stream = UnixStream::connect(path).await?;

        Ok(Self::new(stream))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    fn new(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(16 * 1024),
        }
    }

    /// Send one command and read its reply as a string.
    ///
    /// Error replies become `Error::Server`, a nil reply becomes an empty
    /// string.
    pub async fn query(&mut self, args: &[&str]) -> Result<String, Error> {
        self.buf.clear();
        encode_command(args, &mut self.buf);
        self.stream.write_all(&self.buf).await?;

        self.buf.clear();
        loop {
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return Err(Error::Io(std::io::ErrorKind::UnexpectedEof.into()));
            }

            match Frame::parse(&self.buf)? {
                Some((frame, _)) => return into_string(frame),
                // need more data
                None => continue,
            }
        }
    }
}

fn into_string(frame: Frame<'_>) -> Result<String, Error> {
    match frame {
        Frame::Simple(s) => Ok(s.to_string()),
        Frame::Bulk(data) => String::from_utf8(data.to_vec())
            .map_err(|_err| Error::Parse("invalid utf8 bulk".to_string())),
        Frame::Null => Ok(String::new()),
        Frame::Error(err) => Err(Error::Server(err.to_string())),
        Frame::Integer(_) | Frame::Array(_) => Err(Error::UnexpectedFrame),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse() {
        for (input, expected) in [
            ("+OK\r\n", Some(Frame::Simple("OK"))),
            ("+OK\r", None),
            ("+OK", None),
            ("+", None),
            ("", None),
            (
                "-ERR unknown command 'asdf'\r\n",
                Some(Frame::Error("ERR unknown command 'asdf'")),
            ),
            (":1000\r\n", Some(Frame::Integer(1000))),
            ("$5\r\nhello\r\n", Some(Frame::Bulk(b"hello"))),
            ("$5\r\nhel", None),
            ("$0\r\n\r\n", Some(Frame::Bulk(b""))),
            ("$-1\r\n", Some(Frame::Null)),
            ("*0\r\n", Some(Frame::Array(vec![]))),
            (
                "*2\r\n$4\r\ninfo\r\n$12\r\ncommandstats\r\n",
                Some(Frame::Array(vec![
                    Frame::Bulk(b"info"),
                    Frame::Bulk(b"commandstats"),
                ])),
            ),
            ("*2\r\n$4\r\ninfo\r\n$12\r\ncommand", None),
        ] {
            let got = Frame::parse(input.as_bytes())
                .unwrap()
                .map(|(frame, _)| frame);
            assert_eq!(got, expected, "incorrect input: {input:?}");
        }
    }

    #[test]
    fn parse_reports_consumed_length() {
        let input = b"+OK\r\n:1\r\n";
        let (frame, consumed) = Frame::parse(input).unwrap().unwrap();
        assert_eq!(frame, Frame::Simple("OK"));
        assert_eq!(consumed, 5);

        let (frame, _) = Frame::parse(&input[consumed..]).unwrap().unwrap();
        assert_eq!(frame, Frame::Integer(1));
    }

    #[test]
    fn parse_invalid() {
        for input in [
            "!3\r\nabc\r\n",
            ":abc\r\n",
            "$3\r\nabcde\r\n",
            "$18446744073709551615\r\nabc",
        ] {
            assert!(
                Frame::parse(input.as_bytes()).is_err(),
                "input {input:?} should fail"
            );
        }
    }

    #[test]
    fn huge_array_header_waits_for_data() {
        // the length header is not trusted for preallocation
        assert_eq!(Frame::parse(b"*2305843009213693952\r\n").unwrap(), None);
        assert_eq!(
            Frame::parse(b"*18446744073709551615\r\n:1\r\n").unwrap(),
            None
        );
    }

    #[test]
    fn encode() {
        let mut buf = BytesMut::new();
        encode_command(&["info", "latencystats"], &mut buf);
        assert_eq!(&buf[..], b"*2\r\n$4\r\ninfo\r\n$12\r\nlatencystats\r\n");
    }

    #[test]
    fn reply_into_string() {
        assert_eq!(into_string(Frame::Bulk(b"a:b")).unwrap(), "a:b");
        assert_eq!(into_string(Frame::Null).unwrap(), "");
        assert!(matches!(
            into_string(Frame::Error("ERR oops")),
            Err(Error::Server(msg)) if msg == "ERR oops"
        ));
        assert!(matches!(
            into_string(Frame::Integer(1)),
            Err(Error::UnexpectedFrame)
        ));
    }
}

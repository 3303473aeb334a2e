//! RESP2 framing used between clients, peers and the daemon
//!
//! Requests are arrays of bulk strings (`GET <group> <key>`); replies are bulk
//! strings carrying raw value bytes, or error frames.

use bytes::{Buf, BufMut, BytesMut};

/// Largest bulk string accepted from the wire (512 MB)
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Largest array accepted from the wire
const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// One RESP2 value
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `+OK\r\n`
    Simple(String),
    /// `-ERR message\r\n`
    Error(String),
    /// `:42\r\n`
    Integer(i64),
    /// `$3\r\nfoo\r\n`, or `$-1\r\n` for null
    Bulk(Option<Vec<u8>>),
    /// `*2\r\n...`, or `*-1\r\n` for null
    Array(Option<Vec<Frame>>),
}

impl Frame {
    /// Request frame made of bulk strings
    pub fn command<I, A>(args: I) -> Frame
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        Frame::Array(Some(
            args.into_iter()
                .map(|arg| Frame::Bulk(Some(arg.as_ref().to_vec())))
                .collect(),
        ))
    }

    /// Error frame with a RESP error prefix such as `ERR` or `NOTFOUND`
    pub fn error(prefix: &str, msg: impl std::fmt::Display) -> Frame {
        Frame::Error(format!("{prefix} {msg}"))
    }

    /// Append the wire encoding to `dst`
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => put_line(dst, b'+', s.as_bytes()),
            Frame::Error(e) => put_line(dst, b'-', e.as_bytes()),
            Frame::Integer(n) => put_line(dst, b':', n.to_string().as_bytes()),
            Frame::Bulk(None) => dst.put_slice(b"$-1\r\n"),
            Frame::Bulk(Some(data)) => {
                put_line(dst, b'$', data.len().to_string().as_bytes());
                dst.put_slice(data);
                dst.put_slice(b"\r\n");
            }
            Frame::Array(None) => dst.put_slice(b"*-1\r\n"),
            Frame::Array(Some(items)) => {
                put_line(dst, b'*', items.len().to_string().as_bytes());
                for item in items {
                    item.encode(dst);
                }
            }
        }
    }

    /// Wire encoding as a fresh buffer
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf
    }

    /// Take one complete frame off the front of `src`.
    ///
    /// Returns `Ok(None)` and leaves `src` untouched when more bytes are
    /// needed.
    pub fn parse(src: &mut BytesMut) -> Result<Option<Frame>, String> {
        let mut pos = 0;
        match read_frame(src, &mut pos)? {
            Some(frame) => {
                src.advance(pos);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    /// Bulk payload, if this is a non-null bulk string
    pub fn into_bulk(self) -> Option<Vec<u8>> {
        match self {
            Frame::Bulk(Some(data)) => Some(data),
            _ => None,
        }
    }
}

fn put_line(dst: &mut BytesMut, tag: u8, body: &[u8]) {
    dst.put_u8(tag);
    dst.put_slice(body);
    dst.put_slice(b"\r\n");
}

fn read_frame(buf: &[u8], pos: &mut usize) -> Result<Option<Frame>, String> {
    let Some(&tag) = buf.get(*pos) else {
        return Ok(None);
    };
    *pos += 1;

    let Some(line) = read_line(buf, pos) else {
        return Ok(None);
    };

    match tag {
        b'+' => Ok(Some(Frame::Simple(utf8(line)?))),
        b'-' => Ok(Some(Frame::Error(utf8(line)?))),
        b':' => Ok(Some(Frame::Integer(number(line)?))),
        b'$' => {
            let Some(len) = length(line, MAX_BULK_LEN, "bulk string")? else {
                return Ok(Some(Frame::Bulk(None)));
            };
            if buf.len() < *pos + len + 2 {
                return Ok(None);
            }
            let data = buf[*pos..*pos + len].to_vec();
            if &buf[*pos + len..*pos + len + 2] != b"\r\n" {
                return Err("bulk string not terminated by CRLF".to_string());
            }
            *pos += len + 2;
            Ok(Some(Frame::Bulk(Some(data))))
        }
        b'*' => {
            let Some(len) = length(line, MAX_ARRAY_LEN, "array")? else {
                return Ok(Some(Frame::Array(None)));
            };
            let mut items = Vec::with_capacity(len.min(64));
            for _ in 0..len {
                match read_frame(buf, pos)? {
                    Some(item) => items.push(item),
                    None => return Ok(None),
                }
            }
            Ok(Some(Frame::Array(Some(items))))
        }
        other => Err(format!("unknown frame type byte {:?}", other as char)),
    }
}

/// Line body up to CRLF, advancing past the terminator
fn read_line<'a>(buf: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
    let rest = &buf[*pos..];
    let end = rest.windows(2).position(|w| w == b"\r\n")?;
    *pos += end + 2;
    Some(&rest[..end])
}

fn utf8(line: &[u8]) -> Result<String, String> {
    String::from_utf8(line.to_vec()).map_err(|e| e.to_string())
}

fn number(line: &[u8]) -> Result<i64, String> {
    std::str::from_utf8(line)
        .map_err(|e| e.to_string())?
        .parse()
        .map_err(|e: std::num::ParseIntError| e.to_string())
}

/// Declared length of a bulk string or array; `None` for the null form
fn length(line: &[u8], max: usize, what: &str) -> Result<Option<usize>, String> {
    match number(line)? {
        -1 => Ok(None),
        n if n < 0 => Err(format!("invalid {what} length {n}")),
        n if n as usize > max => Err(format!("{what} too large: {n} (max {max})")),
        n => Ok(Some(n as usize)),
    }
}

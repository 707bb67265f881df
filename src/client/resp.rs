//! Reply encoding and decoding for the store's wire protocol (RESP2).
//!
//! Requests are arrays of bulk strings. Replies are one of five typed
//! values, possibly nested inside arrays.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, ZdbError};

/// Largest bulk string or array accepted from the store (512 MiB).
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Deepest array nesting accepted in one reply. Scan pages use three levels.
pub const MAX_NESTING: usize = 32;

/// A decoded reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Nil,
    Status(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Array(Vec<Reply>),
}

impl Reply {
    /// Attempts to decode one reply from a byte buffer.
    ///
    /// Returns `Ok(None)` if more bytes are needed. On success the consumed
    /// bytes are removed from the buffer.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>> {
        match parse(buf.as_ref(), 0)? {
            Some((reply, consumed)) => {
                buf.advance(consumed);
                Ok(Some(reply))
            }
            None => Ok(None),
        }
    }

    /// Short type name used in protocol error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Nil => "nil",
            Reply::Status(_) => "status",
            Reply::Error(_) => "error",
            Reply::Integer(_) => "integer",
            Reply::Bulk(_) => "bulk string",
            Reply::Array(_) => "array",
        }
    }

    /// Interpret the reply as a byte string (bulk or status).
    pub fn into_bytes(self) -> Result<Bytes> {
        match self {
            Reply::Bulk(b) => Ok(b),
            Reply::Status(s) => Ok(Bytes::from(s)),
            other => Err(ZdbError::Protocol(format!(
                "expected a string reply, but a {} was returned",
                other.kind()
            ))),
        }
    }

    /// Interpret the reply as a byte string, mapping nil to `None`.
    pub fn into_optional_bytes(self) -> Result<Option<Bytes>> {
        match self {
            Reply::Nil => Ok(None),
            other => other.into_bytes().map(Some),
        }
    }

    /// Interpret the reply as UTF-8 text.
    pub fn into_text(self) -> Result<String> {
        let raw = self.into_bytes()?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| ZdbError::Protocol("expected UTF-8 text reply".into()))
    }

    pub fn into_integer(self) -> Result<i64> {
        match self {
            Reply::Integer(n) => Ok(n),
            other => Err(ZdbError::Protocol(format!(
                "expected an integer reply, but a {} was returned",
                other.kind()
            ))),
        }
    }

    pub fn into_array(self) -> Result<Vec<Reply>> {
        match self {
            Reply::Array(items) => Ok(items),
            other => Err(ZdbError::Protocol(format!(
                "expected an array reply, but a {} was returned",
                other.kind()
            ))),
        }
    }

    /// Appends this reply in wire form. Used by in-process stores and tests.
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Reply::Nil => buf.put_slice(b"$-1\r\n"),
            Reply::Status(s) => put_line(buf, b'+', s.as_bytes()),
            Reply::Error(s) => put_line(buf, b'-', s.as_bytes()),
            Reply::Integer(n) => put_line(buf, b':', n.to_string().as_bytes()),
            Reply::Bulk(b) => put_bulk(buf, b),
            Reply::Array(items) => {
                put_line(buf, b'*', items.len().to_string().as_bytes());
                for item in items {
                    item.encode(buf);
                }
            }
        }
    }
}

/// Encodes a command and its arguments as an array of bulk strings.
pub fn encode_command(buf: &mut BytesMut, command: &str, args: &[&[u8]]) {
    put_line(buf, b'*', (args.len() + 1).to_string().as_bytes());
    put_bulk(buf, command.as_bytes());
    for arg in args {
        put_bulk(buf, arg);
    }
}

fn put_line(buf: &mut BytesMut, tag: u8, body: &[u8]) {
    buf.put_u8(tag);
    buf.put_slice(body);
    buf.put_slice(b"\r\n");
}

fn put_bulk(buf: &mut BytesMut, data: &[u8]) {
    put_line(buf, b'$', data.len().to_string().as_bytes());
    buf.put_slice(data);
    buf.put_slice(b"\r\n");
}

fn find_crlf(src: &[u8]) -> Option<usize> {
    src.windows(2).position(|w| w == b"\r\n")
}

fn parse_int(line: &[u8]) -> Result<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            ZdbError::Protocol(format!(
                "invalid integer in reply: {:?}",
                String::from_utf8_lossy(line)
            ))
        })
}

fn check_len(len: i64) -> Result<()> {
    if len > MAX_BULK_LEN {
        return Err(ZdbError::Protocol(format!(
            "reply length {} exceeds maximum {}",
            len, MAX_BULK_LEN
        )));
    }
    if len < -1 {
        return Err(ZdbError::Protocol(format!("invalid reply length {}", len)));
    }
    Ok(())
}

/// Parses one reply from the front of `src`, returning it with the number
/// of bytes it spans. `depth` counts the arrays enclosing this reply.
fn parse(src: &[u8], depth: usize) -> Result<Option<(Reply, usize)>> {
    let Some(line_end) = find_crlf(src) else {
        return Ok(None);
    };
    if line_end == 0 {
        return Err(ZdbError::Protocol("empty reply line".into()));
    }

    let tag = src[0];
    let line = &src[1..line_end];
    let mut pos = line_end + 2;

    let reply = match tag {
        b'+' => Reply::Status(String::from_utf8_lossy(line).into_owned()),
        b'-' => Reply::Error(String::from_utf8_lossy(line).into_owned()),
        b':' => Reply::Integer(parse_int(line)?),
        b'$' => {
            let len = parse_int(line)?;
            check_len(len)?;
            if len == -1 {
                Reply::Nil
            } else {
                let len = len as usize;
                if src.len() < pos + len + 2 {
                    return Ok(None);
                }
                if &src[pos + len..pos + len + 2] != b"\r\n" {
                    return Err(ZdbError::Protocol("bulk string not terminated".into()));
                }
                let data = Bytes::copy_from_slice(&src[pos..pos + len]);
                pos += len + 2;
                Reply::Bulk(data)
            }
        }
        b'*' => {
            let len = parse_int(line)?;
            check_len(len)?;
            if len == -1 {
                Reply::Nil
            } else {
                if depth >= MAX_NESTING {
                    return Err(ZdbError::Protocol(format!(
                        "reply nested deeper than {} arrays",
                        MAX_NESTING
                    )));
                }
                let mut items = Vec::with_capacity(len.min(1024) as usize);
                for _ in 0..len {
                    match parse(&src[pos..], depth + 1)? {
                        Some((item, used)) => {
                            items.push(item);
                            pos += used;
                        }
                        None => return Ok(None),
                    }
                }
                Reply::Array(items)
            }
        }
        other => {
            return Err(ZdbError::Protocol(format!(
                "unknown reply type byte 0x{:02x}",
                other
            )))
        }
    };

    Ok(Some((reply, pos)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(raw: &[u8]) -> Reply {
        let mut buf = BytesMut::from(raw);
        let reply = Reply::decode(&mut buf).unwrap().unwrap();
        assert!(buf.is_empty());
        reply
    }

    #[test]
    fn test_encode_command() {
        let mut buf = BytesMut::new();
        encode_command(&mut buf, "SET", &[b"key", b"value"]);
        assert_eq!(
            &buf[..],
            b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n"
        );
    }

    #[test]
    fn test_decode_scalars() {
        assert_eq!(decode_all(b"+PONG\r\n"), Reply::Status("PONG".into()));
        assert_eq!(decode_all(b"-No more data\r\n"), Reply::Error("No more data".into()));
        assert_eq!(decode_all(b":42\r\n"), Reply::Integer(42));
        assert_eq!(decode_all(b"$-1\r\n"), Reply::Nil);
        assert_eq!(decode_all(b"$0\r\n\r\n"), Reply::Bulk(Bytes::new()));
    }

    #[test]
    fn test_decode_nested_scan_reply() {
        let raw = b"*2\r\n$3\r\ncur\r\n*1\r\n*3\r\n$1\r\na\r\n:1\r\n:1700000000\r\n";
        let reply = decode_all(raw);
        assert_eq!(
            reply,
            Reply::Array(vec![
                Reply::Bulk(Bytes::from_static(b"cur")),
                Reply::Array(vec![Reply::Array(vec![
                    Reply::Bulk(Bytes::from_static(b"a")),
                    Reply::Integer(1),
                    Reply::Integer(1_700_000_000),
                ])]),
            ])
        );
    }

    #[test]
    fn test_incomplete_reply_keeps_buffer() {
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nabc\r\n$4\r\nde"[..]);
        assert!(Reply::decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 19);

        buf.extend_from_slice(b"fg\r\n");
        let reply = Reply::decode(&mut buf).unwrap().unwrap();
        assert_eq!(reply.into_array().unwrap().len(), 2);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_binary_bulk_with_crlf_inside() {
        let reply = decode_all(b"$4\r\n\r\n\r\n\r\n");
        assert_eq!(reply, Reply::Bulk(Bytes::from_static(b"\r\n\r\n")));
    }

    #[test]
    fn test_unknown_type_byte() {
        let mut buf = BytesMut::from(&b"?oops\r\n"[..]);
        assert!(matches!(Reply::decode(&mut buf), Err(ZdbError::Protocol(_))));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let mut raw = b"*1\r\n".repeat(200_000);
        raw.extend_from_slice(b":1\r\n");
        let mut buf = BytesMut::from(&raw[..]);
        assert!(matches!(Reply::decode(&mut buf), Err(ZdbError::Protocol(_))));
    }

    #[test]
    fn test_nesting_up_to_limit() {
        let mut raw = b"*1\r\n".repeat(MAX_NESTING);
        raw.extend_from_slice(b":1\r\n");
        let mut reply = decode_all(&raw);
        for _ in 0..MAX_NESTING {
            reply = reply.into_array().unwrap().remove(0);
        }
        assert_eq!(reply, Reply::Integer(1));
    }

    #[test]
    fn test_encode_decode_reply() {
        let reply = Reply::Array(vec![Reply::Nil, Reply::Integer(-7), Reply::Status("OK".into())]);
        let mut buf = BytesMut::new();
        reply.encode(&mut buf);
        assert_eq!(Reply::decode(&mut buf).unwrap(), Some(reply));
    }

    #[test]
    fn test_typed_accessors() {
        assert!(Reply::Integer(1).into_bytes().is_err());
        assert_eq!(Reply::Nil.into_optional_bytes().unwrap(), None);
        assert_eq!(Reply::Status("x".into()).into_text().unwrap(), "x");
        assert!(matches!(
            Reply::Bulk(Bytes::new()).into_integer(),
            Err(ZdbError::Protocol(_))
        ));
    }
}

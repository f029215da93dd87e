//! RESP (REdis Serialization Protocol) encode/decode.
//!
//! Kept as a small, self-contained module rather than a separate crate;
//! the rest of the core talks to it only through [`encode_command`] and
//! [`Decoder::try_decode`].
//!
//! See: <https://redis.io/docs/latest/develop/reference/protocol-spec/>
use crate::error::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;

const DEFAULT_READ_BUFFER: usize = 16 * 1024;

/// A single decoded RESP value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    SimpleString(String),
    SimpleError(String),
    Integer(i64),
    BulkString(Bytes),
    Array(Vec<Value>),
    NullBulkString,
    NullArray,
}

impl Value {
    /// `true` iff this value is a top-level server error (`-ERR ...`).
    pub fn is_error(&self) -> bool {
        matches!(self, Value::SimpleError(_))
    }

    /// Extracts the error message if this value is a `SimpleError`.
    pub fn as_error(&self) -> Option<&str> {
        match self {
            Value::SimpleError(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Encode a single command, given as an ordered list of argument bytes, as a
/// RESP array of bulk strings (the "multi bulk" request form every Redis
/// client uses regardless of which command is being sent).
pub fn encode_command(args: &[Bytes], out: &mut BytesMut) {
    out.put_u8(b'*');
    write_decimal(out, args.len() as i64);
    for arg in args {
        out.put_u8(b'$');
        write_decimal(out, arg.len() as i64);
        out.put_slice(arg);
        out.put_slice(b"\r\n");
    }
}

fn write_decimal(out: &mut BytesMut, val: i64) {
    out.put_slice(val.to_string().as_bytes());
    out.put_slice(b"\r\n");
}

/// Incremental RESP decoder fed raw bytes off the socket.
///
/// Mirrors the buffer-and-retry strategy of a buffered frame reader: bytes
/// accumulate in an internal buffer, and [`Decoder::feed`] is called after
/// every successful socket read to drain as many complete values as are
/// available.
#[derive(Debug, Default)]
pub struct Decoder {
    buffer: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Decoder {
            buffer: BytesMut::with_capacity(DEFAULT_READ_BUFFER),
        }
    }

    /// Append freshly read bytes to the internal buffer.
    pub fn ingest(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Try to decode the next complete value out of the buffer.
    ///
    /// Returns `Ok(None)` if the buffer does not yet hold a complete value;
    /// the caller should read more bytes and call again.
    pub fn try_decode(&mut self) -> Result<Option<Value>> {
        let mut cursor = Cursor::new(&self.buffer[..]);
        match check(&mut cursor) {
            Ok(()) => {
                let len = cursor.position() as usize;
                let mut cursor = Cursor::new(&self.buffer[..]);
                let value = parse(&mut cursor)?;
                self.buffer.advance(len);
                Ok(Some(value))
            }
            Err(Error::IncompleteFrame) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Validate that a complete value starts at the cursor, without allocating,
/// advancing the cursor past it on success.
fn check(src: &mut Cursor<&[u8]>) -> Result<()> {
    match get_u8(src)? {
        b'+' | b'-' => {
            get_line(src)?;
            Ok(())
        }
        b':' => {
            get_decimal(src)?;
            Ok(())
        }
        b'$' => {
            if peek_u8(src)? == b'-' {
                skip(src, 4) // "-1\r\n"
            } else {
                let len: usize = get_decimal(src)?.try_into()?;
                skip(src, len + 2)
            }
        }
        b'*' => {
            let len = get_decimal(src)?;
            if len == -1 {
                return Ok(());
            }
            for _ in 0..len {
                check(src)?;
            }
            Ok(())
        }
        actual => Err(Error::Protocol(format!("invalid frame byte `{actual}`"))),
    }
}

fn parse(src: &mut Cursor<&[u8]>) -> Result<Value> {
    match get_u8(src)? {
        b'+' => Ok(Value::SimpleString(read_line_string(src)?)),
        b'-' => Ok(Value::SimpleError(read_line_string(src)?)),
        b':' => Ok(Value::Integer(get_decimal(src)?)),
        b'$' => {
            if peek_u8(src)? == b'-' {
                let line = get_line(src)?;
                if line != b"-1" {
                    return Err(Error::Protocol(format!(
                        "invalid bulk string length `{line:?}`"
                    )));
                }
                Ok(Value::NullBulkString)
            } else {
                let len: usize = get_decimal(src)?.try_into()?;
                let n = len + 2;
                if src.remaining() < n {
                    return Err(Error::IncompleteFrame);
                }
                let data = Bytes::copy_from_slice(&src.chunk()[..len]);
                skip(src, n)?;
                Ok(Value::BulkString(data))
            }
        }
        b'*' => {
            let len = get_decimal(src)?;
            if len == -1 {
                return Ok(Value::NullArray);
            }
            let len: usize = len.try_into()?;
            let mut out = Vec::with_capacity(len);
            for _ in 0..len {
                out.push(parse(src)?);
            }
            Ok(Value::Array(out))
        }
        first => Err(Error::Protocol(format!(
            "first byte was not a valid RESP type `{first}`"
        ))),
    }
}

fn read_line_string(src: &mut Cursor<&[u8]>) -> Result<String> {
    Ok(String::from_utf8(get_line(src)?.to_vec())?)
}

fn get_u8(src: &mut Cursor<&[u8]>) -> Result<u8> {
    if !src.has_remaining() {
        return Err(Error::IncompleteFrame);
    }
    Ok(src.get_u8())
}

fn peek_u8(src: &mut Cursor<&[u8]>) -> Result<u8> {
    if !src.has_remaining() {
        return Err(Error::IncompleteFrame);
    }
    Ok(src.chunk()[0])
}

fn skip(src: &mut Cursor<&[u8]>, n: usize) -> Result<()> {
    if src.remaining() < n {
        return Err(Error::IncompleteFrame);
    }
    src.advance(n);
    Ok(())
}

fn get_decimal(src: &mut Cursor<&[u8]>) -> Result<i64> {
    use atoi::atoi;
    let line = get_line(src)?;
    atoi(line).ok_or_else(|| Error::Protocol("invalid integer".into()))
}

fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8]> {
    let start = src.position() as usize;
    let buf = src.get_ref();
    if buf.len() < 2 {
        return Err(Error::IncompleteFrame);
    }
    let end = buf.len() - 1;
    for i in start..end {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            src.set_position((i + 2) as u64);
            return Ok(&buf[start..i]);
        }
    }
    Err(Error::IncompleteFrame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_each_reply_type() {
        let mut dec = Decoder::new();
        dec.ingest(b"+OK\r\n");
        assert_eq!(
            dec.try_decode().unwrap(),
            Some(Value::SimpleString("OK".into()))
        );

        dec.ingest(b"-ERR bad thing\r\n");
        assert_eq!(
            dec.try_decode().unwrap(),
            Some(Value::SimpleError("ERR bad thing".into()))
        );

        dec.ingest(b":42\r\n");
        assert_eq!(dec.try_decode().unwrap(), Some(Value::Integer(42)));

        dec.ingest(b"$-1\r\n");
        assert_eq!(dec.try_decode().unwrap(), Some(Value::NullBulkString));

        dec.ingest(b"$5\r\nhello\r\n");
        assert_eq!(
            dec.try_decode().unwrap(),
            Some(Value::BulkString(Bytes::from("hello")))
        );
    }

    #[test]
    fn waits_for_more_bytes_on_partial_input() {
        let mut dec = Decoder::new();
        dec.ingest(b"$5\r\nhel");
        assert_eq!(dec.try_decode().unwrap(), None);
        dec.ingest(b"lo\r\n");
        assert_eq!(
            dec.try_decode().unwrap(),
            Some(Value::BulkString(Bytes::from("hello")))
        );
    }

    #[test]
    fn decodes_nested_arrays() {
        let mut dec = Decoder::new();
        dec.ingest(b"*2\r\n*2\r\n+OK\r\n$6\r\nfoobar\r\n$3\r\nbaz\r\n");
        assert_eq!(
            dec.try_decode().unwrap(),
            Some(Value::Array(vec![
                Value::Array(vec![
                    Value::SimpleString("OK".into()),
                    Value::BulkString(Bytes::from("foobar")),
                ]),
                Value::BulkString(Bytes::from("baz")),
            ]))
        );
    }

    #[test]
    fn decodes_multiple_values_back_to_back() {
        let mut dec = Decoder::new();
        dec.ingest(b"+PONG\r\n+PONG\r\n");
        assert_eq!(
            dec.try_decode().unwrap(),
            Some(Value::SimpleString("PONG".into()))
        );
        assert_eq!(
            dec.try_decode().unwrap(),
            Some(Value::SimpleString("PONG".into()))
        );
        assert_eq!(dec.try_decode().unwrap(), None);
    }

    #[test]
    fn encodes_a_command_as_a_multi_bulk_array() {
        let mut out = BytesMut::new();
        encode_command(
            &[Bytes::from("SET"), Bytes::from("k"), Bytes::from("v")],
            &mut out,
        );
        assert_eq!(&out[..], b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n");
    }
}

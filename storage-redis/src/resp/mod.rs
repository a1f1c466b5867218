use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use shared::{Error, Result};

// Reply type markers
const SIMPLE: u8 = b'+';
const ERROR: u8 = b'-';
const INTEGER: u8 = b':';
const BULK: u8 = b'$';
const ARRAY: u8 = b'*';

// Upper bounds on a single reply; anything larger is a protocol violation
const MAX_BULK_LEN: usize = 64 * 1024 * 1024;
const MAX_LINE_LEN: usize = 64 * 1024;

/// One reply from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Simple(String),
    Error(String),
    Int(i64),
    Bulk(Bytes),
    Nil,
    Array(Vec<Value>),
}

impl Value {
    /// Coerce to text: bulk and status replies directly, integers via
    /// their decimal form, absent values to `""`.
    pub fn into_string(self) -> Result<String> {
        match self {
            Value::Simple(text) => Ok(text),
            Value::Int(n) => Ok(n.to_string()),
            Value::Bulk(data) => String::from_utf8(data.to_vec())
                .map_err(|_| Error::Backend("reply is not valid utf-8".to_string())),
            Value::Nil => Ok(String::new()),
            other => Err(unexpected(&other, "string")),
        }
    }

    /// Coerce to an integer; absent values count as zero.
    pub fn into_i64(self) -> Result<i64> {
        match self {
            Value::Int(n) => Ok(n),
            Value::Bulk(data) => std::str::from_utf8(&data)
                .ok()
                .and_then(|text| text.parse::<i64>().ok())
                .ok_or_else(|| Error::Backend("reply is not an integer".to_string())),
            Value::Nil => Ok(0),
            other => Err(unexpected(&other, "integer")),
        }
    }

    /// The raw payload of a bulk reply, or `None` for an absent key.
    pub fn into_bulk(self) -> Result<Option<Bytes>> {
        match self {
            Value::Bulk(data) => Ok(Some(data)),
            Value::Nil => Ok(None),
            other => Err(unexpected(&other, "bulk")),
        }
    }

    pub fn into_array(self) -> Result<Vec<Value>> {
        match self {
            Value::Array(items) => Ok(items),
            Value::Nil => Ok(Vec::new()),
            other => Err(unexpected(&other, "array")),
        }
    }

    /// Integer replies used as flags (SETNX, HSETNX).
    pub fn into_bool(self) -> Result<bool> {
        Ok(self.into_i64()? != 0)
    }
}

fn unexpected(value: &Value, wanted: &str) -> Error {
    Error::Backend(format!("unexpected reply type, wanted {wanted}: {value:?}"))
}

/// A client command: the command name plus its arguments, sent as an
/// array of bulk strings.
#[derive(Debug, Clone)]
pub struct Command {
    name: &'static str,
    parts: Vec<Bytes>,
}

impl Command {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            parts: vec![Bytes::from_static(name.as_bytes())],
        }
    }

    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.parts.push(Bytes::copy_from_slice(arg.as_ref()));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Codec for the server's reply protocol. Frames are self-describing:
/// a type marker, a CRLF-terminated header line, and for bulk/array
/// replies a counted payload, so the decoder parses instead of reading a
/// length prefix.
#[derive(Debug, Default)]
pub struct RespCodec;

impl Decoder for RespCodec {
    type Item = Value;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Value>> {
        match parse(src.as_ref())? {
            Some((value, consumed)) => {
                src.advance(consumed);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Command> for RespCodec {
    type Error = Error;

    fn encode(&mut self, cmd: Command, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(ARRAY);
        dst.put_slice(cmd.parts.len().to_string().as_bytes());
        dst.put_slice(b"\r\n");
        for part in &cmd.parts {
            dst.put_u8(BULK);
            dst.put_slice(part.len().to_string().as_bytes());
            dst.put_slice(b"\r\n");
            dst.put_slice(part);
            dst.put_slice(b"\r\n");
        }
        Ok(())
    }
}

// The server half of the wire format, used by in-process test doubles.
impl Encoder<Value> for RespCodec {
    type Error = Error;

    fn encode(&mut self, value: Value, dst: &mut BytesMut) -> Result<()> {
        write_value(&value, dst);
        Ok(())
    }
}

fn write_value(value: &Value, dst: &mut BytesMut) {
    match value {
        Value::Simple(text) => {
            dst.put_u8(SIMPLE);
            dst.put_slice(text.as_bytes());
            dst.put_slice(b"\r\n");
        }
        Value::Error(msg) => {
            dst.put_u8(ERROR);
            dst.put_slice(msg.as_bytes());
            dst.put_slice(b"\r\n");
        }
        Value::Int(n) => {
            dst.put_u8(INTEGER);
            dst.put_slice(n.to_string().as_bytes());
            dst.put_slice(b"\r\n");
        }
        Value::Bulk(data) => {
            dst.put_u8(BULK);
            dst.put_slice(data.len().to_string().as_bytes());
            dst.put_slice(b"\r\n");
            dst.put_slice(data);
            dst.put_slice(b"\r\n");
        }
        Value::Nil => {
            dst.put_slice(b"$-1\r\n");
        }
        Value::Array(items) => {
            dst.put_u8(ARRAY);
            dst.put_slice(items.len().to_string().as_bytes());
            dst.put_slice(b"\r\n");
            for item in items {
                write_value(item, dst);
            }
        }
    }
}

/// Parse one complete value from the front of `input`, returning it with
/// the number of bytes it occupied, or `None` while the frame is still
/// incomplete.
fn parse(input: &[u8]) -> Result<Option<(Value, usize)>> {
    let Some((line, mut consumed)) = read_line(input)? else {
        return Ok(None);
    };
    if line.is_empty() {
        return Err(protocol("empty reply line"));
    }
    let (marker, header) = (line[0], &line[1..]);
    match marker {
        SIMPLE => Ok(Some((Value::Simple(text(header)?), consumed))),
        ERROR => Ok(Some((Value::Error(text(header)?), consumed))),
        INTEGER => Ok(Some((Value::Int(int(header)?), consumed))),
        BULK => {
            let len = int(header)?;
            if len < 0 {
                return Ok(Some((Value::Nil, consumed)));
            }
            let len = len as usize;
            if len > MAX_BULK_LEN {
                return Err(protocol("bulk reply too large"));
            }
            if input.len() < consumed + len + 2 {
                return Ok(None);
            }
            if &input[consumed + len..consumed + len + 2] != b"\r\n" {
                return Err(protocol("bulk reply missing terminator"));
            }
            let data = Bytes::copy_from_slice(&input[consumed..consumed + len]);
            Ok(Some((Value::Bulk(data), consumed + len + 2)))
        }
        ARRAY => {
            let len = int(header)?;
            if len < 0 {
                return Ok(Some((Value::Nil, consumed)));
            }
            let mut items = Vec::with_capacity(len as usize);
            for _ in 0..len {
                match parse(&input[consumed..])? {
                    Some((item, used)) => {
                        items.push(item);
                        consumed += used;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((Value::Array(items), consumed)))
        }
        other => Err(protocol(&format!("unknown reply marker 0x{other:02X}"))),
    }
}

fn read_line(input: &[u8]) -> Result<Option<(&[u8], usize)>> {
    match input.windows(2).position(|window| window == b"\r\n") {
        Some(pos) => Ok(Some((&input[..pos], pos + 2))),
        None if input.len() > MAX_LINE_LEN => Err(protocol("reply line too long")),
        None => Ok(None),
    }
}

fn text(raw: &[u8]) -> Result<String> {
    String::from_utf8(raw.to_vec()).map_err(|_| protocol("reply line is not valid utf-8"))
}

fn int(raw: &[u8]) -> Result<i64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|text| text.parse::<i64>().ok())
        .ok_or_else(|| protocol("malformed integer in reply"))
}

fn protocol(msg: &str) -> Error {
    Error::Backend(format!("protocol: {msg}"))
}

//! Request body kinds and their self-describing byte encoding
//!
//! Layout of an [`EncodedBody`]:
//!
//! ```text
//! empty input      -> Empty
//! [0]              -> Empty
//! [1] count:u32be  (key_len:u32be key value_len:u32be value){count} -> Form
//! [2] bytes...     -> Bytes
//! ```
//!
//! Streams are drained when encoded and come back as `Bytes`.

use std::fmt;
use std::io;

use futures::stream::{BoxStream, Stream, StreamExt};
use pelagic_domain::{EncodedBody, PelagicError, Result};
use serde_json::Value;

const TAG_EMPTY: u8 = 0;
const TAG_FORM: u8 = 1;
const TAG_BYTES: u8 = 2;

/// Chunked body source, drained when the request is encoded.
pub type ByteStream = BoxStream<'static, io::Result<Vec<u8>>>;

/// Body of an outgoing request.
pub enum RequestBody {
    /// No body.
    Empty,
    /// Ordered key/value pairs sent as `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
    /// Raw bytes sent as-is.
    Bytes(Vec<u8>),
    /// Drained into bytes on encoding; the stream itself is never stored.
    Stream(ByteStream),
}

impl RequestBody {
    /// Form body from ordered pairs.
    pub fn form<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Form(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Body read from a stream of chunks.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Vec<u8>>> + Send + 'static,
    {
        Self::Stream(stream.boxed())
    }

    /// Build a body from a loosely-typed JSON value.
    ///
    /// `null` is empty, a string is raw bytes and a flat object of scalars
    /// is a form. Nested objects and arrays have no body representation.
    ///
    /// # Errors
    ///
    /// Returns `PelagicError::UnsupportedBodyKind` for any other shape.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::Empty),
            Value::String(text) => Ok(Self::Bytes(text.clone().into_bytes())),
            Value::Object(map) => map
                .iter()
                .map(|(key, value)| form_scalar(value).map(|value| (key.clone(), value)))
                .collect::<Result<Vec<_>>>()
                .map(Self::Form),
            other => Err(PelagicError::UnsupportedBodyKind(format!(
                "{} cannot be sent as a request body",
                json_kind(other)
            ))),
        }
    }

    /// `Content-Type` header value for this body, if it implies one.
    pub const fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Empty => None,
            Self::Form(_) => Some("application/x-www-form-urlencoded"),
            Self::Bytes(_) | Self::Stream(_) => Some("application/octet-stream"),
        }
    }

    /// Encode into the durable representation, draining streams.
    ///
    /// # Errors
    ///
    /// Returns `PelagicError::InvalidInput` if a stream yields an error or a
    /// form entry is too large to length-prefix.
    pub async fn encode(self) -> Result<EncodedBody> {
        let bytes = match self {
            Self::Empty => vec![TAG_EMPTY],
            Self::Form(pairs) => encode_form(&pairs)?,
            Self::Bytes(bytes) => tagged_bytes(&bytes),
            Self::Stream(mut stream) => {
                let mut buffer = vec![TAG_BYTES];
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|e| {
                        PelagicError::InvalidInput(format!("failed to read body stream: {e}"))
                    })?;
                    buffer.extend_from_slice(&chunk);
                }
                buffer
            }
        };

        Ok(EncodedBody::from_bytes(bytes))
    }

    /// Decode a durable body. Never yields `Stream`.
    ///
    /// # Errors
    ///
    /// Returns `PelagicError::UnsupportedBodyKind` for an unknown tag or a
    /// malformed layout.
    pub fn decode(encoded: &EncodedBody) -> Result<Self> {
        let Some((&tag, rest)) = encoded.as_bytes().split_first() else {
            return Ok(Self::Empty);
        };

        match tag {
            TAG_EMPTY if rest.is_empty() => Ok(Self::Empty),
            TAG_EMPTY => Err(malformed("empty body carries trailing bytes")),
            TAG_FORM => decode_form(rest).map(Self::Form),
            TAG_BYTES => Ok(Self::Bytes(rest.to_vec())),
            other => Err(PelagicError::UnsupportedBodyKind(format!("unknown body tag {other}"))),
        }
    }

    /// Wire bytes for the transport. `None` for an empty body.
    ///
    /// Streams have no buffered form; encode them first.
    pub fn to_wire(&self) -> Option<Vec<u8>> {
        match self {
            Self::Empty | Self::Stream(_) => None,
            Self::Form(pairs) => Some(
                url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs)
                    .finish()
                    .into_bytes(),
            ),
            Self::Bytes(bytes) => Some(bytes.clone()),
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Form(pairs) => {
                f.debug_list().entries(pairs.iter().map(|(key, _)| key)).finish()
            }
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl PartialEq for RequestBody {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Empty, Self::Empty) => true,
            (Self::Form(a), Self::Form(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

fn tagged_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(bytes.len() + 1);
    buffer.push(TAG_BYTES);
    buffer.extend_from_slice(bytes);
    buffer
}

fn encode_form(pairs: &[(String, String)]) -> Result<Vec<u8>> {
    let mut buffer = vec![TAG_FORM];
    push_len(&mut buffer, pairs.len())?;
    for (key, value) in pairs {
        push_len(&mut buffer, key.len())?;
        buffer.extend_from_slice(key.as_bytes());
        push_len(&mut buffer, value.len())?;
        buffer.extend_from_slice(value.as_bytes());
    }
    Ok(buffer)
}

fn push_len(buffer: &mut Vec<u8>, len: usize) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| PelagicError::InvalidInput("form entry too large to encode".into()))?;
    buffer.extend_from_slice(&len.to_be_bytes());
    Ok(())
}

fn decode_form(mut rest: &[u8]) -> Result<Vec<(String, String)>> {
    let count = take_len(&mut rest)?;
    let mut pairs = Vec::new();
    for _ in 0..count {
        let key = take_string(&mut rest)?;
        let value = take_string(&mut rest)?;
        pairs.push((key, value));
    }

    if !rest.is_empty() {
        return Err(malformed("form body carries trailing bytes"));
    }
    Ok(pairs)
}

fn take_len<'a>(rest: &mut &'a [u8]) -> Result<usize> {
    let current: &'a [u8] = *rest;
    let Some((prefix, tail)) = current.split_first_chunk::<4>() else {
        return Err(malformed("truncated length prefix"));
    };
    *rest = tail;
    usize::try_from(u32::from_be_bytes(*prefix)).map_err(|_| malformed("length overflow"))
}

fn take_string<'a>(rest: &mut &'a [u8]) -> Result<String> {
    let len = take_len(rest)?;
    let current: &'a [u8] = *rest;
    if current.len() < len {
        return Err(malformed("truncated form entry"));
    }
    let (bytes, tail) = current.split_at(len);
    *rest = tail;
    String::from_utf8(bytes.to_vec()).map_err(|_| malformed("form entry is not UTF-8"))
}

fn malformed(reason: &str) -> PelagicError {
    PelagicError::UnsupportedBodyKind(format!("malformed body: {reason}"))
}

fn form_scalar(value: &Value) -> Result<String> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Bool(flag) => Ok(flag.to_string()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(PelagicError::UnsupportedBodyKind(format!(
            "{} cannot be a form value",
            json_kind(other)
        ))),
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

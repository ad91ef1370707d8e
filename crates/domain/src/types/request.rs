//! Durable request model
//!
//! A [`Request`] is an address-free description of one pending call. It holds
//! the body already encoded, so it can be written to the request store
//! before anything reaches the wire and replayed after a restart.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{PelagicError, Result};

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl Method {
    /// Upper-case wire name, also used as the stored form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = PelagicError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(PelagicError::Decode(format!("unknown HTTP method: {other}"))),
        }
    }
}

/// Whether a request must run under an authenticated actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authentication {
    /// Sent as is, without an `Authorization` header.
    None,
    /// Sent under the current actor, authenticating first if there is none.
    Required,
}

impl Authentication {
    /// Lower-case stored form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Required => "required",
        }
    }
}

impl fmt::Display for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Authentication {
    type Err = PelagicError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "none" => Ok(Self::None),
            "required" => Ok(Self::Required),
            other => Err(PelagicError::Decode(format!("unknown authentication mode: {other}"))),
        }
    }
}

/// Self-describing byte encoding of a request body.
///
/// The first byte is the body kind discriminant; the layout of the rest
/// depends on it. Produced and interpreted by the body codec in
/// `pelagic-core`.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncodedBody(Vec<u8>);

impl EncodedBody {
    /// Wrap bytes produced by the body codec or read back from the store.
    pub const fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Encoded bytes, discriminant first.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Take the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Encoded length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True only for bytes that never came from an encoder.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for EncodedBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodedBody({} bytes)", self.0.len())
    }
}

/// Unit of durable work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Storage key, stable across restarts.
    pub id: Uuid,
    /// Whether a bearer token is attached when sending.
    pub authentication: Authentication,
    /// HTTP method.
    pub method: Method,
    /// Path relative to the server base URL, or an absolute URL (cursors).
    pub route: String,
    /// Extra headers replayed on every attempt. Never contains credentials.
    pub headers: Vec<(String, String)>,
    /// Body in persisted form.
    pub body: EncodedBody,
    /// Creation time; resume replays oldest first.
    pub created_at: DateTime<Utc>,
    /// Whether a record left behind by an earlier run is re-sent by resume.
    /// Single-shot requests are dropped instead.
    #[serde(default = "resumable_by_default")]
    pub resumable: bool,
}

const fn resumable_by_default() -> bool {
    true
}

impl Request {
    /// Create a request with a fresh time-ordered id.
    pub fn new(
        method: Method,
        route: impl Into<String>,
        authentication: Authentication,
        body: EncodedBody,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            authentication,
            method,
            route: route.into(),
            headers: Vec::new(),
            body,
            created_at: Utc::now(),
            resumable: true,
        }
    }

    /// Never replay this request after a restart.
    ///
    /// For calls whose payload is only valid once, such as an authorization
    /// code exchange.
    #[must_use]
    pub const fn single_shot(mut self) -> Self {
        self.resumable = false;
        self
    }

    /// Attach an extra header.
    ///
    /// `Authorization` is dropped: it is derived from the actor at send time
    /// and must never be persisted.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        if !name.eq_ignore_ascii_case("authorization") {
            self.headers.push((name, value.into()));
        }
        self
    }
}

/// Response handed back by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Response headers in arrival order, names as received.
    pub headers: Vec<(String, String)>,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl Response {
    /// Whether the status is in the 2xx range.
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// First value of the header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Deserialize the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns `PelagicError::Decode` if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| PelagicError::Decode(format!("invalid JSON response body: {e}")))
    }

    /// Body as UTF-8 text, lossily converted.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

//! Port interfaces for request execution
//!
//! These traits define the boundaries between the requester and the
//! storage and network implementations.

use async_trait::async_trait;
use pelagic_domain::{Method, PelagicError, Request, Response, Result};
use uuid::Uuid;

use super::body::RequestBody;

/// Durable set of requests that have not completed yet.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Insert or replace the record for `request.id`.
    async fn put(&self, request: &Request) -> Result<()>;

    /// Delete the record for `id`. Deleting a missing record is not an error.
    async fn remove(&self, id: Uuid) -> Result<()>;

    /// All stored records that can be read back, oldest first.
    ///
    /// A record that no longer decodes is left out rather than failing the
    /// whole read; see [`Self::unreadable`].
    async fn get_all(&self) -> Result<Vec<Request>>;

    /// Stored records that [`Self::get_all`] had to leave out.
    async fn unreadable(&self) -> Result<Vec<UnreadableRecord>> {
        Ok(Vec::new())
    }

    /// Delete every record, unreadable ones included.
    async fn clear(&self) -> Result<()>;
}

/// A stored record that could not be decoded into a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadableRecord {
    /// Raw stored key. Not necessarily a valid request id.
    pub key: String,
    /// Why decoding failed.
    pub error: PelagicError,
}

/// One attempt as handed to the network layer.
#[derive(Debug)]
pub struct TransportRequest {
    /// Method as persisted.
    pub method: Method,
    /// Path relative to the server base URL, or an absolute URL.
    pub route: String,
    /// Includes `Authorization` when the request runs under an actor.
    pub headers: Vec<(String, String)>,
    /// Decoded body, ready for the wire.
    pub body: RequestBody,
}

/// Performs a single HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request`. Any received response is `Ok`, whatever its status;
    /// `Err` means no response was obtained.
    async fn send(&self, request: TransportRequest) -> Result<Response>;
}

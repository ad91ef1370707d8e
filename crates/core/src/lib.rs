//! # Pelagic Core
//!
//! Request engine logic with no infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces (traits) for storage, transport and the approval surface
//! - Authentication: `Authenticator`, `CallbackAuthorizer`, `AuthenticationLock`
//! - The request body codec and the persisting, resumable `Requester`
//! - Link-header driven cursor pagination
//!
//! ## Architecture Principles
//! - Only depends on `pelagic-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits

pub mod auth;
pub mod pagination;
pub mod request;

// Re-export specific items to avoid ambiguity
pub use auth::ports::{ActorProvider, ApprovalSurface, Authorizer, TokenExchanger};
pub use auth::{
    AuthenticationLock, Authenticator, CallbackAuthorizer, ListenerId, OAuthTokenExchanger,
};
pub use pagination::{parse_link_header, PageLinks, Paginator};
pub use request::ports::{RequestStore, Transport, TransportRequest, UnreadableRecord};
pub use request::{ByteStream, RequestBody, Requester, ResumeReport};

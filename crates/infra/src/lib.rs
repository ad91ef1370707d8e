//! # Pelagic Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - SQLite/SQLCipher request store and actor provider
//! - reqwest-backed HTTP transport
//! - Loopback OAuth callback server and approval surface
//! - Configuration loading
//!
//! ## Architecture
//! - Implements traits defined in `pelagic-core`
//! - Contains all "impure" code (database, network, filesystem)

pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod http;

// Re-export commonly used items
pub use auth::{LoggingApprovalSurface, OAuthCallbackServer, PendingCallbackServer};
pub use database::{DbManager, SqliteActorProvider, SqliteRequestStore};
pub use errors::InfraError;
pub use http::{HttpClient, HttpClientBuilder, HttpTransport};

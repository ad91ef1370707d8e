//! # Pelagic Domain
//!
//! Data types shared by every layer of the request engine.
//!
//! This crate contains:
//! - Session identity (`Actor`, `AuthorizationGrant`)
//! - The durable request model (`Request`, `EncodedBody`, `Response`)
//! - Pagination types (`Cursor`, `PageInfo`, `PagedResult`)
//! - Configuration structures
//! - The domain error type and `Result` alias
//!
//! ## Architecture
//! - No dependencies on other Pelagic crates
//! - Only external dependencies allowed
//! - Pure data structures, no I/O

pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;

//! # Pelagic App
//!
//! Application layer - engine wiring and the `pelagic` binary.
//!
//! This crate contains:
//! - The engine context (dependency injection)
//! - Tracing setup and log helpers
//!
//! ## Architecture
//! - Depends on `domain`, `core`, and `infra`
//! - Wires up the hexagonal architecture

pub mod context;
pub mod utils;

pub use context::EngineContext;

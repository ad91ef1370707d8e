//! Database implementations

pub mod actor_provider;
pub mod manager;
pub mod request_store;

pub use actor_provider::SqliteActorProvider;
pub use manager::{DbConnection, DbManager};
pub use request_store::SqliteRequestStore;

//! Cursor pagination over `Link`-header driven endpoints

pub mod link;
pub mod paginator;

pub use link::{parse_link_header, PageLinks};
pub use paginator::Paginator;

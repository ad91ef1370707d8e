//! Persisting, resumable request execution

pub mod body;
pub mod ports;
pub mod requester;

pub use body::{ByteStream, RequestBody};
pub use requester::{Requester, ResumeReport};

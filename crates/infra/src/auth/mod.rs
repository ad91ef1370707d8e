//! OAuth adapters: loopback callback server and approval surface.

pub mod approval;
pub mod callback_server;

pub use approval::LoggingApprovalSurface;
pub use callback_server::{OAuthCallbackServer, PendingCallbackServer};

//! Authentication services
//!
//! The [`Authenticator`] drives the interactive flow and fans the resulting
//! actor out to every waiting listener. The [`AuthenticationLock`] gates
//! work that needs credentials behind it.

pub mod authenticator;
pub mod authorizer;
pub mod exchange;
pub mod lock;
pub mod ports;

pub use authenticator::{Authenticator, ListenerId};
pub use authorizer::CallbackAuthorizer;
pub use exchange::OAuthTokenExchanger;
pub use lock::AuthenticationLock;

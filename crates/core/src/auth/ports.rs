//! Port interfaces for authentication
//!
//! These traits define the boundaries between the authentication services
//! and infrastructure implementations.

use async_trait::async_trait;
use pelagic_domain::{Actor, AuthorizationGrant, Result};
use url::Url;

/// Durable holder of the current actor.
#[async_trait]
pub trait ActorProvider: Send + Sync {
    /// Current actor, `Actor::Unauthenticated` when none is stored.
    async fn provide(&self) -> Result<Actor>;

    /// Replace the stored actor.
    async fn remember(&self, actor: Actor) -> Result<()>;
}

/// Obtains a one-time authorization grant through an external approval step.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Suspend until the user approves or declines.
    async fn authorize(&self) -> Result<AuthorizationGrant>;
}

/// Trades an authorization grant for credentials.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, grant: AuthorizationGrant) -> Result<Actor>;
}

/// Presents an authorization URL to the user (browser, terminal, ...).
#[async_trait]
pub trait ApprovalSurface: Send + Sync {
    async fn open(&self, url: &Url) -> Result<()>;
}

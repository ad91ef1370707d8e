//! Authentication gate for credentialed work

use std::future::Future;
use std::sync::Arc;

use pelagic_domain::{Actor, AuthenticatedActor, PelagicError, Result};
use tracing::{debug, instrument, warn};

use super::authenticator::Authenticator;
use super::ports::ActorProvider;

/// Runs work only once an authenticated actor is available.
pub struct AuthenticationLock {
    actor_provider: Arc<dyn ActorProvider>,
    authenticator: Arc<Authenticator>,
}

impl AuthenticationLock {
    /// Lock over the stored actor, authenticating through `authenticator`
    /// when none is signed in.
    pub fn new(actor_provider: Arc<dyn ActorProvider>, authenticator: Arc<Authenticator>) -> Self {
        Self { actor_provider, authenticator }
    }

    /// Run `body` with the current actor, authenticating first if needed.
    ///
    /// # Errors
    ///
    /// Returns `PelagicError::FailedAuthentication` without running `body`
    /// when no authenticated actor could be obtained. Errors from `body`
    /// are returned unchanged.
    #[instrument(skip(self, body))]
    pub async fn request_unlock<T, F, Fut>(&self, body: F) -> Result<T>
    where
        F: FnOnce(AuthenticatedActor) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        let actor = match self.actor_provider.provide().await? {
            Actor::Authenticated(actor) => actor,
            Actor::Unauthenticated => {
                debug!("no actor stored, authenticating");
                match self.authenticator.authenticate().await {
                    Ok(Actor::Authenticated(actor)) => actor,
                    Ok(Actor::Unauthenticated) => {
                        warn!("authentication completed without credentials");
                        return Err(PelagicError::FailedAuthentication(
                            "authentication completed without credentials".into(),
                        ));
                    }
                    Err(err @ PelagicError::FailedAuthentication(_)) => return Err(err),
                    Err(err) => return Err(PelagicError::FailedAuthentication(err.to_string())),
                }
            }
        };

        body(actor).await
    }
}

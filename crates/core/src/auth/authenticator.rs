//! Interactive authentication with single-delivery listeners
//!
//! Callers of [`Authenticator::authenticate`] register a one-shot listener
//! and then drive (or, under [`AuthenticationPolicy::Join`], wait on) an
//! authorize → exchange flow. Whichever flow completes first hands its actor
//! to [`Authenticator::receive`], which notifies every listener registered at
//! that moment exactly once and clears the registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use pelagic_domain::{Actor, AuthenticationPolicy, PelagicError, Result};
use tokio::sync::{oneshot, Notify};
use tracing::{debug, info, instrument, warn};

use super::ports::{ActorProvider, Authorizer, TokenExchanger};

type ActorListener = Box<dyn FnOnce(&Actor) + Send>;

/// Handle for a registered actor-receipt listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Drives the interactive flow and publishes its outcome.
pub struct Authenticator {
    authorizer: Arc<dyn Authorizer>,
    exchanger: Arc<dyn TokenExchanger>,
    actor_provider: Arc<dyn ActorProvider>,
    policy: AuthenticationPolicy,
    listeners: Mutex<HashMap<u64, ActorListener>>,
    next_listener_id: AtomicU64,
    flow_pending: AtomicBool,
    flow_ended: Notify,
}

impl Authenticator {
    /// Create an authenticator with no listeners and no flow running.
    pub fn new(
        authorizer: Arc<dyn Authorizer>,
        exchanger: Arc<dyn TokenExchanger>,
        actor_provider: Arc<dyn ActorProvider>,
        policy: AuthenticationPolicy,
    ) -> Self {
        Self {
            authorizer,
            exchanger,
            actor_provider,
            policy,
            listeners: Mutex::new(HashMap::new()),
            next_listener_id: AtomicU64::new(0),
            flow_pending: AtomicBool::new(false),
            flow_ended: Notify::new(),
        }
    }

    /// How concurrent callers of [`Self::authenticate`] share flows.
    pub const fn policy(&self) -> AuthenticationPolicy {
        self.policy
    }

    /// Register `listener` for the next actor delivered by [`Self::receive`].
    ///
    /// The listener runs at most once. It is dropped without running if it
    /// is removed first.
    pub fn add_on_actor_receipt_listener<F>(&self, listener: F) -> ListenerId
    where
        F: FnOnce(&Actor) + Send + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().insert(id, Box::new(listener));
        ListenerId(id)
    }

    /// Deregister a listener. Returns `false` if it already ran or was removed.
    pub fn remove_on_actor_receipt_listener(&self, id: ListenerId) -> bool {
        self.listeners.lock().remove(&id.0).is_some()
    }

    /// Number of listeners waiting for the next delivery.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Deliver `actor` to every currently registered listener.
    ///
    /// The registry is detached before anything else happens, so listeners
    /// added afterwards wait for the next delivery. An authenticated actor is
    /// remembered through the actor provider before listeners run; if that
    /// fails, listeners see `Actor::Unauthenticated` and the error is
    /// returned.
    #[instrument(skip(self, actor), fields(authenticated = actor.is_authenticated()))]
    pub async fn receive(&self, actor: Actor) -> Result<()> {
        let listeners = std::mem::take(&mut *self.listeners.lock());

        let remembered = if actor.is_authenticated() {
            self.actor_provider.remember(actor.clone()).await
        } else {
            Ok(())
        };

        let delivered = match &remembered {
            Ok(()) => actor,
            Err(err) => {
                warn!(error = %err, "failed to remember actor");
                Actor::Unauthenticated
            }
        };

        info!(listeners = listeners.len(), "delivering actor to listeners");
        for (_, listener) in listeners {
            listener(&delivered);
        }

        remembered
    }

    /// Run the authentication flow and wait for an actor.
    ///
    /// Returns the first actor delivered after this call registered its
    /// listener. That may come from another caller's flow. Under
    /// [`AuthenticationPolicy::Join`] the result is `Actor::Unauthenticated`
    /// when the shared flow failed; under [`AuthenticationPolicy::Reprompt`]
    /// a failed flow only fails the caller that opened it.
    ///
    /// # Errors
    ///
    /// Returns `PelagicError::FailedAuthentication` if this caller's own flow
    /// failed, or an I/O error if the actor could not be remembered.
    #[instrument(skip(self), fields(policy = ?self.policy))]
    pub async fn authenticate(&self) -> Result<Actor> {
        let (tx, mut rx) = oneshot::channel::<Actor>();
        let id = self.add_on_actor_receipt_listener(move |actor| {
            let _ = tx.send(actor.clone());
        });
        let _registration = ListenerRegistration { authenticator: self, id };

        loop {
            let flow_ended = self.flow_ended.notified();
            tokio::pin!(flow_ended);
            flow_ended.as_mut().enable();

            if self.try_begin_flow() {
                return self.drive(&mut rx).await;
            }

            debug!("waiting on pending authentication flow");
            tokio::select! {
                biased;
                received = &mut rx => return listener_outcome(received),
                () = flow_ended.as_mut() => {
                    debug!("pending flow ended without delivering, retrying");
                }
            }
        }
    }

    /// Forget the current actor.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        self.actor_provider.remember(Actor::Unauthenticated).await?;
        info!("actor logged out");
        Ok(())
    }

    fn try_begin_flow(&self) -> bool {
        match self.policy {
            AuthenticationPolicy::Reprompt => true,
            AuthenticationPolicy::Join => self
                .flow_pending
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok(),
        }
    }

    async fn drive(&self, rx: &mut oneshot::Receiver<Actor>) -> Result<Actor> {
        let flow = self.run_flow();
        tokio::pin!(flow);

        tokio::select! {
            biased;
            received = &mut *rx => listener_outcome(received),
            outcome = &mut flow => {
                outcome?;
                listener_outcome(rx.await)
            }
        }
    }

    async fn run_flow(&self) -> Result<()> {
        let _flow = FlowGuard { authenticator: self };
        info!("starting authentication flow");

        let exchanged = match self.authorizer.authorize().await {
            Ok(grant) => self.exchanger.exchange(grant).await,
            Err(err) => Err(err),
        };

        match exchanged {
            Ok(actor) => self.receive(actor).await,
            Err(err) => {
                warn!(error = %err, "authentication flow failed");
                // Join waiters share this flow and fail with it.
                if self.policy == AuthenticationPolicy::Join {
                    self.receive(Actor::Unauthenticated).await?;
                }
                Err(as_failed_authentication(err))
            }
        }
    }
}

fn listener_outcome(received: std::result::Result<Actor, oneshot::error::RecvError>) -> Result<Actor> {
    received.map_err(|_| {
        PelagicError::FailedAuthentication("actor listener was dropped before delivery".into())
    })
}

fn as_failed_authentication(err: PelagicError) -> PelagicError {
    match err {
        PelagicError::FailedAuthentication(_) => err,
        other => PelagicError::FailedAuthentication(other.to_string()),
    }
}

/// Removes the caller's listener when `authenticate` returns or is dropped.
struct ListenerRegistration<'a> {
    authenticator: &'a Authenticator,
    id: ListenerId,
}

impl Drop for ListenerRegistration<'_> {
    fn drop(&mut self) {
        self.authenticator.remove_on_actor_receipt_listener(self.id);
    }
}

/// Marks the end of a flow, including one that was cancelled mid-way, so
/// that callers waiting on it can take over.
struct FlowGuard<'a> {
    authenticator: &'a Authenticator,
}

impl Drop for FlowGuard<'_> {
    fn drop(&mut self) {
        if self.authenticator.policy == AuthenticationPolicy::Join {
            self.authenticator.flow_pending.store(false, Ordering::Release);
        }
        self.authenticator.flow_ended.notify_waiters();
    }
}

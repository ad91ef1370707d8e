//! Browser-style authorization with an out-of-band callback
//!
//! [`CallbackAuthorizer::authorize`] builds the authorization URL, hands it to
//! an [`ApprovalSurface`] and suspends until [`CallbackAuthorizer::deliver`]
//! is called with the matching `state` (normally by the loopback callback
//! server in `pelagic-infra`).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pelagic_domain::{AuthorizationGrant, OAuthSettings, PelagicError, Result};
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use super::ports::{ApprovalSurface, Authorizer};

const AUTHORIZE_PATH: &str = "/oauth/authorize";

type GrantSender = oneshot::Sender<Result<AuthorizationGrant>>;

/// Authorization-code flow whose answer arrives through [`Self::deliver`].
pub struct CallbackAuthorizer {
    authorize_endpoint: Url,
    client_id: String,
    scope: String,
    redirect_uri: String,
    surface: Arc<dyn ApprovalSurface>,
    pending: Mutex<HashMap<String, GrantSender>>,
}

impl CallbackAuthorizer {
    /// Create an authorizer for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `PelagicError::Config` if `base_url` is not a valid URL.
    pub fn new(
        base_url: &str,
        settings: &OAuthSettings,
        redirect_uri: impl Into<String>,
        surface: Arc<dyn ApprovalSurface>,
    ) -> Result<Self> {
        let authorize_endpoint = Url::parse(base_url)
            .and_then(|base| base.join(AUTHORIZE_PATH))
            .map_err(|e| PelagicError::Config(format!("invalid server base URL {base_url}: {e}")))?;

        Ok(Self {
            authorize_endpoint,
            client_id: settings.client_id.clone(),
            scope: settings.scope_string(),
            redirect_uri: redirect_uri.into(),
            surface,
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// Redirect URI sent in the authorization URL.
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Authorization URL for a request identified by `state`.
    pub fn authorization_url(&self, state: &str) -> Url {
        let mut url = self.authorize_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &self.scope)
            .append_pair("state", state);
        url
    }

    /// Complete the pending authorization identified by `state`.
    ///
    /// Returns `false` when no authorization with that state is waiting,
    /// e.g. a replayed callback or one that arrived after cancellation.
    pub fn deliver(&self, state: &str, outcome: Result<AuthorizationGrant>) -> bool {
        let Some(sender) = self.pending.lock().remove(state) else {
            warn!("authorization callback for unknown state");
            return false;
        };

        debug!(granted = outcome.is_ok(), "authorization callback delivered");
        sender.send(outcome).is_ok()
    }

    /// Number of authorizations waiting for a callback.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[async_trait]
impl Authorizer for CallbackAuthorizer {
    #[instrument(skip(self))]
    async fn authorize(&self) -> Result<AuthorizationGrant> {
        let state = Uuid::new_v4().simple().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(state.clone(), tx);
        let _pending = PendingAuthorization { authorizer: self, state: &state };

        let url = self.authorization_url(&state);
        self.surface.open(&url).await?;
        info!("waiting for authorization callback");

        rx.await.unwrap_or_else(|_| {
            Err(PelagicError::FailedAuthentication("authorization request was withdrawn".into()))
        })
    }
}

/// Revokes the state registration once `authorize` finishes or is dropped.
struct PendingAuthorization<'a> {
    authorizer: &'a CallbackAuthorizer,
    state: &'a str,
}

impl Drop for PendingAuthorization<'_> {
    fn drop(&mut self) {
        self.authorizer.pending.lock().remove(self.state);
    }
}

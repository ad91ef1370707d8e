//! Authorization-code token exchange
//!
//! Runs its calls through the [`Requester`] so they share the transport and
//! the durable bookkeeping. The requester is held weakly: it owns the lock
//! that owns the authenticator that owns this exchanger.

use std::sync::Weak;

use async_trait::async_trait;
use pelagic_domain::{
    Actor, AuthenticatedActor, Authentication, AuthorizationGrant, Method, OAuthSettings,
    PelagicError, Request, Result,
};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::ports::TokenExchanger;
use crate::request::{RequestBody, Requester};

const TOKEN_ROUTE: &str = "/oauth/token";
const VERIFY_CREDENTIALS_ROUTE: &str = "/api/v1/accounts/verify_credentials";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Account {
    id: String,
}

/// Exchanges a grant at `/oauth/token` and resolves the account it belongs to.
pub struct OAuthTokenExchanger {
    requester: Weak<Requester>,
    client_id: String,
    client_secret: String,
    scope: String,
    redirect_uri: String,
}

impl OAuthTokenExchanger {
    /// Exchanger whose calls go through `requester` with the given client
    /// registration and the redirect URI the grant was issued for.
    pub fn new(
        requester: Weak<Requester>,
        settings: &OAuthSettings,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            requester,
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            scope: settings.scope_string(),
            redirect_uri: redirect_uri.into(),
        }
    }

    async fn request_token(&self, requester: &Requester, grant: AuthorizationGrant) -> Result<String> {
        let body = RequestBody::form([
            ("grant_type", "authorization_code"),
            ("code", grant.code()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("scope", self.scope.as_str()),
        ])
        .encode()
        .await?;

        let request =
            Request::new(Method::Post, TOKEN_ROUTE, Authentication::None, body).single_shot();
        let id = request.id;
        let response = settle(requester, id, requester.send(request).await).await?;
        let token: TokenResponse = response.json()?;
        Ok(token.access_token)
    }

    async fn verify(&self, requester: &Requester, access_token: String) -> Result<Actor> {
        // The real account id is unknown until verify_credentials answers.
        let provisional = AuthenticatedActor::new("", access_token.clone())?;
        let body = RequestBody::Empty.encode().await?;
        let request =
            Request::new(Method::Get, VERIFY_CREDENTIALS_ROUTE, Authentication::Required, body)
                .single_shot();
        let id = request.id;

        let response = settle(requester, id, requester.send_as(request, provisional).await).await?;
        let account: Account = response.json()?;
        Actor::authenticated(account.id, access_token)
    }
}

#[async_trait]
impl TokenExchanger for OAuthTokenExchanger {
    #[instrument(skip(self, grant))]
    async fn exchange(&self, grant: AuthorizationGrant) -> Result<Actor> {
        let requester = self.requester.upgrade().ok_or_else(|| {
            PelagicError::Internal("requester dropped before token exchange".into())
        })?;

        let access_token = self.request_token(&requester, grant).await?;
        let actor = self.verify(&requester, access_token).await?;

        if let Some(actor) = actor.as_authenticated() {
            info!(account_id = actor.id(), "token exchange succeeded");
        }
        Ok(actor)
    }
}

/// A grant is single use, so a failed call's record is dropped instead of
/// kept. Records left by a crash are single-shot and dropped by resume.
async fn settle<T>(requester: &Requester, id: Uuid, outcome: Result<T>) -> Result<T> {
    if let Err(err) = &outcome {
        warn!(request_id = %id, error = %err, "token exchange call failed");
        if let Err(abandon_err) = requester.abandon(id).await {
            warn!(request_id = %id, error = %abandon_err, "failed to drop exchange record");
        }
    }
    outcome
}

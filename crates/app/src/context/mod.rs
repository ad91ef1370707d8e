//! Engine context - dependency injection container

use std::sync::{Arc, Weak};

use pelagic_core::{
    ApprovalSurface, AuthenticationLock, Authenticator, CallbackAuthorizer, OAuthTokenExchanger,
    Paginator, Requester, ResumeReport,
};
use pelagic_domain::{Authentication, Config, PelagicError, Result};
use pelagic_infra::{
    DbManager, HttpTransport, LoggingApprovalSurface, OAuthCallbackServer, SqliteActorProvider,
    SqliteRequestStore,
};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

/// Holds every service of one engine run.
///
/// The requester owns the authentication lock, which owns the
/// authenticator, which owns the token exchanger; the exchanger reaches
/// back to the requester through a weak reference.
pub struct EngineContext {
    /// Configuration the engine was built from.
    pub config: Config,
    /// Connection pool shared by both SQLite adapters.
    pub db: Arc<DbManager>,
    /// Persisted signed-in actor.
    pub actor_provider: Arc<SqliteActorProvider>,
    /// Builds authorization URLs and receives their callbacks.
    pub authorizer: Arc<CallbackAuthorizer>,
    /// Single-flight sign-in.
    pub authenticator: Arc<Authenticator>,
    /// Durable request pipeline.
    pub requester: Arc<Requester>,
    callback_server: Option<OAuthCallbackServer>,
}

impl EngineContext {
    /// Build the engine with an approval surface that logs the sign-in URL.
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_surface(config, Arc::new(LoggingApprovalSurface)).await
    }

    /// Build the engine around a caller-supplied approval surface.
    ///
    /// Without a configured `oauth.redirect_uri` a loopback callback server
    /// is started and its URI is used instead.
    pub async fn with_surface(config: Config, surface: Arc<dyn ApprovalSurface>) -> Result<Self> {
        let db = Arc::new(DbManager::from_config(&config.database)?);
        db.run_migrations()?;

        let store = Arc::new(SqliteRequestStore::new(db.clone()));
        let actor_provider = Arc::new(SqliteActorProvider::new(db.clone()));
        let transport = Arc::new(HttpTransport::from_config(&config.server)?);

        let (redirect_uri, pending_server) = match &config.oauth.redirect_uri {
            Some(uri) => (uri.clone(), None),
            None => {
                let pending = OAuthCallbackServer::bind().await?;
                (pending.redirect_uri(), Some(pending))
            }
        };

        let authorizer = Arc::new(CallbackAuthorizer::new(
            &config.server.base_url,
            &config.oauth,
            redirect_uri.clone(),
            surface,
        )?);

        let mut authenticator = None;
        let requester = Arc::new_cyclic(|requester: &Weak<Requester>| {
            let exchanger = Arc::new(OAuthTokenExchanger::new(
                requester.clone(),
                &config.oauth,
                redirect_uri.clone(),
            ));
            let auth = Arc::new(Authenticator::new(
                authorizer.clone(),
                exchanger,
                actor_provider.clone(),
                config.requester.authentication_policy,
            ));
            let lock = Arc::new(AuthenticationLock::new(actor_provider.clone(), auth.clone()));
            authenticator = Some(auth);
            Requester::new(store, transport, lock, &config.requester)
        });
        let authenticator = authenticator
            .ok_or_else(|| PelagicError::Internal("authenticator was not constructed".into()))?;

        let callback_server = pending_server.map(|pending| pending.serve(authorizer.clone()));

        info!(
            base_url = %config.server.base_url,
            db_path = %db.path().display(),
            policy = ?config.requester.authentication_policy,
            "engine context initialised"
        );

        Ok(Self {
            config,
            db,
            actor_provider,
            authorizer,
            authenticator,
            requester,
            callback_server,
        })
    }

    /// Re-send every request left over from previous runs.
    pub async fn resume(&self) -> Result<ResumeReport> {
        self.requester.resume().await
    }

    /// Paginator over `route` sharing this engine's requester.
    pub fn paginator<T: DeserializeOwned>(
        &self,
        route: impl Into<String>,
        authentication: Authentication,
    ) -> Paginator<T> {
        Paginator::new(self.requester.clone(), route, authentication)
    }

    /// Redirect URI registered with the authorization server.
    pub fn redirect_uri(&self) -> &str {
        self.authorizer.redirect_uri()
    }

    /// Stop in-flight work and the callback server.
    ///
    /// Interrupted requests stay in the store and are picked up by the next
    /// [`Self::resume`].
    pub async fn shutdown(mut self) -> Result<()> {
        let interrupted = self.requester.interrupt();
        if interrupted > 0 {
            warn!(interrupted, "in-flight requests interrupted by shutdown");
        }

        if let Some(server) = self.callback_server.take() {
            server.shutdown().await?;
        }

        info!("engine context shut down");
        Ok(())
    }
}

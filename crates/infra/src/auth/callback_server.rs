//! Loopback HTTP server that receives OAuth redirect callbacks.
//!
//! The listener is bound first so its redirect URI can be registered with
//! the [`CallbackAuthorizer`]; serving starts once the authorizer exists.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use pelagic_core::CallbackAuthorizer;
use pelagic_domain::{AuthorizationGrant, PelagicError, Result};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const CALLBACK_PATH: &str = "/callback";

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization Complete</title></head>
<body><h1>Authorization Successful</h1><p>You can close this window.</p></body>
</html>"#;

const FAILURE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization Failed</title></head>
<body><h1>Authorization Failed</h1><p>Invalid or unexpected callback parameters.</p></body>
</html>"#;

/// Bound loopback listener that is not serving yet.
pub struct PendingCallbackServer {
    listener: TcpListener,
    port: u16,
}

impl PendingCallbackServer {
    /// Redirect URI to register with the authorization server.
    pub fn redirect_uri(&self) -> String {
        redirect_uri(self.port)
    }

    /// Start answering callbacks for `authorizer`.
    pub fn serve(self, authorizer: Arc<CallbackAuthorizer>) -> OAuthCallbackServer {
        let app = Router::new()
            .route(CALLBACK_PATH, get(handle_oauth_callback))
            .with_state(authorizer);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let listener = self.listener;

        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                error!("OAuth callback server error: {}", err);
            }
        });

        info!(port = self.port, "OAuth callback server listening");
        OAuthCallbackServer { port: self.port, shutdown_tx: Some(shutdown_tx), handle: Some(handle) }
    }
}

/// Running loopback callback server. Stops when shut down or dropped.
pub struct OAuthCallbackServer {
    port: u16,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl OAuthCallbackServer {
    /// Bind the loopback listener on an ephemeral port.
    pub async fn bind() -> Result<PendingCallbackServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await.map_err(|err| {
            PelagicError::network(format!("failed to bind OAuth loopback server: {err}"))
        })?;

        let port = listener
            .local_addr()
            .map_err(|err| PelagicError::network(format!("failed to determine port: {err}")))?
            .port();

        Ok(PendingCallbackServer { listener, port })
    }

    /// Redirect URI this server answers on.
    pub fn redirect_uri(&self) -> String {
        redirect_uri(self.port)
    }

    /// Shut down the loopback server gracefully.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    return Err(PelagicError::Internal(format!(
                        "OAuth callback server panicked: {err}"
                    )));
                }
            }
        }

        Ok(())
    }
}

impl Drop for OAuthCallbackServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }
}

fn redirect_uri(port: u16) -> String {
    format!("http://localhost:{port}{CALLBACK_PATH}")
}

async fn handle_oauth_callback(
    State(authorizer): State<Arc<CallbackAuthorizer>>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<&'static str> {
    let Some(state) = params.get("state") else {
        warn!("OAuth callback without state");
        return Html(FAILURE_PAGE);
    };

    let outcome = match (params.get("code"), params.get("error")) {
        (Some(code), None) => Ok(AuthorizationGrant::new(code.clone())),
        (_, Some(reason)) => {
            let description = params.get("error_description").unwrap_or(reason);
            Err(PelagicError::FailedAuthentication(format!("authorization denied: {description}")))
        }
        (None, None) => {
            Err(PelagicError::FailedAuthentication("callback carried no authorization code".into()))
        }
    };
    let granted = outcome.is_ok();

    if !authorizer.deliver(state, outcome) {
        warn!("OAuth callback did not match a pending authorization");
        return Html(FAILURE_PAGE);
    }

    if granted {
        Html(SUCCESS_PAGE)
    } else {
        Html(FAILURE_PAGE)
    }
}

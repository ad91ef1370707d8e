//! Loopback OAuth callback server driving a real `CallbackAuthorizer`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pelagic_core::{ApprovalSurface, Authorizer, CallbackAuthorizer};
use pelagic_domain::{OAuthSettings, PelagicError, Result};
use pelagic_infra::OAuthCallbackServer;
use tokio::sync::mpsc;
use url::Url;

/// Forwards every authorization URL to the test body.
struct ChannelSurface(mpsc::UnboundedSender<Url>);

#[async_trait]
impl ApprovalSurface for ChannelSurface {
    async fn open(&self, url: &Url) -> Result<()> {
        self.0
            .send(url.clone())
            .map_err(|_| PelagicError::Internal("test receiver dropped".into()))
    }
}

struct Flow {
    authorizer: Arc<CallbackAuthorizer>,
    server: OAuthCallbackServer,
    opened: mpsc::UnboundedReceiver<Url>,
}

async fn start_flow() -> Flow {
    let pending = OAuthCallbackServer::bind().await.unwrap();
    let (tx, opened) = mpsc::unbounded_channel();
    let settings = OAuthSettings { client_id: "client".into(), ..OAuthSettings::default() };
    let authorizer = Arc::new(
        CallbackAuthorizer::new(
            "https://example.social",
            &settings,
            pending.redirect_uri(),
            Arc::new(ChannelSurface(tx)),
        )
        .unwrap(),
    );
    let server = pending.serve(authorizer.clone());
    Flow { authorizer, server, opened }
}

fn state_of(url: &Url) -> String {
    url.query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .expect("authorization URL carries a state")
}

async fn hit(url: String) -> String {
    reqwest::Client::builder().no_proxy().build().unwrap().get(url).send().await.unwrap().text().await.unwrap()
}

#[tokio::test]
async fn callback_completes_the_pending_authorization() {
    let mut flow = start_flow().await;
    let authorizer = flow.authorizer.clone();
    let waiting = tokio::spawn(async move { authorizer.authorize().await });

    let url = tokio::time::timeout(Duration::from_secs(5), flow.opened.recv()).await.unwrap().unwrap();
    assert_eq!(url.path(), "/oauth/authorize");
    let page = hit(format!("{}?code=granted-code&state={}", flow.server.redirect_uri(), state_of(&url))).await;

    let grant = waiting.await.unwrap().unwrap();
    assert_eq!(grant.code(), "granted-code");
    assert!(page.contains("Authorization Successful"));
    assert_eq!(flow.authorizer.pending_count(), 0);
    flow.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn denied_callback_fails_the_authorization() {
    let mut flow = start_flow().await;
    let authorizer = flow.authorizer.clone();
    let waiting = tokio::spawn(async move { authorizer.authorize().await });

    let url = flow.opened.recv().await.unwrap();
    let page = hit(format!(
        "{}?error=access_denied&error_description=user+said+no&state={}",
        flow.server.redirect_uri(),
        state_of(&url)
    ))
    .await;

    let err = waiting.await.unwrap().unwrap_err();
    assert!(matches!(err, PelagicError::FailedAuthentication(ref msg) if msg.contains("user said no")));
    assert!(page.contains("Authorization Failed"));
}

#[tokio::test]
async fn callback_with_unknown_state_is_ignored() {
    let mut flow = start_flow().await;
    let authorizer = flow.authorizer.clone();
    let waiting = tokio::spawn(async move { authorizer.authorize().await });
    let url = flow.opened.recv().await.unwrap();

    let page = hit(format!("{}?code=stolen&state=forged", flow.server.redirect_uri())).await;

    assert!(page.contains("Authorization Failed"));
    assert_eq!(flow.authorizer.pending_count(), 1);

    hit(format!("{}?code=real&state={}", flow.server.redirect_uri(), state_of(&url))).await;
    assert_eq!(waiting.await.unwrap().unwrap().code(), "real");
}

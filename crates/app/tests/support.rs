//! Shared helpers for `pelagic-app` integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pelagic_core::ApprovalSurface;
use pelagic_domain::{Config, DatabaseConfig, OAuthSettings, RequesterConfig, Result, ServerConfig};
use pelagic_lib::EngineContext;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_DB_KEY: &str = "test_key_64_chars_long_aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
pub const GRANTED_CODE: &str = "granted-code";
pub const ACCESS_TOKEN: &str = "token-from-exchange";
pub const ACCOUNT_ID: &str = "42";

/// Database directory shared by every context a test starts, so a second
/// context on the same directory behaves like a process restart.
pub struct TestHome {
    _temp_dir: TempDir,
    db_path: PathBuf,
}

impl TestHome {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let db_path = temp_dir.path().join("pelagic.db");
        Self { _temp_dir: temp_dir, db_path }
    }

    pub fn config(&self, server_uri: &str) -> Config {
        Config {
            server: ServerConfig { base_url: server_uri.to_owned(), ..ServerConfig::default() },
            oauth: OAuthSettings {
                client_id: "client".into(),
                client_secret: "secret".into(),
                ..OAuthSettings::default()
            },
            database: DatabaseConfig {
                path: self.db_path.to_string_lossy().into_owned(),
                pool_size: 2,
                encryption_key: Some(TEST_DB_KEY.into()),
            },
            requester: RequesterConfig { reuse_ttl_ms: 0, ..RequesterConfig::default() },
        }
    }

    /// Start a context whose approval surface follows the callback link.
    pub async fn start(&self, server_uri: &str, surface: Arc<ClickingSurface>) -> EngineContext {
        EngineContext::with_surface(self.config(server_uri), surface)
            .await
            .expect("engine context should start")
    }
}

/// Approval surface that plays the user: it follows the authorization URL
/// straight to the redirect URI with either a code or a denial.
pub struct ClickingSurface {
    approve: bool,
    opened: AtomicUsize,
}

impl ClickingSurface {
    pub fn approving() -> Arc<Self> {
        Arc::new(Self { approve: true, opened: AtomicUsize::new(0) })
    }

    pub fn denying() -> Arc<Self> {
        Arc::new(Self { approve: false, opened: AtomicUsize::new(0) })
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApprovalSurface for ClickingSurface {
    async fn open(&self, url: &Url) -> Result<()> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let param = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
                .expect("authorization URL parameter")
        };

        let mut callback = Url::parse(&param("redirect_uri")).expect("redirect URI");
        {
            let mut query = callback.query_pairs_mut();
            if self.approve {
                query.append_pair("code", GRANTED_CODE);
            } else {
                query.append_pair("error", "access_denied");
            }
            query.append_pair("state", &param("state"));
        }

        reqwest::Client::builder()
            .no_proxy()
            .build()
            .expect("http client")
            .get(callback)
            .send()
            .await
            .expect("callback server reachable");
        Ok(())
    }
}

/// Mount the token and verify_credentials endpoints of a cooperative server.
pub async fn mount_oauth(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains(format!("code={GRANTED_CODE}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "access_token": ACCESS_TOKEN })),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/accounts/verify_credentials"))
        .and(header("authorization", format!("Bearer {ACCESS_TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": ACCOUNT_ID })))
        .mount(server)
        .await;
}

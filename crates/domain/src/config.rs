//! Configuration structures
//!
//! Loaded by `pelagic-infra::config` from the environment or a JSON/TOML file.

use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `[server]`
    pub server: ServerConfig,
    /// `[oauth]`
    pub oauth: OAuthSettings,
    /// `[database]`
    pub database: DatabaseConfig,
    /// `[requester]`
    pub requester: RequesterConfig,
}

/// Remote server the client talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL routes are resolved against (e.g. `https://mastodon.social`).
    pub base_url: String,
    /// Whole-request timeout, connect included.
    pub timeout_secs: u64,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Attempts per GET when the connection fails or the server answers
    /// 5xx. Other methods are always sent once.
    pub max_attempts: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://mastodon.social".to_string(),
            timeout_secs: 30,
            user_agent: concat!("pelagic/", env!("CARGO_PKG_VERSION")).to_string(),
            max_attempts: 1,
        }
    }
}

/// OAuth client registration used by the authorization flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    /// Client identifier issued when the application was registered.
    pub client_id: String,
    /// Secret paired with `client_id`, sent only to the token endpoint.
    pub client_secret: String,
    /// Requested scopes, sent space-separated.
    pub scopes: Vec<String>,
    /// Fixed redirect URI. When absent the loopback callback server's URI is used.
    pub redirect_uri: Option<String>,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            scopes: vec!["read".to_string(), "write".to_string(), "follow".to_string()],
            redirect_uri: None,
        }
    }
}

impl OAuthSettings {
    /// Scopes joined the way the authorization server expects them.
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Durable storage for pending requests and the current actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file, created on first use.
    pub path: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// SQLCipher key. The database is left unencrypted when absent.
    pub encryption_key: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "pelagic.db".to_string(), pool_size: 4, encryption_key: None }
    }
}

/// How concurrent `authenticate()` calls share the external approval flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticationPolicy {
    /// Every caller opens the approval surface; the first completion wins.
    #[default]
    Reprompt,
    /// Callers arriving while a flow is pending wait for that flow.
    Join,
}

/// Requester tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequesterConfig {
    /// How long a completed GET response is reused for identical GETs.
    /// Zero disables reuse.
    pub reuse_ttl_ms: u64,
    /// See [`AuthenticationPolicy`].
    pub authentication_policy: AuthenticationPolicy,
}

impl Default for RequesterConfig {
    fn default() -> Self {
        Self { reuse_ttl_ms: 5_000, authentication_policy: AuthenticationPolicy::default() }
    }
}

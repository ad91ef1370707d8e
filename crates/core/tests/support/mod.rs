//! Shared test helpers for `pelagic-core` integration tests.
//!
//! In-memory implementations of every core port plus a [`Harness`] that
//! wires them into a `Requester` the same way the app context does.

#![allow(dead_code)]

pub mod fakes;

use std::sync::Arc;
use std::time::Duration;

use pelagic_core::{AuthenticationLock, Authenticator, Requester};
use pelagic_domain::{
    Authentication, AuthenticationPolicy, EncodedBody, Method, Request, RequesterConfig,
};

pub use fakes::{
    json_response, Event, EventLog, MemoryActorProvider, MemoryRequestStore, ScriptedAuthorizer,
    ScriptedTransport, TokenFromCode,
};

/// Fully wired requester over in-memory fakes.
pub struct Harness {
    pub log: EventLog,
    pub store: Arc<MemoryRequestStore>,
    pub transport: Arc<ScriptedTransport>,
    pub provider: Arc<MemoryActorProvider>,
    pub authorizer: Arc<ScriptedAuthorizer>,
    pub authenticator: Arc<Authenticator>,
    pub requester: Arc<Requester>,
}

pub struct HarnessBuilder {
    policy: AuthenticationPolicy,
    reuse_ttl_ms: u64,
    transport: ScriptedTransport,
    authorizer: ScriptedAuthorizer,
    provider: MemoryActorProvider,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            policy: AuthenticationPolicy::Reprompt,
            reuse_ttl_ms: 0,
            transport: ScriptedTransport::new(),
            authorizer: ScriptedAuthorizer::new(),
            provider: MemoryActorProvider::default(),
        }
    }

    pub fn new() -> Self {
        Self::builder().build()
    }
}

impl HarnessBuilder {
    pub fn policy(mut self, policy: AuthenticationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn reuse_ttl_ms(mut self, reuse_ttl_ms: u64) -> Self {
        self.reuse_ttl_ms = reuse_ttl_ms;
        self
    }

    pub fn transport(mut self, transport: ScriptedTransport) -> Self {
        self.transport = transport;
        self
    }

    pub fn authorizer(mut self, authorizer: ScriptedAuthorizer) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn signed_in(mut self, id: &str, token: &str) -> Self {
        self.provider = MemoryActorProvider::signed_in(id, token);
        self
    }

    pub fn build(self) -> Harness {
        let log = EventLog::default();
        let store = Arc::new(MemoryRequestStore::new(log.clone()));
        let transport = Arc::new(self.transport.with_log(log.clone()));
        let provider = Arc::new(self.provider);
        let authorizer = Arc::new(self.authorizer);

        let authenticator = Arc::new(Authenticator::new(
            authorizer.clone(),
            Arc::new(TokenFromCode),
            provider.clone(),
            self.policy,
        ));
        let lock = Arc::new(AuthenticationLock::new(provider.clone(), authenticator.clone()));
        let config = RequesterConfig {
            reuse_ttl_ms: self.reuse_ttl_ms,
            authentication_policy: self.policy,
        };
        let requester =
            Arc::new(Requester::new(store.clone(), transport.clone(), lock, &config));

        Harness { log, store, transport, provider, authorizer, authenticator, requester }
    }
}

/// Request with an empty body.
pub fn request(method: Method, route: &str, authentication: Authentication) -> Request {
    Request::new(method, route, authentication, EncodedBody::from_bytes(vec![0]))
}

/// Poll `condition` until it holds, failing the test after about a second.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition was not reached in time");
}

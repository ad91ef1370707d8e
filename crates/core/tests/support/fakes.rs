//! In-memory port implementations with a shared event log.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pelagic_core::{
    ActorProvider, Authorizer, RequestStore, TokenExchanger, Transport, TransportRequest,
    UnreadableRecord,
};
use pelagic_domain::{Actor, AuthorizationGrant, PelagicError, Request, Response, Result};
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Side effects observed across the fakes, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Put(Uuid),
    Remove(Uuid),
    Send { route: String, authorization: Option<String> },
}

#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub fn push(&self, event: Event) {
        self.0.lock().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().clone()
    }
}

// ============================================================================
// Request store
// ============================================================================

pub struct MemoryRequestStore {
    records: Mutex<Vec<Request>>,
    unreadable: Mutex<Vec<UnreadableRecord>>,
    log: EventLog,
    fail_writes: AtomicBool,
    fail_removes: AtomicBool,
}

impl MemoryRequestStore {
    pub fn new(log: EventLog) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            unreadable: Mutex::new(Vec::new()),
            log,
            fail_writes: AtomicBool::new(false),
            fail_removes: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    /// Seed a record that can no longer be decoded.
    pub fn seed_unreadable(&self, key: &str, error: PelagicError) {
        self.unreadable.lock().push(UnreadableRecord { key: key.to_string(), error });
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.records.lock().iter().map(|r| r.id).collect()
    }

    pub fn get(&self, id: Uuid) -> Option<Request> {
        self.records.lock().iter().find(|r| r.id == id).cloned()
    }

    /// Seed a record as if a previous run had left it behind.
    pub fn seed(&self, request: Request) {
        self.records.lock().push(request);
    }
}

#[async_trait]
impl RequestStore for MemoryRequestStore {
    async fn put(&self, request: &Request) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PelagicError::StoreIo("disk full".into()));
        }
        let mut records = self.records.lock();
        records.retain(|r| r.id != request.id);
        records.push(request.clone());
        self.log.push(Event::Put(request.id));
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> Result<()> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(PelagicError::StoreIo("database is locked".into()));
        }
        self.records.lock().retain(|r| r.id != id);
        self.log.push(Event::Remove(id));
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<Request>> {
        Ok(self.records.lock().clone())
    }

    async fn unreadable(&self) -> Result<Vec<UnreadableRecord>> {
        Ok(self.unreadable.lock().clone())
    }

    async fn clear(&self) -> Result<()> {
        self.records.lock().clear();
        self.unreadable.lock().clear();
        Ok(())
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Transport answering from a per-route table, then a queue, then `200 []`.
///
/// A held transport parks every call until [`Self::release`] hands out
/// permits.
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, Response>>,
    queue: Mutex<VecDeque<Result<Response>>>,
    gate: Option<Semaphore>,
    calls: AtomicUsize,
    log: EventLog,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            gate: None,
            calls: AtomicUsize::new(0),
            log: EventLog::default(),
        }
    }

    pub fn held() -> Self {
        Self { gate: Some(Semaphore::new(0)), ..Self::new() }
    }

    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }

    pub fn respond_to(&self, route: &str, response: Response) {
        self.routes.lock().insert(route.to_string(), response);
    }

    pub fn push(&self, outcome: Result<Response>) {
        self.queue.lock().push_back(outcome);
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let authorization = request
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
            .map(|(_, value)| value.clone());
        self.log.push(Event::Send { route: request.route.clone(), authorization });

        if let Some(response) = self.routes.lock().get(&request.route) {
            return Ok(response.clone());
        }
        if let Some(outcome) = self.queue.lock().pop_front() {
            return outcome;
        }
        Ok(json_response(200, "[]"))
    }
}

pub fn json_response(status: u16, body: &str) -> Response {
    Response {
        status,
        headers: vec![("Content-Type".into(), "application/json".into())],
        body: body.as_bytes().to_vec(),
    }
}

// ============================================================================
// Authentication
// ============================================================================

#[derive(Default)]
pub struct MemoryActorProvider {
    actor: Mutex<Actor>,
}

impl MemoryActorProvider {
    pub fn signed_in(id: &str, token: &str) -> Self {
        Self { actor: Mutex::new(Actor::authenticated(id, token).expect("valid actor")) }
    }

    pub fn current(&self) -> Actor {
        self.actor.lock().clone()
    }
}

#[async_trait]
impl ActorProvider for MemoryActorProvider {
    async fn provide(&self) -> Result<Actor> {
        Ok(self.actor.lock().clone())
    }

    async fn remember(&self, actor: Actor) -> Result<()> {
        *self.actor.lock() = actor;
        Ok(())
    }
}

/// Authorizer granting `code-N` on its N-th call, optionally held or
/// declining its first calls.
pub struct ScriptedAuthorizer {
    calls: AtomicUsize,
    gate: Option<Semaphore>,
    declined_calls: usize,
}

impl ScriptedAuthorizer {
    pub fn new() -> Self {
        Self { calls: AtomicUsize::new(0), gate: None, declined_calls: 0 }
    }

    pub fn held() -> Self {
        Self { gate: Some(Semaphore::new(0)), ..Self::new() }
    }

    pub fn declining() -> Self {
        Self { declined_calls: usize::MAX, ..Self::new() }
    }

    /// Decline the first `calls` authorizations, grant the rest.
    pub fn declining_first(mut self, calls: usize) -> Self {
        self.declined_calls = calls;
        self
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authorizer for ScriptedAuthorizer {
    async fn authorize(&self) -> Result<AuthorizationGrant> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        if call <= self.declined_calls {
            return Err(PelagicError::FailedAuthentication("user declined".into()));
        }
        Ok(AuthorizationGrant::new(format!("code-{call}")))
    }
}

/// Exchanges `code-N` for the token `token-code-N` of account `1`.
pub struct TokenFromCode;

#[async_trait]
impl TokenExchanger for TokenFromCode {
    async fn exchange(&self, grant: AuthorizationGrant) -> Result<Actor> {
        Actor::authenticated("1", format!("token-{}", grant.code()))
    }
}

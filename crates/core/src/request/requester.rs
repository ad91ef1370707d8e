//! Durable request execution
//!
//! Every attempt follows the same order: persist the request, send it, and
//! delete the record only after a 2xx response. A failed, interrupted or
//! crashed attempt therefore leaves its record behind for [`Requester::resume`].
//!
//! At most one attempt per request id is in flight; a second `send` of the
//! same id joins the running attempt instead of starting another.
//!
//! Single-shot requests (see [`Request::single_shot`]) are persisted like any
//! other, but a record of one found by [`Requester::resume`] is dropped
//! without being sent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use moka::future::Cache;
use parking_lot::Mutex;
use pelagic_domain::{
    AuthenticatedActor, Authentication, Method, PelagicError, Request, RequesterConfig, Response,
    Result,
};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, instrument, warn, Instrument};
use uuid::Uuid;

use super::body::RequestBody;
use super::ports::{RequestStore, Transport, TransportRequest, UnreadableRecord};
use crate::auth::AuthenticationLock;

const REUSE_CAPACITY: u64 = 256;
const FAILURE_BODY_LIMIT: usize = 512;

type Outcome = Shared<BoxFuture<'static, Result<Response>>>;
type InFlightMap = Arc<Mutex<HashMap<Uuid, InFlight>>>;

struct InFlight {
    outcome: Outcome,
    abort: AbortHandle,
    generation: u64,
}

/// Identifies GET responses that may be handed out again. Responses to
/// credentialed requests are only reused for the same account.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ReuseKey {
    route: String,
    headers: Vec<(String, String)>,
    account: Option<String>,
}

/// Outcome of [`Requester::resume`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeReport {
    /// Re-sent and answered with 2xx; their records are gone.
    pub completed: Vec<Uuid>,
    /// Re-sent without success, or dropped unsuccessfully. Records are kept.
    pub failed: Vec<(Uuid, PelagicError)>,
    /// Already in flight when resume started.
    pub skipped: Vec<Uuid>,
    /// Single-shot records dropped without being sent.
    pub discarded: Vec<Uuid>,
    /// Records the store could not decode. They stay stored until cleared.
    pub unreadable: Vec<UnreadableRecord>,
}

impl ResumeReport {
    /// Whether every stored record was either completed, skipped or
    /// discarded.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.unreadable.is_empty()
    }
}

/// Sends requests through the transport with durable bookkeeping.
pub struct Requester {
    store: Arc<dyn RequestStore>,
    transport: Arc<dyn Transport>,
    lock: Arc<AuthenticationLock>,
    in_flight: InFlightMap,
    next_generation: AtomicU64,
    reuse: Option<Cache<ReuseKey, Response>>,
}

impl Requester {
    /// Build a requester. A zero `reuse_ttl_ms` disables response reuse.
    pub fn new(
        store: Arc<dyn RequestStore>,
        transport: Arc<dyn Transport>,
        lock: Arc<AuthenticationLock>,
        config: &RequesterConfig,
    ) -> Self {
        let reuse = (config.reuse_ttl_ms > 0).then(|| {
            Cache::builder()
                .max_capacity(REUSE_CAPACITY)
                .time_to_live(Duration::from_millis(config.reuse_ttl_ms))
                .build()
        });

        Self {
            store,
            transport,
            lock,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            reuse,
        }
    }

    /// Send `request`, authenticating first when it requires an actor.
    ///
    /// A GET identical to one that succeeded within the reuse window is
    /// answered from memory without touching the store or the transport.
    ///
    /// # Errors
    ///
    /// - `StoreIo` if the request could not be persisted; nothing was sent.
    /// - `FailedAuthentication` if no actor could be obtained; nothing was sent.
    /// - `Transport` for network failures and non-2xx responses; the record
    ///   stays in the store.
    /// - `StoreIo` if the server accepted the request but its record could
    ///   not be deleted; the record is re-sent by the next resume.
    /// - `Interrupted` if the attempt was torn down by [`Self::interrupt`].
    #[instrument(skip(self, request), fields(request_id = %request.id, method = %request.method, route = %request.route))]
    pub async fn send(&self, request: Request) -> Result<Response> {
        match request.authentication {
            Authentication::None => self.send_reusing(request, None).await,
            Authentication::Required => {
                self.lock
                    .request_unlock(move |actor| self.send_reusing(request, Some(actor)))
                    .await
            }
        }
    }

    /// Send `request` under explicit credentials, bypassing the actor
    /// provider. Used while credentials are being established.
    #[instrument(skip(self, request, actor), fields(request_id = %request.id, route = %request.route))]
    pub async fn send_as(&self, request: Request, actor: AuthenticatedActor) -> Result<Response> {
        self.dispatch(request, Some(actor)).await
    }

    /// Re-send every persisted request that is not already in flight.
    ///
    /// Requests are retried concurrently. Failures are collected in the
    /// report rather than aborting the whole resume, and so are records the
    /// store can no longer decode. Single-shot records are dropped.
    ///
    /// # Errors
    ///
    /// Returns `StoreIo` only if the store could not be read.
    #[instrument(skip(self))]
    pub async fn resume(&self) -> Result<ResumeReport> {
        let pending = self.store.get_all().await?;
        let mut report =
            ResumeReport { unreadable: self.store.unreadable().await?, ..ResumeReport::default() };
        for record in &report.unreadable {
            warn!(key = %record.key, error = %record.error, "stored request is unreadable");
        }

        let mut attempts = Vec::with_capacity(pending.len());
        for request in pending {
            let id = request.id;
            if self.is_in_flight(id) {
                report.skipped.push(id);
                continue;
            }
            if !request.resumable {
                match self.store.remove(id).await {
                    Ok(()) => {
                        debug!(request_id = %id, route = %request.route, "dropped single-shot request");
                        report.discarded.push(id);
                    }
                    Err(err) => report.failed.push((id, err)),
                }
                continue;
            }
            attempts.push(async move { (id, self.perform(request).await) });
        }

        info!(
            pending = attempts.len(),
            skipped = report.skipped.len(),
            discarded = report.discarded.len(),
            unreadable = report.unreadable.len(),
            "resuming persisted requests"
        );

        for (id, outcome) in join_all(attempts).await {
            match outcome {
                Ok(_) => report.completed.push(id),
                Err(err) => {
                    warn!(request_id = %id, error = %err, "resumed request failed");
                    report.failed.push((id, err));
                }
            }
        }

        info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            "resume finished"
        );
        Ok(report)
    }

    /// Tear down every in-flight attempt. Waiting callers get
    /// `Interrupted`; stored records are left for [`Self::resume`].
    ///
    /// Returns the number of attempts interrupted.
    pub fn interrupt(&self) -> usize {
        let interrupted = std::mem::take(&mut *self.in_flight.lock());
        for entry in interrupted.values() {
            entry.abort.abort();
        }

        if !interrupted.is_empty() {
            info!(count = interrupted.len(), "interrupted in-flight requests");
        }
        interrupted.len()
    }

    /// Give up on a request: stop its attempt, if any, and drop its record.
    #[instrument(skip(self))]
    pub async fn abandon(&self, id: Uuid) -> Result<()> {
        let running = self.in_flight.lock().remove(&id);
        if let Some(entry) = running {
            entry.abort.abort();
        }

        self.store.remove(id).await?;
        info!("request abandoned");
        Ok(())
    }

    /// Interrupt everything and empty the store.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        self.interrupt();
        self.store.clear().await?;
        if let Some(cache) = &self.reuse {
            cache.invalidate_all();
        }
        info!("requester cleared");
        Ok(())
    }

    /// Requests persisted and not yet completed.
    pub async fn pending(&self) -> Result<Vec<Request>> {
        self.store.get_all().await
    }

    /// Whether an attempt for `id` is running.
    pub fn is_in_flight(&self, id: Uuid) -> bool {
        self.in_flight.lock().contains_key(&id)
    }

    /// Number of attempts running.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    async fn perform(&self, request: Request) -> Result<Response> {
        match request.authentication {
            Authentication::None => self.dispatch(request, None).await,
            Authentication::Required => {
                self.lock.request_unlock(move |actor| self.dispatch(request, Some(actor))).await
            }
        }
    }

    async fn send_reusing(
        &self,
        request: Request,
        actor: Option<AuthenticatedActor>,
    ) -> Result<Response> {
        let reuse_key = self.reuse_key(&request, actor.as_ref());
        if let (Some(cache), Some(key)) = (&self.reuse, &reuse_key) {
            if let Some(response) = cache.get(key).await {
                debug!("reusing recent response");
                return Ok(response);
            }
        }

        let response = self.dispatch(request, actor).await?;

        if let (Some(cache), Some(key)) = (&self.reuse, reuse_key) {
            cache.insert(key, response.clone()).await;
        }
        Ok(response)
    }

    async fn dispatch(&self, request: Request, actor: Option<AuthenticatedActor>) -> Result<Response> {
        let id = request.id;

        let outcome = {
            let mut in_flight = self.in_flight.lock();
            if let Some(existing) = in_flight.get(&id) {
                debug!("joining in-flight attempt");
                existing.outcome.clone()
            } else {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let registry = Arc::clone(&self.in_flight);
                let store = Arc::clone(&self.store);
                let transport = Arc::clone(&self.transport);

                let task = tokio::spawn(
                    async move {
                        let _release = Release { registry, id, generation };
                        attempt(store.as_ref(), transport.as_ref(), request, actor).await
                    }
                    .in_current_span(),
                );
                let abort = task.abort_handle();

                let outcome = async move {
                    match task.await {
                        Ok(result) => result,
                        Err(err) if err.is_cancelled() => Err(PelagicError::Interrupted(id)),
                        Err(err) => {
                            error!(request_id = %id, error = %err, "request task panicked");
                            Err(PelagicError::Internal(format!("request task failed: {err}")))
                        }
                    }
                }
                .boxed()
                .shared();

                in_flight.insert(id, InFlight { outcome: outcome.clone(), abort, generation });
                outcome
            }
        };

        outcome.await
    }

    fn reuse_key(&self, request: &Request, actor: Option<&AuthenticatedActor>) -> Option<ReuseKey> {
        (self.reuse.is_some() && request.method == Method::Get).then(|| ReuseKey {
            route: request.route.clone(),
            headers: request.headers.clone(),
            account: actor.map(|actor| actor.id().to_string()),
        })
    }
}

/// Persist, send, and delete on success.
async fn attempt(
    store: &dyn RequestStore,
    transport: &dyn Transport,
    request: Request,
    actor: Option<AuthenticatedActor>,
) -> Result<Response> {
    let body = RequestBody::decode(&request.body)?;

    store.put(&request).await?;
    debug!("request persisted");

    let mut headers = request.headers.clone();
    if let Some(content_type) = body.content_type() {
        if !headers.iter().any(|(name, _)| name.eq_ignore_ascii_case("content-type")) {
            headers.push(("Content-Type".to_string(), content_type.to_string()));
        }
    }
    if let Some(actor) = &actor {
        headers.push(("Authorization".to_string(), actor.bearer()));
    }

    let response = transport
        .send(TransportRequest { method: request.method, route: request.route.clone(), headers, body })
        .await
        .inspect_err(|err| warn!(error = %err, "transport failed, request kept for resume"))?;

    if !response.is_success() {
        warn!(status = response.status, "request rejected, kept for resume");
        return Err(PelagicError::status(response.status, failure_message(&response)));
    }

    // The record is still stored, so the next resume sends it again.
    store.remove(request.id).await.map_err(|err| {
        error!(error = %err, status = response.status, "failed to delete completed request");
        PelagicError::StoreIo(format!(
            "request answered {} but its record could not be deleted: {err}",
            response.status
        ))
    })?;

    debug!(status = response.status, "request completed");
    Ok(response)
}

fn failure_message(response: &Response) -> String {
    let text = response.text();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return format!("server answered {}", response.status);
    }
    trimmed.chars().take(FAILURE_BODY_LIMIT).collect()
}

/// Removes an attempt's registry entry when its task ends, including by
/// panic or abort. A newer attempt for the same id is left alone.
struct Release {
    registry: InFlightMap,
    id: Uuid,
    generation: u64,
}

impl Drop for Release {
    fn drop(&mut self) {
        let mut registry = self.registry.lock();
        if registry.get(&self.id).is_some_and(|entry| entry.generation == self.generation) {
            registry.remove(&self.id);
        }
    }
}

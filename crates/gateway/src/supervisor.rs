//! Session Supervisor (spec section 4.3): the per-tenant state machine,
//! reconnect policy, and status-change subscription API.
//!
//! Per-tenant state ownership follows spec.md section 9's design note:
//! each session gets an owning task (`SessionActor`) and a bounded inbox
//! of commands, replacing the source's ad-hoc callback closures and
//! making the state machine race-free by construction — the channel
//! shape is the same `tokio::sync::mpsc` + `tokio::select!` pattern
//! `baton::session::store::spawn_cleanup_task` uses for its own
//! single-timer loop, generalized from "one ticker" to "one inbox plus
//! one provider-event stream".

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use patch::GatewayConfig;
use rand::Rng;
use signal::{ErrorClass, FallbackTriggers, ProviderKind, SendError};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use line::{SessionStatus, SessionStore, StatusCallback};

use crate::factory::ProviderFactory;
use crate::forwarder::WebhookForwarder;
use crate::poller::{self, BackendClient};
use crate::provider::{CloseCause, ConnectOutcome, EventSink, Provider, ProviderEvent};
use crate::queue::InboundQueue;
use crate::registry;
use crate::router::{self, RetryPolicy, SendRequest};

/// Reconnect attempts before a session gives up and transitions to
/// `failed` (spec section 4.3).
const MAX_RECONNECT_ATTEMPTS: u32 = 8;

/// `delay = min(60s, 2^attempts * 1s)`, jitter added separately.
fn reconnect_delay_ms(attempts: u32) -> u64 {
    let multiplier = 2u64.saturating_pow(attempts);
    (1000u64.saturating_mul(multiplier)).min(60_000)
}

fn triggers_from_config(config: &patch::FallbackTriggersConfig) -> FallbackTriggers {
    FallbackTriggers {
        timeout: config.timeout,
        rate_limit: config.rate_limit,
        template_error: config.template_error,
        server_error: config.server_error,
    }
}

/// Internal command inbox, per spec.md section 9's "bounded inbox of
/// commands" note. `ProviderEvent`s arrive on a separate unbounded
/// channel owned by the same actor rather than as a command variant, so
/// a provider never blocks on a full inbox while emitting inbound
/// messages.
enum SessionCommand {
    Send {
        request: SendRequest,
        respond_to: oneshot::Sender<Result<crate::provider::SendOutcome, SendError>>,
    },
    Disconnect {
        respond_to: oneshot::Sender<()>,
    },
    Reconnect,
}

struct TenantHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
}

/// Owns every per-tenant actor and the process-wide collaborators
/// (config, session store, inbound queue, forwarder, backend client,
/// provider factory) they share, following spec.md section 9's "keep
/// registries process-global but behind explicit interfaces, construct
/// at startup, pass as dependencies" guidance.
pub struct GatewaySupervisor {
    pub(crate) config: Arc<GatewayConfig>,
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) queue: Arc<InboundQueue>,
    pub(crate) forwarder: Arc<WebhookForwarder>,
    pub(crate) backend: Arc<BackendClient>,
    pub(crate) factory: Arc<dyn ProviderFactory>,
    actors: DashMap<String, TenantHandle>,
}

impl GatewaySupervisor {
    pub fn new(
        config: Arc<GatewayConfig>,
        store: Arc<dyn SessionStore>,
        queue: Arc<InboundQueue>,
        forwarder: Arc<WebhookForwarder>,
        backend: Arc<BackendClient>,
        factory: Arc<dyn ProviderFactory>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            queue,
            forwarder,
            backend,
            factory,
            actors: DashMap::new(),
        })
    }

    /// Per spec.md section 4.3: if the existing session is already
    /// `connected`, return it unmodified. If an actor is already running
    /// for this tenant (connecting, reconnecting, qr_ready, ...), this is
    /// a no-op — the actor already owns the state machine. Otherwise,
    /// build a fresh record in `initializing` and spawn its actor.
    pub async fn create_session(self: &Arc<Self>, tenant_id: &str) {
        if let Some(session) = self.store.get(tenant_id) {
            if session.status == SessionStatus::Connected {
                return;
            }
        }
        if self.actors.contains_key(tenant_id) {
            return;
        }

        self.store.get_or_create(tenant_id);
        self.store.notify(tenant_id);

        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        self.actors.insert(tenant_id.to_string(), TenantHandle { cmd_tx: cmd_tx.clone() });

        let actor = SessionActor::new(tenant_id.to_string(), self.clone(), cmd_tx, cmd_rx);
        tokio::spawn(actor.run());
    }

    /// Stop poller, cancel reconnect timer, disconnect every provider,
    /// drop the session record and its subscribers, emit final
    /// `disconnected`.
    pub async fn disconnect_session(&self, tenant_id: &str) {
        let handle = self.actors.remove(tenant_id).map(|(_, h)| h);
        match handle {
            Some(handle) => {
                let (tx, rx) = oneshot::channel();
                if handle.cmd_tx.send(SessionCommand::Disconnect { respond_to: tx }).await.is_ok() {
                    let _ = rx.await;
                }
            }
            None => {
                // No running actor (already torn down, or never started):
                // still clear any residual record.
                self.store.remove(tenant_id);
            }
        }
    }

    /// Dispatch a send through the tenant's actor, which serializes it
    /// against that tenant's other state mutations per spec.md section 5.
    pub async fn send(&self, tenant_id: &str, request: SendRequest) -> Result<crate::provider::SendOutcome, SendError> {
        let cmd_tx = {
            let handle = self.actors.get(tenant_id);
            match handle {
                Some(handle) => handle.cmd_tx.clone(),
                None => return Err(SendError::new(ErrorClass::Other, "session_not_found")),
            }
        };

        let (tx, rx) = oneshot::channel();
        cmd_tx
            .send(SessionCommand::Send { request, respond_to: tx })
            .await
            .map_err(|_| SendError::new(ErrorClass::Other, "session actor no longer running"))?;
        rx.await.map_err(|_| SendError::new(ErrorClass::Other, "session actor dropped its response"))?
    }

    pub fn subscribe(&self, tenant_id: &str, callback: StatusCallback) -> u64 {
        self.store.subscribe(tenant_id, callback)
    }

    pub fn unsubscribe(&self, tenant_id: &str, subscriber_id: u64) {
        self.store.unsubscribe(tenant_id, subscriber_id);
    }

    pub fn has_active_session(&self, tenant_id: &str) -> bool {
        self.actors.contains_key(tenant_id)
    }

    /// Walks the auth-root directory (one subdirectory per tenant) and
    /// calls `create_session` on each with a 2 s spacing, per spec.md
    /// section 4.3.
    pub async fn reconnect_existing_sessions(self: &Arc<Self>) {
        let root = self.config.paths.auth_root.clone();
        let tenant_ids = tokio::task::spawn_blocking(move || {
            if !root.exists() {
                return Vec::new();
            }
            walkdir::WalkDir::new(&root)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_dir())
                .filter_map(|entry| entry.file_name().to_str().map(|s| s.to_string()))
                .collect::<Vec<_>>()
        })
        .await
        .unwrap_or_default();

        tracing::info!(count = tenant_ids.len(), "reconnecting existing sessions from auth root");
        for tenant_id in tenant_ids {
            self.create_session(&tenant_id).await;
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }

    /// Janitor sweep (spec section 5): disconnect sessions in `failed`
    /// and sessions stuck in `initializing` longer than 30 min.
    pub async fn sweep_stuck_sessions(&self) {
        const STUCK_INITIALIZING: Duration = Duration::from_secs(30 * 60);

        for tenant_id in self.store.tenant_ids() {
            let stuck = self
                .store
                .get(&tenant_id)
                .map(|session| {
                    session.status == SessionStatus::Failed
                        || (session.status == SessionStatus::Initializing && session.idle_duration() > STUCK_INITIALIZING)
                })
                .unwrap_or(false);

            if stuck {
                tracing::info!(tenant_id, "janitor disconnecting stuck session");
                self.disconnect_session(&tenant_id).await;
            }
        }
    }
}

/// Spawn the periodic janitor task (spec section 5: every 10 min).
pub fn spawn_janitor(supervisor: Arc<GatewaySupervisor>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(600));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("janitor task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    supervisor.sweep_stuck_sessions().await;
                }
            }
        }
    })
}

/// The actor owning one tenant's `Session` state machine, mutations, and
/// live provider set.
struct SessionActor {
    tenant_id: String,
    supervisor: Arc<GatewaySupervisor>,
    cmd_tx: mpsc::Sender<SessionCommand>,
    cmd_rx: mpsc::Receiver<SessionCommand>,
    event_tx: mpsc::UnboundedSender<ProviderEvent>,
    event_rx: mpsc::UnboundedReceiver<ProviderEvent>,
    generation: Arc<AtomicU64>,
    providers: HashMap<ProviderKind, Arc<dyn Provider>>,
    active_candidate: Option<ProviderKind>,
    reconnect_handle: Option<tokio::task::JoinHandle<()>>,
    poller_cancel: Option<CancellationToken>,
}

impl SessionActor {
    fn new(
        tenant_id: String,
        supervisor: Arc<GatewaySupervisor>,
        cmd_tx: mpsc::Sender<SessionCommand>,
        cmd_rx: mpsc::Receiver<SessionCommand>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            tenant_id,
            supervisor,
            cmd_tx,
            cmd_rx,
            event_tx,
            event_rx,
            generation: Arc::new(AtomicU64::new(0)),
            providers: HashMap::new(),
            active_candidate: None,
            reconnect_handle: None,
            poller_cancel: None,
        }
    }

    async fn run(mut self) {
        self.attempt_connect_sequence().await;

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(SessionCommand::Send { request, respond_to }) => {
                            let result = self.handle_send(request).await;
                            let _ = respond_to.send(result);
                        }
                        Some(SessionCommand::Disconnect { respond_to }) => {
                            self.teardown(true).await;
                            let _ = respond_to.send(());
                            break;
                        }
                        Some(SessionCommand::Reconnect) => {
                            self.attempt_connect_sequence().await;
                        }
                        None => break,
                    }
                }
                event = self.event_rx.recv() => {
                    if let Some(event) = event {
                        let should_stop = self.handle_provider_event(event).await;
                        if should_stop {
                            break;
                        }
                    }
                }
            }
        }

        self.supervisor.actors.remove(&self.tenant_id);
        tracing::info!(tenant_id = %self.tenant_id, "session actor exiting");
    }

    /// Try providers in priority order, stopping at the first that
    /// resolves `connected` or `qr_ready` (spec section 4.3 step 3).
    async fn attempt_connect_sequence(&mut self) {
        let priority = registry::priority(&self.supervisor.config.provider);

        for kind in priority {
            let sink = EventSink::new(self.event_tx.clone(), self.generation.clone());
            let provider = self.supervisor.factory.build(kind, &self.supervisor.config, sink);
            self.active_candidate = Some(kind);

            match provider.connect().await {
                Ok(ConnectOutcome::Connected { phone_identity }) => {
                    self.providers.insert(kind, provider);
                    self.mark_connected(kind, phone_identity);
                    self.start_poller();
                    self.schedule_queue_drain();
                    return;
                }
                Ok(ConnectOutcome::QrReady { payload }) => {
                    self.providers.insert(kind, provider);
                    self.mark_qr_ready(payload);
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        tenant_id = %self.tenant_id,
                        provider = %kind,
                        error = %e,
                        "provider failed to connect, trying next"
                    );
                    continue;
                }
            }
        }

        self.active_candidate = None;
        tracing::warn!(tenant_id = %self.tenant_id, "no provider resolved during session creation");
    }

    fn mark_connected(&self, kind: ProviderKind, phone_identity: Option<String>) {
        if let Some(mut session) = self.supervisor.store.get_mut(&self.tenant_id) {
            session.mark_connected(kind, phone_identity);
        }
        self.supervisor.store.notify(&self.tenant_id);
    }

    fn mark_qr_ready(&self, payload: String) {
        if let Some(mut session) = self.supervisor.store.get_mut(&self.tenant_id) {
            session.mark_qr_ready(payload);
        }
        self.supervisor.store.notify(&self.tenant_id);
    }

    fn start_poller(&mut self) {
        if self.poller_cancel.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        self.poller_cancel = Some(cancel.clone());

        let tenant_id = self.tenant_id.clone();
        let backend = self.supervisor.backend.clone();
        let supervisor = self.supervisor.clone();
        let interval = Duration::from_millis(self.supervisor.config.polling.interval_ms);

        poller::spawn_poller(
            tenant_id.clone(),
            interval,
            backend,
            move |to, text, _opaque_address| {
                let supervisor = supervisor.clone();
                let tenant_id = tenant_id.clone();
                async move {
                    let request = SendRequest::Text { to, text };
                    supervisor
                        .send(&tenant_id, request)
                        .await
                        .map(|outcome| outcome.message_id)
                        .map_err(|e| e.message)
                }
            },
            cancel,
        );
    }

    fn stop_poller(&mut self) {
        if let Some(cancel) = self.poller_cancel.take() {
            cancel.cancel();
        }
    }

    /// Schedule a queue drain 2 s after entering `connected` (spec
    /// section 4.7).
    fn schedule_queue_drain(&self) {
        let forwarder = self.supervisor.forwarder.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            forwarder.process_queue().await;
        });
    }

    /// Returns `true` if the actor should stop after this event (the
    /// session entered a terminal, torn-down state).
    async fn handle_provider_event(&mut self, event: ProviderEvent) -> bool {
        match event {
            ProviderEvent::Qr(payload) => {
                self.mark_qr_ready(payload);
                false
            }
            ProviderEvent::Inbound(message) => {
                // Forwarded in-line so inbound order for this tenant is
                // preserved (spec section 5); cross-tenant throughput is
                // unaffected since each tenant has its own actor task.
                self.supervisor.forwarder.forward(&message, false).await;
                false
            }
            ProviderEvent::StatusChange { connected, cause } => {
                if connected {
                    if let Some(kind) = self.active_candidate {
                        let phone_identity = self.providers.get(&kind).and_then(|p| p.phone_identity());
                        self.mark_connected(kind, phone_identity);
                        self.start_poller();
                        self.schedule_queue_drain();
                    }
                    false
                } else {
                    self.handle_close(cause).await
                }
            }
        }
    }

    /// Maps a provider connection-close cause to a state transition, per
    /// spec.md section 7: `logged_out` purges credentials and is
    /// terminal; `bad_session` purges credentials and resets the
    /// reconnect budget; anything else just reconnects.
    async fn handle_close(&mut self, cause: Option<CloseCause>) -> bool {
        self.stop_poller();

        match cause {
            Some(CloseCause::LoggedOut) => {
                if let Some(mut session) = self.supervisor.store.get_mut(&self.tenant_id) {
                    session.mark_logged_out();
                }
                self.supervisor.store.notify(&self.tenant_id);
                tracing::info!(tenant_id = %self.tenant_id, "session logged out, not reconnecting");
                self.teardown(false).await;
                true
            }
            Some(CloseCause::BadSession) => {
                if let Some(mut session) = self.supervisor.store.get_mut(&self.tenant_id) {
                    session.reconnect_attempts = 0;
                }
                self.schedule_reconnect().await;
                false
            }
            Some(CloseCause::Other) | None => {
                self.schedule_reconnect().await;
                false
            }
        }
    }

    /// Bump the generation (stale events from the now-discarded provider
    /// instances are dropped by `EventSink::send`), clear the provider
    /// set, transition to `reconnecting`, and schedule the next attempt
    /// with exponential backoff plus additive jitter — or give up if the
    /// attempt budget is exhausted.
    async fn schedule_reconnect(&mut self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.providers.clear();
        self.active_candidate = None;

        let attempts = {
            let Some(mut session) = self.supervisor.store.get_mut(&self.tenant_id) else {
                return;
            };
            session.mark_reconnecting();
            session.reconnect_attempts
        };
        self.supervisor.store.notify(&self.tenant_id);

        if attempts >= MAX_RECONNECT_ATTEMPTS {
            if let Some(mut session) = self.supervisor.store.get_mut(&self.tenant_id) {
                session.mark_failed();
            }
            self.supervisor.store.notify(&self.tenant_id);
            tracing::warn!(tenant_id = %self.tenant_id, attempts, "reconnect attempts exhausted, session failed");
            return;
        }

        let base_delay = reconnect_delay_ms(attempts);
        let jitter_ms = rand::thread_rng().gen_range(0..=(base_delay * 30 / 100));
        let delay = Duration::from_millis(base_delay + jitter_ms);

        if let Some(handle) = self.reconnect_handle.take() {
            handle.abort();
        }

        let cmd_tx = self.cmd_tx.clone();
        tracing::info!(tenant_id = %self.tenant_id, attempts, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
        self.reconnect_handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = cmd_tx.send(SessionCommand::Reconnect).await;
        }));
    }

    async fn handle_send(&mut self, request: SendRequest) -> Result<crate::provider::SendOutcome, SendError> {
        let active_provider = self.supervisor.store.get(&self.tenant_id).and_then(|s| s.active_provider);
        let priority = registry::priority(&self.supervisor.config.provider);
        let policy = RetryPolicy::from(&self.supervisor.config.fallback);
        let triggers = triggers_from_config(&self.supervisor.config.fallback.triggers);

        let result = router::route_send(&self.providers, active_provider, &priority, policy, triggers, request).await;

        let observed_kind = match &result {
            Ok(outcome) => Some(outcome.provider),
            Err(_) => active_provider,
        };
        if let Some(kind) = observed_kind {
            self.sync_provider_health(kind);
        }

        result
    }

    /// Copy a provider's running health counters onto the `Session`
    /// record so the admin surface can read them without touching the
    /// live provider (spec section 4.1).
    fn sync_provider_health(&self, kind: ProviderKind) {
        let Some(provider) = self.providers.get(&kind) else {
            return;
        };
        let health = provider.health_metrics();
        if let Some(mut session) = self.supervisor.store.get_mut(&self.tenant_id) {
            session.providers.insert(kind, health);
        }
    }

    /// Cancel the reconnect timer and poller, disconnect every provider,
    /// and drop the session record. `set_disconnected` is false when the
    /// caller already set a terminal status (`logged_out`) that teardown
    /// must not overwrite.
    async fn teardown(&mut self, set_disconnected: bool) {
        if let Some(handle) = self.reconnect_handle.take() {
            handle.abort();
        }
        self.stop_poller();
        self.generation.fetch_add(1, Ordering::AcqRel);

        for provider in self.providers.values() {
            provider.disconnect().await;
        }
        self.providers.clear();

        if set_disconnected {
            if let Some(mut session) = self.supervisor.store.get_mut(&self.tenant_id) {
                session.mark_disconnected();
            }
            self.supervisor.store.notify(&self.tenant_id);
        }

        self.supervisor.store.remove(&self.tenant_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_delay_matches_exponential_formula() {
        assert_eq!(reconnect_delay_ms(0), 1000);
        assert_eq!(reconnect_delay_ms(1), 2000);
        assert_eq!(reconnect_delay_ms(4), 16_000);
    }

    #[test]
    fn reconnect_delay_caps_at_sixty_seconds() {
        assert_eq!(reconnect_delay_ms(8), 60_000);
        assert_eq!(reconnect_delay_ms(20), 60_000);
    }

    #[tokio::test]
    async fn create_session_with_no_providers_leaves_initializing() {
        let config = Arc::new(GatewayConfig::default());
        let store: Arc<dyn SessionStore> = line::InMemorySessionStore::new_shared();
        let dir = tempfile::tempdir().unwrap();
        let queue = InboundQueue::load(dir.path().join("queue.json"));
        let forwarder = Arc::new(WebhookForwarder::new(None, queue.clone()));
        let backend = Arc::new(BackendClient::new(None, None));
        let factory: Arc<dyn ProviderFactory> = Arc::new(crate::factory::DefaultProviderFactory);

        // Both providers disabled: priority() is empty, so the actor
        // tries nothing and the session stays `initializing`.
        let mut cfg = (*config).clone();
        cfg.provider.p1_enabled = false;
        cfg.provider.p2_enabled = false;
        let config = Arc::new(cfg);

        let supervisor = GatewaySupervisor::new(config, store.clone(), queue, forwarder, backend, factory);
        supervisor.create_session("tenant-a").await;

        // Give the spawned actor a moment to run its connect sequence.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let session = store.get("tenant-a").unwrap();
        assert_eq!(session.status, SessionStatus::Initializing);
    }

    #[tokio::test]
    async fn disconnect_session_without_running_actor_is_a_no_op() {
        let config = Arc::new(GatewayConfig::default());
        let store: Arc<dyn SessionStore> = line::InMemorySessionStore::new_shared();
        let dir = tempfile::tempdir().unwrap();
        let queue = InboundQueue::load(dir.path().join("queue.json"));
        let forwarder = Arc::new(WebhookForwarder::new(None, queue.clone()));
        let backend = Arc::new(BackendClient::new(None, None));
        let factory: Arc<dyn ProviderFactory> = Arc::new(crate::factory::DefaultProviderFactory);

        let supervisor = GatewaySupervisor::new(config, store.clone(), queue, forwarder, backend, factory);
        supervisor.disconnect_session("never-existed").await;
        assert!(store.get("never-existed").is_none());
    }

    #[tokio::test]
    async fn send_to_unknown_tenant_fails_session_not_found() {
        let config = Arc::new(GatewayConfig::default());
        let store: Arc<dyn SessionStore> = line::InMemorySessionStore::new_shared();
        let dir = tempfile::tempdir().unwrap();
        let queue = InboundQueue::load(dir.path().join("queue.json"));
        let forwarder = Arc::new(WebhookForwarder::new(None, queue.clone()));
        let backend = Arc::new(BackendClient::new(None, None));
        let factory: Arc<dyn ProviderFactory> = Arc::new(crate::factory::DefaultProviderFactory);

        let supervisor = GatewaySupervisor::new(config, store, queue, forwarder, backend, factory);
        let err = supervisor
            .send("ghost", SendRequest::Text { to: "+1555".into(), text: "hi".into() })
            .await
            .unwrap_err();
        assert_eq!(err.class, ErrorClass::Other);
    }
}

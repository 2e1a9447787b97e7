//! Outbound Poller (spec section 4.6): a per-tenant jittered ticker that
//! pulls pending messages from the application backend and dispatches
//! them through the Send Router.
//!
//! Grounded directly on `holler::heartbeat::spawn_heartbeat_task`'s
//! `tokio::time::interval` + `tokio::select!` shutdown-channel shape,
//! generalized from "send one heartbeat" to "pull pending messages,
//! dispatch each through the send router, ack status". The `isPolling`
//! overlap guard is an `AtomicBool` checked at tick start, the same
//! lock-free-read technique `HealthTracker` uses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use signal::{BackendAck, BackendPendingResponse};
use tokio_util::sync::CancellationToken;

const BACKEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin client over the application backend's pull/ack endpoints.
pub struct BackendClient {
    client: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
}

impl BackendClient {
    pub fn new(base_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {key}")),
            None => builder,
        }
    }

    /// GET pending-messages for one tenant. Network timeouts and
    /// connection refusals are treated as silent (spec section 4.6) —
    /// they simply produce no messages this tick.
    pub async fn pending_messages(&self, tenant_id: &str) -> Vec<signal::BackendPendingMessage> {
        let Some(base_url) = &self.base_url else {
            return Vec::new();
        };

        let request = self.request(
            self.client
                .get(format!("{base_url}/pending-messages"))
                .query(&[("tenantId", tenant_id)])
                .timeout(BACKEND_TIMEOUT),
        );

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<BackendPendingResponse>().await {
                    Ok(parsed) => parsed.messages,
                    Err(e) => {
                        tracing::warn!(tenant_id, error = %e, "backend pending-messages response decode failed");
                        Vec::new()
                    }
                }
            }
            Ok(response) => {
                tracing::warn!(tenant_id, status = %response.status(), "backend pending-messages returned non-success");
                Vec::new()
            }
            Err(e) if e.is_timeout() || e.is_connect() => {
                tracing::debug!(tenant_id, "backend pending-messages unreachable, skipping tick");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(tenant_id, error = %e, "backend pending-messages request failed");
                Vec::new()
            }
        }
    }

    /// POST mark-sent. Best-effort: failures are logged, never retried
    /// from here (the backend owns redelivery of its own pull queue).
    pub async fn mark_sent(&self, ack: &BackendAck) {
        let Some(base_url) = &self.base_url else {
            return;
        };

        let request = self.request(
            self.client
                .post(format!("{base_url}/mark-sent"))
                .timeout(BACKEND_TIMEOUT)
                .json(ack),
        );

        if let Err(e) = request.send().await {
            tracing::warn!(ids = ?ack.ids, error = %e, "backend mark-sent request failed");
        }
    }
}

/// One poller tick: pull pending messages, dispatch each via `send_one`,
/// ack status. `send_one` is injected so the poller never depends
/// directly on the supervisor/router — it only needs "try to deliver
/// this message, tell me the provider message id or the failure".
pub async fn run_tick<F, Fut>(tenant_id: &str, backend: &BackendClient, send_one: F)
where
    F: Fn(String, String, Option<String>) -> Fut,
    Fut: std::future::Future<Output = Result<String, String>>,
{
    let pending = backend.pending_messages(tenant_id).await;
    for message in pending {
        let opaque = message.is_lid.then(|| message.lid_id.clone()).flatten();
        let result = send_one(message.phone_number.clone(), message.content.clone(), opaque).await;
        let ack = match result {
            Ok(provider_message_id) => BackendAck::sent(&message.id, provider_message_id),
            Err(error) => BackendAck::failed(&message.id, error),
        };
        backend.mark_sent(&ack).await;
    }
}

/// Spawn the per-tenant poller task. Ticks are jittered uniform in
/// `[0, 20% of interval]` to decorrelate tenants ("anti-thundering-herd");
/// an `AtomicBool` overlap guard skips a tick if the previous one hasn't
/// finished.
pub fn spawn_poller<F, Fut>(
    tenant_id: String,
    interval: Duration,
    backend: Arc<BackendClient>,
    send_one: F,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()>
where
    F: Fn(String, String, Option<String>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<String, String>> + Send,
{
    let is_polling = Arc::new(AtomicBool::new(false));

    tokio::spawn(async move {
        let jitter_max_ms = (interval.as_millis() as f64 * 0.20) as u64;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(tenant_id, "outbound poller shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if jitter_max_ms > 0 {
                        let jitter = rand::thread_rng().gen_range(0..=jitter_max_ms);
                        tokio::time::sleep(Duration::from_millis(jitter)).await;
                    }

                    if is_polling.swap(true, Ordering::AcqRel) {
                        tracing::debug!(tenant_id, "skipping poll tick, previous tick still in flight");
                        continue;
                    }

                    run_tick(&tenant_id, &backend, &send_one).await;
                    is_polling.store(false, Ordering::Release);
                }
            }
        }
    })
}

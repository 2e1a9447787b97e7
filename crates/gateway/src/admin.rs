//! Admin HTTP surface (spec section 6): tenant lifecycle, send, queue
//! drain, and the P1 webhook subscription/delivery endpoints.
//!
//! Grounded on `holler::serve::run`'s `Router::new().route(...).with_state(state)`
//! plus graceful-shutdown-on-signal shape; generalized from holler's
//! fixed MCP/SSE/health routes to the gateway's tenant-scoped surface.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::ApiError;
use crate::provider::MediaPayload;
use crate::router::SendRequest;
use crate::supervisor::GatewaySupervisor;

#[derive(Clone)]
pub struct AdminState {
    pub supervisor: Arc<GatewaySupervisor>,
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tenants/{tenant_id}/status", get(tenant_status))
        .route("/tenants/{tenant_id}/send", post(tenant_send))
        .route("/tenants/{tenant_id}/disconnect", post(tenant_disconnect))
        .route("/queue/drain", post(queue_drain))
        .route("/webhooks/platform", get(webhook_verify).post(webhook_receive))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProviderHealthView {
    connected: bool,
    success_count: u64,
    failure_count: u64,
    avg_response_time_ms: f64,
}

impl From<&line::ProviderHealth> for ProviderHealthView {
    fn from(health: &line::ProviderHealth) -> Self {
        Self {
            connected: health.connected,
            success_count: health.success_count,
            failure_count: health.failure_count,
            avg_response_time_ms: health.avg_response_time_ms,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TenantStatusResponse {
    tenant_id: String,
    status: String,
    active_provider: Option<String>,
    phone_identity: Option<String>,
    qr_payload: Option<String>,
    reconnect_attempts: u32,
    providers: HashMap<String, ProviderHealthView>,
}

/// Per spec.md section 9: a tenant with no session returns `200` with
/// `{"tenantId", "status": "not_found"}` instead of a literal `404` — the
/// response shape is uniform whether or not the tenant exists.
async fn tenant_status(State(state): State<AdminState>, Path(tenant_id): Path<String>) -> impl IntoResponse {
    let Some(session) = state.supervisor.store.get(&tenant_id) else {
        return Json(serde_json::json!({ "tenantId": tenant_id, "status": "not_found" }));
    };

    let providers = session
        .providers
        .iter()
        .map(|(kind, health)| (kind.as_str().to_string(), ProviderHealthView::from(health)))
        .collect();

    Json(serde_json::to_value(TenantStatusResponse {
        tenant_id: session.tenant_id.clone(),
        status: session.status.as_str().to_string(),
        active_provider: session.active_provider.map(|p| p.as_str().to_string()),
        phone_identity: session.phone_identity.clone(),
        qr_payload: session.qr_payload.clone(),
        reconnect_attempts: session.reconnect_attempts,
        providers,
    })
    .expect("TenantStatusResponse always serializes"))
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SendRequestBody {
    Text { to: String, text: String },
    Template { to: String, name: String, params: Value, language: String },
    Media { to: String, media: MediaPayload },
}

impl From<SendRequestBody> for SendRequest {
    fn from(body: SendRequestBody) -> Self {
        match body {
            SendRequestBody::Text { to, text } => SendRequest::Text { to, text },
            SendRequestBody::Template { to, name, params, language } => {
                SendRequest::Template { to, name, params, language }
            }
            SendRequestBody::Media { to, media } => SendRequest::Media { to, media },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    message_id: String,
    provider: String,
}

async fn tenant_send(
    State(state): State<AdminState>,
    Path(tenant_id): Path<String>,
    Json(body): Json<SendRequestBody>,
) -> Result<Json<SendResponse>, ApiError> {
    let outcome = state.supervisor.send(&tenant_id, body.into()).await?;
    Ok(Json(SendResponse {
        message_id: outcome.message_id,
        provider: outcome.provider.as_str().to_string(),
    }))
}

async fn tenant_disconnect(State(state): State<AdminState>, Path(tenant_id): Path<String>) -> impl IntoResponse {
    state.supervisor.disconnect_session(&tenant_id).await;
    Json(serde_json::json!({ "tenantId": tenant_id, "status": "disconnected" }))
}

async fn queue_drain(State(state): State<AdminState>) -> impl IntoResponse {
    state.supervisor.forwarder.process_queue().await;
    Json(serde_json::json!({ "remaining": state.supervisor.queue.len() }))
}

#[derive(Deserialize)]
struct WebhookVerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// Subscription verification handshake for the official platform's
/// webhook (spec section 6): echo `hub.challenge` when `hub.mode` is
/// `subscribe` and `hub.verify_token` matches configuration, else 403.
async fn webhook_verify(State(state): State<AdminState>, Query(query): Query<WebhookVerifyQuery>) -> impl IntoResponse {
    let configured = state.supervisor.config.webhook.verify_token.as_deref();
    let matches = query.mode.as_deref() == Some("subscribe")
        && configured.is_some()
        && query.verify_token.as_deref() == configured;

    if matches {
        (StatusCode::OK, query.challenge.unwrap_or_default()).into_response()
    } else {
        StatusCode::FORBIDDEN.into_response()
    }
}

/// Inbound webhook delivery. The wire format of any concrete provider's
/// webhook body is out of scope (spec section 1 Non-goals), so this
/// handler does not attempt to parse or normalize it — it only
/// acknowledges receipt. A deployment that needs real P1 inbound
/// delivery supplies that normalization in front of this endpoint, or
/// this handler grows a body parser scoped to that deployment's
/// concrete platform contract.
async fn webhook_receive(Json(_body): Json<Value>) -> impl IntoResponse {
    StatusCode::OK
}

/// Shutdown signal shared with `main`: ctrl-c or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

/// Serve the admin surface, stopping gracefully on signal or when the
/// process-wide cancellation token fires (spec section 4's 30 s hard
/// shutdown timeout is enforced by the caller in `main`).
pub async fn serve(addr: std::net::SocketAddr, state: AdminState) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "admin surface listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::DefaultProviderFactory;
    use crate::forwarder::WebhookForwarder;
    use crate::poller::BackendClient;
    use crate::queue::InboundQueue;
    use line::SessionStore;
    use patch::GatewayConfig;

    fn admin_state() -> (AdminState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(GatewayConfig::default());
        let store: Arc<dyn SessionStore> = line::InMemorySessionStore::new_shared();
        let queue = InboundQueue::load(dir.path().join("queue.json"));
        let forwarder = Arc::new(WebhookForwarder::new(None, queue.clone()));
        let backend = Arc::new(BackendClient::new(None, None));
        let factory = Arc::new(DefaultProviderFactory);
        let supervisor = GatewaySupervisor::new(config, store, queue, forwarder, backend, factory);
        (AdminState { supervisor }, dir)
    }

    #[tokio::test]
    async fn status_for_unknown_tenant_is_200_not_found() {
        let (state, _dir) = admin_state();
        let response = tenant_status(State(state), Path("ghost".to_string())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn webhook_verify_rejects_missing_token() {
        let (state, _dir) = admin_state();
        let query = WebhookVerifyQuery {
            mode: Some("subscribe".to_string()),
            verify_token: Some("wrong".to_string()),
            challenge: Some("abc".to_string()),
        };
        let response = webhook_verify(State(state), Query(query)).await.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn webhook_verify_echoes_challenge_on_match() {
        let (mut state, _dir) = admin_state();
        let mut config = (*state.supervisor.config).clone();
        config.webhook.verify_token = Some("secret".to_string());
        let config = Arc::new(config);
        state.supervisor = GatewaySupervisor::new(
            config,
            line::InMemorySessionStore::new_shared(),
            state.supervisor.queue.clone(),
            state.supervisor.forwarder.clone(),
            state.supervisor.backend.clone(),
            state.supervisor.factory.clone(),
        );

        let query = WebhookVerifyQuery {
            mode: Some("subscribe".to_string()),
            verify_token: Some("secret".to_string()),
            challenge: Some("xyz".to_string()),
        };
        let response = webhook_verify(State(state), Query(query)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

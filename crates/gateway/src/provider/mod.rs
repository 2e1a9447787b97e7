//! The Provider abstract contract (spec section 4.1).
//!
//! A tagged variant plus a shared health-metrics helper, per the design
//! note against modelling providers via inheritance: `P1HttpProvider` and
//! `P2SocketProvider` both implement [`Provider`], and
//! `signal::capability::Capabilities` carries the static capability
//! differences between them.

pub mod http;
pub mod socket;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use line::ProviderHealth;
use signal::{Capabilities, ErrorClass, NormalizedInboundMessage, ProviderKind, SendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub use http::P1HttpProvider;
pub use socket::{MockSocketTransport, P2SocketProvider, SocketTransport};

/// A media attachment for `sendMedia`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaPayload {
    pub url: String,
    pub mime_type: Option<String>,
    pub caption: Option<String>,
}

/// Result of a successful `connect()`.
#[derive(Debug, Clone)]
pub enum ConnectOutcome {
    Connected { phone_identity: Option<String> },
    QrReady { payload: String },
}

/// Result of a successful send.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub message_id: String,
    pub provider: ProviderKind,
}

/// Why a provider's connection closed, mapped by the Supervisor to a
/// state transition (spec section 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCause {
    LoggedOut,
    BadSession,
    Other,
}

/// Events a provider emits asynchronously after construction. Providers
/// receive an [`EventSink`] at construction time rather than taking
/// callback closures, so the supervisor can invalidate a torn-down
/// provider's events by bumping a generation counter instead of juggling
/// closure-captured back-references (spec section 9).
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    Qr(String),
    Inbound(NormalizedInboundMessage),
    StatusChange { connected: bool, cause: Option<CloseCause> },
}

/// Per-session event channel, tagged with a generation token.
///
/// `send` is a no-op once the owning supervisor has bumped the
/// generation past what this sink was handed, which is how late events
/// from a provider that has since been torn down are dropped.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ProviderEvent>,
    generation: Arc<AtomicU64>,
    issued_generation: u64,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<ProviderEvent>, generation: Arc<AtomicU64>) -> Self {
        let issued_generation = generation.load(Ordering::Acquire);
        Self {
            tx,
            generation,
            issued_generation,
        }
    }

    pub fn send(&self, event: ProviderEvent) {
        if self.generation.load(Ordering::Acquire) == self.issued_generation {
            let _ = self.tx.send(event);
        } else {
            tracing::debug!("dropping stale provider event from a torn-down generation");
        }
    }
}

/// The abstract contract every concrete provider implements (spec 4.1).
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn capabilities(&self) -> Capabilities {
        self.kind().capabilities()
    }

    /// Resolves `Connected` immediately (credential-based providers) or
    /// `QrReady` followed by asynchronous events delivered through the
    /// `EventSink` passed at construction. Fails with `auth_error` or
    /// `timeout` after 60s without resolution.
    async fn connect(&self) -> Result<ConnectOutcome, SendError>;

    /// Idempotent: releases I/O, cancels timers, drops event handlers.
    async fn disconnect(&self);

    async fn send_text(&self, to: &str, text: &str) -> Result<SendOutcome, SendError>;

    async fn send_template(
        &self,
        to: &str,
        name: &str,
        params: &serde_json::Value,
        language: &str,
    ) -> Result<SendOutcome, SendError>;

    async fn send_media(&self, to: &str, media: &MediaPayload) -> Result<SendOutcome, SendError>;

    fn is_healthy(&self) -> bool;

    /// A snapshot of this provider's running health counters, copied onto
    /// the `Session` record after every send so the admin surface can
    /// report it without touching the live provider object (spec 4.1).
    fn health_metrics(&self) -> ProviderHealth;

    /// Whether the provider currently believes itself connected.
    fn status(&self) -> bool;

    fn phone_identity(&self) -> Option<String>;
}

/// Classify an HTTP status code the way every concrete provider's send
/// path should: at the provider boundary, never downstream (spec 9's
/// open question about `shouldTriggerFallback` re-inspecting raw codes).
pub fn classify_http_status(status: u16, context: &str) -> SendError {
    let class = ErrorClass::from_http_status(status);
    SendError::new(class, format!("{context}: HTTP {status}"))
}

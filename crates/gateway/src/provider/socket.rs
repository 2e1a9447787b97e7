//! P2: the QR-authenticated socket provider.
//!
//! The wire protocol of concrete providers is explicitly out of scope
//! (spec section 6) and excluded from the implementation budget (spec
//! section 2), so the actual socket handshake and framing sit behind a
//! [`SocketTransport`] trait — generalized from
//! `hooteproto::lazy_pirate::LazyPirateClient`'s "common abstraction
//! implementable by different socket types" shape. A production
//! deployment supplies a real transport; tests supply
//! [`MockSocketTransport`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use signal::{ErrorClass, ProviderKind, SendError};

use super::{ConnectOutcome, EventSink, MediaPayload, Provider, ProviderEvent, SendOutcome};
use line::ProviderHealth;

/// What a socket handshake resolved to.
#[derive(Debug, Clone)]
pub enum Handshake {
    QrReady { payload: String },
    Connected { phone_identity: Option<String> },
}

/// Abstraction over the underlying QR/socket wire protocol.
#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn open(&self) -> Result<Handshake, SendError>;
    async fn send_text(&self, to: &str, text: &str) -> Result<String, SendError>;
    async fn send_media(&self, to: &str, media: &MediaPayload) -> Result<String, SendError>;
    async fn close(&self);
}

pub struct P2SocketProvider {
    transport: Arc<dyn SocketTransport>,
    event_sink: EventSink,
    connected: AtomicBool,
    phone_identity: Mutex<Option<String>>,
    health: Mutex<ProviderHealth>,
}

impl P2SocketProvider {
    pub fn new(transport: Arc<dyn SocketTransport>, event_sink: EventSink) -> Self {
        Self {
            transport,
            event_sink,
            connected: AtomicBool::new(false),
            phone_identity: Mutex::new(None),
            health: Mutex::new(ProviderHealth::default()),
        }
    }
}

#[async_trait]
impl Provider for P2SocketProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::P2
    }

    async fn connect(&self) -> Result<ConnectOutcome, SendError> {
        match self.transport.open().await? {
            Handshake::QrReady { payload } => {
                self.event_sink.send(ProviderEvent::Qr(payload.clone()));
                Ok(ConnectOutcome::QrReady { payload })
            }
            Handshake::Connected { phone_identity } => {
                self.connected.store(true, Ordering::Release);
                *self.phone_identity.lock().unwrap() = phone_identity.clone();
                self.health.lock().unwrap().connected = true;
                Ok(ConnectOutcome::Connected { phone_identity })
            }
        }
    }

    async fn disconnect(&self) {
        self.transport.close().await;
        self.connected.store(false, Ordering::Release);
        self.health.lock().unwrap().connected = false;
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<SendOutcome, SendError> {
        let result = self.transport.send_text(to, text).await;
        self.record_outcome(&result);
        result.map(|message_id| SendOutcome {
            message_id,
            provider: ProviderKind::P2,
        })
    }

    async fn send_template(
        &self,
        _to: &str,
        _name: &str,
        _params: &serde_json::Value,
        _language: &str,
    ) -> Result<SendOutcome, SendError> {
        // P2 MUST fail synchronously, non-retryable: spec section 4.1.
        Err(SendError::template_not_supported(ProviderKind::P2.as_str()))
    }

    async fn send_media(&self, to: &str, media: &MediaPayload) -> Result<SendOutcome, SendError> {
        let result = self.transport.send_media(to, media).await;
        self.record_outcome(&result);
        result.map(|message_id| SendOutcome {
            message_id,
            provider: ProviderKind::P2,
        })
    }

    fn is_healthy(&self) -> bool {
        self.health.lock().unwrap().is_healthy()
    }

    fn health_metrics(&self) -> ProviderHealth {
        self.health.lock().unwrap().clone()
    }

    fn status(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn phone_identity(&self) -> Option<String> {
        self.phone_identity.lock().unwrap().clone()
    }
}

impl P2SocketProvider {
    fn record_outcome(&self, result: &Result<String, SendError>) {
        let mut health = self.health.lock().unwrap();
        match result {
            Ok(_) => health.record_success(0),
            Err(_) => health.record_failure(),
        }
    }
}

/// Stand-in transport for deployments without a concrete P2 wire
/// implementation (spec section 1 Non-goals exclude it). Every operation
/// fails with a normalized `auth_error` rather than hanging forever, so a
/// P2-only tenant observably fails to connect instead of stalling.
pub struct UnconfiguredTransport;

#[async_trait]
impl SocketTransport for UnconfiguredTransport {
    async fn open(&self) -> Result<Handshake, SendError> {
        Err(SendError::new(
            ErrorClass::AuthError,
            "no P2 socket transport configured for this deployment",
        ))
    }

    async fn send_text(&self, _to: &str, _text: &str) -> Result<String, SendError> {
        Err(SendError::new(ErrorClass::AuthError, "no P2 socket transport configured"))
    }

    async fn send_media(&self, _to: &str, _media: &MediaPayload) -> Result<String, SendError> {
        Err(SendError::new(ErrorClass::AuthError, "no P2 socket transport configured"))
    }

    async fn close(&self) {}
}

/// Fixed-script mock transport for tests: returns queued handshake/send
/// results in order.
pub struct MockSocketTransport {
    handshake: Mutex<Option<Result<Handshake, SendError>>>,
    send_results: Mutex<Vec<Result<String, SendError>>>,
}

impl MockSocketTransport {
    pub fn new(handshake: Result<Handshake, SendError>) -> Self {
        Self {
            handshake: Mutex::new(Some(handshake)),
            send_results: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_send_result(&self, result: Result<String, SendError>) {
        self.send_results.lock().unwrap().push(result);
    }
}

#[async_trait]
impl SocketTransport for MockSocketTransport {
    async fn open(&self) -> Result<Handshake, SendError> {
        self.handshake
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(SendError::new(ErrorClass::Other, "mock exhausted")))
    }

    async fn send_text(&self, _to: &str, _text: &str) -> Result<String, SendError> {
        self.send_results
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(SendError::new(ErrorClass::Other, "mock exhausted")))
    }

    async fn send_media(&self, _to: &str, _media: &MediaPayload) -> Result<String, SendError> {
        self.send_results
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(SendError::new(ErrorClass::Other, "mock exhausted")))
    }

    async fn close(&self) {}
}

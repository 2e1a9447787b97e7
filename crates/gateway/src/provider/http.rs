//! P1: the official, credential-based HTTP provider.
//!
//! Grounded on `baton::client::streamable`'s `reqwest::Client`-plus-base-url
//! shape, generalized from an MCP transport client to a messaging
//! provider client. `connect()` resolves `Connected` synchronously since
//! P1 is credential-based (no QR handshake).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use signal::{ErrorClass, ProviderKind, SendError};

use super::{classify_http_status, ConnectOutcome, MediaPayload, Provider, SendOutcome};
use line::ProviderHealth;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct SendTextRequest<'a> {
    to: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct SendTemplateRequest<'a> {
    to: &'a str,
    template: &'a str,
    params: &'a serde_json::Value,
    language: &'a str,
}

#[derive(Debug, Serialize)]
struct SendMediaRequest<'a> {
    to: &'a str,
    media: &'a MediaPayload,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    message_id: String,
}

/// The official HTTP provider. `base_url` is injectable so tests can
/// point it at a `wiremock` server instead of the real platform.
pub struct P1HttpProvider {
    base_url: String,
    credentials: String,
    client: reqwest::Client,
    connected: AtomicBool,
    phone_identity: Mutex<Option<String>>,
    health: Mutex<ProviderHealth>,
}

impl P1HttpProvider {
    pub fn new(base_url: impl Into<String>, credentials: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            credentials: credentials.into(),
            client: reqwest::Client::new(),
            connected: AtomicBool::new(false),
            phone_identity: Mutex::new(None),
            health: Mutex::new(ProviderHealth::default()),
        }
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.credentials)
    }

    async fn send_json<T: Serialize>(&self, path: &str, body: &T) -> Result<SendOutcome, SendError> {
        let start = std::time::Instant::now();
        let result = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", self.auth_header())
            .timeout(SEND_TIMEOUT)
            .json(body)
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                self.record_failure();
                return Err(SendError::timeout(format!("P1 send timed out: {e}")));
            }
            Err(e) => {
                self.record_failure();
                return Err(SendError::new(ErrorClass::Other, format!("P1 send failed: {e}")));
            }
        };

        let status = response.status().as_u16();
        if !response.status().is_success() {
            self.record_failure();
            return Err(classify_http_status(status, "P1 send"));
        }

        let parsed: SendResponse = response
            .json()
            .await
            .map_err(|e| SendError::new(ErrorClass::Other, format!("P1 response decode failed: {e}")))?;

        self.record_success(start.elapsed().as_millis() as u64);
        Ok(SendOutcome {
            message_id: parsed.message_id,
            provider: ProviderKind::P1,
        })
    }

    fn record_success(&self, response_time_ms: u64) {
        self.health.lock().unwrap().record_success(response_time_ms);
    }

    fn record_failure(&self) {
        self.health.lock().unwrap().record_failure();
    }
}

#[async_trait]
impl Provider for P1HttpProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::P1
    }

    async fn connect(&self) -> Result<ConnectOutcome, SendError> {
        #[derive(Deserialize)]
        struct ConnectResponse {
            phone_identity: Option<String>,
        }

        let response = tokio::time::timeout(
            CONNECT_TIMEOUT,
            self.client
                .post(format!("{}/connect", self.base_url))
                .header("Authorization", self.auth_header())
                .send(),
        )
        .await
        .map_err(|_| SendError::timeout("P1 connect timed out"))?
        .map_err(|e| SendError::new(ErrorClass::Other, format!("P1 connect failed: {e}")))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(classify_http_status(status, "P1 connect"));
        }

        let parsed: ConnectResponse = response
            .json()
            .await
            .map_err(|e| SendError::new(ErrorClass::Other, format!("P1 connect response decode failed: {e}")))?;

        self.connected.store(true, Ordering::Release);
        *self.phone_identity.lock().unwrap() = parsed.phone_identity.clone();
        self.health.lock().unwrap().connected = true;

        Ok(ConnectOutcome::Connected {
            phone_identity: parsed.phone_identity,
        })
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        self.health.lock().unwrap().connected = false;
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<SendOutcome, SendError> {
        self.send_json("/messages/text", &SendTextRequest { to, text }).await
    }

    async fn send_template(
        &self,
        to: &str,
        name: &str,
        params: &serde_json::Value,
        language: &str,
    ) -> Result<SendOutcome, SendError> {
        self.send_json(
            "/messages/template",
            &SendTemplateRequest {
                to,
                template: name,
                params,
                language,
            },
        )
        .await
    }

    async fn send_media(&self, to: &str, media: &MediaPayload) -> Result<SendOutcome, SendError> {
        self.send_json("/messages/media", &SendMediaRequest { to, media }).await
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

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn connect_resolves_connected_with_phone_identity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/connect"))
            .and(header("Authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "phone_identity": "+15551234567"
            })))
            .mount(&server)
            .await;

        let provider = P1HttpProvider::new(server.uri(), "tok");
        let outcome = provider.connect().await.unwrap();
        match outcome {
            ConnectOutcome::Connected { phone_identity } => {
                assert_eq!(phone_identity.as_deref(), Some("+15551234567"));
            }
            _ => panic!("expected Connected"),
        }
        assert!(provider.is_healthy());
    }

    #[tokio::test]
    async fn send_text_classifies_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages/text"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let provider = P1HttpProvider::new(server.uri(), "tok");
        let err = provider.send_text("+1555", "hi").await.unwrap_err();
        assert_eq!(err.class, ErrorClass::RateLimit);
    }

    #[tokio::test]
    async fn send_text_success_records_health() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages/text"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message_id": "abc123"
            })))
            .mount(&server)
            .await;

        let provider = P1HttpProvider::new(server.uri(), "tok");
        let outcome = provider.send_text("+1555", "hi").await.unwrap();
        assert_eq!(outcome.message_id, "abc123");
        assert_eq!(outcome.provider, ProviderKind::P1);
    }
}

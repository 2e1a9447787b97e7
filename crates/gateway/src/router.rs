//! Send Router (spec section 4.4): capability routing, health filtering,
//! per-provider retry budget, error-class-driven failover.
//!
//! Grounded on `hooteproto::lazy_pirate`'s retry-with-backoff shape
//! (tracked health, capped backoff) generalized to route across multiple
//! candidate providers rather than retrying a single peer, together with
//! `holler::backend::BackendPool::route_tool`'s candidate-list-then-pick
//! structure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use patch::FallbackConfig as RawFallbackConfig;
use signal::{ErrorClass, FallbackTriggers, ProviderKind, SendError};

use crate::provider::{MediaPayload, Provider, SendOutcome};

/// What's being sent, independent of which provider ends up carrying it.
#[derive(Debug, Clone)]
pub enum SendRequest {
    Text { to: String, text: String },
    Template { to: String, name: String, params: serde_json::Value, language: String },
    Media { to: String, media: MediaPayload },
}

impl SendRequest {
    fn is_template(&self) -> bool {
        matches!(self, SendRequest::Template { .. })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub enabled: bool,
}

impl From<&RawFallbackConfig> for RetryPolicy {
    fn from(config: &RawFallbackConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
            enabled: config.enabled,
        }
    }
}

/// Route and dispatch a send across candidate providers, per spec 4.4.
///
/// `active_provider` and `priority` together produce the candidate order;
/// `providers` is the set installed on this session (a subset of
/// `priority`, keyed by kind).
pub async fn route_send(
    providers: &HashMap<ProviderKind, Arc<dyn Provider>>,
    active_provider: Option<ProviderKind>,
    priority: &[ProviderKind],
    policy: RetryPolicy,
    triggers: FallbackTriggers,
    request: SendRequest,
) -> Result<SendOutcome, SendError> {
    let mut candidates: Vec<ProviderKind> = active_provider.into_iter().collect();
    for &kind in priority {
        if !candidates.contains(&kind) {
            candidates.push(kind);
        }
    }
    candidates.retain(|kind| providers.contains_key(kind));

    if request.is_template() {
        if let Some(pos) = candidates.iter().position(|k| k.capabilities().supports_templates) {
            let promoted = candidates.remove(pos);
            candidates.insert(0, promoted);
        } else {
            return Err(SendError::template_not_supported("no installed provider"));
        }
    }

    if candidates.is_empty() {
        return Err(SendError::new(ErrorClass::Other, "no candidate providers available"));
    }

    let retry_budget = if policy.enabled { policy.max_retries.max(1) } else { 1 };

    let mut last_error = SendError::new(ErrorClass::Other, "no candidate providers attempted");

    for (i, kind) in candidates.iter().enumerate() {
        let more_remain = i + 1 < candidates.len();
        let provider = providers.get(kind).expect("filtered above");

        if !provider.is_healthy() && more_remain {
            continue;
        }

        for retry in 0..retry_budget {
            let outcome = dispatch(provider.as_ref(), &request).await;
            match outcome {
                Ok(result) => return Ok(result),
                Err(err) => {
                    last_error = err;
                    if last_error.class.triggers_fallback(triggers) {
                        break;
                    }
                    if !last_error.class.retryable() {
                        // Neither retryable nor fallback-triggering
                        // (e.g. invalid_phone, auth_error): spec section
                        // 4.4 says these are never retried or failed
                        // over, so surface immediately instead of
                        // letting the outer loop advance to the next
                        // candidate.
                        return Err(last_error);
                    }
                    if retry + 1 < retry_budget {
                        let delay = policy.retry_delay_ms * (retry as u64 + 1);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
        }
    }

    Err(last_error)
}

async fn dispatch(provider: &dyn Provider, request: &SendRequest) -> Result<SendOutcome, SendError> {
    match request {
        SendRequest::Text { to, text } => provider.send_text(to, text).await,
        SendRequest::Template { to, name, params, language } => {
            provider.send_template(to, name, params, language).await
        }
        SendRequest::Media { to, media } => provider.send_media(to, media).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use signal::ProviderKind::{P1, P2};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use crate::provider::ConnectOutcome;

    struct FakeProvider {
        kind: ProviderKind,
        healthy: bool,
        script: Mutex<Vec<Result<SendOutcome, SendError>>>,
        calls: AtomicU32,
    }

    impl FakeProvider {
        fn new(kind: ProviderKind, healthy: bool, script: Vec<Result<SendOutcome, SendError>>) -> Arc<dyn Provider> {
            Arc::new(Self {
                kind,
                healthy,
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Provider for FakeProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        async fn connect(&self) -> Result<ConnectOutcome, SendError> {
            unimplemented!()
        }

        async fn disconnect(&self) {}

        async fn send_text(&self, _to: &str, _text: &str) -> Result<SendOutcome, SendError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.script.lock().unwrap().remove(0)
        }

        async fn send_template(
            &self,
            _to: &str,
            _name: &str,
            _params: &serde_json::Value,
            _language: &str,
        ) -> Result<SendOutcome, SendError> {
            if self.kind == P2 {
                return Err(SendError::template_not_supported("p2"));
            }
            self.send_text(_to, _name).await
        }

        async fn send_media(&self, to: &str, _media: &MediaPayload) -> Result<SendOutcome, SendError> {
            self.send_text(to, "").await
        }

        fn is_healthy(&self) -> bool {
            self.healthy
        }

        fn health_metrics(&self) -> line::ProviderHealth {
            line::ProviderHealth {
                connected: self.healthy,
                ..Default::default()
            }
        }

        fn status(&self) -> bool {
            self.healthy
        }

        fn phone_identity(&self) -> Option<String> {
            None
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            retry_delay_ms: 1,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn timeout_falls_back_to_next_provider() {
        let p1 = FakeProvider::new(P1, true, vec![Err(SendError::timeout("slow"))]);
        let p2 = FakeProvider::new(P2, true, vec![Ok(SendOutcome { message_id: "m2".into(), provider: P2 })]);
        let mut providers = HashMap::new();
        providers.insert(P1, p1);
        providers.insert(P2, p2);

        let result = route_send(
            &providers,
            Some(P1),
            &[P1, P2],
            policy(),
            FallbackTriggers::default(),
            SendRequest::Text { to: "+1555".into(), text: "hi".into() },
        )
        .await
        .unwrap();

        assert_eq!(result.provider, P2);
    }

    #[tokio::test]
    async fn template_on_p2_only_session_fails_without_attempt() {
        let p2 = FakeProvider::new(P2, true, vec![]);
        let mut providers = HashMap::new();
        providers.insert(P2, p2);

        let err = route_send(
            &providers,
            Some(P2),
            &[P2],
            policy(),
            FallbackTriggers::default(),
            SendRequest::Template {
                to: "+1555".into(),
                name: "welcome".into(),
                params: serde_json::json!({}),
                language: "en".into(),
            },
        )
        .await
        .unwrap_err();

        assert_eq!(err.class, ErrorClass::TemplateNotSupported);
    }

    #[tokio::test]
    async fn invalid_phone_is_not_retried_or_failed_over() {
        let p1 = FakeProvider::new(
            P1,
            true,
            vec![Err(SendError::new(ErrorClass::InvalidPhone, "bad number"))],
        );
        let p2 = FakeProvider::new(P2, true, vec![Ok(SendOutcome { message_id: "m2".into(), provider: P2 })]);
        let mut providers = HashMap::new();
        providers.insert(P1, p1);
        providers.insert(P2, p2);

        let err = route_send(
            &providers,
            Some(P1),
            &[P1, P2],
            policy(),
            FallbackTriggers::default(),
            SendRequest::Text { to: "+1555".into(), text: "hi".into() },
        )
        .await
        .unwrap_err();

        assert_eq!(err.class, ErrorClass::InvalidPhone);
    }

    #[tokio::test]
    async fn unhealthy_provider_skipped_when_alternatives_exist() {
        let p1 = FakeProvider::new(P1, false, vec![]);
        let p2 = FakeProvider::new(P2, true, vec![Ok(SendOutcome { message_id: "m2".into(), provider: P2 })]);
        let mut providers = HashMap::new();
        providers.insert(P1, p1);
        providers.insert(P2, p2);

        let result = route_send(
            &providers,
            Some(P1),
            &[P1, P2],
            policy(),
            FallbackTriggers::default(),
            SendRequest::Text { to: "+1555".into(), text: "hi".into() },
        )
        .await
        .unwrap();

        assert_eq!(result.provider, P2);
    }
}

//! Turns a resolved `ProviderKind` into a live `Arc<dyn Provider>`.
//!
//! Availability/priority resolution lives in `registry`; this module is
//! the construction seam, so the supervisor never builds concrete
//! providers itself — the same separation `baton::client::McpClient`
//! draws between "which backend" and "how to connect to it".

use std::sync::Arc;

use patch::GatewayConfig;
use signal::ProviderKind;

use crate::provider::{EventSink, P1HttpProvider, P2SocketProvider, Provider};

/// A trait so tests can substitute a fake without touching real
/// HTTP/socket transports.
pub trait ProviderFactory: Send + Sync {
    fn build(&self, kind: ProviderKind, config: &GatewayConfig, sink: EventSink) -> Arc<dyn Provider>;
}

/// Builds `P1HttpProvider` from configured credentials/base URL.
///
/// P2's wire protocol is out of scope (spec section 1 Non-goals); this
/// factory wires it to a transport that never resolves past the QR
/// handshake, since no concrete socket implementation is specified. A
/// real deployment supplies its own `ProviderFactory`.
pub struct DefaultProviderFactory;

impl ProviderFactory for DefaultProviderFactory {
    fn build(&self, kind: ProviderKind, config: &GatewayConfig, sink: EventSink) -> Arc<dyn Provider> {
        match kind {
            ProviderKind::P1 => {
                let base_url = config.provider.p1_base_url.clone().unwrap_or_default();
                let credentials = config.provider.p1_credentials.clone().unwrap_or_default();
                Arc::new(P1HttpProvider::new(base_url, credentials))
            }
            ProviderKind::P2 => {
                let transport = Arc::new(crate::provider::socket::UnconfiguredTransport);
                Arc::new(P2SocketProvider::new(transport, sink))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use tokio::sync::mpsc;

    fn test_sink() -> EventSink {
        let (tx, _rx) = mpsc::unbounded_channel();
        EventSink::new(tx, Arc::new(AtomicU64::new(0)))
    }

    #[tokio::test]
    async fn default_factory_builds_p1_from_config() {
        let mut config = GatewayConfig::default();
        config.provider.p1_base_url = Some("https://p1.example.com".to_string());
        config.provider.p1_credentials = Some("tok".to_string());

        let provider = DefaultProviderFactory.build(ProviderKind::P1, &config, test_sink());
        assert_eq!(provider.kind(), ProviderKind::P1);
    }

    #[tokio::test]
    async fn default_factory_builds_p2_stub() {
        let config = GatewayConfig::default();
        let provider = DefaultProviderFactory.build(ProviderKind::P2, &config, test_sink());
        assert_eq!(provider.kind(), ProviderKind::P2);
        // The stub transport never resolves a handshake; connecting fails
        // with a normalized auth_error rather than hanging.
        let err = provider.connect().await.unwrap_err();
        assert_eq!(err.class, signal::ErrorClass::AuthError);
    }
}

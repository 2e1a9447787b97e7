//! The per-tenant `Session` record and its provider health bookkeeping.
//!
//! A `Session` is a snapshot: status, active provider, and per-provider
//! health counters. It does not own live provider connections — those
//! live on the owning supervisor task, which mutates this record through
//! a `SessionStore` the way `baton`'s MCP sessions are mutated through
//! `get_mut` rather than held open across an await point.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use signal::ProviderKind;

/// Where a session sits in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Initializing,
    QrReady,
    Connecting,
    Connected,
    Reconnecting,
    LoggedOut,
    Failed,
    Disconnected,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Initializing => "initializing",
            SessionStatus::QrReady => "qr_ready",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
            SessionStatus::Reconnecting => "reconnecting",
            SessionStatus::LoggedOut => "logged_out",
            SessionStatus::Failed => "failed",
            SessionStatus::Disconnected => "disconnected",
        }
    }
}

/// Running health counters for one provider installed on a session.
///
/// Mirrors the per-provider metrics of spec section 4.1: `isHealthy()` is
/// true iff the provider is currently connected and either no observations
/// have been recorded yet, or the failure ratio stays under 30%.
#[derive(Debug, Clone, Default)]
pub struct ProviderHealth {
    pub connected: bool,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub avg_response_time_ms: f64,
}

impl ProviderHealth {
    pub fn is_healthy(&self) -> bool {
        if !self.connected {
            return false;
        }
        let total = self.success_count + self.failure_count;
        if total == 0 {
            return true;
        }
        (self.failure_count as f64 / total as f64) < 0.30
    }

    /// Record a successful send. `avg_response_time_ms` is a running mean
    /// over successes only, matching spec section 4.1.
    pub fn record_success(&mut self, response_time_ms: u64) {
        let n = self.success_count;
        self.avg_response_time_ms =
            (self.avg_response_time_ms * n as f64 + response_time_ms as f64) / (n + 1) as f64;
        self.success_count += 1;
        self.last_success_at = Some(Utc::now());
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure_at = Some(Utc::now());
    }
}

/// One tenant's session record, owned by the session store and mutated
/// by its supervisor task.
#[derive(Debug, Clone)]
pub struct Session {
    pub tenant_id: String,
    pub status: SessionStatus,

    /// Non-null iff `status == Connected`.
    pub active_provider: Option<ProviderKind>,

    pub providers: HashMap<ProviderKind, ProviderHealth>,

    pub phone_identity: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,

    /// Non-null iff `status == QrReady`.
    pub qr_payload: Option<String>,

    pub reconnect_attempts: u32,
    pub created_at: DateTime<Utc>,

    /// Last time this record was touched, used for idle-session cleanup.
    /// Kept separate from `created_at`/`connected_at` because those are
    /// persisted-shape wall-clock timestamps; this one only needs
    /// monotonic in-process comparisons.
    pub(crate) last_seen: Instant,
}

impl Session {
    pub fn new(tenant_id: String) -> Self {
        Self {
            tenant_id,
            status: SessionStatus::Initializing,
            active_provider: None,
            providers: HashMap::new(),
            phone_identity: None,
            connected_at: None,
            qr_payload: None,
            reconnect_attempts: 0,
            created_at: Utc::now(),
            last_seen: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn idle_duration(&self) -> std::time::Duration {
        self.last_seen.elapsed()
    }

    /// Transition into `Connected`, resetting `reconnect_attempts` per
    /// spec section 4.3's "reset on any connected transition".
    pub fn mark_connected(&mut self, provider: ProviderKind, phone_identity: Option<String>) {
        self.status = SessionStatus::Connected;
        self.active_provider = Some(provider);
        self.phone_identity = phone_identity;
        self.connected_at = Some(Utc::now());
        self.qr_payload = None;
        self.reconnect_attempts = 0;
        self.touch();
    }

    pub fn mark_qr_ready(&mut self, qr_payload: String) {
        self.status = SessionStatus::QrReady;
        self.qr_payload = Some(qr_payload);
        self.touch();
    }

    pub fn mark_reconnecting(&mut self) {
        self.status = SessionStatus::Reconnecting;
        self.active_provider = None;
        self.reconnect_attempts += 1;
        self.touch();
    }

    /// A `LoggedOut` close cause: terminal, credentials are gone.
    pub fn mark_logged_out(&mut self) {
        self.status = SessionStatus::LoggedOut;
        self.active_provider = None;
        self.phone_identity = None;
        self.qr_payload = None;
        self.touch();
    }

    /// A `BadSession` close cause or an exhausted reconnect budget.
    pub fn mark_failed(&mut self) {
        self.status = SessionStatus::Failed;
        self.active_provider = None;
        self.touch();
    }

    pub fn mark_disconnected(&mut self) {
        self.status = SessionStatus::Disconnected;
        self.active_provider = None;
        self.touch();
    }

    pub fn is_healthy(&self) -> bool {
        self.active_provider
            .and_then(|p| self.providers.get(&p))
            .map(ProviderHealth::is_healthy)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_initializing() {
        let session = Session::new("tenant-1".to_string());
        assert_eq!(session.status, SessionStatus::Initializing);
        assert!(session.active_provider.is_none());
        assert_eq!(session.reconnect_attempts, 0);
    }

    #[test]
    fn mark_connected_resets_reconnect_attempts() {
        let mut session = Session::new("tenant-1".to_string());
        session.reconnect_attempts = 4;
        session.mark_connected(ProviderKind::P1, Some("+15551234".to_string()));
        assert_eq!(session.status, SessionStatus::Connected);
        assert_eq!(session.active_provider, Some(ProviderKind::P1));
        assert_eq!(session.reconnect_attempts, 0);
        assert!(session.qr_payload.is_none());
    }

    #[test]
    fn mark_qr_ready_sets_payload() {
        let mut session = Session::new("tenant-1".to_string());
        session.mark_qr_ready("data:image/png;base64,...".to_string());
        assert_eq!(session.status, SessionStatus::QrReady);
        assert!(session.qr_payload.is_some());
    }

    #[test]
    fn provider_health_ratio_threshold() {
        let mut health = ProviderHealth {
            connected: true,
            ..Default::default()
        };
        assert!(health.is_healthy());

        for _ in 0..3 {
            health.record_success(100);
        }
        for _ in 0..2 {
            health.record_failure();
        }
        // 2/5 = 0.40, at/over the 0.30 threshold.
        assert!(!health.is_healthy());
    }

    #[test]
    fn provider_health_disconnected_is_unhealthy() {
        let health = ProviderHealth::default();
        assert!(!health.is_healthy());
    }

    #[test]
    fn avg_response_time_is_mean_of_successes() {
        let mut health = ProviderHealth {
            connected: true,
            ..Default::default()
        };
        health.record_success(100);
        health.record_success(200);
        assert_eq!(health.avg_response_time_ms, 150.0);
    }
}

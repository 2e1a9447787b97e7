//! Session store trait and in-memory implementation.
//!
//! Generalized from `baton::session::store::InMemorySessionStore`: a
//! `DashMap<String, Session>` keyed by tenant id instead of MCP session
//! id, with a parallel `DashMap` of subscription registries so a
//! tenant's status-change listeners outlive individual `get_mut` calls.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::session::Session;
use crate::subscription::{StatusCallback, SubscriptionRegistry};

/// A reference to a session (from DashMap).
pub type SessionRef<'a> = dashmap::mapref::one::Ref<'a, String, Session>;

/// A mutable reference to a session (from DashMap).
pub type SessionRefMut<'a> = dashmap::mapref::one::RefMut<'a, String, Session>;

/// Aggregate counts over all sessions, for the admin status surface.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub total: usize,
    pub connected: usize,
    pub reconnecting: usize,
    pub other: usize,
}

/// Session store trait for pluggable storage backends.
pub trait SessionStore: Send + Sync {
    /// Get an existing session by tenant id, or create and store a fresh
    /// one in `Initializing`. Returns `true` in the second position if the
    /// session was newly created.
    fn get_or_create(&self, tenant_id: &str) -> (String, bool);

    fn get(&self, tenant_id: &str) -> Option<SessionRef<'_>>;
    fn get_mut(&self, tenant_id: &str) -> Option<SessionRefMut<'_>>;

    /// Remove a session record and its subscriptions.
    fn remove(&self, tenant_id: &str);

    /// Remove sessions idle longer than `max_idle`, returning the count
    /// removed.
    fn cleanup(&self, max_idle: Duration) -> usize;

    fn stats(&self) -> SessionStats;

    /// Snapshot of every tenant id currently tracked, for the periodic
    /// janitor sweep and `reconnectExistingSessions`.
    fn tenant_ids(&self) -> Vec<String>;

    /// Subscribe to status changes for a tenant. Returns a subscriber id
    /// usable with `unsubscribe`.
    fn subscribe(&self, tenant_id: &str, callback: StatusCallback) -> u64;

    fn unsubscribe(&self, tenant_id: &str, subscriber_id: u64);

    /// Notify all subscribers of a tenant's current status. Called by the
    /// owning supervisor after mutating the session record.
    fn notify(&self, tenant_id: &str);
}

/// In-memory session store using DashMap, matching
/// `baton::session::store::InMemorySessionStore`'s shape.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, Session>,
    subscriptions: DashMap<String, Arc<SubscriptionRegistry>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            subscriptions: DashMap::new(),
        }
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl SessionStore for InMemorySessionStore {
    fn get_or_create(&self, tenant_id: &str) -> (String, bool) {
        let is_new = !self.sessions.contains_key(tenant_id);

        self.sessions
            .entry(tenant_id.to_string())
            .or_insert_with(|| Session::new(tenant_id.to_string()));

        let _span = tracing::info_span!(
            "session.create",
            tenant_id = %tenant_id,
            is_new = is_new,
        )
        .entered();

        if is_new {
            tracing::info!("created new session");
        } else {
            tracing::debug!("returning existing session");
        }

        (tenant_id.to_string(), is_new)
    }

    fn get(&self, tenant_id: &str) -> Option<SessionRef<'_>> {
        self.sessions.get(tenant_id)
    }

    fn get_mut(&self, tenant_id: &str) -> Option<SessionRefMut<'_>> {
        self.sessions.get_mut(tenant_id)
    }

    fn remove(&self, tenant_id: &str) {
        if self.sessions.remove(tenant_id).is_some() {
            tracing::info!(tenant_id = %tenant_id, "session removed");
        }
        self.subscriptions.remove(tenant_id);
    }

    fn cleanup(&self, max_idle: Duration) -> usize {
        let mut to_remove = Vec::new();

        for entry in self.sessions.iter() {
            if entry.value().idle_duration() > max_idle {
                to_remove.push(entry.key().clone());
            }
        }

        let removed = to_remove.len();
        for tenant_id in to_remove {
            self.remove(&tenant_id);
            tracing::info!(tenant_id = %tenant_id, "removed idle session");
        }

        if removed > 0 {
            tracing::info!(removed, remaining = self.sessions.len(), "session cleanup completed");
        }

        removed
    }

    fn stats(&self) -> SessionStats {
        let mut stats = SessionStats::default();
        for entry in self.sessions.iter() {
            stats.total += 1;
            match entry.value().status {
                crate::session::SessionStatus::Connected => stats.connected += 1,
                crate::session::SessionStatus::Reconnecting => stats.reconnecting += 1,
                _ => stats.other += 1,
            }
        }
        stats
    }

    fn tenant_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    fn subscribe(&self, tenant_id: &str, callback: StatusCallback) -> u64 {
        let registry = self
            .subscriptions
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(SubscriptionRegistry::new()))
            .clone();
        registry.subscribe(callback)
    }

    fn unsubscribe(&self, tenant_id: &str, subscriber_id: u64) {
        if let Some(registry) = self.subscriptions.get(tenant_id) {
            registry.unsubscribe(subscriber_id);
        }
    }

    fn notify(&self, tenant_id: &str) {
        let Some(status) = self.sessions.get(tenant_id).map(|s| s.status) else {
            return;
        };
        if let Some(registry) = self.subscriptions.get(tenant_id) {
            registry.notify(status);
        }
    }
}

/// Spawn a background task that periodically removes idle sessions,
/// matching `baton::session::store::spawn_cleanup_task`'s interval +
/// cancellation-token shape.
pub fn spawn_cleanup_task(
    store: Arc<dyn SessionStore>,
    interval: Duration,
    max_idle: Duration,
    cancel: tokio_util::sync::CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("session cleanup task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    store.cleanup(max_idle);
                }
            }
        }
    })
}

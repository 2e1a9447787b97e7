//! line - generic per-tenant session store for the messaging gateway.
//!
//! Generalizes `baton::session`'s MCP session store (a `DashMap`-backed
//! store keyed by session id, with idle-session cleanup) to the
//! gateway's tenant sessions: connection status, active provider,
//! per-provider health, and status-change subscriptions. Holds no
//! network or provider-protocol code — those live in `gateway`, which
//! owns the actual `Provider` instances and drives this store through
//! `get_mut`.

pub mod session;
pub mod store;
pub mod subscription;

pub use session::{ProviderHealth, Session, SessionStatus};
pub use store::{spawn_cleanup_task, InMemorySessionStore, SessionRef, SessionRefMut, SessionStats, SessionStore};
pub use subscription::{StatusCallback, SubscriptionRegistry};

//! signal - domain and wire types for the messaging gateway.
//!
//! This crate holds the types shared across the gateway's internal
//! boundaries: normalized inbound messages, the provider error
//! taxonomy, the durable queue's entry shape, and the application
//! webhook/backend JSON schemas. It has no async runtime or I/O
//! dependency so it can be depended on from every other crate in the
//! workspace without pulling in tokio, axum, or reqwest.

pub mod backend;
pub mod capability;
pub mod error;
pub mod message;
pub mod queue;
pub mod webhook;

pub use backend::{BackendAck, BackendPendingMessage, BackendPendingResponse, DeliveryStatus};
pub use capability::{Capabilities, ProviderKind};
pub use error::{ErrorClass, FallbackTriggers, SendError};
pub use message::{Address, MessageKind, NormalizedInboundMessage};
pub use queue::{QueuedDelivery, MAX_ATTEMPTS, TTL};
pub use webhook::WebhookPayload;

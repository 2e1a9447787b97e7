//! Inbound delivery queue entry shape.

use crate::message::NormalizedInboundMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum delivery attempts before an entry is abandoned.
pub const MAX_ATTEMPTS: u32 = 5;

/// Entry time-to-live before abandonment, regardless of attempt count.
pub const TTL: chrono::Duration = chrono::Duration::hours(24);

/// One pending webhook delivery in the durable inbound queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedDelivery {
    pub message_id: String,
    pub tenant_id: String,
    pub payload: NormalizedInboundMessage,
    pub queued_at: DateTime<Utc>,
    pub attempts: u32,
}

impl QueuedDelivery {
    pub fn new(payload: NormalizedInboundMessage) -> Self {
        Self {
            message_id: payload.message_id.clone(),
            tenant_id: payload.tenant_id.clone(),
            payload,
            queued_at: Utc::now(),
            attempts: 0,
        }
    }

    /// Whether this entry has exceeded the attempt cap or its TTL and must
    /// be evicted on the next cleanup pass.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.attempts >= MAX_ATTEMPTS || now - self.queued_at >= TTL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;

    fn payload() -> NormalizedInboundMessage {
        NormalizedInboundMessage {
            provider: "p1".into(),
            tenant_id: "t1".into(),
            message_id: "m1".into(),
            from: "+14155550000".into(),
            resolved_phone: Some("+14155550000".into()),
            is_opaque_address: false,
            opaque_address_id: None,
            timestamp: 1_700_000_000,
            kind: MessageKind::Text,
            content: "hello".into(),
            push_name: None,
            is_voice: false,
            voice_transcript: None,
            voice_duration_seconds: None,
        }
    }

    #[test]
    fn fresh_entry_is_not_expired() {
        let entry = QueuedDelivery::new(payload());
        assert!(!entry.is_expired(Utc::now()));
    }

    #[test]
    fn attempt_cap_expires_entry() {
        let mut entry = QueuedDelivery::new(payload());
        entry.attempts = MAX_ATTEMPTS;
        assert!(entry.is_expired(Utc::now()));
    }

    #[test]
    fn ttl_expires_entry() {
        let mut entry = QueuedDelivery::new(payload());
        entry.queued_at = Utc::now() - chrono::Duration::hours(25);
        assert!(entry.is_expired(Utc::now()));
    }
}

//! Normalized inbound message shape shared by every provider.

use serde::{Deserialize, Serialize};

/// The kind of content carried by an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    Voice,
    Document,
    Sticker,
    Location,
    Contact,
    Interactive,
    Unknown,
}

/// A provider-agnostic view of a single inbound message.
///
/// Exactly one of `resolved_phone` / `opaque_address_id` is `Some` — see
/// [`NormalizedInboundMessage::address`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedInboundMessage {
    pub provider: String,
    pub tenant_id: String,
    pub message_id: String,
    pub from: String,
    pub resolved_phone: Option<String>,
    pub is_opaque_address: bool,
    pub opaque_address_id: Option<String>,
    /// Epoch seconds, as reported by the upstream platform.
    pub timestamp: i64,
    pub kind: MessageKind,
    pub content: String,
    pub push_name: Option<String>,
    pub is_voice: bool,
    pub voice_transcript: Option<String>,
    pub voice_duration_seconds: Option<u32>,
}

/// The resolved address of an inbound message: a phone number or an
/// opaque (non-phone) platform identifier, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Phone(String),
    Opaque(String),
}

impl NormalizedInboundMessage {
    /// The message's addressable identity, per the "exactly one of
    /// `resolved_phone` / `opaque_address_id`" invariant.
    pub fn address(&self) -> Address {
        match (&self.resolved_phone, &self.opaque_address_id) {
            (Some(phone), _) => Address::Phone(phone.clone()),
            (None, Some(id)) => Address::Opaque(id.clone()),
            (None, None) => Address::Opaque(self.from.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NormalizedInboundMessage {
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
    fn resolved_phone_wins_address() {
        let msg = sample();
        assert_eq!(msg.address(), Address::Phone("+14155550000".into()));
    }

    #[test]
    fn opaque_address_when_no_phone() {
        let mut msg = sample();
        msg.resolved_phone = None;
        msg.is_opaque_address = true;
        msg.opaque_address_id = Some("lid:123".into());
        assert_eq!(msg.address(), Address::Opaque("lid:123".into()));
    }

    #[test]
    fn serde_roundtrip() {
        let msg = sample();
        let json = serde_json::to_string(&msg).unwrap();
        let back: NormalizedInboundMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.message_id, msg.message_id);
        assert_eq!(back.kind, MessageKind::Text);
    }
}

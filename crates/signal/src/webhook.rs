//! Application webhook payload shape (§6 of the gateway contract).

use crate::message::{Address, NormalizedInboundMessage};
use serde::{Deserialize, Serialize};

/// JSON body posted to the configured application webhook.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub tenant_id: String,
    /// E.164 with leading `+`, or null when `is_lid` is true.
    pub phone: Option<String>,
    pub message: String,
    pub customer_name: Option<String>,
    pub whatsapp_message_id: String,
    pub is_lid: bool,
    pub lid_id: Option<String>,
    pub is_voice_message: bool,
    pub voice_transcription: Option<String>,
    pub voice_duration_seconds: Option<u32>,
    pub provider: String,
}

impl From<&NormalizedInboundMessage> for WebhookPayload {
    fn from(msg: &NormalizedInboundMessage) -> Self {
        let (phone, is_lid, lid_id) = match msg.address() {
            Address::Phone(phone) => (Some(phone), false, None),
            Address::Opaque(id) => (None, true, Some(id)),
        };

        Self {
            kind: "message".to_string(),
            tenant_id: msg.tenant_id.clone(),
            phone,
            message: msg.content.clone(),
            customer_name: msg.push_name.clone(),
            whatsapp_message_id: msg.message_id.clone(),
            is_lid,
            lid_id,
            is_voice_message: msg.is_voice,
            voice_transcription: msg.voice_transcript.clone(),
            voice_duration_seconds: msg.voice_duration_seconds,
            provider: msg.provider.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;

    #[test]
    fn phone_address_sets_phone_not_lid() {
        let msg = NormalizedInboundMessage {
            provider: "p1".into(),
            tenant_id: "t1".into(),
            message_id: "m1".into(),
            from: "+14155550000".into(),
            resolved_phone: Some("+14155550000".into()),
            is_opaque_address: false,
            opaque_address_id: None,
            timestamp: 0,
            kind: MessageKind::Text,
            content: "hello".into(),
            push_name: None,
            is_voice: false,
            voice_transcript: None,
            voice_duration_seconds: None,
        };
        let payload = WebhookPayload::from(&msg);
        assert_eq!(payload.phone.as_deref(), Some("+14155550000"));
        assert!(!payload.is_lid);
        assert!(payload.lid_id.is_none());
    }

    #[test]
    fn opaque_address_sets_lid_not_phone() {
        let msg = NormalizedInboundMessage {
            provider: "p2".into(),
            tenant_id: "t1".into(),
            message_id: "m2".into(),
            from: "lid:99".into(),
            resolved_phone: None,
            is_opaque_address: true,
            opaque_address_id: Some("lid:99".into()),
            timestamp: 0,
            kind: MessageKind::Text,
            content: "hi".into(),
            push_name: None,
            is_voice: false,
            voice_transcript: None,
            voice_duration_seconds: None,
        };
        let payload = WebhookPayload::from(&msg);
        assert!(payload.phone.is_none());
        assert!(payload.is_lid);
        assert_eq!(payload.lid_id.as_deref(), Some("lid:99"));
    }
}

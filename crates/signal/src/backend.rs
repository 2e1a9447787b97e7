//! Application backend pull/ack schemas (§6).

use serde::{Deserialize, Serialize};

/// One message returned by the backend's pending-messages endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendPendingMessage {
    pub id: String,
    #[serde(rename = "phoneNumber")]
    pub phone_number: String,
    pub content: String,
    #[serde(rename = "isLid", default)]
    pub is_lid: bool,
    #[serde(rename = "lidId", default)]
    pub lid_id: Option<String>,
}

/// Response body of `GET …/pending-messages?tenantId=…`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendPendingResponse {
    pub success: bool,
    pub messages: Vec<BackendPendingMessage>,
    pub count: usize,
}

/// Delivery status reported back to the backend via `POST …/mark-sent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

/// Request body of `POST …/mark-sent`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendAck {
    pub ids: Vec<String>,
    pub status: DeliveryStatus,
    #[serde(rename = "providerMessageId", skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BackendAck {
    pub fn sent(id: impl Into<String>, provider_message_id: impl Into<String>) -> Self {
        Self {
            ids: vec![id.into()],
            status: DeliveryStatus::Sent,
            provider_message_id: Some(provider_message_id.into()),
            error: None,
        }
    }

    pub fn failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            ids: vec![id.into()],
            status: DeliveryStatus::Failed,
            provider_message_id: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_sent_serializes_without_error_field() {
        let ack = BackendAck::sent("m1", "wamid.abc");
        let json = serde_json::to_value(&ack).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["status"], "sent");
    }

    #[test]
    fn ack_failed_serializes_without_provider_message_id() {
        let ack = BackendAck::failed("m1", "timeout");
        let json = serde_json::to_value(&ack).unwrap();
        assert!(json.get("providerMessageId").is_none());
        assert_eq!(json["error"], "timeout");
    }

    #[test]
    fn pending_response_deserializes() {
        let raw = r#"{"success":true,"count":1,"messages":[{"id":"1","phoneNumber":"+14155550000","content":"hi"}]}"#;
        let resp: BackendPendingResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.messages.len(), 1);
        assert!(!resp.messages[0].is_lid);
    }
}

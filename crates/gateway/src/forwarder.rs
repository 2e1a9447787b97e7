//! Webhook Forwarder (spec section 4.7): formats normalized inbound
//! messages into the application webhook schema and hands failures off
//! to the Inbound Delivery Queue for retry.
//!
//! Grounded on the `WebhookDelivery` trait shape (delivery backend trait
//! + HTTP client + classified result) from the pack's webhook-delivery
//! reference, adapted to async (`reqwest::Client` rather than
//! `reqwest::blocking`) to fit the teacher's async-first style, and to
//! the spec's three-way 2xx/400/other classification rather than a
//! generic retry-everything policy.

use std::sync::Arc;
use std::time::Duration;

use signal::{NormalizedInboundMessage, WebhookPayload};

use crate::queue::InboundQueue;

const FORWARD_TIMEOUT: Duration = Duration::from_secs(15);
const DRAIN_SPACING: Duration = Duration::from_millis(500);

/// Outcome of one `forward` attempt, for tests and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    Delivered,
    PermanentlyRejected,
    WillRetry,
    Skipped,
}

pub struct WebhookForwarder {
    client: reqwest::Client,
    url: Option<String>,
    queue: Arc<InboundQueue>,
}

impl WebhookForwarder {
    pub fn new(url: Option<String>, queue: Arc<InboundQueue>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            queue,
        }
    }

    /// Deliver one message. `from_retry_queue` distinguishes a direct
    /// forward (first attempt) from a retry popped off the queue, which
    /// changes whether success/permanent-reject should `dequeue` and
    /// whether failure should `enqueue` vs `increment_attempts`.
    pub async fn forward(&self, message: &NormalizedInboundMessage, from_retry_queue: bool) -> ForwardOutcome {
        let Some(url) = &self.url else {
            tracing::warn!(message_id = %message.message_id, "no webhook url configured, dropping inbound message");
            return ForwardOutcome::Skipped;
        };

        let payload = WebhookPayload::from(message);
        let result = self.client.post(url).timeout(FORWARD_TIMEOUT).json(&payload).send().await;

        match result {
            Ok(response) if response.status().is_success() => {
                if from_retry_queue {
                    self.queue.dequeue(&message.message_id);
                }
                ForwardOutcome::Delivered
            }
            Ok(response) if response.status().as_u16() == 400 => {
                tracing::warn!(message_id = %message.message_id, "webhook rejected message permanently (400)");
                if from_retry_queue {
                    self.queue.dequeue(&message.message_id);
                }
                ForwardOutcome::PermanentlyRejected
            }
            Ok(response) => {
                tracing::warn!(message_id = %message.message_id, status = %response.status(), "webhook delivery failed, will retry");
                self.requeue(message, from_retry_queue);
                ForwardOutcome::WillRetry
            }
            Err(e) => {
                tracing::warn!(message_id = %message.message_id, error = %e, "webhook request failed, will retry");
                self.requeue(message, from_retry_queue);
                ForwardOutcome::WillRetry
            }
        }
    }

    fn requeue(&self, message: &NormalizedInboundMessage, from_retry_queue: bool) {
        if from_retry_queue {
            self.queue.increment_attempts(&message.message_id);
        } else {
            self.queue.enqueue(message.clone());
        }
    }

    /// Iterate a snapshot of queued deliveries, forwarding each with an
    /// inter-request spacing so a webhook outage recovery doesn't slam
    /// the endpoint with a burst, then evict anything past its TTL or
    /// attempt cap.
    pub async fn process_queue(&self) {
        let snapshot = self.queue.list();
        if snapshot.is_empty() {
            self.queue.cleanup();
            return;
        }

        tracing::info!(count = snapshot.len(), "processing inbound retry queue");
        for (i, entry) in snapshot.iter().enumerate() {
            self.forward(&entry.payload, true).await;
            if i + 1 < snapshot.len() {
                tokio::time::sleep(DRAIN_SPACING).await;
            }
        }

        self.queue.cleanup();
    }
}

// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator alert events.

use tokio::sync::broadcast;
use tracing::debug;

/// Conditions that need operator attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertEvent {
    /// A session exhausted its reconnect attempts.
    SessionFailed { session: String, reason: String },
    /// A message was permanently failed.
    MessageFailed { message_id: String, reason: String },
    /// Classification could not decide and a human should look.
    HumanReviewNeeded { contact_id: String, reason: String },
}

/// Broadcast channel for [`AlertEvent`]s.
///
/// Publishing never blocks and never fails; with no subscribers the event
/// is dropped after being logged.
#[derive(Debug, Clone)]
pub struct AlertBus {
    sender: broadcast::Sender<AlertEvent>,
}

impl AlertBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: AlertEvent) {
        debug!(event = ?event, "alert published");
        let _ = self.sender.send(event);
    }
}

impl Default for AlertBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = AlertBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(AlertEvent::SessionFailed {
            session: "main".into(),
            reason: "reconnect attempts exhausted".into(),
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, AlertEvent::SessionFailed { .. }));
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = AlertBus::new(8);
        bus.publish(AlertEvent::MessageFailed {
            message_id: "m1".into(),
            reason: "gone".into(),
        });
    }
}

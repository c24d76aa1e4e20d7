use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Domain events emitted by the settlement pipeline after successful commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled(Uuid),
    PaymentStatusChanged {
        order_id: Uuid,
        payment_status: String,
    },
    LoyaltyPointsAwarded {
        order_id: Uuid,
        points: Decimal,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_send_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);
        let order_id = Uuid::new_v4();

        sender.send(Event::OrderCreated(order_id)).await.unwrap();
        sender.send(Event::OrderCancelled(order_id)).await.unwrap();

        assert!(matches!(rx.recv().await, Some(Event::OrderCreated(id)) if id == order_id));
        assert!(matches!(rx.recv().await, Some(Event::OrderCancelled(id)) if id == order_id));
    }

    #[tokio::test]
    async fn send_fails_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        assert!(sender.send(Event::OrderCreated(Uuid::new_v4())).await.is_err());
    }
}

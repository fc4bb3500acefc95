use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::entities::order::OrderStatus;

/// Events emitted by the services. Consumed by a background task; delivery is
/// best-effort and failures are never allowed to fail the emitting operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },

    // Inventory events
    StockReserved { product_id: i64, quantity: i32 },
    StockReleased { product_id: i64, quantity: i32 },

    // Messaging events
    MessageReceived(Uuid),
    MessageReplied(Uuid),
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

/// Background consumer draining the event channel. Currently the events feed
/// the structured log; anything heavier hangs off this loop.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(order_id = %order_id, "event: order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    order_id = %order_id,
                    from = %old_status,
                    to = %new_status,
                    "event: order status changed"
                );
            }
            Event::StockReserved {
                product_id,
                quantity,
            } => {
                info!(product_id, quantity, "event: stock reserved");
            }
            Event::StockReleased {
                product_id,
                quantity,
            } => {
                info!(product_id, quantity, "event: stock released");
            }
            Event::MessageReceived(message_id) => {
                info!(message_id = %message_id, "event: message received");
            }
            Event::MessageReplied(message_id) => {
                info!(message_id = %message_id, "event: message replied");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_and_receive_roundtrip() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        sender
            .send(Event::StockReleased {
                product_id: 1,
                quantity: 3,
            })
            .await
            .expect("send event");

        match rx.recv().await {
            Some(Event::StockReleased {
                product_id,
                quantity,
            }) => {
                assert_eq!(product_id, 1);
                assert_eq!(quantity, 3);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_fails_once_receiver_is_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        assert!(sender.send(Event::OrderCreated(Uuid::new_v4())).await.is_err());
    }
}

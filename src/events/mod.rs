use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Cart contents changed in a client session
    CartChanged { item_count: i32 },

    // Order events
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },

    // Payment events
    PaymentVerified(Uuid),
    PaymentFailed(Uuid),
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

    /// Sends an event, logging instead of failing when the channel is closed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }

    /// Non-blocking send for synchronous call sites (cart listeners).
    pub fn try_send(&self, event: Event) {
        if let Err(e) = self.sender.try_send(event) {
            warn!("Failed to send event: {}", e);
        }
    }
}

/// Consumes events from the channel and logs them. Spawned at startup.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::CartChanged { item_count } => {
                info!(item_count, "cart changed");
            }
            Event::OrderCreated(order_id) => {
                info!(%order_id, "order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "order status changed");
            }
            Event::PaymentVerified(order_id) => {
                info!(%order_id, "payment verified");
            }
            Event::PaymentFailed(order_id) => {
                info!(%order_id, "payment verification failed");
            }
        }
    }
    info!("Event channel closed; processor exiting");
}

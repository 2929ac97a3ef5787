//! Simulated outbound messaging
//!
//! Messages are NOT delivered anywhere: they are logged and kept in a
//! bounded in-memory outbox. A real messaging provider plugs in through the
//! same `MessagingClient` trait.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use contact_agent_core::{MessagingClient, Result};

/// One simulated outbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: String,
    pub text: String,
}

pub struct SimulatedMessenger {
    outbox: Mutex<VecDeque<OutboundMessage>>,
    capacity: usize,
}

impl SimulatedMessenger {
    pub fn new(capacity: usize) -> Self {
        Self {
            outbox: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    /// Most recent messages, oldest first
    pub fn recent(&self) -> Vec<OutboundMessage> {
        self.outbox.lock().iter().cloned().collect()
    }
}

impl Default for SimulatedMessenger {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl MessagingClient for SimulatedMessenger {
    async fn send_text(&self, phone: &str, message: &str) -> Result<()> {
        tracing::info!(
            to = %phone,
            chars = message.chars().count(),
            "Simulated outbound message"
        );
        let mut outbox = self.outbox.lock();
        if outbox.len() >= self.capacity {
            outbox.pop_front();
        }
        outbox.push_back(OutboundMessage {
            to: phone.to_string(),
            text: message.to_string(),
        });
        Ok(())
    }
}

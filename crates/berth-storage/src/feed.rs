// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broadcast feed of changes on synced tables.
//!
//! Every committed write to `broadcast_history` or `scheduled_messages`
//! publishes one [`ChangeEvent`]. Non-blocking: `emit` never awaits, and a
//! slow subscriber lags (loses oldest events) rather than stalling writers.

use tokio::sync::broadcast;

use berth_core::types::ChangeEvent;

/// Events buffered per subscriber before lagging kicks in.
const FEED_CAPACITY: usize = 1024;

/// Fan-out handle for change events. Cheap to clone.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    /// Subscribe to change events. Only events emitted after this call are
    /// delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of receivers it reached; 0 when nobody listens.
    pub fn emit(&self, event: ChangeEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

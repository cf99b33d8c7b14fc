// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::{Notification, NotificationSink, PublishError};
use crate::config::NotifierConfig;

/// Collects notifications in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    sent: Mutex<Vec<Notification>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything collected so far.
    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.sent.lock())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }
}

#[async_trait]
impl NotificationSink for MemorySink {
    async fn send(&self, notification: Notification) -> Result<(), PublishError> {
        self.sent.lock().push(notification);
        Ok(())
    }
}

/// Fans notifications out to in-process subscribers.
///
/// Sending with no live receiver is an error, which the publisher logs and drops.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<Notification>,
}

impl BroadcastSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Channel sized by `broadcast_capacity`.
    #[must_use]
    pub fn from_config(config: &NotifierConfig) -> Self {
        Self::new(config.broadcast_capacity)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl NotificationSink for BroadcastSink {
    async fn send(&self, notification: Notification) -> Result<(), PublishError> {
        self.sender
            .send(notification)
            .map(|_| ())
            .map_err(|_| PublishError::Sink("no active subscribers".into()))
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn send(&self, _notification: Notification) -> Result<(), PublishError> {
        Ok(())
    }
}

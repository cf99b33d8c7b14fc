// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Change notifications.
//!
//! Every successful mutation is announced through a [`Publisher`]. Delivery is
//! best-effort: a missing topic or a failing [`NotificationSink`] is logged and
//! swallowed, never surfaced to the caller of the data operation.
//!
//! # Attributes
//!
//! | Attribute            | Source                                |
//! |----------------------|---------------------------------------|
//! | `model_schema`       | adapter configuration                 |
//! | `model_identifier`   | adapter configuration                 |
//! | `operation`          | `create`, `update` or `delete`        |
//! | `author_identifier`  | notifier configuration, when set      |
//! | anything else        | `notifier.attributes` (overrides)     |

mod sinks;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::NotifierConfig;

pub use sinks::{BroadcastSink, MemorySink, NullSink};

/// Kind of mutation being announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub topic: String,
    pub operation: Operation,
    /// The written (or deleted) data.
    pub message: Value,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("notification topic is not configured")]
    MissingTopic,
    #[error("sink rejected notification: {0}")]
    Sink(String),
}

/// Transport for notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), PublishError>;
}

/// Builds notifications for one adapter and hands them to its sink.
pub struct Publisher {
    sink: Arc<dyn NotificationSink>,
    topic: Option<String>,
    model_schema: String,
    model_identifier: String,
    author_identifier: Option<String>,
    attributes: BTreeMap<String, String>,
}

impl Publisher {
    pub fn new(
        sink: Arc<dyn NotificationSink>,
        config: &NotifierConfig,
        model_schema: impl Into<String>,
        model_identifier: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            topic: config.topic.clone(),
            model_schema: model_schema.into(),
            model_identifier: model_identifier.into(),
            author_identifier: config.author_identifier.clone(),
            attributes: config.attributes.clone(),
        }
    }

    /// Publisher that drops everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            sink: Arc::new(NullSink),
            topic: None,
            model_schema: String::new(),
            model_identifier: String::new(),
            author_identifier: None,
            attributes: BTreeMap::new(),
        }
    }

    fn attributes_for(&self, operation: Operation) -> BTreeMap<String, String> {
        let mut attributes = BTreeMap::from([
            ("model_schema".to_string(), self.model_schema.clone()),
            ("model_identifier".to_string(), self.model_identifier.clone()),
            ("operation".to_string(), operation.as_str().to_string()),
        ]);
        if let Some(author) = &self.author_identifier {
            attributes.insert("author_identifier".to_string(), author.clone());
        }
        attributes.extend(self.attributes.clone());
        attributes
    }

    /// Build the notification for `data`.
    pub fn notification(&self, operation: Operation, data: Value) -> Result<Notification, PublishError> {
        let topic = self.topic.clone().ok_or(PublishError::MissingTopic)?;
        Ok(Notification {
            id: Uuid::new_v4(),
            topic,
            operation,
            message: data,
            attributes: self.attributes_for(operation),
        })
    }

    /// Announce `data`. Null data is skipped; failures are logged only.
    pub async fn publish(&self, operation: Operation, data: Value) {
        if data.is_null() {
            return;
        }
        let outcome = match self.notification(operation, data) {
            Ok(notification) => {
                let id = notification.id;
                self.sink.send(notification).await.map(|()| id)
            }
            Err(e) => Err(e),
        };
        match outcome {
            Ok(id) => {
                debug!(%operation, %id, "Published notification");
                crate::metrics::record_notification(operation.as_str(), "sent");
            }
            Err(PublishError::MissingTopic) => {
                debug!(%operation, "No notification topic configured, skipping");
                crate::metrics::record_notification(operation.as_str(), "skipped");
            }
            Err(e) => {
                warn!(%operation, error = %e, "Failed to publish notification");
                crate::metrics::record_notification(operation.as_str(), "failed");
            }
        }
    }

    /// One notification per record, in order.
    pub async fn publish_each<'a>(&self, operation: Operation, records: impl IntoIterator<Item = &'a crate::record::Record>) {
        for record in records {
            self.publish(operation, Value::Object(record.clone())).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FailingSink;

    #[async_trait]
    impl NotificationSink for FailingSink {
        async fn send(&self, _notification: Notification) -> Result<(), PublishError> {
            Err(PublishError::Sink("transport down".into()))
        }
    }

    fn config() -> NotifierConfig {
        NotifierConfig {
            topic: Some("arn:topic".into()),
            author_identifier: Some("svc-users".into()),
            attributes: BTreeMap::from([("env".to_string(), "test".to_string())]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_publish_sets_default_and_custom_attributes() {
        let sink = Arc::new(MemorySink::new());
        let publisher = Publisher::new(sink.clone(), &config(), "User", "id");

        publisher.publish(Operation::Update, json!({"id": "a"})).await;

        let sent = sink.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, "arn:topic");
        assert_eq!(sent[0].message, json!({"id": "a"}));
        assert_eq!(sent[0].attributes["model_schema"], "User");
        assert_eq!(sent[0].attributes["model_identifier"], "id");
        assert_eq!(sent[0].attributes["operation"], "update");
        assert_eq!(sent[0].attributes["author_identifier"], "svc-users");
        assert_eq!(sent[0].attributes["env"], "test");
    }

    #[tokio::test]
    async fn test_author_attribute_omitted_when_unset() {
        let publisher = Publisher::new(
            Arc::new(NullSink),
            &NotifierConfig {
                topic: Some("t".into()),
                ..Default::default()
            },
            "User",
            "id",
        );
        let notification = publisher.notification(Operation::Create, json!({})).unwrap();
        assert!(!notification.attributes.contains_key("author_identifier"));
    }

    #[tokio::test]
    async fn test_null_data_is_skipped() {
        let sink = Arc::new(MemorySink::new());
        let publisher = Publisher::new(sink.clone(), &config(), "User", "id");
        publisher.publish(Operation::Delete, Value::Null).await;
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_missing_topic_is_swallowed() {
        let sink = Arc::new(MemorySink::new());
        let publisher = Publisher::new(sink.clone(), &NotifierConfig::default(), "User", "id");
        publisher.publish(Operation::Create, json!({"id": "a"})).await;
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let publisher = Publisher::new(Arc::new(FailingSink), &config(), "User", "id");
        publisher.publish(Operation::Create, json!({"id": "a"})).await;
    }

    #[test]
    fn test_operation_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Operation::Create).unwrap(), json!("create"));
        assert_eq!(Operation::Delete.to_string(), "delete");
    }
}

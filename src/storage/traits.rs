// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Store client contracts.
//!
//! Adapters never speak a wire protocol themselves. Each engine is reached
//! through one of these traits, injected at construction time. Production
//! deployments wrap their vendor SDK; tests and local runs use the in-memory
//! clients in [`super::memory`] and [`super::graph_memory`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::record::{Page, Record, WriteOutcome};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Unsupported statement: {0}")]
    Unsupported(String),
    #[error("Session error: {0}")]
    Session(String),
}

// ═══════════════════════════════════════════════════════════════════════════
// Wide-column
// ═══════════════════════════════════════════════════════════════════════════

/// Guard attached to a conditional put.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Insert-if-absent on the key attribute.
    AttributeNotExists(String),
    /// Stored attribute must equal `value` at write time.
    AttributeEquals { field: String, value: Value },
}

/// Condition rendered as a store expression with placeholder tables.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConditionExpression {
    pub expression: String,
    pub names: BTreeMap<String, String>,
    pub values: BTreeMap<String, Value>,
}

impl Condition {
    /// Render in the `#name = :value` placeholder convention.
    #[must_use]
    pub fn to_expression(&self) -> ConditionExpression {
        match self {
            Condition::AttributeNotExists(field) => ConditionExpression {
                expression: format!("attribute_not_exists({field})"),
                ..Default::default()
            },
            Condition::AttributeEquals { field, value } => {
                let name = format!("#{field}");
                let placeholder = format!(":{field}");
                ConditionExpression {
                    expression: format!("{name} = {placeholder}"),
                    names: BTreeMap::from([(name, field.clone())]),
                    values: BTreeMap::from([(placeholder, value.clone())]),
                }
            }
        }
    }

    /// Evaluate against the currently stored item (if any).
    #[must_use]
    pub fn holds(&self, stored: Option<&Record>) -> bool {
        match self {
            Condition::AttributeNotExists(field) => {
                stored.and_then(|item| item.get(field)).is_none()
            }
            Condition::AttributeEquals { field, value } => {
                stored.and_then(|item| item.get(field)) == Some(value)
            }
        }
    }
}

/// One query or scan call.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PageRequest {
    /// Secondary index to read from (`None` = base table).
    pub index_name: Option<String>,
    /// Equality key conditions (query only).
    pub key_condition: Record,
    /// Equality filter applied to every item.
    pub filter: Record,
    /// Items the store evaluates per call. `None` lets the store decide.
    pub page_size: Option<usize>,
    pub exclusive_start_key: Option<Value>,
}

/// Items per batch write call a wide-column store accepts.
pub const MAX_BATCH_WRITE: usize = 25;
/// Keys per batch get call a wide-column store accepts.
pub const MAX_BATCH_GET: usize = 100;

#[async_trait]
pub trait WideColumnClient: Send + Sync {
    async fn get(&self, table: &str, key: &Record) -> Result<Option<Record>, StorageError>;

    /// Full-item replace, optionally guarded.
    async fn put(
        &self,
        table: &str,
        item: &Record,
        condition: Option<&Condition>,
    ) -> Result<WriteOutcome, StorageError>;

    async fn query(&self, table: &str, request: &PageRequest) -> Result<Page, StorageError>;
    async fn scan(&self, table: &str, request: &PageRequest) -> Result<Page, StorageError>;

    /// Delete by key, returning the prior item.
    async fn delete(&self, table: &str, key: &Record) -> Result<Option<Record>, StorageError>;

    /// Unconditional puts for one store-sized chunk.
    async fn batch_write(&self, table: &str, items: &[Record]) -> Result<(), StorageError>;

    /// Point reads for one store-sized chunk. Missing keys are skipped.
    async fn batch_get(&self, table: &str, keys: &[Record]) -> Result<Vec<Record>, StorageError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// Graph
// ═══════════════════════════════════════════════════════════════════════════

/// A parameterised graph statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: Record,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Record::new(),
        }
    }

    /// Bind a named `$placeholder`.
    #[must_use]
    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }
}

/// Transaction wrapping for a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

/// One returned column.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphValue {
    Node {
        id: i64,
        labels: Vec<String>,
        properties: Record,
    },
    Relationship {
        start: i64,
        end: i64,
        kind: String,
        properties: Record,
    },
    Scalar(Value),
}

/// One returned row, columns in `RETURN` order.
pub type GraphRow = Vec<GraphValue>;

#[async_trait]
pub trait GraphClient: Send + Sync {
    /// Open a session. Sessions are exclusive to one caller.
    async fn open(&self) -> Result<(), StorageError>;
    async fn close(&self) -> Result<(), StorageError>;
    async fn run(&self, statement: &Statement, mode: AccessMode) -> Result<Vec<GraphRow>, StorageError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// Object store
// ═══════════════════════════════════════════════════════════════════════════

#[async_trait]
pub trait ObjectClient: Send + Sync {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StorageError>;
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    /// Delete, returning the prior body.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_version_condition_expression() {
        let condition = Condition::AttributeEquals {
            field: "modified".into(),
            value: json!("2024-01-01"),
        };
        let rendered = condition.to_expression();

        assert_eq!(rendered.expression, "#modified = :modified");
        assert_eq!(rendered.names.get("#modified"), Some(&"modified".to_string()));
        assert_eq!(rendered.values.get(":modified"), Some(&json!("2024-01-01")));
    }

    #[test]
    fn test_insert_condition_expression() {
        let rendered = Condition::AttributeNotExists("id".into()).to_expression();
        assert_eq!(rendered.expression, "attribute_not_exists(id)");
        assert!(rendered.names.is_empty());
        assert!(rendered.values.is_empty());
    }

    #[test]
    fn test_condition_holds() {
        let stored: Record = serde_json::from_value(json!({"id": "a", "v": 1})).unwrap();

        assert!(!Condition::AttributeNotExists("id".into()).holds(Some(&stored)));
        assert!(Condition::AttributeNotExists("id".into()).holds(None));

        let guard = Condition::AttributeEquals { field: "v".into(), value: json!(1) };
        assert!(guard.holds(Some(&stored)));
        assert!(!guard.holds(None));

        let stale = Condition::AttributeEquals { field: "v".into(), value: json!(0) };
        assert!(!stale.holds(Some(&stored)));
    }

    #[test]
    fn test_statement_params() {
        let statement = Statement::new("MATCH (n:User) WHERE n.id = $id RETURN n").param("id", "a");
        assert_eq!(statement.params.get("id"), Some(&json!("a")));
    }
}

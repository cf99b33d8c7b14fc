// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record and page types shared by every engine.
//!
//! A [`Record`] is an open-ended JSON object. It always carries an identifier
//! field (the primary key within its collection) and a version field used
//! purely for optimistic-concurrency equality checks. Both names come from
//! configuration, see [`ModelFields`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field name to value mapping, stored as-is by every backend.
pub type Record = Map<String, Value>;

/// One page returned by a store query/scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Record>,
    /// Continuation token. `None` means the result set is exhausted.
    pub cursor: Option<Value>,
}

impl Page {
    /// A final page (no continuation).
    #[must_use]
    pub fn last(items: Vec<Record>) -> Self {
        Self { items, cursor: None }
    }

    /// A page followed by more results.
    #[must_use]
    pub fn with_cursor(items: Vec<Record>, cursor: Value) -> Self {
        Self {
            items,
            cursor: Some(cursor),
        }
    }
}

/// How sequence-valued fields are combined during a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayPolicy {
    /// The patch sequence replaces the stored one.
    Replace,
    /// The patch sequence is appended to the stored one.
    #[default]
    Concat,
}

/// Result of a conditional store write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The store's condition did not hold; nothing was written.
    ConditionFailed,
}

/// Resolved field and collection names for one adapter instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFields {
    pub identifier: String,
    pub version: String,
    /// Table, node label or bucket prefix depending on the engine.
    pub collection: String,
}

impl ModelFields {
    pub fn new(
        identifier: impl Into<String>,
        version: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            version: version.into(),
            collection: collection.into(),
        }
    }

    /// Identifier value of `record`, if present and non-null.
    #[must_use]
    pub fn identifier_of<'a>(&self, record: &'a Record) -> Option<&'a Value> {
        record.get(&self.identifier).filter(|v| !v.is_null())
    }

    /// Version value of `record`, if present.
    #[must_use]
    pub fn version_of<'a>(&self, record: &'a Record) -> Option<&'a Value> {
        record.get(&self.version)
    }

    /// Single-attribute primary key for `identifier`.
    #[must_use]
    pub fn key_for(&self, identifier: Value) -> Record {
        let mut key = Record::new();
        key.insert(self.identifier.clone(), identifier);
        key
    }
}

/// Render a scalar key value the way stores address it (strings unquoted).
#[must_use]
pub fn key_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build a record from a JSON value, rejecting non-objects.
pub fn into_record(value: Value) -> Option<Record> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

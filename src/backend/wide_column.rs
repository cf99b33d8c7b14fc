// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{StoreBackend, VersionGuard};
use crate::paginate;
use crate::record::{Page, Record, WriteOutcome};
use crate::storage::traits::{Condition, PageRequest, StorageError, WideColumnClient};

/// Store call used for a bounded read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadKind {
    Query,
    Scan,
}

/// A caller's bounded query or scan.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedRead {
    pub kind: ReadKind,
    pub request: PageRequest,
    /// Total items wanted across all pages. `None` reads to exhaustion.
    pub limit: Option<usize>,
    /// Single-attribute cursor hint: a scalar start key is re-wrapped as
    /// `{<unique_identifier>: key}` before it reaches the store.
    pub unique_identifier: Option<String>,
}

impl BoundedRead {
    #[must_use]
    pub fn scan(request: PageRequest) -> Self {
        Self {
            kind: ReadKind::Scan,
            request,
            limit: None,
            unique_identifier: None,
        }
    }

    #[must_use]
    pub fn query(request: PageRequest) -> Self {
        Self {
            kind: ReadKind::Query,
            ..Self::scan(request)
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_unique_identifier(mut self, field: impl Into<String>) -> Self {
        self.unique_identifier = Some(field.into());
        self
    }
}

/// How an update locates its base record.
#[derive(Debug, Clone, PartialEq)]
pub enum WideColumnLookup {
    /// Direct key lookup.
    Key(Record),
    /// First hit of a query.
    Query(BoundedRead),
}

pub struct WideColumnBackend {
    client: Arc<dyn WideColumnClient>,
    table: String,
    identifier_field: String,
}

impl WideColumnBackend {
    pub fn new(client: Arc<dyn WideColumnClient>, table: &str, identifier_field: &str) -> Self {
        Self {
            client,
            table: table.to_string(),
            identifier_field: identifier_field.to_string(),
        }
    }

    pub fn client(&self) -> &Arc<dyn WideColumnClient> {
        &self.client
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn key_for(&self, identifier: &Value) -> Record {
        let mut key = Record::new();
        key.insert(self.identifier_field.clone(), identifier.clone());
        key
    }
}

/// Wrap a scalar start key as a single-attribute key map.
fn rewrap_start_key(key: Value, unique_identifier: Option<&str>) -> Value {
    match (unique_identifier, key) {
        (Some(field), key) if !key.is_object() => {
            let mut wrapped = Record::new();
            wrapped.insert(field.to_string(), key);
            Value::Object(wrapped)
        }
        (_, key) => key,
    }
}

#[async_trait]
impl StoreBackend for WideColumnBackend {
    type Lookup = WideColumnLookup;
    type PageRequest = BoundedRead;

    fn engine(&self) -> &'static str {
        "wide_column"
    }

    async fn point_lookup(&self, lookup: &WideColumnLookup) -> Result<Option<Record>, StorageError> {
        match lookup {
            WideColumnLookup::Key(key) => self.client.get(&self.table, key).await,
            WideColumnLookup::Query(read) => {
                let hits = paginate::resolve(self, read, Some(1)).await?;
                Ok(hits.into_iter().next())
            }
        }
    }

    async fn fetch_page(&self, read: &BoundedRead, cursor: Option<&Value>) -> Result<Page, StorageError> {
        let mut request = read.request.clone();
        let start = cursor.cloned().or_else(|| request.exclusive_start_key.take());
        request.exclusive_start_key =
            start.map(|key| rewrap_start_key(key, read.unique_identifier.as_deref()));

        debug!(
            table = %self.table,
            kind = ?read.kind,
            index = ?request.index_name,
            start = ?request.exclusive_start_key,
            "Fetching page"
        );
        match read.kind {
            ReadKind::Query => self.client.query(&self.table, &request).await,
            ReadKind::Scan => self.client.scan(&self.table, &request).await,
        }
    }

    async fn conditional_write(
        &self,
        record: &Record,
        guard: &VersionGuard,
    ) -> Result<WriteOutcome, StorageError> {
        let condition = Condition::AttributeEquals {
            field: guard.version_field.clone(),
            value: guard.expected.clone(),
        };
        debug!(
            table = %self.table,
            condition = %condition.to_expression().expression,
            "Conditional put"
        );
        self.client.put(&self.table, record, Some(&condition)).await
    }

    async fn point_delete(&self, identifier: &Value) -> Result<Option<Record>, StorageError> {
        self.client.delete(&self.table, &self.key_for(identifier)).await
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{StoreBackend, VersionGuard};
use crate::record::{Page, Record, WriteOutcome};
use crate::storage::traits::{AccessMode, GraphClient, GraphRow, GraphValue, Statement, StorageError};

/// Graph engine backend. Session handling is the caller's concern: every
/// method assumes a session is already open on the client.
pub struct GraphBackend {
    client: Arc<dyn GraphClient>,
    label: String,
    identifier_field: String,
    version_field: String,
}

impl GraphBackend {
    pub fn new(
        client: Arc<dyn GraphClient>,
        label: &str,
        identifier_field: &str,
        version_field: &str,
    ) -> Self {
        Self {
            client,
            label: label.to_string(),
            identifier_field: identifier_field.to_string(),
            version_field: version_field.to_string(),
        }
    }

    pub fn client(&self) -> &Arc<dyn GraphClient> {
        &self.client
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn create_statement(&self, data: Record) -> Statement {
        Statement::new(format!("CREATE (n:{} $placeholder) RETURN n", self.label))
            .param("placeholder", Value::Object(data))
    }

    #[must_use]
    pub fn lookup_statement(&self, identifier: &Value) -> Statement {
        Statement::new(format!(
            "MATCH (n:{}) WHERE n.{} = $id RETURN n LIMIT 1",
            self.label, self.identifier_field
        ))
        .param("id", identifier.clone())
    }

    #[must_use]
    pub fn guarded_set_statement(&self, record: &Record, guard: &VersionGuard) -> Statement {
        Statement::new(format!(
            "MATCH (n:{}) WHERE n.{} = $id AND n.{} = $version SET n = $placeholder RETURN n",
            self.label, self.identifier_field, self.version_field
        ))
        .param("id", guard.identifier.clone())
        .param("version", guard.expected.clone())
        .param("placeholder", Value::Object(record.clone()))
    }

    #[must_use]
    pub fn delete_statement(&self, identifier: &Value) -> Statement {
        Statement::new(format!(
            "MATCH (n:{}) WHERE n.{} = $id WITH n LIMIT 1 DETACH DELETE n",
            self.label, self.identifier_field
        ))
        .param("id", identifier.clone())
    }

    pub async fn run(&self, statement: &Statement, mode: AccessMode) -> Result<Vec<GraphRow>, StorageError> {
        debug!(label = %self.label, statement = %statement.text, ?mode, "Running statement");
        self.client.run(statement, mode).await
    }
}

/// Node properties of every node column, row by row.
#[must_use]
pub fn node_properties(rows: Vec<GraphRow>) -> Vec<Record> {
    rows.into_iter()
        .flatten()
        .filter_map(|value| match value {
            GraphValue::Node { properties, .. } => Some(properties),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl StoreBackend for GraphBackend {
    type Lookup = Statement;
    type PageRequest = Statement;

    fn engine(&self) -> &'static str {
        "graph"
    }

    async fn point_lookup(&self, statement: &Statement) -> Result<Option<Record>, StorageError> {
        let rows = self.run(statement, AccessMode::Read).await?;
        Ok(node_properties(rows).into_iter().next())
    }

    /// Graph matches are not paged: one call, no cursor.
    async fn fetch_page(&self, statement: &Statement, _cursor: Option<&Value>) -> Result<Page, StorageError> {
        let rows = self.run(statement, AccessMode::Read).await?;
        Ok(Page::last(node_properties(rows)))
    }

    async fn conditional_write(
        &self,
        record: &Record,
        guard: &VersionGuard,
    ) -> Result<WriteOutcome, StorageError> {
        let statement = self.guarded_set_statement(record, guard);
        let rows = self.run(&statement, AccessMode::Write).await?;
        if rows.is_empty() {
            Ok(WriteOutcome::ConditionFailed)
        } else {
            Ok(WriteOutcome::Written)
        }
    }

    /// Two steps: the delete statement does not return the removed node.
    async fn point_delete(&self, identifier: &Value) -> Result<Option<Record>, StorageError> {
        let Some(existing) = self.point_lookup(&self.lookup_statement(identifier)).await? else {
            return Ok(None);
        };
        self.run(&self.delete_statement(identifier), AccessMode::Write).await?;
        Ok(Some(existing))
    }
}

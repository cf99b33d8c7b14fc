// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Graph adapter.
//!
//! In auto-connect mode (the default) every public call opens a session,
//! runs, and closes it again, even when the call fails. In manual mode the
//! caller pairs [`GraphAdapter::open`] and [`GraphAdapter::close`] around
//! any sequence of calls.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{AdapterContext, Outcome};
use crate::backend::{node_properties, GraphBackend, StoreBackend};
use crate::error::{AdapterError, Result};
use crate::metrics::{record_result, LatencyTimer};
use crate::notify::Operation;
use crate::paginate;
use crate::record::{into_record, ArrayPolicy, ModelFields, Record};
use crate::storage::traits::{AccessMode, GraphClient, GraphRow, GraphValue, Statement};
use crate::update::{self, UpdateRequest};

const ENGINE: &str = "graph";

/// A serialized operation, tagged by `"operation"`.
///
/// `query` is the statement text and `placeholder` its named parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum GraphCommand {
    Create {
        data: Record,
    },
    CreateRelationship {
        query: String,
        #[serde(default)]
        placeholder: Record,
    },
    #[serde(alias = "read")]
    Match {
        query: String,
        #[serde(default)]
        placeholder: Record,
        /// Return the label-grouped form instead of flat node properties.
        #[serde(default)]
        grouped: bool,
    },
    #[serde(alias = "set")]
    Update {
        query: String,
        #[serde(default)]
        placeholder: Record,
        data: Record,
        #[serde(default)]
        array_policy: ArrayPolicy,
        #[serde(default)]
        expected_version: Option<Value>,
    },
    #[serde(alias = "remove")]
    Delete {
        identifier: Value,
    },
}

fn statement(query: String, placeholder: Record) -> Statement {
    Statement {
        text: query,
        params: placeholder,
    }
}

pub struct GraphAdapter {
    backend: GraphBackend,
    context: AdapterContext,
    auto_connect: bool,
}

impl GraphAdapter {
    pub fn new(client: Arc<dyn GraphClient>, context: AdapterContext, auto_connect: bool) -> Self {
        let backend = GraphBackend::new(
            client,
            &context.fields.collection,
            &context.fields.identifier,
            &context.fields.version,
        );
        Self {
            backend,
            context,
            auto_connect,
        }
    }

    #[must_use]
    pub fn fields(&self) -> &ModelFields {
        &self.context.fields
    }

    #[must_use]
    pub fn auto_connect(&self) -> bool {
        self.auto_connect
    }

    /// Open a session (manual mode).
    pub async fn open(&self) -> Result<()> {
        debug!(label = %self.backend.label(), "Opening session");
        Ok(self.backend.client().open().await?)
    }

    /// Close the session opened by [`Self::open`].
    pub async fn close(&self) -> Result<()> {
        debug!(label = %self.backend.label(), "Closing session");
        Ok(self.backend.client().close().await?)
    }

    async fn auto_open(&self) -> Result<()> {
        if self.auto_connect {
            self.open().await?;
        }
        Ok(())
    }

    /// Close the auto-opened session, keeping the call's own error first.
    async fn auto_close<T>(&self, result: Result<T>) -> Result<T> {
        if !self.auto_connect {
            return result;
        }
        match (result, self.close().await) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close)) => Err(close),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close)) => {
                warn!(error = %close, "Failed to close session after error");
                Err(e)
            }
        }
    }

    /// Run one trivial read. Failures report `false`.
    pub async fn check(&self) -> bool {
        let probe = Statement::new("MATCH (n) RETURN n LIMIT 1");
        let result = match self.auto_open().await {
            Ok(()) => {
                let ran = self.backend.run(&probe, AccessMode::Read).await.map_err(AdapterError::from);
                self.auto_close(ran).await
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(_) => true,
            Err(e) => {
                warn!(label = %self.backend.label(), error = %e, "Health check failed");
                false
            }
        }
    }

    /// Create a node. There is no existence guard: a duplicate identifier
    /// creates a second node.
    pub async fn create(&self, data: Record) -> Result<Record> {
        let _timer = LatencyTimer::new(ENGINE, "create");
        let node = self.context.project(data).await?;
        self.auto_open().await?;
        let ran = self
            .backend
            .run(&self.backend.create_statement(node.clone()), AccessMode::Write)
            .await
            .map_err(AdapterError::from);
        let result = self.auto_close(ran).await;
        record_result(ENGINE, "create", &result);
        result?;
        self.context.publish(Operation::Create, &node).await;
        Ok(node)
    }

    /// Run a caller-supplied relationship statement.
    ///
    /// The statement must contain a relationship pattern (`-` and `[`) and
    /// bind its values through `$` placeholders. Both are checked before any
    /// store call.
    pub async fn create_relationship(&self, statement: Statement) -> Result<Vec<GraphRow>> {
        if !(statement.text.contains('-') && statement.text.contains('[')) {
            return Err(AdapterError::Integrity(
                "Please only use this function to create relationships".into(),
            ));
        }
        require_placeholders(&statement)?;

        let _timer = LatencyTimer::new(ENGINE, "create_relationship");
        self.auto_open().await?;
        let ran = self
            .backend
            .run(&statement, AccessMode::Write)
            .await
            .map_err(AdapterError::from);
        let result = self.auto_close(ran).await;
        record_result(ENGINE, "create_relationship", &result);
        let rows = result?;
        if !rows.is_empty() {
            let summary = rows.iter().map(row_json).collect();
            self.context.publisher.publish(Operation::Create, Value::Array(summary)).await;
        }
        Ok(rows)
    }

    /// Node properties of every node column matched by `statement`.
    pub async fn match_nodes(&self, statement: Statement) -> Result<Vec<Record>> {
        let _timer = LatencyTimer::new(ENGINE, "match");
        self.auto_open().await?;
        let read = paginate::resolve(&self.backend, &statement, None)
            .await
            .map_err(AdapterError::from);
        let result = self.auto_close(read).await;
        record_result(ENGINE, "match", &result);
        result
    }

    pub async fn read(&self, statement: Statement) -> Result<Vec<Record>> {
        self.match_nodes(statement).await
    }

    /// Match and serialize grouped by label.
    ///
    /// Without relationships in the result the shape is
    /// `{<node label>: [properties, ...]}`. Otherwise each relationship's start
    /// node is listed under its labels (joined with `-`) with the end node's
    /// properties nested under the relationship type, duplicates removed.
    pub async fn read_grouped(&self, statement: Statement) -> Result<Record> {
        let _timer = LatencyTimer::new(ENGINE, "read_grouped");
        self.auto_open().await?;
        let ran = self
            .backend
            .run(&statement, AccessMode::Read)
            .await
            .map_err(AdapterError::from);
        let result = self.auto_close(ran).await;
        record_result(ENGINE, "read_grouped", &result);
        Ok(group_by_label(self.backend.label(), result?))
    }

    /// Raw read. Values must be bound through `$` placeholders.
    pub async fn query(&self, statement: Statement) -> Result<Vec<GraphRow>> {
        require_placeholders(&statement)?;
        let _timer = LatencyTimer::new(ENGINE, "query");
        self.auto_open().await?;
        let ran = self
            .backend
            .run(&statement, AccessMode::Read)
            .await
            .map_err(AdapterError::from);
        let result = self.auto_close(ran).await;
        record_result(ENGINE, "query", &result);
        result
    }

    /// Optimistic read-merge-write. The lookup statement picks the base
    /// record; the guarded `SET` targets that record's identifier.
    pub async fn update(&self, request: UpdateRequest<Statement>) -> Result<Record> {
        let _timer = LatencyTimer::new(ENGINE, "update");
        self.auto_open().await?;
        let applied = update::apply(
            &self.backend,
            self.context.projector.as_ref(),
            &self.context.fields,
            request,
        )
        .await;
        let result = self.auto_close(applied).await;
        record_result(ENGINE, "update", &result);
        let written = result?;
        self.context.publish(Operation::Update, &written).await;
        Ok(written)
    }

    pub async fn set(&self, request: UpdateRequest<Statement>) -> Result<Record> {
        self.update(request).await
    }

    /// Delete the node with `identifier`, returning its properties.
    pub async fn delete(&self, identifier: Value) -> Result<Record> {
        let _timer = LatencyTimer::new(ENGINE, "delete");
        self.auto_open().await?;
        let removed = match self.backend.point_delete(&identifier).await {
            Ok(Some(prior)) => Ok(prior),
            Ok(None) => Err(AdapterError::NotFound { operation: "delete" }),
            Err(e) => Err(e.into()),
        };
        let result = self.auto_close(removed).await;
        record_result(ENGINE, "delete", &result);
        let prior = result?;
        self.context.publish(Operation::Delete, &prior).await;
        Ok(prior)
    }

    pub async fn remove(&self, identifier: Value) -> Result<Record> {
        self.delete(identifier).await
    }

    /// Run a serialized command.
    pub async fn execute(&self, command: GraphCommand) -> Result<Outcome> {
        let outcome = match command {
            GraphCommand::Create { data } => Outcome::Record(self.create(data).await?),
            GraphCommand::CreateRelationship { query, placeholder } => {
                let rows = self.create_relationship(statement(query, placeholder)).await?;
                Outcome::Records(rows.iter().filter_map(|row| into_record(row_json(row))).collect())
            }
            GraphCommand::Match {
                query,
                placeholder,
                grouped: false,
            } => Outcome::Records(self.match_nodes(statement(query, placeholder)).await?),
            GraphCommand::Match {
                query,
                placeholder,
                grouped: true,
            } => Outcome::Record(self.read_grouped(statement(query, placeholder)).await?),
            GraphCommand::Update {
                query,
                placeholder,
                data,
                array_policy,
                expected_version,
            } => {
                let request = UpdateRequest {
                    lookup: statement(query, placeholder),
                    data,
                    array_policy,
                    expected_version,
                };
                Outcome::Record(self.update(request).await?)
            }
            GraphCommand::Delete { identifier } => Outcome::Record(self.delete(identifier).await?),
        };
        Ok(outcome)
    }
}

fn require_placeholders(statement: &Statement) -> Result<()> {
    if statement.text.contains('$') {
        Ok(())
    } else {
        Err(AdapterError::Security(
            "You must use placeholders with symbol $ to avoid injection".into(),
        ))
    }
}

fn value_json(value: &GraphValue) -> Value {
    match value {
        GraphValue::Node { id, labels, properties } => json!({
            "identity": id,
            "labels": labels,
            "properties": properties,
        }),
        GraphValue::Relationship {
            start,
            end,
            kind,
            properties,
        } => json!({
            "start": start,
            "end": end,
            "type": kind,
            "properties": properties,
        }),
        GraphValue::Scalar(value) => value.clone(),
    }
}

/// One row as `{column index: value}`.
fn row_json(row: &GraphRow) -> Value {
    Value::Object(
        row.iter()
            .enumerate()
            .map(|(index, value)| (index.to_string(), value_json(value)))
            .collect(),
    )
}

/// Label-grouped serialization of raw rows.
fn group_by_label(label: &str, rows: Vec<GraphRow>) -> Record {
    let has_edges = rows
        .iter()
        .flatten()
        .any(|value| matches!(value, GraphValue::Relationship { .. }));
    if !has_edges {
        let nodes = node_properties(rows).into_iter().map(Value::Object).collect();
        let mut grouped = Record::new();
        grouped.insert(label.to_string(), Value::Array(nodes));
        return grouped;
    }

    let mut grouped: Record = Record::new();
    for row in &rows {
        let nodes: BTreeMap<i64, (&Vec<String>, &Record)> = row
            .iter()
            .filter_map(|value| match value {
                GraphValue::Node { id, labels, properties } => Some((*id, (labels, properties))),
                _ => None,
            })
            .collect();

        // start node -> its properties plus one entry per outgoing relationship type
        let mut connections: BTreeMap<i64, (String, Record)> = BTreeMap::new();
        for value in row {
            let GraphValue::Relationship { start, end, kind, .. } = value else {
                continue;
            };
            let (Some((labels, properties)), Some((_, end_properties))) = (nodes.get(start), nodes.get(end)) else {
                continue;
            };
            let entry = connections
                .entry(*start)
                .or_insert_with(|| (labels.join("-"), (*properties).clone()));
            entry.1.insert(kind.clone(), Value::Object((*end_properties).clone()));
        }

        for (group, node) in connections.into_values() {
            let members = grouped
                .entry(group)
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(members) = members {
                let node = Value::Object(node);
                if !members.contains(&node) {
                    members.push(node);
                }
            }
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotifierConfig;
    use crate::notify::{MemorySink, Publisher};
    use crate::storage::graph_memory::MemoryGraph;
    use crate::storage::traits::StorageError;

    fn record(value: Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    fn adapter(auto_connect: bool) -> (Arc<MemoryGraph>, Arc<MemorySink>, GraphAdapter) {
        let graph = Arc::new(MemoryGraph::new());
        let sink = Arc::new(MemorySink::new());
        let notifier = NotifierConfig {
            topic: Some("users".into()),
            ..Default::default()
        };
        let context = AdapterContext::bare(ModelFields::new("id", "modified", "User"))
            .with_publisher(Publisher::new(sink.clone(), &notifier, "User", "id"));
        (graph.clone(), sink, GraphAdapter::new(graph, context, auto_connect))
    }

    fn by_id(id: &str) -> Statement {
        Statement::new("MATCH (n:User) WHERE n.id = $id RETURN n").param("id", id)
    }

    #[tokio::test]
    async fn test_auto_connect_wraps_each_call() {
        let (graph, _, adapter) = adapter(true);

        adapter.create(record(json!({"id": "a", "modified": 1}))).await.unwrap();
        let found = adapter.match_nodes(by_id("a")).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(graph.open_sessions(), 0);
        assert_eq!(graph.sessions_opened(), 2);
    }

    #[tokio::test]
    async fn test_auto_connect_closes_after_failure() {
        let (graph, _, adapter) = adapter(true);
        let err = adapter.delete(json!("ghost")).await.unwrap_err();
        assert!(matches!(err, AdapterError::NotFound { operation: "delete" }));
        assert_eq!(graph.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_manual_mode_requires_open() {
        let (graph, _, adapter) = adapter(false);

        let err = adapter.match_nodes(by_id("a")).await.unwrap_err();
        assert!(matches!(err, AdapterError::Store(StorageError::Session(_))));

        adapter.open().await.unwrap();
        adapter.create(record(json!({"id": "a", "modified": 1}))).await.unwrap();
        adapter.create(record(json!({"id": "b", "modified": 1}))).await.unwrap();
        assert_eq!(graph.sessions_opened(), 1);
        adapter.close().await.unwrap();
        assert_eq!(graph.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_create_has_no_existence_guard() {
        let (graph, sink, adapter) = adapter(true);
        adapter.create(record(json!({"id": "a", "modified": 1}))).await.unwrap();
        adapter.create(record(json!({"id": "a", "modified": 1}))).await.unwrap();
        assert_eq!(graph.nodes_with_label("User").len(), 2);
        assert_eq!(sink.len(), 2);
    }

    #[tokio::test]
    async fn test_create_relationship_validation_precedes_store() {
        let (graph, _, adapter) = adapter(true);

        let no_pattern = Statement::new("MATCH (n:User) WHERE n.id = $id RETURN n");
        assert!(matches!(
            adapter.create_relationship(no_pattern).await,
            Err(AdapterError::Integrity(_))
        ));

        let no_placeholder = Statement::new("MATCH (a:User), (b:User) CREATE (a)-[:KNOWS]->(b)");
        assert!(matches!(
            adapter.create_relationship(no_placeholder).await,
            Err(AdapterError::Security(_))
        ));

        assert!(graph.statements().is_empty());
        assert_eq!(graph.sessions_opened(), 0);
    }

    #[tokio::test]
    async fn test_create_relationship_and_read_grouped() {
        let (graph, _, adapter) = adapter(true);
        adapter.create(record(json!({"id": "a", "modified": 1}))).await.unwrap();
        adapter.create(record(json!({"id": "b", "modified": 1}))).await.unwrap();

        let link = Statement::new(
            "MATCH (a:User), (b:User) WHERE a.id = $from AND b.id = $to CREATE (a)-[r:KNOWS]->(b) RETURN r",
        )
        .param("from", "a")
        .param("to", "b");
        let rows = adapter.create_relationship(link).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(graph.relationship_count(), 1);

        let grouped = adapter
            .read_grouped(Statement::new("MATCH (a:User)-[r:KNOWS]->(b:User) RETURN a, r, b"))
            .await
            .unwrap();
        assert_eq!(
            Value::Object(grouped),
            json!({"User": [{"id": "a", "modified": 1, "KNOWS": {"id": "b", "modified": 1}}]})
        );
    }

    #[tokio::test]
    async fn test_read_grouped_without_relationships() {
        let (_, _, adapter) = adapter(true);
        adapter.create(record(json!({"id": "a", "modified": 1}))).await.unwrap();

        let grouped = adapter.read_grouped(by_id("a")).await.unwrap();

        assert_eq!(Value::Object(grouped), json!({"User": [{"id": "a", "modified": 1}]}));
    }

    #[tokio::test]
    async fn test_query_requires_placeholder() {
        let (_, _, adapter) = adapter(true);
        let err = adapter.query(Statement::new("MATCH (n) RETURN n")).await.unwrap_err();
        assert!(matches!(err, AdapterError::Security(_)));
    }

    #[tokio::test]
    async fn test_update_and_stale_update() {
        let (graph, sink, adapter) = adapter(true);
        adapter.create(record(json!({"id": "a", "modified": 1, "tags": ["x"]}))).await.unwrap();

        let request = UpdateRequest::new(by_id("a"), record(json!({"tags": ["y"], "modified": 2}))).expecting(1);
        let written = adapter.set(request).await.unwrap();
        assert_eq!(written["tags"], json!(["x", "y"]));

        let stale = UpdateRequest::new(by_id("a"), record(json!({"tags": ["z"]}))).expecting(1);
        assert!(matches!(
            adapter.update(stale).await,
            Err(AdapterError::VersionConflict { .. })
        ));
        assert_eq!(graph.nodes_with_label("User")[0]["modified"], json!(2));
        assert_eq!(graph.open_sessions(), 0);
        assert_eq!(sink.drain().last().unwrap().operation, Operation::Update);
    }

    #[tokio::test]
    async fn test_remove_returns_captured_node() {
        let (graph, sink, adapter) = adapter(true);
        adapter.create(record(json!({"id": "a", "modified": 1}))).await.unwrap();

        let removed = adapter.remove(json!("a")).await.unwrap();

        assert_eq!(removed["id"], json!("a"));
        assert!(graph.nodes_with_label("User").is_empty());
        assert_eq!(sink.drain().last().unwrap().operation, Operation::Delete);
    }

    #[tokio::test]
    async fn test_check() {
        let (graph, _, adapter) = adapter(true);
        assert!(adapter.check().await);
        graph.set_unavailable(true);
        assert!(!adapter.check().await);
        assert_eq!(graph.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_execute_dispatch_aliases() {
        let (_, _, adapter) = adapter(true);
        let create: GraphCommand =
            serde_json::from_value(json!({"operation": "create", "data": {"id": "a", "modified": 1}})).unwrap();
        adapter.execute(create).await.unwrap();

        let read: GraphCommand = serde_json::from_value(json!({
            "operation": "read",
            "query": "MATCH (n:User) WHERE n.id = $id RETURN n",
            "placeholder": {"id": "a"}
        }))
        .unwrap();
        let outcome = adapter.execute(read).await.unwrap();
        assert_eq!(outcome.into_value(), json!([{"id": "a", "modified": 1}]));

        let remove: GraphCommand =
            serde_json::from_value(json!({"operation": "remove", "identifier": "a"})).unwrap();
        assert!(matches!(adapter.execute(remove).await.unwrap(), Outcome::Record(_)));
    }
}

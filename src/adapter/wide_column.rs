// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::{AdapterContext, CreateMode, Outcome};
use crate::backend::{BoundedRead, ReadKind, WideColumnBackend, WideColumnLookup};
use crate::error::{AdapterError, Result};
use crate::metrics::{record_batch_size, record_result, LatencyTimer};
use crate::notify::Operation;
use crate::paginate;
use crate::record::{key_string, ArrayPolicy, ModelFields, Record, WriteOutcome};
use crate::storage::traits::{Condition, PageRequest, WideColumnClient, MAX_BATCH_GET, MAX_BATCH_WRITE};
use crate::update::{self, UpdateRequest};

const ENGINE: &str = "wide_column";

/// Read dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum WideColumnRead {
    Get(Record),
    Query(BoundedRead),
    Scan(BoundedRead),
}

/// A serialized operation, tagged by `"operation"`.
///
/// ```
/// use dta_adapter::adapter::WideColumnCommand;
/// use serde_json::json;
///
/// let command: WideColumnCommand = serde_json::from_value(json!({
///     "operation": "scan",
///     "query": {"page_size": 10},
///     "limit": 25
/// })).unwrap();
/// assert!(matches!(command, WideColumnCommand::Scan { limit: Some(25), .. }));
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum WideColumnCommand {
    Insert {
        data: Record,
    },
    Overwrite {
        data: Record,
    },
    Get {
        key: Record,
    },
    Query {
        query: PageRequest,
        #[serde(default)]
        limit: Option<usize>,
        #[serde(default)]
        unique_identifier: Option<String>,
    },
    Scan {
        #[serde(default)]
        query: PageRequest,
        #[serde(default)]
        limit: Option<usize>,
        #[serde(default)]
        unique_identifier: Option<String>,
    },
    /// Locate by `key`, or by the first hit of `query` when no key is given.
    Update {
        #[serde(default)]
        key: Option<Record>,
        #[serde(default)]
        query: Option<PageRequest>,
        data: Record,
        #[serde(default)]
        array_policy: ArrayPolicy,
        #[serde(default)]
        expected_version: Option<Value>,
    },
    Delete {
        key: Record,
    },
    BatchOverwrite {
        data: Vec<Record>,
    },
    BatchGet {
        keys: Vec<Record>,
        #[serde(default)]
        batch_size: Option<usize>,
    },
}

fn bounded(kind: ReadKind, request: PageRequest, limit: Option<usize>, hint: Option<String>) -> BoundedRead {
    BoundedRead {
        kind,
        request,
        limit,
        unique_identifier: hint,
    }
}

pub struct WideColumnAdapter {
    backend: WideColumnBackend,
    context: AdapterContext,
}

impl WideColumnAdapter {
    pub fn new(client: Arc<dyn WideColumnClient>, context: AdapterContext) -> Self {
        let backend = WideColumnBackend::new(client, &context.fields.collection, &context.fields.identifier);
        Self { backend, context }
    }

    #[must_use]
    pub fn fields(&self) -> &ModelFields {
        &self.context.fields
    }

    fn table(&self) -> &str {
        self.backend.table()
    }

    /// Scan one item. Store failures report `false`.
    pub async fn check(&self) -> bool {
        let probe = PageRequest {
            page_size: Some(1),
            ..Default::default()
        };
        match self.backend.client().scan(self.table(), &probe).await {
            Ok(_) => true,
            Err(e) => {
                warn!(table = %self.table(), error = %e, "Health check failed");
                false
            }
        }
    }

    pub async fn create(&self, data: Record, mode: CreateMode) -> Result<Record> {
        match mode {
            CreateMode::Insert => self.insert(data).await,
            CreateMode::Overwrite => self.overwrite(data).await,
        }
    }

    /// Put guarded by `attribute_not_exists(<identifier>)`.
    pub async fn insert(&self, data: Record) -> Result<Record> {
        let _timer = LatencyTimer::new(ENGINE, "insert");
        let result = self.put(data, CreateMode::Insert).await;
        record_result(ENGINE, "insert", &result);
        result
    }

    /// Unconditional put.
    pub async fn overwrite(&self, data: Record) -> Result<Record> {
        let _timer = LatencyTimer::new(ENGINE, "overwrite");
        let result = self.put(data, CreateMode::Overwrite).await;
        record_result(ENGINE, "overwrite", &result);
        result
    }

    async fn put(&self, data: Record, mode: CreateMode) -> Result<Record> {
        let item = self.context.project(data).await?;
        let condition = match mode {
            CreateMode::Insert => Some(Condition::AttributeNotExists(self.fields().identifier.clone())),
            CreateMode::Overwrite => None,
        };
        debug!(
            table = %self.table(),
            ?mode,
            condition = ?condition.as_ref().map(|c| c.to_expression().expression),
            "Put item"
        );
        match self.backend.client().put(self.table(), &item, condition.as_ref()).await? {
            WriteOutcome::Written => {
                self.context.publish(Operation::Create, &item).await;
                Ok(item)
            }
            WriteOutcome::ConditionFailed => Err(AdapterError::AlreadyExists {
                identifier: self
                    .fields()
                    .identifier_of(&item)
                    .map(key_string)
                    .unwrap_or_default(),
            }),
        }
    }

    pub async fn read(&self, read: WideColumnRead) -> Result<Vec<Record>> {
        match read {
            WideColumnRead::Get(key) => Ok(self.get(key).await?.into_iter().collect()),
            WideColumnRead::Query(bounded) => self.query(bounded).await,
            WideColumnRead::Scan(bounded) => self.scan(bounded).await,
        }
    }

    pub async fn get(&self, key: Record) -> Result<Option<Record>> {
        let _timer = LatencyTimer::new(ENGINE, "get");
        let result = self
            .backend
            .client()
            .get(self.table(), &key)
            .await
            .map_err(AdapterError::from);
        record_result(ENGINE, "get", &result);
        result
    }

    /// Bounded query; `read.kind` is forced to `Query`.
    pub async fn query(&self, mut read: BoundedRead) -> Result<Vec<Record>> {
        read.kind = ReadKind::Query;
        self.bounded_read(read, "query").await
    }

    /// Bounded scan; `read.kind` is forced to `Scan`.
    pub async fn scan(&self, mut read: BoundedRead) -> Result<Vec<Record>> {
        read.kind = ReadKind::Scan;
        self.bounded_read(read, "scan").await
    }

    async fn bounded_read(&self, read: BoundedRead, operation: &'static str) -> Result<Vec<Record>> {
        let _timer = LatencyTimer::new(ENGINE, operation);
        let result = paginate::resolve(&self.backend, &read, read.limit)
            .await
            .map_err(AdapterError::from);
        record_result(ENGINE, operation, &result);
        result
    }

    /// Optimistic read-merge-write; publishes `update` on success.
    pub async fn update(&self, request: UpdateRequest<WideColumnLookup>) -> Result<Record> {
        let _timer = LatencyTimer::new(ENGINE, "update");
        let result = update::apply(
            &self.backend,
            self.context.projector.as_ref(),
            &self.context.fields,
            request,
        )
        .await;
        record_result(ENGINE, "update", &result);
        let written = result?;
        self.context.publish(Operation::Update, &written).await;
        Ok(written)
    }

    /// Delete by key, returning the prior item.
    pub async fn delete(&self, key: Record) -> Result<Record> {
        let _timer = LatencyTimer::new(ENGINE, "delete");
        let result = match self.backend.client().delete(self.table(), &key).await {
            Ok(Some(prior)) => Ok(prior),
            Ok(None) => Err(AdapterError::NotFound { operation: "delete" }),
            Err(e) => Err(e.into()),
        };
        record_result(ENGINE, "delete", &result);
        let prior = result?;
        self.context.publish(Operation::Delete, &prior).await;
        Ok(prior)
    }

    /// Project every item, then write in chunks of [`MAX_BATCH_WRITE`].
    ///
    /// Chunks are written in order; a failure leaves earlier chunks written.
    #[instrument(skip_all, fields(table = %self.table(), items = data.len()))]
    pub async fn batch_overwrite(&self, data: Vec<Record>) -> Result<Vec<Record>> {
        let _timer = LatencyTimer::new(ENGINE, "batch_overwrite");
        let mut items = Vec::with_capacity(data.len());
        for record in data {
            items.push(self.context.project(record).await?);
        }

        for chunk in items.chunks(MAX_BATCH_WRITE) {
            debug!(chunk = chunk.len(), "Batch write");
            record_batch_size(ENGINE, "batch_overwrite", chunk.len());
            self.backend.client().batch_write(self.table(), chunk).await?;
            self.context.publisher.publish_each(Operation::Create, chunk).await;
        }
        Ok(items)
    }

    /// Point reads in chunks of `batch_size` (default and ceiling [`MAX_BATCH_GET`]).
    #[instrument(skip_all, fields(table = %self.table(), keys = keys.len()))]
    pub async fn batch_get(&self, keys: Vec<Record>, batch_size: Option<usize>) -> Result<Vec<Record>> {
        let batch_size = batch_size.unwrap_or(MAX_BATCH_GET);
        if batch_size == 0 || batch_size > MAX_BATCH_GET {
            return Err(AdapterError::InvalidRequest(format!(
                "batch_size must be between 1 and {MAX_BATCH_GET}, got {batch_size}"
            )));
        }
        let _timer = LatencyTimer::new(ENGINE, "batch_get");

        let mut found = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(batch_size) {
            debug!(chunk = chunk.len(), "Batch get");
            record_batch_size(ENGINE, "batch_get", chunk.len());
            found.extend(self.backend.client().batch_get(self.table(), chunk).await?);
        }
        Ok(found)
    }

    /// Run a serialized command.
    pub async fn execute(&self, command: WideColumnCommand) -> Result<Outcome> {
        let outcome = match command {
            WideColumnCommand::Insert { data } => Outcome::Record(self.insert(data).await?),
            WideColumnCommand::Overwrite { data } => Outcome::Record(self.overwrite(data).await?),
            WideColumnCommand::Get { key } => self.get(key).await?.into(),
            WideColumnCommand::Query {
                query,
                limit,
                unique_identifier,
            } => Outcome::Records(
                self.query(bounded(ReadKind::Query, query, limit, unique_identifier))
                    .await?,
            ),
            WideColumnCommand::Scan {
                query,
                limit,
                unique_identifier,
            } => Outcome::Records(
                self.scan(bounded(ReadKind::Scan, query, limit, unique_identifier))
                    .await?,
            ),
            WideColumnCommand::Update {
                key,
                query,
                data,
                array_policy,
                expected_version,
            } => {
                let lookup = match (key, query) {
                    (Some(key), _) => WideColumnLookup::Key(key),
                    (None, Some(query)) => WideColumnLookup::Query(BoundedRead::query(query)),
                    (None, None) => {
                        return Err(AdapterError::InvalidRequest(
                            "update needs a key or a query".into(),
                        ))
                    }
                };
                let request = UpdateRequest {
                    lookup,
                    data,
                    array_policy,
                    expected_version,
                };
                Outcome::Record(self.update(request).await?)
            }
            WideColumnCommand::Delete { key } => Outcome::Record(self.delete(key).await?),
            WideColumnCommand::BatchOverwrite { data } => Outcome::Records(self.batch_overwrite(data).await?),
            WideColumnCommand::BatchGet { keys, batch_size } => {
                Outcome::Records(self.batch_get(keys, batch_size).await?)
            }
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{MemorySink, Publisher};
    use crate::config::NotifierConfig;
    use crate::schema::SchemaMapper;
    use crate::storage::memory::MemoryWideColumn;
    use serde_json::json;

    fn record(value: Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    fn adapter() -> (Arc<MemoryWideColumn>, Arc<MemorySink>, WideColumnAdapter) {
        let store = Arc::new(MemoryWideColumn::new("id").with_page_size(3));
        let sink = Arc::new(MemorySink::new());
        let notifier = NotifierConfig {
            topic: Some("users".into()),
            ..Default::default()
        };
        let context = AdapterContext::bare(ModelFields::new("id", "v", "users"))
            .with_publisher(Publisher::new(sink.clone(), &notifier, "User", "id"));
        (store.clone(), sink, WideColumnAdapter::new(store, context))
    }

    #[tokio::test]
    async fn test_insert_then_insert_again_conflicts() {
        let (store, sink, adapter) = adapter();
        adapter.insert(record(json!({"id": "a", "v": 1}))).await.unwrap();

        let err = adapter.insert(record(json!({"id": "a", "v": 9}))).await.unwrap_err();

        assert!(matches!(err, AdapterError::AlreadyExists { ref identifier } if identifier == "a"));
        assert_eq!(store.peek("users", &json!("a")).unwrap()["v"], json!(1));
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_overwrite_replaces() {
        let (store, _, adapter) = adapter();
        adapter.create(record(json!({"id": "a", "v": 1})), CreateMode::Insert).await.unwrap();
        adapter.create(record(json!({"id": "a", "v": 2})), CreateMode::Overwrite).await.unwrap();
        assert_eq!(store.peek("users", &json!("a")).unwrap()["v"], json!(2));
    }

    #[tokio::test]
    async fn test_create_projects_through_schema() {
        let store = Arc::new(MemoryWideColumn::new("id"));
        let projector = SchemaMapper::from_value(json!({
            "type": "object",
            "properties": {"id": {"type": "string"}, "v": {"type": "integer"}}
        }));
        let context =
            AdapterContext::bare(ModelFields::new("id", "v", "users")).with_projector(Arc::new(projector));
        let adapter = WideColumnAdapter::new(store.clone(), context);

        let written = adapter.insert(record(json!({"id": "a", "v": 1, "junk": 1}))).await.unwrap();

        assert_eq!(Value::Object(written), json!({"id": "a", "v": 1}));
    }

    #[tokio::test]
    async fn test_read_dispatch() {
        let (store, _, adapter) = adapter();
        store.seed("users", (0..7).map(|i| record(json!({"id": format!("u{i}"), "v": 1}))));

        let got = adapter.read(WideColumnRead::Get(record(json!({"id": "u3"})))).await.unwrap();
        assert_eq!(got.len(), 1);

        let missing = adapter.read(WideColumnRead::Get(record(json!({"id": "zz"})))).await.unwrap();
        assert!(missing.is_empty());

        let scanned = adapter
            .read(WideColumnRead::Scan(BoundedRead::scan(PageRequest::default()).with_limit(4)))
            .await
            .unwrap();
        assert_eq!(scanned.len(), 4);
        assert_eq!(store.stats().scans, 2);
    }

    #[tokio::test]
    async fn test_update_publishes_after_write() {
        let (_, sink, adapter) = adapter();
        adapter.insert(record(json!({"id": "a", "v": 1, "tags": ["x"]}))).await.unwrap();
        sink.drain();

        let request = UpdateRequest::new(
            WideColumnLookup::Key(record(json!({"id": "a"}))),
            record(json!({"tags": ["y"], "v": 2})),
        )
        .expecting(1);
        adapter.update(request).await.unwrap();

        let sent = sink.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].operation, Operation::Update);
        assert_eq!(sent[0].message["tags"], json!(["x", "y"]));
    }

    #[tokio::test]
    async fn test_failed_update_does_not_publish() {
        let (_, sink, adapter) = adapter();
        let request = UpdateRequest::new(
            WideColumnLookup::Key(record(json!({"id": "ghost"}))),
            record(json!({"v": 2})),
        );
        assert!(adapter.update(request).await.is_err());
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_delete_returns_prior_and_missing_is_not_found() {
        let (_, sink, adapter) = adapter();
        adapter.insert(record(json!({"id": "a", "v": 1}))).await.unwrap();
        sink.drain();

        let prior = adapter.delete(record(json!({"id": "a"}))).await.unwrap();
        assert_eq!(prior["v"], json!(1));
        assert_eq!(sink.drain()[0].operation, Operation::Delete);

        let err = adapter.delete(record(json!({"id": "a"}))).await.unwrap_err();
        assert!(matches!(err, AdapterError::NotFound { operation: "delete" }));
    }

    #[tokio::test]
    async fn test_batch_get_chunks_and_validates_size() {
        let (store, _, adapter) = adapter();
        store.seed("users", (0..10).map(|i| record(json!({"id": format!("u{i}")}))));
        let keys: Vec<Record> = (0..10).map(|i| record(json!({"id": format!("u{i}")}))).collect();

        let found = adapter.batch_get(keys.clone(), Some(4)).await.unwrap();
        assert_eq!(found.len(), 10);
        assert_eq!(store.stats().batch_gets, 3);

        assert!(matches!(
            adapter.batch_get(keys.clone(), Some(101)).await,
            Err(AdapterError::InvalidRequest(_))
        ));
        assert!(matches!(adapter.batch_get(keys, Some(0)).await, Err(AdapterError::InvalidRequest(_))));
        assert_eq!(store.stats().batch_gets, 3);
    }

    #[tokio::test]
    async fn test_check_reports_store_health() {
        let (store, _, adapter) = adapter();
        assert!(adapter.check().await);
        store.set_unavailable(true);
        assert!(!adapter.check().await);
    }

    #[tokio::test]
    async fn test_execute_update_by_query() {
        let (store, _, adapter) = adapter();
        store.seed("users", [record(json!({"id": "a", "email": "a@x", "v": 1}))]);

        let command: WideColumnCommand = serde_json::from_value(json!({
            "operation": "update",
            "query": {"key_condition": {"email": "a@x"}},
            "data": {"name": "Ann", "v": 2},
            "expected_version": 1
        }))
        .unwrap();
        let outcome = adapter.execute(command).await.unwrap();

        assert_eq!(outcome.into_value()["name"], json!("Ann"));
        assert_eq!(store.peek("users", &json!("a")).unwrap()["v"], json!(2));
    }

    #[tokio::test]
    async fn test_execute_update_needs_locator() {
        let (_, _, adapter) = adapter();
        let command: WideColumnCommand =
            serde_json::from_value(json!({"operation": "update", "data": {}})).unwrap();
        assert!(matches!(adapter.execute(command).await, Err(AdapterError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_execute_get_missing() {
        let (_, _, adapter) = adapter();
        let command: WideColumnCommand =
            serde_json::from_value(json!({"operation": "get", "key": {"id": "nope"}})).unwrap();
        assert_eq!(adapter.execute(command).await.unwrap(), Outcome::Missing);
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory wide-column and object store clients.
//!
//! [`MemoryWideColumn`] behaves like a single-key wide-column table: items
//! are kept in key order, query/scan calls evaluate at most `page_size` items
//! and hand back the last evaluated key as a cursor, and conditional puts are
//! checked under the table lock so the compare-and-write is atomic.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;

use super::traits::{
    Condition, ObjectClient, PageRequest, StorageError, WideColumnClient, MAX_BATCH_GET, MAX_BATCH_WRITE,
};
use crate::record::{key_string, Page, Record, WriteOutcome};

const DEFAULT_PAGE_SIZE: usize = 100;

/// Snapshot of client call counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    pub gets: usize,
    pub puts: usize,
    pub queries: usize,
    pub scans: usize,
    pub deletes: usize,
    pub batch_writes: usize,
    pub batch_gets: usize,
}

#[derive(Default)]
struct Counters {
    gets: AtomicUsize,
    puts: AtomicUsize,
    queries: AtomicUsize,
    scans: AtomicUsize,
    deletes: AtomicUsize,
    batch_writes: AtomicUsize,
    batch_gets: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct MemoryWideColumn {
    key_field: String,
    page_size: usize,
    tables: RwLock<HashMap<String, BTreeMap<String, Record>>>,
    counters: Counters,
    unavailable: AtomicBool,
}

impl MemoryWideColumn {
    /// Create a store whose items are keyed by `key_field`.
    #[must_use]
    pub fn new(key_field: &str) -> Self {
        Self {
            key_field: key_field.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            tables: RwLock::new(HashMap::new()),
            counters: Counters::default(),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Items evaluated per query/scan call when the request has no page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Simulate an outage: every call fails with a backend error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Seed items directly, bypassing counters.
    pub fn seed(&self, table: &str, items: impl IntoIterator<Item = Record>) {
        let mut tables = self.tables.write();
        let rows = tables.entry(table.to_string()).or_default();
        for item in items {
            if let Some(key) = item.get(&self.key_field).map(key_string) {
                rows.insert(key, item);
            }
        }
    }

    /// Item count in `table`.
    #[must_use]
    pub fn len(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, BTreeMap::len)
    }

    #[must_use]
    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }

    /// Stored item, bypassing counters.
    #[must_use]
    pub fn peek(&self, table: &str, key: &Value) -> Option<Record> {
        self.tables
            .read()
            .get(table)
            .and_then(|rows| rows.get(&key_string(key)).cloned())
    }

    #[must_use]
    pub fn stats(&self) -> CallStats {
        let c = &self.counters;
        CallStats {
            gets: c.gets.load(Ordering::Relaxed),
            puts: c.puts.load(Ordering::Relaxed),
            queries: c.queries.load(Ordering::Relaxed),
            scans: c.scans.load(Ordering::Relaxed),
            deletes: c.deletes.load(Ordering::Relaxed),
            batch_writes: c.batch_writes.load(Ordering::Relaxed),
            batch_gets: c.batch_gets.load(Ordering::Relaxed),
        }
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("store unavailable".into()));
        }
        Ok(())
    }

    fn key_of(&self, record: &Record) -> Result<String, StorageError> {
        record
            .get(&self.key_field)
            .filter(|v| !v.is_null())
            .map(key_string)
            .ok_or_else(|| {
                StorageError::Backend(format!("missing key attribute '{}'", self.key_field))
            })
    }

    fn start_after(&self, request: &PageRequest) -> Result<Option<String>, StorageError> {
        match &request.exclusive_start_key {
            None => Ok(None),
            Some(Value::Object(key)) => self.key_of(key).map(Some),
            Some(other) => Err(StorageError::Backend(format!(
                "exclusive start key must be a key map, got {other}"
            ))),
        }
    }

    fn read_page(
        &self,
        table: &str,
        request: &PageRequest,
        conditions: &[&Record],
    ) -> Result<Page, StorageError> {
        let start_after = self.start_after(request)?;
        let page_size = request.page_size.unwrap_or(self.page_size).max(1);
        let tables = self.tables.read();
        let Some(rows) = tables.get(table) else {
            return Ok(Page::last(Vec::new()));
        };

        let mut remaining = rows
            .iter()
            .filter(|(key, _)| start_after.as_ref().map_or(true, |start| *key > start))
            .peekable();

        let mut items = Vec::new();
        let mut last_evaluated = None;
        for _ in 0..page_size {
            let Some((key, item)) = remaining.next() else {
                break;
            };
            last_evaluated = Some(key);
            if conditions.iter().all(|condition| matches(item, condition)) {
                items.push(item.clone());
            }
        }

        let cursor = match (remaining.peek(), last_evaluated) {
            (Some(_), Some(key)) => rows
                .get(key)
                .and_then(|item| item.get(&self.key_field))
                .map(|value| {
                    let mut cursor = Record::new();
                    cursor.insert(self.key_field.clone(), value.clone());
                    Value::Object(cursor)
                }),
            _ => None,
        };

        Ok(Page { items, cursor })
    }
}

fn matches(item: &Record, condition: &Record) -> bool {
    condition
        .iter()
        .all(|(field, expected)| item.get(field) == Some(expected))
}

#[async_trait]
impl WideColumnClient for MemoryWideColumn {
    async fn get(&self, table: &str, key: &Record) -> Result<Option<Record>, StorageError> {
        Counters::bump(&self.counters.gets);
        self.check_available()?;
        let key = self.key_of(key)?;
        Ok(self.tables.read().get(table).and_then(|rows| rows.get(&key).cloned()))
    }

    async fn put(
        &self,
        table: &str,
        item: &Record,
        condition: Option<&Condition>,
    ) -> Result<WriteOutcome, StorageError> {
        Counters::bump(&self.counters.puts);
        self.check_available()?;
        let key = self.key_of(item)?;
        let mut tables = self.tables.write();
        let rows = tables.entry(table.to_string()).or_default();
        if let Some(condition) = condition {
            if !condition.holds(rows.get(&key)) {
                return Ok(WriteOutcome::ConditionFailed);
            }
        }
        rows.insert(key, item.clone());
        Ok(WriteOutcome::Written)
    }

    async fn query(&self, table: &str, request: &PageRequest) -> Result<Page, StorageError> {
        Counters::bump(&self.counters.queries);
        self.check_available()?;
        if request.key_condition.is_empty() {
            return Err(StorageError::Backend("query requires a key condition".into()));
        }
        self.read_page(table, request, &[&request.key_condition, &request.filter])
    }

    async fn scan(&self, table: &str, request: &PageRequest) -> Result<Page, StorageError> {
        Counters::bump(&self.counters.scans);
        self.check_available()?;
        self.read_page(table, request, &[&request.filter])
    }

    async fn delete(&self, table: &str, key: &Record) -> Result<Option<Record>, StorageError> {
        Counters::bump(&self.counters.deletes);
        self.check_available()?;
        let key = self.key_of(key)?;
        Ok(self.tables.write().get_mut(table).and_then(|rows| rows.remove(&key)))
    }

    async fn batch_write(&self, table: &str, items: &[Record]) -> Result<(), StorageError> {
        Counters::bump(&self.counters.batch_writes);
        self.check_available()?;
        if items.len() > MAX_BATCH_WRITE {
            return Err(StorageError::Backend(format!(
                "batch write of {} items exceeds limit of {MAX_BATCH_WRITE}",
                items.len()
            )));
        }
        let keyed = items
            .iter()
            .map(|item| Ok((self.key_of(item)?, item.clone())))
            .collect::<Result<Vec<_>, StorageError>>()?;
        let mut tables = self.tables.write();
        tables.entry(table.to_string()).or_default().extend(keyed);
        Ok(())
    }

    async fn batch_get(&self, table: &str, keys: &[Record]) -> Result<Vec<Record>, StorageError> {
        Counters::bump(&self.counters.batch_gets);
        self.check_available()?;
        if keys.len() > MAX_BATCH_GET {
            return Err(StorageError::Backend(format!(
                "batch get of {} keys exceeds limit of {MAX_BATCH_GET}",
                keys.len()
            )));
        }
        let tables = self.tables.read();
        let Some(rows) = tables.get(table) else {
            return Ok(Vec::new());
        };
        let mut found = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(item) = rows.get(&self.key_of(key)?) {
                found.push(item.clone());
            }
        }
        Ok(found)
    }
}

/// Object store keeping bodies in a concurrent map.
pub struct MemoryObjectStore {
    objects: DashMap<String, Vec<u8>>,
}

impl MemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn path(bucket: &str, key: &str) -> String {
        format!("{bucket}/{key}")
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectClient for MemoryObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        self.objects.insert(Self::path(bucket, key), body);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.objects.get(&Self::path(bucket, key)).map(|r| r.value().clone()))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.objects.remove(&Self::path(bucket, key)).map(|(_, body)| body))
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        let scope = Self::path(bucket, prefix);
        let bucket_prefix = format!("{bucket}/");
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().starts_with(&scope))
            .filter_map(|entry| entry.key().strip_prefix(&bucket_prefix).map(String::from))
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(id: &str, group: &str) -> Record {
        serde_json::from_value(json!({"id": id, "group": group, "v": 1})).unwrap()
    }

    fn key(id: &str) -> Record {
        serde_json::from_value(json!({"id": id})).unwrap()
    }

    fn store_with(count: usize) -> MemoryWideColumn {
        let store = MemoryWideColumn::new("id").with_page_size(4);
        store.seed(
            "t",
            (0..count).map(|i| item(&format!("item-{i:02}"), if i % 2 == 0 { "even" } else { "odd" })),
        );
        store
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryWideColumn::new("id");
        store.put("t", &item("a", "x"), None).await.unwrap();

        let found = store.get("t", &key("a")).await.unwrap().unwrap();
        assert_eq!(found["group"], json!("x"));
        assert!(store.get("t", &key("missing")).await.unwrap().is_none());
        assert!(store.get("other", &key("a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_conditional_put_rejects_stale_version() {
        let store = MemoryWideColumn::new("id");
        store.seed("t", [item("a", "x")]);

        let stale = Condition::AttributeEquals { field: "v".into(), value: json!(0) };
        let outcome = store.put("t", &item("a", "changed"), Some(&stale)).await.unwrap();
        assert_eq!(outcome, WriteOutcome::ConditionFailed);
        assert_eq!(store.peek("t", &json!("a")).unwrap()["group"], json!("x"));

        let fresh = Condition::AttributeEquals { field: "v".into(), value: json!(1) };
        let outcome = store.put("t", &item("a", "changed"), Some(&fresh)).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Written);
    }

    #[tokio::test]
    async fn test_insert_if_absent() {
        let store = MemoryWideColumn::new("id");
        let guard = Condition::AttributeNotExists("id".into());

        assert_eq!(store.put("t", &item("a", "x"), Some(&guard)).await.unwrap(), WriteOutcome::Written);
        assert_eq!(
            store.put("t", &item("a", "y"), Some(&guard)).await.unwrap(),
            WriteOutcome::ConditionFailed
        );
    }

    #[tokio::test]
    async fn test_scan_pages_carry_cursor() {
        let store = store_with(10);

        let first = store.scan("t", &PageRequest::default()).await.unwrap();
        assert_eq!(first.items.len(), 4);
        assert_eq!(first.cursor, Some(json!({"id": "item-03"})));

        let request = PageRequest {
            exclusive_start_key: first.cursor,
            ..Default::default()
        };
        let second = store.scan("t", &request).await.unwrap();
        assert_eq!(second.items[0]["id"], json!("item-04"));
    }

    #[tokio::test]
    async fn test_last_page_has_no_cursor() {
        let store = store_with(4);
        let page = store.scan("t", &PageRequest::default()).await.unwrap();
        assert_eq!(page.items.len(), 4);
        assert!(page.cursor.is_none());
    }

    #[tokio::test]
    async fn test_filtered_page_can_be_empty_with_cursor() {
        let store = MemoryWideColumn::new("id").with_page_size(2);
        store.seed("t", [item("a", "x"), item("b", "x"), item("c", "y")]);

        let request = PageRequest {
            filter: serde_json::from_value(json!({"group": "y"})).unwrap(),
            ..Default::default()
        };
        let page = store.scan("t", &request).await.unwrap();
        assert!(page.items.is_empty());
        assert!(page.cursor.is_some());
    }

    #[tokio::test]
    async fn test_query_requires_key_condition() {
        let store = store_with(3);
        assert!(store.query("t", &PageRequest::default()).await.is_err());

        let request = PageRequest {
            key_condition: serde_json::from_value(json!({"group": "odd"})).unwrap(),
            page_size: Some(10),
            ..Default::default()
        };
        let page = store.query("t", &request).await.unwrap();
        assert_eq!(page.items.len(), 1);
    }

    #[tokio::test]
    async fn test_scalar_start_key_is_rejected() {
        let store = store_with(3);
        let request = PageRequest {
            exclusive_start_key: Some(json!("item-01")),
            ..Default::default()
        };
        assert!(store.scan("t", &request).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_returns_prior_item() {
        let store = store_with(2);
        let prior = store.delete("t", &key("item-00")).await.unwrap();
        assert_eq!(prior.unwrap()["id"], json!("item-00"));
        assert!(store.delete("t", &key("item-00")).await.unwrap().is_none());
        assert_eq!(store.len("t"), 1);
    }

    #[tokio::test]
    async fn test_batch_limits_enforced() {
        let store = MemoryWideColumn::new("id");
        let items: Vec<Record> = (0..26).map(|i| item(&format!("{i}"), "x")).collect();
        assert!(store.batch_write("t", &items).await.is_err());
        store.batch_write("t", &items[..25]).await.unwrap();
        assert_eq!(store.len("t"), 25);

        let keys: Vec<Record> = (0..101).map(|i| key(&format!("{i}"))).collect();
        assert!(store.batch_get("t", &keys).await.is_err());
        assert_eq!(store.batch_get("t", &keys[..100]).await.unwrap().len(), 25);
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = store_with(1);
        store.set_unavailable(true);
        assert!(matches!(
            store.get("t", &key("item-00")).await,
            Err(StorageError::Backend(_))
        ));
        store.set_unavailable(false);
        assert!(store.get("t", &key("item-00")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_object_store_roundtrip_and_listing() {
        let store = MemoryObjectStore::new();
        store.put_object("b", "users/a.json", b"{}".to_vec()).await.unwrap();
        store.put_object("b", "users/b.json", b"{}".to_vec()).await.unwrap();
        store.put_object("b", "orders/c.json", b"{}".to_vec()).await.unwrap();

        assert_eq!(
            store.list_objects("b", "users/").await.unwrap(),
            vec!["users/a.json".to_string(), "users/b.json".to_string()]
        );
        assert_eq!(store.delete_object("b", "users/a.json").await.unwrap(), Some(b"{}".to_vec()));
        assert!(store.get_object("b", "users/a.json").await.unwrap().is_none());
        assert_eq!(store.len(), 2);
    }
}

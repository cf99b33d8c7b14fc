// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Object store adapter.
//!
//! Records live as JSON documents at `<collection>/<identifier>.json` in the
//! bucket named by the collection. There is no version guard: `update` reads,
//! merges, projects and overwrites.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::AdapterContext;
use crate::error::{AdapterError, Result};
use crate::merge::merge;
use crate::metrics::{record_result, LatencyTimer};
use crate::notify::Operation;
use crate::record::{key_string, into_record, ArrayPolicy, ModelFields, Record};
use crate::storage::traits::{ObjectClient, StorageError};

const ENGINE: &str = "object";

pub struct ObjectAdapter {
    client: Arc<dyn ObjectClient>,
    context: AdapterContext,
}

impl ObjectAdapter {
    pub fn new(client: Arc<dyn ObjectClient>, context: AdapterContext) -> Self {
        Self { client, context }
    }

    #[must_use]
    pub fn fields(&self) -> &ModelFields {
        &self.context.fields
    }

    fn bucket(&self) -> &str {
        &self.context.fields.collection
    }

    fn prefix(&self) -> String {
        format!("{}/", self.context.fields.collection)
    }

    /// Object key for `identifier`.
    #[must_use]
    pub fn object_key(&self, identifier: &Value) -> String {
        format!("{}{}.json", self.prefix(), key_string(identifier))
    }

    fn decode(key: &str, body: &[u8]) -> Result<Record> {
        serde_json::from_slice::<Value>(body)
            .ok()
            .and_then(into_record)
            .ok_or_else(|| StorageError::Backend(format!("object '{key}' is not a JSON record")).into())
    }

    fn encode(record: &Record) -> Result<Vec<u8>> {
        serde_json::to_vec(record).map_err(|e| AdapterError::InvalidRequest(format!("unencodable record: {e}")))
    }

    async fn write(&self, record: &Record) -> Result<()> {
        let identifier = self
            .fields()
            .identifier_of(record)
            .ok_or_else(|| AdapterError::InvalidRequest(format!("record has no '{}'", self.fields().identifier)))?;
        let key = self.object_key(identifier);
        debug!(bucket = %self.bucket(), %key, "Put object");
        self.client.put_object(self.bucket(), &key, Self::encode(record)?).await?;
        Ok(())
    }

    /// List the collection prefix. Store failures report `false`.
    pub async fn check(&self) -> bool {
        match self.client.list_objects(self.bucket(), &self.prefix()).await {
            Ok(_) => true,
            Err(e) => {
                warn!(bucket = %self.bucket(), error = %e, "Health check failed");
                false
            }
        }
    }

    /// Store a new document, replacing any existing one.
    pub async fn create(&self, data: Record) -> Result<Record> {
        let _timer = LatencyTimer::new(ENGINE, "create");
        let result: Result<Record> = async {
            let record = self.context.project(data).await?;
            self.write(&record).await?;
            Ok(record)
        }
        .await;
        record_result(ENGINE, "create", &result);
        let record = result?;
        self.context.publish(Operation::Create, &record).await;
        Ok(record)
    }

    pub async fn read(&self, identifier: &Value) -> Result<Option<Record>> {
        let _timer = LatencyTimer::new(ENGINE, "read");
        let key = self.object_key(identifier);
        let result = match self.client.get_object(self.bucket(), &key).await {
            Ok(Some(body)) => Self::decode(&key, &body).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(e.into()),
        };
        record_result(ENGINE, "read", &result);
        result
    }

    /// Every document in the collection, in key order.
    pub async fn scan(&self) -> Result<Vec<Record>> {
        let _timer = LatencyTimer::new(ENGINE, "scan");
        let keys = self.client.list_objects(self.bucket(), &self.prefix()).await?;
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(body) = self.client.get_object(self.bucket(), &key).await? {
                records.push(Self::decode(&key, &body)?);
            }
        }
        Ok(records)
    }

    /// Read, merge `data` under `policy`, project and overwrite.
    pub async fn update(&self, identifier: &Value, data: Record, policy: ArrayPolicy) -> Result<Record> {
        let _timer = LatencyTimer::new(ENGINE, "update");
        let result: Result<Record> = async {
            let current = self
                .read(identifier)
                .await?
                .ok_or(AdapterError::NotFound { operation: "update" })?;
            let record = self.context.project(merge(&current, &data, policy)).await?;
            self.write(&record).await?;
            Ok(record)
        }
        .await;
        record_result(ENGINE, "update", &result);
        let record = result?;
        self.context.publish(Operation::Update, &record).await;
        Ok(record)
    }

    /// Remove the document, returning its prior content.
    pub async fn delete(&self, identifier: &Value) -> Result<Record> {
        let _timer = LatencyTimer::new(ENGINE, "delete");
        let key = self.object_key(identifier);
        let result = match self.client.delete_object(self.bucket(), &key).await {
            Ok(Some(body)) => Self::decode(&key, &body),
            Ok(None) => Err(AdapterError::NotFound { operation: "delete" }),
            Err(e) => Err(e.into()),
        };
        record_result(ENGINE, "delete", &result);
        let prior = result?;
        self.context.publish(Operation::Delete, &prior).await;
        Ok(prior)
    }
}

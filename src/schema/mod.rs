// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Schema-driven field projection.
//!
//! Every record written by an adapter is first passed through a
//! [`SchemaProjector`]. The default projector, [`SchemaMapper`], keeps only
//! the fields declared by an OpenAPI object schema and preserves the nested
//! object/array shapes declared there.
//!
//! # Example
//!
//! ```
//! use dta_adapter::schema::{SchemaMapper, SchemaProjector};
//! use dta_adapter::record::into_record;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mapper = SchemaMapper::from_value(json!({
//!     "type": "object",
//!     "properties": {"id": {"type": "string"}, "name": {"type": "string"}}
//! }));
//!
//! let data = into_record(json!({"id": "a", "name": "Ann", "junk": true})).unwrap();
//! let projected = mapper.project(data).await.unwrap();
//! assert_eq!(serde_json::Value::Object(projected), json!({"id": "a", "name": "Ann"}));
//! # }
//! ```

mod loader;

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::record::Record;

pub use loader::load_schema;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("failed to read schema file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse schema document: {0}")]
    Parse(String),
    #[error("schema '{0}' not found in components.schemas")]
    Missing(String),
    #[error("unresolvable schema reference '{0}'")]
    Unresolved(String),
}

/// Filters and reshapes a record to match a declared schema.
#[async_trait]
pub trait SchemaProjector: Send + Sync {
    async fn project(&self, data: Record) -> Result<Record, SchemaError>;
}

/// Projector used when schema validation is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

#[async_trait]
impl SchemaProjector for PassThrough {
    async fn project(&self, data: Record) -> Result<Record, SchemaError> {
        Ok(data)
    }
}

#[derive(Debug)]
enum SchemaSource {
    File { path: PathBuf, name: String },
    Inline,
}

/// Projects records against an OpenAPI object schema.
///
/// File-backed schemas are read and dereferenced on first use, then cached
/// for the lifetime of the mapper.
#[derive(Debug)]
pub struct SchemaMapper {
    source: SchemaSource,
    schema: OnceCell<Value>,
}

impl SchemaMapper {
    /// Schema `name` under `components.schemas` in the YAML/JSON document at `path`.
    pub fn from_file(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            source: SchemaSource::File {
                path: path.into(),
                name: name.into(),
            },
            schema: OnceCell::new(),
        }
    }

    /// An already dereferenced schema.
    #[must_use]
    pub fn from_value(schema: Value) -> Self {
        Self {
            source: SchemaSource::Inline,
            schema: OnceCell::new_with(Some(schema)),
        }
    }

    async fn schema(&self) -> Result<&Value, SchemaError> {
        self.schema
            .get_or_try_init(|| async {
                match &self.source {
                    SchemaSource::File { path, name } => load_schema(path, name).await,
                    SchemaSource::Inline => Err(SchemaError::Missing("inline".into())),
                }
            })
            .await
    }
}

#[async_trait]
impl SchemaProjector for SchemaMapper {
    async fn project(&self, data: Record) -> Result<Record, SchemaError> {
        let schema = self.schema().await?;
        Ok(project_record(schema, &data))
    }
}

/// Apply `schema` (or each member of its `allOf`) to `data`.
#[must_use]
pub fn project_record(schema: &Value, data: &Record) -> Record {
    let members = match schema.get("allOf").and_then(Value::as_array) {
        Some(members) => members.iter().collect(),
        None => vec![schema],
    };
    let mut projected = Record::new();
    for member in members {
        if member.get("type").and_then(Value::as_str) != Some("object") {
            continue;
        }
        if let Some(properties) = member.get("properties").and_then(Value::as_object) {
            project_object(&mut projected, data, properties);
        }
    }
    projected
}

fn project_object(target: &mut Record, data: &Record, properties: &serde_json::Map<String, Value>) {
    for (name, declared) in properties {
        let value = data.get(name);
        let nested = declared.get("properties").and_then(Value::as_object);
        let item_properties = declared
            .get("items")
            .and_then(|items| items.get("properties"))
            .and_then(Value::as_object);

        match (value, nested, item_properties) {
            (Some(Value::Object(inner)), Some(nested), _) => {
                let mut child = Record::new();
                project_object(&mut child, inner, nested);
                target.insert(name.clone(), Value::Object(child));
            }
            (Some(Value::Array(items)), _, Some(item_properties)) => {
                let projected = items
                    .iter()
                    .filter_map(|item| match item {
                        Value::Object(inner) => {
                            let mut child = Record::new();
                            project_object(&mut child, inner, item_properties);
                            Some(Value::Object(child))
                        }
                        Value::Null => None,
                        Value::String(s) if s == "null" => None,
                        other => Some(other.clone()),
                    })
                    .collect();
                target.insert(name.clone(), Value::Array(projected));
            }
            (Some(value), _, _) if !value.is_null() => {
                target.insert(name.clone(), value.clone());
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::into_record;
    use serde_json::json;

    fn record(value: Value) -> Record {
        into_record(value).unwrap()
    }

    fn user_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "modified": {"type": "string"},
                "address": {
                    "type": "object",
                    "properties": {"city": {"type": "string"}}
                },
                "contacts": {
                    "type": "array",
                    "items": {"type": "object", "properties": {"email": {"type": "string"}}}
                },
                "tags": {"type": "array", "items": {"type": "string"}}
            }
        })
    }

    #[tokio::test]
    async fn test_undeclared_fields_dropped() {
        let mapper = SchemaMapper::from_value(user_schema());
        let projected = mapper
            .project(record(json!({"id": "a", "modified": "1", "extra": 1})))
            .await
            .unwrap();
        assert_eq!(Value::Object(projected), json!({"id": "a", "modified": "1"}));
    }

    #[tokio::test]
    async fn test_nested_objects_projected() {
        let mapper = SchemaMapper::from_value(user_schema());
        let projected = mapper
            .project(record(json!({"id": "a", "address": {"city": "Leeds", "secret": 1}})))
            .await
            .unwrap();
        assert_eq!(projected["address"], json!({"city": "Leeds"}));
    }

    #[tokio::test]
    async fn test_object_arrays_projected_per_item() {
        let mapper = SchemaMapper::from_value(user_schema());
        let projected = mapper
            .project(record(json!({
                "id": "a",
                "contacts": [{"email": "a@x", "phone": "1"}, null, "null", "raw"]
            })))
            .await
            .unwrap();
        assert_eq!(projected["contacts"], json!([{"email": "a@x"}, "raw"]));
    }

    #[tokio::test]
    async fn test_scalar_arrays_copied() {
        let mapper = SchemaMapper::from_value(user_schema());
        let projected = mapper
            .project(record(json!({"tags": ["x", "y"]})))
            .await
            .unwrap();
        assert_eq!(projected["tags"], json!(["x", "y"]));
    }

    #[tokio::test]
    async fn test_null_values_skipped() {
        let mapper = SchemaMapper::from_value(user_schema());
        let projected = mapper
            .project(record(json!({"id": "a", "modified": null})))
            .await
            .unwrap();
        assert!(!projected.contains_key("modified"));
    }

    #[tokio::test]
    async fn test_all_of_members_combined() {
        let schema = json!({
            "allOf": [
                {"type": "object", "properties": {"id": {}}},
                {"type": "object", "properties": {"name": {}}},
                {"type": "string"}
            ]
        });
        let projected = project_record(&schema, &record(json!({"id": 1, "name": "n", "x": 2})));
        assert_eq!(Value::Object(projected), json!({"id": 1, "name": "n"}));
    }

    #[tokio::test]
    async fn test_pass_through_keeps_everything() {
        let data = record(json!({"anything": [1, 2]}));
        assert_eq!(PassThrough.project(data.clone()).await.unwrap(), data);
    }
}

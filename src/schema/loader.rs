// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Loading a named schema out of an OpenAPI document.
//!
//! Only local JSON pointers (`#/components/schemas/Foo`) are resolved.

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use super::SchemaError;

/// Deepest `$ref` chain followed before giving up (guards cyclic schemas).
const MAX_REF_DEPTH: usize = 32;

/// Read `path`, take `components.schemas.<name>` and inline its references.
pub async fn load_schema(path: &Path, name: &str) -> Result<Value, SchemaError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let document: Value =
        serde_yaml::from_str(&text).map_err(|e| SchemaError::Parse(e.to_string()))?;
    let schema = document
        .pointer(&format!("/components/schemas/{name}"))
        .ok_or_else(|| SchemaError::Missing(name.to_string()))?;

    debug!(path = %path.display(), schema = %name, "Loaded model schema");
    dereference(&document, schema, 0)
}

/// Replace every local `$ref` in `node` with the schema it points to.
pub fn dereference(document: &Value, node: &Value, depth: usize) -> Result<Value, SchemaError> {
    match node {
        Value::Object(map) => {
            if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                if depth >= MAX_REF_DEPTH {
                    return Err(SchemaError::Unresolved(reference.to_string()));
                }
                let target = reference
                    .strip_prefix('#')
                    .and_then(|pointer| document.pointer(pointer))
                    .ok_or_else(|| SchemaError::Unresolved(reference.to_string()))?;
                return dereference(document, target, depth + 1);
            }
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                resolved.insert(key.clone(), dereference(document, value, depth)?);
            }
            Ok(Value::Object(resolved))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| dereference(document, item, depth))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

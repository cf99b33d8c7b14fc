// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Deep merge of a partial update onto a previously read record.
//!
//! # Rules
//!
//! - Nested objects merge key by key, recursively.
//! - Scalars (and any type mismatch): the patch value wins.
//! - Arrays follow the [`ArrayPolicy`]: `Replace` takes the patch array,
//!   `Concat` appends the patch after the base.
//! - Keys absent from the patch are left untouched. Nothing is ever removed.
//!
//! # Example
//!
//! ```
//! use dta_adapter::merge::merge;
//! use dta_adapter::record::{into_record, ArrayPolicy};
//! use serde_json::json;
//!
//! let base = into_record(json!({"id": "a", "tags": ["x"], "meta": {"n": 1}})).unwrap();
//! let patch = into_record(json!({"tags": ["y"], "meta": {"m": 2}})).unwrap();
//!
//! let merged = merge(&base, &patch, ArrayPolicy::Concat);
//! assert_eq!(
//!     serde_json::Value::Object(merged),
//!     json!({"id": "a", "tags": ["x", "y"], "meta": {"n": 1, "m": 2}})
//! );
//! ```

use serde_json::Value;

use crate::record::{ArrayPolicy, Record};

/// Merge `patch` onto `base`, returning a new record. `base` is not mutated.
#[must_use]
pub fn merge(base: &Record, patch: &Record, policy: ArrayPolicy) -> Record {
    let mut merged = base.clone();
    merge_into(&mut merged, patch, policy);
    merged
}

fn merge_into(target: &mut Record, patch: &Record, policy: ArrayPolicy) {
    for (key, incoming) in patch {
        match target.get_mut(key) {
            Some(existing) => merge_value(existing, incoming, policy),
            None => {
                target.insert(key.clone(), incoming.clone());
            }
        }
    }
}

fn merge_value(existing: &mut Value, incoming: &Value, policy: ArrayPolicy) {
    match (existing, incoming) {
        (Value::Object(current), Value::Object(patch)) => merge_into(current, patch, policy),
        (Value::Array(current), Value::Array(patch)) => match policy {
            ArrayPolicy::Replace => *current = patch.clone(),
            ArrayPolicy::Concat => current.extend(patch.iter().cloned()),
        },
        (slot, value) => *slot = value.clone(),
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Optimistic-concurrency update protocol.
//!
//! ```text
//! Fetch ──absent──► NotFound            (no write attempted)
//!   │
//!   ▼
//! Merge (caller array policy) ──► Project ──► Conditional write
//!                                                  │
//!                           ConditionFailed ◄──────┴──────► Written
//!                           = VersionConflict               = merged record
//! ```
//!
//! The protocol holds no lock across the read-merge-write window; the store's
//! compare-and-write is the only arbiter. It never retries and never advances
//! the version field: callers put the next version into the patch.

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::backend::{StoreBackend, VersionGuard};
use crate::error::{AdapterError, Result};
use crate::merge::merge;
use crate::record::{key_string, ArrayPolicy, ModelFields, Record, WriteOutcome};
use crate::schema::SchemaProjector;

/// One read-merge-write request. Consumed by [`apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest<L> {
    /// Locates the base record.
    pub lookup: L,
    /// Partial data merged onto the stored record.
    pub data: Record,
    pub array_policy: ArrayPolicy,
    /// Version the stored record must carry at write time. Defaults to the
    /// version read during fetch.
    pub expected_version: Option<Value>,
}

impl<L> UpdateRequest<L> {
    pub fn new(lookup: L, data: Record) -> Self {
        Self {
            lookup,
            data,
            array_policy: ArrayPolicy::default(),
            expected_version: None,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ArrayPolicy) -> Self {
        self.array_policy = policy;
        self
    }

    #[must_use]
    pub fn expecting(mut self, version: impl Into<Value>) -> Self {
        self.expected_version = Some(version.into());
        self
    }
}

/// Run the protocol against `backend`, returning the written record.
#[instrument(skip_all, fields(engine = backend.engine(), collection = %fields.collection))]
pub async fn apply<B>(
    backend: &B,
    projector: &dyn SchemaProjector,
    fields: &ModelFields,
    request: UpdateRequest<B::Lookup>,
) -> Result<Record>
where
    B: StoreBackend + ?Sized,
{
    let UpdateRequest {
        lookup,
        data,
        array_policy,
        expected_version,
    } = request;

    let Some(current) = backend.point_lookup(&lookup).await? else {
        debug!(?lookup, "Update target not found");
        return Err(AdapterError::NotFound { operation: "update" });
    };

    let identifier = fields
        .identifier_of(&current)
        .cloned()
        .ok_or(AdapterError::NotFound { operation: "update" })?;
    let expected = expected_version
        .or_else(|| fields.version_of(&current).cloned())
        .unwrap_or(Value::Null);

    let merged = merge(&current, &data, array_policy);
    let projected = projector.project(merged).await?;

    let guard = VersionGuard {
        identifier_field: fields.identifier.clone(),
        identifier: identifier.clone(),
        version_field: fields.version.clone(),
        expected,
    };
    debug!(
        identifier = %key_string(&identifier),
        expected = %guard.expected,
        ?array_policy,
        "Conditional write"
    );

    match backend.conditional_write(&projected, &guard).await? {
        WriteOutcome::Written => Ok(projected),
        WriteOutcome::ConditionFailed => {
            warn!(identifier = %key_string(&identifier), "Version changed since read");
            crate::metrics::record_version_conflict(backend.engine());
            Err(AdapterError::VersionConflict {
                identifier: key_string(&identifier),
            })
        }
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Engine capability interface.
//!
//! The update protocol ([`crate::update`]) and the pagination resolver
//! ([`crate::paginate`]) are written once against [`StoreBackend`]. Each
//! engine supplies its own cursor shape and conditional-write mechanics:
//!
//! | Engine       | Lookup                  | Page cursor              | Version guard                     |
//! |--------------|-------------------------|--------------------------|-----------------------------------|
//! | wide-column  | key or first query hit  | last evaluated key map   | `#version = :version` on put      |
//! | graph        | caller match statement  | none (single page)       | `WHERE n.version = $version` SET  |

mod graph;
mod wide_column;

pub use graph::{node_properties, GraphBackend};
pub use wide_column::{BoundedRead, ReadKind, WideColumnBackend, WideColumnLookup};

use async_trait::async_trait;
use serde_json::Value;

use crate::record::{Page, Record, WriteOutcome};
use crate::storage::traits::StorageError;

/// Compare-and-write guard for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionGuard {
    pub identifier_field: String,
    pub identifier: Value,
    pub version_field: String,
    /// Version the stored record must still carry at write time.
    pub expected: Value,
}

#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// How a single record is located.
    type Lookup: Send + Sync + std::fmt::Debug;
    /// One bounded query/scan/match, reissued per page.
    type PageRequest: Send + Sync + std::fmt::Debug;

    /// Engine label for logs and metrics.
    fn engine(&self) -> &'static str;

    async fn point_lookup(&self, lookup: &Self::Lookup) -> Result<Option<Record>, StorageError>;

    /// Fetch one page. `cursor` is `None` on the first call.
    async fn fetch_page(
        &self,
        request: &Self::PageRequest,
        cursor: Option<&Value>,
    ) -> Result<Page, StorageError>;

    /// Full-record replace that only lands if `guard` still holds.
    async fn conditional_write(
        &self,
        record: &Record,
        guard: &VersionGuard,
    ) -> Result<WriteOutcome, StorageError>;

    /// Remove by identifier, returning the pre-delete record.
    async fn point_delete(&self, identifier: &Value) -> Result<Option<Record>, StorageError>;
}

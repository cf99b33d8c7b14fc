// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Caller-visible error kinds.
//!
//! `NotFound` and `VersionConflict` are distinct so callers can decide whether
//! to restart their own read-merge-write cycle. Store failures pass through
//! unmodified inside [`AdapterError::Store`]. Notifier failures never show up
//! here; the publisher swallows them.

use thiserror::Error;

use crate::schema::SchemaError;
use crate::storage::traits::StorageError;

#[derive(Error, Debug)]
pub enum AdapterError {
    /// A required construction parameter is missing.
    #[error("{field} is a required property in config params")]
    Configuration { field: String },

    #[error("{0} is not supported... yet")]
    UnsupportedEngine(String),

    /// Update/delete target is absent.
    #[error("{operation}: no data found to {operation}")]
    NotFound { operation: &'static str },

    /// The version guard tripped: another writer advanced the record.
    #[error("no records updated; version has changed for '{identifier}'")]
    VersionConflict { identifier: String },

    /// Insert-if-absent found an existing record.
    #[error("record already exists: {identifier}")]
    AlreadyExists { identifier: String },

    /// Malformed relationship statement.
    #[error("INTEGRITY ERROR: {0}")]
    Integrity(String),

    /// Statement without named placeholders.
    #[error("SECURITY ERROR: {0}")]
    Security(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Store(#[from] StorageError),
}

impl AdapterError {
    /// Label used for metrics and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterError::Configuration { .. } => "configuration",
            AdapterError::UnsupportedEngine(_) => "unsupported_engine",
            AdapterError::NotFound { .. } => "not_found",
            AdapterError::VersionConflict { .. } => "version_conflict",
            AdapterError::AlreadyExists { .. } => "already_exists",
            AdapterError::Integrity(_) => "integrity",
            AdapterError::Security(_) => "security",
            AdapterError::InvalidRequest(_) => "invalid_request",
            AdapterError::Schema(_) => "schema",
            AdapterError::Store(_) => "store",
        }
    }
}

pub type Result<T> = std::result::Result<T, AdapterError>;

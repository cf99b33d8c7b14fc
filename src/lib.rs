//! # DTA Adapter
//!
//! One CRUD-style data-access surface over three kinds of store: a
//! wide-column database, a property graph and an object store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Adapter facades                         │
//! │  • create / read / update / delete / query / scan           │
//! │  • schema projection before every write                     │
//! │  • best-effort change notification after every mutation     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Engine-agnostic core (StoreBackend)            │
//! │  • update::apply   fetch → merge → project → guarded write  │
//! │  • paginate::resolve   cursor loop with caller item limit   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Injected store clients                      │
//! │  • WideColumnClient  • GraphClient  • ObjectClient          │
//! │  • in-memory reference clients for tests and local runs     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Concurrency against other writers is delegated to the store's atomic
//! compare-and-write. Nothing in the core locks, times out or retries: a
//! version conflict is reported and the caller restarts its own cycle.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use dta_adapter::{Adapter, AdapterConfig, Clients};
//! use dta_adapter::adapter::CreateMode;
//! use dta_adapter::backend::WideColumnLookup;
//! use dta_adapter::record::{into_record, ArrayPolicy};
//! use dta_adapter::storage::MemoryWideColumn;
//! use dta_adapter::update::UpdateRequest;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let config = AdapterConfig::from_yaml(r#"
//! engine: dynamodb
//! table: users
//! model_identifier: id
//! model_version_key: v
//! status: true
//! "#).unwrap();
//!
//! let store = Arc::new(MemoryWideColumn::new("id"));
//! let adapter = Adapter::connect(&config, Clients::new().with_wide_column(store)).unwrap();
//! let users = adapter.as_wide_column().unwrap();
//!
//! users.create(into_record(json!({"id": "a", "v": 1, "tags": ["x"]})).unwrap(), CreateMode::Insert)
//!     .await
//!     .unwrap();
//!
//! let request = UpdateRequest::new(
//!     WideColumnLookup::Key(into_record(json!({"id": "a"})).unwrap()),
//!     into_record(json!({"tags": ["y"]})).unwrap(),
//! )
//! .with_policy(ArrayPolicy::Concat)
//! .expecting(1);
//!
//! let written = users.update(request).await.unwrap();
//! assert_eq!(written["tags"], json!(["x", "y"]));
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`adapter`]: Engine facades, command dispatch and the [`Adapter`] factory
//! - [`update`]: Optimistic-concurrency read-merge-write
//! - [`paginate`]: Paginated read resolution
//! - [`backend`]: The [`backend::StoreBackend`] capability per engine
//! - [`merge`]: Deep merge with array policy
//! - [`schema`]: OpenAPI schema projection
//! - [`notify`]: Change notifications
//! - [`storage`]: Store client traits and in-memory clients

pub mod adapter;
pub mod backend;
pub mod config;
pub mod error;
pub mod merge;
pub mod metrics;
pub mod notify;
pub mod paginate;
pub mod record;
pub mod schema;
pub mod storage;
pub mod update;

pub use adapter::{Adapter, Clients, CreateMode, GraphAdapter, ObjectAdapter, Outcome, WideColumnAdapter};
pub use config::{AdapterConfig, Engine, NotifierConfig};
pub use error::{AdapterError, Result};
pub use metrics::LatencyTimer;
pub use notify::{Notification, NotificationSink, Operation, Publisher};
pub use record::{ArrayPolicy, ModelFields, Page, Record};
pub use storage::traits::StorageError;
pub use update::UpdateRequest;

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Engine adapters.
//!
//! Each adapter exposes the same verb surface over one store, delegating the
//! read-merge-write cycle to [`crate::update`] and bounded reads to
//! [`crate::paginate`]. Successful mutations publish a notification after the
//! store call returns.
//!
//! ```text
//!   AdapterConfig + Clients
//!            │  Adapter::connect (validates, builds projector + publisher)
//!            ▼
//!   ┌──────────────────┬────────────────┬───────────────┐
//!   │ WideColumnAdapter│  GraphAdapter  │ ObjectAdapter │
//!   └──────────────────┴────────────────┴───────────────┘
//! ```

mod graph;
mod object;
mod wide_column;

pub use graph::{GraphAdapter, GraphCommand};
pub use object::ObjectAdapter;
pub use wide_column::{WideColumnAdapter, WideColumnCommand, WideColumnRead};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::config::{AdapterConfig, Engine};
use crate::error::{AdapterError, Result};
use crate::notify::{NotificationSink, NullSink, Operation, Publisher};
use crate::record::{ModelFields, Record};
use crate::schema::{PassThrough, SchemaMapper, SchemaProjector};
use crate::storage::traits::{GraphClient, ObjectClient, WideColumnClient};

/// How `create` treats an existing identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateMode {
    /// Fail with `AlreadyExists` when the identifier is taken.
    #[default]
    Insert,
    /// Replace whatever is stored.
    Overwrite,
}

/// Result of a dispatched command.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Record(Record),
    Records(Vec<Record>),
    /// Point read that found nothing.
    Missing,
}

impl Outcome {
    /// JSON form: an object, an array, or null.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Outcome::Record(record) => Value::Object(record),
            Outcome::Records(records) => Value::Array(records.into_iter().map(Value::Object).collect()),
            Outcome::Missing => Value::Null,
        }
    }
}

impl From<Option<Record>> for Outcome {
    fn from(found: Option<Record>) -> Self {
        found.map_or(Outcome::Missing, Outcome::Record)
    }
}

/// Store clients and notification sink handed to [`Adapter::connect`].
///
/// Only the client for the configured engine is required.
#[derive(Default, Clone)]
pub struct Clients {
    pub wide_column: Option<Arc<dyn WideColumnClient>>,
    pub graph: Option<Arc<dyn GraphClient>>,
    pub object: Option<Arc<dyn ObjectClient>>,
    pub sink: Option<Arc<dyn NotificationSink>>,
}

impl Clients {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_wide_column(mut self, client: Arc<dyn WideColumnClient>) -> Self {
        self.wide_column = Some(client);
        self
    }

    #[must_use]
    pub fn with_graph(mut self, client: Arc<dyn GraphClient>) -> Self {
        self.graph = Some(client);
        self
    }

    #[must_use]
    pub fn with_object(mut self, client: Arc<dyn ObjectClient>) -> Self {
        self.object = Some(client);
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }
}

/// Per-adapter collaborators: resolved names, projector and publisher.
pub struct AdapterContext {
    pub fields: ModelFields,
    pub projector: Arc<dyn SchemaProjector>,
    pub publisher: Publisher,
}

impl AdapterContext {
    /// Context with no schema projection and no notifications.
    #[must_use]
    pub fn bare(fields: ModelFields) -> Self {
        Self {
            fields,
            projector: Arc::new(PassThrough),
            publisher: Publisher::disabled(),
        }
    }

    #[must_use]
    pub fn with_projector(mut self, projector: Arc<dyn SchemaProjector>) -> Self {
        self.projector = projector;
        self
    }

    #[must_use]
    pub fn with_publisher(mut self, publisher: Publisher) -> Self {
        self.publisher = publisher;
        self
    }

    /// Build from validated configuration.
    pub fn from_config(config: &AdapterConfig, fields: ModelFields, sink: Arc<dyn NotificationSink>) -> Self {
        let projector: Arc<dyn SchemaProjector> =
            match (config.validate_schema, &config.model_schema_file, &config.model_schema) {
                (true, Some(path), Some(name)) => Arc::new(SchemaMapper::from_file(path.clone(), name.clone())),
                _ => Arc::new(PassThrough),
            };
        let publisher = Publisher::new(
            sink,
            &config.notifier,
            config.model_schema.clone().unwrap_or_default(),
            fields.identifier.clone(),
        );
        Self {
            fields,
            projector,
            publisher,
        }
    }

    pub(crate) async fn project(&self, data: Record) -> Result<Record> {
        Ok(self.projector.project(data).await?)
    }

    pub(crate) async fn publish(&self, operation: Operation, record: &Record) {
        self.publisher.publish(operation, Value::Object(record.clone())).await;
    }
}

/// An adapter for whichever engine the configuration names.
pub enum Adapter {
    WideColumn(WideColumnAdapter),
    Graph(GraphAdapter),
    Object(ObjectAdapter),
}

impl Adapter {
    /// Validate `config` and build the adapter for its engine.
    ///
    /// Fails with `UnsupportedEngine` for an unknown engine name and with
    /// `Configuration` naming the first missing field or client.
    pub fn connect(config: &AdapterConfig, clients: Clients) -> Result<Self> {
        let engine = config.engine()?;
        let fields = config.validate()?;
        let sink = clients.sink.clone().unwrap_or_else(|| Arc::new(NullSink));
        let context = AdapterContext::from_config(config, fields, sink);
        let missing_client = |engine: Engine| AdapterError::Configuration {
            field: format!("{}_client", engine.as_str()),
        };

        let adapter = match engine {
            Engine::WideColumn => {
                let client = clients.wide_column.ok_or_else(|| missing_client(engine))?;
                Adapter::WideColumn(WideColumnAdapter::new(client, context))
            }
            Engine::Graph => {
                let client = clients.graph.ok_or_else(|| missing_client(engine))?;
                Adapter::Graph(GraphAdapter::new(client, context, config.auto_connect))
            }
            Engine::Object => {
                let client = clients.object.ok_or_else(|| missing_client(engine))?;
                Adapter::Object(ObjectAdapter::new(client, context))
            }
        };
        info!(
            engine = engine.as_str(),
            collection = %adapter.fields().collection,
            identifier = %adapter.fields().identifier,
            version = %adapter.fields().version,
            "Adapter ready"
        );
        Ok(adapter)
    }

    #[must_use]
    pub fn engine(&self) -> Engine {
        match self {
            Adapter::WideColumn(_) => Engine::WideColumn,
            Adapter::Graph(_) => Engine::Graph,
            Adapter::Object(_) => Engine::Object,
        }
    }

    #[must_use]
    pub fn fields(&self) -> &ModelFields {
        match self {
            Adapter::WideColumn(a) => a.fields(),
            Adapter::Graph(a) => a.fields(),
            Adapter::Object(a) => a.fields(),
        }
    }

    /// Store health probe. Never errors.
    pub async fn check(&self) -> bool {
        match self {
            Adapter::WideColumn(a) => a.check().await,
            Adapter::Graph(a) => a.check().await,
            Adapter::Object(a) => a.check().await,
        }
    }

    #[must_use]
    pub fn as_wide_column(&self) -> Option<&WideColumnAdapter> {
        match self {
            Adapter::WideColumn(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_graph(&self) -> Option<&GraphAdapter> {
        match self {
            Adapter::Graph(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectAdapter> {
        match self {
            Adapter::Object(a) => Some(a),
            _ => None,
        }
    }
}

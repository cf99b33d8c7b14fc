//! Configuration for the adapters.
//!
//! # Example
//!
//! ```
//! use dta_adapter::config::{AdapterConfig, Engine};
//!
//! let config = AdapterConfig::from_yaml(r#"
//! engine: dynamodb
//! table: users
//! model_identifier: id
//! model_version_key: modified
//! model_schema: User
//! model_schema_file: openapi.yml
//! notifier:
//!   topic: arn:aws:sns:eu-west-1:000000000000:users
//! "#).unwrap();
//!
//! assert_eq!(config.engine().unwrap(), Engine::WideColumn);
//! assert!(config.auto_connect);
//!
//! let fields = config.validate().unwrap();
//! assert_eq!(fields.collection, "users");
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{AdapterError, Result};
use crate::record::ModelFields;

/// Backing store selected by [`AdapterConfig::engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    WideColumn,
    Graph,
    Object,
}

impl Engine {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::WideColumn => "wide_column",
            Engine::Graph => "graph",
            Engine::Object => "object",
        }
    }

    /// Config key naming the collection for this engine.
    fn collection_key(&self) -> &'static str {
        match self {
            Engine::WideColumn => "table",
            Engine::Graph => "node",
            Engine::Object => "bucket",
        }
    }
}

impl FromStr for Engine {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "wide_column" | "dynamodb" => Ok(Engine::WideColumn),
            "graph" | "neo4j" => Ok(Engine::Graph),
            "object" | "s3" => Ok(Engine::Object),
            other => Err(AdapterError::UnsupportedEngine(other.to_string())),
        }
    }
}

/// Notification settings shared by every engine.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    /// Destination topic. Publishing is skipped when unset.
    #[serde(default)]
    pub topic: Option<String>,

    /// Added as the `author_identifier` attribute when set
    #[serde(default)]
    pub author_identifier: Option<String>,

    /// Extra string attributes merged over the defaults
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    /// Capacity of the in-process broadcast channel
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

/// Configuration for one adapter instance.
///
/// Field names and collection are required unless `skip_validation` is set.
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    /// `wide_column` / `dynamodb`, `graph` / `neo4j` or `object` / `s3`
    pub engine: String,

    /// Record attribute holding the primary key
    #[serde(default)]
    pub model_identifier: Option<String>,

    /// Record attribute compared by the optimistic-concurrency guard
    #[serde(default)]
    pub model_version_key: Option<String>,

    /// Schema name under `components.schemas`
    #[serde(default)]
    pub model_schema: Option<String>,

    /// OpenAPI document (YAML or JSON) holding `model_schema`
    #[serde(default)]
    pub model_schema_file: Option<PathBuf>,

    /// Wide-column table
    #[serde(default)]
    pub table: Option<String>,

    /// Graph node label
    #[serde(default)]
    pub node: Option<String>,

    /// Object store bucket
    #[serde(default)]
    pub bucket: Option<String>,

    /// Project records against the schema before writing (default: true)
    #[serde(default = "default_true")]
    pub validate_schema: bool,

    /// Graph only: open and close a session around each call (default: true)
    #[serde(default = "default_true")]
    pub auto_connect: bool,

    /// Skip required-field checks (unit testing without live stores)
    #[serde(default, alias = "status")]
    pub skip_validation: bool,

    #[serde(default)]
    pub notifier: NotifierConfig,
}

fn default_true() -> bool { true }
fn default_broadcast_capacity() -> usize { 1024 }

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            topic: None,
            author_identifier: None,
            attributes: BTreeMap::new(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            engine: Engine::WideColumn.as_str().to_string(),
            model_identifier: None,
            model_version_key: None,
            model_schema: None,
            model_schema_file: None,
            table: None,
            node: None,
            bucket: None,
            validate_schema: default_true(),
            auto_connect: default_true(),
            skip_validation: false,
            notifier: NotifierConfig::default(),
        }
    }
}

impl AdapterConfig {
    /// Parse a YAML (or JSON) configuration document.
    pub fn from_yaml(text: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn engine(&self) -> Result<Engine> {
        self.engine.parse()
    }

    fn collection(&self, engine: Engine) -> Option<&String> {
        match engine {
            Engine::WideColumn => self.table.as_ref(),
            Engine::Graph => self.node.as_ref(),
            Engine::Object => self.bucket.as_ref(),
        }
    }

    /// Check required fields and resolve the model names.
    ///
    /// Fails on the first missing field, in the order `model_schema_file`,
    /// `model_schema`, `model_version_key`, `model_identifier`, then the
    /// engine's collection (`table`, `node` or `bucket`).
    pub fn validate(&self) -> Result<ModelFields> {
        let engine = self.engine()?;
        let collection = self.collection(engine);

        if self.skip_validation {
            return Ok(ModelFields::new(
                self.model_identifier.as_deref().unwrap_or("id"),
                self.model_version_key.as_deref().unwrap_or("version"),
                collection.map(String::as_str).unwrap_or("items"),
            ));
        }

        let missing = |field: &str| AdapterError::Configuration {
            field: field.to_string(),
        };
        if self.model_schema_file.is_none() {
            return Err(missing("model_schema_file"));
        }
        if self.model_schema.is_none() {
            return Err(missing("model_schema"));
        }
        let version = self
            .model_version_key
            .as_ref()
            .ok_or_else(|| missing("model_version_key"))?;
        let identifier = self
            .model_identifier
            .as_ref()
            .ok_or_else(|| missing("model_identifier"))?;
        let collection = collection.ok_or_else(|| missing(engine.collection_key()))?;

        Ok(ModelFields::new(identifier, version, collection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> AdapterConfig {
        AdapterConfig {
            engine: "neo4j".into(),
            model_identifier: Some("id".into()),
            model_version_key: Some("modified".into()),
            model_schema: Some("User".into()),
            model_schema_file: Some("openapi.yml".into()),
            node: Some("User".into()),
            ..Default::default()
        }
    }

    fn missing_field(config: &AdapterConfig) -> String {
        match config.validate() {
            Err(AdapterError::Configuration { field }) => field,
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_engine_aliases() {
        assert_eq!("dynamodb".parse::<Engine>().unwrap(), Engine::WideColumn);
        assert_eq!("neo4j".parse::<Engine>().unwrap(), Engine::Graph);
        assert_eq!("s3".parse::<Engine>().unwrap(), Engine::Object);
        assert!(matches!(
            "mongodb".parse::<Engine>(),
            Err(AdapterError::UnsupportedEngine(e)) if e == "mongodb"
        ));
    }

    #[test]
    fn test_validate_complete() {
        let fields = complete().validate().unwrap();
        assert_eq!(fields, ModelFields::new("id", "modified", "User"));
    }

    #[test]
    fn test_missing_fields_reported_in_order() {
        let mut config = AdapterConfig {
            engine: "graph".into(),
            ..Default::default()
        };
        assert_eq!(missing_field(&config), "model_schema_file");

        config.model_schema_file = Some("openapi.yml".into());
        assert_eq!(missing_field(&config), "model_schema");

        config.model_schema = Some("User".into());
        assert_eq!(missing_field(&config), "model_version_key");

        config.model_version_key = Some("modified".into());
        assert_eq!(missing_field(&config), "model_identifier");

        config.model_identifier = Some("id".into());
        assert_eq!(missing_field(&config), "node");
    }

    #[test]
    fn test_collection_key_follows_engine() {
        let mut config = complete();
        config.engine = "wide_column".into();
        assert_eq!(missing_field(&config), "table");
        config.engine = "object".into();
        assert_eq!(missing_field(&config), "bucket");
    }

    #[test]
    fn test_skip_validation_falls_back() {
        let config = AdapterConfig {
            skip_validation: true,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap(), ModelFields::new("id", "version", "items"));
    }

    #[test]
    fn test_unsupported_engine_checked_even_when_skipping() {
        let config = AdapterConfig {
            engine: "redis".into(),
            skip_validation: true,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AdapterError::UnsupportedEngine(_))));
    }

    #[test]
    fn test_yaml_defaults_and_status_alias() {
        let config = AdapterConfig::from_yaml("engine: s3\nstatus: true\n").unwrap();
        assert!(config.skip_validation);
        assert!(config.validate_schema);
        assert!(config.auto_connect);
        assert_eq!(config.notifier.broadcast_capacity, 1024);
        assert!(config.notifier.topic.is_none());
    }
}

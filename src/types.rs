//! Data types exchanged with ksqlDB and returned to callers.
//!
//! The structs here deserialize directly from the engine's JSON entities
//! (`SHOW STREAMS`, `SHOW QUERIES`, `DESCRIBE ... EXTENDED` and command status
//! records). Fields the reconciler does not need are ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::{self, Display};

/// Kind of a ksqlDB data source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceKind {
  /// An append-only stream.
  Stream,
  /// A changelog table.
  Table,
  /// A kind this crate does not know about.
  Other(String),
}

impl From<String> for SourceKind {
  fn from(value: String) -> Self {
    match value.to_uppercase().as_str() {
      "STREAM" => SourceKind::Stream,
      "TABLE" => SourceKind::Table,
      _ => SourceKind::Other(value),
    }
  }
}

impl From<SourceKind> for String {
  fn from(kind: SourceKind) -> Self {
    kind.to_string()
  }
}

impl Display for SourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SourceKind::Stream => write!(f, "STREAM"),
      SourceKind::Table => write!(f, "TABLE"),
      SourceKind::Other(kind) => write!(f, "{}", kind.to_uppercase()),
    }
  }
}

/// A stream or table known to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
  /// Source name. Compared case-insensitively.
  pub name: String,
  /// Stream or table.
  #[serde(rename = "type")]
  pub kind: SourceKind,
  /// Backing Kafka topic.
  #[serde(default)]
  pub topic: String,
  /// Value serialization format.
  #[serde(default, alias = "format")]
  pub value_format: String,
  /// Statement that created the source. Listings do not include it.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub statement: Option<String>,
}

impl DataSource {
  /// Returns true when `name` refers to this source.
  pub fn is_named(&self, name: &str) -> bool {
    self.name.eq_ignore_ascii_case(name)
  }
}

/// A persistent query running on the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
  /// Query id, e.g. `CSAS_ORDERS_0`.
  pub id: String,
  /// Data sources the query writes to.
  #[serde(default)]
  pub sinks: Vec<String>,
  /// The statement text that started the query.
  #[serde(default)]
  pub query_string: String,
  /// Engine-reported state, e.g. `RUNNING`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub state: Option<String>,
}

impl Query {
  /// Returns true when the query writes to `name`.
  pub fn writes_to(&self, name: &str) -> bool {
    self.sinks.iter().any(|sink| sink.eq_ignore_ascii_case(name))
  }
}

/// Result of `DESCRIBE <source> [EXTENDED]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescription {
  /// Source name.
  pub name: String,
  /// Stream or table.
  #[serde(rename = "type")]
  pub kind: SourceKind,
  /// Backing Kafka topic.
  #[serde(default)]
  pub topic: String,
  /// Key serialization format.
  #[serde(default)]
  pub key_format: String,
  /// Value serialization format.
  #[serde(default)]
  pub value_format: String,
  /// Statement that created the source.
  #[serde(default)]
  pub statement: String,
  /// Queries reading from the source.
  #[serde(default)]
  pub read_queries: Vec<Query>,
  /// Queries writing to the source.
  #[serde(default)]
  pub write_queries: Vec<Query>,
  /// Column schema, passed through untouched.
  #[serde(default)]
  pub fields: Vec<Value>,
}

impl SourceDescription {
  /// Ids of every query that must be terminated before the source can be
  /// dropped. Writers come first, duplicates are removed.
  pub fn dependent_query_ids(&self) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for query in self.write_queries.iter().chain(&self.read_queries) {
      if !ids.contains(&query.id) {
        ids.push(query.id.clone());
      }
    }
    ids
  }

  /// Converts the description into a catalog entry.
  pub fn to_data_source(&self, name: &str) -> DataSource {
    DataSource {
      name: name.to_string(),
      kind: self.kind.clone(),
      topic: self.topic.clone(),
      value_format: self.value_format.clone(),
      statement: (!self.statement.is_empty()).then(|| self.statement.clone()),
    }
  }
}

/// Flattened outcome of one command accepted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
  /// Position of the command in the engine's command log.
  pub command_sequence_number: Option<i64>,
  /// Status, e.g. `SUCCESS` or `OK`.
  pub status: String,
  /// Human-readable message.
  pub message: String,
  /// The raw record the result was built from.
  pub data: Value,
}

impl CommandResult {
  /// Flattens a raw response record. Returns `None` for records without a
  /// `commandStatus` field.
  pub fn from_record(record: &Value) -> Option<Self> {
    let status = record.get("commandStatus")?;
    let text = |key: &str| {
      status
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
    };
    Some(Self {
      command_sequence_number: record.get("commandSequenceNumber").and_then(Value::as_i64),
      status: text("status"),
      message: text("message"),
      data: record.clone(),
    })
  }
}

/// Extra per-request settings for the command channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestProperties {
  /// Streams properties merged over the defaults.
  pub streams_properties: Map<String, Value>,
  /// Headers merged over the default headers.
  pub headers: BTreeMap<String, String>,
}

impl RequestProperties {
  /// Creates empty properties.
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds a streams property.
  #[must_use]
  pub fn with_streams_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.streams_properties.insert(key.into(), value.into());
    self
  }

  /// Adds a header.
  #[must_use]
  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.insert(name.into(), value.into());
    self
  }
}

/// What the reconciler decided to do with a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileDecision {
  /// Create a source that does not exist yet.
  Create,
  /// Leave an existing source alone.
  Skip,
  /// Drop and recreate a changed source.
  Replace,
  /// Drop a source and its dependent queries.
  Drop,
  /// Return a source description.
  Describe,
  /// Send the statement unchanged.
  PassThrough,
}

impl Display for ReconcileDecision {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ReconcileDecision::Create => "create",
      ReconcileDecision::Skip => "skip",
      ReconcileDecision::Replace => "replace",
      ReconcileDecision::Drop => "drop",
      ReconcileDecision::Describe => "describe",
      ReconcileDecision::PassThrough => "pass-through",
    };
    f.write_str(name)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_source_kind_from_string() {
    assert_eq!(SourceKind::from("stream".to_string()), SourceKind::Stream);
    assert_eq!(SourceKind::from("TABLE".to_string()), SourceKind::Table);
    assert_eq!(
      SourceKind::from("view".to_string()),
      SourceKind::Other("view".to_string())
    );
    assert_eq!(SourceKind::Table.to_string(), "TABLE");
  }

  #[test]
  fn test_data_source_from_listing() {
    let source: DataSource = serde_json::from_value(json!({
      "type": "STREAM",
      "name": "PAGEVIEWS",
      "topic": "pageviews",
      "keyFormat": "KAFKA",
      "valueFormat": "JSON",
      "isWindowed": false
    }))
    .unwrap();

    assert_eq!(source.kind, SourceKind::Stream);
    assert_eq!(source.value_format, "JSON");
    assert!(source.statement.is_none());
    assert!(source.is_named("pageviews"));
  }

  #[test]
  fn test_dependent_query_ids_dedupes_writers_first() {
    let description: SourceDescription = serde_json::from_value(json!({
      "name": "S1",
      "type": "STREAM",
      "readQueries": [{"id": "q2", "sinks": ["S2"]}, {"id": "q1"}],
      "writeQueries": [{"id": "q1", "sinks": ["S1"]}]
    }))
    .unwrap();

    assert_eq!(description.dependent_query_ids(), vec!["q1", "q2"]);
  }

  #[test]
  fn test_command_result_from_record() {
    let record = json!({
      "@type": "currentStatus",
      "commandId": "stream/`S1`/create",
      "commandStatus": {"status": "SUCCESS", "message": "Stream created"},
      "commandSequenceNumber": 4
    });
    let result = CommandResult::from_record(&record).unwrap();
    assert_eq!(result.command_sequence_number, Some(4));
    assert_eq!(result.status, "SUCCESS");
    assert_eq!(result.message, "Stream created");

    assert!(CommandResult::from_record(&json!({"@type": "streams"})).is_none());
  }
}

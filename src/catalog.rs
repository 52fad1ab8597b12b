//! # Resource Catalog
//!
//! Best-effort, in-memory view of the data sources and persistent queries on
//! one ksqlDB cluster.
//!
//! [`Catalog::load`] replaces the snapshot with the result of `SHOW TABLES`,
//! `SHOW STREAMS` and `SHOW QUERIES`. After that the reconciler keeps it
//! current by recording the creates, drops and terminations it performs
//! itself. Changes made by any other client are invisible until the next
//! load.

use crate::channel::CommandChannel;
use crate::error::Result;
use crate::types::{DataSource, Query};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace, warn};

/// Statement listing every table and stream.
pub const LIST_SOURCES: &str = "SHOW TABLES; SHOW STREAMS;";

/// Statement listing every table and stream with details.
pub const LIST_SOURCES_EXTENDED: &str = "SHOW TABLES EXTENDED; SHOW STREAMS EXTENDED;";

/// Statement listing every persistent query.
pub const LIST_QUERIES: &str = "SHOW QUERIES;";

/// Statement listing every persistent query with details.
pub const LIST_QUERIES_EXTENDED: &str = "SHOW QUERIES EXTENDED;";

/// Cached data sources and queries.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
  data_sources: Vec<DataSource>,
  queries: Vec<Query>,
  loaded_at: Option<DateTime<Utc>>,
}

impl Catalog {
  /// Creates an empty, unloaded catalog.
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates a catalog from a known snapshot.
  pub fn with_snapshot(data_sources: Vec<DataSource>, queries: Vec<Query>) -> Self {
    Self {
      data_sources,
      queries,
      loaded_at: Some(Utc::now()),
    }
  }

  /// Refreshes the snapshot from the engine.
  pub async fn load(&mut self, channel: &dyn CommandChannel, sequence: Option<i64>) -> Result<()> {
    let data_sources = fetch_entities(channel, LIST_SOURCES, sequence).await?;
    debug!(count = data_sources.len(), "Existing resources loaded");
    let queries = fetch_entities(channel, LIST_QUERIES, sequence).await?;
    debug!(count = queries.len(), "Existing queries loaded");

    self.data_sources = data_sources;
    self.queries = queries;
    self.loaded_at = Some(Utc::now());
    Ok(())
  }

  /// Returns true once a snapshot has been loaded.
  pub fn is_loaded(&self) -> bool {
    self.loaded_at.is_some()
  }

  /// Time of the last load.
  pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
    self.loaded_at
  }

  /// Cached data sources.
  pub fn data_sources(&self) -> &[DataSource] {
    &self.data_sources
  }

  /// Cached persistent queries.
  pub fn queries(&self) -> &[Query] {
    &self.queries
  }

  /// Finds a data source by name, ignoring case.
  pub fn find(&self, name: &str) -> Option<&DataSource> {
    self.data_sources.iter().find(|source| source.is_named(name))
  }

  /// Returns true when a data source with this name is cached.
  pub fn contains(&self, name: &str) -> bool {
    self.find(name).is_some()
  }

  /// Records a created data source, replacing any entry with the same name.
  pub fn record_created(&mut self, source: DataSource) {
    self.data_sources.retain(|existing| !existing.is_named(&source.name));
    self.data_sources.push(source);
  }

  /// Forgets a dropped data source.
  pub fn record_dropped(&mut self, name: &str) {
    self.data_sources.retain(|source| !source.is_named(name));
  }

  /// Records a started query, replacing any entry with the same id.
  pub fn record_query(&mut self, query: Query) {
    self.queries.retain(|existing| !existing.id.eq_ignore_ascii_case(&query.id));
    self.queries.push(query);
  }

  /// Forgets a terminated query.
  pub fn record_terminated(&mut self, query_id: &str) {
    self.queries.retain(|query| !query.id.eq_ignore_ascii_case(query_id));
  }

  /// Queries whose sinks include `name`.
  pub fn queries_writing_to(&self, name: &str) -> Vec<&Query> {
    self.queries.iter().filter(|query| query.writes_to(name)).collect()
  }
}

/// Runs a `SHOW` statement and flattens its per-kind entity lists.
pub async fn fetch_entities<T: DeserializeOwned>(
  channel: &dyn CommandChannel,
  statement: &str,
  sequence: Option<i64>,
) -> Result<Vec<T>> {
  let records = channel.send(statement, None, sequence).await?;
  Ok(flatten_entities(&records))
}

/// Flattens `record[record["@type"]]` arrays from every response record.
///
/// Each `SHOW` response record holds its entities under a key named by its
/// `@type` (`streams`, `tables`, `queries`). Entities that fail to
/// deserialize are skipped with a warning.
pub fn flatten_entities<T: DeserializeOwned>(records: &[Value]) -> Vec<T> {
  let mut entities = Vec::new();
  for record in records {
    let Some(kind) = record.get("@type").and_then(Value::as_str) else {
      continue;
    };
    let Some(items) = record.get(kind).and_then(Value::as_array) else {
      trace!(kind, "Record carries no entity list");
      continue;
    };
    for item in items {
      match serde_json::from_value::<T>(item.clone()) {
        Ok(entity) => entities.push(entity),
        Err(e) => warn!(kind, error = %e, "Skipping unreadable entity"),
      }
    }
  }
  entities
}

//! # Reconciler
//!
//! Applies desired-state statements to a ksqlDB cluster.
//!
//! [`KsqlDbReconciler::execute_statement`] classifies a statement and takes
//! one of these paths:
//!
//! - **Create**: a source missing from the catalog is created and then
//!   described so the catalog learns its topic and format. An existing source
//!   is described and its stored statement diffed against the new one.
//!   Without differences nothing is sent. With differences the source is
//!   replaced (dropped and created again), but only for `CREATE OR REPLACE`.
//!   A plain `CREATE` with differences is skipped and the differences logged.
//! - **Drop**: every query reading or writing the source is terminated first,
//!   then the source itself is dropped.
//! - **Describe**: answered with a synthesized result carrying the source
//!   description.
//! - **Insert into** and everything else: sent unchanged.
//!
//! Every command result that carries a command sequence number advances the
//! [`SequenceCursor`], and the cursor is attached to the next request. This
//! makes the engine apply commands in the order they were submitted even
//! though its command log is asynchronous.
//!
//! The reconciler owns the catalog and the cursor. Nothing is retried and a
//! failing step aborts the whole operation; the catalog keeps the mutations
//! that completed before the failure.

use crate::catalog::{
  Catalog, LIST_QUERIES, LIST_QUERIES_EXTENDED, LIST_SOURCES, LIST_SOURCES_EXTENDED,
  fetch_entities,
};
use crate::channel::{CommandChannel, HttpCommandChannel};
use crate::classify::{
  ClassifiedStatement, Classifier, RegexClassifier, StatementKind, owns_backing_topic,
  unquote_identifier,
};
use crate::config::KsqlDbConfig;
use crate::diff::{Comparison, compare};
use crate::error::{KsqlError, Result};
use crate::script::split_statements;
use crate::types::{CommandResult, DataSource, Query, ReconcileDecision, SourceDescription};
use crate::variables::VariableManager;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Last command sequence number seen from the engine.
///
/// Once set it never moves backwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceCursor(Option<i64>);

impl SequenceCursor {
  /// Creates an unset cursor.
  pub fn new() -> Self {
    Self::default()
  }

  /// The sequence number to attach to the next command.
  pub fn current(&self) -> Option<i64> {
    self.0
  }

  /// Moves the cursor to `sequence` unless it already is at or past it.
  /// Returns whether the cursor moved.
  pub fn advance(&mut self, sequence: i64) -> bool {
    match self.0 {
      Some(current) if current >= sequence => false,
      _ => {
        self.0 = Some(sequence);
        true
      }
    }
  }
}

/// Reconciles statements against one ksqlDB cluster.
#[derive(Debug)]
pub struct KsqlDbReconciler<C, K = RegexClassifier> {
  channel: C,
  classifier: K,
  catalog: Catalog,
  cursor: SequenceCursor,
  variables: VariableManager,
  undefine_on_stop: bool,
}

impl KsqlDbReconciler<HttpCommandChannel> {
  /// Creates a reconciler talking HTTP to the configured host.
  pub fn connect(config: KsqlDbConfig) -> Result<Self> {
    let channel = HttpCommandChannel::new(config.clone())?;
    Ok(Self::from_config(channel, &config))
  }
}

impl<C: CommandChannel> KsqlDbReconciler<C> {
  /// Creates a reconciler over `channel` with no session variables.
  pub fn new(channel: C) -> Self {
    Self {
      channel,
      classifier: RegexClassifier::new(),
      catalog: Catalog::new(),
      cursor: SequenceCursor::new(),
      variables: VariableManager::default(),
      undefine_on_stop: false,
    }
  }

  /// Creates a reconciler over `channel` using the variables and shutdown
  /// behavior from `config`.
  pub fn from_config(channel: C, config: &KsqlDbConfig) -> Self {
    Self::new(channel)
      .with_variables(VariableManager::new(config.session_variables.clone()))
      .with_undefine_on_stop(config.undefine_on_stop)
  }
}

impl<C: CommandChannel, K: Classifier> KsqlDbReconciler<C, K> {
  /// Replaces the statement classifier.
  #[must_use]
  pub fn with_classifier<K2: Classifier>(self, classifier: K2) -> KsqlDbReconciler<C, K2> {
    KsqlDbReconciler {
      channel: self.channel,
      classifier,
      catalog: self.catalog,
      cursor: self.cursor,
      variables: self.variables,
      undefine_on_stop: self.undefine_on_stop,
    }
  }

  /// Sets the session variables defined on load.
  #[must_use]
  pub fn with_variables(mut self, variables: VariableManager) -> Self {
    self.variables = variables;
    self
  }

  /// Sets whether [`stop`](Self::stop) removes the session variables.
  #[must_use]
  pub fn with_undefine_on_stop(mut self, undefine: bool) -> Self {
    self.undefine_on_stop = undefine;
    self
  }

  /// Starts from a known catalog instead of loading one.
  #[must_use]
  pub fn with_catalog(mut self, catalog: Catalog) -> Self {
    self.catalog = catalog;
    self
  }

  /// The command channel.
  pub fn channel(&self) -> &C {
    &self.channel
  }

  /// The cached catalog.
  pub fn catalog(&self) -> &Catalog {
    &self.catalog
  }

  /// The command sequence cursor.
  pub fn cursor(&self) -> SequenceCursor {
    self.cursor
  }

  /// Loads the catalog from the engine and defines session variables.
  pub async fn load_catalog(&mut self) -> Result<()> {
    self.catalog.load(&self.channel, self.cursor.current()).await?;
    self.define_variables().await?;
    Ok(())
  }

  /// Defines the configured session variables on the engine.
  pub async fn define_variables(&mut self) -> Result<Vec<CommandResult>> {
    let records = self.variables.define(&self.channel, self.cursor.current()).await?;
    Ok(self.process_records(&records))
  }

  /// Removes the configured session variables from the engine.
  pub async fn undefine_variables(&mut self) -> Result<Vec<CommandResult>> {
    let records = self.variables.undefine(&self.channel, self.cursor.current()).await?;
    Ok(self.process_records(&records))
  }

  async fn ensure_loaded(&mut self) -> Result<()> {
    if !self.catalog.is_loaded() {
      self.load_catalog().await?;
    }
    Ok(())
  }

  /// Cached data sources, loading the catalog first if needed.
  pub async fn list_data_sources(&mut self) -> Result<&[DataSource]> {
    self.ensure_loaded().await?;
    Ok(self.catalog.data_sources())
  }

  /// Cached persistent queries, loading the catalog first if needed.
  pub async fn list_queries(&mut self) -> Result<&[Query]> {
    self.ensure_loaded().await?;
    Ok(self.catalog.queries())
  }

  /// Lists data sources straight from the engine, optionally `EXTENDED`.
  /// The catalog is not touched.
  pub async fn fetch_data_sources(&self, detail: bool) -> Result<Vec<DataSource>> {
    let statement = if detail { LIST_SOURCES_EXTENDED } else { LIST_SOURCES };
    fetch_entities(&self.channel, statement, self.cursor.current()).await
  }

  /// Lists persistent queries straight from the engine, optionally
  /// `EXTENDED`. The catalog is not touched.
  pub async fn fetch_queries(&self, detail: bool) -> Result<Vec<Query>> {
    let statement = if detail { LIST_QUERIES_EXTENDED } else { LIST_QUERIES };
    fetch_entities(&self.channel, statement, self.cursor.current()).await
  }

  /// Reconciles one statement and returns the results of the commands the
  /// engine accepted.
  pub async fn execute_statement(&mut self, statement: &str) -> Result<Vec<CommandResult>> {
    let classified = self.classifier.classify(statement)?;
    self.ensure_loaded().await?;

    match classified.kind {
      StatementKind::Create => self.create(statement, &classified).await,
      StatementKind::InsertInto => {
        let results = self.send(statement).await?;
        self.record_started_queries(&results, classified.target.as_deref(), statement);
        Ok(results)
      }
      StatementKind::Drop => {
        let identifier = required_identifier(&classified, "drop", statement)?;
        self.drop(&identifier, classified.delete_topic).await
      }
      StatementKind::Describe => {
        let identifier = required_identifier(&classified, "fetch", statement)?;
        let description = self.describe_raw(&identifier, classified.extended).await?;
        Ok(vec![CommandResult {
          command_sequence_number: None,
          status: "OK".to_string(),
          message: format!("details for {}", unquote_identifier(&identifier)),
          data: description,
        }])
      }
      StatementKind::Other => self.send(statement).await,
    }
  }

  /// Reconciles every statement of a script in order, stopping at the first
  /// failure.
  pub async fn execute_script(&mut self, script: &str) -> Result<Vec<CommandResult>> {
    let mut results = Vec::new();
    for statement in split_statements(script) {
      results.extend(self.execute_statement(&statement).await?);
    }
    Ok(results)
  }

  /// Works out what [`execute_statement`](Self::execute_statement) would do
  /// without creating, dropping or terminating anything. May describe an
  /// existing source to compare statements.
  ///
  /// An unloaded catalog is loaded first, and loading also defines the
  /// configured session variables on the engine.
  pub async fn plan(&mut self, statement: &str) -> Result<ReconcileDecision> {
    let classified = self.classifier.classify(statement)?;
    self.ensure_loaded().await?;

    let decision = match classified.kind {
      StatementKind::Create => match classified.identifier.as_deref() {
        Some(identifier) => self.plan_create(identifier, statement, &classified).await?.0,
        None => ReconcileDecision::Create,
      },
      StatementKind::Drop => ReconcileDecision::Drop,
      StatementKind::Describe => ReconcileDecision::Describe,
      StatementKind::InsertInto | StatementKind::Other => ReconcileDecision::PassThrough,
    };
    Ok(decision)
  }

  async fn plan_create(
    &self,
    identifier: &str,
    statement: &str,
    classified: &ClassifiedStatement,
  ) -> Result<(ReconcileDecision, Option<Comparison>)> {
    let target = unquote_identifier(identifier);
    if !self.catalog.contains(&target) {
      return Ok((ReconcileDecision::Create, None));
    }
    debug!(datasource = %target, "Datasource already exists");

    let description = self.describe(identifier, true).await?;
    let comparison = compare(&description.statement, statement);
    debug!(datasource = %target, differences = comparison.difference_count, "Compared statements");

    let decision = if !comparison.is_different() {
      ReconcileDecision::Skip
    } else if classified.or_replace {
      ReconcileDecision::Replace
    } else {
      ReconcileDecision::Skip
    };
    Ok((decision, Some(comparison)))
  }

  async fn create(
    &mut self,
    statement: &str,
    classified: &ClassifiedStatement,
  ) -> Result<Vec<CommandResult>> {
    let Some(identifier) = classified.identifier.as_deref() else {
      info!("Creating datasource with unrecognized name");
      return self.send(statement).await;
    };

    let (decision, comparison) = self.plan_create(identifier, statement, classified).await?;
    match decision {
      ReconcileDecision::Replace => {
        if let Some(comparison) = &comparison {
          info!(datasource = identifier, changes = %comparison, "Datasource statement changed");
        }
        self.recreate(identifier, statement).await
      }
      ReconcileDecision::Skip => {
        match comparison {
          Some(comparison) if comparison.is_different() => warn!(
            datasource = identifier,
            changes = %comparison,
            "Cannot replace existing datasource without CREATE OR REPLACE statement"
          ),
          _ => info!(datasource = identifier, "No changes to datasource, skipping"),
        }
        Ok(Vec::new())
      }
      _ => self.create_new(identifier, statement).await,
    }
  }

  /// Sends `statement`, then describes the new source and records it. A
  /// source the engine cannot describe afterwards fails the create.
  async fn create_new(&mut self, identifier: &str, statement: &str) -> Result<Vec<CommandResult>> {
    info!(datasource = identifier, "Creating datasource");
    let results = self.send(statement).await?;

    let description = self.describe(identifier, false).await?;
    let mut source = description.to_data_source(&unquote_identifier(identifier));
    source.statement = Some(statement.to_string());
    self.catalog.record_created(source);
    for query in description.write_queries {
      self.catalog.record_query(query);
    }

    Ok(results)
  }

  /// Drops `identifier` and creates it again from `statement`.
  ///
  /// The backing topic is deleted along with the source only when the
  /// statement both names the topic and sets its partition count.
  pub async fn recreate(&mut self, identifier: &str, statement: &str) -> Result<Vec<CommandResult>> {
    info!(datasource = identifier, "Recreating datasource");
    let delete_topic = owns_backing_topic(statement);
    let mut results = self.drop(identifier, delete_topic).await?;
    results.extend(self.create_new(identifier, statement).await?);
    Ok(results)
  }

  /// Terminates every query that depends on a source, then drops it.
  ///
  /// `identifier` is written into the outgoing statements as given, so a
  /// case-sensitive name must keep its backticks.
  pub async fn drop(&mut self, identifier: &str, delete_topic: bool) -> Result<Vec<CommandResult>> {
    debug!(datasource = identifier, delete_topic, "Dropping datasource and all queries");
    let description = self.describe(identifier, true).await?;

    let mut results = Vec::new();
    for query_id in description.dependent_query_ids() {
      results.extend(self.terminate(&query_id).await?);
    }

    let statement = format!(
      "DROP {} IF EXISTS {}{};",
      description.kind,
      identifier,
      if delete_topic { " DELETE TOPIC" } else { "" }
    );
    results.extend(self.send(&statement).await?);
    self.catalog.record_dropped(&unquote_identifier(identifier));
    info!(datasource = identifier, kind = %description.kind, "Dropped datasource");

    Ok(results)
  }

  /// Stops and removes a persistent query.
  pub async fn terminate(&mut self, query_id: &str) -> Result<Vec<CommandResult>> {
    let results = self.send(&format!("TERMINATE {};", query_id)).await?;
    self.catalog.record_terminated(query_id);
    info!(query = query_id, "Terminated query");
    Ok(results)
  }

  /// Describes a data source named by `identifier`, backticks included.
  pub async fn describe(&self, identifier: &str, extended: bool) -> Result<SourceDescription> {
    let raw = self.describe_raw(identifier, extended).await?;
    Ok(serde_json::from_value(raw)?)
  }

  async fn describe_raw(&self, identifier: &str, extended: bool) -> Result<Value> {
    let statement = format!("DESCRIBE {}{};", identifier, if extended { " EXTENDED" } else { "" });
    let records = self
      .channel
      .send(&statement, None, self.cursor.current())
      .await?;
    let description = records
      .into_iter()
      .find_map(|mut record| record.get_mut("sourceDescription").map(Value::take))
      .filter(|description| !description.is_null())
      .ok_or_else(|| KsqlError::NotFound(unquote_identifier(identifier)))?;
    debug!(datasource = identifier, ?description, "Source description");
    Ok(description)
  }

  /// Removes the session variables if configured to, and finishes.
  pub async fn stop(&mut self) -> Result<()> {
    if self.undefine_on_stop {
      self.undefine_variables().await?;
    }
    info!("ksqlDB finished");
    Ok(())
  }

  /// Sends a statement and processes its command results.
  async fn send(&mut self, statement: &str) -> Result<Vec<CommandResult>> {
    let records = self
      .channel
      .send(statement, None, self.cursor.current())
      .await?;
    Ok(self.process_records(&records))
  }

  /// Keeps records with a `commandStatus`, flattens them and advances the
  /// cursor.
  fn process_records(&mut self, records: &[Value]) -> Vec<CommandResult> {
    let results: Vec<CommandResult> = records.iter().filter_map(CommandResult::from_record).collect();
    for result in &results {
      if let Some(sequence) = result.command_sequence_number
        && !self.cursor.advance(sequence)
      {
        debug!(sequence, current = ?self.cursor.current(), "Ignoring stale command sequence number");
      }
    }
    results
  }

  fn record_started_queries(&mut self, results: &[CommandResult], sink: Option<&str>, statement: &str) {
    for result in results {
      let Some(query_id) = result
        .data
        .get("commandStatus")
        .and_then(|status| status.get("queryId"))
        .and_then(Value::as_str)
      else {
        continue;
      };
      self.catalog.record_query(Query {
        id: query_id.to_string(),
        sinks: sink.map(|s| vec![s.to_string()]).unwrap_or_default(),
        query_string: statement.to_string(),
        state: None,
      });
    }
  }
}

fn required_identifier(
  classified: &ClassifiedStatement,
  action: &'static str,
  statement: &str,
) -> Result<String> {
  classified
    .identifier
    .clone()
    .ok_or_else(|| KsqlError::parse(action, statement))
}

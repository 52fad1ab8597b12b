//! # Statement Classifier
//!
//! Decides which reconciliation path a statement takes by looking at its
//! leading keywords, and pulls out the data source it targets.
//!
//! | Leading keywords                                   | Kind         |
//! |----------------------------------------------------|--------------|
//! | `CREATE [OR REPLACE] (STREAM\|TABLE) <name>`        | `Create`     |
//! | `INSERT INTO <name>`                               | `InsertInto` |
//! | `DROP (STREAM\|TABLE) [IF EXISTS] <name>`           | `Drop`       |
//! | `DESCRIBE [EXTENDED] <name> [EXTENDED]`            | `Describe`   |
//! | anything else                                      | `Other`      |
//!
//! Matching is case-insensitive and anchored at the start of the statement,
//! after leading whitespace and comment lines. A `DROP` or `DESCRIBE` without
//! a recognizable name is a [`KsqlError::Parse`]. A `CREATE` without one is
//! still classified as `Create` with no target.
//!
//! The reconciler only sees the [`Classifier`] trait, so the regex-based
//! [`RegexClassifier`] can be swapped for a tokenizer without touching it.

use crate::error::{KsqlError, Result};
use crate::normalize::strip_line_comments;
use crate::types::SourceKind;
use regex::Regex;
use std::sync::LazyLock;

const IDENTIFIER: &str = r"(\w+|`[^`]+`)";

static CREATE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(&format!(
    r"(?is)^create\s+(or\s+replace\s+)?(?:source\s+)?(stream|table)\b(?:\s+if\s+not\s+exists)?(?:\s+{})?",
    IDENTIFIER
  ))
  .expect("valid create regex")
});

static INSERT_INTO: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(&format!(r"(?is)^insert\s+into\b(?:\s+{})?", IDENTIFIER))
    .expect("valid insert regex")
});

static DROP: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(&format!(
    r"(?is)^drop\s+(stream|table)\b(?:\s+if\s+exists)?(?:\s+{})?",
    IDENTIFIER
  ))
  .expect("valid drop regex")
});

static DESCRIBE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(&format!(
    r"(?is)^describe\b(?:\s+extended)?(?:\s+{})?",
    IDENTIFIER
  ))
  .expect("valid describe regex")
});

static FROM_SOURCE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(&format!(r"(?is)\bfrom\s+{}", IDENTIFIER)).expect("valid from regex")
});

static DELETE_TOPIC: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)\bdelete\s+topic\b").expect("valid delete topic regex"));

static EXTENDED: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)\bextended\b").expect("valid extended regex"));

static TOPIC_OVERRIDE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)\bkafka_topic\s*=").expect("valid topic regex"));

static PARTITION_COUNT: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)\bpartitions\s*=").expect("valid partitions regex"));

/// Words that may follow `DESCRIBE` without naming a data source.
const DESCRIBE_NON_SOURCES: &[&str] = &["function", "connector", "streams", "tables"];

/// Reconciliation path of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
  /// `CREATE [OR REPLACE] STREAM|TABLE`.
  Create,
  /// `INSERT INTO`.
  InsertInto,
  /// `DROP STREAM|TABLE`.
  Drop,
  /// `DESCRIBE <source>`.
  Describe,
  /// Everything else, sent as-is.
  Other,
}

/// A statement together with what the classifier learned about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedStatement {
  /// Reconciliation path.
  pub kind: StatementKind,
  /// Targeted data source, without quoting. Used for catalog lookups.
  pub target: Option<String>,
  /// Targeted data source as written, backticks included. Used in
  /// statements sent back to the engine so quoted names keep their case.
  pub identifier: Option<String>,
  /// Stream or table, for `CREATE` and `DROP`.
  pub source_kind: Option<SourceKind>,
  /// `CREATE OR REPLACE`.
  pub or_replace: bool,
  /// `DESCRIBE ... EXTENDED`.
  pub extended: bool,
  /// `DROP ... DELETE TOPIC`.
  pub delete_topic: bool,
  /// First source named after `FROM`. Informational only.
  pub from_source: Option<String>,
}

impl ClassifiedStatement {
  fn new(kind: StatementKind) -> Self {
    Self {
      kind,
      target: None,
      identifier: None,
      source_kind: None,
      or_replace: false,
      extended: false,
      delete_topic: false,
      from_source: None,
    }
  }

  fn set_target(&mut self, identifier: Option<&str>) {
    self.target = identifier.map(unquote_identifier);
    self.identifier = identifier.map(str::to_string);
  }
}

/// Assigns statements to a [`StatementKind`].
pub trait Classifier: Send + Sync {
  /// Classifies one statement.
  fn classify(&self, statement: &str) -> Result<ClassifiedStatement>;
}

/// [`Classifier`] driven by anchored regular expressions.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexClassifier;

impl RegexClassifier {
  /// Creates a classifier.
  pub fn new() -> Self {
    Self
  }
}

impl Classifier for RegexClassifier {
  fn classify(&self, statement: &str) -> Result<ClassifiedStatement> {
    let uncommented = strip_line_comments(statement);
    let text = uncommented.trim_start();

    if let Some(caps) = CREATE.captures(text) {
      let mut classified = ClassifiedStatement::new(StatementKind::Create);
      classified.or_replace = caps.get(1).is_some();
      classified.source_kind = caps.get(2).map(|m| SourceKind::from(m.as_str().to_string()));
      classified.set_target(caps.get(3).map(|m| m.as_str()));
      classified.from_source = from_source(text);
      return Ok(classified);
    }

    if let Some(caps) = INSERT_INTO.captures(text) {
      let mut classified = ClassifiedStatement::new(StatementKind::InsertInto);
      classified.set_target(caps.get(1).map(|m| m.as_str()));
      classified.from_source = from_source(text);
      return Ok(classified);
    }

    if let Some(caps) = DROP.captures(text) {
      let mut classified = ClassifiedStatement::new(StatementKind::Drop);
      classified.source_kind = caps.get(1).map(|m| SourceKind::from(m.as_str().to_string()));
      let identifier = caps
        .get(2)
        .map(|m| m.as_str())
        .ok_or_else(|| KsqlError::parse("drop", statement))?;
      classified.set_target(Some(identifier));
      classified.delete_topic = DELETE_TOPIC.is_match(text);
      return Ok(classified);
    }

    if let Some(caps) = DESCRIBE.captures(text) {
      let name = caps.get(1).map(|m| m.as_str());
      if name.is_some_and(|word| DESCRIBE_NON_SOURCES.contains(&word.to_lowercase().as_str())) {
        return Ok(ClassifiedStatement::new(StatementKind::Other));
      }
      let identifier = name
        .filter(|word| !word.eq_ignore_ascii_case("extended"))
        .ok_or_else(|| KsqlError::parse("fetch", statement))?;

      let mut classified = ClassifiedStatement::new(StatementKind::Describe);
      classified.set_target(Some(identifier));
      classified.extended = EXTENDED.is_match(text);
      return Ok(classified);
    }

    Ok(ClassifiedStatement::new(StatementKind::Other))
  }
}

/// Whether a replaced source's backing topic should be deleted with it.
///
/// Only a statement that names its topic and also sets a partition count had
/// the engine create that topic, so only then is the topic ours to delete.
pub fn owns_backing_topic(statement: &str) -> bool {
  TOPIC_OVERRIDE.is_match(statement) && PARTITION_COUNT.is_match(statement)
}

fn from_source(text: &str) -> Option<String> {
  FROM_SOURCE
    .captures(text)
    .and_then(|caps| caps.get(1))
    .map(|m| unquote_identifier(m.as_str()))
}

/// Strips the backticks from a quoted identifier.
pub fn unquote_identifier(identifier: &str) -> String {
  identifier.trim_matches('`').to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn classify(statement: &str) -> Result<ClassifiedStatement> {
    RegexClassifier::new().classify(statement)
  }

  #[test]
  fn test_classify_create() {
    let c = classify("CREATE STREAM s1 (a INT) WITH (...)").unwrap();
    assert_eq!(c.kind, StatementKind::Create);
    assert_eq!(c.target.as_deref(), Some("s1"));
    assert_eq!(c.source_kind, Some(SourceKind::Stream));
    assert!(!c.or_replace);
  }

  #[test]
  fn test_classify_create_or_replace_table_as_select() {
    let c = classify("create or replace table totals as select id, count(*) from orders group by id;")
      .unwrap();
    assert_eq!(c.kind, StatementKind::Create);
    assert_eq!(c.target.as_deref(), Some("totals"));
    assert_eq!(c.source_kind, Some(SourceKind::Table));
    assert!(c.or_replace);
    assert_eq!(c.from_source.as_deref(), Some("orders"));
  }

  #[test]
  fn test_classify_create_without_name() {
    let c = classify("CREATE STREAM (a INT)").unwrap();
    assert_eq!(c.kind, StatementKind::Create);
    assert_eq!(c.target, None);
  }

  #[test]
  fn test_classify_skips_leading_comments() {
    let c = classify("-- orders stream\n\n  CREATE STREAM `Orders` (id INT);").unwrap();
    assert_eq!(c.kind, StatementKind::Create);
    assert_eq!(c.target.as_deref(), Some("Orders"));
  }

  #[test]
  fn test_quoted_identifier_is_kept_as_written() {
    let c = classify("DROP STREAM IF EXISTS `Orders` DELETE TOPIC;").unwrap();
    assert_eq!(c.target.as_deref(), Some("Orders"));
    assert_eq!(c.identifier.as_deref(), Some("`Orders`"));

    let c = classify("DESCRIBE `Orders` EXTENDED;").unwrap();
    assert_eq!(c.target.as_deref(), Some("Orders"));
    assert_eq!(c.identifier.as_deref(), Some("`Orders`"));

    let c = classify("CREATE STREAM s1 (id INT);").unwrap();
    assert_eq!(c.identifier.as_deref(), Some("s1"));
  }

  #[test]
  fn test_classify_insert_into() {
    let c = classify("INSERT INTO all_orders SELECT * FROM eu_orders;").unwrap();
    assert_eq!(c.kind, StatementKind::InsertInto);
    assert_eq!(c.target.as_deref(), Some("all_orders"));
    assert_eq!(c.from_source.as_deref(), Some("eu_orders"));
  }

  #[test]
  fn test_classify_drop() {
    let c = classify("DROP TABLE Bar IF EXISTS").unwrap();
    assert_eq!(c.kind, StatementKind::Drop);
    assert_eq!(c.target.as_deref(), Some("Bar"));
    assert!(!c.delete_topic);

    let c = classify("drop stream if exists s1 delete topic;").unwrap();
    assert_eq!(c.target.as_deref(), Some("s1"));
    assert_eq!(c.source_kind, Some(SourceKind::Stream));
    assert!(c.delete_topic);
  }

  #[test]
  fn test_classify_drop_without_name_is_parse_error() {
    assert!(matches!(
      classify("DROP STREAM"),
      Err(KsqlError::Parse { action: "drop", .. })
    ));
  }

  #[test]
  fn test_classify_describe() {
    let c = classify("DESCRIBE baz EXTENDED").unwrap();
    assert_eq!(c.kind, StatementKind::Describe);
    assert_eq!(c.target.as_deref(), Some("baz"));
    assert!(c.extended);

    let c = classify("describe extended baz;").unwrap();
    assert_eq!(c.target.as_deref(), Some("baz"));
    assert!(c.extended);

    let c = classify("DESCRIBE baz").unwrap();
    assert!(!c.extended);
  }

  #[test]
  fn test_classify_describe_without_name_is_parse_error() {
    assert!(matches!(
      classify("DESCRIBE"),
      Err(KsqlError::Parse { action: "fetch", .. })
    ));
    assert!(matches!(
      classify("DESCRIBE EXTENDED"),
      Err(KsqlError::Parse { .. })
    ));
  }

  #[test]
  fn test_classify_describe_function_is_other() {
    let c = classify("DESCRIBE FUNCTION substring;").unwrap();
    assert_eq!(c.kind, StatementKind::Other);
  }

  #[test]
  fn test_classify_other() {
    let c = classify("SELECT 1").unwrap();
    assert_eq!(c.kind, StatementKind::Other);
    assert_eq!(c.target, None);

    assert_eq!(
      classify("SHOW STREAMS;").unwrap().kind,
      StatementKind::Other
    );
    assert_eq!(
      classify("TERMINATE CSAS_S2_0;").unwrap().kind,
      StatementKind::Other
    );
  }

  #[test]
  fn test_owns_backing_topic() {
    assert!(owns_backing_topic(
      "CREATE OR REPLACE STREAM s1 (id INT) WITH (KAFKA_TOPIC='t1', PARTITIONS=3, VALUE_FORMAT='JSON')"
    ));
    assert!(owns_backing_topic("... with (kafka_topic = 't1', partitions = 1)"));
    assert!(!owns_backing_topic(
      "CREATE OR REPLACE STREAM s1 (id INT) WITH (KAFKA_TOPIC='t1', VALUE_FORMAT='JSON')"
    ));
  }
}

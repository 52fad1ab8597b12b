//! Session variable management.
//!
//! Variables from the configuration are defined in one batched statement when
//! the reconciler loads, so later statements can reference them as
//! `${name}`. They can be removed again on shutdown.

use crate::channel::CommandChannel;
use crate::error::{KsqlError, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, error};

/// Defines and removes session variables on the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableManager {
  variables: BTreeMap<String, String>,
}

impl VariableManager {
  /// Creates a manager for the given variables.
  pub fn new(variables: BTreeMap<String, String>) -> Self {
    Self { variables }
  }

  /// Configured variables.
  pub fn variables(&self) -> &BTreeMap<String, String> {
    &self.variables
  }

  /// Batched `DEFINE` statement, or `None` when nothing is configured.
  pub fn define_statement(&self) -> Option<String> {
    if self.variables.is_empty() {
      return None;
    }
    let statements: Vec<String> = self
      .variables
      .iter()
      .map(|(name, value)| format!("DEFINE {} = '{}';", name, value.replace('\'', "''")))
      .collect();
    Some(statements.join(" "))
  }

  /// Batched `UNDEFINE` statement, or `None` when nothing is configured.
  pub fn undefine_statement(&self) -> Option<String> {
    if self.variables.is_empty() {
      return None;
    }
    let statements: Vec<String> = self
      .variables
      .keys()
      .map(|name| format!("UNDEFINE {};", name))
      .collect();
    Some(statements.join(" "))
  }

  /// Defines every configured variable.
  pub async fn define(
    &self,
    channel: &dyn CommandChannel,
    sequence: Option<i64>,
  ) -> Result<Vec<Value>> {
    let Some(statement) = self.define_statement() else {
      return Ok(Vec::new());
    };
    debug!(variables = ?self.variables.keys().collect::<Vec<_>>(), "Defining variables");
    channel.send(&statement, None, sequence).await.map_err(|e| {
      error!(error = %e, "Defining ksqlDB variables failed");
      KsqlError::Variable {
        message: e.to_string(),
      }
    })
  }

  /// Removes every configured variable.
  pub async fn undefine(
    &self,
    channel: &dyn CommandChannel,
    sequence: Option<i64>,
  ) -> Result<Vec<Value>> {
    let Some(statement) = self.undefine_statement() else {
      return Ok(Vec::new());
    };
    debug!(variables = ?self.variables.keys().collect::<Vec<_>>(), "Removing variables");
    channel.send(&statement, None, sequence).await.map_err(|e| {
      error!(error = %e, "Removing ksqlDB variables failed");
      KsqlError::Variable {
        message: e.to_string(),
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn manager() -> VariableManager {
    let mut variables = BTreeMap::new();
    variables.insert("topic_prefix".to_string(), "dev".to_string());
    variables.insert("owner".to_string(), "o'brien".to_string());
    VariableManager::new(variables)
  }

  #[test]
  fn test_define_statement_is_sorted_and_escaped() {
    assert_eq!(
      manager().define_statement().as_deref(),
      Some("DEFINE owner = 'o''brien'; DEFINE topic_prefix = 'dev';")
    );
  }

  #[test]
  fn test_undefine_statement() {
    assert_eq!(
      manager().undefine_statement().as_deref(),
      Some("UNDEFINE owner; UNDEFINE topic_prefix;")
    );
  }

  #[test]
  fn test_no_variables_no_statement() {
    let empty = VariableManager::default();
    assert!(empty.define_statement().is_none());
    assert!(empty.undefine_statement().is_none());
  }
}

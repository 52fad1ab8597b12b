//! # Error Handling
//!
//! Error types shared by every stage of statement reconciliation.
//!
//! ## Error Kinds
//!
//! - **Parse**: the target identifier of a `DROP` or `DESCRIBE` statement could
//!   not be extracted. The statement is rejected, the name is never guessed.
//! - **Api**: the engine answered with a non-success status or a body that is
//!   not the expected JSON array. Carries the status code when one exists.
//! - **Transport**: the HTTP request never produced a response.
//! - **NotFound**: a describe returned no source description.
//! - **Variable**: defining or removing session variables failed.
//! - **Config**: the configuration failed validation.
//!
//! Nothing is retried internally. A multi-step operation such as a replace
//! aborts on the first failing call and returns that error.

use std::io;

/// Errors produced while talking to ksqlDB or reconciling statements.
#[derive(Debug, thiserror::Error)]
pub enum KsqlError {
  /// The statement target could not be extracted.
  #[error("Cannot {action} datasource, unable to parse statement: {statement}")]
  Parse {
    /// What the reconciler tried to do with the statement.
    action: &'static str,
    /// The offending statement text.
    statement: String,
  },
  /// The engine rejected the command or sent an unusable body.
  #[error("ksqlDB API call failed ({}): {message}", display_status(.status))]
  Api {
    /// HTTP status code, if a response was received.
    status: Option<u16>,
    /// Message reported by the engine.
    message: String,
  },
  /// Network-level failure.
  #[error("Transport error: {0}")]
  Transport(#[from] reqwest::Error),
  /// A describe came back without a source description.
  #[error("Datasource not found: {0}")]
  NotFound(String),
  /// Session variable definition or removal failed.
  #[error("Session variables failed: {message}")]
  Variable {
    /// Message of the underlying failure.
    message: String,
  },
  /// Invalid configuration.
  #[error("Invalid configuration: {0}")]
  Config(String),
  /// JSON encoding or decoding failed.
  #[error("Serialization error: {0}")]
  Json(#[from] serde_json::Error),
  /// I/O failure while reading scripts or configuration files.
  #[error("IO error: {0}")]
  Io(#[from] io::Error),
}

impl KsqlError {
  /// Creates an API error.
  pub fn api(status: Option<u16>, message: impl Into<String>) -> Self {
    KsqlError::Api {
      status,
      message: message.into(),
    }
  }

  /// Creates a parse error for the given action and statement.
  pub fn parse(action: &'static str, statement: impl Into<String>) -> Self {
    KsqlError::Parse {
      action,
      statement: statement.into(),
    }
  }

  /// Returns the HTTP status for API errors.
  pub fn status(&self) -> Option<u16> {
    match self {
      KsqlError::Api { status, .. } => *status,
      KsqlError::Transport(e) => e.status().map(|s| s.as_u16()),
      _ => None,
    }
  }
}

fn display_status(status: &Option<u16>) -> String {
  status.map_or_else(|| "no status".to_string(), |s| s.to_string())
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, KsqlError>;

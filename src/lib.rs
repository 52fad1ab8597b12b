//! # ksqlweave
//!
//! Declarative reconciliation of ksqlDB streams, tables and persistent
//! queries.
//!
//! Statements describe the desired state (`CREATE STREAM`, `CREATE OR REPLACE
//! TABLE`, `DROP`, `INSERT INTO`, ...). The reconciler compares them with what
//! the engine already runs and only sends the commands needed to get there:
//! unchanged sources are skipped, changed `CREATE OR REPLACE` sources are
//! dropped and recreated, and drops terminate dependent queries first.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ksqlweave::{KsqlDbConfig, KsqlDbReconciler};
//!
//! # async fn example() -> Result<(), ksqlweave::KsqlError> {
//! let config = KsqlDbConfig::new("http://localhost:8088").with_variable("env", "dev");
//! let mut reconciler = KsqlDbReconciler::connect(config)?;
//!
//! let results = reconciler
//!   .execute_statement(
//!     "CREATE STREAM orders (id INT) WITH (KAFKA_TOPIC='orders', VALUE_FORMAT='JSON');",
//!   )
//!   .await?;
//! for result in results {
//!   println!("{}: {}", result.status, result.message);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`channel`]: HTTP command channel to the `/ksql` endpoint
//! - [`normalize`] and [`diff`]: textual statement comparison
//! - [`classify`]: statement classification and target extraction
//! - [`catalog`]: cached view of sources and queries
//! - [`reconciler`]: the reconciliation state machine
//! - [`variables`]: session variable definition

// Documentation enforcement - treat missing docs as errors
#![deny(missing_docs)]

/// Cached data sources and persistent queries.
pub mod catalog;
/// Transport for administrative statements.
pub mod channel;
/// Statement classification.
pub mod classify;
/// Connection and session configuration.
pub mod config;
/// Textual statement comparison.
pub mod diff;
/// Error types.
pub mod error;
/// Statement normalization.
pub mod normalize;
/// Reconciliation state machine.
pub mod reconciler;
/// Script splitting.
pub mod script;
/// Wire and result types.
pub mod types;
/// Session variables.
pub mod variables;

pub use catalog::Catalog;
pub use channel::{CommandChannel, HttpCommandChannel};
pub use classify::{ClassifiedStatement, Classifier, RegexClassifier, StatementKind};
pub use config::{BasicAuth, KsqlDbConfig};
pub use diff::{Change, ChangeKind, Comparison, compare};
pub use error::{KsqlError, Result};
pub use normalize::normalize;
pub use reconciler::{KsqlDbReconciler, SequenceCursor};
pub use types::{
  CommandResult, DataSource, Query, ReconcileDecision, RequestProperties, SourceDescription,
  SourceKind,
};
pub use variables::VariableManager;

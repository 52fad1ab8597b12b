//! Connection and session configuration for a ksqlDB endpoint.
//!
//! [`KsqlDbConfig`] is built with the `with_*` methods or deserialized from a
//! JSON file. Session variables can also be collected from `KSQLDB_VAR_<NAME>`
//! environment entries. File loading and channel construction both run
//! [`KsqlDbConfig::validate`], so a config that reaches the reconciler always
//! has a usable host.

use crate::error::{KsqlError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

static VARIABLE_NAME: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid variable name regex"));

const ENV_VAR_PREFIX: &str = "KSQLDB_VAR_";

/// HTTP basic-auth credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuth {
  /// User name.
  pub username: String,
  /// Password.
  pub password: String,
}

impl fmt::Debug for BasicAuth {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BasicAuth")
      .field("username", &self.username)
      .field("password", &"<redacted>")
      .finish()
  }
}

/// Configuration for the command channel and the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KsqlDbConfig {
  /// Base URL of the ksqlDB server, e.g. `http://localhost:8088`.
  pub host: String,
  /// Optional basic-auth credentials.
  #[serde(default)]
  pub auth: Option<BasicAuth>,
  /// Session variables defined when the catalog is loaded.
  #[serde(default, alias = "variables")]
  pub session_variables: BTreeMap<String, String>,
  /// Value of `ksql.streams.auto.offset.reset` sent with every command.
  #[serde(default = "default_auto_offset_reset")]
  pub auto_offset_reset: String,
  /// Request timeout in seconds.
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  /// Whether `stop` removes the session variables again.
  #[serde(default)]
  pub undefine_on_stop: bool,
}

fn default_auto_offset_reset() -> String {
  "earliest".to_string()
}

fn default_timeout_secs() -> u64 {
  30
}

impl Default for KsqlDbConfig {
  fn default() -> Self {
    Self {
      host: "http://localhost:8088".to_string(),
      auth: None,
      session_variables: BTreeMap::new(),
      auto_offset_reset: default_auto_offset_reset(),
      timeout_secs: default_timeout_secs(),
      undefine_on_stop: false,
    }
  }
}

impl KsqlDbConfig {
  /// Creates a configuration for the given host with defaults elsewhere.
  pub fn new(host: impl Into<String>) -> Self {
    Self {
      host: host.into(),
      ..Self::default()
    }
  }

  /// Sets basic-auth credentials.
  #[must_use]
  pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
    self.auth = Some(BasicAuth {
      username: username.into(),
      password: password.into(),
    });
    self
  }

  /// Adds a session variable.
  #[must_use]
  pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.session_variables.insert(name.into(), value.into());
    self
  }

  /// Sets the auto offset reset policy.
  #[must_use]
  pub fn with_auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
    self.auto_offset_reset = policy.into();
    self
  }

  /// Sets the request timeout.
  #[must_use]
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout_secs = timeout.as_secs();
    self
  }

  /// Sets whether session variables are removed on stop.
  #[must_use]
  pub fn with_undefine_on_stop(mut self, undefine: bool) -> Self {
    self.undefine_on_stop = undefine;
    self
  }

  /// Returns the request timeout.
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }

  /// Returns the host without a trailing slash.
  pub fn base_url(&self) -> &str {
    self.host.trim_end_matches('/')
  }

  /// Checks that the configuration can be used to reach an engine.
  pub fn validate(&self) -> Result<()> {
    let host = self.host.trim();
    if host.is_empty() {
      return Err(KsqlError::Config("host must not be empty".to_string()));
    }
    let url = reqwest::Url::parse(host)
      .map_err(|e| KsqlError::Config(format!("invalid host '{}': {}", host, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
      return Err(KsqlError::Config(format!(
        "host '{}' must use http or https",
        host
      )));
    }

    if let Some(auth) = &self.auth
      && auth.username.is_empty()
    {
      return Err(KsqlError::Config(
        "auth username must not be empty".to_string(),
      ));
    }

    if let Some(name) = self
      .session_variables
      .keys()
      .find(|name| !VARIABLE_NAME.is_match(name))
    {
      return Err(KsqlError::Config(format!(
        "invalid session variable name '{}'",
        name
      )));
    }

    match self.auto_offset_reset.as_str() {
      "earliest" | "latest" | "none" => {}
      other => {
        return Err(KsqlError::Config(format!(
          "unknown auto offset reset policy '{}'",
          other
        )));
      }
    }

    if self.timeout_secs == 0 {
      return Err(KsqlError::Config("timeout must be positive".to_string()));
    }

    Ok(())
  }

  /// Loads and validates a JSON configuration file.
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
    let contents = std::fs::read_to_string(path)?;
    let config: Self = serde_json::from_str(&contents)?;
    config.validate()?;
    Ok(config)
  }

  /// Session variables declared as `KSQLDB_VAR_<NAME>` in the environment.
  pub fn session_variables_from_env() -> BTreeMap<String, String> {
    Self::session_variables_from(std::env::vars())
  }

  /// Collects `KSQLDB_VAR_<NAME>=<value>` pairs into session variables.
  /// Other keys are ignored.
  pub fn session_variables_from<I, K, V>(vars: I) -> BTreeMap<String, String>
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    vars
      .into_iter()
      .filter_map(|(key, value)| {
        let key = key.into();
        key
          .strip_prefix(ENV_VAR_PREFIX)
          .filter(|name| !name.is_empty())
          .map(|name| (name.to_string(), value.into()))
      })
      .collect()
  }
}

//! Applies a ksqlDB script to a cluster.
//!
//! ```text
//! KSQLDB_HOST=http://localhost:8088 KSQLDB_VAR_ENV=dev ksql-apply pipeline.ksql
//! ksql-apply --config ksqldb.json --auto-offset-reset latest pipeline.ksql
//! ```
//!
//! Every flag can also be set through its `KSQLDB_*` environment variable.
//! Flags override values from the `--config` file. Session variables come
//! from `KSQLDB_VAR_<NAME>` entries in the environment. Every accepted
//! command is printed to stdout as one JSON line. Logging goes to stderr and
//! is controlled by `RUST_LOG`.

use clap::Parser;
use ksqlweave::{KsqlDbConfig, KsqlDbReconciler, KsqlError, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Reconciles a ksqlDB script against a running cluster
#[derive(Parser, Debug)]
#[command(name = "ksql-apply")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Script of `;`-separated ksqlDB statements
  script: PathBuf,

  /// JSON configuration file
  #[arg(short, long, env = "KSQLDB_CONFIG")]
  config: Option<PathBuf>,

  /// ksqlDB server URL (e.g., http://localhost:8088)
  #[arg(long, env = "KSQLDB_HOST")]
  host: Option<String>,

  /// HTTP basic auth username
  #[arg(long, env = "KSQLDB_USERNAME", requires = "password")]
  username: Option<String>,

  /// HTTP basic auth password
  #[arg(long, env = "KSQLDB_PASSWORD", requires = "username", hide_env_values = true)]
  password: Option<String>,

  /// Offset reset policy sent with every command (earliest, latest, none)
  #[arg(long, env = "KSQLDB_AUTO_OFFSET_RESET")]
  auto_offset_reset: Option<String>,

  /// Request timeout in seconds
  #[arg(long, env = "KSQLDB_TIMEOUT_SECS")]
  timeout_secs: Option<u64>,

  /// Remove the session variables again when done
  #[arg(long, env = "KSQLDB_UNDEFINE_ON_STOP")]
  undefine_on_stop: bool,
}

impl Cli {
  /// Builds the validated configuration, layering flags over the config file.
  fn to_config(&self, variables: BTreeMap<String, String>) -> Result<KsqlDbConfig> {
    let mut config = match (&self.config, &self.host) {
      (Some(path), _) => KsqlDbConfig::from_file(path)?,
      (None, Some(host)) => KsqlDbConfig::new(host.clone()),
      (None, None) => {
        return Err(KsqlError::Config(
          "no ksqlDB host: pass --host, set KSQLDB_HOST or use --config".to_string(),
        ));
      }
    };

    if let Some(host) = &self.host {
      config.host = host.clone();
    }
    if let (Some(username), Some(password)) = (&self.username, &self.password) {
      config = config.with_auth(username.clone(), password.clone());
    }
    if let Some(policy) = &self.auto_offset_reset {
      config = config.with_auto_offset_reset(policy.to_lowercase());
    }
    if let Some(secs) = self.timeout_secs {
      config = config.with_timeout(Duration::from_secs(secs));
    }
    if self.undefine_on_stop {
      config = config.with_undefine_on_stop(true);
    }
    for (name, value) in variables {
      config = config.with_variable(name, value);
    }

    config.validate()?;
    Ok(config)
  }
}

#[tokio::main]
async fn main() {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  if let Err(e) = run(cli).await {
    error!(error = %e, "ksql-apply failed");
    std::process::exit(1);
  }
}

async fn run(cli: Cli) -> Result<()> {
  let config = cli.to_config(KsqlDbConfig::session_variables_from_env())?;
  info!(host = %config.host, script = %cli.script.display(), "Applying script");

  let script = tokio::fs::read_to_string(&cli.script).await?;
  let mut reconciler = KsqlDbReconciler::connect(config)?;

  let results = reconciler.execute_script(&script).await;
  let stopped = reconciler.stop().await;
  let results = results?;
  stopped?;

  let mut stdout = std::io::stdout().lock();
  for result in &results {
    serde_json::to_writer(&mut stdout, result)?;
    writeln!(stdout)?;
  }
  info!(commands = results.len(), "Script applied");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::CommandFactory;
  use std::io::Write;

  #[test]
  fn test_cli_definition() {
    Cli::command().debug_assert();
  }

  #[test]
  fn test_flags_build_config() {
    let cli = Cli::try_parse_from([
      "ksql-apply",
      "--host",
      "http://ksqldb:8088",
      "--username",
      "user",
      "--password",
      "pw",
      "--auto-offset-reset",
      "LATEST",
      "--timeout-secs",
      "5",
      "--undefine-on-stop",
      "pipeline.ksql",
    ])
    .unwrap();
    let variables = BTreeMap::from([("env".to_string(), "dev".to_string())]);

    let config = cli.to_config(variables).unwrap();

    assert_eq!(cli.script, PathBuf::from("pipeline.ksql"));
    assert_eq!(config.host, "http://ksqldb:8088");
    assert_eq!(config.auth.unwrap().username, "user");
    assert_eq!(config.auto_offset_reset, "latest");
    assert_eq!(config.timeout_secs, 5);
    assert!(config.undefine_on_stop);
    assert_eq!(config.session_variables.get("env").map(String::as_str), Some("dev"));
  }

  #[test]
  fn test_username_requires_password() {
    let result = Cli::try_parse_from([
      "ksql-apply",
      "--host",
      "http://ksqldb:8088",
      "--username",
      "user",
      "pipeline.ksql",
    ]);
    assert!(result.is_err());
  }

  #[test]
  fn test_script_is_required() {
    assert!(Cli::try_parse_from(["ksql-apply", "--host", "http://ksqldb:8088"]).is_err());
  }

  #[test]
  fn test_flags_override_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
      file,
      r#"{{"host": "http://from-file:8088", "autoOffsetReset": "latest", "variables": {{"env": "qa"}}}}"#
    )
    .unwrap();
    let path = file.path().to_string_lossy().to_string();

    let cli = Cli::try_parse_from([
      "ksql-apply",
      "--config",
      path.as_str(),
      "--host",
      "http://override:8088",
      "pipeline.ksql",
    ])
    .unwrap();
    let config = cli.to_config(BTreeMap::new()).unwrap();

    assert_eq!(config.host, "http://override:8088");
    assert_eq!(config.auto_offset_reset, "latest");
    assert_eq!(config.session_variables.get("env").map(String::as_str), Some("qa"));
  }

  #[test]
  fn test_missing_host_is_a_config_error() {
    let cli = Cli {
      script: PathBuf::from("pipeline.ksql"),
      config: None,
      host: None,
      username: None,
      password: None,
      auto_offset_reset: None,
      timeout_secs: None,
      undefine_on_stop: false,
    };
    assert!(matches!(cli.to_config(BTreeMap::new()), Err(KsqlError::Config(_))));
  }
}

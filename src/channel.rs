//! # Command Channel
//!
//! Sends administrative statements to ksqlDB's `/ksql` endpoint.
//!
//! Each call is a single POST carrying the statement, the streams properties
//! and, when the caller has one, the sequence number of the last command it
//! saw. The engine waits for that command to be applied before running the
//! new one, which is what keeps dependent statements in submission order.
//!
//! The channel never tracks sequence numbers itself. The reconciler reads them
//! from the returned records and passes the latest one back in.

use crate::config::KsqlDbConfig;
use crate::error::{KsqlError, Result};
use crate::types::RequestProperties;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, trace};

/// Media type of the versioned ksqlDB REST API.
pub const KSQL_MEDIA_TYPE: &str = "application/vnd.ksql.v1+json";

/// Path of the statement endpoint.
pub const KSQL_ENDPOINT: &str = "ksql";

/// Streams property controlling where new queries start reading.
pub const AUTO_OFFSET_RESET_PROPERTY: &str = "ksql.streams.auto.offset.reset";

/// A transport able to submit one statement to the engine.
#[async_trait]
pub trait CommandChannel: Send + Sync {
  /// Submits `statement` and returns the decoded response records.
  ///
  /// `sequence` is attached as `commandSequenceNumber` when present.
  async fn send(
    &self,
    statement: &str,
    properties: Option<&RequestProperties>,
    sequence: Option<i64>,
  ) -> Result<Vec<Value>>;
}

/// JSON body of a `/ksql` request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KsqlRequest<'a> {
  /// Statement text.
  pub ksql: &'a str,
  /// Last command sequence number seen by the caller.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub command_sequence_number: Option<i64>,
  /// Streams properties for the statement.
  pub streams_properties: Map<String, Value>,
}

/// Builds the request body, merging `properties` over the defaults.
pub fn build_request<'a>(
  statement: &'a str,
  auto_offset_reset: &str,
  properties: Option<&RequestProperties>,
  sequence: Option<i64>,
) -> KsqlRequest<'a> {
  let mut streams_properties = Map::new();
  streams_properties.insert(
    AUTO_OFFSET_RESET_PROPERTY.to_string(),
    Value::String(auto_offset_reset.to_string()),
  );
  if let Some(properties) = properties {
    for (key, value) in &properties.streams_properties {
      streams_properties.insert(key.clone(), value.clone());
    }
  }

  KsqlRequest {
    ksql: statement,
    command_sequence_number: sequence,
    streams_properties,
  }
}

/// [`CommandChannel`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpCommandChannel {
  client: reqwest::Client,
  endpoint: String,
  config: KsqlDbConfig,
}

impl HttpCommandChannel {
  /// Creates a channel for the configured host.
  pub fn new(config: KsqlDbConfig) -> Result<Self> {
    config.validate()?;
    let client = reqwest::Client::builder()
      .timeout(config.timeout())
      .build()?;
    Ok(Self::with_client(client, config))
  }

  /// Creates a channel that reuses an existing client.
  pub fn with_client(client: reqwest::Client, config: KsqlDbConfig) -> Self {
    let endpoint = format!("{}/{}", config.base_url(), KSQL_ENDPOINT);
    Self {
      client,
      endpoint,
      config,
    }
  }

  /// Returns the full URL requests are posted to.
  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }

  fn headers(&self, properties: Option<&RequestProperties>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(KSQL_MEDIA_TYPE));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(KSQL_MEDIA_TYPE));
    if let Some(properties) = properties {
      for (name, value) in &properties.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
          .map_err(|e| KsqlError::Config(format!("invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
          .map_err(|e| KsqlError::Config(format!("invalid header value: {}", e)))?;
        headers.insert(name, value);
      }
    }
    Ok(headers)
  }
}

#[async_trait]
impl CommandChannel for HttpCommandChannel {
  async fn send(
    &self,
    statement: &str,
    properties: Option<&RequestProperties>,
    sequence: Option<i64>,
  ) -> Result<Vec<Value>> {
    debug!(endpoint = %self.endpoint, statement, "ksqlDB API call");

    let body = build_request(
      statement,
      &self.config.auto_offset_reset,
      properties,
      sequence,
    );
    let mut request = self
      .client
      .post(&self.endpoint)
      .headers(self.headers(properties)?)
      .body(serde_json::to_vec(&body)?);
    if let Some(auth) = &self.config.auth {
      request = request.basic_auth(&auth.username, Some(&auth.password));
    }

    let response = request.send().await.map_err(|e| {
      error!(error = %e, "ksqlDB API call failed");
      KsqlError::Transport(e)
    })?;
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
      let message = error_message(&text);
      error!(status = status.as_u16(), reason = %message, "ksqlDB API call failed");
      return Err(KsqlError::api(Some(status.as_u16()), message));
    }

    let records = match serde_json::from_str::<Value>(&text) {
      Ok(Value::Array(records)) => records,
      _ => {
        error!(status = status.as_u16(), body = %text, "Malformed ksqlDB response");
        return Err(KsqlError::api(
          Some(status.as_u16()),
          format!("malformed response body: {}", text),
        ));
      }
    };

    trace!(?records, "ksqlDB API response");
    Ok(records)
  }
}

/// Extracts the engine's error message from a failed response body.
fn error_message(body: &str) -> String {
  serde_json::from_str::<Value>(body)
    .ok()
    .and_then(|value| {
      value
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
    })
    .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_request_defaults() {
    let request = build_request("SHOW STREAMS;", "earliest", None, None);
    let body = serde_json::to_value(&request).unwrap();
    assert_eq!(
      body,
      json!({
        "ksql": "SHOW STREAMS;",
        "streamsProperties": {"ksql.streams.auto.offset.reset": "earliest"}
      })
    );
  }

  #[test]
  fn test_request_merges_properties_and_sequence() {
    let properties = RequestProperties::new()
      .with_streams_property(AUTO_OFFSET_RESET_PROPERTY, "latest")
      .with_streams_property("ksql.query.pull.table.scan.enabled", true);
    let request = build_request("SELECT 1;", "earliest", Some(&properties), Some(7));
    let body = serde_json::to_value(&request).unwrap();

    assert_eq!(body["commandSequenceNumber"], json!(7));
    assert_eq!(
      body["streamsProperties"][AUTO_OFFSET_RESET_PROPERTY],
      json!("latest")
    );
    assert_eq!(
      body["streamsProperties"]["ksql.query.pull.table.scan.enabled"],
      json!(true)
    );
  }

  #[test]
  fn test_error_message() {
    assert_eq!(
      error_message(r#"{"@type":"statement_error","error_code":40001,"message":"boom"}"#),
      "boom"
    );
    assert_eq!(error_message("  Unauthorized \n"), "Unauthorized");
  }

  #[test]
  fn test_endpoint_trims_trailing_slash() {
    let channel = HttpCommandChannel::new(KsqlDbConfig::new("http://localhost:8088/")).unwrap();
    assert_eq!(channel.endpoint(), "http://localhost:8088/ksql");
  }
}

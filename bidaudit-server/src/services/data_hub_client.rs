//! Data hub client
//!
//! Fetches the authoritative audit rule list from
//! `GET {host}/api/v1/audit-rules/all` with a bearer token. Host and token
//! are checked before any request is made. Transient failures (connect or
//! timeout errors, 5xx, 429) are retried by the shared [`RetryPolicy`].

use bidaudit_common::config::DataHubConfig;
use bidaudit_common::retry::RetryPolicy;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

const RULES_PATH: &str = "/api/v1/audit-rules/all";

/// Data hub client errors
#[derive(Debug, Error)]
pub enum DataHubError {
    #[error("Data hub not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {message}")]
    Network { message: String, transient: bool },

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl DataHubError {
    /// Whether a retry could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            DataHubError::Network { transient, .. } => *transient,
            DataHubError::Api(status, _) => *status == 429 || (500..600).contains(status),
            DataHubError::NotConfigured(_) | DataHubError::Parse(_) => false,
        }
    }
}

impl From<reqwest::Error> for DataHubError {
    fn from(err: reqwest::Error) -> Self {
        DataHubError::Network {
            transient: err.is_connect() || err.is_timeout(),
            message: err.to_string(),
        }
    }
}

pub struct DataHubClient {
    http_client: reqwest::Client,
    host: String,
    token: String,
    retry: RetryPolicy,
}

impl DataHubClient {
    /// Build a client; fails when host or token is missing
    pub fn new(config: &DataHubConfig) -> Result<Self, DataHubError> {
        let host = config
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DataHubError::NotConfigured("DATA_HUB_HOST is not set".to_string()))?;
        let token = config
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| DataHubError::NotConfigured("DATA_HUB_TOKEN is not set".to_string()))?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(DataHubError::from)?;

        Ok(Self {
            http_client,
            host: host.trim_end_matches('/').to_string(),
            token: token.to_string(),
            retry: RetryPolicy::linear(
                config.max_retries,
                Duration::from_millis(config.retry_backoff_ms),
            ),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch every rule as raw JSON objects
    pub async fn fetch_rules(&self) -> Result<Vec<Value>, DataHubError> {
        let url = format!("{}{}", self.host, RULES_PATH);

        let body = self
            .retry
            .run(
                "data_hub.fetch_rules",
                |attempt| {
                    let url = url.clone();
                    async move {
                        tracing::debug!(attempt, url = %url, "Fetching audit rules from data hub");
                        self.get_json(&url).await
                    }
                },
                DataHubError::is_transient,
            )
            .await?;

        let rules = rule_list(body)?;
        tracing::info!(count = rules.len(), "Fetched audit rules from data hub");
        Ok(rules)
    }

    async fn get_json(&self, url: &str) -> Result<Value, DataHubError> {
        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DataHubError::Api(status.as_u16(), text));
        }

        response
            .json()
            .await
            .map_err(|e| DataHubError::Parse(e.to_string()))
    }
}

/// Locate the rule array: bare array, `data`, or `data.{list|records|rows|items}`
fn rule_list(body: Value) -> Result<Vec<Value>, DataHubError> {
    let data = match body {
        Value::Object(mut map) => match map.remove("data") {
            Some(data) => data,
            None => Value::Object(map),
        },
        other => other,
    };

    match data {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => ["list", "records", "rows", "items"]
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .ok_or_else(|| DataHubError::Parse("Response has no rule list".to_string())),
        other => Err(DataHubError::Parse(format!("Unexpected rule list shape: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_configuration_rejected() {
        let config = DataHubConfig::default();
        assert!(matches!(DataHubClient::new(&config), Err(DataHubError::NotConfigured(_))));

        let config = DataHubConfig {
            host: Some("http://hub".into()),
            token: Some("  ".into()),
            ..Default::default()
        };
        let err = DataHubClient::new(&config).err().unwrap();
        assert!(err.to_string().contains("DATA_HUB_TOKEN"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(DataHubError::Api(503, String::new()).is_transient());
        assert!(DataHubError::Api(429, String::new()).is_transient());
        assert!(!DataHubError::Api(401, String::new()).is_transient());
        assert!(!DataHubError::Parse("x".into()).is_transient());
        assert!(DataHubError::Network { message: "refused".into(), transient: true }.is_transient());
    }

    #[test]
    fn test_rule_list_shapes() {
        assert_eq!(rule_list(json!([{"id": 1}])).unwrap().len(), 1);
        assert_eq!(rule_list(json!({"data": [{"id": 1}, {"id": 2}]})).unwrap().len(), 2);
        assert_eq!(rule_list(json!({"code": 0, "data": {"records": [{"id": 1}]}})).unwrap().len(), 1);
        assert!(rule_list(json!({"data": {"total": 0}})).is_err());
        assert!(rule_list(json!("nope")).is_err());
    }
}

//! Post-commit webhook fan-out.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::WebhookConfig;
use crate::error::{AppError, AppResult};

/// Body POSTed to every webhook target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub visit_id: String,
    pub trigger_time: DateTime<Utc>,
}

/// Outcome for one target: `status` on any HTTP response, `error` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookResult {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookResult {
    /// Whether the target answered with a 2xx status.
    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(s) if (200..300).contains(&s))
    }
}

/// Aggregated trigger outcome, one result per configured URL in configured order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookTriggerResponse {
    pub status: String,
    pub visit_id: String,
    pub results: Vec<WebhookResult>,
}

impl WebhookTriggerResponse {
    /// Number of targets that answered 2xx.
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }
}

/// POSTs visit events to the configured URLs, each once with its own timeout.
#[derive(Clone)]
pub struct WebhookDispatcher {
    client: Client,
    urls: Vec<String>,
    timeout: Duration,
    max_concurrency: usize,
}

impl WebhookDispatcher {
    /// Create a dispatcher from configuration.
    pub fn new(config: &WebhookConfig) -> AppResult<Self> {
        let client = Client::builder().build().map_err(|e| AppError::Config {
            message: format!("Failed to build webhook client: {}", e),
        })?;

        Ok(Self {
            client,
            urls: config.urls.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            max_concurrency: config.max_concurrency.max(1),
        })
    }

    /// Configured target URLs.
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Notify every target that the visit's report was committed.
    ///
    /// Never fails: each target yields a result, and a slow or broken target
    /// does not delay the others beyond its own timeout.
    pub async fn trigger(&self, visit_id: &str) -> WebhookTriggerResponse {
        let start = Instant::now();
        let payload = WebhookPayload {
            visit_id: visit_id.to_string(),
            trigger_time: Utc::now(),
        };

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for (index, url) in self.urls.iter().enumerate() {
            let client = self.client.clone();
            let semaphore = Arc::clone(&semaphore);
            let payload = payload.clone();
            let url = url.clone();
            let timeout = self.timeout;

            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => post_once(&client, &url, &payload, timeout).await,
                    Err(_) => WebhookResult {
                        url,
                        status: None,
                        error: Some("webhook permit unavailable".to_string()),
                    },
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<WebhookResult>> = vec![None; self.urls.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => warn!(error = %e, "Webhook task aborted"),
            }
        }

        let results: Vec<WebhookResult> = slots
            .into_iter()
            .zip(&self.urls)
            .map(|(slot, url)| {
                slot.unwrap_or_else(|| WebhookResult {
                    url: url.clone(),
                    status: None,
                    error: Some("webhook task aborted".to_string()),
                })
            })
            .collect();

        let response = WebhookTriggerResponse {
            status: "triggered".to_string(),
            visit_id: visit_id.to_string(),
            results,
        };

        info!(
            visit_id = %visit_id,
            targets = response.results.len(),
            succeeded = response.succeeded(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Webhooks triggered"
        );

        response
    }
}

async fn post_once(client: &Client, url: &str, payload: &WebhookPayload, timeout: Duration) -> WebhookResult {
    let sent = client.post(url).timeout(timeout).json(payload).send().await;

    match sent {
        Ok(response) => {
            let status = response.status();
            if status.is_success() {
                debug!(url = %url, status = status.as_u16(), "Webhook delivered");
            } else {
                warn!(url = %url, status = status.as_u16(), "Webhook answered with failure status");
            }
            WebhookResult {
                url: url.to_string(),
                status: Some(status.as_u16()),
                error: None,
            }
        }
        Err(e) => {
            let message = if e.is_timeout() {
                format!("timed out after {}ms", timeout.as_millis())
            } else {
                e.to_string()
            };
            warn!(url = %url, error = %message, "Webhook delivery failed");
            WebhookResult {
                url: url.to_string(),
                status: None,
                error: Some(message),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_success_is_2xx_only() {
        let ok = WebhookResult {
            url: "http://a".into(),
            status: Some(204),
            error: None,
        };
        let redirect = WebhookResult {
            status: Some(302),
            ..ok.clone()
        };
        let failed = WebhookResult {
            status: None,
            error: Some("refused".into()),
            ..ok.clone()
        };

        assert!(ok.is_success());
        assert!(!redirect.is_success());
        assert!(!failed.is_success());
    }

    #[test]
    fn test_result_serializes_status_or_error() {
        let failed = WebhookResult {
            url: "http://a".into(),
            status: None,
            error: Some("timed out after 10ms".into()),
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert!(json.get("status").is_none());
        assert_eq!(json["error"], "timed out after 10ms");
    }

    #[tokio::test]
    async fn test_no_targets_yields_empty_results() {
        let dispatcher = WebhookDispatcher::new(&WebhookConfig::default()).unwrap();
        let response = dispatcher.trigger("visit-1").await;

        assert_eq!(response.status, "triggered");
        assert!(response.results.is_empty());
    }
}

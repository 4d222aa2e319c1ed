use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{GeneratedContent, GenerationRequest, Message, PipeRequest, PipeResponse};
use super::ContentGenerator;
use crate::config::{backoff_delay_ms, GeneratorConfig, RequestConfig};
use crate::error::{GeneratorError, GeneratorResult};
use crate::prompts::REPORT_GENERATION_PROMPT;

/// Report generator backed by a Langbase pipe.
#[derive(Clone)]
pub struct LangbaseGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    pipe: String,
    request_config: RequestConfig,
}

impl LangbaseGenerator {
    /// Create a new generator client
    pub fn new(config: &GeneratorConfig, request_config: RequestConfig) -> GeneratorResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(GeneratorError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            pipe: config.pipe.clone(),
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run the pipe, retrying with exponential backoff.
    async fn call_pipe(&self, request: &PipeRequest) -> GeneratorResult<PipeResponse> {
        let url = format!("{}/v1/pipes/run", self.base_url);

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(backoff_delay_ms(
                    self.request_config.retry_delay_ms,
                    retries,
                ));
                warn!(
                    pipe = %request.name,
                    retry = retries,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying generator request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();
            match self.execute_request(&url, request).await {
                Ok(response) => {
                    debug!(
                        pipe = %request.name,
                        latency_ms = start.elapsed().as_millis() as u64,
                        "Generator pipe call succeeded"
                    );
                    return Ok(response);
                }
                // Client errors other than rate limiting will not improve on retry.
                Err(GeneratorError::Api { status, message }) if (400..500).contains(&status) && status != 429 => {
                    error!(pipe = %request.name, status, error = %message, "Generator rejected request");
                    return Err(GeneratorError::Api { status, message });
                }
                Err(e) => {
                    error!(
                        pipe = %request.name,
                        error = %e,
                        latency_ms = start.elapsed().as_millis() as u64,
                        retry = retries,
                        "Generator pipe call failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(GeneratorError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    async fn execute_request(&self, url: &str, request: &PipeRequest) -> GeneratorResult<PipeResponse> {
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GeneratorError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    GeneratorError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let pipe_response: PipeResponse =
            response
                .json()
                .await
                .map_err(|e| GeneratorError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })?;

        if !pipe_response.success {
            return Err(GeneratorError::InvalidResponse {
                message: "Pipe reported an unsuccessful run".to_string(),
            });
        }

        Ok(pipe_response)
    }
}

#[async_trait]
impl ContentGenerator for LangbaseGenerator {
    async fn generate(&self, request: &GenerationRequest) -> GeneratorResult<GeneratedContent> {
        let start = Instant::now();
        let messages = vec![
            Message::system(REPORT_GENERATION_PROMPT),
            Message::user(request.to_prompt_input()?),
        ];

        let response = self.call_pipe(&PipeRequest::new(&self.pipe, messages)).await?;
        let content = GeneratedContent::from_completion(&response.completion)?;

        info!(
            visit_id = %request.visit.id,
            keywords = content.keywords.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Report content generated"
        );

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_creation_trims_base_url() {
        let config = GeneratorConfig {
            api_key: "test_key".to_string(),
            base_url: "https://api.langbase.com/".to_string(),
            pipe: "care-report-v1".to_string(),
        };

        let generator = LangbaseGenerator::new(&config, RequestConfig::default()).unwrap();
        assert_eq!(generator.base_url(), "https://api.langbase.com");
    }
}

//! The LLM provider contract (spec §1, §6, §9): a single `generate` call
//! returning `{text, usage, cost, latency}`. The engine never sees provider
//! SDK types.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::warn;

/// Parameters for one generation call.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub prompt: String,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Token usage for one call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

/// Result of one generation call.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub model: String,
}

#[derive(Debug, thiserror::Error, Clone)]
pub enum LlmError {
    #[error("rate limited")]
    RateLimited,
    #[error("transient error: {0}")]
    Transient(String),
    #[error("terminal error: {0}")]
    Terminal(String),
}

impl LlmError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Transient(_))
    }
}

/// The abstract LLM capability the engine consumes. Providers never leak
/// their SDK types across this boundary (spec §9).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
}

/// Retries `generate` with exponential backoff (base 1s, factor 2, max 5
/// attempts — spec §5) on retryable errors only.
pub async fn generate_with_backoff(
    provider: &dyn LlmProvider,
    request: LlmRequest,
) -> Result<LlmResponse, LlmError> {
    const MAX_ATTEMPTS: u32 = 5;
    const BASE_DELAY: Duration = Duration::from_secs(1);

    let mut attempt = 0;
    loop {
        attempt += 1;
        match provider.generate(request.clone()).await {
            Ok(resp) => return Ok(resp),
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                let delay = BASE_DELAY * 2u32.pow(attempt - 1);
                warn!(attempt, ?delay, error = %e, "retrying LLM call after transient failure");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// `reqwest`-backed provider for a generic HTTP completion endpoint.
pub struct HttpLlmProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpLlmProvider {
    #[must_use]
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[derive(serde::Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

#[derive(serde::Deserialize)]
struct CompletionResponse {
    text: String,
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cost_usd: f64,
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let started = Instant::now();
        let body = CompletionRequest {
            model: &request.model,
            prompt: &request.prompt,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transient(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited);
        }
        if resp.status().is_server_error() {
            return Err(LlmError::Transient(resp.status().to_string()));
        }
        if !resp.status().is_success() {
            return Err(LlmError::Terminal(resp.status().to_string()));
        }

        let parsed: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Terminal(e.to_string()))?;

        Ok(LlmResponse {
            text: parsed.text,
            usage: TokenUsage {
                input: parsed.input_tokens,
                output: parsed.output_tokens,
            },
            cost_usd: parsed.cost_usd,
            latency_ms: started.elapsed().as_millis() as u64,
            model: request.model,
        })
    }
}

/// Deterministic, scripted provider for tests: returns queued responses in
/// order, or a `Terminal` error once exhausted.
pub struct ScriptedLlmProvider {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<String, LlmError>>>,
}

impl ScriptedLlmProvider {
    #[must_use]
    pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlmProvider {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::Terminal("script exhausted".to_string()))?;

        next.map(|text| LlmResponse {
            text,
            usage: TokenUsage::default(),
            cost_usd: 0.0,
            latency_ms: 1,
            model: request.model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn backoff_retries_transient_then_succeeds() {
        let provider = ScriptedLlmProvider::new(vec![
            Err(LlmError::RateLimited),
            Ok("fixed".to_string()),
        ]);
        let request = LlmRequest {
            prompt: "p".into(),
            model: "m".into(),
            max_tokens: None,
            temperature: None,
        };
        let resp = generate_with_backoff(&provider, request).await.unwrap();
        assert_eq!(resp.text, "fixed");
    }

    #[tokio::test]
    async fn backoff_gives_up_on_terminal_error() {
        let provider = ScriptedLlmProvider::new(vec![Err(LlmError::Terminal("nope".into()))]);
        let request = LlmRequest {
            prompt: "p".into(),
            model: "m".into(),
            max_tokens: None,
            temperature: None,
        };
        let result = generate_with_backoff(&provider, request).await;
        assert!(result.is_err());
    }
}

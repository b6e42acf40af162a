//! Transport call unit — one HTTP request to one provider.
//!
//! Builds nothing and retries nothing: the caller hands in a finished
//! `ChatCompletionRequest`, this layer posts it with a per-call deadline and
//! maps every outcome onto [`InferenceError`]. Fallback is the executor's job.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use super::config::ProviderConfig;
use super::errors::{body_prefix, InferenceError};
use super::types::{ChatCompletionRequest, ChatCompletionResponse};

/// TCP connection timeout, independent of the per-call budget.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything one call needs.
#[derive(Debug, Clone, Copy)]
pub struct TransportCall<'a> {
    pub provider_name: &'a str,
    pub provider: &'a ProviderConfig,
    pub model: &'a str,
    pub credential: &'a str,
    pub body: &'a ChatCompletionRequest,
    pub timeout: Duration,
}

/// Issues a single chat completion call.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn call(&self, call: TransportCall<'_>) -> Result<ChatCompletionResponse, InferenceError>;
}

// ─── HttpTransport ───────────────────────────────────────────────────────────

/// `reqwest`-backed transport speaking the OpenAI Chat Completions API.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: HttpClient,
}

impl HttpTransport {
    pub fn new() -> Result<Self, InferenceError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ConfigError {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn call(&self, call: TransportCall<'_>) -> Result<ChatCompletionResponse, InferenceError> {
        let url = format!(
            "{}/chat/completions",
            call.provider.base_url.trim_end_matches('/')
        );
        let started = Instant::now();

        tracing::debug!(
            provider = call.provider_name,
            model = call.model,
            message_count = call.body.messages.len(),
            tool_count = call.body.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            timeout_ms = call.timeout.as_millis() as u64,
            "provider request"
        );

        let exchange = async {
            let response = self
                .http
                .post(&url)
                .bearer_auth(call.credential)
                .json(call.body)
                .send()
                .await
                .map_err(|e| map_send_error(&call, e, started))?;

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| InferenceError::ConnectionFailed {
                    provider: call.provider_name.to_string(),
                    model: call.model.to_string(),
                    reason: format!("failed to read response body: {e}"),
                })?;
            Ok::<_, InferenceError>((status, text))
        };

        // Dropping `exchange` on expiry aborts only this call.
        let (status, text) = match tokio::time::timeout(call.timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(InferenceError::Timeout {
                    provider: call.provider_name.to_string(),
                    model: call.model.to_string(),
                    duration_ms: call.timeout.as_millis() as u64,
                })
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;

        if !status.is_success() {
            return Err(InferenceError::UpstreamError {
                provider: call.provider_name.to_string(),
                model: call.model.to_string(),
                status: status.as_u16(),
                body: body_prefix(&text),
            });
        }

        let parsed = serde_json::from_str::<ChatCompletionResponse>(&text).map_err(|e| {
            InferenceError::MalformedResponse {
                provider: call.provider_name.to_string(),
                model: call.model.to_string(),
                reason: format!("{e}; body: {}", body_prefix(&text)),
            }
        })?;

        tracing::debug!(
            provider = call.provider_name,
            model = call.model,
            elapsed_ms,
            "provider response"
        );

        Ok(parsed)
    }
}

fn map_send_error(call: &TransportCall<'_>, e: reqwest::Error, started: Instant) -> InferenceError {
    if e.is_builder() {
        InferenceError::InvalidRequest {
            model: call.model.to_string(),
            reason: e.to_string(),
        }
    } else if e.is_timeout() {
        InferenceError::Timeout {
            provider: call.provider_name.to_string(),
            model: call.model.to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
        }
    } else {
        InferenceError::ConnectionFailed {
            provider: call.provider_name.to_string(),
            model: call.model.to_string(),
            reason: e.to_string(),
        }
    }
}

// ─── Test double ─────────────────────────────────────────────────────────────


// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::types::{ChatMessage, CompletionOptions};

    fn request() -> ChatCompletionRequest {
        CompletionOptions {
            tools: None,
            tool_choice: None,
            max_tokens: 16,
            temperature: 0.0,
            response_format: None,
            timeout: Duration::from_millis(200),
        }
        .to_request("m", &[ChatMessage::user("hi")])
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_retriable_failure() {
        let transport = HttpTransport::new().unwrap();
        // Port 9 (discard) on localhost is closed in test environments.
        let provider = ProviderConfig {
            base_url: "http://127.0.0.1:9/v1".into(),
        };
        let body = request();
        let err = transport
            .call(TransportCall {
                provider_name: "local",
                provider: &provider,
                model: "m",
                credential: "k",
                body: &body,
                timeout: Duration::from_millis(500),
            })
            .await
            .unwrap_err();

        assert!(err.is_retriable(), "unexpected error: {err}");
        assert!(matches!(
            err,
            InferenceError::ConnectionFailed { .. } | InferenceError::Timeout { .. }
        ));
    }

    #[tokio::test]
    async fn test_scripted_transport_records_calls() {
        use testing::{text_response, ScriptedTransport, Step};

        let transport = ScriptedTransport::new(vec![Step::Reply(text_response("hello"))]);
        let provider = ProviderConfig {
            base_url: "http://unused".into(),
        };
        let body = request();
        let resp = transport
            .call(TransportCall {
                provider_name: "p",
                provider: &provider,
                model: "m",
                credential: "k",
                body: &body,
                timeout: Duration::from_secs(1),
            })
            .await
            .unwrap();

        assert_eq!(resp.text(), "hello");
        assert_eq!(transport.called_models(), vec!["m"]);
    }
}

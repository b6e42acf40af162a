//! Fallback executor — walks a tier until one candidate answers.
//!
//! Candidates are tried strictly in order, one at a time. The first success
//! wins. A candidate that fails at runtime is remembered in the request's
//! [`FailedModelSet`] so later rounds of the same request skip it instead of
//! paying its timeout again. Configuration gaps (no credential, no endpoint)
//! are reported but not remembered.

use std::collections::HashSet;
use std::sync::Arc;

use super::config::{AgentConfig, ModelCandidate};
use super::credentials::CredentialSource;
use super::errors::InferenceError;
use super::transport::{ChatTransport, TransportCall};
use super::types::{ChatCompletionResponse, ChatMessage, CompletionOptions};

// ─── FailedModelSet ──────────────────────────────────────────────────────────

/// Model ids that already failed during the current request.
///
/// Grow-only: there is no way to remove an entry. One instance per request.
#[derive(Debug, Default)]
pub struct FailedModelSet {
    models: HashSet<String>,
}

impl FailedModelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the model was not already present.
    pub fn insert(&mut self, model: &str) -> bool {
        self.models.insert(model.to_string())
    }

    pub fn contains(&self, model: &str) -> bool {
        self.models.contains(model)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(String::as_str)
    }
}

// ─── FallbackExecutor ────────────────────────────────────────────────────────

/// Successful run: the response and who produced it.
#[derive(Debug, Clone)]
pub struct FallbackOutcome {
    pub response: ChatCompletionResponse,
    pub provider: String,
    pub model: String,
}

/// Drives a tier of candidates through a [`ChatTransport`].
#[derive(Clone)]
pub struct FallbackExecutor {
    config: Arc<AgentConfig>,
    transport: Arc<dyn ChatTransport>,
    credentials: Arc<dyn CredentialSource>,
}

impl FallbackExecutor {
    pub fn new(
        config: Arc<AgentConfig>,
        transport: Arc<dyn ChatTransport>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            config,
            transport,
            credentials,
        }
    }

    /// Try `tier` in order until a candidate succeeds.
    ///
    /// Errors with `AllCandidatesExhausted` when nothing succeeded, or with
    /// the original error when it is not retriable (a bug on our side).
    pub async fn run(
        &self,
        tier: &[ModelCandidate],
        messages: &[ChatMessage],
        options: &CompletionOptions,
        failed: &mut FailedModelSet,
    ) -> Result<FallbackOutcome, InferenceError> {
        let mut errors: Vec<String> = Vec::new();

        for candidate in tier {
            if failed.contains(&candidate.model) {
                tracing::debug!(model = %candidate.model, "skipping model that already failed");
                errors.push(format!("skipped (already failed): {}", candidate.model));
                continue;
            }

            let credential = match self.resolve_credential(candidate) {
                Ok(credential) => credential,
                Err(gap) => {
                    tracing::warn!(
                        provider = %candidate.provider,
                        model = %candidate.model,
                        error = %gap,
                        "configuration gap, trying next candidate"
                    );
                    errors.push(gap.to_string());
                    continue;
                }
            };

            let Some(provider) = self.config.providers.get(&candidate.provider) else {
                let gap = InferenceError::MissingCredential {
                    model: candidate.model.clone(),
                    reason: format!("provider '{}' has no endpoint", candidate.provider),
                };
                tracing::warn!(model = %candidate.model, error = %gap, "configuration gap, trying next candidate");
                errors.push(gap.to_string());
                continue;
            };

            let body = options.to_request(&candidate.model, messages);
            let result = self
                .transport
                .call(TransportCall {
                    provider_name: &candidate.provider,
                    provider,
                    model: &candidate.model,
                    credential: &credential,
                    body: &body,
                    timeout: options.timeout,
                })
                .await;

            match result {
                Ok(response) => {
                    tracing::info!(
                        provider = %candidate.provider,
                        model = %candidate.model,
                        prior_failures = errors.len(),
                        "model responded"
                    );
                    return Ok(FallbackOutcome {
                        response,
                        provider: candidate.provider.clone(),
                        model: candidate.model.clone(),
                    });
                }
                Err(e) if e.is_retriable() => {
                    tracing::warn!(
                        provider = %candidate.provider,
                        model = %candidate.model,
                        error = %e,
                        "model failed, trying next candidate"
                    );
                    if !e.is_configuration_gap() {
                        failed.insert(&candidate.model);
                    }
                    errors.push(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        Err(InferenceError::AllCandidatesExhausted { errors })
    }

    fn resolve_credential(&self, candidate: &ModelCandidate) -> Result<String, InferenceError> {
        self.credentials
            .resolve(&candidate.credential_key)
            .ok_or_else(|| InferenceError::MissingCredential {
                model: candidate.model.clone(),
                reason: format!("{} is not set", candidate.credential_key),
            })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::inference::credentials::StaticCredentials;
    use crate::inference::transport::testing::{text_response, ScriptedTransport, Step};

    fn tier() -> Vec<ModelCandidate> {
        vec![
            ModelCandidate::new("groq", "model-a", 100, "GROQ_API_KEY"),
            ModelCandidate::new("cerebras", "model-b", 200, "CEREBRAS_API_KEY"),
            ModelCandidate::new("openrouter", "model-c", 300, "OPENROUTER_API_KEY"),
        ]
    }

    fn all_credentials() -> Arc<StaticCredentials> {
        Arc::new(StaticCredentials::new([
            ("GROQ_API_KEY", "k1"),
            ("CEREBRAS_API_KEY", "k2"),
            ("OPENROUTER_API_KEY", "k3"),
        ]))
    }

    fn options() -> CompletionOptions {
        CompletionOptions {
            tools: None,
            tool_choice: None,
            max_tokens: 64,
            temperature: 0.0,
            response_format: None,
            timeout: Duration::from_millis(12_000),
        }
    }

    fn executor(
        transport: Arc<ScriptedTransport>,
        credentials: Arc<StaticCredentials>,
    ) -> FallbackExecutor {
        FallbackExecutor::new(Arc::new(AgentConfig::default()), transport, credentials)
    }

    #[tokio::test]
    async fn test_first_success_stops_iteration() {
        let transport = Arc::new(ScriptedTransport::new(vec![Step::Reply(text_response("hi"))]));
        let exec = executor(transport.clone(), all_credentials());
        let mut failed = FailedModelSet::new();

        let outcome = exec
            .run(&tier(), &[ChatMessage::user("x")], &options(), &mut failed)
            .await
            .unwrap();

        assert_eq!(outcome.model, "model-a");
        assert_eq!(outcome.provider, "groq");
        assert_eq!(transport.called_models(), vec!["model-a"]);
        assert!(failed.is_empty());
    }

    #[tokio::test]
    async fn test_two_timeouts_then_success_and_skip_on_next_run() {
        let transport = Arc::new(
            ScriptedTransport::new(vec![
                Step::Reply(text_response("first")),
                Step::Reply(text_response("second")),
            ])
            .with_timing_out(&["model-a", "model-b"]),
        );
        let exec = executor(transport.clone(), all_credentials());
        let mut failed = FailedModelSet::new();

        let outcome = exec
            .run(&tier(), &[ChatMessage::user("x")], &options(), &mut failed)
            .await
            .unwrap();
        assert_eq!(outcome.model, "model-c");
        assert_eq!(outcome.response.text(), "first");
        assert_eq!(failed.len(), 2);
        assert!(failed.contains("model-a") && failed.contains("model-b"));

        let outcome = exec
            .run(&tier(), &[ChatMessage::user("y")], &options(), &mut failed)
            .await
            .unwrap();
        assert_eq!(outcome.model, "model-c");
        assert_eq!(
            transport.called_models(),
            vec!["model-a", "model-b", "model-c", "model-c"]
        );
    }

    #[tokio::test]
    async fn test_missing_credential_is_not_remembered() {
        let transport = Arc::new(ScriptedTransport::new(vec![Step::Reply(text_response("ok"))]));
        let creds = Arc::new(StaticCredentials::new([("CEREBRAS_API_KEY", "k2")]));
        let exec = executor(transport.clone(), creds);
        let mut failed = FailedModelSet::new();

        let outcome = exec
            .run(&tier(), &[ChatMessage::user("x")], &options(), &mut failed)
            .await
            .unwrap();

        assert_eq!(outcome.model, "model-b");
        assert!(!failed.contains("model-a"));
        assert_eq!(transport.calls()[0].credential, "k2");
    }

    #[tokio::test]
    async fn test_all_failed_aggregates_errors() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Step::Status(503),
            Step::Timeout,
            Step::Status(429),
        ]));
        let exec = executor(transport.clone(), all_credentials());
        let mut failed = FailedModelSet::new();

        let err = exec
            .run(&tier(), &[ChatMessage::user("x")], &options(), &mut failed)
            .await
            .unwrap_err();

        let InferenceError::AllCandidatesExhausted { errors } = &err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("503"));
        assert!(errors[1].contains("timed out"));
        assert!(errors[2].contains("429"));
        assert_eq!(failed.len(), 3);
        assert!(err.to_string().starts_with("all models failed: "));
    }

    #[tokio::test]
    async fn test_every_candidate_already_failed_makes_no_calls() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let exec = executor(transport.clone(), all_credentials());
        let mut failed = FailedModelSet::new();
        for c in tier() {
            failed.insert(&c.model);
        }

        let err = exec
            .run(&tier(), &[ChatMessage::user("x")], &options(), &mut failed)
            .await
            .unwrap_err();

        assert!(transport.calls().is_empty());
        assert!(err.to_string().contains("skipped (already failed): model-a"));
    }

    #[tokio::test]
    async fn test_unknown_provider_is_a_configuration_gap() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let exec = executor(transport.clone(), all_credentials());
        let mut failed = FailedModelSet::new();
        let tier = vec![ModelCandidate::new("nowhere", "ghost", 0, "GROQ_API_KEY")];

        let err = exec
            .run(&tier, &[ChatMessage::user("x")], &options(), &mut failed)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("provider 'nowhere' has no endpoint"));
        assert!(failed.is_empty());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_options_forwarded_to_transport() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let exec = executor(transport.clone(), all_credentials());
        let mut failed = FailedModelSet::new();

        exec.run(&tier(), &[ChatMessage::user("x")], &options(), &mut failed)
            .await
            .unwrap();

        let call = &transport.calls()[0];
        assert_eq!(call.provider, "groq");
        assert_eq!(call.body.model, "model-a");
        assert_eq!(call.body.max_tokens, 64);
        assert_eq!(call.timeout, Duration::from_millis(12_000));
    }

    #[test]
    fn test_failed_set_insert_reports_novelty() {
        let mut failed = FailedModelSet::new();
        assert!(failed.insert("m"));
        assert!(!failed.insert("m"));
        assert_eq!(failed.iter().collect::<Vec<_>>(), vec!["m"]);
    }
}

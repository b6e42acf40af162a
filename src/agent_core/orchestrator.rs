//! AdminAgent — classify once, then run a bounded tool-calling loop.
//!
//! Flow per request:
//! 1. **Classify** — preflight classifier picks `simple` or `deep`
//! 2. **Dispatch** — `simple` runs on the fast tier, `deep` on the deep tier,
//!    each with its own per-call timeout
//! 3. **Rounds** — call the tier with the full history and tool schema; run
//!    every requested tool in order and append the results; repeat until the
//!    model answers without tools or the round limit is hit
//!
//! The only state shared between rounds besides the growing history is the
//! request's `FailedModelSet`.

use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use crate::inference::types::{ChatMessage, CompletionOptions, Role, ToolDefinition};
use crate::inference::{
    AgentConfig, ChatTransport, CredentialSource, FailedModelSet, FallbackExecutor,
    InferenceError,
};

use super::errors::AgentError;
use super::preflight::PreflightClassifier;
use super::tool_router::ToolRouter;
use super::tools::{parse_arguments, tool_definitions};
use super::types::{
    AdminResponse, Classification, ExecutedAction, IncomingMessage, RoutingInfo, Tier,
};

const SYSTEM_PROMPT: &str = "You are the admin assistant of a links website. The site is made \
of sections; each section holds links. There is also one site configuration record (titles, \
footer, theme color, contact email).\n\
Use the tools to read and change content. Never invent ids: list sections or links first when \
you need one. When the user gives only a URL for a new link, call fetch_url_metadata first and \
use its title, description and favicon.\n\
After the changes are done, reply briefly in the user's language (usually Hebrew) and say what \
you changed.";

// ─── AdminAgent ─────────────────────────────────────────────────────────────

/// Request handler. One instance serves any number of concurrent requests.
pub struct AdminAgent {
    config: Arc<AgentConfig>,
    executor: FallbackExecutor,
    classifier: PreflightClassifier,
    tools: ToolRouter,
    tool_definitions: Vec<ToolDefinition>,
}

impl AdminAgent {
    pub fn new(
        config: Arc<AgentConfig>,
        transport: Arc<dyn ChatTransport>,
        credentials: Arc<dyn CredentialSource>,
        tools: ToolRouter,
    ) -> Result<Self, InferenceError> {
        let classifier = PreflightClassifier::new(&config.classifier)?;
        let executor = FallbackExecutor::new(config.clone(), transport, credentials);
        Ok(Self {
            config,
            executor,
            classifier,
            tools,
            tool_definitions: tool_definitions(),
        })
    }

    #[cfg(test)]
    pub(crate) fn tools(&self) -> &ToolRouter {
        &self.tools
    }

    /// Handle one admin request.
    ///
    /// Tier exhaustion is not an error: it ends the request with an
    /// `"all models failed: ..."` reply and keeps the actions already run.
    /// `Err` is reserved for failures that no fallback can fix.
    pub async fn handle(&self, messages: Vec<IncomingMessage>) -> Result<AdminResponse, AgentError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("admin_request", request_id = %request_id);
        self.handle_request(messages, &request_id)
            .instrument(span)
            .await
    }

    async fn handle_request(
        &self,
        messages: Vec<IncomingMessage>,
        request_id: &str,
    ) -> Result<AdminResponse, AgentError> {
        let mut history = Vec::with_capacity(messages.len() + 1);
        history.push(ChatMessage::system(SYSTEM_PROMPT));
        for message in messages {
            if message.role == Role::System {
                tracing::warn!("dropping inbound system message");
                continue;
            }
            history.push(ChatMessage::from(message));
        }

        // Grow-only for the whole request; the classifier shares it.
        let mut failed = FailedModelSet::new();

        let classification = self
            .classifier
            .classify(
                &self.executor,
                &self.config.tiers.classifier,
                &history,
                &mut failed,
                Duration::from_millis(self.config.timeouts.classifier_ms),
            )
            .await;

        let (tier, timeout_ms) = match classification.tier {
            Tier::Simple => (&self.config.tiers.fast, self.config.timeouts.fast_ms),
            Tier::Deep => (&self.config.tiers.deep, self.config.timeouts.deep_ms),
        };

        tracing::info!(
            tier = classification.tier.as_str(),
            classifier = classification.source.label(),
            reason = %classification.reason,
            "request routed"
        );

        let options = CompletionOptions {
            tools: Some(self.tool_definitions.clone()),
            tool_choice: Some("auto".to_string()),
            max_tokens: self.config.tool_loop.max_tokens,
            temperature: self.config.tool_loop.temperature,
            response_format: None,
            timeout: Duration::from_millis(timeout_ms),
        };

        let max_rounds = self.config.tool_loop.max_rounds;
        let mut executed_actions: Vec<ExecutedAction> = Vec::new();
        let mut execution_model: Option<String> = None;
        let mut reply = String::new();

        for round in 1..=max_rounds {
            tracing::info!(
                round,
                message_count = history.len(),
                failed_models = failed.len(),
                "model round start"
            );

            let outcome = match self
                .executor
                .run(tier, &history, &options, &mut failed)
                .await
            {
                Ok(outcome) => outcome,
                Err(e @ InferenceError::AllCandidatesExhausted { .. }) => {
                    tracing::error!(round, error = %e, "tier exhausted, ending request");
                    reply = e.to_string();
                    break;
                }
                Err(e) => return Err(e.into()),
            };
            execution_model = Some(outcome.model.clone());

            let Some(message) = outcome.response.message().cloned() else {
                tracing::warn!(round, model = %outcome.model, "response had no choices");
                reply.clear();
                break;
            };

            let tool_calls = message.requested_tool_calls().to_vec();
            reply = message.content.clone().unwrap_or_default();
            if tool_calls.is_empty() {
                tracing::info!(round, model = %outcome.model, "final reply");
                break;
            }

            history.push(message);
            for call in tool_calls {
                let args = parse_arguments(&call.function.arguments);
                let result = self
                    .tools
                    .execute(&call.function.name, &args, request_id)
                    .await;

                history.push(ChatMessage::tool(call.id, serde_json::to_string(&result)?));
                executed_actions.push(ExecutedAction {
                    tool: call.function.name,
                    args,
                    result,
                });
            }

            if round == max_rounds {
                tracing::warn!(
                    max_rounds,
                    "round limit reached with tools still requested"
                );
            }
        }

        Ok(AdminResponse {
            reply,
            executed_actions,
            routing_info: routing_info(classification, execution_model),
        })
    }
}

fn routing_info(classification: Classification, execution_model: Option<String>) -> RoutingInfo {
    RoutingInfo {
        tier: classification.tier,
        classifier_model: classification.source.label().to_string(),
        reason: classification.reason,
        execution_model,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

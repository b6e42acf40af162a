//! Preflight classifier — picks the processing tier for a request.
//!
//! Two regexes settle most requests with no network call: read-only phrasing
//! goes to the fast tier, anything that writes or needs judgment goes deep.
//! Only text that matches neither costs one call to the classifier tier.
//! Classification never fails: every error path lands on `deep`.

use std::time::Duration;

use regex::Regex;

use crate::inference::config::{ClassifierConfig, ModelCandidate};
use crate::inference::types::{ChatMessage, CompletionOptions, ResponseFormat, Role};
use crate::inference::{FailedModelSet, FallbackExecutor, InferenceError};

use super::json_extract::extract_json_object;
use super::types::{Classification, ClassifierSource, Tier};

const SIMPLE_HEURISTIC_REASON: &str = "heuristic: read-only listing request";
const DEEP_HEURISTIC_REASON: &str = "heuristic: request modifies content or asks for judgment";

const CLASSIFIER_PROMPT: &str = "You route requests for a website admin assistant that manages \
sections, links and site settings. Decide whether the user's request is SIMPLE (only reads or \
lists existing content, one obvious step) or DEEP (creates, edits, deletes, reorganizes, \
suggests, or needs several steps or judgment). The request may be in Hebrew or English. \
Respond with ONLY a JSON object, no other text: {\"tier\": \"simple\" | \"deep\", \"reason\": \
\"<short justification>\"}";

/// Regex-then-model tier classifier.
#[derive(Debug, Clone)]
pub struct PreflightClassifier {
    simple: Regex,
    deep: Regex,
    max_tokens: u32,
    max_input_chars: usize,
    json_mode: bool,
}

impl PreflightClassifier {
    /// Compile the configured patterns. An invalid pattern is a config error.
    pub fn new(config: &ClassifierConfig) -> Result<Self, InferenceError> {
        let compile = |name: &str, pattern: &str| {
            Regex::new(pattern).map_err(|e| InferenceError::ConfigError {
                reason: format!("invalid classifier.{name}: {e}"),
            })
        };

        Ok(Self {
            simple: compile("simple_pattern", &config.simple_pattern)?,
            deep: compile("deep_pattern", &config.deep_pattern)?,
            max_tokens: config.max_tokens,
            max_input_chars: config.max_input_chars,
            json_mode: config.json_mode,
        })
    }

    /// Heuristic shortcut alone. `None` means the text is ambiguous.
    pub fn classify_heuristic(&self, text: &str) -> Option<Classification> {
        if self.deep.is_match(text) {
            return Some(Classification {
                tier: Tier::Deep,
                reason: DEEP_HEURISTIC_REASON.to_string(),
                source: ClassifierSource::Heuristic,
            });
        }
        if self.simple.is_match(text) {
            return Some(Classification {
                tier: Tier::Simple,
                reason: SIMPLE_HEURISTIC_REASON.to_string(),
                source: ClassifierSource::Heuristic,
            });
        }
        None
    }

    /// Classify the latest user turn of `messages`.
    ///
    /// Models that fail during the classifier call are added to `failed`,
    /// so the tool loop of the same request will not retry them.
    pub async fn classify(
        &self,
        executor: &FallbackExecutor,
        tier: &[ModelCandidate],
        messages: &[ChatMessage],
        failed: &mut FailedModelSet,
        timeout: Duration,
    ) -> Classification {
        let text = last_user_text(messages);

        // Nothing to classify: skip the model call and go deep.
        if text.trim().is_empty() {
            return fallback("no user text to classify".to_string());
        }

        if let Some(classification) = self.classify_heuristic(text) {
            tracing::debug!(tier = classification.tier.as_str(), "heuristic classification");
            return classification;
        }

        let truncated: String = text.chars().take(self.max_input_chars).collect();
        let prompt = [ChatMessage::system(CLASSIFIER_PROMPT), ChatMessage::user(truncated)];
        let options = CompletionOptions {
            tools: None,
            tool_choice: None,
            max_tokens: self.max_tokens,
            temperature: 0.0,
            response_format: self.json_mode.then(ResponseFormat::json_object),
            timeout,
        };

        let outcome = match executor.run(tier, &prompt, &options, failed).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "classifier call failed, defaulting to deep");
                return fallback(format!("classifier unavailable: {e}"));
            }
        };

        let Some(parsed) = extract_json_object(outcome.response.text()) else {
            tracing::warn!(model = %outcome.model, "classifier returned no JSON object, defaulting to deep");
            return fallback(format!("no JSON from classifier {}", outcome.model));
        };

        let tier = match parsed.get("tier").and_then(|t| t.as_str()) {
            Some("simple") => Tier::Simple,
            _ => Tier::Deep,
        };
        let reason = parsed
            .get("reason")
            .and_then(|r| r.as_str())
            .unwrap_or_default()
            .to_string();

        tracing::info!(model = %outcome.model, tier = tier.as_str(), "model classification");

        Classification {
            tier,
            reason,
            source: ClassifierSource::Model(outcome.model),
        }
    }
}

fn fallback(reason: String) -> Classification {
    Classification {
        tier: Tier::Deep,
        reason: format!("defaulted to deep ({reason})"),
        source: ClassifierSource::Fallback,
    }
}

/// Text of the most recent user turn (empty when there is none).
fn last_user_text(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .and_then(|m| m.content.as_deref())
        .unwrap_or_default()
}

// ─── Tests ──────────────────────────────────────────────────────────────────

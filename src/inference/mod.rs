//! Inference — provider calls and tier fallback.
//!
//! This module handles all communication with upstream model providers:
//! - Configuration: provider endpoints and the classifier/fast/deep tier tables
//! - Transport: one bounded HTTP call per candidate (`ChatTransport`)
//! - Fallback: ordered candidate walk with per-request failure memory
//! - Credentials: injected secret lookup
//!
//! Every provider speaks the OpenAI Chat Completions API, so switching a tier
//! to another provider is a config change, not a code change.

pub mod config;
pub mod credentials;
pub mod errors;
pub mod fallback;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use config::{AgentConfig, ModelCandidate, ProviderConfig};
pub use credentials::{CredentialSource, EnvCredentials, StaticCredentials};
pub use errors::InferenceError;
pub use fallback::{FailedModelSet, FallbackExecutor, FallbackOutcome};
pub use transport::{ChatTransport, HttpTransport, TransportCall};
pub use types::{ChatMessage, CompletionOptions, Role, ToolCallRequest, ToolDefinition};

//! Agent Core — request handling on top of the inference layer.
//!
//! Submodules:
//! - `orchestrator`: Classify once, then the bounded tool-calling loop (`AdminAgent`)
//! - `preflight`: Regex-then-model tier classifier
//! - `json_extract`: Best-effort JSON object extraction from model text
//! - `tool_router`: Executes tool calls against the content store, with audit
//! - `tools`: Tool schema and typed tool arguments
//! - `metadata`: Page title/description/favicon scraping
//! - `database`: SQLite persistence for sections, links, site config, audit
//! - `types`: Shared types across the agent core
//! - `errors`: Agent-level error types

pub mod database;
pub mod errors;
pub mod json_extract;
pub mod metadata;
pub mod orchestrator;
pub mod preflight;
pub mod tool_router;
pub mod tools;
pub mod types;

// Re-exports for convenience
pub use database::SiteDatabase;
pub use errors::AgentError;
pub use metadata::MetadataFetcher;
pub use orchestrator::AdminAgent;
pub use preflight::PreflightClassifier;
pub use tool_router::ToolRouter;
pub use types::{
    AdminRequest, AdminResponse, AuditEntry, AuditStatus, Classification, ExecutedAction,
    IncomingMessage, RoutingInfo, Tier, ToolResult,
};

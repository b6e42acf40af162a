//! Shared types for the agent core.
//!
//! Content-store entities, tool results, routing decisions and the
//! request/response shapes of the admin endpoint.

use serde::{Deserialize, Serialize};

use crate::inference::types::{ChatMessage, Role};

// ─── Content Store ──────────────────────────────────────────────────────────

/// A group of links shown together on the site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub sort_order: i64,
    pub is_visible: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields for a new section. `sort_order` is always assigned by the store.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewSection {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub is_visible: Option<bool>,
}

/// Partial update of a section; absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SectionPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub sort_order: Option<i64>,
    #[serde(default)]
    pub is_visible: Option<bool>,
}

/// A link inside a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: i64,
    pub section_id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub icon_url: Option<String>,
    pub sort_order: i64,
    pub is_visible: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields for a new link. `sort_order` is assigned within its section.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewLink {
    pub section_id: i64,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub is_visible: Option<bool>,
}

/// Partial update of a link. Setting `section_id` moves the link.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LinkPatch {
    #[serde(default)]
    pub section_id: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub sort_order: Option<i64>,
    #[serde(default)]
    pub is_visible: Option<bool>,
}

/// The singleton site configuration record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub site_title: String,
    pub site_description: Option<String>,
    pub hero_title: Option<String>,
    pub hero_subtitle: Option<String>,
    pub footer_text: Option<String>,
    pub theme_color: Option<String>,
    pub contact_email: Option<String>,
    pub updated_at: String,
}

/// Partial update of the site configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteConfigPatch {
    #[serde(default)]
    pub site_title: Option<String>,
    #[serde(default)]
    pub site_description: Option<String>,
    #[serde(default)]
    pub hero_title: Option<String>,
    #[serde(default)]
    pub hero_subtitle: Option<String>,
    #[serde(default)]
    pub footer_text: Option<String>,
    #[serde(default)]
    pub theme_color: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
}

impl SiteConfigPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// What the metadata tool found on a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub favicon_url: Option<String>,
}

// ─── Tool Results ───────────────────────────────────────────────────────────

/// Uniform envelope returned by every tool, serialized verbatim into the
/// `tool` message the model sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// One tool call as it actually ran, returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutedAction {
    pub tool: String,
    pub args: serde_json::Value,
    pub result: ToolResult,
}

// ─── Audit Log ──────────────────────────────────────────────────────────────

/// A single row of the tool audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub request_id: String,
    pub timestamp: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub result_status: AuditStatus,
    pub execution_time_ms: u64,
}

/// Outcome of an audited tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Error,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::Error => "error",
        }
    }

    /// Unknown values read back as `Error`.
    pub fn parse(s: &str) -> Self {
        match s {
            "success" => AuditStatus::Success,
            _ => AuditStatus::Error,
        }
    }
}

// ─── Routing ────────────────────────────────────────────────────────────────

/// Processing tier chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Simple,
    Deep,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Simple => "simple",
            Tier::Deep => "deep",
        }
    }
}

/// Who decided the tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifierSource {
    /// Regex shortcut, no network call.
    Heuristic,
    /// A classifier-tier model.
    Model(String),
    /// Classification failed and the safe default was used.
    Fallback,
}

impl ClassifierSource {
    pub fn label(&self) -> &str {
        match self {
            ClassifierSource::Heuristic => "heuristic",
            ClassifierSource::Model(model) => model,
            ClassifierSource::Fallback => "default",
        }
    }
}

/// Result of the preflight classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub tier: Tier,
    pub reason: String,
    pub source: ClassifierSource,
}

// ─── Endpoint shapes ────────────────────────────────────────────────────────

/// One inbound conversation turn.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IncomingMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

impl From<IncomingMessage> for ChatMessage {
    fn from(msg: IncomingMessage) -> Self {
        ChatMessage {
            role: msg.role,
            content: msg.content,
            tool_call_id: msg.tool_call_id,
            tool_calls: None,
        }
    }
}

/// Inbound request body.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminRequest {
    pub messages: Vec<IncomingMessage>,
}

/// How the request was routed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingInfo {
    pub tier: Tier,
    pub reason: String,
    pub classifier_model: String,
    /// Last model that answered; `None` when no model ever did.
    pub execution_model: Option<String>,
}

/// Response of the admin endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminResponse {
    pub reply: String,
    pub executed_actions: Vec<ExecutedAction>,
    pub routing_info: RoutingInfo,
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_omits_absent_fields() {
        let ok = serde_json::to_string(&ToolResult::ok(serde_json::json!({"id": 1}))).unwrap();
        assert_eq!(ok, r#"{"success":true,"data":{"id":1}}"#);

        let err = serde_json::to_string(&ToolResult::err("Unknown tool: x")).unwrap();
        assert_eq!(err, r#"{"success":false,"error":"Unknown tool: x"}"#);
    }

    #[test]
    fn test_audit_status_unknown_defaults_to_error() {
        assert_eq!(AuditStatus::parse("success"), AuditStatus::Success);
        assert_eq!(AuditStatus::parse("weird"), AuditStatus::Error);
    }

    #[test]
    fn test_response_serializes_camel_case() {
        let resp = AdminResponse {
            reply: "done".into(),
            executed_actions: vec![ExecutedAction {
                tool: "list_sections".into(),
                args: serde_json::json!({}),
                result: ToolResult::ok(serde_json::json!([])),
            }],
            routing_info: RoutingInfo {
                tier: Tier::Simple,
                reason: "listing request".into(),
                classifier_model: ClassifierSource::Heuristic.label().to_string(),
                execution_model: Some("llama-3.3-70b-versatile".into()),
            },
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["executedActions"][0]["tool"], "list_sections");
        assert_eq!(json["routingInfo"]["tier"], "simple");
        assert_eq!(json["routingInfo"]["classifierModel"], "heuristic");
        assert_eq!(json["routingInfo"]["executionModel"], "llama-3.3-70b-versatile");
    }

    #[test]
    fn test_incoming_tool_message_converts() {
        let msg: IncomingMessage = serde_json::from_str(
            r#"{"role":"tool","tool_call_id":"call_1","content":"{\"success\":true}"}"#,
        )
        .unwrap();
        let chat: ChatMessage = msg.into();
        assert_eq!(chat.role, Role::Tool);
        assert_eq!(chat.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_new_section_rejects_unknown_fields() {
        let err = serde_json::from_str::<NewSection>(r#"{"title":"a","colour":"red"}"#);
        assert!(err.is_err());
    }
}

//! Tool catalogue: the schema advertised to the model and the typed
//! arguments each tool call is parsed into.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::inference::types::ToolDefinition;

use super::errors::AgentError;
use super::json_extract::extract_json_object;
use super::types::{LinkPatch, NewLink, NewSection, SectionPatch, SiteConfigPatch};

/// Tools that change the content store. Each call is written to the audit log.
const MUTATING_TOOLS: &[&str] = &[
    "create_section",
    "update_section",
    "delete_section",
    "create_link",
    "update_link",
    "delete_link",
    "update_site_config",
];

pub fn is_mutating(tool_name: &str) -> bool {
    MUTATING_TOOLS.contains(&tool_name)
}

// ─── Invocation ─────────────────────────────────────────────────────────────

/// A tool call with its arguments parsed into the tool's own type.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    ListSections,
    CreateSection(NewSection),
    UpdateSection { id: i64, patch: SectionPatch },
    DeleteSection { id: i64 },
    ListLinks { section_id: Option<i64> },
    CreateLink(NewLink),
    UpdateLink { id: i64, patch: LinkPatch },
    DeleteLink { id: i64 },
    GetSiteConfig,
    UpdateSiteConfig(SiteConfigPatch),
    FetchUrlMetadata { url: String },
    /// The model asked for a tool that does not exist.
    Unknown { name: String },
}

#[derive(Deserialize)]
struct IdArgs {
    id: i64,
}

#[derive(Deserialize)]
struct ListLinksArgs {
    #[serde(default)]
    section_id: Option<i64>,
}

#[derive(Deserialize)]
struct UrlArgs {
    url: String,
}

impl ToolInvocation {
    /// Parse a call by name. Only argument errors fail; an unknown name is
    /// the `Unknown` variant.
    pub fn parse(name: &str, args: &Value) -> Result<Self, AgentError> {
        let known = matches!(
            name,
            "list_sections"
                | "create_section"
                | "update_section"
                | "delete_section"
                | "list_links"
                | "create_link"
                | "update_link"
                | "delete_link"
                | "get_site_config"
                | "update_site_config"
                | "fetch_url_metadata"
        );
        if !known {
            return Ok(ToolInvocation::Unknown {
                name: name.to_string(),
            });
        }

        let args = match args {
            Value::Null => Value::Object(Default::default()),
            Value::Object(_) => args.clone(),
            other => {
                return Err(invalid_arguments(
                    name,
                    format!("expected a JSON object, got {other}"),
                ))
            }
        };
        let typed = TypedArgs { tool: name, args: &args };

        Ok(match name {
            "list_sections" => ToolInvocation::ListSections,
            "create_section" => ToolInvocation::CreateSection(typed.decode()?),
            "update_section" => {
                let IdArgs { id } = typed.decode()?;
                ToolInvocation::UpdateSection {
                    id,
                    patch: typed.decode()?,
                }
            }
            "delete_section" => {
                let IdArgs { id } = typed.decode()?;
                ToolInvocation::DeleteSection { id }
            }
            "list_links" => {
                let ListLinksArgs { section_id } = typed.decode()?;
                ToolInvocation::ListLinks { section_id }
            }
            "create_link" => ToolInvocation::CreateLink(typed.decode()?),
            "update_link" => {
                let IdArgs { id } = typed.decode()?;
                ToolInvocation::UpdateLink {
                    id,
                    patch: typed.decode()?,
                }
            }
            "delete_link" => {
                let IdArgs { id } = typed.decode()?;
                ToolInvocation::DeleteLink { id }
            }
            "get_site_config" => ToolInvocation::GetSiteConfig,
            "update_site_config" => {
                let patch: SiteConfigPatch = typed.decode()?;
                if patch.is_empty() {
                    return Err(invalid_arguments(name, "no fields to update".to_string()));
                }
                ToolInvocation::UpdateSiteConfig(patch)
            }
            _ => {
                let UrlArgs { url } = typed.decode()?;
                ToolInvocation::FetchUrlMetadata { url }
            }
        })
    }

    #[cfg(test)]
    pub(crate) fn name(&self) -> &str {
        match self {
            ToolInvocation::ListSections => "list_sections",
            ToolInvocation::CreateSection(_) => "create_section",
            ToolInvocation::UpdateSection { .. } => "update_section",
            ToolInvocation::DeleteSection { .. } => "delete_section",
            ToolInvocation::ListLinks { .. } => "list_links",
            ToolInvocation::CreateLink(_) => "create_link",
            ToolInvocation::UpdateLink { .. } => "update_link",
            ToolInvocation::DeleteLink { .. } => "delete_link",
            ToolInvocation::GetSiteConfig => "get_site_config",
            ToolInvocation::UpdateSiteConfig(_) => "update_site_config",
            ToolInvocation::FetchUrlMetadata { .. } => "fetch_url_metadata",
            ToolInvocation::Unknown { name } => name,
        }
    }
}

fn invalid_arguments(tool: &str, reason: String) -> AgentError {
    AgentError::InvalidArguments {
        tool: tool.to_string(),
        reason,
    }
}

/// Argument object of one call, decodable into any of the tool's types.
struct TypedArgs<'a> {
    tool: &'a str,
    args: &'a Value,
}

impl TypedArgs<'_> {
    fn decode<T: DeserializeOwned>(&self) -> Result<T, AgentError> {
        T::deserialize(self.args).map_err(|e| invalid_arguments(self.tool, e.to_string()))
    }
}

/// Turn the raw argument text of a tool call into JSON.
///
/// Empty text is `{}`. Text that is not valid JSON gets one recovery pass
/// (embedded object, trailing commas); if that fails too the raw text is
/// kept as a JSON string so it still shows up in the action log.
pub fn parse_arguments(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return json!({});
    }
    serde_json::from_str(trimmed)
        .ok()
        .or_else(|| extract_json_object(trimmed))
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

// ─── Schema ─────────────────────────────────────────────────────────────────

/// Tool schema sent with every loop round.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    let section_fields = json!({
        "title": {"type": "string", "description": "Section title"},
        "description": {"type": "string"},
        "icon": {"type": "string", "description": "Emoji or icon name"},
        "is_visible": {"type": "boolean"}
    });
    let link_fields = json!({
        "section_id": {"type": "integer", "description": "Section the link belongs to"},
        "title": {"type": "string"},
        "url": {"type": "string", "description": "Absolute http(s) URL"},
        "description": {"type": "string"},
        "icon_url": {"type": "string"},
        "is_visible": {"type": "boolean"}
    });

    let with = |base: &Value, extra: Value| -> Value {
        let mut props = base.as_object().cloned().unwrap_or_default();
        if let Value::Object(extra) = extra {
            props.extend(extra);
        }
        Value::Object(props)
    };
    let id_only = json!({
        "type": "object",
        "properties": {"id": {"type": "integer"}},
        "required": ["id"]
    });

    vec![
        ToolDefinition::function(
            "list_sections",
            "List all sections of the site in display order.",
            json!({"type": "object", "properties": {}}),
        ),
        ToolDefinition::function(
            "create_section",
            "Create a new section. It is added after the existing sections.",
            json!({"type": "object", "properties": section_fields, "required": ["title"]}),
        ),
        ToolDefinition::function(
            "update_section",
            "Update fields of an existing section. Only the given fields change.",
            json!({
                "type": "object",
                "properties": with(&section_fields, json!({
                    "id": {"type": "integer"},
                    "sort_order": {"type": "integer"}
                })),
                "required": ["id"]
            }),
        ),
        ToolDefinition::function(
            "delete_section",
            "Delete a section together with all of its links.",
            id_only.clone(),
        ),
        ToolDefinition::function(
            "list_links",
            "List links, optionally only those in one section.",
            json!({"type": "object", "properties": {"section_id": {"type": "integer"}}}),
        ),
        ToolDefinition::function(
            "create_link",
            "Create a link in a section. It is added after the section's existing links.",
            json!({
                "type": "object",
                "properties": link_fields,
                "required": ["section_id", "title", "url"]
            }),
        ),
        ToolDefinition::function(
            "update_link",
            "Update fields of an existing link. Setting section_id moves it.",
            json!({
                "type": "object",
                "properties": with(&link_fields, json!({
                    "id": {"type": "integer"},
                    "sort_order": {"type": "integer"}
                })),
                "required": ["id"]
            }),
        ),
        ToolDefinition::function("delete_link", "Delete a link.", id_only),
        ToolDefinition::function(
            "get_site_config",
            "Get the site configuration (titles, footer, theme, contact).",
            json!({"type": "object", "properties": {}}),
        ),
        ToolDefinition::function(
            "update_site_config",
            "Update site configuration fields. Only the given fields change.",
            json!({
                "type": "object",
                "properties": {
                    "site_title": {"type": "string"},
                    "site_description": {"type": "string"},
                    "hero_title": {"type": "string"},
                    "hero_subtitle": {"type": "string"},
                    "footer_text": {"type": "string"},
                    "theme_color": {"type": "string", "description": "CSS color, e.g. #1e40af"},
                    "contact_email": {"type": "string"}
                }
            }),
        ),
        ToolDefinition::function(
            "fetch_url_metadata",
            "Fetch a web page and return its title, description and favicon URL. \
             Use before creating a link when only the URL is known.",
            json!({
                "type": "object",
                "properties": {"url": {"type": "string"}},
                "required": ["url"]
            }),
        ),
    ]
}

// ─── Tests ──────────────────────────────────────────────────────────────────

//! ToolRouter — executes model tool calls against the site content store.
//!
//! The ToolRouter is the bridge between the model's tool call decisions and
//! the store. It handles:
//! - Parsing arguments into the tool's typed form (`ToolInvocation`)
//! - Execution against `SiteDatabase` or the metadata fetcher
//! - Audit logging of every mutating tool call
//!
//! `execute` never fails: every error becomes `ToolResult { success: false }`
//! so the model can read it and recover.

use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};

use super::database::SiteDatabase;
use super::errors::AgentError;
use super::metadata::MetadataFetcher;
use super::tools::{is_mutating, ToolInvocation};
#[cfg(test)]
use super::types::AuditEntry;
use super::types::{AuditStatus, ToolResult};

// ─── ToolRouter ─────────────────────────────────────────────────────────────

/// Dispatches tool calls to their handlers.
pub struct ToolRouter {
    /// Held only for the duration of one store operation, never across `.await`.
    db: Mutex<SiteDatabase>,
    metadata: MetadataFetcher,
}

impl ToolRouter {
    pub fn new(db: SiteDatabase, metadata: MetadataFetcher) -> Self {
        Self {
            db: Mutex::new(db),
            metadata,
        }
    }

    // ─── Dispatch ───────────────────────────────────────────────────────

    /// Run one tool call and wrap the outcome in a `ToolResult`.
    pub async fn execute(&self, tool_name: &str, args: &Value, request_id: &str) -> ToolResult {
        let start = Instant::now();

        let outcome = match ToolInvocation::parse(tool_name, args) {
            Ok(invocation) => self.run(&invocation).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(data) => ToolResult::ok(data),
            Err(error) => {
                tracing::warn!(tool = tool_name, %error, elapsed_ms, "tool call failed");
                ToolResult::err(error)
            }
        };

        if is_mutating(tool_name) {
            self.audit(request_id, tool_name, args, &result, elapsed_ms);
        }

        tracing::info!(
            tool = tool_name,
            success = result.success,
            elapsed_ms,
            "tool executed"
        );
        result
    }

    async fn run(&self, invocation: &ToolInvocation) -> Result<Value, AgentError> {
        match invocation {
            ToolInvocation::ListSections => to_data(self.db()?.list_sections()?),
            ToolInvocation::CreateSection(new) => to_data(self.db()?.create_section(new)?),
            ToolInvocation::UpdateSection { id, patch } => {
                to_data(self.db()?.update_section(*id, patch)?)
            }
            ToolInvocation::DeleteSection { id } => {
                let (section, links_deleted) = self.db()?.delete_section(*id)?;
                Ok(json!({ "deleted": section, "links_deleted": links_deleted }))
            }
            ToolInvocation::ListLinks { section_id } => to_data(self.db()?.list_links(*section_id)?),
            ToolInvocation::CreateLink(new) => to_data(self.db()?.create_link(new)?),
            ToolInvocation::UpdateLink { id, patch } => to_data(self.db()?.update_link(*id, patch)?),
            ToolInvocation::DeleteLink { id } => {
                let link = self.db()?.delete_link(*id)?;
                Ok(json!({ "deleted": link }))
            }
            ToolInvocation::GetSiteConfig => to_data(self.db()?.get_site_config()?),
            ToolInvocation::UpdateSiteConfig(patch) => {
                to_data(self.db()?.update_site_config(patch)?)
            }
            ToolInvocation::FetchUrlMetadata { url } => to_data(self.metadata.fetch(url).await?),
            ToolInvocation::Unknown { name } => Err(AgentError::UnknownTool { name: name.clone() }),
        }
    }

    // ─── Helpers ────────────────────────────────────────────────────────

    fn db(&self) -> Result<MutexGuard<'_, SiteDatabase>, AgentError> {
        self.db.lock().map_err(|e| AgentError::DatabaseError {
            reason: format!("store lock poisoned: {e}"),
        })
    }

    /// Write the audit row. Failure here never changes the tool result.
    fn audit(&self, request_id: &str, tool_name: &str, args: &Value, result: &ToolResult, elapsed_ms: u64) {
        let status = if result.success {
            AuditStatus::Success
        } else {
            AuditStatus::Error
        };
        let written = serde_json::to_value(result)
            .map_err(AgentError::from)
            .and_then(|result_json| {
                self.db()?.insert_audit_entry(
                    request_id,
                    tool_name,
                    args,
                    Some(&result_json),
                    status,
                    elapsed_ms,
                )
            });
        if let Err(e) = written {
            tracing::warn!(tool = tool_name, error = %e, "failed to write audit entry");
        }
    }

    /// Audit rows recorded for one request.
    #[cfg(test)]
    pub(crate) fn audit_entries(&self, request_id: &str) -> Result<Vec<AuditEntry>, AgentError> {
        self.db()?.get_audit_entries(request_id)
    }
}

fn to_data<T: Serialize>(value: T) -> Result<Value, AgentError> {
    Ok(serde_json::to_value(value)?)
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn router() -> ToolRouter {
        let db = SiteDatabase::open(":memory:").unwrap();
        let metadata = MetadataFetcher::new(Duration::from_millis(500)).unwrap();
        ToolRouter::new(db, metadata)
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let router = router();
        let result = router.execute("drop_everything", &json!({}), "req").await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Unknown tool: drop_everything"));
        assert!(router.audit_entries("req").unwrap().is_empty());

        let err = router
            .run(&ToolInvocation::Unknown { name: "drop_everything".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::UnknownTool { ref name } if name == "drop_everything"));
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let router = router();
        let created = router
            .execute("create_section", &json!({"title": "כלים", "icon": "🛠"}), "req")
            .await;
        assert!(created.success, "{:?}", created.error);
        let section_id = created.data.as_ref().unwrap()["id"].as_i64().unwrap();

        let link = router
            .execute(
                "create_link",
                &json!({"section_id": section_id, "title": "X", "url": "https://x.dev"}),
                "req",
            )
            .await;
        assert!(link.success);
        assert_eq!(link.data.unwrap()["sort_order"], 1);

        let listed = router.execute("list_sections", &json!({}), "req").await;
        assert_eq!(listed.data.unwrap().as_array().unwrap().len(), 1);

        let links = router
            .execute("list_links", &json!({"section_id": section_id}), "req")
            .await;
        assert_eq!(links.data.unwrap()[0]["title"], "X");
    }

    #[tokio::test]
    async fn test_missing_entity_is_failure_result() {
        let router = router();
        let result = router.execute("delete_link", &json!({"id": 42}), "req").await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("link 42 not found"));
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_failure_result() {
        let router = router();
        let result = router
            .execute("update_section", &json!({"title": "no id"}), "req")
            .await;
        assert!(!result.success);
        assert!(result
            .error
            .unwrap()
            .starts_with("invalid arguments for update_section:"));
    }

    #[tokio::test]
    async fn test_mutations_are_audited() {
        let router = router();
        router
            .execute("create_section", &json!({"title": "A"}), "req-7")
            .await;
        router.execute("delete_section", &json!({"id": 99}), "req-7").await;
        router.execute("list_sections", &json!({}), "req-7").await;
        router.execute("get_site_config", &json!({}), "req-7").await;

        let entries = router.audit_entries("req-7").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].tool_name, "create_section");
        assert_eq!(entries[0].result_status, AuditStatus::Success);
        assert_eq!(entries[1].tool_name, "delete_section");
        assert_eq!(entries[1].result_status, AuditStatus::Error);
        assert_eq!(entries[1].arguments, json!({"id": 99}));
    }

    #[tokio::test]
    async fn test_delete_section_reports_removed_links() {
        let router = router();
        router.execute("create_section", &json!({"title": "A"}), "r").await;
        router
            .execute("create_link", &json!({"section_id": 1, "title": "l", "url": "https://l"}), "r")
            .await;

        let result = router.execute("delete_section", &json!({"id": 1}), "r").await;
        let data = result.data.unwrap();
        assert_eq!(data["deleted"]["title"], "A");
        assert_eq!(data["links_deleted"], 1);
    }

    #[tokio::test]
    async fn test_update_site_config() {
        let router = router();
        let result = router
            .execute("update_site_config", &json!({"footer_text": "© 2026"}), "r")
            .await;
        assert!(result.success);
        assert_eq!(result.data.unwrap()["footer_text"], "© 2026");

        let config = router.execute("get_site_config", &json!({}), "r").await;
        assert_eq!(config.data.unwrap()["footer_text"], "© 2026");
    }

    #[tokio::test]
    async fn test_fetch_metadata_rejects_bad_scheme() {
        let router = router();
        let result = router
            .execute("fetch_url_metadata", &json!({"url": "file:///etc/passwd"}), "r")
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("unsupported scheme"));
    }
}

//! SQLite content store: sections, links, the site config singleton, and the
//! append-only audit log.
//!
//! Uses `rusqlite` in synchronous mode; callers hold the connection only for
//! the duration of a single operation. Each operation is its own implicit
//! transaction; no multi-call transactions are used.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::errors::AgentError;
#[cfg(test)]
use super::types::AuditEntry;
use super::types::{
    AuditStatus, Link, LinkPatch, NewLink, NewSection, Section, SectionPatch, SiteConfig,
    SiteConfigPatch,
};

/// Title given to the site config row when the store is first created.
const DEFAULT_SITE_TITLE: &str = "My Site";

const SECTION_COLUMNS: &str =
    "id, title, description, icon, sort_order, is_visible, created_at, updated_at";

const LINK_COLUMNS: &str = "id, section_id, title, url, description, icon_url, sort_order, \
                            is_visible, created_at, updated_at";

// ─── Database ───────────────────────────────────────────────────────────────

/// SQLite handle for the site content.
pub struct SiteDatabase {
    conn: Connection,
}

impl SiteDatabase {
    /// Open (or create) the store at the given path.
    ///
    /// Pass `":memory:"` for an in-memory database (tests).
    pub fn open(path: &str) -> Result<Self, AgentError> {
        let conn = Connection::open(path)?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self { conn };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<(), AgentError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT,
                icon TEXT,
                sort_order INTEGER NOT NULL,
                is_visible INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                section_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                url TEXT NOT NULL,
                description TEXT,
                icon_url TEXT,
                sort_order INTEGER NOT NULL,
                is_visible INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                FOREIGN KEY (section_id) REFERENCES sections(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_links_section
                ON links(section_id, sort_order);

            CREATE TABLE IF NOT EXISTS site_config (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                site_title TEXT NOT NULL,
                site_description TEXT,
                hero_title TEXT,
                hero_subtitle TEXT,
                footer_text TEXT,
                theme_color TEXT,
                contact_email TEXT,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                request_id TEXT NOT NULL,
                timestamp TEXT NOT NULL DEFAULT (datetime('now')),
                tool_name TEXT NOT NULL,
                arguments TEXT,
                result TEXT,
                result_status TEXT NOT NULL,
                execution_time_ms INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_audit_request
                ON audit_log(request_id);
            ",
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO site_config (id, site_title) VALUES (1, ?1)",
            params![DEFAULT_SITE_TITLE],
        )?;
        Ok(())
    }

    // ─── Sections ───────────────────────────────────────────────────────

    /// All sections, in display order.
    pub fn list_sections(&self) -> Result<Vec<Section>, AgentError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SECTION_COLUMNS} FROM sections ORDER BY sort_order ASC, id ASC"
        ))?;
        let rows = stmt.query_map([], row_to_section)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_section(&self, id: i64) -> Result<Option<Section>, AgentError> {
        let section = self
            .conn
            .query_row(
                &format!("SELECT {SECTION_COLUMNS} FROM sections WHERE id = ?1"),
                params![id],
                row_to_section,
            )
            .optional()?;
        Ok(section)
    }

    /// Insert a section at the end: `sort_order` = current max + 1.
    pub fn create_section(&self, new: &NewSection) -> Result<Section, AgentError> {
        self.conn.execute(
            "INSERT INTO sections (title, description, icon, sort_order, is_visible)
             VALUES (?1, ?2, ?3, (SELECT COALESCE(MAX(sort_order), 0) + 1 FROM sections), ?4)",
            params![
                new.title,
                new.description,
                new.icon,
                new.is_visible.unwrap_or(true),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.require_section(id)
    }

    /// Apply the fields present in `patch`.
    pub fn update_section(&self, id: i64, patch: &SectionPatch) -> Result<Section, AgentError> {
        let changed = self.conn.execute(
            "UPDATE sections SET
                title = COALESCE(?2, title),
                description = COALESCE(?3, description),
                icon = COALESCE(?4, icon),
                sort_order = COALESCE(?5, sort_order),
                is_visible = COALESCE(?6, is_visible),
                updated_at = datetime('now')
             WHERE id = ?1",
            params![
                id,
                patch.title,
                patch.description,
                patch.icon,
                patch.sort_order,
                patch.is_visible,
            ],
        )?;
        if changed == 0 {
            return Err(AgentError::NotFound {
                entity: "section",
                id,
            });
        }
        self.require_section(id)
    }

    /// Delete a section and its links. Returns the deleted section and the
    /// number of links removed with it.
    pub fn delete_section(&self, id: i64) -> Result<(Section, usize), AgentError> {
        let section = self.require_section(id)?;
        let links: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM links WHERE section_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        self.conn
            .execute("DELETE FROM sections WHERE id = ?1", params![id])?;
        Ok((section, links as usize))
    }

    fn require_section(&self, id: i64) -> Result<Section, AgentError> {
        self.get_section(id)?.ok_or(AgentError::NotFound {
            entity: "section",
            id,
        })
    }

    // ─── Links ──────────────────────────────────────────────────────────

    /// Links in display order, optionally restricted to one section.
    pub fn list_links(&self, section_id: Option<i64>) -> Result<Vec<Link>, AgentError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LINK_COLUMNS} FROM links
             WHERE ?1 IS NULL OR section_id = ?1
             ORDER BY section_id ASC, sort_order ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![section_id], row_to_link)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_link(&self, id: i64) -> Result<Option<Link>, AgentError> {
        let link = self
            .conn
            .query_row(
                &format!("SELECT {LINK_COLUMNS} FROM links WHERE id = ?1"),
                params![id],
                row_to_link,
            )
            .optional()?;
        Ok(link)
    }

    /// Insert a link at the end of its section.
    pub fn create_link(&self, new: &NewLink) -> Result<Link, AgentError> {
        self.require_section(new.section_id)?;
        self.conn.execute(
            "INSERT INTO links (section_id, title, url, description, icon_url, sort_order, is_visible)
             VALUES (?1, ?2, ?3, ?4, ?5,
                     (SELECT COALESCE(MAX(sort_order), 0) + 1 FROM links WHERE section_id = ?1),
                     ?6)",
            params![
                new.section_id,
                new.title,
                new.url,
                new.description,
                new.icon_url,
                new.is_visible.unwrap_or(true),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.require_link(id)
    }

    /// Apply the fields present in `patch`. Moving to another section keeps
    /// the given `sort_order`, or appends when none is given.
    pub fn update_link(&self, id: i64, patch: &LinkPatch) -> Result<Link, AgentError> {
        let current = self.require_link(id)?;

        let mut sort_order = patch.sort_order;
        if let Some(target) = patch.section_id {
            if target != current.section_id {
                self.require_section(target)?;
                if sort_order.is_none() {
                    sort_order = Some(self.conn.query_row(
                        "SELECT COALESCE(MAX(sort_order), 0) + 1 FROM links WHERE section_id = ?1",
                        params![target],
                        |row| row.get(0),
                    )?);
                }
            }
        }

        self.conn.execute(
            "UPDATE links SET
                section_id = COALESCE(?2, section_id),
                title = COALESCE(?3, title),
                url = COALESCE(?4, url),
                description = COALESCE(?5, description),
                icon_url = COALESCE(?6, icon_url),
                sort_order = COALESCE(?7, sort_order),
                is_visible = COALESCE(?8, is_visible),
                updated_at = datetime('now')
             WHERE id = ?1",
            params![
                id,
                patch.section_id,
                patch.title,
                patch.url,
                patch.description,
                patch.icon_url,
                sort_order,
                patch.is_visible,
            ],
        )?;
        self.require_link(id)
    }

    pub fn delete_link(&self, id: i64) -> Result<Link, AgentError> {
        let link = self.require_link(id)?;
        self.conn
            .execute("DELETE FROM links WHERE id = ?1", params![id])?;
        Ok(link)
    }

    fn require_link(&self, id: i64) -> Result<Link, AgentError> {
        self.get_link(id)?
            .ok_or(AgentError::NotFound { entity: "link", id })
    }

    // ─── Site Config ────────────────────────────────────────────────────

    pub fn get_site_config(&self) -> Result<SiteConfig, AgentError> {
        let config = self.conn.query_row(
            "SELECT site_title, site_description, hero_title, hero_subtitle,
                    footer_text, theme_color, contact_email, updated_at
             FROM site_config WHERE id = 1",
            [],
            |row| {
                Ok(SiteConfig {
                    site_title: row.get(0)?,
                    site_description: row.get(1)?,
                    hero_title: row.get(2)?,
                    hero_subtitle: row.get(3)?,
                    footer_text: row.get(4)?,
                    theme_color: row.get(5)?,
                    contact_email: row.get(6)?,
                    updated_at: row.get(7)?,
                })
            },
        )?;
        Ok(config)
    }

    pub fn update_site_config(&self, patch: &SiteConfigPatch) -> Result<SiteConfig, AgentError> {
        self.conn.execute(
            "UPDATE site_config SET
                site_title = COALESCE(?1, site_title),
                site_description = COALESCE(?2, site_description),
                hero_title = COALESCE(?3, hero_title),
                hero_subtitle = COALESCE(?4, hero_subtitle),
                footer_text = COALESCE(?5, footer_text),
                theme_color = COALESCE(?6, theme_color),
                contact_email = COALESCE(?7, contact_email),
                updated_at = datetime('now')
             WHERE id = 1",
            params![
                patch.site_title,
                patch.site_description,
                patch.hero_title,
                patch.hero_subtitle,
                patch.footer_text,
                patch.theme_color,
                patch.contact_email,
            ],
        )?;
        self.get_site_config()
    }

    // ─── Audit Log ──────────────────────────────────────────────────────

    /// Append a row to the audit log.
    pub fn insert_audit_entry(
        &self,
        request_id: &str,
        tool_name: &str,
        arguments: &serde_json::Value,
        result: Option<&serde_json::Value>,
        status: AuditStatus,
        execution_time_ms: u64,
    ) -> Result<i64, AgentError> {
        let args_json = serde_json::to_string(arguments)?;
        let result_json = result.map(serde_json::to_string).transpose()?;

        self.conn.execute(
            "INSERT INTO audit_log
             (request_id, timestamp, tool_name, arguments, result, result_status, execution_time_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                request_id,
                chrono::Utc::now().to_rfc3339(),
                tool_name,
                args_json,
                result_json,
                status.as_str(),
                execution_time_ms as i64,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Audit rows written for one request, oldest first.
    #[cfg(test)]
    pub(crate) fn get_audit_entries(&self, request_id: &str) -> Result<Vec<AuditEntry>, AgentError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, request_id, timestamp, tool_name, arguments, result,
                    result_status, execution_time_ms
             FROM audit_log WHERE request_id = ?1 ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![request_id], |row| {
            let args: Option<String> = row.get(4)?;
            let result: Option<String> = row.get(5)?;
            let status: String = row.get(6)?;
            Ok(AuditEntry {
                id: row.get(0)?,
                request_id: row.get(1)?,
                timestamp: row.get(2)?,
                tool_name: row.get(3)?,
                arguments: args
                    .and_then(|s| serde_json::from_str(&s).ok())
                    .unwrap_or(serde_json::Value::Null),
                result: result.and_then(|s| serde_json::from_str(&s).ok()),
                result_status: AuditStatus::parse(&status),
                execution_time_ms: row.get::<_, i64>(7)? as u64,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

// ─── Row Mapping ────────────────────────────────────────────────────────────

fn row_to_section(row: &Row<'_>) -> rusqlite::Result<Section> {
    Ok(Section {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        icon: row.get(3)?,
        sort_order: row.get(4)?,
        is_visible: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn row_to_link(row: &Row<'_>) -> rusqlite::Result<Link> {
    Ok(Link {
        id: row.get(0)?,
        section_id: row.get(1)?,
        title: row.get(2)?,
        url: row.get(3)?,
        description: row.get(4)?,
        icon_url: row.get(5)?,
        sort_order: row.get(6)?,
        is_visible: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

// ─── Tests ──────────────────────────────────────────────────────────────────

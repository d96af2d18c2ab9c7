//! Storage layer for Plancanvas data.
//!
//! This module handles persistence of canvases, shares, save slots and the
//! audit trail.
//!
//! ## Layout
//!
//! - `store.db` (SQLite) holds every table; nodes and edges are stored as
//!   JSON text on the canvas and slot rows
//! - The local backup ring lives beside it under `backups/` (see
//!   [`crate::backup`])
//!
//! A [`SqliteStore`] handle is bound to one [`Principal`]. Calls made
//! without a principal fail with [`Error::Auth`] before any query runs.
//! Handles are cheap to clone and share one connection.

pub mod backend;

pub use backend::{
    AuditQuery, AuditSink, CanvasRepository, CanvasSummary, LoadedCanvas, UpsertAction,
    UpsertOutcome,
};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing::{debug, info, warn};

use crate::models::{
    AuditEvent, Edge, EventType, GraphSnapshot, Node, PermissionLevel, SaveSlot, SharePermission,
    SlotSummary,
};
use crate::permissions::{self, Operation, Role};
use crate::{Error, Result};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "PLANCANVAS_DATA_DIR";

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    /// Lower-cased; matched against share rows
    pub email: String,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into().trim().to_lowercase(),
        }
    }
}

/// SQLite-backed canvas store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    principal: Option<Principal>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        debug!(path = %path.display(), "opened canvas store");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            principal: None,
        })
    }

    /// A handle on the same database acting as `principal`.
    pub fn with_principal(&self, principal: Principal) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            principal: Some(principal),
        }
    }

    /// A handle on the same database with no session.
    pub fn anonymous(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            principal: None,
        }
    }

    pub fn principal(&self) -> Result<&Principal> {
        self.principal.as_ref().ok_or(Error::Auth)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Persistence("store connection lock poisoned".to_string()))
    }

    /// Initialize the SQLite schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS canvases (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL,
                nodes TEXT NOT NULL DEFAULT '[]',
                edges TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_canvases_owner ON canvases(owner_id, updated_at);

            CREATE TABLE IF NOT EXISTS canvas_shares (
                canvas_id TEXT NOT NULL,
                shared_with_email TEXT NOT NULL,
                permission_level TEXT NOT NULL,
                shared_by_user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (canvas_id, shared_with_email),
                FOREIGN KEY (canvas_id) REFERENCES canvases(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_canvas_shares_email ON canvas_shares(shared_with_email);

            CREATE TABLE IF NOT EXISTS save_slots (
                canvas_id TEXT NOT NULL,
                slot_number INTEGER NOT NULL,
                nodes TEXT NOT NULL,
                edges TEXT NOT NULL,
                saved_at TEXT NOT NULL,
                PRIMARY KEY (canvas_id, slot_number),
                FOREIGN KEY (canvas_id) REFERENCES canvases(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS audit_events (
                id TEXT PRIMARY KEY,
                canvas_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                target_id TEXT NOT NULL,
                event_data TEXT NOT NULL DEFAULT 'null',
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_events_canvas ON audit_events(canvas_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_audit_events_type ON audit_events(event_type);
            "#,
        )?;

        Self::run_migrations(conn)?;

        Ok(())
    }

    /// Run database migrations for schema changes.
    fn run_migrations(conn: &Connection) -> Result<()> {
        // Slot names arrived after the first release of the slots table
        let has_slot_name: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM pragma_table_info('save_slots') WHERE name = 'name'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if !has_slot_name {
            conn.execute("ALTER TABLE save_slots ADD COLUMN name TEXT", [])?;
        }

        Ok(())
    }

    /// Resolve the caller's role, hiding canvases they cannot see.
    fn role_on(conn: &Connection, principal: &Principal, canvas_id: &str) -> Result<Role> {
        let owner: Option<String> = conn
            .query_row(
                "SELECT owner_id FROM canvases WHERE id = ?1",
                [canvas_id],
                |row| row.get(0),
            )
            .optional()?;

        let not_found = || Error::NotFound(format!("Canvas not found: {}", canvas_id));
        let owner = owner.ok_or_else(not_found)?;
        if owner == principal.user_id {
            return Ok(Role::Owner);
        }

        let level: Option<String> = conn
            .query_row(
                "SELECT permission_level FROM canvas_shares
                 WHERE canvas_id = ?1 AND shared_with_email = ?2",
                params![canvas_id, principal.email],
                |row| row.get(0),
            )
            .optional()?;

        level
            .and_then(|l| PermissionLevel::parse(&l))
            .map(Role::from)
            .ok_or_else(not_found)
    }

    // === Canvas Operations ===

    /// Save a snapshot, creating the canvas when needed.
    pub fn upsert_canvas(
        &self,
        canvas_id: Option<&str>,
        snapshot: &GraphSnapshot,
    ) -> Result<UpsertOutcome> {
        let principal = self.principal()?;
        let conn = self.conn()?;
        let now = timestamp(Utc::now());
        let nodes = serde_json::to_string(&snapshot.nodes)?;
        let edges = serde_json::to_string(&snapshot.edges)?;

        let target = match canvas_id {
            Some(id) => {
                let role = Self::role_on(&conn, principal, id)?;
                permissions::require(role, Operation::Mutate, "save canvas")?;
                Some(id.to_string())
            }
            None => conn
                .query_row(
                    "SELECT id FROM canvases WHERE owner_id = ?1
                     ORDER BY updated_at DESC LIMIT 1",
                    [&principal.user_id],
                    |row| row.get(0),
                )
                .optional()?,
        };

        match target {
            Some(id) => {
                conn.execute(
                    "UPDATE canvases
                     SET nodes = ?1, edges = ?2, title = COALESCE(?3, title), updated_at = ?4
                     WHERE id = ?5",
                    params![nodes, edges, snapshot.title, now, id],
                )?;
                debug!(canvas_id = %id, "canvas updated");
                Ok(UpsertOutcome {
                    canvas_id: id,
                    action: UpsertAction::Updated,
                })
            }
            None => Self::insert_canvas(&conn, principal, snapshot),
        }
    }

    /// Always create a new canvas owned by the caller.
    pub fn create_canvas(&self, snapshot: &GraphSnapshot) -> Result<UpsertOutcome> {
        let principal = self.principal()?;
        let conn = self.conn()?;
        Self::insert_canvas(&conn, principal, snapshot)
    }

    fn insert_canvas(
        conn: &Connection,
        principal: &Principal,
        snapshot: &GraphSnapshot,
    ) -> Result<UpsertOutcome> {
        let id = generate_canvas_id();
        let now = timestamp(Utc::now());
        let title = snapshot
            .title
            .clone()
            .unwrap_or_else(|| crate::models::DEFAULT_TITLE.to_string());
        conn.execute(
            "INSERT INTO canvases (id, owner_id, title, nodes, edges, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                id,
                principal.user_id,
                title,
                serde_json::to_string(&snapshot.nodes)?,
                serde_json::to_string(&snapshot.edges)?,
                now
            ],
        )?;
        info!(canvas_id = %id, owner = %principal.user_id, "canvas created");
        Ok(UpsertOutcome {
            canvas_id: id,
            action: UpsertAction::Created,
        })
    }

    /// Load a canvas, or the caller's most recent one.
    pub fn load_canvas(&self, canvas_id: Option<&str>) -> Result<LoadedCanvas> {
        let principal = self.principal()?;
        let conn = self.conn()?;

        let id = match canvas_id {
            Some(id) => {
                Self::role_on(&conn, principal, id)?;
                id.to_string()
            }
            None => {
                let latest: Option<String> = conn
                    .query_row(
                        "SELECT id FROM canvases WHERE owner_id = ?1
                         ORDER BY updated_at DESC LIMIT 1",
                        [&principal.user_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                match latest {
                    Some(id) => id,
                    None => return Ok(LoadedCanvas::empty()),
                }
            }
        };

        let (title, nodes, edges, updated_at): (String, String, String, String) = conn
            .query_row(
                "SELECT title, nodes, edges, updated_at FROM canvases WHERE id = ?1",
                [&id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        Ok(LoadedCanvas {
            canvas_id: Some(id),
            title: Some(title),
            nodes: serde_json::from_str::<Vec<Node>>(&nodes)?,
            edges: serde_json::from_str::<Vec<Edge>>(&edges)?,
            last_modified: Some(parse_timestamp(&updated_at)?),
            exists: true,
        })
    }

    /// The caller's role on a canvas.
    pub fn canvas_role(&self, canvas_id: &str) -> Result<Role> {
        let principal = self.principal()?;
        let conn = self.conn()?;
        Self::role_on(&conn, principal, canvas_id)
    }

    /// Canvases the caller owns or can see through a share, newest first.
    pub fn canvases(&self) -> Result<Vec<CanvasSummary>> {
        let principal = self.principal()?;
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT c.id, c.title, c.nodes, c.updated_at, c.owner_id, s.permission_level
             FROM canvases c
             LEFT JOIN canvas_shares s
               ON s.canvas_id = c.id AND s.shared_with_email = ?2
             WHERE c.owner_id = ?1 OR s.shared_with_email IS NOT NULL
             ORDER BY c.updated_at DESC",
        )?;
        let rows: Vec<(String, String, String, String, String, Option<String>)> = stmt
            .query_map(params![principal.user_id, principal.email], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?
            .collect::<rusqlite::Result<_>>()?;

        let mut summaries = Vec::new();
        for (id, title, nodes, updated_at, owner, level) in rows {
            let role = if owner == principal.user_id {
                Role::Owner
            } else {
                match level.as_deref().and_then(PermissionLevel::parse) {
                    Some(level) => Role::from(level),
                    None => continue,
                }
            };
            let node_count = serde_json::from_str::<Vec<Node>>(&nodes)
                .map(|n| n.len())
                .unwrap_or(0);
            summaries.push(CanvasSummary {
                canvas_id: id,
                title,
                role,
                node_count,
                updated_at: parse_timestamp(&updated_at)?,
            });
        }
        Ok(summaries)
    }

    // === Share Operations ===

    /// List collaborators of a canvas (owner only).
    pub fn shares(&self, canvas_id: &str) -> Result<Vec<SharePermission>> {
        let principal = self.principal()?;
        let conn = self.conn()?;
        let role = Self::role_on(&conn, principal, canvas_id)?;
        permissions::require_owner(role, "list shares")?;

        let mut stmt = conn.prepare(
            "SELECT shared_with_email, permission_level, shared_by_user_id
             FROM canvas_shares WHERE canvas_id = ?1
             ORDER BY created_at ASC, shared_with_email ASC",
        )?;
        let rows: Vec<(String, String, String)> = stmt
            .query_map([canvas_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<rusqlite::Result<_>>()?;

        let mut shares = Vec::new();
        for (email, level, shared_by) in rows {
            let level = PermissionLevel::parse(&level).ok_or_else(|| {
                Error::Persistence(format!("Unknown permission level stored: {}", level))
            })?;
            shares.push(SharePermission {
                canvas_id: canvas_id.to_string(),
                shared_with_email: email,
                permission_level: level,
                shared_by_user_id: shared_by,
            });
        }
        Ok(shares)
    }

    /// Grant or change a collaborator's access (owner only).
    pub fn share(
        &self,
        canvas_id: &str,
        email: &str,
        level: PermissionLevel,
    ) -> Result<SharePermission> {
        let principal = self.principal()?;
        let email = normalize_email(email)?;
        if email == principal.email {
            return Err(Error::Validation(
                "Cannot share a canvas with yourself".to_string(),
            ));
        }

        let conn = self.conn()?;
        let role = Self::role_on(&conn, principal, canvas_id)?;
        permissions::require_owner(role, "share this canvas")?;

        conn.execute(
            "INSERT INTO canvas_shares
                (canvas_id, shared_with_email, permission_level, shared_by_user_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(canvas_id, shared_with_email) DO UPDATE SET
                permission_level = excluded.permission_level,
                shared_by_user_id = excluded.shared_by_user_id",
            params![
                canvas_id,
                email,
                level.as_str(),
                principal.user_id,
                timestamp(Utc::now())
            ],
        )?;
        info!(canvas_id, email = %email, level = %level, "canvas shared");

        Ok(SharePermission {
            canvas_id: canvas_id.to_string(),
            shared_with_email: email,
            permission_level: level,
            shared_by_user_id: principal.user_id.clone(),
        })
    }

    /// Revoke a collaborator's access (owner only).
    pub fn unshare(&self, canvas_id: &str, email: &str) -> Result<()> {
        let principal = self.principal()?;
        let email = normalize_email(email)?;
        let conn = self.conn()?;
        let role = Self::role_on(&conn, principal, canvas_id)?;
        permissions::require_owner(role, "remove shares")?;

        let removed = conn.execute(
            "DELETE FROM canvas_shares WHERE canvas_id = ?1 AND shared_with_email = ?2",
            params![canvas_id, email],
        )?;
        if removed == 0 {
            return Err(Error::NotFound(format!(
                "Share not found: {} on {}",
                email, canvas_id
            )));
        }
        info!(canvas_id, email = %email, "share removed");
        Ok(())
    }

    // === Slot Operations ===

    /// Create or overwrite a numbered slot.
    pub fn write_slot(&self, slot: &SaveSlot) -> Result<()> {
        let principal = self.principal()?;
        let conn = self.conn()?;
        let role = Self::role_on(&conn, principal, &slot.canvas_id)?;
        permissions::require(role, Operation::Mutate, "save to slot")?;

        conn.execute(
            "INSERT INTO save_slots (canvas_id, slot_number, name, nodes, edges, saved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(canvas_id, slot_number) DO UPDATE SET
                name = excluded.name,
                nodes = excluded.nodes,
                edges = excluded.edges,
                saved_at = excluded.saved_at",
            params![
                slot.canvas_id,
                slot.slot_number,
                slot.name,
                serde_json::to_string(&slot.nodes)?,
                serde_json::to_string(&slot.edges)?,
                timestamp(slot.saved_at)
            ],
        )?;
        Ok(())
    }

    pub fn read_slot(&self, canvas_id: &str, slot_number: u32) -> Result<SaveSlot> {
        let principal = self.principal()?;
        let conn = self.conn()?;
        Self::role_on(&conn, principal, canvas_id)?;

        let row: Option<(Option<String>, String, String, String)> = conn
            .query_row(
                "SELECT name, nodes, edges, saved_at FROM save_slots
                 WHERE canvas_id = ?1 AND slot_number = ?2",
                params![canvas_id, slot_number],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let (name, nodes, edges, saved_at) = row.ok_or_else(|| {
            Error::NotFound(format!("Slot {} is empty on {}", slot_number, canvas_id))
        })?;

        Ok(SaveSlot {
            canvas_id: canvas_id.to_string(),
            slot_number,
            name,
            nodes: serde_json::from_str(&nodes)?,
            edges: serde_json::from_str(&edges)?,
            saved_at: parse_timestamp(&saved_at)?,
        })
    }

    pub fn slots(&self, canvas_id: &str) -> Result<Vec<SlotSummary>> {
        let principal = self.principal()?;
        let conn = self.conn()?;
        Self::role_on(&conn, principal, canvas_id)?;

        let mut stmt = conn.prepare(
            "SELECT slot_number, name, nodes, edges, saved_at FROM save_slots
             WHERE canvas_id = ?1 ORDER BY slot_number ASC",
        )?;
        let rows: Vec<(u32, Option<String>, String, String, String)> = stmt
            .query_map([canvas_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .collect::<rusqlite::Result<_>>()?;

        let mut summaries = Vec::new();
        for (slot_number, name, nodes, edges, saved_at) in rows {
            summaries.push(SlotSummary {
                slot_number,
                name,
                saved_at: parse_timestamp(&saved_at)?,
                node_count: serde_json::from_str::<Vec<Node>>(&nodes)?.len(),
                edge_count: serde_json::from_str::<Vec<Edge>>(&edges)?.len(),
            });
        }
        Ok(summaries)
    }

    pub fn clear_slot(&self, canvas_id: &str, slot_number: u32) -> Result<()> {
        let principal = self.principal()?;
        let conn = self.conn()?;
        let role = Self::role_on(&conn, principal, canvas_id)?;
        permissions::require(role, Operation::Mutate, "delete slot")?;

        let removed = conn.execute(
            "DELETE FROM save_slots WHERE canvas_id = ?1 AND slot_number = ?2",
            params![canvas_id, slot_number],
        )?;
        if removed == 0 {
            return Err(Error::NotFound(format!(
                "Slot {} is empty on {}",
                slot_number, canvas_id
            )));
        }
        Ok(())
    }

    // === Audit Operations ===

    fn insert_event(&self, event: &AuditEvent) -> Result<()> {
        let principal = self.principal()?;
        let conn = self.conn()?;
        let role = Self::role_on(&conn, principal, &event.canvas_id)?;
        permissions::require(role, Operation::Mutate, "record event")?;

        conn.execute(
            "INSERT INTO audit_events
                (id, canvas_id, user_id, event_type, target_id, event_data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.id,
                event.canvas_id,
                event.user_id,
                event.event_type.as_str(),
                event.target_id,
                serde_json::to_string(&event.event_data)?,
                timestamp(event.created_at)
            ],
        )?;
        Ok(())
    }

    fn query_events(&self, canvas_id: &str, query: &AuditQuery) -> Result<Vec<AuditEvent>> {
        let principal = self.principal()?;
        let conn = self.conn()?;
        Self::role_on(&conn, principal, canvas_id)?;

        let mut sql = String::from(
            "SELECT id, user_id, event_type, target_id, event_data, created_at
             FROM audit_events WHERE canvas_id = ?",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(canvas_id.to_string())];

        if !query.types.is_empty() {
            let placeholders = vec!["?"; query.types.len()].join(", ");
            sql.push_str(&format!(" AND event_type IN ({})", placeholders));
            for event_type in &query.types {
                params_vec.push(Box::new(event_type.as_str().to_string()));
            }
        }
        if let Some(from) = query.from {
            sql.push_str(" AND created_at >= ?");
            params_vec.push(Box::new(timestamp(from)));
        }
        if let Some(to) = query.to {
            sql.push_str(" AND created_at < ?");
            params_vec.push(Box::new(timestamp(to)));
        }

        sql.push_str(" ORDER BY created_at DESC, rowid DESC LIMIT ?");
        params_vec.push(Box::new(query.limit as i64));

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<(String, String, String, String, String, String)> = stmt
            .query_map(params_refs.as_slice(), |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?
            .collect::<rusqlite::Result<_>>()?;

        let mut events = Vec::new();
        for (id, user_id, event_type, target_id, event_data, created_at) in rows {
            let Some(event_type) = EventType::parse(&event_type) else {
                warn!(canvas_id, event_id = %id, event_type = %event_type, "skipping audit row with unknown type");
                continue;
            };
            events.push(AuditEvent {
                id,
                canvas_id: canvas_id.to_string(),
                user_id,
                event_type,
                target_id,
                event_data: serde_json::from_str(&event_data)?,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(events)
    }
}

#[async_trait]
impl CanvasRepository for SqliteStore {
    async fn upsert(
        &self,
        canvas_id: Option<&str>,
        snapshot: &GraphSnapshot,
    ) -> Result<UpsertOutcome> {
        self.upsert_canvas(canvas_id, snapshot)
    }

    async fn load(&self, canvas_id: Option<&str>) -> Result<LoadedCanvas> {
        self.load_canvas(canvas_id)
    }

    async fn role_for(&self, canvas_id: &str) -> Result<Role> {
        self.canvas_role(canvas_id)
    }

    async fn list_canvases(&self) -> Result<Vec<CanvasSummary>> {
        self.canvases()
    }

    async fn list_shares(&self, canvas_id: &str) -> Result<Vec<SharePermission>> {
        self.shares(canvas_id)
    }

    async fn add_or_update_share(
        &self,
        canvas_id: &str,
        email: &str,
        level: PermissionLevel,
    ) -> Result<SharePermission> {
        self.share(canvas_id, email, level)
    }

    async fn remove_share(&self, canvas_id: &str, email: &str) -> Result<()> {
        self.unshare(canvas_id, email)
    }

    async fn save_slot(&self, slot: &SaveSlot) -> Result<()> {
        self.write_slot(slot)
    }

    async fn load_slot(&self, canvas_id: &str, slot_number: u32) -> Result<SaveSlot> {
        self.read_slot(canvas_id, slot_number)
    }

    async fn list_slots(&self, canvas_id: &str) -> Result<Vec<SlotSummary>> {
        self.slots(canvas_id)
    }

    async fn delete_slot(&self, canvas_id: &str, slot_number: u32) -> Result<()> {
        self.clear_slot(canvas_id, slot_number)
    }
}

impl AuditSink for SqliteStore {
    fn append(&self, event: &AuditEvent) -> Result<()> {
        self.insert_event(event)
    }

    fn list(&self, canvas_id: &str, query: &AuditQuery) -> Result<Vec<AuditEvent>> {
        self.query_events(canvas_id, query)
    }
}

/// Get the data directory holding `store.db`, `config.kdl` and `backups/`.
///
/// `PLANCANVAS_DATA_DIR` wins; otherwise `<XDG data dir>/plancanvas`.
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let data_dir = dirs::data_dir()
        .ok_or_else(|| Error::Config("Could not determine data directory".to_string()))?;
    Ok(data_dir.join("plancanvas"))
}

/// Short, filesystem-safe digest of an identifier.
pub fn short_hash(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let hash_hex = format!("{:x}", hasher.finalize());
    hash_hex[..16].to_string()
}

/// Generate a new canvas id.
pub fn generate_canvas_id() -> String {
    format!("cv-{}", uuid::Uuid::new_v4().simple())
}

/// Fixed-width RFC 3339 so stored timestamps sort lexically.
pub fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Persistence(format!("Invalid stored timestamp {}: {}", s, e)))
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is a valid regex")
    })
}

/// Lower-case and validate a collaborator email.
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    if !email_pattern().is_match(&email) {
        return Err(Error::Validation(format!("Invalid email address: {}", email)));
    }
    Ok(email)
}

//! Store contracts consumed by the autosave scheduler, slot manager and
//! event tracker.
//!
//! - `CanvasRepository` - Canvas documents, shares and save slots (async; the
//!   store may sit across a network)
//! - `AuditSink` - Append-only audit trail (synchronous, written at the call
//!   site of each mutation)
//!
//! Responses are typed structs and errors are `crate::Error` variants; no
//! call hands back loosely shaped JSON.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::Result;
use crate::models::{
    AuditEvent, Edge, EventType, GraphSnapshot, Node, PermissionLevel, SaveSlot, SharePermission,
    SlotSummary,
};
use crate::permissions::Role;

/// What an upsert did to the canvas row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertAction {
    Created,
    Updated,
}

impl fmt::Display for UpsertAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpsertAction::Created => write!(f, "created"),
            UpsertAction::Updated => write!(f, "updated"),
        }
    }
}

/// Result of a successful upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertOutcome {
    pub canvas_id: String,
    pub action: UpsertAction,
}

/// Result of a load. `exists == false` means an empty, never-saved canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedCanvas {
    pub canvas_id: Option<String>,
    pub title: Option<String>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub last_modified: Option<DateTime<Utc>>,
    pub exists: bool,
}

impl LoadedCanvas {
    /// An empty document that has never been saved.
    pub fn empty() -> Self {
        Self {
            canvas_id: None,
            title: None,
            nodes: Vec::new(),
            edges: Vec::new(),
            last_modified: None,
            exists: false,
        }
    }
}

/// Canvas listing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasSummary {
    pub canvas_id: String,
    pub title: String,
    pub role: Role,
    pub node_count: usize,
    pub updated_at: DateTime<Utc>,
}

/// Filters for reading the audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditQuery {
    /// Event types to include; empty means every type
    pub types: BTreeSet<EventType>,
    /// Inclusive lower bound
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound
    pub to: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            types: BTreeSet::new(),
            from: None,
            to: None,
            limit: crate::audit::DEFAULT_EVENT_LIMIT,
        }
    }
}

impl AuditQuery {
    /// Whether an event passes the type and time filters (limit aside).
    pub fn matches(&self, event: &AuditEvent) -> bool {
        if !self.types.is_empty() && !self.types.contains(&event.event_type) {
            return false;
        }
        if let Some(from) = self.from {
            if event.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if event.created_at >= to {
                return false;
            }
        }
        true
    }
}

/// Canvas documents, shares and save slots for one authenticated caller.
#[async_trait]
pub trait CanvasRepository: Send + Sync {
    /// Save the full graph. `None` targets the caller's most recently
    /// modified canvas, creating one if the caller owns none.
    async fn upsert(&self, canvas_id: Option<&str>, snapshot: &GraphSnapshot)
    -> Result<UpsertOutcome>;

    /// Load a canvas, or the caller's most recent one when `canvas_id` is `None`.
    async fn load(&self, canvas_id: Option<&str>) -> Result<LoadedCanvas>;

    /// The caller's role on a canvas.
    async fn role_for(&self, canvas_id: &str) -> Result<Role>;

    /// Every canvas the caller owns or has been shared.
    async fn list_canvases(&self) -> Result<Vec<CanvasSummary>>;

    /// Owner only.
    async fn list_shares(&self, canvas_id: &str) -> Result<Vec<SharePermission>>;

    /// Owner only. Upserts keyed by email.
    async fn add_or_update_share(
        &self,
        canvas_id: &str,
        email: &str,
        level: PermissionLevel,
    ) -> Result<SharePermission>;

    /// Owner only.
    async fn remove_share(&self, canvas_id: &str, email: &str) -> Result<()>;

    /// Create or overwrite a numbered slot.
    async fn save_slot(&self, slot: &SaveSlot) -> Result<()>;

    async fn load_slot(&self, canvas_id: &str, slot_number: u32) -> Result<SaveSlot>;

    async fn list_slots(&self, canvas_id: &str) -> Result<Vec<SlotSummary>>;

    async fn delete_slot(&self, canvas_id: &str, slot_number: u32) -> Result<()>;
}

/// Append-only audit trail.
pub trait AuditSink: Send + Sync {
    fn append(&self, event: &AuditEvent) -> Result<()>;

    /// Matching events, newest first, at most `query.limit`.
    fn list(&self, canvas_id: &str, query: &AuditQuery) -> Result<Vec<AuditEvent>>;
}

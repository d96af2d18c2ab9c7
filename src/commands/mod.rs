//! Command implementations for the `pc` CLI.
//!
//! Each command opens an [`EditingSession`], applies one change, closes the
//! session (which flushes the autosave) and returns a result that renders
//! as JSON or as human-readable text through [`Output`]. Read-only commands
//! never create a canvas: a caller with none gets an empty result.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::audit::{DateRange, DayGroup, EventFilter};
use crate::autosave::SaveStatus;
use crate::backup::BackupRing;
use crate::config::ResolvedConfig;
use crate::exchange;
use crate::models::{
    Edge, EventType, GraphDocument, GraphSnapshot, GraphStats, Node, NodeKind, PermissionLevel,
    Position, Prompt, SharePermission, SlotSummary, prompt_handle,
};
use crate::permissions::Role;
use crate::session::{EditingSession, Services, SessionConfig, TimerAction, generate_id};
use crate::storage::{CanvasSummary, SqliteStore, UpsertAction};
use crate::{Error, Result};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    fn to_json(&self) -> String;
    fn to_human(&self) -> String;
}

fn to_json_string<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| json!({ "error": e.to_string() }).to_string())
}

/// Everything a command needs to open a session.
pub struct Context {
    pub store: SqliteStore,
    pub data_dir: PathBuf,
    pub config: ResolvedConfig,
    pub user_id: String,
    pub canvas: Option<String>,
}

impl Context {
    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    pub async fn open_session(&self) -> Result<EditingSession> {
        let backups = BackupRing::open(&self.backups_dir(), self.config.backup_cap())?;
        let services = Services::from_store(self.store.clone(), backups);
        let config = SessionConfig {
            debounce: self.config.debounce(),
            slot_count: self.config.slot_count(),
            on_status: None,
        };
        EditingSession::open(&self.user_id, self.canvas.as_deref(), services, config).await
    }

    /// Open a session for reading, or `None` when the caller has no canvas
    /// yet and did not name one.
    pub async fn open_existing(&self) -> Result<Option<EditingSession>> {
        if self.canvas.is_none() && !self.store.load_canvas(None)?.exists {
            debug!(user_id = %self.user_id, "no canvas yet; nothing to read");
            return Ok(None);
        }
        self.open_session().await.map(Some)
    }
}

/// Close a session, failing if pending changes could not be saved.
async fn finish(session: EditingSession) -> Result<SaveStatus> {
    let canvas_id = session.canvas_id().to_string();
    let status = session.close().await;
    if status == SaveStatus::Error {
        return Err(Error::Persistence(format!(
            "changes to {} could not be saved",
            canvas_id
        )));
    }
    debug!(canvas_id = %canvas_id, status = %status, "command finished");
    Ok(status)
}

/// Close a session whatever `result` holds, then return the body's error
/// first and the close error second.
async fn close_after<T>(session: EditingSession, result: Result<T>) -> Result<(T, SaveStatus)> {
    let status = finish(session).await;
    let value = result?;
    Ok((value, status?))
}

// === Canvas ===

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasView {
    /// `None` until the caller's first change creates a canvas
    pub canvas_id: Option<String>,
    pub title: String,
    pub role: Role,
    pub last_modified_at: DateTime<Utc>,
    pub stats: GraphStats,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Output for CanvasView {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![
            format!(
                "{} ({})",
                self.title,
                self.canvas_id.as_deref().unwrap_or("not saved yet")
            ),
            format!(
                "  role: {}  blocks: {} ({} goals, {} tasks)  connections: {}",
                self.role,
                self.stats.total_blocks,
                self.stats.goals,
                self.stats.tasks,
                self.stats.connections
            ),
        ];
        for node in &self.nodes {
            lines.push(format!(
                "  [{}] {} {} at ({}, {})",
                node.id,
                node.kind,
                node.display_title(),
                node.position.x,
                node.position.y
            ));
            for prompt in &node.prompts {
                let mark = if prompt.completed { "x" } else { " " };
                lines.push(format!("      [{}] {} ({})", mark, prompt.content, prompt.id));
            }
        }
        for edge in &self.edges {
            lines.push(format!(
                "  {} -> {} ({})",
                edge.source_node_id, edge.target_node_id, edge.id
            ));
        }
        lines.join("\n")
    }
}

impl CanvasView {
    fn of(doc: &GraphDocument, role: Role) -> Self {
        Self {
            canvas_id: doc.id.clone(),
            title: doc.title.clone(),
            role,
            last_modified_at: doc.last_modified_at,
            stats: doc.stats(),
            nodes: doc.nodes.clone(),
            edges: doc.edges.clone(),
        }
    }
}

pub async fn canvas_show(ctx: &Context) -> Result<CanvasView> {
    let Some(session) = ctx.open_existing().await? else {
        return Ok(CanvasView::of(&GraphDocument::new(None), Role::Owner));
    };
    let mut view = CanvasView::of(session.document(), session.role());
    view.canvas_id = Some(session.canvas_id().to_string());
    finish(session).await?;
    Ok(view)
}

#[derive(Serialize)]
pub struct CanvasList {
    pub canvases: Vec<CanvasSummary>,
}

impl Output for CanvasList {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        if self.canvases.is_empty() {
            return "No canvases.".to_string();
        }
        self.canvases
            .iter()
            .map(|c| {
                format!(
                    "{}  {}  [{}]  {} blocks  updated {}",
                    c.canvas_id,
                    c.title,
                    c.role,
                    c.node_count,
                    c.updated_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn canvas_list(ctx: &Context) -> Result<CanvasList> {
    Ok(CanvasList {
        canvases: ctx.store.canvases()?,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasCreated {
    pub canvas_id: String,
    pub title: String,
}

impl Output for CanvasCreated {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        format!("Created canvas {} ({})", self.title, self.canvas_id)
    }
}

pub fn canvas_create(ctx: &Context, title: Option<String>) -> Result<CanvasCreated> {
    let title = title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| crate::models::DEFAULT_TITLE.to_string());
    let snapshot = GraphSnapshot {
        title: Some(title.clone()),
        ..GraphSnapshot::default()
    };
    let outcome = ctx.store.create_canvas(&snapshot)?;
    Ok(CanvasCreated {
        canvas_id: outcome.canvas_id,
        title,
    })
}

/// Generic acknowledgement of a saved change.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Saved {
    pub canvas_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<UpsertAction>,
    pub status: SaveStatus,
}

impl Output for Saved {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        format!("{} [{}]", self.message, self.status)
    }
}

impl Saved {
    fn new(canvas_id: &str, message: String, status: SaveStatus) -> Self {
        Self {
            canvas_id: canvas_id.to_string(),
            message,
            action: None,
            status,
        }
    }

    fn with_action(mut self, action: UpsertAction) -> Self {
        self.action = Some(action);
        self
    }
}

pub async fn canvas_title(ctx: &Context, title: &str) -> Result<Saved> {
    let mut session = ctx.open_session().await?;
    let result = session.set_title(title);
    let canvas_id = session.canvas_id().to_string();
    let (_, status) = close_after(session, result).await?;
    Ok(Saved::new(
        &canvas_id,
        format!("Renamed canvas to {}", title.trim()),
        status,
    ))
}

/// Raw export text; identical in both output modes.
pub struct ExportText(pub String);

impl Output for ExportText {
    fn to_json(&self) -> String {
        self.0.clone()
    }

    fn to_human(&self) -> String {
        self.0.clone()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exported {
    pub canvas_id: Option<String>,
    pub path: String,
}

impl Output for Exported {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        format!("Exported to {}", self.path)
    }
}

fn export_text(doc: &GraphDocument, outline: bool) -> Result<String> {
    if outline {
        Ok(exchange::to_outline(doc))
    } else {
        exchange::to_json_string(doc)
    }
}

pub async fn canvas_export(
    ctx: &Context,
    outline: bool,
    output: Option<&Path>,
) -> Result<Box<dyn Output>> {
    let (canvas_id, text) = match ctx.open_existing().await? {
        Some(session) => {
            let text = export_text(session.document(), outline);
            let canvas_id = session.canvas_id().to_string();
            let (text, _) = close_after(session, text).await?;
            (Some(canvas_id), text)
        }
        None => (None, export_text(&GraphDocument::new(None), outline)?),
    };

    match output {
        Some(path) => {
            fs::write(path, &text)?;
            Ok(Box::new(Exported {
                canvas_id,
                path: path.display().to_string(),
            }))
        }
        None => Ok(Box::new(ExportText(text))),
    }
}

pub async fn canvas_import(ctx: &Context, file: &Path, confirmed: bool) -> Result<Saved> {
    let text = fs::read_to_string(file)?;
    // Check the file before asking for confirmation so bad input fails first
    let imported = crate::exchange::from_json(&text)?;
    if !confirmed {
        return Err(Error::Validation(format!(
            "Importing replaces all {} blocks of the current canvas; re-run with --yes to confirm",
            imported.nodes.len()
        )));
    }

    let mut session = ctx.open_session().await?;
    let result = session.import_json(&text).await;
    let (outcome, status) = close_after(session, result).await?;
    Ok(Saved::new(
        &outcome.canvas_id,
        format!(
            "Imported {} blocks and {} connections",
            imported.nodes.len(),
            imported.edges.len()
        ),
        status,
    )
    .with_action(outcome.action))
}

// === Nodes ===

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResult {
    pub canvas_id: String,
    pub node: Node,
    pub status: SaveStatus,
}

impl Output for NodeResult {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        format!(
            "{} {} ({}) at ({}, {}) [{}]",
            self.node.kind,
            self.node.display_title(),
            self.node.id,
            self.node.position.x,
            self.node.position.y,
            self.status
        )
    }
}

pub async fn node_add(
    ctx: &Context,
    id: Option<String>,
    kind: &str,
    title: Option<String>,
    position: Position,
) -> Result<NodeResult> {
    let kind = NodeKind::parse(kind)
        .ok_or_else(|| Error::Validation(format!("Unknown block kind: {}", kind)))?;
    let mut node = Node::new(id.unwrap_or_else(|| generate_id("n")), kind, position);
    if let Some(title) = title.filter(|t| !t.trim().is_empty()) {
        node = node.with_title(title.trim());
    }

    let mut session = ctx.open_session().await?;
    let result = session.add_node(node.clone());
    let canvas_id = session.canvas_id().to_string();
    let (_, status) = close_after(session, result).await?;
    Ok(NodeResult {
        canvas_id,
        node,
        status,
    })
}

pub async fn node_rename(ctx: &Context, id: &str, title: &str) -> Result<NodeResult> {
    let mut session = ctx.open_session().await?;
    let result = session.rename_node(id, title).and_then(|()| {
        session
            .document()
            .node(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Node not found: {}", id)))
    });
    let canvas_id = session.canvas_id().to_string();
    let (node, status) = close_after(session, result).await?;
    Ok(NodeResult {
        canvas_id,
        node,
        status,
    })
}

pub async fn node_delete(ctx: &Context, id: &str) -> Result<Saved> {
    let mut session = ctx.open_session().await?;
    let edges_before = session.document().edges.len();
    let result = session
        .delete_node(id)
        .map(|_| edges_before - session.document().edges.len());
    let canvas_id = session.canvas_id().to_string();
    let (removed, status) = close_after(session, result).await?;
    Ok(Saved::new(
        &canvas_id,
        format!("Deleted block {} and {} connections", id, removed),
        status,
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodesMoved {
    pub canvas_id: String,
    pub moved: Vec<String>,
    pub status: SaveStatus,
}

impl Output for NodesMoved {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Moved {} block(s): {} [{}]",
            self.moved.len(),
            self.moved.join(", "),
            self.status
        )
    }
}

pub async fn node_move(
    ctx: &Context,
    id: &str,
    position: Position,
    cascade: bool,
) -> Result<NodesMoved> {
    let mut session = ctx.open_session().await?;
    let result = if cascade {
        let moved = session.drag_node(id, position, true);
        session.end_drag();
        moved
    } else {
        session.move_node(id, position).map(|()| vec![id.to_string()])
    };
    let canvas_id = session.canvas_id().to_string();
    let (moved, status) = close_after(session, result).await?;
    Ok(NodesMoved {
        canvas_id,
        moved,
        status,
    })
}

// === Connections ===

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeResult {
    pub canvas_id: String,
    pub edge: Edge,
    pub status: SaveStatus,
}

impl Output for EdgeResult {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        format!(
            "{} -> {} ({}) [{}]",
            self.edge.source_node_id, self.edge.target_node_id, self.edge.id, self.status
        )
    }
}

pub async fn connect(
    ctx: &Context,
    id: Option<String>,
    source: &str,
    target: &str,
    source_prompt: Option<&str>,
    target_prompt: Option<&str>,
) -> Result<EdgeResult> {
    let mut edge = Edge::new(id.unwrap_or_else(|| generate_id("e")), source, target);
    edge.source_handle = source_prompt.map(prompt_handle);
    edge.target_handle = target_prompt.map(prompt_handle);

    let mut session = ctx.open_session().await?;
    let result = check_handles(
        session.document(),
        [(source, source_prompt), (target, target_prompt)],
    )
    .and_then(|()| session.connect(edge.clone()));
    let canvas_id = session.canvas_id().to_string();
    let (_, status) = close_after(session, result).await?;
    Ok(EdgeResult {
        canvas_id,
        edge,
        status,
    })
}

/// Every named prompt handle must exist on its node.
fn check_handles(doc: &GraphDocument, ends: [(&str, Option<&str>); 2]) -> Result<()> {
    for (node_id, prompt_id) in ends {
        if let Some(prompt_id) = prompt_id {
            let node = doc
                .node(node_id)
                .ok_or_else(|| Error::NotFound(format!("Node not found: {}", node_id)))?;
            if node.prompt(prompt_id).is_none() {
                return Err(Error::NotFound(format!(
                    "Prompt {} not found in {}",
                    prompt_id, node_id
                )));
            }
        }
    }
    Ok(())
}

pub async fn disconnect(ctx: &Context, edge_id: &str) -> Result<EdgeResult> {
    let mut session = ctx.open_session().await?;
    let result = session.disconnect(edge_id);
    let canvas_id = session.canvas_id().to_string();
    let (edge, status) = close_after(session, result).await?;
    Ok(EdgeResult {
        canvas_id,
        edge,
        status,
    })
}

// === Prompts ===

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResult {
    pub canvas_id: String,
    pub node_id: String,
    pub prompt: Prompt,
    pub status: SaveStatus,
}

impl Output for PromptResult {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        let mark = if self.prompt.completed { "x" } else { " " };
        format!(
            "[{}] {} ({} in {}) [{}]",
            mark, self.prompt.content, self.prompt.id, self.node_id, self.status
        )
    }
}

/// What to do to an existing prompt.
pub enum PromptChange {
    Edit(String),
    Completed(bool),
    Delete,
}

pub async fn prompt_add(ctx: &Context, node_id: &str, content: &str) -> Result<PromptResult> {
    let mut session = ctx.open_session().await?;
    let result = session.add_prompt(node_id, content);
    let canvas_id = session.canvas_id().to_string();
    let (prompt, status) = close_after(session, result).await?;
    Ok(PromptResult {
        canvas_id,
        node_id: node_id.to_string(),
        prompt,
        status,
    })
}

pub async fn prompt_change(
    ctx: &Context,
    node_id: &str,
    prompt_id: &str,
    change: PromptChange,
) -> Result<PromptResult> {
    let mut session = ctx.open_session().await?;
    let result = match change {
        PromptChange::Delete => session.delete_prompt(node_id, prompt_id),
        PromptChange::Edit(content) => session
            .edit_prompt(node_id, prompt_id, &content)
            .and_then(|()| current_prompt(&session, node_id, prompt_id)),
        PromptChange::Completed(completed) => session
            .set_prompt_completed(node_id, prompt_id, completed)
            .and_then(|()| current_prompt(&session, node_id, prompt_id)),
    };
    let canvas_id = session.canvas_id().to_string();
    let (prompt, status) = close_after(session, result).await?;
    Ok(PromptResult {
        canvas_id,
        node_id: node_id.to_string(),
        prompt,
        status,
    })
}

fn current_prompt(session: &EditingSession, node_id: &str, prompt_id: &str) -> Result<Prompt> {
    session
        .document()
        .node(node_id)
        .and_then(|n| n.prompt(prompt_id))
        .cloned()
        .ok_or_else(|| Error::NotFound(format!("Prompt not found: {}", prompt_id)))
}

// === Timers ===

pub async fn timer(ctx: &Context, node_id: &str, action: TimerAction) -> Result<Saved> {
    let mut session = ctx.open_session().await?;
    let result = session.record_timer(node_id, action, json!({ "source": "cli" }));
    let canvas_id = session.canvas_id().to_string();
    let (_, status) = close_after(session, result).await?;
    let verb = match action {
        TimerAction::Started => "started",
        TimerAction::Stopped => "stopped",
    };
    Ok(Saved::new(
        &canvas_id,
        format!("Timer {} on {}", verb, node_id),
        status,
    ))
}

// === Backups ===

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    pub title: Option<String>,
    pub node_count: usize,
    pub edge_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupList {
    pub canvas_id: Option<String>,
    pub versions: Vec<BackupEntry>,
}

impl Output for BackupList {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        if self.versions.is_empty() {
            return match &self.canvas_id {
                Some(id) => format!("No backups for {}.", id),
                None => "No backups.".to_string(),
            };
        }
        self.versions
            .iter()
            .map(|v| {
                format!(
                    "v{}  {}  {} blocks, {} connections",
                    v.version,
                    v.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                    v.node_count,
                    v.edge_count
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub async fn backup_list(ctx: &Context) -> Result<BackupList> {
    let Some(session) = ctx.open_existing().await? else {
        return Ok(BackupList {
            canvas_id: None,
            versions: Vec::new(),
        });
    };
    let result = session.list_backups().map(|versions| {
        versions
            .into_iter()
            .map(|v| BackupEntry {
                version: v.version,
                timestamp: v.timestamp,
                title: v.title,
                node_count: v.nodes.len(),
                edge_count: v.edges.len(),
            })
            .collect::<Vec<_>>()
    });
    let canvas_id = session.canvas_id().to_string();
    let (versions, _) = close_after(session, result).await?;
    Ok(BackupList {
        canvas_id: Some(canvas_id),
        versions,
    })
}

pub async fn backup_restore(ctx: &Context, version: u64) -> Result<Saved> {
    let mut session = ctx.open_session().await?;
    let result = session.restore_backup(version).await;
    let (outcome, status) = close_after(session, result).await?;
    Ok(Saved::new(
        &outcome.canvas_id,
        format!("Restored backup version {}", version),
        status,
    )
    .with_action(outcome.action))
}

// === Slots ===

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotList {
    pub canvas_id: Option<String>,
    pub slot_count: u32,
    pub slots: Vec<SlotSummary>,
}

impl Output for SlotList {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        (1..=self.slot_count)
            .map(|n| match self.slots.iter().find(|s| s.slot_number == n) {
                Some(slot) => format!(
                    "{:>2}. {}  {} blocks  saved {}",
                    n,
                    slot.name.as_deref().unwrap_or("(unnamed)"),
                    slot.node_count,
                    slot.saved_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
                ),
                None => format!("{:>2}. (empty)", n),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub async fn slot_save(ctx: &Context, slot: u32, name: Option<String>) -> Result<Saved> {
    let session = ctx.open_session().await?;
    let result = session.save_to_slot(slot, name).await;
    let (saved, status) = close_after(session, result).await?;
    Ok(Saved::new(
        &saved.canvas_id,
        format!("Saved {} blocks to slot {}", saved.nodes.len(), slot),
        status,
    ))
}

pub async fn slot_load(ctx: &Context, slot: u32) -> Result<Saved> {
    let mut session = ctx.open_session().await?;
    let result = session.load_slot(slot).await;
    let (outcome, status) = close_after(session, result).await?;
    Ok(Saved::new(
        &outcome.canvas_id,
        format!("Loaded slot {}", slot),
        status,
    )
    .with_action(outcome.action))
}

pub async fn slot_list(ctx: &Context) -> Result<SlotList> {
    let Some(session) = ctx.open_existing().await? else {
        return Ok(SlotList {
            canvas_id: None,
            slot_count: ctx.config.slot_count(),
            slots: Vec::new(),
        });
    };
    let result = session.list_slots().await;
    let canvas_id = session.canvas_id().to_string();
    let slot_count = session.slot_count();
    let (slots, _) = close_after(session, result).await?;
    Ok(SlotList {
        canvas_id: Some(canvas_id),
        slot_count,
        slots,
    })
}

pub async fn slot_delete(ctx: &Context, slot: u32) -> Result<Saved> {
    let session = ctx.open_session().await?;
    let result = session.delete_slot(slot).await;
    let canvas_id = session.canvas_id().to_string();
    let (_, status) = close_after(session, result).await?;
    Ok(Saved::new(&canvas_id, format!("Cleared slot {}", slot), status))
}

// === Events ===

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResult {
    pub canvas_id: Option<String>,
    pub range: String,
    pub count: usize,
    pub days: Vec<DayGroup>,
}

impl Output for EventsResult {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        if self.days.is_empty() {
            return format!("No events ({}).", self.range);
        }
        let mut lines = Vec::new();
        for day in &self.days {
            lines.push(day.date.format("%A, %B %-d, %Y").to_string());
            for event in &day.events {
                lines.push(format!(
                    "  {}  {:<20} {}  by {}",
                    event.created_at.with_timezone(&Local).format("%H:%M:%S"),
                    event.event_type,
                    event.target_id,
                    event.user_id
                ));
            }
        }
        lines.join("\n")
    }
}

pub async fn events(
    ctx: &Context,
    types: &[String],
    range: &str,
    limit: Option<usize>,
) -> Result<EventsResult> {
    let types = types
        .iter()
        .map(|t| {
            EventType::parse(t).ok_or_else(|| Error::Validation(format!("Unknown event type: {}", t)))
        })
        .collect::<Result<BTreeSet<_>>>()?;
    let range = DateRange::parse(range)?;
    let limit = limit.unwrap_or_else(|| ctx.config.event_limit());
    if limit == 0 {
        return Err(Error::Validation("--limit must be greater than 0".to_string()));
    }
    let filter = EventFilter {
        types,
        range,
        limit,
    };

    let (canvas_id, days) = match ctx.open_existing().await? {
        Some(session) => {
            let result = session.events(&filter);
            let canvas_id = session.canvas_id().to_string();
            let (days, _) = close_after(session, result).await?;
            (Some(canvas_id), days)
        }
        None => (None, Vec::new()),
    };
    Ok(EventsResult {
        canvas_id,
        range: range.to_string(),
        count: days.iter().map(|d| d.events.len()).sum(),
        days,
    })
}

// === Shares ===

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareList {
    pub canvas_id: Option<String>,
    pub shares: Vec<SharePermission>,
}

impl Output for ShareList {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        if self.shares.is_empty() {
            return match &self.canvas_id {
                Some(id) => format!("{} is not shared.", id),
                None => "No canvas to share yet.".to_string(),
            };
        }
        self.shares
            .iter()
            .map(|s| format!("{}  {}", s.shared_with_email, s.permission_level))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub async fn share_list(ctx: &Context) -> Result<ShareList> {
    let Some(session) = ctx.open_existing().await? else {
        return Ok(ShareList {
            canvas_id: None,
            shares: Vec::new(),
        });
    };
    let result = session.list_shares().await;
    let canvas_id = session.canvas_id().to_string();
    let (shares, _) = close_after(session, result).await?;
    Ok(ShareList {
        canvas_id: Some(canvas_id),
        shares,
    })
}

pub async fn share_add(ctx: &Context, email: &str, level: &str) -> Result<ShareList> {
    let level = PermissionLevel::parse(level)
        .ok_or_else(|| Error::Validation(format!("Unknown permission level: {}", level)))?;
    let session = ctx.open_session().await?;
    let result = session.share(email, level).await;
    let (share, _) = close_after(session, result).await?;
    Ok(ShareList {
        canvas_id: Some(share.canvas_id.clone()),
        shares: vec![share],
    })
}

pub async fn share_remove(ctx: &Context, email: &str) -> Result<Saved> {
    let session = ctx.open_session().await?;
    let result = session.unshare(email).await;
    let canvas_id = session.canvas_id().to_string();
    let (_, status) = close_after(session, result).await?;
    Ok(Saved::new(
        &canvas_id,
        format!("Removed access for {}", email.trim().to_lowercase()),
        status,
    ))
}

// === Config ===

#[derive(Serialize)]
pub struct ConfigView {
    #[serde(rename = "data-dir")]
    pub data_dir: String,
    #[serde(flatten)]
    pub config: ResolvedConfig,
}

impl Output for ConfigView {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        let c = &self.config;
        [
            format!("data-dir      {}", self.data_dir),
            format!("debounce-ms   {} ({})", c.debounce_ms.value, c.debounce_ms.source),
            format!("backup-cap    {} ({})", c.backup_cap.value, c.backup_cap.source),
            format!("slot-count    {} ({})", c.slot_count.value, c.slot_count.source),
            format!("event-limit   {} ({})", c.event_limit.value, c.event_limit.source),
            format!(
                "output-format {} ({})",
                c.output_format.value, c.output_format.source
            ),
        ]
        .join("\n")
    }
}

pub fn config_show(data_dir: &Path, config: ResolvedConfig) -> ConfigView {
    ConfigView {
        data_dir: data_dir.display().to_string(),
        config,
    }
}

//! Data models for Plancanvas entities.
//!
//! This module defines the core data structures:
//! - `GraphDocument` - The in-memory graph of one canvas (nodes, edges, title)
//! - `Node` / `Prompt` - Blocks and the line items inside them
//! - `Edge` - Directed connections between node or prompt handles
//! - `BackupVersion` - Immutable snapshot captured after each successful save
//! - `SaveSlot` - User-triggered numbered checkpoint
//! - `AuditEvent` - One semantic mutation in the audit trail
//! - `SharePermission` - Collaborator access to a canvas

pub mod graph;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::{Error, Result};

/// Title given to canvases that were never named.
pub const DEFAULT_TITLE: &str = "Untitled canvas";

/// Kind of block a node renders as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    #[default]
    TaskBlock,
    GoalBlock,
}

impl NodeKind {
    /// Parse a node kind, accepting both wire and short names.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "taskblock" | "task" => Some(NodeKind::TaskBlock),
            "goalblock" | "goal" => Some(NodeKind::GoalBlock),
            _ => None,
        }
    }

    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::TaskBlock => "taskBlock",
            NodeKind::GoalBlock => "goalBlock",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canvas coordinates of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Offset from `other` to `self`.
    pub fn delta_from(&self, other: &Position) -> (f64, f64) {
        (self.x - other.x, self.y - other.y)
    }

    /// Translate in place.
    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.y += dy;
    }
}

/// A single actionable line item inside a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    /// Unique within its node
    pub id: String,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub completed: bool,
}

impl Prompt {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            completed: false,
        }
    }
}

/// A block on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique within the document
    pub id: String,

    #[serde(default)]
    pub kind: NodeKind,

    #[serde(default)]
    pub position: Position,

    #[serde(default)]
    pub prompts: Vec<Prompt>,

    /// Display title of the block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Remaining display attributes, carried through untouched
    #[serde(flatten)]
    pub attrs: BTreeMap<String, Value>,
}

impl Node {
    /// Create an empty block at the given position.
    pub fn new(id: impl Into<String>, kind: NodeKind, position: Position) -> Self {
        Self {
            id: id.into(),
            kind,
            position,
            prompts: Vec::new(),
            title: None,
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_prompt(mut self, prompt: Prompt) -> Self {
        self.prompts.push(prompt);
        self
    }

    /// Title for display, falling back to the id.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }

    pub fn prompt(&self, prompt_id: &str) -> Option<&Prompt> {
        self.prompts.iter().find(|p| p.id == prompt_id)
    }

    pub fn prompt_mut(&mut self, prompt_id: &str) -> Option<&mut Prompt> {
        self.prompts.iter_mut().find(|p| p.id == prompt_id)
    }
}

/// Handle name for a prompt-level connection point.
pub fn prompt_handle(prompt_id: &str) -> String {
    format!("prompt-{}", prompt_id)
}

/// A directed connection between two handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source_node_id: String,
    pub target_node_id: String,

    /// Connection point on the source; `None` means the node itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Edge {
    /// Node-to-node edge with no specific handles.
    pub fn new(
        id: impl Into<String>,
        source_node_id: impl Into<String>,
        target_node_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_node_id: source_node_id.into(),
            target_node_id: target_node_id.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    pub fn with_source_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    /// Whether this edge attaches to `node_id` at either end.
    pub fn touches(&self, node_id: &str) -> bool {
        self.source_node_id == node_id || self.target_node_id == node_id
    }

    /// Whether this edge is attached to the given prompt's handle.
    pub fn touches_prompt(&self, node_id: &str, prompt_id: &str) -> bool {
        let handle = prompt_handle(prompt_id);
        (self.source_node_id == node_id && self.source_handle.as_deref() == Some(handle.as_str()))
            || (self.target_node_id == node_id
                && self.target_handle.as_deref() == Some(handle.as_str()))
    }
}

/// Node and edge counts of a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub total_blocks: usize,
    pub goals: usize,
    pub tasks: usize,
    pub connections: usize,
}

/// Full state sent to the store on each save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub title: Option<String>,
}

/// The in-memory graph of one canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDocument {
    /// Store id; `None` until the first save creates the canvas
    pub id: Option<String>,
    pub title: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub last_modified_at: DateTime<Utc>,
}

impl Default for GraphDocument {
    fn default() -> Self {
        Self::new(None)
    }
}

impl GraphDocument {
    /// Create an empty document.
    pub fn new(id: Option<String>) -> Self {
        Self {
            id,
            title: DEFAULT_TITLE.to_string(),
            nodes: Vec::new(),
            edges: Vec::new(),
            last_modified_at: Utc::now(),
        }
    }

    /// Build a document from parts, checking the graph invariants.
    pub fn from_parts(
        id: Option<String>,
        title: Option<String>,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
    ) -> Result<Self> {
        let doc = Self {
            id,
            title: title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            nodes,
            edges,
            last_modified_at: Utc::now(),
        };
        doc.validate()?;
        Ok(doc)
    }

    pub fn touch(&mut self) {
        self.last_modified_at = Utc::now();
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// Insert a node; ids must stay unique.
    pub fn add_node(&mut self, node: Node) -> Result<()> {
        if self.contains_node(&node.id) {
            return Err(Error::Validation(format!("Duplicate node id: {}", node.id)));
        }
        self.nodes.push(node);
        self.touch();
        Ok(())
    }

    /// Remove a node together with every edge attached to it.
    pub fn remove_node(&mut self, id: &str) -> Result<Node> {
        let index = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| Error::NotFound(format!("Node not found: {}", id)))?;
        let node = self.nodes.remove(index);
        self.edges.retain(|e| !e.touches(id));
        self.touch();
        Ok(node)
    }

    /// Insert an edge whose endpoints already exist.
    pub fn add_edge(&mut self, edge: Edge) -> Result<()> {
        for endpoint in [&edge.source_node_id, &edge.target_node_id] {
            if !self.contains_node(endpoint) {
                return Err(Error::Validation(format!(
                    "Edge {} references missing node: {}",
                    edge.id, endpoint
                )));
            }
        }
        if self.edge(&edge.id).is_some() {
            return Err(Error::Validation(format!("Duplicate edge id: {}", edge.id)));
        }
        self.edges.push(edge);
        self.touch();
        Ok(())
    }

    pub fn remove_edge(&mut self, id: &str) -> Result<Edge> {
        let index = self
            .edges
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| Error::NotFound(format!("Edge not found: {}", id)))?;
        let edge = self.edges.remove(index);
        self.touch();
        Ok(edge)
    }

    /// Replace the whole graph (load, restore, slot load, import).
    pub fn replace(&mut self, nodes: Vec<Node>, edges: Vec<Edge>, title: Option<String>) {
        self.nodes = nodes;
        self.edges = edges;
        if let Some(title) = title {
            self.title = title;
        }
        self.touch();
    }

    /// Check edge endpoints and id uniqueness.
    pub fn validate(&self) -> Result<()> {
        validate_graph(&self.nodes, &self.edges)
    }

    pub fn stats(&self) -> GraphStats {
        let goals = self
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::GoalBlock)
            .count();
        GraphStats {
            total_blocks: self.nodes.len(),
            goals,
            tasks: self.nodes.len() - goals,
            connections: self.edges.len(),
        }
    }

    /// Copy of the state to hand to the autosave scheduler.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            title: Some(self.title.clone()),
        }
    }
}

/// Check that node and edge ids are unique, prompt ids are unique within
/// each node, and every edge endpoint names a node in the same set.
pub fn validate_graph(nodes: &[Node], edges: &[Edge]) -> Result<()> {
    let mut node_ids = HashSet::new();
    for node in nodes {
        if node.id.is_empty() {
            return Err(Error::Validation("Node id must not be empty".to_string()));
        }
        if !node_ids.insert(node.id.as_str()) {
            return Err(Error::Validation(format!("Duplicate node id: {}", node.id)));
        }
        let mut prompt_ids = HashSet::new();
        for prompt in &node.prompts {
            if !prompt_ids.insert(prompt.id.as_str()) {
                return Err(Error::Validation(format!(
                    "Duplicate prompt id {} in node {}",
                    prompt.id, node.id
                )));
            }
        }
    }

    let mut edge_ids = HashSet::new();
    for edge in edges {
        if !edge_ids.insert(edge.id.as_str()) {
            return Err(Error::Validation(format!("Duplicate edge id: {}", edge.id)));
        }
        for endpoint in [&edge.source_node_id, &edge.target_node_id] {
            if !node_ids.contains(endpoint.as_str()) {
                return Err(Error::Validation(format!(
                    "Edge {} references missing node: {}",
                    edge.id, endpoint
                )));
            }
        }
    }

    Ok(())
}

/// Immutable full-document snapshot captured after a successful save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupVersion {
    pub canvas_id: String,

    /// Strictly increasing per canvas
    pub version: u64,

    pub timestamp: DateTime<Utc>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub title: Option<String>,
}

/// A numbered checkpoint stored next to the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSlot {
    pub canvas_id: String,
    pub slot_number: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub saved_at: DateTime<Utc>,
}

/// Slot listing entry without the graph payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSummary {
    pub slot_number: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub saved_at: DateTime<Utc>,
    pub node_count: usize,
    pub edge_count: usize,
}

/// Kind of semantic mutation recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    BlockCreated,
    BlockDeleted,
    BlockRenamed,
    PromptAdded,
    PromptDeleted,
    PromptCompleted,
    PromptUncompleted,
    TimerStarted,
    TimerStopped,
    ConnectionCreated,
    ConnectionDeleted,
}

impl EventType {
    pub const ALL: [EventType; 11] = [
        EventType::BlockCreated,
        EventType::BlockDeleted,
        EventType::BlockRenamed,
        EventType::PromptAdded,
        EventType::PromptDeleted,
        EventType::PromptCompleted,
        EventType::PromptUncompleted,
        EventType::TimerStarted,
        EventType::TimerStopped,
        EventType::ConnectionCreated,
        EventType::ConnectionDeleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::BlockCreated => "block_created",
            EventType::BlockDeleted => "block_deleted",
            EventType::BlockRenamed => "block_renamed",
            EventType::PromptAdded => "prompt_added",
            EventType::PromptDeleted => "prompt_deleted",
            EventType::PromptCompleted => "prompt_completed",
            EventType::PromptUncompleted => "prompt_uncompleted",
            EventType::TimerStarted => "timer_started",
            EventType::TimerStopped => "timer_stopped",
            EventType::ConnectionCreated => "connection_created",
            EventType::ConnectionDeleted => "connection_deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|t| t.as_str() == normalized)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One immutable entry of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: String,
    pub canvas_id: String,
    pub user_id: String,
    pub event_type: EventType,
    pub target_id: String,

    #[serde(default)]
    pub event_data: Value,

    pub created_at: DateTime<Utc>,
}

/// Access level granted to a collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    View,
    Edit,
}

impl PermissionLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "view" | "read" => Some(PermissionLevel::View),
            "edit" | "write" => Some(PermissionLevel::Edit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::View => "view",
            PermissionLevel::Edit => "edit",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A collaborator's access to a canvas; unique per (canvas, email).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharePermission {
    pub canvas_id: String,
    pub shared_with_email: String,
    pub permission_level: PermissionLevel,
    pub shared_by_user_id: String,
}

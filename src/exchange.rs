//! Import and export of whole canvases.
//!
//! Two formats:
//! - JSON, lossless: `{version, canvasTitle, exportedAt, nodes, edges, stats}`
//! - Outline (Markdown), lossy: one heading per node, one bullet per prompt
//!
//! Imports are checked completely before a document is returned, so a bad
//! file never reaches the working document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write;
use tracing::debug;

use crate::models::{Edge, GraphDocument, GraphStats, Node, NodeKind, validate_graph};
use crate::{Error, Result};

/// Format version written into every export.
pub const EXPORT_VERSION: &str = "1.0";

/// The JSON export envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub version: String,
    pub canvas_title: String,
    pub exported_at: DateTime<Utc>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub stats: GraphStats,
}

/// Build the JSON export of a document.
pub fn to_json(doc: &GraphDocument) -> ExportDocument {
    ExportDocument {
        version: EXPORT_VERSION.to_string(),
        canvas_title: doc.title.clone(),
        exported_at: Utc::now(),
        nodes: doc.nodes.clone(),
        edges: doc.edges.clone(),
        stats: doc.stats(),
    }
}

/// Pretty-printed JSON export.
pub fn to_json_string(doc: &GraphDocument) -> Result<String> {
    Ok(serde_json::to_string_pretty(&to_json(doc))?)
}

/// Human-readable outline in document order.
pub fn to_outline(doc: &GraphDocument) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}", doc.title);

    for node in &doc.nodes {
        let kind = match node.kind {
            NodeKind::GoalBlock => "Goal",
            NodeKind::TaskBlock => "Task",
        };
        let _ = writeln!(out);
        let _ = writeln!(out, "## {}: {}", kind, node.display_title());
        if node.prompts.is_empty() {
            let _ = writeln!(out, "_No prompts_");
        }
        for prompt in &node.prompts {
            let mark = if prompt.completed { "x" } else { " " };
            let _ = writeln!(out, "- [{}] {}", mark, prompt.content);
        }
    }

    out
}

/// Parse and check an exported file.
///
/// The payload must be an object with `nodes` and `edges` arrays, edge
/// endpoints must resolve, and node ids (and prompt ids within a node) must
/// be unique. The returned document has no store id yet.
pub fn from_json(text: &str) -> Result<GraphDocument> {
    let payload: Value = serde_json::from_str(text)
        .map_err(|e| Error::Validation(format!("Import is not valid JSON: {}", e)))?;
    let obj = payload
        .as_object()
        .ok_or_else(|| Error::Validation("Import must be a JSON object".to_string()))?;

    if let Some(version) = obj.get("version") {
        let version = version
            .as_str()
            .ok_or_else(|| Error::Validation("version must be a string".to_string()))?;
        if version.split('.').next() != Some("1") {
            return Err(Error::Validation(format!(
                "Unsupported export version: {}",
                version
            )));
        }
    }

    let nodes: Vec<Node> = serde_json::from_value(required_array(obj, "nodes")?)
        .map_err(|e| Error::Validation(format!("Invalid node in import: {}", e)))?;
    let edges: Vec<Edge> = serde_json::from_value(required_array(obj, "edges")?)
        .map_err(|e| Error::Validation(format!("Invalid edge in import: {}", e)))?;
    validate_graph(&nodes, &edges)?;

    let title = obj
        .get("canvasTitle")
        .or_else(|| obj.get("title"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    debug!(nodes = nodes.len(), edges = edges.len(), "import payload accepted");
    GraphDocument::from_parts(None, title, nodes, edges)
}

fn required_array(obj: &serde_json::Map<String, Value>, key: &str) -> Result<Value> {
    match obj.get(key) {
        Some(value @ Value::Array(_)) => Ok(value.clone()),
        Some(_) => Err(Error::Validation(format!("{} must be an array", key))),
        None => Err(Error::Validation(format!("Import is missing {}", key))),
    }
}

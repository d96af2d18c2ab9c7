//! KDL schema for config.kdl.
//!
//! This module provides:
//! - The Rust struct representing the file
//! - Serialization/deserialization to/from KDL format
//! - Validation

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};

/// Output format preference for CLI commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON output (default, machine-readable)
    #[default]
    Json,
    /// Human-readable output
    Human,
}

impl OutputFormat {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "human" => Some(OutputFormat::Human),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Human => "human",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Settings stored in config.kdl.
///
/// # KDL Schema
///
/// ```kdl
/// debounce-ms 3000
/// backup-cap 50
/// slot-count 10
/// event-limit 100
/// output-format "human"  // or "json"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasConfig {
    /// Quiet period before an autosave fires
    pub debounce_ms: Option<u64>,

    /// Backup versions kept per canvas
    pub backup_cap: Option<usize>,

    /// Numbered save slots per canvas
    pub slot_count: Option<u32>,

    /// Default number of audit events listed
    pub event_limit: Option<usize>,

    pub output_format: Option<OutputFormat>,
}

fn integer_value(doc: &KdlDocument, key: &str) -> Option<i128> {
    doc.get(key)
        .and_then(|node| node.entries().first())
        .and_then(|entry| entry.value().as_integer())
}

fn integer_node(key: &str, value: i128) -> KdlNode {
    let mut node = KdlNode::new(key);
    node.push(KdlEntry::new(KdlValue::Integer(value)));
    node
}

impl CanvasConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    ///
    /// Returns an error message naming the first invalid key.
    pub fn validate(&self) -> Result<(), String> {
        if self.debounce_ms == Some(0) {
            return Err("debounce-ms must be greater than 0".to_string());
        }
        if self.backup_cap == Some(0) {
            return Err("backup-cap must be greater than 0".to_string());
        }
        if self.slot_count == Some(0) {
            return Err("slot-count must be greater than 0".to_string());
        }
        if self.event_limit == Some(0) {
            return Err("event-limit must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Parse config from a KDL document. Negative or oversized numbers
    /// are treated as unset.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        let mut config = Self::new();

        config.debounce_ms = integer_value(doc, "debounce-ms").and_then(|i| u64::try_from(i).ok());
        config.backup_cap = integer_value(doc, "backup-cap").and_then(|i| usize::try_from(i).ok());
        config.slot_count = integer_value(doc, "slot-count").and_then(|i| u32::try_from(i).ok());
        config.event_limit =
            integer_value(doc, "event-limit").and_then(|i| usize::try_from(i).ok());

        if let Some(node) = doc.get("output-format") {
            if let Some(entry) = node.entries().first() {
                if let Some(s) = entry.value().as_string() {
                    config.output_format = OutputFormat::parse(s);
                }
            }
        }

        config
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        if let Some(ms) = self.debounce_ms {
            doc.nodes_mut().push(integer_node("debounce-ms", ms as i128));
        }
        if let Some(cap) = self.backup_cap {
            doc.nodes_mut().push(integer_node("backup-cap", cap as i128));
        }
        if let Some(count) = self.slot_count {
            doc.nodes_mut().push(integer_node("slot-count", count as i128));
        }
        if let Some(limit) = self.event_limit {
            doc.nodes_mut().push(integer_node("event-limit", limit as i128));
        }
        if let Some(format) = self.output_format {
            let mut node = KdlNode::new("output-format");
            node.push(KdlEntry::new(KdlValue::String(format.as_str().to_string())));
            doc.nodes_mut().push(node);
        }

        doc
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &CanvasConfig) {
        if other.debounce_ms.is_some() {
            self.debounce_ms = other.debounce_ms;
        }
        if other.backup_cap.is_some() {
            self.backup_cap = other.backup_cap;
        }
        if other.slot_count.is_some() {
            self.slot_count = other.slot_count;
        }
        if other.event_limit.is_some() {
            self.event_limit = other.event_limit;
        }
        if other.output_format.is_some() {
            self.output_format = other.output_format;
        }
    }
}

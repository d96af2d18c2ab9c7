//! Graph algorithms over the canvas document.
//!
//! Edges are drawn freely by users, so the graph may contain cycles. Every
//! reachability walk here keeps an explicit visited set and never recurses.

use std::collections::{HashMap, HashSet, VecDeque};

use super::{Edge, GraphDocument, Position};
use crate::{Error, Result};

/// Collect every node reachable from `start` by following edges forward.
///
/// The start node itself is not included, even when a cycle leads back to
/// it. Each reachable id appears exactly once, in breadth-first order.
pub fn descendants(edges: &[Edge], start: &str) -> Vec<String> {
    let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        outgoing
            .entry(edge.source_node_id.as_str())
            .or_default()
            .push(edge.target_node_id.as_str());
    }

    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(start);
    let mut queue: VecDeque<&str> = VecDeque::from([start]);
    let mut found = Vec::new();

    while let Some(current) = queue.pop_front() {
        let Some(targets) = outgoing.get(current) else {
            continue;
        };
        for &target in targets {
            if visited.insert(target) {
                found.push(target.to_string());
                queue.push_back(target);
            }
        }
    }

    found
}

/// Per-drag bookkeeping for cascading moves.
///
/// Each drag frame reports the dragged node's new position. With the
/// cascade modifier held, every descendant follows by the same delta
/// measured against the previous frame. Call [`DragTracker::end`] when the
/// drag finishes so the next drag starts from a fresh baseline.
#[derive(Debug, Default)]
pub struct DragTracker {
    previous: HashMap<String, Position>,
}

impl DragTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one drag frame and return the ids of every node that moved.
    pub fn drag(
        &mut self,
        doc: &mut GraphDocument,
        node_id: &str,
        new_position: Position,
        cascade: bool,
    ) -> Result<Vec<String>> {
        let current = doc
            .node(node_id)
            .map(|n| n.position)
            .ok_or_else(|| Error::NotFound(format!("Node not found: {}", node_id)))?;

        let baseline = self.previous.get(node_id).copied().unwrap_or(current);
        let (dx, dy) = new_position.delta_from(&baseline);

        let mut moved = vec![node_id.to_string()];
        if let Some(node) = doc.node_mut(node_id) {
            node.position = new_position;
        }
        self.previous.insert(node_id.to_string(), new_position);

        if cascade && (dx != 0.0 || dy != 0.0) {
            for id in descendants(&doc.edges, node_id) {
                if let Some(node) = doc.node_mut(&id) {
                    node.position.translate(dx, dy);
                    self.previous.insert(id.clone(), node.position);
                    moved.push(id);
                }
            }
        }

        doc.touch();
        Ok(moved)
    }

    /// Forget all baselines.
    pub fn end(&mut self) {
        self.previous.clear();
    }
}

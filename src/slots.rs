//! Numbered save slots.
//!
//! Slots are explicit, user-triggered checkpoints persisted by the store,
//! independent of the local backup ring. Saving to an occupied slot
//! overwrites it. Loading a slot only reads it here; replacing the working
//! document and persisting it is the editing session's job.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::models::{Edge, Node, SaveSlot, SlotSummary, validate_graph};
use crate::storage::CanvasRepository;
use crate::{Error, Result};

/// Slots available per canvas unless configured otherwise.
pub const DEFAULT_SLOT_COUNT: u32 = 10;

pub struct SaveSlotManager {
    repo: Arc<dyn CanvasRepository>,
    slot_count: u32,
}

impl SaveSlotManager {
    pub fn new(repo: Arc<dyn CanvasRepository>, slot_count: u32) -> Self {
        Self {
            repo,
            slot_count: slot_count.max(1),
        }
    }

    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }

    fn check_slot(&self, slot_number: u32) -> Result<()> {
        if slot_number == 0 || slot_number > self.slot_count {
            return Err(Error::Validation(format!(
                "Slot number must be between 1 and {}, got {}",
                self.slot_count, slot_number
            )));
        }
        Ok(())
    }

    /// Write the given graph into a slot, replacing whatever it held.
    pub async fn save_to_slot(
        &self,
        canvas_id: &str,
        slot_number: u32,
        name: Option<String>,
        nodes: &[Node],
        edges: &[Edge],
    ) -> Result<SaveSlot> {
        self.check_slot(slot_number)?;
        validate_graph(nodes, edges)?;

        let slot = SaveSlot {
            canvas_id: canvas_id.to_string(),
            slot_number,
            name: name.filter(|n| !n.trim().is_empty()),
            nodes: nodes.to_vec(),
            edges: edges.to_vec(),
            saved_at: Utc::now(),
        };
        self.repo.save_slot(&slot).await?;
        info!(canvas_id, slot_number, nodes = nodes.len(), "saved to slot");
        Ok(slot)
    }

    /// Read a slot. Empty slots are `NotFound`.
    pub async fn load_slot(&self, canvas_id: &str, slot_number: u32) -> Result<SaveSlot> {
        self.check_slot(slot_number)?;
        let slot = self.repo.load_slot(canvas_id, slot_number).await?;
        validate_graph(&slot.nodes, &slot.edges)?;
        Ok(slot)
    }

    /// Occupied slots in slot order.
    pub async fn list(&self, canvas_id: &str) -> Result<Vec<SlotSummary>> {
        self.repo.list_slots(canvas_id).await
    }

    pub async fn delete(&self, canvas_id: &str, slot_number: u32) -> Result<()> {
        self.check_slot(slot_number)?;
        self.repo.delete_slot(canvas_id, slot_number).await?;
        info!(canvas_id, slot_number, "slot cleared");
        Ok(())
    }
}

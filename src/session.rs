//! The editing session: one caller working on one canvas.
//!
//! `EditingSession` owns the in-memory [`GraphDocument`] and wires it to the
//! rest of the system:
//!
//! - every mutation entry point consults the permission gate first; a
//!   blocked call touches neither the document nor the audit trail
//! - accepted mutations record their audit event at the call site, then
//!   hand the new state to the autosave scheduler
//! - successful saves append to the local backup ring
//! - restore, slot load and import replace the document and save at once
//!
//! Mutations never wait on the network. Only the explicit save paths
//! (`save_now`, `restore_backup`, `load_slot`, `import_json`, slot writes)
//! are async.

use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::audit::{DayGroup, EventFilter, EventTracker};
use crate::autosave::{AutosaveScheduler, DEFAULT_DEBOUNCE_MS, SaveStatus, StatusCallback};
use crate::backup::BackupRing;
use crate::exchange;
use crate::models::graph::DragTracker;
use crate::models::{
    BackupVersion, DEFAULT_TITLE, Edge, EventType, GraphDocument, GraphSnapshot, Node,
    PermissionLevel, Position, Prompt, SaveSlot, SharePermission, SlotSummary,
};
use crate::permissions::{self, Operation, Role};
use crate::slots::{DEFAULT_SLOT_COUNT, SaveSlotManager};
use crate::storage::{AuditSink, CanvasRepository, SqliteStore, UpsertOutcome};
use crate::{Error, Result};

/// Collaborators a session talks to.
#[derive(Clone)]
pub struct Services {
    pub repo: Arc<dyn CanvasRepository>,
    pub audit: Arc<dyn AuditSink>,
    pub backups: Arc<BackupRing>,
}

impl Services {
    /// Use one SQLite store for documents, slots, shares and audit.
    pub fn from_store(store: SqliteStore, backups: BackupRing) -> Self {
        let store = Arc::new(store);
        Self {
            repo: store.clone(),
            audit: store,
            backups: Arc::new(backups),
        }
    }
}

/// Tunables for one session.
#[derive(Clone)]
pub struct SessionConfig {
    pub debounce: Duration,
    pub slot_count: u32,
    pub on_status: Option<StatusCallback>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            slot_count: DEFAULT_SLOT_COUNT,
            on_status: None,
        }
    }
}

/// External timer transitions recorded against a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    Started,
    Stopped,
}

impl TimerAction {
    fn event_type(self) -> EventType {
        match self {
            TimerAction::Started => EventType::TimerStarted,
            TimerAction::Stopped => EventType::TimerStopped,
        }
    }
}

/// Generate a short id for a new node, prompt or edge.
pub fn generate_id(prefix: &str) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &uuid[..8])
}

pub struct EditingSession {
    doc: GraphDocument,
    canvas_id: String,
    user_id: String,
    role: Role,
    repo: Arc<dyn CanvasRepository>,
    events: EventTracker,
    backups: Arc<BackupRing>,
    slots: SaveSlotManager,
    autosave: AutosaveScheduler,
    drag: DragTracker,
}

impl EditingSession {
    /// Load a canvas (or the caller's most recent one) and start autosave.
    ///
    /// A caller with no canvas at all gets a fresh one created on the spot,
    /// so every session is bound to a store id from the start.
    pub async fn open(
        user_id: &str,
        canvas_id: Option<&str>,
        services: Services,
        config: SessionConfig,
    ) -> Result<Self> {
        let loaded = services.repo.load(canvas_id).await?;

        let (id, role, doc) = match (loaded.exists, loaded.canvas_id) {
            (true, Some(id)) => {
                let role = services.repo.role_for(&id).await?;
                let doc = GraphDocument::from_parts(
                    Some(id.clone()),
                    loaded.title,
                    loaded.nodes,
                    loaded.edges,
                )?;
                (id, role, doc)
            }
            _ => {
                let empty = GraphSnapshot {
                    title: Some(DEFAULT_TITLE.to_string()),
                    ..GraphSnapshot::default()
                };
                let outcome = services.repo.upsert(None, &empty).await?;
                let doc = GraphDocument::new(Some(outcome.canvas_id.clone()));
                (outcome.canvas_id, Role::Owner, doc)
            }
        };

        let mut builder = AutosaveScheduler::builder(services.repo.clone())
            .canvas_id(Some(id.clone()))
            .debounce(config.debounce)
            .listener(services.backups.clone());
        if let Some(callback) = config.on_status {
            builder = builder.on_status_change(callback);
        }
        let autosave = builder.spawn();

        info!(canvas_id = %id, user_id, role = %role, "editing session opened");

        Ok(Self {
            doc,
            canvas_id: id,
            user_id: user_id.to_string(),
            role,
            slots: SaveSlotManager::new(services.repo.clone(), config.slot_count),
            repo: services.repo,
            events: EventTracker::new(services.audit),
            backups: services.backups,
            autosave,
            drag: DragTracker::new(),
        })
    }

    // === Accessors ===

    pub fn document(&self) -> &GraphDocument {
        &self.doc
    }

    pub fn canvas_id(&self) -> &str {
        &self.canvas_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn save_status(&self) -> SaveStatus {
        self.autosave.status()
    }

    pub fn slot_count(&self) -> u32 {
        self.slots.slot_count()
    }

    // === Internals ===

    fn gate(&self, action: &str) -> Result<()> {
        permissions::require(self.role, Operation::Mutate, action).inspect_err(|_| {
            warn!(
                canvas_id = %self.canvas_id,
                user_id = %self.user_id,
                role = %self.role,
                action,
                "mutation blocked"
            );
        })
    }

    /// Record an audit event. A failed write is logged, not propagated:
    /// the mutation already happened.
    fn audit(&self, event_type: EventType, target_id: &str, data: Value) {
        if let Err(e) =
            self.events
                .record(&self.canvas_id, &self.user_id, event_type, target_id, data)
        {
            warn!(
                canvas_id = %self.canvas_id,
                event_type = %event_type,
                error = %e,
                "failed to record audit event"
            );
        }
    }

    fn changed(&self) {
        self.autosave.schedule_save(self.doc.snapshot());
    }

    fn node_ref(&self, node_id: &str) -> Result<&Node> {
        self.doc
            .node(node_id)
            .ok_or_else(|| Error::NotFound(format!("Node not found: {}", node_id)))
    }

    fn node_mut(&mut self, node_id: &str) -> Result<&mut Node> {
        self.doc
            .node_mut(node_id)
            .ok_or_else(|| Error::NotFound(format!("Node not found: {}", node_id)))
    }

    // === Node Mutations ===

    pub fn add_node(&mut self, node: Node) -> Result<()> {
        self.gate("add block")?;
        let data = json!({
            "kind": node.kind,
            "title": node.title,
            "position": node.position,
        });
        let id = node.id.clone();
        self.doc.add_node(node)?;
        self.audit(EventType::BlockCreated, &id, data);
        self.changed();
        Ok(())
    }

    /// Remove a block and every connection attached to it.
    pub fn delete_node(&mut self, node_id: &str) -> Result<Node> {
        self.gate("delete block")?;
        let removed_edges: Vec<String> = self
            .doc
            .edges
            .iter()
            .filter(|e| e.touches(node_id))
            .map(|e| e.id.clone())
            .collect();
        let node = self.doc.remove_node(node_id)?;
        self.audit(
            EventType::BlockDeleted,
            node_id,
            json!({ "title": node.title, "removedEdges": removed_edges }),
        );
        self.changed();
        Ok(node)
    }

    pub fn rename_node(&mut self, node_id: &str, title: &str) -> Result<()> {
        self.gate("rename block")?;
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::Validation("Block title must not be empty".to_string()));
        }
        let node = self.node_mut(node_id)?;
        let previous = node.title.replace(title.to_string());
        self.doc.touch();
        self.audit(
            EventType::BlockRenamed,
            node_id,
            json!({ "from": previous, "to": title }),
        );
        self.changed();
        Ok(())
    }

    pub fn set_title(&mut self, title: &str) -> Result<()> {
        self.gate("rename canvas")?;
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::Validation("Canvas title must not be empty".to_string()));
        }
        self.doc.title = title.to_string();
        self.doc.touch();
        self.changed();
        Ok(())
    }

    /// Put a single block at an absolute position.
    pub fn move_node(&mut self, node_id: &str, position: Position) -> Result<()> {
        self.gate("move block")?;
        self.node_mut(node_id)?.position = position;
        self.doc.touch();
        self.changed();
        Ok(())
    }

    /// One drag frame. With `cascade`, every block reachable from the
    /// dragged one follows by the same delta. Returns the ids that moved.
    pub fn drag_node(
        &mut self,
        node_id: &str,
        position: Position,
        cascade: bool,
    ) -> Result<Vec<String>> {
        self.gate("move block")?;
        let moved = self.drag.drag(&mut self.doc, node_id, position, cascade)?;
        self.changed();
        Ok(moved)
    }

    pub fn end_drag(&mut self) {
        self.drag.end();
    }

    // === Connections ===

    pub fn connect(&mut self, edge: Edge) -> Result<()> {
        self.gate("connect blocks")?;
        let data = json!({
            "sourceNodeId": edge.source_node_id,
            "targetNodeId": edge.target_node_id,
            "sourceHandle": edge.source_handle,
            "targetHandle": edge.target_handle,
        });
        let id = edge.id.clone();
        self.doc.add_edge(edge)?;
        self.audit(EventType::ConnectionCreated, &id, data);
        self.changed();
        Ok(())
    }

    pub fn disconnect(&mut self, edge_id: &str) -> Result<Edge> {
        self.gate("remove connection")?;
        let edge = self.doc.remove_edge(edge_id)?;
        self.audit(
            EventType::ConnectionDeleted,
            edge_id,
            json!({
                "sourceNodeId": edge.source_node_id,
                "targetNodeId": edge.target_node_id,
            }),
        );
        self.changed();
        Ok(edge)
    }

    // === Prompts ===

    pub fn add_prompt(&mut self, node_id: &str, content: &str) -> Result<Prompt> {
        self.gate("add prompt")?;
        let node = self.node_mut(node_id)?;
        let mut prompt_id = generate_id("p");
        while node.prompt(&prompt_id).is_some() {
            prompt_id = generate_id("p");
        }
        let prompt = Prompt::new(prompt_id, content.trim());
        node.prompts.push(prompt.clone());
        self.doc.touch();
        self.audit(
            EventType::PromptAdded,
            &prompt.id,
            json!({ "nodeId": node_id, "content": prompt.content }),
        );
        self.changed();
        Ok(prompt)
    }

    pub fn edit_prompt(&mut self, node_id: &str, prompt_id: &str, content: &str) -> Result<()> {
        self.gate("edit prompt")?;
        let prompt = self
            .node_mut(node_id)?
            .prompt_mut(prompt_id)
            .ok_or_else(|| Error::NotFound(format!("Prompt not found: {}", prompt_id)))?;
        prompt.content = content.trim().to_string();
        self.doc.touch();
        self.changed();
        Ok(())
    }

    /// Mark a prompt done or not done. Setting the current value is a no-op.
    pub fn set_prompt_completed(
        &mut self,
        node_id: &str,
        prompt_id: &str,
        completed: bool,
    ) -> Result<()> {
        self.gate("complete prompt")?;
        let prompt = self
            .node_mut(node_id)?
            .prompt_mut(prompt_id)
            .ok_or_else(|| Error::NotFound(format!("Prompt not found: {}", prompt_id)))?;
        if prompt.completed == completed {
            return Ok(());
        }
        prompt.completed = completed;
        let content = prompt.content.clone();
        self.doc.touch();

        let event_type = if completed {
            EventType::PromptCompleted
        } else {
            EventType::PromptUncompleted
        };
        self.audit(
            event_type,
            prompt_id,
            json!({ "nodeId": node_id, "content": content }),
        );
        self.changed();
        Ok(())
    }

    /// Remove a prompt and any connection drawn from or to its handle.
    pub fn delete_prompt(&mut self, node_id: &str, prompt_id: &str) -> Result<Prompt> {
        self.gate("delete prompt")?;
        let node = self.node_mut(node_id)?;
        let index = node
            .prompts
            .iter()
            .position(|p| p.id == prompt_id)
            .ok_or_else(|| Error::NotFound(format!("Prompt not found: {}", prompt_id)))?;
        let prompt = node.prompts.remove(index);
        self.doc.edges.retain(|e| !e.touches_prompt(node_id, prompt_id));
        self.doc.touch();
        self.audit(
            EventType::PromptDeleted,
            prompt_id,
            json!({ "nodeId": node_id, "content": prompt.content }),
        );
        self.changed();
        Ok(prompt)
    }

    /// Log an external timer transition for a block. The graph is unchanged.
    pub fn record_timer(&mut self, node_id: &str, action: TimerAction, data: Value) -> Result<()> {
        self.gate("track time")?;
        self.node_ref(node_id)?;
        self.audit(action.event_type(), node_id, data);
        Ok(())
    }

    // === Whole-document Replacement ===

    fn replace_document(&mut self, nodes: Vec<Node>, edges: Vec<Edge>, title: Option<String>) {
        self.drag.end();
        self.doc.replace(nodes, edges, title);
    }

    /// Load a backup version as the current document and save it. The
    /// save adds a new version; history is never rewritten.
    pub async fn restore_backup(&mut self, version: u64) -> Result<UpsertOutcome> {
        self.gate("restore backup")?;
        let backup = self.backups.get(&self.canvas_id, version)?;
        info!(canvas_id = %self.canvas_id, version, "restoring backup version");
        self.replace_document(backup.nodes, backup.edges, backup.title);
        self.save_now().await
    }

    /// Replace the document with a slot's contents and save it.
    pub async fn load_slot(&mut self, slot_number: u32) -> Result<UpsertOutcome> {
        self.gate("load slot")?;
        let slot = self.slots.load_slot(&self.canvas_id, slot_number).await?;
        info!(canvas_id = %self.canvas_id, slot_number, "loading slot");
        self.replace_document(slot.nodes, slot.edges, None);
        self.save_now().await
    }

    /// Replace the document with an exported file and save it.
    ///
    /// The file is fully checked first; on error the document is untouched.
    /// Callers are expected to have confirmed the replacement.
    pub async fn import_json(&mut self, text: &str) -> Result<UpsertOutcome> {
        self.gate("import canvas")?;
        let imported = exchange::from_json(text)?;
        info!(
            canvas_id = %self.canvas_id,
            nodes = imported.nodes.len(),
            edges = imported.edges.len(),
            "importing canvas"
        );
        self.replace_document(imported.nodes, imported.edges, Some(imported.title));
        self.save_now().await
    }

    // === Saving ===

    /// Send the current document immediately (after any in-flight save).
    pub async fn save_now(&self) -> Result<UpsertOutcome> {
        self.gate("save canvas")?;
        self.autosave.save_now(self.doc.snapshot()).await
    }

    /// Persist anything pending and report the resulting status.
    pub async fn flush(&self) -> SaveStatus {
        self.autosave.flush().await
    }

    /// End the session: flush pending work and stop the scheduler.
    pub async fn close(self) -> SaveStatus {
        let status = self.autosave.flush().await;
        self.autosave.destroy().await;
        debug!(canvas_id = %self.canvas_id, status = %status, "editing session closed");
        status
    }

    // === Slots ===

    pub async fn save_to_slot(&self, slot_number: u32, name: Option<String>) -> Result<SaveSlot> {
        self.gate("save to slot")?;
        self.slots
            .save_to_slot(
                &self.canvas_id,
                slot_number,
                name,
                &self.doc.nodes,
                &self.doc.edges,
            )
            .await
    }

    pub async fn list_slots(&self) -> Result<Vec<SlotSummary>> {
        self.slots.list(&self.canvas_id).await
    }

    pub async fn delete_slot(&self, slot_number: u32) -> Result<()> {
        self.gate("delete slot")?;
        self.slots.delete(&self.canvas_id, slot_number).await
    }

    // === Reads ===

    /// Backup versions of this canvas, newest first.
    pub fn list_backups(&self) -> Result<Vec<BackupVersion>> {
        self.backups.list_versions(&self.canvas_id)
    }

    /// Audit trail of this canvas grouped by local day.
    pub fn events(&self, filter: &EventFilter) -> Result<Vec<DayGroup>> {
        self.events.list(&self.canvas_id, filter)
    }

    pub fn export_json(&self) -> Result<String> {
        exchange::to_json_string(&self.doc)
    }

    pub fn export_outline(&self) -> String {
        exchange::to_outline(&self.doc)
    }

    // === Sharing ===

    pub async fn list_shares(&self) -> Result<Vec<SharePermission>> {
        permissions::require_owner(self.role, "list shares")?;
        self.repo.list_shares(&self.canvas_id).await
    }

    pub async fn share(&self, email: &str, level: PermissionLevel) -> Result<SharePermission> {
        permissions::require_owner(self.role, "share this canvas")?;
        self.repo
            .add_or_update_share(&self.canvas_id, email, level)
            .await
    }

    pub async fn unshare(&self, email: &str) -> Result<()> {
        permissions::require_owner(self.role, "remove a share")?;
        self.repo.remove_share(&self.canvas_id, email).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::DateRange;
    use crate::models::{AuditEvent, NodeKind, prompt_handle};
    use crate::test_utils::TestEnv;

    async fn wait(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    fn services(env: &TestEnv, user: &str) -> Services {
        Services::from_store(env.store_for(user), BackupRing::in_memory(50))
    }

    async fn open(env: &TestEnv, user: &str, canvas: Option<&str>) -> EditingSession {
        EditingSession::open(user, canvas, services(env, user), SessionConfig::default())
            .await
            .unwrap()
    }

    fn events(session: &EditingSession) -> Vec<AuditEvent> {
        session
            .events(&EventFilter::default())
            .unwrap()
            .into_iter()
            .flat_map(|g| g.events)
            .collect()
    }

    fn task(id: &str, x: f64, y: f64) -> Node {
        Node::new(id, NodeKind::TaskBlock, Position::new(x, y))
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_block_is_audited_then_saved_after_debounce() {
        let env = TestEnv::new();
        let mut session = open(&env, "alice", None).await;
        let store = env.store_for("alice");
        assert!(session.document().nodes.is_empty());

        session.add_node(task("A", 100.0, 100.0)).unwrap();

        let recorded = events(&session);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].event_type, EventType::BlockCreated);
        assert_eq!(recorded[0].target_id, "A");

        // Nothing saved until the window elapses
        wait(2000).await;
        let stored = store.load_canvas(Some(session.canvas_id())).unwrap();
        assert!(stored.nodes.is_empty());

        wait(1100).await;
        let stored = store.load_canvas(Some(session.canvas_id())).unwrap();
        assert_eq!(stored.nodes.len(), 1);
        assert_eq!(session.list_backups().unwrap().len(), 1);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_prompt_handle_to_new_block() {
        let env = TestEnv::new();
        let mut session = open(&env, "alice", None).await;

        session.add_node(task("A", 100.0, 100.0)).unwrap();
        let prompt = session.add_prompt("A", "Draft outline").unwrap();
        session.add_node(task("B", 300.0, 100.0)).unwrap();
        session
            .connect(Edge::new("e1", "A", "B").with_source_handle(prompt_handle(&prompt.id)))
            .unwrap();

        assert_eq!(session.document().nodes.len(), 2);
        assert_eq!(session.document().edges.len(), 1);
        let created: Vec<String> = events(&session)
            .into_iter()
            .filter(|e| e.event_type == EventType::BlockCreated)
            .map(|e| e.target_id)
            .collect();
        assert_eq!(created, vec!["B".to_string(), "A".to_string()]);

        assert_eq!(session.close().await, SaveStatus::Saved);
        let stored = env.store_for("alice").load_canvas(None).unwrap();
        assert_eq!(stored.nodes.len(), 2);
        assert_eq!(stored.edges.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_viewer_cannot_mutate_and_leaves_no_trace() {
        let env = TestEnv::new();
        let mut owner = open(&env, "alice", None).await;
        owner.add_node(task("A", 0.0, 0.0)).unwrap();
        owner.save_now().await.unwrap();
        owner.share("bob@example.com", PermissionLevel::View).await.unwrap();
        let canvas = owner.canvas_id().to_string();
        let events_before = events(&owner).len();
        owner.close().await;

        let mut viewer = open(&env, "bob", Some(&canvas)).await;
        assert_eq!(viewer.role(), Role::View);

        let denied = [
            viewer.add_node(task("B", 0.0, 0.0)).err(),
            viewer.rename_node("A", "New").err(),
            viewer.delete_node("A").err(),
            viewer.move_node("A", Position::new(5.0, 5.0)).err(),
            viewer.drag_node("A", Position::new(5.0, 5.0), true).err(),
            viewer.add_prompt("A", "x").err(),
            viewer.connect(Edge::new("e1", "A", "A")).err(),
            viewer.set_title("Mine").err(),
            viewer.record_timer("A", TimerAction::Started, Value::Null).err(),
            viewer.import_json(r#"{"nodes":[],"edges":[]}"#).await.err(),
            viewer.save_to_slot(1, None).await.err(),
            viewer.save_now().await.err(),
        ];
        for err in denied {
            assert!(matches!(err, Some(Error::Permission(_))), "{:?}", err);
        }

        assert_eq!(viewer.document().nodes.len(), 1);
        assert_eq!(viewer.document().nodes[0].position, Position::new(0.0, 0.0));
        assert_eq!(events(&viewer).len(), events_before);

        wait(10_000).await;
        let stored = env.store_for("alice").load_canvas(Some(&canvas)).unwrap();
        assert_eq!(stored.nodes.len(), 1);
        assert!(viewer.list_backups().unwrap().is_empty());
        viewer.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_editor_collaborator_can_mutate() {
        let env = TestEnv::new();
        let owner = open(&env, "alice", None).await;
        owner.share("carol@example.com", PermissionLevel::Edit).await.unwrap();
        let canvas = owner.canvas_id().to_string();
        owner.close().await;

        let mut editor = open(&env, "carol", Some(&canvas)).await;
        assert_eq!(editor.role(), Role::Edit);
        editor.add_node(task("C", 1.0, 1.0)).unwrap();
        editor.save_now().await.unwrap();
        assert!(matches!(
            editor.list_shares().await,
            Err(Error::Permission(_))
        ));
        editor.close().await;

        let stored = env.store_for("alice").load_canvas(Some(&canvas)).unwrap();
        assert_eq!(stored.nodes[0].id, "C");
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_is_forward_only() {
        let env = TestEnv::new();
        let mut session = open(&env, "alice", None).await;

        session.add_node(task("A", 0.0, 0.0)).unwrap();
        session.save_now().await.unwrap();
        session.add_node(task("B", 0.0, 0.0)).unwrap();
        session.save_now().await.unwrap();
        let before: Vec<(u64, usize)> = session
            .list_backups()
            .unwrap()
            .iter()
            .map(|v| (v.version, v.nodes.len()))
            .collect();
        assert_eq!(before, vec![(2, 2), (1, 1)]);

        session.restore_backup(1).await.unwrap();
        assert_eq!(session.document().nodes.len(), 1);

        let after: Vec<(u64, usize)> = session
            .list_backups()
            .unwrap()
            .iter()
            .map(|v| (v.version, v.nodes.len()))
            .collect();
        assert_eq!(after, vec![(3, 1), (2, 2), (1, 1)]);

        assert!(matches!(
            session.restore_backup(99).await,
            Err(Error::NotFound(_))
        ));
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_slot_persists_without_touching_backups_history() {
        let env = TestEnv::new();
        let mut session = open(&env, "alice", None).await;

        session.add_node(task("A", 0.0, 0.0)).unwrap();
        session.save_to_slot(1, Some("one block".to_string())).await.unwrap();
        session.add_node(task("B", 0.0, 0.0)).unwrap();
        session.save_now().await.unwrap();
        assert_eq!(session.list_backups().unwrap().len(), 1);

        session.load_slot(1).await.unwrap();
        assert_eq!(session.document().nodes.len(), 1);

        let stored = env.store_for("alice").load_canvas(None).unwrap();
        assert_eq!(stored.nodes.len(), 1);
        // The slot load saved once more, adding one version on top
        let versions = session.list_backups().unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[1].nodes.len(), 2);

        let slots = session.list_slots().await.unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].node_count, 1);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_import_leaves_document_unchanged() {
        let env = TestEnv::new();
        let mut session = open(&env, "alice", None).await;
        session.add_node(task("keep", 0.0, 0.0)).unwrap();

        let bad = r#"{"version":"1.0","nodes":[{"id":"x","prompts":[]}],"edges":[{"id":"e1","sourceNodeId":"x","targetNodeId":"y"}]}"#;
        assert!(matches!(
            session.import_json(bad).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            session.import_json(r#"{"nodes":[]}"#).await,
            Err(Error::Validation(_))
        ));
        assert_eq!(session.document().nodes[0].id, "keep");

        let good = r#"{"canvasTitle":"Imported","nodes":[{"id":"x"},{"id":"y"}],"edges":[{"id":"e1","sourceNodeId":"x","targetNodeId":"y"}]}"#;
        session.import_json(good).await.unwrap();
        assert_eq!(session.document().title, "Imported");
        let stored = env.store_for("alice").load_canvas(None).unwrap();
        assert_eq!(stored.nodes.len(), 2);
        assert_eq!(stored.title.as_deref(), Some("Imported"));
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_deletes_cascade_to_connections() {
        let env = TestEnv::new();
        let mut session = open(&env, "alice", None).await;

        session.add_node(task("A", 0.0, 0.0)).unwrap();
        session.add_node(task("B", 0.0, 0.0)).unwrap();
        session.add_node(task("C", 0.0, 0.0)).unwrap();
        let prompt = session.add_prompt("A", "step").unwrap();
        session
            .connect(Edge::new("e1", "A", "B").with_source_handle(prompt_handle(&prompt.id)))
            .unwrap();
        session.connect(Edge::new("e2", "B", "C")).unwrap();

        session.delete_prompt("A", &prompt.id).unwrap();
        assert_eq!(session.document().edges.len(), 1);

        session.delete_node("C").unwrap();
        assert!(session.document().edges.is_empty());

        let types: Vec<EventType> = events(&session).iter().map(|e| e.event_type).collect();
        assert!(types.contains(&EventType::PromptDeleted));
        assert!(types.contains(&EventType::BlockDeleted));
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_prompt_completion_events() {
        let env = TestEnv::new();
        let mut session = open(&env, "alice", None).await;
        session.add_node(task("A", 0.0, 0.0)).unwrap();
        let prompt = session.add_prompt("A", "write tests").unwrap();

        session.set_prompt_completed("A", &prompt.id, true).unwrap();
        session.set_prompt_completed("A", &prompt.id, true).unwrap();
        session.set_prompt_completed("A", &prompt.id, false).unwrap();

        let filter = EventFilter::default()
            .with_type(EventType::PromptCompleted)
            .with_type(EventType::PromptUncompleted)
            .with_range(DateRange::Today);
        let toggles: Vec<EventType> = session
            .events(&filter)
            .unwrap()
            .into_iter()
            .flat_map(|g| g.events)
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            toggles,
            vec![EventType::PromptUncompleted, EventType::PromptCompleted]
        );
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_events_do_not_schedule_saves() {
        let env = TestEnv::new();
        let mut session = open(&env, "alice", None).await;
        session.add_node(task("A", 0.0, 0.0)).unwrap();
        session.save_now().await.unwrap();

        session
            .record_timer("A", TimerAction::Started, json!({ "source": "manual" }))
            .unwrap();
        session
            .record_timer("A", TimerAction::Stopped, Value::Null)
            .unwrap();
        assert!(matches!(
            session.record_timer("missing", TimerAction::Started, Value::Null),
            Err(Error::NotFound(_))
        ));

        wait(5000).await;
        assert_eq!(session.list_backups().unwrap().len(), 1);
        let latest = &events(&session)[0];
        assert_eq!(latest.event_type, EventType::TimerStopped);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cascading_drag_through_session() {
        let env = TestEnv::new();
        let mut session = open(&env, "alice", None).await;
        for id in ["A", "B", "C", "D"] {
            session.add_node(task(id, 0.0, 0.0)).unwrap();
        }
        session.connect(Edge::new("e1", "A", "B")).unwrap();
        session.connect(Edge::new("e2", "B", "C")).unwrap();

        session
            .drag_node("A", Position::new(10.0, 5.0), true)
            .unwrap();
        session.end_drag();

        let doc = session.document();
        assert_eq!(doc.node("B").unwrap().position, Position::new(10.0, 5.0));
        assert_eq!(doc.node("C").unwrap().position, Position::new(10.0, 5.0));
        assert_eq!(doc.node("D").unwrap().position, Position::new(0.0, 0.0));
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopen_resumes_latest_canvas() {
        let env = TestEnv::new();
        let mut session = open(&env, "alice", None).await;
        session.set_title("Roadmap").unwrap();
        session.add_node(task("A", 0.0, 0.0)).unwrap();
        let canvas = session.canvas_id().to_string();
        session.close().await;

        let reopened = open(&env, "alice", None).await;
        assert_eq!(reopened.canvas_id(), canvas);
        assert_eq!(reopened.document().title, "Roadmap");
        assert_eq!(reopened.document().nodes.len(), 1);
        reopened.close().await;
    }

    #[tokio::test]
    async fn test_open_requires_access() {
        let env = TestEnv::new();
        let owner = open(&env, "alice", None).await;
        let canvas = owner.canvas_id().to_string();
        owner.close().await;

        let result = EditingSession::open(
            "mallory",
            Some(&canvas),
            services(&env, "mallory"),
            SessionConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(Error::NotFound(_))));

        let anonymous = Services::from_store(
            env.store_for("alice").anonymous(),
            BackupRing::in_memory(5),
        );
        let result =
            EditingSession::open("alice", None, anonymous, SessionConfig::default()).await;
        assert!(matches!(result, Err(Error::Auth)));
    }
}

//! Local ring of backup versions.
//!
//! Every successful remote save appends a full-document [`BackupVersion`]
//! for its canvas. The ring is a capped FIFO per canvas: once it exceeds
//! its cap the oldest versions are evicted. Version numbers strictly
//! increase and are never reused; restoring a version saves it as a new
//! one instead of rewriting history.
//!
//! Rings are mirrored to `backups/<hash>.jsonl` under the data directory,
//! one version per line, oldest first.

use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::autosave::SaveListener;
use crate::models::{BackupVersion, GraphSnapshot};
use crate::storage::short_hash;
use crate::{Error, Result};

/// Versions kept per canvas unless configured otherwise.
pub const DEFAULT_BACKUP_CAP: usize = 50;

/// Per-canvas capped history of saved documents.
pub struct BackupRing {
    /// `None` keeps everything in memory only
    dir: Option<PathBuf>,
    cap: usize,
    rings: Mutex<HashMap<String, VecDeque<BackupVersion>>>,
}

impl BackupRing {
    /// A ring mirrored to files under `dir`.
    pub fn open(dir: &Path, cap: usize) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: Some(dir.to_path_buf()),
            cap: cap.max(1),
            rings: Mutex::new(HashMap::new()),
        })
    }

    /// A ring that never touches disk.
    pub fn in_memory(cap: usize) -> Self {
        Self {
            dir: None,
            cap: cap.max(1),
            rings: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, VecDeque<BackupVersion>>>> {
        self.rings
            .lock()
            .map_err(|_| Error::Persistence("backup ring lock poisoned".to_string()))
    }

    fn file_for(&self, canvas_id: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.jsonl", short_hash(canvas_id))))
    }

    /// Make sure the ring for `canvas_id` has been read from disk.
    fn ensure_loaded<'a>(
        &self,
        rings: &'a mut HashMap<String, VecDeque<BackupVersion>>,
        canvas_id: &str,
    ) -> Result<&'a mut VecDeque<BackupVersion>> {
        if !rings.contains_key(canvas_id) {
            let loaded = match self.file_for(canvas_id) {
                Some(path) => read_versions(&path, canvas_id)?,
                None => VecDeque::new(),
            };
            rings.insert(canvas_id.to_string(), loaded);
        }
        rings
            .get_mut(canvas_id)
            .ok_or_else(|| Error::NotFound(format!("No backups for {}", canvas_id)))
    }

    /// Append a new version for `canvas_id`, evicting the oldest past the cap.
    pub fn record(&self, canvas_id: &str, snapshot: &GraphSnapshot) -> Result<BackupVersion> {
        let mut rings = self.lock()?;
        let ring = self.ensure_loaded(&mut rings, canvas_id)?;

        let version = ring.back().map(|v| v.version + 1).unwrap_or(1);
        let backup = BackupVersion {
            canvas_id: canvas_id.to_string(),
            version,
            timestamp: Utc::now(),
            nodes: snapshot.nodes.clone(),
            edges: snapshot.edges.clone(),
            title: snapshot.title.clone(),
        };
        ring.push_back(backup.clone());

        let mut evicted = 0;
        while ring.len() > self.cap {
            ring.pop_front();
            evicted += 1;
        }

        if let Some(path) = self.file_for(canvas_id) {
            if evicted > 0 {
                rewrite_versions(&path, ring)?;
                debug!(canvas_id, evicted, "evicted oldest backup versions");
            } else {
                append_version(&path, &backup)?;
            }
        }

        debug!(canvas_id, version, "backup version recorded");
        Ok(backup)
    }

    /// All retained versions, newest first.
    pub fn list_versions(&self, canvas_id: &str) -> Result<Vec<BackupVersion>> {
        let mut rings = self.lock()?;
        let ring = self.ensure_loaded(&mut rings, canvas_id)?;
        Ok(ring.iter().rev().cloned().collect())
    }

    /// One retained version.
    pub fn get(&self, canvas_id: &str, version: u64) -> Result<BackupVersion> {
        let mut rings = self.lock()?;
        let ring = self.ensure_loaded(&mut rings, canvas_id)?;
        ring.iter()
            .find(|v| v.version == version)
            .cloned()
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "Backup version {} not found for {}",
                    version, canvas_id
                ))
            })
    }
}

impl SaveListener for BackupRing {
    fn on_saved(&self, canvas_id: &str, snapshot: &GraphSnapshot) {
        if let Err(e) = self.record(canvas_id, snapshot) {
            warn!(canvas_id, error = %e, "failed to record backup version");
        }
    }
}

/// Read a ring file, skipping blank or unreadable lines.
fn read_versions(path: &Path, canvas_id: &str) -> Result<VecDeque<BackupVersion>> {
    if !path.exists() {
        return Ok(VecDeque::new());
    }

    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut versions = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<BackupVersion>(&line) {
            Ok(version) if version.canvas_id == canvas_id => versions.push(version),
            Ok(_) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable backup line"),
        }
    }
    versions.sort_by_key(|v| v.version);
    Ok(versions.into())
}

fn append_version(path: &Path, version: &BackupVersion) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let json = serde_json::to_string(version)?;
    writeln!(file, "{}", json)?;
    Ok(())
}

/// Replace the ring file in one step so a crash never leaves half a file.
fn rewrite_versions(path: &Path, ring: &VecDeque<BackupVersion>) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Persistence(format!("No parent for {}", path.display())))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    for version in ring {
        writeln!(tmp, "{}", serde_json::to_string(version)?)?;
    }
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

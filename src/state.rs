//! File-backed run state (`estado.json`).
//!
//! The whole document is read at the start of a run and replaced at the
//! end. Replacement writes a sibling temp file and renames it over the old
//! one, so a crash leaves either the old or the new document.

use crate::error::Result;
use crate::types::{EntityKind, TrackedItem};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    #[serde(default)]
    pub tracked_projects: Vec<TrackedItem>,
    #[serde(default)]
    pub recent_votes: Vec<TrackedItem>,
    #[serde(default)]
    pub active_mps: Vec<TrackedItem>,
    /// Kept as written by whoever maintains it
    #[serde(default)]
    pub posted_news: Vec<Value>,
    /// Rotation cursor over the legislator list
    #[serde(default, alias = "last_processed_deputy_index")]
    pub last_processed_index: usize,
    /// Keys this program does not know about, written back untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RunState {
    /// Load the state file; a missing file is an empty state.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "no state file yet, starting empty");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let state: RunState = serde_json::from_str(&content)?;
        debug!(
            bills = state.tracked_projects.len(),
            votes = state.recent_votes.len(),
            decrees = state.active_mps.len(),
            "state loaded"
        );
        Ok(state)
    }

    /// Replace the state file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = temp_path(path);
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "state saved");
        Ok(())
    }

    pub fn tracked(&self, kind: EntityKind) -> &[TrackedItem] {
        match kind {
            EntityKind::Bill => &self.tracked_projects,
            EntityKind::Vote => &self.recent_votes,
            EntityKind::Decree => &self.active_mps,
        }
    }

    pub fn set_tracked(&mut self, kind: EntityKind, items: Vec<TrackedItem>) {
        match kind {
            EntityKind::Bill => self.tracked_projects = items,
            EntityKind::Vote => self.recent_votes = items,
            EntityKind::Decree => self.active_mps = items,
        }
    }

    /// Cursor position to process next over a list of `len` entries,
    /// wrapping to the start past the end.
    pub fn cursor(&self, len: usize) -> usize {
        if self.last_processed_index >= len {
            0
        } else {
            self.last_processed_index
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "estado.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

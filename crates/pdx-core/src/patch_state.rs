//! Persisted conflict resolutions of a collection
//!
//! Stored as `state.json` in the collection's patch mod directory.

use crate::collaborators::PatchStateReader;
use crate::definition::Definition;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the state inside the patch directory
pub const STATE_FILE: &str = "state.json";

/// How conflicts were resolved when the state was saved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchStateMode {
    None,
    #[default]
    Default,
    Advanced,
}

/// Conflict resolutions of a collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchState {
    pub mode: PatchStateMode,
    /// Definitions chosen as winners
    pub resolved_conflicts: Vec<Definition>,
    pub ignored_conflicts: Vec<Definition>,
    /// Latest code per resolved identity
    pub conflict_history: Vec<Definition>,
    /// User-authored definitions
    pub custom_conflicts: Vec<Definition>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PatchState {
    /// Location of a patch's state below `root`
    pub fn path_for(root: &Path, patch_name: &str) -> PathBuf {
        root.join(patch_name).join(STATE_FILE)
    }

    /// Load a state file, `None` if it does not exist
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Save the state, stamping `updated_at`
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.updated_at = Some(Utc::now());
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Reads `state.json` files from disk
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPatchStateStore;

#[async_trait]
impl PatchStateReader for JsonPatchStateStore {
    async fn get_patch_state(&self, root: &Path, patch_name: &str) -> Result<Option<PatchState>> {
        let path = PatchState::path_for(root, patch_name);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No patch state");
                return Ok(None);
            }
            Err(e) => return Err(Error::FileRead { path, source: e }),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ValueType;
    use tempfile::TempDir;

    fn state() -> PatchState {
        let resolved = Definition::new("a", "common/t", ValueType::Object, "common/t/00.txt", "m", "a = 1");
        let mut history = resolved.clone();
        history.code = "a = 2".to_string();
        PatchState {
            resolved_conflicts: vec![resolved],
            conflict_history: vec![history],
            ..Default::default()
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = PatchState::path_for(dir.path(), "pdx_merge_main");
        let mut saved = state();
        saved.save(&path).unwrap();
        assert!(saved.updated_at.is_some());

        let loaded = PatchState::load(&path).unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.conflict_history[0].code, "a = 2");
    }

    #[test]
    fn test_missing_state_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(PatchState::load(dir.path().join("nope.json")).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_reads_state() {
        let dir = TempDir::new().unwrap();
        let mut saved = state();
        saved.save(PatchState::path_for(dir.path(), "p")).unwrap();

        let store = JsonPatchStateStore;
        let loaded = store.get_patch_state(dir.path(), "p").await.unwrap();
        assert_eq!(loaded, Some(saved));
        assert!(store.get_patch_state(dir.path(), "other").await.unwrap().is_none());
    }
}

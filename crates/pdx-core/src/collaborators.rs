//! Interfaces to the outside world used by the merge service
//!
//! Every I/O boundary of a merge is one of these traits so the service can
//! run against local disk, in-memory fakes, or anything else.

use crate::definition::Definition;
use crate::error::Result;
use crate::mods::{Game, ModMetadata, MOD_DIRECTORY};
use crate::patch_state::PatchState;
use crate::progress::ProgressEvent;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

/// Creates and clears mod directories and descriptors
///
/// Paths are relative to `root`. Every operation is idempotent.
#[async_trait]
pub trait ModWriter: Send + Sync {
    async fn purge_mod_directory(&self, root: &Path, path: &str) -> Result<()>;

    async fn create_mod_directory(&self, root: &Path, path: &str) -> Result<()>;

    async fn write_descriptor(&self, root: &Path, path: &str, descriptor: &ModMetadata) -> Result<()>;
}

/// Writes merged output into the target mod
#[async_trait]
pub trait ModMergeExporter: Send + Sync {
    /// Write definitions to their files below `export_path`
    async fn export_definitions(&self, export_path: &Path, definitions: &[Definition], game: &str) -> Result<()>;

    /// Copy one mod-relative file from `root_mod_path` to `export_path`
    async fn export_files(&self, root_mod_path: &Path, file: &str, export_path: &Path) -> Result<()>;
}

/// Loads a collection's stored conflict resolutions
#[async_trait]
pub trait PatchStateReader: Send + Sync {
    /// `None` when the patch has never been saved
    async fn get_patch_state(&self, root: &Path, patch_name: &str) -> Result<Option<PatchState>>;
}

/// Receives progress notifications, without acknowledgement
#[async_trait]
pub trait ProgressPublisher: Send + Sync {
    async fn publish(&self, event: ProgressEvent);
}

/// Lists installed mods for a game
#[async_trait]
pub trait ModCatalog: Send + Sync {
    async fn installed_mods(&self, game: &Game) -> Result<Vec<ModMetadata>>;
}

/// Lists the files of an installed mod
#[async_trait]
pub trait ModFileReader: Send + Sync {
    /// Mod-relative paths with `/` separators
    async fn list_files(&self, mod_path: &Path) -> Result<Vec<String>>;
}

/// Maps a mod name to its content directory
pub trait ModDirectoryResolver: Send + Sync {
    fn mod_directory(&self, game: &Game, name: &str) -> PathBuf;
}

/// Mods live in `<user directory>/mod/<name>`
#[derive(Debug, Clone, Copy, Default)]
pub struct UserDirectoryResolver;

impl ModDirectoryResolver for UserDirectoryResolver {
    fn mod_directory(&self, game: &Game, name: &str) -> PathBuf {
        game.user_directory.join(MOD_DIRECTORY).join(name)
    }
}

/// Publishes progress as log lines
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgressPublisher;

#[async_trait]
impl ProgressPublisher for LogProgressPublisher {
    async fn publish(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::DefinitionMerge { percentage } => {
                info!(percentage, "Merging definitions");
            }
            ProgressEvent::FileMerge { step, percentage } => {
                info!(step, percentage, "Merging files");
            }
        }
    }
}

//! Local filesystem implementations of the writer and exporter

use crate::collaborators::{ModMergeExporter, ModWriter};
use crate::definition::{Definition, ValueType};
use crate::error::{Error, Result};
use crate::mods::ModMetadata;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Render a descriptor in the script format read back by the catalog
pub fn descriptor_text(descriptor: &ModMetadata) -> String {
    let mut text = format!(
        "name=\"{}\"\npath=\"{}\"\nversion=\"{}\"\n",
        descriptor.name,
        descriptor.path.display().to_string().replace('\\', "/"),
        descriptor.version
    );
    if !descriptor.dependencies.is_empty() {
        let quoted: Vec<String> = descriptor
            .dependencies
            .iter()
            .map(|d| format!("\"{}\"", d))
            .collect();
        text.push_str(&format!("dependencies={{\n\t{}\n}}\n", quoted.join("\n\t")));
    }
    text
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

async fn copy_file(source: &Path, target: &Path) -> Result<()> {
    ensure_parent(target).await?;
    fs::copy(source, target).await.map_err(|e| Error::FileRead {
        path: source.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Writes mod directories and descriptors under a root directory
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalModWriter;

#[async_trait]
impl ModWriter for LocalModWriter {
    async fn purge_mod_directory(&self, root: &Path, path: &str) -> Result<()> {
        let target = root.join(path);
        match fs::remove_dir_all(&target).await {
            Ok(()) => {
                debug!(path = %target.display(), "Purged mod directory");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_mod_directory(&self, root: &Path, path: &str) -> Result<()> {
        fs::create_dir_all(root.join(path)).await?;
        Ok(())
    }

    async fn write_descriptor(&self, root: &Path, path: &str, descriptor: &ModMetadata) -> Result<()> {
        let target = root.join(path);
        ensure_parent(&target).await?;
        fs::write(&target, descriptor_text(descriptor)).await?;
        debug!(path = %target.display(), "Wrote descriptor");
        Ok(())
    }
}

/// Writes merged definitions and copied files below an export directory
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalMergeExporter;

#[async_trait]
impl ModMergeExporter for LocalMergeExporter {
    async fn export_definitions(&self, export_path: &Path, definitions: &[Definition], game: &str) -> Result<()> {
        let mut texts: BTreeMap<PathBuf, String> = BTreeMap::new();
        for definition in definitions {
            let target = export_path.join(definition.file.replace('\\', "/"));
            if definition.value_type == ValueType::Binary {
                copy_file(Path::new(&definition.disk_file), &target).await?;
                continue;
            }
            let text = texts.entry(target).or_default();
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&definition.code);
        }
        for (target, text) in texts {
            ensure_parent(&target).await?;
            fs::write(&target, text).await?;
            debug!(game, path = %target.display(), "Exported definitions");
        }
        Ok(())
    }

    async fn export_files(&self, root_mod_path: &Path, file: &str, export_path: &Path) -> Result<()> {
        let relative = file.replace('\\', "/");
        copy_file(&root_mod_path.join(&relative), &export_path.join(&relative)).await
    }
}

//! Mod directory scanner: lists files, extracts definitions, reads descriptors

use crate::collaborators::{ModCatalog, ModFileReader};
use crate::definition::Definition;
use crate::error::{Error, Result};
use crate::extract::{binary_definition, extract_definitions, ExtractArgs};
use crate::index::IndexedDefinitions;
use crate::mods::{Game, ModMetadata, ModSource, MOD_DIRECTORY, MOD_EXTENSION};
use crate::parser::parse_script_str;
use crate::rules::DefinitionInfoProvider;
use async_trait::async_trait;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Extensions parsed as script, everything else is copied as binary
pub const SCRIPT_EXTENSIONS: &[&str] = &["txt", "gui", "gfx", "asset"];

/// Descriptor every mod ships at its root
const DESCRIPTOR_FILE: &str = "descriptor.mod";

/// Check if a mod-relative file is parsed as script
pub fn is_script_file(file: &str) -> bool {
    Path::new(file)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SCRIPT_EXTENSIONS.iter().any(|s| s.eq_ignore_ascii_case(ext)))
}

/// Files below `root`, relative with `/` separators, sorted
pub fn list_mod_files<P: AsRef<Path>>(root: P) -> Result<Vec<String>> {
    let root = root.as_ref();
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        if relative.eq_ignore_ascii_case(DESCRIPTOR_FILE) {
            continue;
        }
        files.push(relative);
    }
    files.sort();
    Ok(files)
}

/// Extract the definitions of one installed mod
///
/// Only files under the game's folders are considered. A script file with
/// a syntax error is logged and skipped.
pub fn scan_mod(
    game: &Game,
    installed: &ModMetadata,
    provider: Option<&dyn DefinitionInfoProvider>,
) -> Result<Vec<Definition>> {
    let mut definitions = Vec::new();
    for file in list_mod_files(&installed.path)? {
        if !game.game_folders.is_empty() && !game.is_game_file(&file) {
            continue;
        }
        let disk_path = installed.path.join(&file);
        let disk_file = disk_path.display().to_string();
        if !is_script_file(&file) {
            definitions.push(binary_definition(&file, &disk_file, &installed.name));
            continue;
        }

        let content = fs::read_to_string(&disk_path).map_err(|e| Error::FileRead {
            path: disk_path.clone(),
            source: e,
        })?;
        let lines: Vec<String> = content.lines().map(String::from).collect();
        let args = ExtractArgs {
            file: &file,
            disk_file: &disk_file,
            mod_name: &installed.name,
            dependencies: &installed.dependencies,
            lines: &lines,
            tagged_blocks: provider.is_some_and(|p| p.uses_tagged_blocks(&file)),
        };
        match extract_definitions(args) {
            Ok(found) => {
                debug!(file = %file, count = found.len(), "Extracted definitions");
                definitions.extend(found);
            }
            Err(e) => warn!(
                mod_name = %installed.name,
                file = %file,
                line = e.line,
                column = e.column,
                "Skipping file: {}",
                e.message
            ),
        }
    }
    Ok(definitions)
}

/// Extract and index the definitions of several mods in load order
pub fn scan_collection(
    game: &Game,
    mods: &[&ModMetadata],
    provider: Option<&dyn DefinitionInfoProvider>,
) -> Result<IndexedDefinitions> {
    let mut all = Vec::new();
    for installed in mods {
        let definitions = scan_mod(game, installed, provider)?;
        info!(mod_name = %installed.name, definitions = definitions.len(), "Scanned mod");
        all.extend(definitions);
    }
    Ok(IndexedDefinitions::build(all, false))
}

/// Read a `.mod` descriptor
pub fn read_descriptor(game: &Game, path: &Path) -> Result<ModMetadata> {
    let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let root = parse_script_str(&content, &file_name)?;
    let value = |key: &str| {
        root.find_key_value(key)
            .map(|kv| kv.value.clone())
            .unwrap_or_default()
    };

    let mod_path = value("path");
    let full_path = if Path::new(&mod_path).is_absolute() {
        mod_path.into()
    } else {
        game.user_directory.join(mod_path)
    };
    let dependencies = root
        .find_node("dependencies")
        .map(|node| node.values.iter().map(|v| v.value.clone()).collect())
        .unwrap_or_default();

    Ok(ModMetadata {
        name: value("name"),
        descriptor_file: format!("{}/{}", MOD_DIRECTORY, file_name),
        path: full_path,
        version: value("version"),
        source: ModSource::Local,
        dependencies,
    })
}

/// Lists mod content with walkdir
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalModFileReader;

#[async_trait]
impl ModFileReader for LocalModFileReader {
    async fn list_files(&self, mod_path: &Path) -> Result<Vec<String>> {
        let root = mod_path.to_path_buf();
        tokio::task::spawn_blocking(move || list_mod_files(root)).await?
    }
}

/// Installed mods: descriptors in `<user directory>/mod` plus configured mods
#[derive(Debug, Clone, Default)]
pub struct DescriptorCatalog {
    /// Mods declared in configuration, taking precedence by name
    pub configured: Vec<ModMetadata>,
}

#[async_trait]
impl ModCatalog for DescriptorCatalog {
    async fn installed_mods(&self, game: &Game) -> Result<Vec<ModMetadata>> {
        let game = game.clone();
        let configured = self.configured.clone();
        tokio::task::spawn_blocking(move || read_catalog(&game, configured)).await?
    }
}

fn read_catalog(game: &Game, configured: Vec<ModMetadata>) -> Result<Vec<ModMetadata>> {
    let mut mods = configured;
    let directory = game.user_directory.join(MOD_DIRECTORY);
    if !directory.is_dir() {
        return Ok(mods);
    }

    let mut descriptors: Vec<_> = fs::read_dir(&directory)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(MOD_EXTENSION))
        })
        .collect();
    descriptors.sort();

    for path in descriptors {
        match read_descriptor(game, &path) {
            Ok(found) if !found.name.is_empty() => {
                if !mods.iter().any(|m| m.name == found.name) {
                    mods.push(found);
                }
            }
            Ok(_) => warn!(path = %path.display(), "Descriptor without a name"),
            Err(e) => warn!(path = %path.display(), "Skipping descriptor: {}", e),
        }
    }
    Ok(mods)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ValueType;
    use tempfile::TempDir;

    fn write(root: &Path, file: &str, content: &str) {
        let path = root.join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn game(user_directory: &Path) -> Game {
        Game {
            key: "stellaris".into(),
            user_directory: user_directory.to_path_buf(),
            game_folders: vec!["common".into(), "gfx".into()],
        }
    }

    #[test]
    fn test_list_mod_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "descriptor.mod", "name=\"a\"");
        write(dir.path(), "common/b/01.txt", "");
        write(dir.path(), "common/a/00.txt", "");
        let files = list_mod_files(dir.path()).unwrap();
        assert_eq!(files, vec!["common/a/00.txt", "common/b/01.txt"]);
    }

    #[test]
    fn test_scan_mod_skips_broken_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "common/buildings/00.txt", "building_a = { cost = 1 }\nbuilding_b = { }");
        write(dir.path(), "common/buildings/01_broken.txt", "building_c = {");
        write(dir.path(), "gfx/icon.dds", "binary");
        write(dir.path(), "readme.md", "not game content");

        let installed = ModMetadata {
            name: "mod_a".into(),
            path: dir.path().to_path_buf(),
            ..Default::default()
        };
        let definitions = scan_mod(&game(dir.path()), &installed, None).unwrap();
        let ids: Vec<&str> = definitions.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["building_a", "building_b", "icon.dds"]);
        assert_eq!(definitions[2].value_type, ValueType::Binary);
        assert!(definitions.iter().all(|d| d.mod_name == "mod_a"));
    }

    #[tokio::test]
    async fn test_catalog_reads_descriptors() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "mod/ugc_1.mod",
            "name=\"Better Things\"\npath=\"mod/better\"\nversion=\"2.1\"\ndependencies={\n\t\"Base\"\n}",
        );
        write(dir.path(), "mod/broken.mod", "name = {");
        let configured = ModMetadata {
            name: "Configured".into(),
            path: dir.path().join("elsewhere"),
            ..Default::default()
        };

        let catalog = DescriptorCatalog {
            configured: vec![configured],
        };
        let mods = catalog.installed_mods(&game(dir.path())).await.unwrap();
        assert_eq!(mods.len(), 2);
        assert_eq!(mods[1].name, "Better Things");
        assert_eq!(mods[1].path, dir.path().join("mod/better"));
        assert_eq!(mods[1].version, "2.1");
        assert_eq!(mods[1].dependencies, vec!["Base".to_string()]);
        assert_eq!(mods[1].descriptor_file, "mod/ugc_1.mod");
    }

    #[tokio::test]
    async fn test_file_reader_lists_relative_paths() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "descriptor.mod", "name=\"a\"");
        write(dir.path(), "common/a/00.txt", "");
        let files = LocalModFileReader.list_files(dir.path()).await.unwrap();
        assert_eq!(files, vec!["common/a/00.txt"]);
    }
}

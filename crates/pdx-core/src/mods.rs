//! Games, installed mods and collections

use crate::rules::matches_prefix;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::PathBuf;

/// Folder under the user directory holding mods and descriptors
pub const MOD_DIRECTORY: &str = "mod";
/// Descriptor file extension
pub const MOD_EXTENSION: &str = ".mod";
/// Cache prefix for installed mod listings
pub const MODS_CACHE_PREFIX: &str = "mods";
/// Prefix of a collection's conflict-resolution patch mod
pub const PATCH_MOD_PREFIX: &str = "pdx_merge_";

/// A game whose mods are merged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Game {
    /// Short key, matched against definition info providers
    pub key: String,
    /// Directory holding the `mod` folder
    pub user_directory: PathBuf,
    /// Top-level folders that carry game content, e.g. `common`
    pub game_folders: Vec<String>,
}

impl Game {
    /// Check if a mod-relative file lives under one of the game folders
    pub fn is_game_file(&self, file: &str) -> bool {
        matches_prefix(&self.game_folders, file)
    }
}

/// Where a mod was installed from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModSource {
    #[default]
    Local,
    Steam,
    Paradox,
}

/// An installed mod
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModMetadata {
    pub name: String,
    /// Descriptor path relative to the user directory, e.g. `mod/abc.mod`
    pub descriptor_file: String,
    /// Absolute content directory
    pub path: PathBuf,
    pub version: String,
    pub source: ModSource,
    pub dependencies: Vec<String>,
}

/// Named, ordered set of mods
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModCollection {
    pub name: String,
    /// Mod names in load order
    pub mods: Vec<String>,
}

impl ModCollection {
    /// Installed mods of this collection in load order
    pub fn resolve<'a>(&self, installed: &'a [ModMetadata]) -> Vec<&'a ModMetadata> {
        self.mods
            .iter()
            .filter_map(|name| installed.iter().find(|m| &m.name == name))
            .collect()
    }
}

/// Characters that are not allowed in a file name on any supported platform
const INVALID_FILE_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// File system safe form of a collection name
pub fn generate_valid_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control() && !INVALID_FILE_NAME_CHARS.contains(c))
        .collect();
    cleaned.trim().trim_end_matches('.').to_string()
}

/// Name of the patch mod that stores a collection's conflict resolutions
pub fn generate_collection_patch_name(collection_name: &str) -> String {
    format!("{}{}", PATCH_MOD_PREFIX, generate_valid_file_name(collection_name))
}

/// Compare dotted version strings numerically, `*` and garbage count as 0
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parts = |v: &str| -> Vec<u64> {
        v.trim_start_matches(['v', 'V'])
            .split('.')
            .map(|p| p.trim().parse().unwrap_or(0))
            .collect()
    };
    let (a, b) = (parts(a), parts(b));
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| a.get(i).unwrap_or(&0).cmp(b.get(i).unwrap_or(&0)))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Highest version among the mods, empty when there are none
pub fn highest_version(mods: &[ModMetadata]) -> String {
    mods.iter()
        .map(|m| m.version.as_str())
        .max_by(|a, b| compare_versions(a, b))
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_valid_file_name() {
        assert_eq!(generate_valid_file_name("My: Collection?"), "My Collection");
        assert_eq!(generate_valid_file_name(" a/b\\c. "), "abc");
        assert_eq!(generate_collection_patch_name("Main"), "pdx_merge_Main");
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("2.10", "2.9"), Ordering::Greater);
        assert_eq!(compare_versions("v3.0.*", "3.0"), Ordering::Equal);
        assert_eq!(compare_versions("1", "1.0.1"), Ordering::Less);

        let mods = vec![
            ModMetadata { version: "2.9".into(), ..Default::default() },
            ModMetadata { version: "2.10.1".into(), ..Default::default() },
        ];
        assert_eq!(highest_version(&mods), "2.10.1");
        assert_eq!(highest_version(&[]), "");
    }

    #[test]
    fn test_collection_resolve_keeps_load_order() {
        let installed = vec![
            ModMetadata { name: "b".into(), ..Default::default() },
            ModMetadata { name: "a".into(), ..Default::default() },
        ];
        let collection = ModCollection {
            name: "c".into(),
            mods: vec!["a".into(), "missing".into(), "b".into()],
        };
        let names: Vec<&str> = collection.resolve(&installed).iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_game_file() {
        let game = Game {
            game_folders: vec!["common".into(), "gfx".into()],
            ..Default::default()
        };
        assert!(game.is_game_file("Common\\buildings\\a.txt"));
        assert!(!game.is_game_file("descriptor.mod"));
        assert!(!game.is_game_file("commonwealth/x.txt"));
        assert!(game.is_game_file("gfx/icon.dds"));
    }
}

//! Merge configuration file (JSON)

use crate::error::{Error, Result};
use crate::mods::{Game, ModCollection, ModMetadata, ModSource};
use crate::rules::ConfiguredInfoProvider;
use crate::service::DuplicatePolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Game section of the configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub key: String,
    /// Directory holding the `mod` folder and descriptors
    pub user_directory: PathBuf,
    /// Where relative mod paths are resolved, defaults to the user directory
    pub mod_directory: Option<PathBuf>,
    pub game_folders: Vec<String>,
    pub fios_paths: Vec<String>,
    pub lios_paths: Vec<String>,
    pub tagged_paths: Vec<String>,
}

/// One mod of the collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModConfig {
    pub name: String,
    pub path: PathBuf,
    pub version: String,
    pub dependencies: Vec<String>,
}

/// Collection section, mods in load order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    pub name: String,
    pub mods: Vec<ModConfig>,
}

/// Everything needed to run a merge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    pub game: GameConfig,
    pub collection: CollectionConfig,
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
}

impl MergeConfig {
    /// Load and validate a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject configurations a merge cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.game.key.trim().is_empty() {
            return Err(Error::InvalidConfig("game.key is empty".to_string()));
        }
        if self.collection.name.trim().is_empty() {
            return Err(Error::InvalidConfig("collection.name is empty".to_string()));
        }
        for (i, m) in self.collection.mods.iter().enumerate() {
            if m.name.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("collection.mods[{}] has no name", i)));
            }
            if self.collection.mods[..i].iter().any(|other| other.name == m.name) {
                return Err(Error::InvalidConfig(format!("mod '{}' is listed twice", m.name)));
            }
        }
        Ok(())
    }

    /// A template to start from
    pub fn template() -> Self {
        Self {
            game: GameConfig {
                key: "stellaris".to_string(),
                user_directory: PathBuf::from("/path/to/Paradox Interactive/Stellaris"),
                mod_directory: None,
                game_folders: ["common", "events", "gfx", "interface", "localisation"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                fios_paths: vec!["common/scripted_effects".to_string()],
                lios_paths: Vec::new(),
                tagged_paths: vec!["common/defines".to_string()],
            },
            collection: CollectionConfig {
                name: "My Collection".to_string(),
                mods: vec![ModConfig {
                    name: "First Mod".to_string(),
                    path: PathBuf::from("mod/first_mod"),
                    version: "1.0".to_string(),
                    dependencies: Vec::new(),
                }],
            },
            duplicate_policy: DuplicatePolicy::default(),
        }
    }

    pub fn to_game(&self) -> Game {
        Game {
            key: self.game.key.clone(),
            user_directory: self.game.user_directory.clone(),
            game_folders: self.game.game_folders.clone(),
        }
    }

    pub fn to_collection(&self) -> ModCollection {
        ModCollection {
            name: self.collection.name.clone(),
            mods: self.collection.mods.iter().map(|m| m.name.clone()).collect(),
        }
    }

    pub fn info_provider(&self) -> ConfiguredInfoProvider {
        ConfiguredInfoProvider {
            game: self.game.key.clone(),
            fios_paths: self.game.fios_paths.clone(),
            lios_paths: self.game.lios_paths.clone(),
            tagged_paths: self.game.tagged_paths.clone(),
        }
    }

    /// Configured mods with absolute paths
    pub fn configured_mods(&self) -> Vec<ModMetadata> {
        let base = self
            .game
            .mod_directory
            .as_ref()
            .unwrap_or(&self.game.user_directory);
        self.collection
            .mods
            .iter()
            .map(|m| ModMetadata {
                name: m.name.clone(),
                descriptor_file: String::new(),
                path: if m.path.is_absolute() {
                    m.path.clone()
                } else {
                    base.join(&m.path)
                },
                version: m.version.clone(),
                source: ModSource::Local,
                dependencies: m.dependencies.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_template_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("merge.json");
        let config = MergeConfig::template();
        config.save(&path).unwrap();
        assert_eq!(MergeConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: MergeConfig = serde_json::from_str(
            r#"{"game": {"key": "hoi4", "user_directory": "/u"}, "collection": {"name": "c", "mods": [{"name": "a", "path": "mod/a"}]}}"#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.duplicate_policy, DuplicatePolicy::OncePerIdentity);
        assert_eq!(config.configured_mods()[0].path, PathBuf::from("/u/mod/a"));
        assert_eq!(config.to_collection().mods, vec!["a".to_string()]);
        assert!(config.info_provider().fios_paths.is_empty());
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut config = MergeConfig::template();
        let first = config.collection.mods[0].clone();
        config.collection.mods.push(first);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        config.collection.mods.clear();
        config.game.key = " ".to_string();
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}

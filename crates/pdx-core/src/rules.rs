//! Game-specific rules consulted by the priority evaluator and extractor

use crate::definition::Definition;
use serde::{Deserialize, Serialize};

/// How a game resolves the same identity defined in differently named files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceOrder {
    /// First in source order: the file sorting first wins
    Fios,
    /// Last in source order: the file sorting last wins
    Lios,
}

/// Capability interface for per-game definition rules
pub trait DefinitionInfoProvider: Send + Sync {
    /// Check if this provider handles the given game
    fn can_process(&self, game: &str) -> bool;

    /// Tie-break rule for the definition's type, `None` when the game has
    /// no rule and plain load order applies
    fn priority_rule(&self, definition: &Definition) -> Option<SourceOrder>;

    fn definition_uses_fios_rules(&self, definition: &Definition) -> bool {
        self.priority_rule(definition) == Some(SourceOrder::Fios)
    }

    /// Check if the file stores its definitions inside `tag = { ... }` blocks
    fn uses_tagged_blocks(&self, _file: &str) -> bool {
        false
    }
}

/// Rules described by folder prefixes, usually loaded from configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfiguredInfoProvider {
    /// Game key this provider applies to
    pub game: String,
    /// Folders whose definitions follow first-in-source rules
    pub fios_paths: Vec<String>,
    /// Folders whose definitions follow last-in-source rules
    pub lios_paths: Vec<String>,
    /// Folders with tagged block files, e.g. `common/defines`
    pub tagged_paths: Vec<String>,
}

/// `file` is one of `prefixes` or lies below one, compared per path segment
pub(crate) fn matches_prefix(prefixes: &[String], file: &str) -> bool {
    let file = file.replace('\\', "/").to_lowercase();
    prefixes.iter().any(|prefix| {
        let prefix = prefix.replace('\\', "/").to_lowercase();
        let prefix = prefix.trim_end_matches('/');
        !prefix.is_empty() && (file == prefix || file.starts_with(&format!("{}/", prefix)))
    })
}

impl DefinitionInfoProvider for ConfiguredInfoProvider {
    fn can_process(&self, game: &str) -> bool {
        self.game.eq_ignore_ascii_case(game)
    }

    fn priority_rule(&self, definition: &Definition) -> Option<SourceOrder> {
        if matches_prefix(&self.fios_paths, &definition.file) {
            Some(SourceOrder::Fios)
        } else if matches_prefix(&self.lios_paths, &definition.file) {
            Some(SourceOrder::Lios)
        } else {
            None
        }
    }

    fn uses_tagged_blocks(&self, file: &str) -> bool {
        matches_prefix(&self.tagged_paths, file)
    }
}

/// Pick the provider able to process `game`
pub fn provider_for<'a>(
    providers: &'a [Box<dyn DefinitionInfoProvider>],
    game: &str,
) -> Option<&'a dyn DefinitionInfoProvider> {
    providers
        .iter()
        .find(|p| p.can_process(game))
        .map(|p| p.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ValueType;

    fn provider() -> ConfiguredInfoProvider {
        ConfiguredInfoProvider {
            game: "Stellaris".to_string(),
            fios_paths: vec!["common/scripted_effects".to_string()],
            lios_paths: vec!["common\\technology\\".to_string()],
            tagged_paths: vec!["common/defines".to_string()],
        }
    }

    fn def(file: &str) -> Definition {
        Definition::new("x", "t", ValueType::Object, file, "m", "")
    }

    #[test]
    fn test_priority_rule_by_prefix() {
        let p = provider();
        assert_eq!(p.priority_rule(&def("common/scripted_effects/00.txt")), Some(SourceOrder::Fios));
        assert_eq!(p.priority_rule(&def("Common/Technology/00.txt")), Some(SourceOrder::Lios));
        assert_eq!(p.priority_rule(&def("common/scripted_effects_extra/00.txt")), None);
        assert!(p.definition_uses_fios_rules(&def("common/scripted_effects/a.txt")));
    }

    #[test]
    fn test_tagged_and_game_match() {
        let p = provider();
        assert!(p.uses_tagged_blocks("common/defines/00_defines.txt"));
        assert!(!p.uses_tagged_blocks("common/buildings/00.txt"));
        assert!(p.can_process("stellaris"));

        let providers: Vec<Box<dyn DefinitionInfoProvider>> = vec![Box::new(p)];
        assert!(provider_for(&providers, "Stellaris").is_some());
        assert!(provider_for(&providers, "HOI4").is_none());
    }
}

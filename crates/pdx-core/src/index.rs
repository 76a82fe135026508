//! Immutable lookup structure over a sequence of definitions

use crate::definition::Definition;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Definitions indexed by file and by type+identity
///
/// Never mutated after [`IndexedDefinitions::build`]; the `with_*` methods
/// return a new set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexedDefinitions {
    definitions: Vec<Definition>,
    // lowercased file -> positions in `definitions`
    by_file: BTreeMap<String, Vec<usize>>,
    by_type_and_id: HashMap<String, Vec<usize>>,
    preserve_duplicates: bool,
}

impl IndexedDefinitions {
    /// Index `definitions`, keeping their order
    ///
    /// With `preserve_duplicates` false, a mod that defines the same identity
    /// twice in one file keeps only the last occurrence. Definitions from
    /// different mods or files are always kept.
    pub fn build<I>(definitions: I, preserve_duplicates: bool) -> Self
    where
        I: IntoIterator<Item = Definition>,
    {
        let mut definitions: Vec<Definition> = definitions.into_iter().collect();
        if !preserve_duplicates {
            definitions = deduplicate(definitions);
        }

        let mut by_file: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut by_type_and_id: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, definition) in definitions.iter().enumerate() {
            by_file.entry(definition.file_ci()).or_default().push(i);
            by_type_and_id
                .entry(definition.type_and_id())
                .or_default()
                .push(i);
        }

        Self {
            definitions,
            by_file,
            by_type_and_id,
            preserve_duplicates,
        }
    }

    /// An empty set
    pub fn empty() -> Self {
        Self::default()
    }

    /// All definitions in insertion order
    pub fn get_all(&self) -> &[Definition] {
        &self.definitions
    }

    /// Definitions stored under a relative path (case-insensitive)
    pub fn get_by_file(&self, file: &str) -> Vec<&Definition> {
        self.lookup(self.by_file.get(&file.to_lowercase()))
    }

    /// Definitions sharing a type+identity key (case-insensitive)
    pub fn get_by_type_and_id(&self, type_and_id: &str) -> Vec<&Definition> {
        self.lookup(self.by_type_and_id.get(&type_and_id.to_lowercase()))
    }

    /// Distinct lowercased file keys, sorted
    pub fn get_all_file_keys(&self) -> Vec<&str> {
        self.by_file.keys().map(|k| k.as_str()).collect()
    }

    /// Distinct type+identity keys, in first-seen order
    pub fn get_all_type_keys(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for definition in &self.definitions {
            if let Some((key, _)) = self.by_type_and_id.get_key_value(&definition.type_and_id()) {
                if seen.insert(key.as_str()) {
                    keys.push(key.as_str());
                }
            }
        }
        keys
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// A new set holding these definitions plus `additional`
    pub fn with_added<I>(&self, additional: I) -> Self
    where
        I: IntoIterator<Item = Definition>,
    {
        let all = self.definitions.iter().cloned().chain(additional);
        Self::build(all, self.preserve_duplicates)
    }

    /// A new set without the definitions matching `predicate`
    pub fn without<F>(&self, predicate: F) -> Self
    where
        F: Fn(&Definition) -> bool,
    {
        let kept = self.definitions.iter().filter(|d| !predicate(d)).cloned();
        Self::build(kept, self.preserve_duplicates)
    }

    fn lookup(&self, positions: Option<&Vec<usize>>) -> Vec<&Definition> {
        positions
            .map(|p| p.iter().map(|&i| &self.definitions[i]).collect())
            .unwrap_or_default()
    }
}

fn deduplicate(definitions: Vec<Definition>) -> Vec<Definition> {
    let key = |d: &Definition| (d.mod_name.clone(), d.file_ci(), d.type_and_id());
    let mut last: HashMap<(String, String, String), usize> = HashMap::new();
    for (i, definition) in definitions.iter().enumerate() {
        last.insert(key(definition), i);
    }
    definitions
        .into_iter()
        .enumerate()
        .filter(|(i, d)| last.get(&key(d)) == Some(i))
        .map(|(_, d)| d)
        .collect()
}

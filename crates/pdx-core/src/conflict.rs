//! Conflict analysis over a collection's definitions

use crate::definition::{Definition, ValueType};
use crate::index::IndexedDefinitions;
use crate::priority::evaluate_priority;
use crate::rules::DefinitionInfoProvider;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Current resolution state of one collection
///
/// Built per operation and never shared between operations.
#[derive(Debug, Clone, Default)]
pub struct ConflictResult {
    /// Every definition of the collection
    pub all_conflicts: IndexedDefinitions,
    /// Identities defined by several mods in different files
    pub conflicts: IndexedDefinitions,
    /// Identities with a user-chosen winner
    pub resolved_conflicts: IndexedDefinitions,
    pub ignored_conflicts: IndexedDefinitions,
    /// User-authored definitions exported verbatim
    pub custom_conflicts: IndexedDefinitions,
    /// Winners of identities that several mods ship in the same file
    pub overwritten_conflicts: IndexedDefinitions,
    /// Definitions lost when a later mod overwrites the whole file
    pub orphan_conflicts: IndexedDefinitions,
}

/// Sort definitions by the position of their mod in `mod_order`
///
/// Mods missing from the order sort first. The sort is stable so
/// definitions of one mod keep their relative order.
pub fn sort_by_mod_order<'a>(definitions: &mut [&'a Definition], mod_order: &[String]) {
    let position: HashMap<&str, usize> = mod_order
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();
    definitions.sort_by_key(|d| position.get(d.mod_name.as_str()).copied());
}

fn distinct_mods(definitions: &[&Definition]) -> usize {
    definitions
        .iter()
        .map(|d| d.mod_name.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Classify the collection's definitions
///
/// Resolved, ignored and custom sets start empty; the merge service
/// fills them from patch state.
pub fn analyze_conflicts(
    all: IndexedDefinitions,
    mod_order: &[String],
    provider: Option<&dyn DefinitionInfoProvider>,
) -> ConflictResult {
    let mut conflicts = Vec::new();
    let mut overwritten = Vec::new();

    for key in all.get_all_type_keys() {
        let mut group: Vec<&Definition> = all
            .get_by_type_and_id(key)
            .into_iter()
            .filter(|d| !d.is_variable_like())
            .collect();
        if distinct_mods(&group) < 2 {
            continue;
        }
        sort_by_mod_order(&mut group, mod_order);
        let first_file = group[0].file_ci();
        if group.iter().all(|d| d.file_ci() == first_file) {
            if let Some(result) = evaluate_priority(&group, provider) {
                overwritten.push(result.definition.clone());
            }
        } else {
            conflicts.extend(group.into_iter().cloned());
        }
    }

    let orphans = find_orphans(&all, mod_order);
    debug!(
        conflicts = conflicts.len(),
        overwritten = overwritten.len(),
        orphans = orphans.len(),
        "Analyzed conflicts"
    );

    ConflictResult {
        conflicts: IndexedDefinitions::build(conflicts, true),
        overwritten_conflicts: IndexedDefinitions::build(overwritten, true),
        orphan_conflicts: IndexedDefinitions::build(orphans, true),
        all_conflicts: all,
        ..Default::default()
    }
}

fn find_orphans(all: &IndexedDefinitions, mod_order: &[String]) -> Vec<Definition> {
    let mut orphans = Vec::new();
    for file in all.get_all_file_keys() {
        let mut definitions = all.get_by_file(file);
        if distinct_mods(&definitions) < 2 {
            continue;
        }
        sort_by_mod_order(&mut definitions, mod_order);
        let Some(winner) = definitions.last().map(|d| d.mod_name.clone()) else {
            continue;
        };
        let kept: HashSet<String> = definitions
            .iter()
            .filter(|d| d.mod_name == winner)
            .map(|d| d.type_and_id())
            .collect();
        orphans.extend(
            definitions
                .iter()
                .filter(|d| d.mod_name != winner)
                .filter(|d| !d.is_variable_like() && d.value_type != ValueType::EmptyFile)
                .filter(|d| !kept.contains(&d.type_and_id()))
                .map(|d| (*d).clone()),
        );
    }
    orphans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(id: &str, file: &str, mod_name: &str) -> Definition {
        Definition::new(id, "common/t", ValueType::Object, file, mod_name, format!("{} = {{ }}", id))
    }

    fn order() -> Vec<String> {
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    }

    #[test]
    fn test_analyze_overwrite_and_conflict() {
        let all = IndexedDefinitions::build(
            vec![
                def("same", "common/t/00.txt", "b"),
                def("same", "common/t/00.txt", "a"),
                def("split", "common/t/00.txt", "a"),
                def("split", "common/t/01.txt", "c"),
                def("alone", "common/t/02.txt", "a"),
            ],
            true,
        );
        let result = analyze_conflicts(all, &order(), None);
        assert_eq!(result.all_conflicts.len(), 5);

        let overwritten = result.overwritten_conflicts.get_by_type_and_id("common/t-same");
        assert_eq!(overwritten.len(), 1);
        assert_eq!(overwritten[0].mod_name, "b");

        assert_eq!(result.conflicts.get_by_type_and_id("common/t-split").len(), 2);
        assert!(result.conflicts.get_by_type_and_id("common/t-alone").is_empty());
        assert!(result.resolved_conflicts.is_empty());
    }

    #[test]
    fn test_orphans_from_overwritten_file() {
        let all = IndexedDefinitions::build(
            vec![
                def("kept", "common/t/00.txt", "a"),
                def("lost", "common/t/00.txt", "a"),
                def("kept", "common/t/00.txt", "b"),
            ],
            true,
        );
        let result = analyze_conflicts(all, &order(), None);
        let orphans = result.orphan_conflicts.get_all();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].id, "lost");
        assert_eq!(orphans[0].mod_name, "a");
    }

    #[test]
    fn test_sort_by_mod_order_unknown_first() {
        let defs = vec![def("x", "f", "c"), def("x", "f", "zz"), def("x", "f", "a")];
        let mut refs: Vec<&Definition> = defs.iter().collect();
        sort_by_mod_order(&mut refs, &order());
        let mods: Vec<&str> = refs.iter().map(|d| d.mod_name.as_str()).collect();
        assert_eq!(mods, vec!["zz", "a", "c"]);
    }
}

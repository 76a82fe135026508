//! Collection merge service
//!
//! Drives a whole collection through the merge: prepares the target mod,
//! loads stored resolutions, picks a winner per identity and exports one
//! merged definition per file.

use crate::cache::{get_typed, set_typed, Cache, CacheKey};
use crate::collaborators::{
    ModCatalog, ModDirectoryResolver, ModFileReader, ModMergeExporter, ModWriter, PatchStateReader,
    ProgressPublisher,
};
use crate::conflict::{sort_by_mod_order, ConflictResult};
use crate::definition::{is_variable_only, Definition, ValueType};
use crate::error::Result;
use crate::extract::{extract_definitions, ExtractArgs};
use crate::index::IndexedDefinitions;
use crate::merger::{align_order, fold_variables, merge_export};
use crate::mods::{
    generate_collection_patch_name, generate_valid_file_name, highest_version, Game, ModCollection,
    ModMetadata, ModSource, MODS_CACHE_PREFIX, MOD_DIRECTORY, MOD_EXTENSION,
};
use crate::priority::evaluate_priority;
use crate::progress::{ProgressEvent, ProgressTracker};
use crate::rules::{provider_for, DefinitionInfoProvider};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ceiling for progress while definitions are still being merged
const DEFINITION_PROGRESS_MAX: f64 = 99.9;

/// What happens when one mod ships the same identity in several files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicatePolicy {
    /// The identity is exported once for the whole collection
    #[default]
    OncePerIdentity,
    /// The identity is exported into every file that carries it
    OncePerFile,
}

/// External collaborators of [`MergeService`]
#[derive(Clone)]
pub struct MergeCollaborators {
    pub writer: Arc<dyn ModWriter>,
    pub exporter: Arc<dyn ModMergeExporter>,
    pub patch_state: Arc<dyn PatchStateReader>,
    pub progress: Arc<dyn ProgressPublisher>,
    pub catalog: Arc<dyn ModCatalog>,
    pub files: Arc<dyn ModFileReader>,
    pub cache: Arc<dyn Cache>,
    pub resolver: Arc<dyn ModDirectoryResolver>,
}

/// The merged mod being produced
struct Target {
    descriptor: ModMetadata,
    export_path: PathBuf,
}

pub struct MergeService {
    deps: MergeCollaborators,
    providers: Vec<Box<dyn DefinitionInfoProvider>>,
    duplicate_policy: DuplicatePolicy,
}

impl MergeService {
    pub fn new(deps: MergeCollaborators) -> Self {
        Self {
            deps,
            providers: Vec::new(),
            duplicate_policy: DuplicatePolicy::default(),
        }
    }

    pub fn with_provider(mut self, provider: Box<dyn DefinitionInfoProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Cache key of a game's installed mod listing
    pub fn mods_cache_key(game: &Game) -> CacheKey {
        CacheKey::new(MODS_CACHE_PREFIX, &[&game.key])
    }

    /// Installed mods, served from the cache when possible
    pub async fn installed_mods(&self, game: &Game) -> Result<Vec<ModMetadata>> {
        let key = Self::mods_cache_key(game);
        if let Some(mods) = get_typed(self.deps.cache.as_ref(), &key) {
            return Ok(mods);
        }
        let mods = self.deps.catalog.installed_mods(game).await?;
        set_typed(self.deps.cache.as_ref(), key, &mods);
        Ok(mods)
    }

    fn provider(&self, game: &Game) -> Option<&dyn DefinitionInfoProvider> {
        provider_for(&self.providers, &game.key)
    }

    async fn publish(&self, event: Option<ProgressEvent>) {
        if let Some(event) = event {
            self.deps.progress.publish(event).await;
        }
    }

    /// Purge and recreate the target mod, then write its descriptor
    async fn prepare_target(&self, game: &Game, collection_name: &str, installed: &[ModMetadata]) -> Result<Target> {
        let safe_name = generate_valid_file_name(collection_name);
        let mod_path = format!("{}/{}", MOD_DIRECTORY, safe_name);
        let root = &game.user_directory;

        self.deps.writer.purge_mod_directory(root, &mod_path).await?;
        self.deps.writer.create_mod_directory(root, MOD_DIRECTORY).await?;
        self.deps.writer.create_mod_directory(root, &mod_path).await?;

        let descriptor = ModMetadata {
            name: collection_name.to_string(),
            descriptor_file: format!("{}/{}{}", MOD_DIRECTORY, safe_name, MOD_EXTENSION),
            path: self.deps.resolver.mod_directory(game, &safe_name),
            version: highest_version(installed),
            source: ModSource::Local,
            dependencies: Vec::new(),
        };
        self.deps
            .writer
            .write_descriptor(root, &descriptor.descriptor_file, &descriptor)
            .await?;
        self.deps.cache.invalidate(&[Self::mods_cache_key(game)]);
        info!(name = %descriptor.name, path = %descriptor.path.display(), "Prepared merge target");

        Ok(Target {
            descriptor,
            export_path: root.join(MOD_DIRECTORY).join(&safe_name),
        })
    }

    /// Merge a collection definition by definition into a new mod
    ///
    /// Returns `None` without writing anything when there is no game, no
    /// collection or nothing to merge.
    pub async fn merge_collection_by_definitions(
        &self,
        game: Option<&Game>,
        collection: Option<&ModCollection>,
        mut conflict_result: ConflictResult,
        mod_order: &[String],
        collection_name: &str,
    ) -> Result<Option<ModMetadata>> {
        let Some(game) = game else {
            return Ok(None);
        };
        let Some(collection) = collection else {
            warn!("No collection selected, nothing merged");
            return Ok(None);
        };
        if conflict_result.all_conflicts.is_empty() {
            return Ok(None);
        }

        let installed = self.installed_mods(game).await?;
        let target = self.prepare_target(game, collection_name, &installed).await?;
        let provider = self.provider(game);

        let patch_name = generate_collection_patch_name(&collection.name);
        let state = self
            .deps
            .patch_state
            .get_patch_state(&game.user_directory.join(MOD_DIRECTORY), &patch_name)
            .await?
            .unwrap_or_default();
        conflict_result.resolved_conflicts = IndexedDefinitions::build(state.resolved_conflicts, true);
        conflict_result.ignored_conflicts = IndexedDefinitions::build(state.ignored_conflicts, true);
        conflict_result.custom_conflicts = IndexedDefinitions::build(state.custom_conflicts, false);
        let history = IndexedDefinitions::build(state.conflict_history, false);

        let all = &conflict_result.all_conflicts;
        let total = all.get_all().iter().filter(|d| !d.is_variable_like()).count()
            + conflict_result.custom_conflicts.len();
        let mut tracker = ProgressTracker::new(total, DEFINITION_PROGRESS_MAX);

        for file in conflict_result.custom_conflicts.get_all_file_keys() {
            if let Some(custom) = conflict_result.custom_conflicts.get_by_file(file).first() {
                let mut definition = (*custom).clone();
                if let Some(latest) = history.get_by_type_and_id(&definition.type_and_id()).first() {
                    definition.code = latest.code.clone();
                }
                self.deps
                    .exporter
                    .export_definitions(&target.export_path, &[definition], &game.key)
                    .await?;
            }
            let percentage = tracker.advance(1);
            self.publish(percentage.map(|percentage| ProgressEvent::DefinitionMerge { percentage }))
                .await;
        }

        let mut dumped: HashSet<String> = HashSet::new();
        for file in all.get_all_file_keys() {
            let definitions: Vec<&Definition> = all
                .get_by_file(file)
                .into_iter()
                .filter(|d| d.value_type != ValueType::EmptyFile)
                .collect();
            if definitions.is_empty() {
                continue;
            }

            let mut export = Vec::new();
            for group in group_by_identity(&definitions) {
                if !group[0].is_variable_like() {
                    self.resolve_group(
                        &conflict_result,
                        &history,
                        file,
                        &group,
                        mod_order,
                        provider,
                        &mut dumped,
                        &mut export,
                    );
                    let percentage = tracker.advance(group.len());
                    self.publish(percentage.map(|percentage| ProgressEvent::DefinitionMerge { percentage }))
                        .await;
                }
            }

            if is_variable_only(&export) {
                export.clear();
            }
            if export.is_empty() {
                continue;
            }
            let contributing: HashSet<&str> = export.iter().map(|d| d.mod_name.as_str()).collect();
            if contributing.len() > 1 {
                align_order(&mut export, all, provider);
            }
            if let Some(mut merged) = merge_export(export) {
                // keep the file name's original casing
                if let Some(source) = all.get_by_file(file).first() {
                    merged.file = source.file.clone();
                }
                debug!(file = %merged.file, "Exporting merged file");
                self.deps
                    .exporter
                    .export_definitions(&target.export_path, &[merged], &game.key)
                    .await?;
            }
        }

        let percentage = tracker.finish();
        self.publish(percentage.map(|percentage| ProgressEvent::DefinitionMerge { percentage }))
            .await;
        info!(name = %target.descriptor.name, "Merged collection by definitions");
        Ok(Some(target.descriptor))
    }

    /// Pick what one identity group of `file` contributes to the export set
    #[allow(clippy::too_many_arguments)]
    fn resolve_group(
        &self,
        conflict_result: &ConflictResult,
        history: &IndexedDefinitions,
        file: &str,
        group: &[&Definition],
        mod_order: &[String],
        provider: Option<&dyn DefinitionInfoProvider>,
        dumped: &mut HashSet<String>,
        export: &mut Vec<Definition>,
    ) {
        let key = group[0].type_and_id();

        // a resolution wins over an overwrite
        let resolved = conflict_result.resolved_conflicts.get_by_type_and_id(&key);
        if !resolved.is_empty() {
            for item in resolved {
                if dumped.contains(&item.type_and_id()) {
                    continue;
                }
                if item.value_type == ValueType::Binary {
                    dumped.insert(item.type_and_id());
                    export.push(item.clone());
                    continue;
                }
                let code = history
                    .get_by_type_and_id(&item.type_and_id())
                    .first()
                    .map(|latest| latest.code.clone())
                    .unwrap_or_else(|| item.code.clone());
                for mut other in reextract(item, &code, provider) {
                    dumped.insert(other.type_and_id());
                    fold_variables(export, &mut other);
                    export.push(other);
                }
            }
            return;
        }

        // the game drops these along with the overwritten file
        if is_orphaned(&conflict_result.orphan_conflicts, group) {
            debug!(file = %file, identity = %key, "Skipping orphaned definition");
            return;
        }

        let overwritten = conflict_result.overwritten_conflicts.get_by_type_and_id(&key);
        if !overwritten.is_empty() {
            for item in overwritten {
                if dumped.insert(item.type_and_id()) {
                    let mut copy = item.clone();
                    if copy.has_variables() {
                        fold_variables(export, &mut copy);
                    }
                    export.push(copy);
                }
            }
            return;
        }

        let conflicted = conflict_result.conflicts.get_by_type_and_id(&key);
        let (winner, several_files) = if conflicted.is_empty() {
            (Some(group[0]), false)
        } else {
            let (mut candidates, several_files) = candidates_for_file(&conflicted, file);
            sort_by_mod_order(&mut candidates, mod_order);
            (
                evaluate_priority(&candidates, provider).map(|r| r.definition),
                several_files,
            )
        };
        let Some(winner) = winner else {
            return;
        };

        let repeat = several_files && self.duplicate_policy == DuplicatePolicy::OncePerFile;
        let fresh = dumped.insert(winner.type_and_id());
        if fresh || repeat {
            let mut copy = winner.clone();
            if copy.has_variables() {
                fold_variables(export, &mut copy);
            }
            export.push(copy);
        }
    }

    /// Copy every game file of the collection's mods into a new mod
    pub async fn merge_collection_by_files(
        &self,
        game: Option<&Game>,
        collection: Option<&ModCollection>,
        collection_name: &str,
    ) -> Result<Option<ModMetadata>> {
        let (Some(game), Some(collection)) = (game, collection) else {
            return Ok(None);
        };
        if collection_name.trim().is_empty() {
            return Ok(None);
        }

        let installed = self.installed_mods(game).await?;
        let mut mods: Vec<ModMetadata> = collection.resolve(&installed).into_iter().cloned().collect();
        if mods.is_empty() {
            warn!(collection = %collection.name, "No installed mods in collection");
            return Ok(None);
        }

        let target = self.prepare_target(game, collection_name, &installed).await?;
        let patch_name = generate_collection_patch_name(&collection.name);
        if let Some(patch) = installed.iter().find(|m| m.name == patch_name) {
            mods.push(patch.clone());
        }

        self.publish(Some(ProgressEvent::FileMerge { step: 1, percentage: 0.0 }))
            .await;
        let mut listed = Vec::with_capacity(mods.len());
        for installed_mod in &mods {
            let files: Vec<String> = self
                .deps
                .files
                .list_files(&installed_mod.path)
                .await?
                .into_iter()
                .filter(|f| game.is_game_file(f))
                .collect();
            listed.push((installed_mod, files));
        }
        self.publish(Some(ProgressEvent::FileMerge { step: 1, percentage: 100.0 }))
            .await;

        let total: usize = listed.iter().map(|(_, files)| files.len()).sum();
        let mut tracker = ProgressTracker::new(total, 100.0);
        for (installed_mod, files) in &listed {
            for file in files {
                self.deps
                    .exporter
                    .export_files(&installed_mod.path, file, &target.descriptor.path)
                    .await?;
                let percentage = tracker.advance(1);
                self.publish(percentage.map(|percentage| ProgressEvent::FileMerge { step: 2, percentage }))
                    .await;
            }
        }
        info!(name = %target.descriptor.name, files = total, "Merged collection by files");
        Ok(Some(target.descriptor))
    }
}

/// Group definitions by identity, in first-seen order
fn group_by_identity<'a>(definitions: &[&'a Definition]) -> Vec<Vec<&'a Definition>> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<&'a Definition>> = Vec::new();
    for &definition in definitions {
        let key = definition.type_and_id();
        match positions.get(&key) {
            Some(&i) => groups[i].push(definition),
            None => {
                positions.insert(key, groups.len());
                groups.push(vec![definition]);
            }
        }
    }
    groups
}

/// Conflict candidates relevant to `file`
///
/// A mod that ships the identity in several files only competes with its
/// copy in `file`. The flag tells whether any mod did.
fn candidates_for_file<'a>(conflicted: &[&'a Definition], file: &str) -> (Vec<&'a Definition>, bool) {
    let mut files_per_mod: HashMap<&str, HashSet<String>> = HashMap::new();
    for definition in conflicted {
        files_per_mod
            .entry(definition.mod_name.as_str())
            .or_default()
            .insert(definition.file_ci());
    }
    let several_files = files_per_mod.values().any(|files| files.len() > 1);
    if !several_files {
        return (conflicted.to_vec(), false);
    }
    let file = file.to_lowercase();
    let candidates = conflicted
        .iter()
        .copied()
        .filter(|d| files_per_mod[d.mod_name.as_str()].len() == 1 || d.file_ci() == file)
        .collect();
    (candidates, true)
}

/// Every member of `group` lost its file to a later mod's copy
fn is_orphaned(orphans: &IndexedDefinitions, group: &[&Definition]) -> bool {
    let Some(first) = group.first() else {
        return false;
    };
    let lost = orphans.get_by_type_and_id(&first.type_and_id());
    group.iter().all(|member| {
        lost.iter()
            .any(|orphan| orphan.mod_name == member.mod_name && orphan.file_ci() == member.file_ci())
    })
}

/// Re-parse stored resolution code into definitions carrying their variables
///
/// Falls back to the stored definition when the code no longer parses.
fn reextract(
    item: &Definition,
    code: &str,
    provider: Option<&dyn DefinitionInfoProvider>,
) -> Vec<Definition> {
    let lines: Vec<String> = code.lines().map(String::from).collect();
    let args = ExtractArgs {
        file: &item.file,
        disk_file: &item.disk_file,
        mod_name: &item.mod_name,
        dependencies: &item.dependencies,
        lines: &lines,
        tagged_blocks: provider.is_some_and(|p| p.uses_tagged_blocks(&item.file)),
    };
    match extract_definitions(args) {
        Ok(parsed) => {
            let variables: Vec<Definition> = parsed.iter().filter(|d| d.is_variable_like()).cloned().collect();
            parsed
                .into_iter()
                .filter(|d| !d.is_variable_like() && d.value_type != ValueType::EmptyFile)
                .map(|mut d| {
                    d.variables = variables.clone();
                    d
                })
                .collect()
        }
        Err(e) => {
            warn!(
                file = %item.file,
                line = e.line,
                column = e.column,
                "Stored resolution no longer parses, using stored definition: {}",
                e.message
            );
            vec![item.clone()]
        }
    }
}

//! pdx-core: Core library for parsing and merging Paradox-style mod scripts
//!
//! This library provides functionality to:
//! - Clean and normalize script lines
//! - Parse script files into a node tree with reconstructable code
//! - Extract per-mod definitions and index them by file and identity
//! - Decide which mod wins a conflicting identity
//! - Merge colliding definitions and export a whole collection as a new mod

pub mod cache;
pub mod cleaner;
pub mod collaborators;
pub mod config;
pub mod conflict;
pub mod definition;
pub mod error;
pub mod exporter;
pub mod extract;
pub mod index;
pub mod merger;
pub mod mods;
pub mod parser;
pub mod patch_state;
pub mod priority;
pub mod progress;
pub mod rules;
pub mod scanner;
pub mod script;
pub mod service;
pub mod structure;

pub use cache::{Cache, CacheKey, MemoryCache};
pub use cleaner::{clean_parsed_text, clean_whitespace, extract_key, extract_value, prettify_line};
pub use collaborators::{
    LogProgressPublisher, ModCatalog, ModDirectoryResolver, ModFileReader, ModMergeExporter, ModWriter,
    PatchStateReader, ProgressPublisher, UserDirectoryResolver,
};
pub use config::MergeConfig;
pub use conflict::{analyze_conflicts, ConflictResult};
pub use definition::{Definition, ValueType};
pub use error::{Error, Result};
pub use exporter::{LocalMergeExporter, LocalModWriter};
pub use extract::{extract_definitions, ExtractArgs};
pub use index::IndexedDefinitions;
pub use merger::{merge_definitions, merge_namespaces, merge_variables};
pub use mods::{Game, ModCollection, ModMetadata};
pub use parser::{parse_script, parse_script_file, parse_script_str};
pub use patch_state::{JsonPatchStateStore, PatchState};
pub use priority::{evaluate_priority, PriorityResult, PriorityType};
pub use progress::{progress_percentage, ProgressEvent, ProgressTracker};
pub use rules::{ConfiguredInfoProvider, DefinitionInfoProvider, SourceOrder};
pub use scanner::{scan_collection, scan_mod, DescriptorCatalog, LocalModFileReader};
pub use script::{ScriptChild, ScriptError, ScriptKeyValue, ScriptNode, ScriptValue};
pub use service::{DuplicatePolicy, MergeCollaborators, MergeService};

//! pdx-merge CLI
//!
//! Command-line tool for inspecting mod scripts and merging mod collections.

use clap::{Parser, Subcommand};
use pdx_core::{
    analyze_conflicts, clean_whitespace, extract_definitions, parse_script_file, prettify_line,
    scan_collection, DescriptorCatalog, ExtractArgs, JsonPatchStateStore, LocalMergeExporter,
    LocalModFileReader, LocalModWriter, LogProgressPublisher, MemoryCache, MergeCollaborators,
    MergeConfig, MergeService, ModMetadata, ScriptNode, UserDirectoryResolver,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pdx-cli")]
#[command(about = "Paradox mod script parser and collection merger", long_about = None)]
#[command(version)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a script file and show its node tree
    Parse {
        /// Path to script file
        #[arg(short, long)]
        file: PathBuf,

        /// Print the full tree as JSON
        #[arg(long)]
        json: bool,
    },

    /// Normalize whitespace of every line in a file
    Clean {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Pretty-print every line in a file
    Prettify {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Extract the definitions of a single script file
    Definitions {
        /// Path to script file
        #[arg(short, long)]
        file: PathBuf,

        /// Path of the file inside its mod, e.g. common/buildings/00.txt
        #[arg(short, long)]
        relative: Option<String>,

        /// Owning mod name
        #[arg(short, long, default_value = "local")]
        mod_name: String,

        /// Treat top-level blocks as tags
        #[arg(long)]
        tagged: bool,

        /// Print definitions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Scan a collection and report conflicting definitions
    Conflicts {
        /// Path to merge configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// List every conflicting identity
        #[arg(short, long)]
        list: bool,
    },

    /// Merge a collection into a new mod
    Merge {
        /// Path to merge configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Copy whole files instead of merging definitions
        #[arg(long)]
        by_files: bool,

        /// Name of the merged mod, defaults to the collection name
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Create a merge configuration template
    CreateConfig {
        /// Output path for the configuration file
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> pdx_core::Result<()> {
    match cli.command {
        Commands::Parse { file, json } => cmd_parse(&file, json),
        Commands::Clean { file } => cmd_lines(&file, clean_whitespace),
        Commands::Prettify { file } => cmd_lines(&file, prettify_line),
        Commands::Definitions {
            file,
            relative,
            mod_name,
            tagged,
            json,
        } => cmd_definitions(&file, relative.as_deref(), &mod_name, tagged, json),
        Commands::Conflicts { config, list } => block_on(cmd_conflicts(&config, list)),
        Commands::Merge {
            config,
            by_files,
            name,
        } => block_on(cmd_merge(&config, by_files, name)),
        Commands::CreateConfig { output } => cmd_create_config(&output),
    }
}

fn block_on<F: std::future::Future<Output = pdx_core::Result<()>>>(future: F) -> pdx_core::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(future)
}

fn read_file(path: &Path) -> pdx_core::Result<String> {
    fs::read_to_string(path).map_err(|e| pdx_core::Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })
}

fn print_node(node: &ScriptNode, depth: usize) {
    let indent = "  ".repeat(depth);
    println!("{}{} ({} children)", indent, node.key, node.child_count());
    for kv in &node.key_values {
        println!("{}  {} = {}", indent, kv.key, kv.value);
    }
    for value in &node.values {
        println!("{}  {}", indent, value.value);
    }
    for child in &node.nodes {
        print_node(child, depth + 1);
    }
}

fn cmd_parse(file: &Path, json: bool) -> pdx_core::Result<()> {
    let root = parse_script_file(file)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&root)?);
    } else {
        println!("File: {}", file.display());
        println!();
        print_node(&root, 0);
    }
    Ok(())
}

fn cmd_lines(file: &Path, transform: fn(&str) -> String) -> pdx_core::Result<()> {
    for line in read_file(file)?.lines() {
        println!("{}", transform(line));
    }
    Ok(())
}

fn cmd_definitions(
    file: &Path,
    relative: Option<&str>,
    mod_name: &str,
    tagged: bool,
    json: bool,
) -> pdx_core::Result<()> {
    let content = read_file(file)?;
    let lines: Vec<String> = content.lines().map(String::from).collect();
    let fallback = file.to_string_lossy().replace('\\', "/");
    let relative = relative.unwrap_or(&fallback);
    let disk_file = file.display().to_string();

    let definitions = extract_definitions(ExtractArgs {
        file: relative,
        disk_file: &disk_file,
        mod_name,
        dependencies: &[],
        lines: &lines,
        tagged_blocks: tagged,
    })
    .map_err(|e| pdx_core::Error::Parse {
        path: file.to_path_buf(),
        line: e.line,
        column: e.column,
        message: e.message,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&definitions)?);
        return Ok(());
    }

    println!("Definitions ({}):", definitions.len());
    println!();
    for definition in &definitions {
        let tag = if definition.code_tag.is_empty() {
            String::new()
        } else {
            format!(" [{}]", definition.code_tag)
        };
        println!(
            "  {:>3}. {} ({:?}){} -> {}",
            definition.order,
            definition.id,
            definition.value_type,
            tag,
            definition.type_and_id()
        );
    }
    Ok(())
}

/// Installed mods of the configured collection, in load order
async fn collection_mods(config: &MergeConfig, service: &MergeService) -> pdx_core::Result<Vec<ModMetadata>> {
    let installed = service.installed_mods(&config.to_game()).await?;
    config
        .collection
        .mods
        .iter()
        .map(|m| {
            installed
                .iter()
                .find(|i| i.name == m.name)
                .cloned()
                .ok_or_else(|| pdx_core::Error::MissingMod(m.name.clone()))
        })
        .collect()
}

fn build_service(config: &MergeConfig) -> MergeService {
    let deps = MergeCollaborators {
        writer: Arc::new(LocalModWriter),
        exporter: Arc::new(LocalMergeExporter),
        patch_state: Arc::new(JsonPatchStateStore),
        progress: Arc::new(LogProgressPublisher),
        catalog: Arc::new(DescriptorCatalog {
            configured: config.configured_mods(),
        }),
        files: Arc::new(LocalModFileReader),
        cache: Arc::new(MemoryCache::new()),
        resolver: Arc::new(UserDirectoryResolver),
    };
    MergeService::new(deps)
        .with_provider(Box::new(config.info_provider()))
        .with_duplicate_policy(config.duplicate_policy)
}

async fn cmd_conflicts(config_path: &Path, list: bool) -> pdx_core::Result<()> {
    let config = MergeConfig::load(config_path)?;
    let service = build_service(&config);
    let game = config.to_game();
    let provider = config.info_provider();

    let mods = collection_mods(&config, &service).await?;
    let refs: Vec<&ModMetadata> = mods.iter().collect();
    let all = scan_collection(&game, &refs, Some(&provider))?;
    let order = config.to_collection().mods;
    let result = analyze_conflicts(all, &order, Some(&provider));

    println!("Collection: {}", config.collection.name);
    println!("Mods: {}", mods.len());
    println!("Definitions: {}", result.all_conflicts.len());
    println!("Conflicts: {}", result.conflicts.get_all_type_keys().len());
    println!("Overwritten: {}", result.overwritten_conflicts.len());
    println!("Orphans: {}", result.orphan_conflicts.len());

    if list {
        println!();
        for key in result.conflicts.get_all_type_keys() {
            println!("{}", key);
            for definition in result.conflicts.get_by_type_and_id(key) {
                println!("  {} ({})", definition.mod_name, definition.file);
            }
        }
    }
    Ok(())
}

async fn cmd_merge(config_path: &Path, by_files: bool, name: Option<String>) -> pdx_core::Result<()> {
    let config = MergeConfig::load(config_path)?;
    let service = build_service(&config);
    let game = config.to_game();
    let collection = config.to_collection();
    let name = name.unwrap_or_else(|| collection.name.clone());

    let merged = if by_files {
        service
            .merge_collection_by_files(Some(&game), Some(&collection), &name)
            .await?
    } else {
        let provider = config.info_provider();
        let mods = collection_mods(&config, &service).await?;
        let refs: Vec<&ModMetadata> = mods.iter().collect();
        let all = scan_collection(&game, &refs, Some(&provider))?;
        debug!(definitions = all.len(), "Scanned collection");
        let result = analyze_conflicts(all, &collection.mods, Some(&provider));
        service
            .merge_collection_by_definitions(Some(&game), Some(&collection), result, &collection.mods, &name)
            .await?
    };

    match merged {
        Some(merged) => {
            info!(name = %merged.name, "Merge complete");
            println!("Merged mod: {}", merged.name);
            println!("Descriptor: {}", merged.descriptor_file);
            println!("Directory: {}", merged.path.display());
        }
        None => println!("Nothing to merge."),
    }
    Ok(())
}

fn cmd_create_config(output: &Path) -> pdx_core::Result<()> {
    let config = MergeConfig::template();
    config.save(output)?;
    println!("Created merge configuration: {}", output.display());
    println!();
    println!("Edit the file to describe your game and collection, then run:");
    println!("  pdx-cli merge --config {}", output.display());

    Ok(())
}

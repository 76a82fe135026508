//! Definition extraction from parsed script files

use crate::definition::{definition_type_for, Definition, ValueType};
use crate::parser::parse_script;
use crate::script::{ScriptChild, ScriptError, ScriptNode};
use std::path::Path;

/// Key that declares an event namespace
pub const NAMESPACE_KEY: &str = "namespace";
/// Key whose value names an object inside its own block
pub const ID_KEY: &str = "id";
/// Prefix of script variables
pub const VARIABLE_PREFIX: char = '@';
/// Separator recorded for definitions nested in a `tag = { ... }` block
pub const BLOCK_SEPARATOR: &str = "{";

/// Input for [`extract_definitions`]
#[derive(Debug, Clone, Copy)]
pub struct ExtractArgs<'a> {
    /// Relative path inside the mod
    pub file: &'a str,
    /// Absolute path the lines were read from
    pub disk_file: &'a str,
    pub mod_name: &'a str,
    pub dependencies: &'a [String],
    pub lines: &'a [String],
    /// Treat each top-level block as a tag whose entries are the definitions
    pub tagged_blocks: bool,
}

struct Extraction<'a> {
    args: ExtractArgs<'a>,
    base_type: String,
    definitions: Vec<Definition>,
}

impl<'a> Extraction<'a> {
    fn push(&mut self, id: &str, value_type: ValueType, code: Option<&str>, tag: Option<&str>) {
        let code = code.unwrap_or_default();
        let definition_type = match tag {
            Some(tag) => format!("{}-{}", self.base_type, tag),
            None => self.base_type.clone(),
        };
        let mut definition = Definition::new(id, definition_type, value_type, self.args.file, self.args.mod_name, code);
        definition.disk_file = self.args.disk_file.to_string();
        definition.dependencies = self.args.dependencies.to_vec();
        if let Some(tag) = tag {
            definition.code_tag = tag.to_string();
            definition.code_separator = BLOCK_SEPARATOR.to_string();
        }
        definition.order = self.definitions.len() + 1;
        self.definitions.push(definition);
    }

    fn top_level(&mut self, root: &ScriptNode) {
        for child in root.children() {
            match child {
                ScriptChild::KeyValue(kv) if kv.key.starts_with(VARIABLE_PREFIX) => {
                    self.push(&kv.key, ValueType::Variable, kv.code.as_deref(), None);
                }
                ScriptChild::KeyValue(kv) if kv.key.eq_ignore_ascii_case(NAMESPACE_KEY) => {
                    self.push(&kv.value, ValueType::Namespace, kv.code.as_deref(), None);
                }
                ScriptChild::KeyValue(kv) => self.push(&kv.key, ValueType::Object, kv.code.as_deref(), None),
                ScriptChild::Node(node) if self.args.tagged_blocks => self.tagged_block(node),
                ScriptChild::Node(node) => {
                    let id = node
                        .find_key_value(ID_KEY)
                        .map(|kv| kv.value.as_str())
                        .unwrap_or(node.key.as_str());
                    self.push(id, ValueType::Object, node.code.as_deref(), None);
                }
                ScriptChild::Value(value) => {
                    self.push(&value.value, ValueType::Object, value.code.as_deref(), None)
                }
            }
        }
    }

    fn tagged_block(&mut self, block: &ScriptNode) {
        let tag = Some(block.key.as_str());
        for child in block.children() {
            match child {
                ScriptChild::KeyValue(kv) => {
                    let value_type = if kv.key.starts_with(VARIABLE_PREFIX) {
                        ValueType::Variable
                    } else {
                        ValueType::Object
                    };
                    self.push(&kv.key, value_type, kv.code.as_deref(), tag);
                }
                ScriptChild::Node(node) => self.push(&node.key, ValueType::Object, node.code.as_deref(), tag),
                ScriptChild::Value(value) => self.push(&value.value, ValueType::Object, value.code.as_deref(), tag),
            }
        }
    }

    /// Give every object the variables visible to it
    fn attach_variables(&mut self) {
        let variables: Vec<Definition> = self
            .definitions
            .iter()
            .filter(|d| d.is_variable_like())
            .cloned()
            .collect();
        for definition in self.definitions.iter_mut().filter(|d| !d.is_variable_like()) {
            definition.variables = variables
                .iter()
                .filter(|v| v.code_tag.is_empty() || v.code_tag.eq_ignore_ascii_case(&definition.code_tag))
                .cloned()
                .collect();
        }
    }
}

/// Parse a script file and split it into definitions
///
/// A file without statements yields a single [`ValueType::EmptyFile`]
/// marker so that an empty override can still win a conflict.
pub fn extract_definitions(args: ExtractArgs<'_>) -> Result<Vec<Definition>, ScriptError> {
    let root = parse_script(args.lines, args.file)?;
    let mut extraction = Extraction {
        args,
        base_type: definition_type_for(args.file),
        definitions: Vec::new(),
    };
    extraction.top_level(&root);
    if extraction.definitions.is_empty() {
        let id = file_name(args.file);
        extraction.push(&id, ValueType::EmptyFile, None, None);
    }
    extraction.attach_variables();
    Ok(extraction.definitions)
}

/// Definition for a file that is copied rather than parsed
pub fn binary_definition(file: &str, disk_file: &str, mod_name: &str) -> Definition {
    let mut definition = Definition::new(
        file_name(file),
        definition_type_for(file),
        ValueType::Binary,
        file,
        mod_name,
        "",
    );
    definition.disk_file = disk_file.to_string();
    definition.order = 1;
    definition
}

fn file_name(file: &str) -> String {
    let normalized = file.replace('\\', "/");
    Path::new(&normalized)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(&normalized)
        .to_string()
}

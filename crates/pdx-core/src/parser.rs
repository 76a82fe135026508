//! Script parser: grammar recognition plus mapping into the node tree

use crate::error::{Error, Result};
use crate::script::{ScriptError, ScriptKeyValue, ScriptNode, ScriptValue};
use crate::structure::{parse_structure, Statement, Value};
use std::fs;
use std::path::Path;

/// Depths (root = 1) whose elements keep their reconstructed code
const CODE_DEPTHS: std::ops::RangeInclusive<usize> = 2..=3;

/// Parse the lines of a script file into a node tree
///
/// Syntax errors come back as a [`ScriptError`]; this never panics on bad
/// input.
pub fn parse_script<S: AsRef<str>>(lines: &[S], file: &str) -> std::result::Result<ScriptNode, ScriptError> {
    let text = lines
        .iter()
        .map(|l| l.as_ref())
        .collect::<Vec<_>>()
        .join("\n");
    let file_name = Path::new(file)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(file);
    let statements = parse_structure(file, &text)?;
    Ok(map_root(file_name, &statements))
}

/// Parse a script file from disk
pub fn parse_script_file<P: AsRef<Path>>(path: P) -> Result<ScriptNode> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_script_str(&content, &path.to_string_lossy())
}

/// Parse script text held in memory (useful for testing)
pub fn parse_script_str(content: &str, source_name: &str) -> Result<ScriptNode> {
    let lines: Vec<&str> = content.lines().collect();
    parse_script(&lines, source_name).map_err(|e| Error::Parse {
        path: source_name.into(),
        line: e.line,
        column: e.column,
        message: e.message,
    })
}

/// Pretty-printed statement with tabs expanded and surrounding newlines trimmed
pub(crate) fn format_code(statement: &Statement) -> String {
    statement
        .pretty_print()
        .replace('\r', "")
        .trim_matches('\n')
        .replace('\t', "    ")
}

fn map_root(file_name: &str, statements: &[Statement]) -> ScriptNode {
    let mut root = ScriptNode {
        key: file_name.trim().to_string(),
        ..Default::default()
    };
    map_children(&mut root, statements, 1);
    root
}

fn map_children(node: &mut ScriptNode, statements: &[Statement], level: usize) {
    let child_level = level + 1;
    for (index, statement) in statements.iter().enumerate() {
        let code = CODE_DEPTHS
            .contains(&child_level)
            .then(|| format_code(statement));
        match statement {
            Statement::KeyValue {
                key,
                value: Value::Block(children),
                ..
            } => node.nodes.push(map_node(key, children, child_level, code, index)),
            Statement::Value {
                value: Value::Block(children),
                ..
            } => node.nodes.push(map_node("", children, child_level, code, index)),
            Statement::KeyValue { key, value, .. } => node.key_values.push(ScriptKeyValue {
                key: key.trim().to_string(),
                value: value.to_raw_string().trim().to_string(),
                code,
                index,
            }),
            Statement::Value { value, .. } => node.values.push(ScriptValue {
                value: value.to_raw_string().trim().to_string(),
                code,
                index,
            }),
        }
    }
}

fn map_node(key: &str, children: &[Statement], level: usize, code: Option<String>, index: usize) -> ScriptNode {
    let mut node = ScriptNode {
        key: key.trim().to_string(),
        code,
        index,
        ..Default::default()
    };
    map_children(&mut node, children, level);
    node
}

//! Definition model: one logical unit of mod content

use serde::{Deserialize, Serialize};

/// Kind of content a definition carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ValueType {
    /// A concrete game object
    #[default]
    Object,
    /// A `@name = value` script variable
    Variable,
    /// A `namespace = name` declaration
    Namespace,
    /// A non-script file copied as-is
    Binary,
    /// Marker for a script file with no statements
    EmptyFile,
}

impl ValueType {
    /// Variables and namespaces only exist to support objects
    pub fn is_variable_like(&self) -> bool {
        matches!(self, ValueType::Variable | ValueType::Namespace)
    }
}

/// A single definition extracted from one mod's file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Definition {
    /// Identity within the logical type, compared case-insensitively
    pub id: String,
    /// Logical type, e.g. `common/buildings`
    #[serde(rename = "type")]
    pub definition_type: String,
    pub value_type: ValueType,
    /// Relative path inside the mod
    pub file: String,
    /// Absolute path the definition was read from
    pub disk_file: String,
    pub mod_name: String,
    /// Current code, possibly rewritten by the merge engine
    pub code: String,
    /// Code as found in the source
    pub original_code: String,
    /// Key of the enclosing block, empty for top-level definitions
    pub code_tag: String,
    /// Opening token following the tag
    pub code_separator: String,
    /// 1-based position among the definitions of the same file
    pub order: usize,
    /// Variables and namespaces in scope of this definition
    pub variables: Vec<Definition>,
    /// Mods the owning mod depends on
    pub dependencies: Vec<String>,
}

impl Definition {
    /// Create a definition with identical current and original code
    pub fn new(
        id: impl Into<String>,
        definition_type: impl Into<String>,
        value_type: ValueType,
        file: impl Into<String>,
        mod_name: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        let code = code.into();
        Self {
            id: id.into(),
            definition_type: definition_type.into(),
            value_type,
            file: file.into(),
            mod_name: mod_name.into(),
            original_code: code.clone(),
            code,
            ..Default::default()
        }
    }

    /// Identity used to match the same object across mods
    pub fn type_and_id(&self) -> String {
        format!("{}-{}", self.definition_type, self.id).to_lowercase()
    }

    /// Lowercased relative path
    pub fn file_ci(&self) -> String {
        self.file.to_lowercase()
    }

    /// Check if the definition is a variable or namespace
    pub fn is_variable_like(&self) -> bool {
        self.value_type.is_variable_like()
    }

    /// Check if this definition has a scoped variable or namespace child
    pub fn has_variables(&self) -> bool {
        !self.variables.is_empty()
    }
}

/// Logical type of a file: its parent directory with `/` separators
pub fn definition_type_for(file: &str) -> String {
    let normalized = file.replace('\\', "/");
    match normalized.rfind('/') {
        Some(index) => normalized[..index].to_lowercase(),
        None => String::new(),
    }
}

/// Check if every definition is a variable or namespace
pub fn is_variable_only(definitions: &[Definition]) -> bool {
    definitions.iter().all(Definition::is_variable_like)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_and_id_is_case_insensitive() {
        let a = Definition::new("Tax_Rate", "common/Economy", ValueType::Object, "common/economy/00_a.txt", "a", "");
        let b = Definition::new("tax_rate", "common/economy", ValueType::Object, "common/economy/01_b.txt", "b", "");
        assert_eq!(a.type_and_id(), b.type_and_id());
        assert_eq!(a.type_and_id(), "common/economy-tax_rate");
    }

    #[test]
    fn test_definition_type_for() {
        assert_eq!(definition_type_for("common\\Buildings\\00_a.txt"), "common/buildings");
        assert_eq!(definition_type_for("descriptor.mod"), "");
    }

    #[test]
    fn test_is_variable_only() {
        let var = Definition::new("@x", "t", ValueType::Variable, "f", "m", "@x = 1");
        let ns = Definition::new("ns", "t", ValueType::Namespace, "f", "m", "namespace = ns");
        let obj = Definition::new("o", "t", ValueType::Object, "f", "m", "o = { }");
        assert!(is_variable_only(&[var.clone(), ns.clone()]));
        assert!(!is_variable_only(&[var, ns, obj]));
    }

    #[test]
    fn test_definition_serialization() {
        let mut def = Definition::new("o", "common/t", ValueType::Object, "common/t/a.txt", "m", "o = { }");
        def.order = 3;
        let json = serde_json::to_string(&def).unwrap();
        assert!(json.contains("\"type\":\"common/t\""));
        let loaded: Definition = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, def);

        let partial: Definition = serde_json::from_str("{\"id\":\"x\",\"value_type\":\"Variable\"}").unwrap();
        assert_eq!(partial.value_type, ValueType::Variable);
        assert!(partial.code.is_empty());
    }
}

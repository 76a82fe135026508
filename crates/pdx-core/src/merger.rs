//! Merge engine: folds variables and namespaces of colliding definitions
//! and rebuilds one definition's code from several sources

use crate::cleaner::strip_whitespace;
use crate::definition::{Definition, ValueType};
use crate::index::IndexedDefinitions;
use crate::rules::DefinitionInfoProvider;
use std::collections::BTreeMap;

const INDENT: usize = 4;
const VARIABLE_INDENT: usize = 8;

/// Opening separators with a closing counterpart
const CLOSING_SEPARATORS: &[(&str, &str)] = &[("{", "}")];

fn closing_separator(separator: &str) -> Option<&'static str> {
    CLOSING_SEPARATORS
        .iter()
        .find(|(open, _)| *open == separator.trim())
        .map(|(_, close)| *close)
}

fn push_indented(out: &mut String, text: &str, indent: usize) {
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        out.push_str(&" ".repeat(indent));
        out.push_str(line);
        out.push('\n');
    }
}

fn merge_code(out: &mut String, tag: &str, separator: &str, variables: &[&str], lines: &[&str]) {
    let Some(closing) = closing_separator(separator) else {
        out.push_str(tag);
        out.push_str(separator);
        out.push('\n');
        for text in variables.iter().chain(lines) {
            push_indented(out, text, INDENT);
        }
        return;
    };

    out.push_str(&format!("{} = {}\n", tag, separator.trim()));
    let mut inserted = false;
    let mut body = String::new();
    for text in lines {
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            push_indented(&mut body, line, INDENT);
            if !inserted && line.contains(closing) {
                inserted = true;
                for variable in variables {
                    push_indented(&mut body, variable, VARIABLE_INDENT);
                }
            }
        }
    }
    // flat bodies never close a bracket; their variables must still precede use
    if !inserted {
        for variable in variables {
            push_indented(out, variable, INDENT);
        }
    }
    out.push_str(&body);
    out.push_str(closing);
    out.push('\n');
}

/// Rebuild one definition from an ordered set
///
/// The first member is the template. Members are partitioned by code tag
/// (case-insensitive, untagged first); each untagged statement is emitted
/// on its own line, each tagged partition is wrapped back into its block.
/// Returns `None` for an empty set. Callers drop variable-only sets.
pub fn merge_definitions(definitions: &[Definition]) -> Option<Definition> {
    let mut merged = definitions.first()?.clone();
    if merged.is_variable_like() {
        merged.value_type = ValueType::Object;
    }

    let mut partitions: BTreeMap<String, Vec<&Definition>> = BTreeMap::new();
    for definition in definitions {
        partitions
            .entry(definition.code_tag.trim().to_lowercase())
            .or_default()
            .push(definition);
    }

    let mut out = String::new();
    for group in partitions.values() {
        let namespaces = group.iter().filter(|d| d.value_type == ValueType::Namespace);
        let variables = group.iter().filter(|d| d.value_type == ValueType::Variable);
        let vars: Vec<&str> = namespaces
            .chain(variables)
            .map(|d| d.original_code.as_str())
            .collect();
        let others: Vec<&str> = group
            .iter()
            .filter(|d| !d.is_variable_like())
            .map(|d| d.original_code.as_str())
            .collect();

        let tag = group[0].code_tag.trim();
        if tag.is_empty() {
            for code in vars.iter().chain(&others) {
                out.push_str(code);
                out.push('\n');
            }
        } else {
            merge_code(&mut out, tag, &group[0].code_separator, &vars, &others);
        }
    }

    merged.code = out;
    Some(merged)
}

/// Copy the owner's namespaces into `export`, skipping ones already present
pub fn merge_namespaces(export: &mut Vec<Definition>, owner: &Definition) {
    for namespace in owner
        .variables
        .iter()
        .filter(|v| v.value_type == ValueType::Namespace)
    {
        let code = strip_whitespace(&namespace.code);
        let present = export
            .iter()
            .any(|d| d.value_type == ValueType::Namespace && strip_whitespace(&d.code) == code);
        if !present {
            let mut copy = namespace.clone();
            copy.code_tag = owner.code_tag.clone();
            copy.code_separator = owner.code_separator.clone();
            export.push(copy);
        }
    }
}

/// Copy the owner's variables into `export` under fresh names
///
/// Every standalone occurrence of a renamed variable is rewritten in the
/// copy and in the owner.
pub fn merge_variables(export: &mut Vec<Definition>, owner: &mut Definition) {
    let variables: Vec<Definition> = owner
        .variables
        .iter()
        .filter(|v| v.value_type == ValueType::Variable)
        .cloned()
        .collect();
    for mut copy in variables {
        let old_id = copy.id.clone();
        let new_id = next_variable_name(export, &old_id);
        copy.code = replace_token(&copy.code, &old_id, &new_id);
        copy.original_code = replace_token(&copy.original_code, &old_id, &new_id);
        copy.id = new_id.clone();
        copy.code_tag = owner.code_tag.clone();
        copy.code_separator = owner.code_separator.clone();
        export.push(copy);

        owner.code = replace_token(&owner.code, &old_id, &new_id);
        owner.original_code = replace_token(&owner.original_code, &old_id, &new_id);
    }
}

/// Fold namespaces then variables of `owner` into `export`
pub fn fold_variables(export: &mut Vec<Definition>, owner: &mut Definition) {
    merge_namespaces(export, owner);
    merge_variables(export, owner);
}

/// First free `id_N` name, N starting one past the count of `id` entries
pub fn next_variable_name(export: &[Definition], id: &str) -> String {
    let taken = |name: &str| export.iter().any(|d| d.id.eq_ignore_ascii_case(name));
    let mut count = export.iter().filter(|d| d.id.eq_ignore_ascii_case(id)).count() + 1;
    let mut name = format!("{}_{}", id, count);
    while taken(&name) {
        count += 1;
        name = format!("{}_{}", id, count);
    }
    name
}

fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '@' | '.' | ':' | '$')
}

/// Replace `old` with `new` wherever it stands as a whole token
pub fn replace_token(text: &str, old: &str, new: &str) -> String {
    if old.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (start, _) in text.match_indices(old) {
        let end = start + old.len();
        let before = text[..start].chars().next_back();
        let after = text[end..].chars().next();
        if before.map_or(true, |c| !is_token_char(c)) && after.map_or(true, |c| !is_token_char(c)) {
            out.push_str(&text[last..start]);
            out.push_str(new);
            last = end;
        }
    }
    out.push_str(&text[last..]);
    out
}

/// Give entries of minority mods the order the dominant mod uses
///
/// The dominant mod contributes the most entries to `export`. An entry
/// takes the dominant mod's order for the same identity, preferring the
/// copy in the same file and otherwise the FIOS/LIOS winning file.
pub fn align_order(
    export: &mut [Definition],
    all: &IndexedDefinitions,
    provider: Option<&dyn DefinitionInfoProvider>,
) {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for definition in export.iter() {
        match counts.iter_mut().find(|(name, _)| *name == definition.mod_name) {
            Some((_, count)) => *count += 1,
            None => counts.push((definition.mod_name.clone(), 1)),
        }
    }
    if counts.len() < 2 {
        return;
    }
    let mut dominant = &counts[0];
    for entry in &counts[1..] {
        if entry.1 > dominant.1 {
            dominant = entry;
        }
    }
    let dominant = dominant.0.clone();

    for item in export.iter_mut().filter(|d| d.mod_name != dominant) {
        let matches: Vec<&Definition> = all
            .get_by_type_and_id(&item.type_and_id())
            .into_iter()
            .filter(|d| d.mod_name == dominant)
            .collect();
        let source = match matches.as_slice() {
            [] => None,
            [only] => Some(*only),
            _ => {
                let file = item.file_ci();
                matches.iter().copied().find(|d| d.file_ci() == file).or_else(|| {
                    if provider.map_or(false, |p| p.definition_uses_fios_rules(item)) {
                        matches.iter().copied().min_by(|a, b| a.file.cmp(&b.file))
                    } else {
                        matches.iter().copied().max_by(|a, b| a.file.cmp(&b.file))
                    }
                })
            }
        };
        if let Some(source) = source {
            item.order = source.order;
        }
    }
}

/// Merge a file's export set: variables by name, then the rest by order
pub fn merge_export(export: Vec<Definition>) -> Option<Definition> {
    let (mut variables, mut others): (Vec<Definition>, Vec<Definition>) =
        export.into_iter().partition(Definition::is_variable_like);
    variables.sort_by(|a, b| a.id.cmp(&b.id));
    others.sort_by_key(|d| d.order);
    variables.extend(others);
    merge_definitions(&variables)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(id: &str, mod_name: &str, code: &str) -> Definition {
        Definition::new(id, "common/t", ValueType::Object, "common/t/00.txt", mod_name, code)
    }

    fn tagged(mut definition: Definition, tag: &str, separator: &str) -> Definition {
        definition.code_tag = tag.to_string();
        definition.code_separator = separator.to_string();
        definition.definition_type = format!("{}-{}", definition.definition_type, tag);
        definition
    }

    fn variable(id: &str, code: &str) -> Definition {
        Definition::new(id, "common/t", ValueType::Variable, "common/t/00.txt", "m", code)
    }

    #[test]
    fn test_merge_untagged_orders_namespaces_and_variables_first() {
        let ns = Definition::new("ev", "events", ValueType::Namespace, "events/a.txt", "a", "namespace = ev");
        let defs = vec![
            object("a", "m", "a = { x = 1 }"),
            variable("@v", "@v = 2"),
            ns,
        ];
        let merged = merge_definitions(&defs).unwrap();
        assert_eq!(merged.code, "namespace = ev\n@v = 2\na = { x = 1 }\n");
        assert_eq!(merged.id, "a");
    }

    #[test]
    fn test_merge_promotes_variable_template() {
        let merged = merge_definitions(&[variable("@v", "@v = 2"), object("a", "m", "a = 1")]).unwrap();
        assert_eq!(merged.value_type, ValueType::Object);
        assert!(merge_definitions(&[]).is_none());
    }

    #[test]
    fn test_merge_tagged_bracket_inserts_variables_after_closing_line() {
        let body = tagged(object("country", "m", "country = {\n    x = @v\n}"), "NGame", "{");
        let var = tagged(variable("@v", "@v = 3"), "NGame", "{");
        let merged = merge_definitions(&[body, var]).unwrap();
        assert_eq!(
            merged.code,
            "NGame = {\n    country = {\n        x = @v\n    }\n        @v = 3\n}\n"
        );
    }

    #[test]
    fn test_merge_flat_separator() {
        let line = tagged(object("a", "m", "a = 1"), "section", ":");
        let var = tagged(variable("@v", "@v = 3"), "section", ":");
        let merged = merge_definitions(&[line, var]).unwrap();
        assert_eq!(merged.code, "section:\n    @v = 3\n    a = 1\n");
    }

    #[test]
    fn test_merge_partitions_untagged_first_then_by_tag() {
        let b = tagged(object("y", "m", "y = 2"), "b_tag", "{");
        let a = tagged(object("x", "m", "x = 1"), "A_tag", "{");
        let top = object("z", "m", "z = 3");
        let merged = merge_definitions(&[b, a, top]).unwrap();
        assert_eq!(merged.code, "z = 3\nA_tag = {\n    x = 1\n}\nb_tag = {\n    y = 2\n}\n");
    }

    #[test]
    fn test_colliding_variables_are_renamed() {
        let mut start = tagged(object("START", "a", "START = x"), "NGame", "{");
        start.variables = vec![variable("x", "x = 1")];
        let mut end = tagged(object("END", "b", "END = x"), "NGame", "{");
        end.order = 2;
        end.variables = vec![variable("x", "x = 2")];

        let mut export = Vec::new();
        fold_variables(&mut export, &mut start);
        export.push(start);
        fold_variables(&mut export, &mut end);
        export.push(end);

        let ids: Vec<&str> = export.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["x_1", "START", "x_2", "END"]);

        let merged = merge_export(export).unwrap();
        assert_eq!(
            merged.code,
            "NGame = {\n    x_1 = 1\n    x_2 = 2\n    START = x_1\n    END = x_2\n}\n"
        );
        assert!(!merged.code.split_whitespace().any(|token| token == "x"));
    }

    #[test]
    fn test_merge_namespaces_deduplicates_by_code() {
        let ns = |code: &str| Definition::new("ev", "events", ValueType::Namespace, "events/a.txt", "a", code);
        let mut first = object("e1", "a", "e1 = { }");
        first.variables = vec![ns("namespace = ev")];
        let mut second = object("e2", "b", "e2 = { }");
        second.variables = vec![ns("namespace\t=  ev")];

        let mut export = Vec::new();
        merge_namespaces(&mut export, &first);
        merge_namespaces(&mut export, &second);
        assert_eq!(export.len(), 1);
    }

    #[test]
    fn test_next_variable_name_skips_taken() {
        let export = vec![variable("@x", ""), variable("@x_2", ""), variable("@X_3", "")];
        assert_eq!(next_variable_name(&export, "@x"), "@x_4");
        assert_eq!(next_variable_name(&[], "@y"), "@y_1");
    }

    #[test]
    fn test_replace_token_only_whole_tokens() {
        assert_eq!(replace_token("x = x_max + x", "x", "x_1"), "x_1 = x_max + x_1");
        assert_eq!(replace_token("@cost = { value = @cost }", "@cost", "@cost_1"), "@cost_1 = { value = @cost_1 }");
        assert_eq!(replace_token("a.x = @x", "x", "y"), "a.x = @x");
        assert_eq!(replace_token("value=x\nx", "x", "y"), "value=y\ny");
    }

    #[test]
    fn test_align_order_uses_dominant_mod() {
        let mut a1 = object("one", "a", "one = 1");
        a1.order = 1;
        let mut a2 = object("two", "a", "two = 2");
        a2.order = 2;
        let mut b_two = object("two", "b", "two = 22");
        b_two.order = 7;
        let all = IndexedDefinitions::build(vec![a1.clone(), a2.clone(), b_two.clone()], true);

        let mut export = vec![a1, b_two];
        export.push(object("three", "a", "three = 3"));
        align_order(&mut export, &all, None);
        assert_eq!(export[1].order, 2);
    }

    #[test]
    fn test_align_order_falls_back_to_source_order_file() {
        let mut a_first = Definition::new("x", "common/t", ValueType::Object, "common/t/00.txt", "a", "x = 1");
        a_first.order = 3;
        let mut a_last = Definition::new("x", "common/t", ValueType::Object, "common/t/05.txt", "a", "x = 2");
        a_last.order = 9;
        let other = Definition::new("y", "common/t", ValueType::Object, "common/t/02.txt", "a", "y = 1");
        let b_x = Definition::new("x", "common/t", ValueType::Object, "common/t/02.txt", "b", "x = 3");
        let all = IndexedDefinitions::build(vec![a_first.clone(), a_last.clone(), b_x.clone()], true);

        let mut export = vec![a_first.clone(), other.clone(), b_x.clone()];
        align_order(&mut export, &all, None);
        assert_eq!(export[2].order, 9);
    }
}

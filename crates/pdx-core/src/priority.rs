//! Winner selection among colliding definitions

use crate::definition::Definition;
use crate::rules::{DefinitionInfoProvider, SourceOrder};
use serde::{Deserialize, Serialize};

/// Which rule decided the winner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriorityType {
    /// Nothing to decide, a single candidate
    None,
    /// Last mod in load order
    ModOrder,
    /// File sorting first
    Fios,
    /// File sorting last
    Lios,
}

/// Outcome of [`evaluate_priority`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorityResult<'a> {
    pub definition: &'a Definition,
    pub priority_type: PriorityType,
}

/// Decide which candidate wins
///
/// `candidates` must already be sorted by mod load order. When every
/// candidate lives in the same file the later mod simply overwrites the
/// file. Otherwise the provider's FIOS/LIOS rule compares file paths
/// ordinally; without a rule the load-order last candidate wins.
pub fn evaluate_priority<'a>(
    candidates: &[&'a Definition],
    provider: Option<&dyn DefinitionInfoProvider>,
) -> Option<PriorityResult<'a>> {
    let last = *candidates.last()?;
    if candidates.len() == 1 {
        return Some(PriorityResult {
            definition: last,
            priority_type: PriorityType::None,
        });
    }

    let first_file = candidates[0].file_ci();
    let load_order = PriorityResult {
        definition: last,
        priority_type: PriorityType::ModOrder,
    };
    if candidates.iter().all(|c| c.file_ci() == first_file) {
        return Some(load_order);
    }

    let rule = provider.and_then(|p| p.priority_rule(last));
    let target = match rule {
        Some(SourceOrder::Fios) => candidates.iter().map(|c| c.file.as_str()).min(),
        Some(SourceOrder::Lios) => candidates.iter().map(|c| c.file.as_str()).max(),
        None => return Some(load_order),
    }?;
    // several mods may ship the winning file; the later one overrides it
    let definition = candidates.iter().rev().find(|c| c.file == target).copied()?;
    let priority_type = match rule {
        Some(SourceOrder::Fios) => PriorityType::Fios,
        _ => PriorityType::Lios,
    };
    Some(PriorityResult {
        definition,
        priority_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ValueType;

    struct FixedRule(Option<SourceOrder>);

    impl DefinitionInfoProvider for FixedRule {
        fn can_process(&self, _game: &str) -> bool {
            true
        }

        fn priority_rule(&self, _definition: &Definition) -> Option<SourceOrder> {
            self.0
        }
    }

    fn tax_rate(file: &str, mod_name: &str) -> Definition {
        Definition::new(
            "tax_rate",
            "common/economy",
            ValueType::Object,
            format!("common/economy/{}", file),
            mod_name,
            format!("tax_rate = {{ mod = {} }}", mod_name),
        )
    }

    fn candidates() -> Vec<Definition> {
        vec![
            tax_rate("01_b.txt", "a"),
            tax_rate("00_a.txt", "b"),
            tax_rate("02_c.txt", "c"),
        ]
    }

    #[test]
    fn test_fios_picks_first_file() {
        let defs = candidates();
        let refs: Vec<&Definition> = defs.iter().collect();
        let result = evaluate_priority(&refs, Some(&FixedRule(Some(SourceOrder::Fios)))).unwrap();
        assert_eq!(result.definition.file, "common/economy/00_a.txt");
        assert_eq!(result.priority_type, PriorityType::Fios);
    }

    #[test]
    fn test_lios_picks_last_file() {
        let defs = candidates();
        let refs: Vec<&Definition> = defs.iter().collect();
        let result = evaluate_priority(&refs, Some(&FixedRule(Some(SourceOrder::Lios)))).unwrap();
        assert_eq!(result.definition.file, "common/economy/02_c.txt");
        assert_eq!(result.priority_type, PriorityType::Lios);
    }

    #[test]
    fn test_no_rule_falls_back_to_load_order() {
        let mut defs = candidates();
        defs.swap(1, 2);
        let refs: Vec<&Definition> = defs.iter().collect();
        let result = evaluate_priority(&refs, Some(&FixedRule(None))).unwrap();
        assert_eq!(result.definition.mod_name, "b");
        assert_eq!(result.priority_type, PriorityType::ModOrder);

        let result = evaluate_priority(&refs, None).unwrap();
        assert_eq!(result.definition.mod_name, "b");
    }

    #[test]
    fn test_same_file_overwrites_by_load_order() {
        let defs = vec![tax_rate("00_a.txt", "a"), tax_rate("00_A.txt", "b")];
        let refs: Vec<&Definition> = defs.iter().collect();
        let result = evaluate_priority(&refs, Some(&FixedRule(Some(SourceOrder::Fios)))).unwrap();
        assert_eq!(result.definition.mod_name, "b");
        assert_eq!(result.priority_type, PriorityType::ModOrder);
    }

    #[test]
    fn test_winning_file_shipped_twice_takes_later_mod() {
        let defs = vec![
            tax_rate("00_a.txt", "a"),
            tax_rate("01_b.txt", "b"),
            tax_rate("00_a.txt", "c"),
        ];
        let refs: Vec<&Definition> = defs.iter().collect();
        let result = evaluate_priority(&refs, Some(&FixedRule(Some(SourceOrder::Fios)))).unwrap();
        assert_eq!(result.definition.mod_name, "c");
    }

    #[test]
    fn test_single_and_empty() {
        assert!(evaluate_priority(&[], None).is_none());
        let def = tax_rate("00_a.txt", "a");
        let result = evaluate_priority(&[&def], None).unwrap();
        assert_eq!(result.priority_type, PriorityType::None);
    }
}

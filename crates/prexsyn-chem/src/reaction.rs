//! Reaction templates parsed from reaction SMARTS.
//!
//! A template is written as `reactants>>products` or
//! `reactants>agents>products`. The reactant side is split at top-level `.`
//! into ordered slot patterns; parenthesized component groups such as
//! `([C:1].[N:2])` stay a single slot.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ChemError;

/// An immutable reaction template with ordered reactant slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReactionTemplate {
    smarts: String,
    reactants: Vec<String>,
    agents: Option<String>,
    products: Vec<String>,
}

impl ReactionTemplate {
    /// Parse a reaction SMARTS string.
    ///
    /// Only the reaction layout is checked here. Whether each slot pattern
    /// is meaningful is up to [`ChemistryEngine::check_reaction`].
    ///
    /// [`ChemistryEngine::check_reaction`]: crate::ChemistryEngine::check_reaction
    pub fn from_smarts(smarts: &str) -> Result<Self, ChemError> {
        let smarts = smarts.trim();
        let invalid = |reason: &str| ChemError::InvalidReaction {
            smarts: smarts.to_string(),
            reason: reason.to_string(),
        };

        let (reactant_side, agents, product_side) = match smarts.split_once(">>") {
            Some((lhs, rhs)) => (lhs, None, rhs),
            None => {
                let parts: Vec<&str> = smarts.split('>').collect();
                if parts.len() != 3 {
                    return Err(invalid("expected 'reactants>>products' layout"));
                }
                (parts[0], Some(parts[1].trim().to_string()), parts[2])
            }
        };
        if product_side.contains('>') {
            return Err(invalid("more than one reaction arrow"));
        }

        let reactants = split_side(reactant_side).ok_or_else(|| invalid("malformed reactant side"))?;
        let products = split_side(product_side).ok_or_else(|| invalid("malformed product side"))?;

        Ok(Self {
            smarts: smarts.to_string(),
            reactants,
            agents: agents.filter(|a| !a.is_empty()),
            products,
        })
    }

    /// The source SMARTS, trimmed.
    pub fn smarts(&self) -> &str {
        &self.smarts
    }

    /// Number of reactant slots.
    pub fn arity(&self) -> usize {
        self.reactants.len()
    }

    /// Pattern of one reactant slot.
    pub fn reactant_pattern(&self, slot: usize) -> Option<&str> {
        self.reactants.get(slot).map(String::as_str)
    }

    pub fn reactant_patterns(&self) -> &[String] {
        &self.reactants
    }

    pub fn agents(&self) -> Option<&str> {
        self.agents.as_deref()
    }

    pub fn product_patterns(&self) -> &[String] {
        &self.products
    }
}

impl fmt::Display for ReactionTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.smarts)
    }
}

fn split_side(side: &str) -> Option<Vec<String>> {
    let side = side.trim();
    if side.is_empty() {
        return None;
    }
    let parts = split_top_level(side)?;
    if parts.iter().any(|p| p.trim().is_empty()) {
        return None;
    }
    Some(parts.into_iter().map(|p| p.trim().to_string()).collect())
}

/// Split at `.` characters outside brackets and parentheses.
///
/// Returns `None` when brackets or parentheses are unbalanced.
pub(crate) fn split_top_level(text: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut bracket = 0i32;
    let mut paren = 0i32;
    let mut start = 0;
    for (i, ch) in text.char_indices() {
        match ch {
            '[' => bracket += 1,
            ']' => bracket -= 1,
            '(' if bracket == 0 => paren += 1,
            ')' if bracket == 0 => paren -= 1,
            '.' if bracket == 0 && paren == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        if bracket < 0 || paren < 0 {
            return None;
        }
    }
    if bracket != 0 || paren != 0 {
        return None;
    }
    parts.push(&text[start..]);
    Some(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const AMIDE_CYCLIZATION: &str = "[NH2:1][c:2][c:3][C:4](=[O:5])[O][C].[C:6][NH2:7]>>[NH:1]1[c:2][c:3][C:4](=[O:5])[N:7]([C:6])C1=O";

    #[test]
    fn parses_two_slot_template() {
        let rxn = ReactionTemplate::from_smarts(AMIDE_CYCLIZATION).unwrap();
        assert_eq!(rxn.arity(), 2);
        assert_eq!(rxn.reactant_pattern(0), Some("[NH2:1][c:2][c:3][C:4](=[O:5])[O][C]"));
        assert_eq!(rxn.reactant_pattern(1), Some("[C:6][NH2:7]"));
        assert_eq!(rxn.reactant_pattern(2), None);
        assert_eq!(rxn.product_patterns().len(), 1);
        assert!(rxn.agents().is_none());
    }

    #[test]
    fn parses_agent_layout() {
        let rxn = ReactionTemplate::from_smarts("[C:1][OH:2]>[Na+]>[C:1][O:2]C").unwrap();
        assert_eq!(rxn.arity(), 1);
        assert_eq!(rxn.agents(), Some("[Na+]"));
    }

    #[test]
    fn component_group_is_one_slot() {
        let rxn = ReactionTemplate::from_smarts("([C:1]Br.[C:2]Br)>>[C:1][C:2]").unwrap();
        assert_eq!(rxn.arity(), 1);
    }

    #[test]
    fn rejects_malformed_templates() {
        for bad in ["", "CCO", "[C:1>>C", "A..B>>C", ">>C", "C>>", "A>B>C>D"] {
            assert!(
                matches!(ReactionTemplate::from_smarts(bad), Err(ChemError::InvalidReaction { .. })),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn split_respects_brackets() {
        assert_eq!(split_top_level("[Na+].[Cl-]"), Some(vec!["[Na+]", "[Cl-]"]));
        assert_eq!(split_top_level("C(C"), None);
    }
}

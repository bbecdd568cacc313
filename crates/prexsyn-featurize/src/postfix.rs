//! Token-sequence encoding of a route's postfix notation.

use serde::{Deserialize, Serialize};

use prexsyn_chem::ChemistryEngine;
use prexsyn_core::{Synthesis, Token};

use crate::error::{FeaturizeError, Result};
use crate::set::Featurizer;
use crate::value::FeatureValue;

/// Numeric ids of the token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenTypes {
    pub pad: i64,
    pub end: i64,
    pub start: i64,
    pub building_block: i64,
    pub reaction: i64,
}

impl Default for TokenTypes {
    fn default() -> Self {
        Self {
            pad: 0,
            end: 1,
            start: 2,
            building_block: 3,
            reaction: 4,
        }
    }
}

/// Emits three aligned sequences of length `max_length`:
///
/// - `token_types`: START, one id per postfix token, END, then PAD;
/// - `bb_indices`: building-block position at building-block tokens, else 0;
/// - `rxn_indices`: reaction position at reaction tokens, else 0.
///
/// A sequence longer than `max_length` keeps its first `max_length` entries,
/// so `START` survives and `END` is dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct PostfixNotationFeaturizer {
    name: String,
    max_length: usize,
    types: TokenTypes,
}

impl PostfixNotationFeaturizer {
    pub const DEFAULT_MAX_LENGTH: usize = 16;

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_length: Self::DEFAULT_MAX_LENGTH,
            types: TokenTypes::default(),
        }
    }

    pub fn with_max_length(mut self, max_length: usize) -> Result<Self> {
        if max_length < 2 {
            return Err(FeaturizeError::invalid_option(
                &self.name,
                format!("max_length {max_length} cannot hold START and END"),
            ));
        }
        self.max_length = max_length;
        Ok(self)
    }

    pub fn with_token_types(mut self, types: TokenTypes) -> Self {
        self.types = types;
        self
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    fn unindexed(&self, position: usize) -> FeaturizeError {
        FeaturizeError::UnindexedToken {
            featurizer: self.name.clone(),
            position,
        }
    }
}

impl Featurizer for PostfixNotationFeaturizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn featurize(
        &self,
        synthesis: &Synthesis,
        _engine: &dyn ChemistryEngine,
    ) -> Result<Vec<(String, FeatureValue)>> {
        let tokens = synthesis.postfix_notation();
        let mut types = Vec::with_capacity(tokens.len() + 2);
        let mut bb = Vec::with_capacity(tokens.len() + 2);
        let mut rxn = Vec::with_capacity(tokens.len() + 2);

        types.push(self.types.start);
        bb.push(0);
        rxn.push(0);
        for (position, token) in tokens.iter().enumerate() {
            match token {
                Token::Molecule { building_block, .. } => {
                    let index = building_block.ok_or_else(|| self.unindexed(position))?;
                    types.push(self.types.building_block);
                    bb.push(index as i64);
                    rxn.push(0);
                }
                Token::Reaction { index, .. } => {
                    let index = index.ok_or_else(|| self.unindexed(position))?;
                    types.push(self.types.reaction);
                    bb.push(0);
                    rxn.push(index as i64);
                }
            }
        }
        types.push(self.types.end);
        bb.push(0);
        rxn.push(0);

        fit(&mut types, self.max_length, self.types.pad);
        fit(&mut bb, self.max_length, 0);
        fit(&mut rxn, self.max_length, 0);

        Ok(vec![
            ("token_types".into(), FeatureValue::LongVec(types)),
            ("bb_indices".into(), FeatureValue::LongVec(bb)),
            ("rxn_indices".into(), FeatureValue::LongVec(rxn)),
        ])
    }
}

/// Pad with `pad`, or cut the tail down to `len`.
fn fit(values: &mut Vec<i64>, len: usize, pad: i64) {
    values.resize(len, pad);
}

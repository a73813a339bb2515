//! Transient types shared by the tools.

use fnv::{FnvHashMap, FnvHashSet};
use serde::{Deserialize, Serialize};

pub type DefaultHashMap<K, V> = FnvHashMap<K, V>;
pub type DefaultHashSet<T> = FnvHashSet<T>;

/// Whether a rule was active or only temporarily switched off when it matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchStatus {
    On,
    TempOff,
}

impl Default for MatchStatus {
    fn default() -> Self {
        MatchStatus::On
    }
}

/// A light-weight record of one rule match as emitted by the command-line
/// checker or the HTTP API. Carries just enough information to compare two
/// checker runs, not the full analyzed sentence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleMatch {
    /// 1-based line in the input, 0 if the source format has no line info.
    pub line: usize,
    /// 1-based column in the input, 0 if the source format has no column info.
    pub column: usize,
    /// Full rule id, including the sub-id where known, e.g. `COMMA_PARENTHESIS[2]`.
    pub rule_id: String,
    pub message: String,
    /// Category name, empty for formats that don't carry it.
    pub category: String,
    /// The context with `<span class='marker'>...</span>` around the covered text.
    pub context: String,
    pub covered_text: String,
    /// Suggested replacements, capped at 5.
    pub replacements: Vec<String>,
    /// The grammar file the rule was loaded from, if known.
    pub source: Option<String>,
    /// Title of the checked document, carried over from the last `Title:` line.
    pub title: String,
    pub status: MatchStatus,
    pub tags: Vec<String>,
}

impl RuleMatch {
    /// The rule id without `[off]` / `[temp_off]` markers. Sub-ids stay.
    pub fn clean_id(&self) -> &str {
        self.rule_id
            .trim_end_matches("[off]")
            .trim_end_matches("[temp_off]")
    }
}

/// A pair of commonly confused words (e.g. "their"/"there") and the factor
/// at which the less likely reading is flagged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfusionPair {
    pub word1: String,
    pub word2: String,
    pub factor: u64,
    /// Whether both replacement directions are checked or only `word1 -> word2`.
    pub both_directions: bool,
}

impl ConfusionPair {
    pub fn new<S1: Into<String>, S2: Into<String>>(
        word1: S1,
        word2: S2,
        factor: u64,
        both_directions: bool,
    ) -> Self {
        ConfusionPair {
            word1: word1.into(),
            word2: word2.into(),
            factor,
            both_directions,
        }
    }

    /// Replaces `factor`, keeping words and directionality. Used by the
    /// evaluator to sweep over candidate factors.
    pub fn with_factor(&self, factor: u64) -> Self {
        ConfusionPair {
            factor,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_id_strips_status_markers() {
        let mut m = RuleMatch {
            line: 1,
            column: 1,
            rule_id: "CONFUSION_RULE[2]".into(),
            message: String::new(),
            category: String::new(),
            context: String::new(),
            covered_text: String::new(),
            replacements: vec![],
            source: None,
            title: String::new(),
            status: MatchStatus::On,
            tags: vec![],
        };
        assert_eq!(m.clean_id(), "CONFUSION_RULE[2]");

        m.rule_id = "CONFUSION_RULE[temp_off]".into();
        assert_eq!(m.clean_id(), "CONFUSION_RULE");

        m.rule_id = "CONFUSION_RULE".into();
        assert_eq!(m.clean_id(), "CONFUSION_RULE");
    }
}

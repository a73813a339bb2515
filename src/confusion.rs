//! Confusion-set files and precision/recall evaluation of confusion pairs
//! against an ngram language model.
//!
//! A confusion-set file contains one pair per line, either bidirectional or
//! one-directional, with the trigger factor and optional comments:
//!
//! ```text
//! # factor found by eval run
//! their; there; 1000000
//! advice -> advise; 100
//! ```

use indexmap::IndexMap;
use itertools::Itertools;
use log::info;
use std::io::BufRead;
use unicode_segmentation::UnicodeSegmentation;

use crate::ngram::LanguageModel;
use crate::types::{ConfusionPair, DefaultHashMap};
use crate::utils::{apply_to_first, is_title_case};
use crate::Error;

/// The factors swept by the evaluator when tuning a new pair.
pub const DEFAULT_FACTORS: &[u64] = &[
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
];

/// Parses a confusion-set file. `#` starts a comment, empty lines are
/// skipped.
pub fn parse_confusion_sets<R: BufRead>(reader: R) -> Result<Vec<ConfusionPair>, Error> {
    let mut pairs = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let malformed = || {
            Error::MalformedInput(format!(
                "line {}: expected 'word1; word2; factor' or 'word1 -> word2; factor', got '{}'",
                i + 1,
                line
            ))
        };

        let (words, factor_part, both_directions) = if line.contains("->") {
            let (words, factor) = line.rsplit_once(';').ok_or_else(malformed)?;
            (words, factor, false)
        } else {
            let (words, factor) = line.rsplit_once(';').ok_or_else(malformed)?;
            (words, factor, true)
        };

        let (word1, word2) = if both_directions {
            words.split(';').collect_tuple().ok_or_else(malformed)?
        } else {
            words.split("->").collect_tuple().ok_or_else(malformed)?
        };
        let factor: u64 = factor_part.trim().parse().map_err(|_| malformed())?;

        pairs.push(ConfusionPair::new(
            word1.trim(),
            word2.trim(),
            factor,
            both_directions,
        ));
    }

    Ok(pairs)
}

/// Flags occurrences of a confusion pair's words where the alternative fits
/// the ngram context better.
pub struct ConfusionChecker<'a> {
    model: &'a LanguageModel,
}

impl<'a> ConfusionChecker<'a> {
    pub fn new(model: &'a LanguageModel) -> Self {
        ConfusionChecker { model }
    }

    /// Positions in `tokens` where the pair fires: the token is one of the
    /// pair's words (case-insensitive) and the other word scores more than
    /// `factor` times higher in the same context. For one-directional pairs
    /// only occurrences of `word1` are checked.
    pub fn flag_positions(&self, tokens: &[&str], pair: &ConfusionPair) -> Vec<usize> {
        let mut positions = Vec::new();

        for (position, token) in tokens.iter().enumerate() {
            let alternative = if token.eq_ignore_ascii_case(&pair.word1) {
                &pair.word2
            } else if pair.both_directions && token.eq_ignore_ascii_case(&pair.word2) {
                &pair.word1
            } else {
                continue;
            };

            let p_token = self.model.score_candidate(tokens, position, token);
            let p_alternative = self
                .model
                .score_candidate(tokens, position, alternative);

            if p_alternative > 0.0 && p_alternative > pair.factor as f64 * p_token {
                positions.push(position);
            }
        }

        positions
    }
}

/// True/false positive/negative counts for one factor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalValues {
    pub true_positives: u32,
    pub false_positives: u32,
    pub true_negatives: u32,
    pub false_negatives: u32,
}

impl EvalValues {
    pub fn precision(&self) -> f32 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f32 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }
}

fn ratio(numerator: u32, denominator: u32) -> f32 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f32 / denominator as f32
    }
}

/// Weighted F-measure. `beta` < 1 weighs precision higher, which is what we
/// want: a confusion pair that annoys users with false alarms is worse than
/// one that misses errors.
pub fn f_measure(precision: f32, recall: f32, beta: f32) -> f32 {
    if precision + recall == 0.0 {
        return 0.0;
    }
    let beta2 = beta * beta;
    ((1.0 + beta2) * precision * recall) / (beta2 * precision + recall)
}

/// Evaluation output for one factor.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalResult {
    /// One line suitable for pasting into a confusion-set file, with the
    /// measured quality as a comment.
    pub summary: String,
    pub precision: f32,
    pub recall: f32,
    pub values: EvalValues,
}

/// Sweeps a confusion pair over a list of factors, evaluating it on
/// sentences that really contain each of the two words.
pub struct ConfusionEvaluator<'a> {
    model: &'a LanguageModel,
    factors: Vec<u64>,
}

impl<'a> ConfusionEvaluator<'a> {
    pub fn new(model: &'a LanguageModel, factors: &[u64]) -> Self {
        assert!(!factors.is_empty(), "factor list must not be empty");
        ConfusionEvaluator {
            model,
            factors: factors.to_vec(),
        }
    }

    /// Evaluates `pair` on sentences containing `pair.word1`
    /// (`word1_sentences`) and sentences containing `pair.word2`
    /// (`word2_sentences`).
    ///
    /// Sentences are used twice: as-is they must NOT trigger the pair
    /// (counting true negatives / false positives), and with the contained
    /// word swapped for its confusion partner they MUST trigger it
    /// (counting true positives / false negatives).
    pub fn run(
        &self,
        pair: &ConfusionPair,
        word1_sentences: &[String],
        word2_sentences: &[String],
    ) -> IndexMap<u64, EvalResult> {
        let mut values: DefaultHashMap<u64, EvalValues> = self
            .factors
            .iter()
            .map(|&factor| (factor, EvalValues::default()))
            .collect();

        self.evaluate(pair, word1_sentences, true, &pair.word1, &pair.word2, &mut values);
        if pair.both_directions {
            self.evaluate(pair, word1_sentences, false, &pair.word2, &pair.word1, &mut values);
        }
        self.evaluate(pair, word2_sentences, false, &pair.word1, &pair.word2, &mut values);
        if pair.both_directions {
            self.evaluate(pair, word2_sentences, true, &pair.word2, &pair.word1, &mut values);
        }

        let mut results = IndexMap::new();
        for &factor in self.factors.iter().sorted() {
            let vals = values[&factor];
            let precision = vals.precision();
            let recall = vals.recall();

            let (word1, word2, delimiter) = if pair.both_directions {
                if pair.word1 <= pair.word2 {
                    (&pair.word1, &pair.word2, "; ")
                } else {
                    (&pair.word2, &pair.word1, "; ")
                }
            } else {
                (&pair.word1, &pair.word2, " -> ")
            };

            let summary = format!(
                "{}{}{}; {}; # p={:.3}, r={:.3}, f0.5={:.3}, {}+{}, {}grams",
                word1,
                delimiter,
                word2,
                factor,
                precision,
                recall,
                f_measure(precision, recall, 0.5),
                word1_sentences.len(),
                word2_sentences.len(),
                self.model.max_order(),
            );
            results.insert(
                factor,
                EvalResult {
                    summary,
                    precision,
                    recall,
                    values: vals,
                },
            );
        }
        results
    }

    /// One direction of the evaluation. `sentences` really contain
    /// `present_word` when `is_correct`, otherwise they contained
    /// `other_word` which gets swapped for `present_word` to fabricate an
    /// error sentence.
    fn evaluate(
        &self,
        pair: &ConfusionPair,
        sentences: &[String],
        is_correct: bool,
        checked_word: &str,
        other_word: &str,
        values: &mut DefaultHashMap<u64, EvalValues>,
    ) {
        info!(
            "evaluating {} {} sentences with {}/{}",
            sentences.len(),
            if is_correct { "correct" } else { "incorrect" },
            checked_word,
            other_word
        );
        let checker = ConfusionChecker::new(self.model);

        for sentence in sentences {
            let tokens: Vec<String> = if is_correct {
                sentence.unicode_words().map(|x| x.to_string()).collect()
            } else {
                // fabricate an error: swap the word that is really there
                // for its confusion partner, keeping capitalization
                swap_word(sentence, other_word, checked_word)
            };
            let token_refs: Vec<&str> = tokens.iter().map(|x| x.as_str()).collect();

            for &factor in &self.factors {
                let flagged = !checker
                    .flag_positions(&token_refs, &pair.with_factor(factor))
                    .is_empty();
                let vals = values.get_mut(&factor).expect("all factors are seeded.");

                match (flagged, is_correct) {
                    (false, true) => vals.true_negatives += 1,
                    (true, true) => vals.false_positives += 1,
                    (false, false) => vals.false_negatives += 1,
                    (true, false) => vals.true_positives += 1,
                }
            }
        }
    }
}

/// Tokenizes `sentence` and replaces the first occurrence of `from`
/// (case-insensitive) with `to`, keeping title-case capitalization.
fn swap_word(sentence: &str, from: &str, to: &str) -> Vec<String> {
    let mut swapped = false;
    sentence
        .unicode_words()
        .map(|token| {
            if !swapped && token.eq_ignore_ascii_case(from) {
                swapped = true;
                if is_title_case(token) {
                    apply_to_first(to, |c| c.to_uppercase().collect())
                } else {
                    to.to_string()
                }
            } else {
                token.to_string()
            }
        })
        .collect()
}

//! A pseudo-probability language model over per-order ngram indexes.

use std::path::Path;

use super::NgramIndex;
use crate::Error;

/// Minimum fraction of looked-up ngrams that must be known to the index for
/// a score to be trusted at all.
pub const MIN_COVERAGE: f32 = 0.5;

/// A pseudo-probability and how much of it is backed by actual corpus data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Probability {
    prob: f64,
    coverage: f32,
}

impl Probability {
    pub fn prob(&self) -> f64 {
        self.prob
    }

    /// Fraction of the looked-up ngrams with a non-zero count.
    pub fn coverage(&self) -> f32 {
        self.coverage
    }
}

/// Opens the `1grams`/`2grams`/`3grams` indexes under one directory and
/// scores token sequences against them.
///
/// The probabilities are not real probabilities (add-one smoothing, no
/// backoff normalization), but they are monotonic in the corpus counts,
/// which is all the confusion evaluation needs.
pub struct LanguageModel {
    indexes: Vec<NgramIndex>,
}

impl LanguageModel {
    /// Opens the per-order subdirectories of `top_dir`. At least `1grams`
    /// must exist; `2grams` and `3grams` are picked up when present.
    pub fn open<P: AsRef<Path>>(top_dir: P) -> Result<Self, Error> {
        let top_dir = top_dir.as_ref();

        let mut indexes = Vec::new();
        for order in 1..=3usize {
            let dir = top_dir.join(format!("{}grams", order));
            if !dir.is_dir() {
                break;
            }
            indexes.push(NgramIndex::open(dir)?);
        }
        if indexes.is_empty() {
            return Err(Error::MalformedInput(format!(
                "no '1grams' index directory under '{}'",
                top_dir.display()
            )));
        }

        Ok(LanguageModel { indexes })
    }

    /// The largest ngram order this model can look up.
    pub fn max_order(&self) -> usize {
        self.indexes.len()
    }

    /// Corpus count of a token sequence. `tokens` must not be longer than
    /// [max_order][LanguageModel::max_order].
    pub fn count(&self, tokens: &[&str]) -> u64 {
        assert!(
            !tokens.is_empty() && tokens.len() <= self.indexes.len(),
            "requested {}gram but index has only up to {}grams",
            tokens.len(),
            self.indexes.len()
        );
        self.indexes[tokens.len() - 1].count_of(tokens)
    }

    pub fn total_token_count(&self) -> u64 {
        self.indexes[0].total_count()
    }

    /// Chain-rule pseudo-probability of `context` with add-one smoothing:
    /// `P(w1) * P(w2|w1) * P(w3|w1 w2) * ...`, each conditional estimated as
    /// `(count(prefix w) + 1) / (count(prefix) + 1)`.
    pub fn pseudo_probability(&self, context: &[&str]) -> Probability {
        assert!(!context.is_empty(), "context must not be empty");
        let context = &context[..context.len().min(self.max_order())];

        let mut max_coverage = 1;
        let mut coverage = 0;

        let first_count = self.count(&context[..1]);
        if first_count > 0 {
            coverage += 1;
        }
        let mut prob = (first_count + 1) as f64 / (self.total_token_count() + 1) as f64;

        for i in 2..=context.len() {
            let phrase_count = self.count(&context[..i]);
            let prefix_count = self.count(&context[..i - 1]);
            prob *= (phrase_count + 1) as f64 / (prefix_count + 1) as f64;

            max_coverage += 1;
            if phrase_count > 0 {
                coverage += 1;
            }
        }

        Probability {
            prob,
            coverage: coverage as f32 / max_coverage as f32,
        }
    }

    /// Scores `candidate` standing in for the token at `position`: the
    /// product of the pseudo-probabilities of the three 3-gram windows that
    /// contain the position. Returns 0.0 when too few of the involved
    /// ngrams are known ([MIN_COVERAGE]).
    pub fn score_candidate(&self, tokens: &[&str], position: usize, candidate: &str) -> f64 {
        let left = self.pseudo_probability(&window(tokens, position, candidate, 0, 2));
        let middle = self.pseudo_probability(&window(tokens, position, candidate, 1, 1));
        let right = self.pseudo_probability(&window(tokens, position, candidate, 2, 0));

        if left.coverage < MIN_COVERAGE
            && middle.coverage < MIN_COVERAGE
            && right.coverage < MIN_COVERAGE
        {
            0.0
        } else {
            left.prob * middle.prob * right.prob
        }
    }
}

/// The ngram window around `position` with `candidate` substituted in.
/// At the start of the sentence the window is cut short; past the end it is
/// padded with `"."`, matching how the corpus indexes sentence ends.
fn window<'a>(
    tokens: &[&'a str],
    position: usize,
    candidate: &'a str,
    to_left: usize,
    to_right: usize,
) -> Vec<&'a str> {
    let mut result = Vec::with_capacity(to_left + to_right + 1);

    let left_start = position.saturating_sub(to_left);
    result.extend(&tokens[left_start..position]);
    result.push(candidate);
    if position < to_left {
        // not enough left context, use what is there (without right padding)
        return result;
    }

    for i in 1..=to_right {
        result.push(tokens.get(position + i).copied().unwrap_or("."));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ngram::IndexWriter;
    use std::path::Path;
    use tempfile::tempdir;

    fn write_index(dir: &Path, entries: &[(&str, u64)]) {
        let mut writer = IndexWriter::new(dir).unwrap();
        let mut sorted = entries.to_vec();
        sorted.sort();
        for (ngram, count) in sorted {
            writer.add(ngram, count).unwrap();
        }
        writer.finish().unwrap();
    }

    fn tiny_model(dir: &Path) -> LanguageModel {
        write_index(
            &dir.join("1grams"),
            &[("I", 100), ("their", 60), ("there", 40), ("house", 50)],
        );
        write_index(
            &dir.join("2grams"),
            &[("I like", 20), ("their house", 30), ("there house", 1)],
        );
        write_index(
            &dir.join("3grams"),
            &[("in their house", 25), ("in there house", 1)],
        );
        LanguageModel::open(dir).unwrap()
    }

    #[test]
    fn open_requires_unigrams() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            LanguageModel::open(dir.path()),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn counts_and_totals() {
        let dir = tempdir().unwrap();
        let model = tiny_model(dir.path());

        assert_eq!(model.max_order(), 3);
        assert_eq!(model.count(&["their"]), 60);
        assert_eq!(model.count(&["their", "house"]), 30);
        assert_eq!(model.count(&["in", "their", "house"]), 25);
        assert_eq!(model.count(&["unknown"]), 0);
        assert_eq!(model.total_token_count(), 250);
    }

    #[test]
    fn more_frequent_reading_gets_higher_probability() {
        let dir = tempdir().unwrap();
        let model = tiny_model(dir.path());

        let likely = model.pseudo_probability(&["their", "house"]);
        let unlikely = model.pseudo_probability(&["there", "house"]);
        assert!(likely.prob() > unlikely.prob());
        assert_eq!(likely.coverage(), 1.0);
    }

    #[test]
    fn unknown_words_lower_coverage() {
        let dir = tempdir().unwrap();
        let model = tiny_model(dir.path());

        let p = model.pseudo_probability(&["xyzzy", "house"]);
        assert!(p.coverage() < MIN_COVERAGE);
    }

    #[test]
    fn candidate_scoring_prefers_corpus_reading() {
        let dir = tempdir().unwrap();
        let model = tiny_model(dir.path());

        let tokens = ["in", "their", "house"];
        let their = model.score_candidate(&tokens, 1, "their");
        let there = model.score_candidate(&tokens, 1, "there");
        assert!(their > there);
    }

    #[test]
    fn window_handles_sentence_bounds() {
        let tokens = ["in", "their", "house"];
        assert_eq!(window(&tokens, 1, "there", 1, 1), ["in", "there", "house"]);
        assert_eq!(window(&tokens, 0, "In", 2, 0), ["In"]);
        assert_eq!(window(&tokens, 2, "home", 0, 2), ["home", ".", "."]);
    }
}

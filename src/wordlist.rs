//! Word-list filters: finding words unknown to a dictionary (with fuzzy
//! correction candidates), case-insensitive deduplication and frequency
//! filtering.

use fst::{Automaton, IntoStreamer, Map, Streamer};
use std::cmp::{self, min, Ordering};
use std::collections::BinaryHeap;
use std::io::BufRead;

use unicase::UniCase;

use crate::dict::Dictionary;
use crate::types::DefaultHashSet;
use crate::utils::{apply_to_first, is_title_case};
use crate::Error;

/// Options for the fuzzy candidate search.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestOptions {
    /// Maximum Optimal String Alignment distance of a candidate.
    pub max_distance: usize,
    /// Within this prefix only distance-1 edits are considered, which prunes
    /// the automaton early.
    pub prefix_length: usize,
    /// Maximum number of candidates to return.
    pub top_n: usize,
    /// How much a word's frequency class weighs against its edit distance
    /// when ranking. `x` means the most frequent words gain at most `x`
    /// edit distances.
    pub freq_weight: f32,
}

impl Default for SuggestOptions {
    fn default() -> Self {
        SuggestOptions {
            max_distance: 2,
            prefix_length: 2,
            top_n: 10,
            freq_weight: 2.,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Candidate {
    score: f32,
    distance: usize,
    term: String,
}
impl Eq for Candidate {}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        // higher score => lower order such that sorting puts highest scores first
        other.score.partial_cmp(&self.score)
    }
}
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other).expect("scores are never NaN")
    }
}

/// State of the [OsaMatcher] after some number of accepted bytes: one row
/// of the edit distance matrix plus what is needed to extend it.
#[derive(Clone, Debug)]
pub struct OsaState {
    dist: usize,
    n: usize,
    // the row two rows up is needed for transpositions
    prev_row: Option<Vec<usize>>,
    prev_byte: u8,
    row: Vec<usize>,
}

impl OsaState {
    pub fn dist(&self) -> usize {
        self.dist
    }
}

/// An [fst::Automaton] matching all words within a bounded Optimal String
/// Alignment distance (Levenshtein plus adjacent transpositions) of the
/// query. Rows outside the reachable band are cut off, so the FST walk
/// stays close to the query.
#[derive(Debug, Clone)]
pub struct OsaMatcher<'a> {
    query: &'a [u8],
    distance: usize,
    prefix: usize,
}

impl<'a> OsaMatcher<'a> {
    pub fn new(query: &'a str, distance: usize, prefix: usize) -> Self {
        OsaMatcher {
            query: query.as_bytes(),
            distance,
            prefix,
        }
    }
}

impl<'a> Automaton for OsaMatcher<'a> {
    type State = Option<OsaState>;

    fn start(&self) -> Self::State {
        Some(OsaState {
            dist: self.query.len(),
            n: 0,
            prev_row: None,
            prev_byte: 0,
            row: (0..=self.query.len()).collect(),
        })
    }

    fn is_match(&self, state: &Self::State) -> bool {
        state
            .as_ref()
            .map_or(false, |state| state.dist <= self.distance)
    }

    fn can_match(&self, state: &Self::State) -> bool {
        state.is_some()
    }

    fn accept(&self, state: &Self::State, byte: u8) -> Self::State {
        state.as_ref().and_then(|state| {
            let row = &state.row;
            let mut next_row = state.row.to_vec();

            next_row[0] = state.n + 1;

            for i in 1..next_row.len() {
                let mut cost = if byte == self.query[i - 1] {
                    row[i - 1]
                } else {
                    min(
                        next_row[i - 1] + 1, // deletion
                        min(
                            row[i - 1] + 1, // insertion
                            row[i] + 1,     // substitution
                        ),
                    )
                };

                if i > 1 {
                    // transposition
                    if let Some(prev_row) = state.prev_row.as_ref() {
                        if byte == self.query[i - 2] && state.prev_byte == self.query[i - 1] {
                            cost = min(cost, prev_row[i - 2] + 1);
                        }
                    }
                }

                next_row[i] = cost;
            }

            let distance = if state.n >= self.prefix {
                self.distance
            } else {
                1
            };

            let lower_bound = state.n.saturating_sub(distance);
            let upper_bound = cmp::min(state.n + distance, self.query.len());

            let cutoff = if lower_bound > upper_bound {
                0
            } else {
                *next_row[lower_bound..=upper_bound]
                    .iter()
                    .min()
                    .unwrap_or(&0)
            };

            if cutoff > distance {
                return None;
            }

            Some(OsaState {
                dist: next_row[self.query.len()],
                n: state.n + 1,
                prev_row: Some(row.clone()),
                prev_byte: byte,
                row: next_row,
            })
        })
    }
}

fn check_word(dictionary: &Dictionary, word: &str, recurse: bool) -> bool {
    word.is_empty()
        || dictionary.contains(word)
        || word.chars().all(|x| !x.is_alphabetic())
        || (recurse
            // for title case words, it is enough if the lowercase variant is known.
            // `is_title_case` can still be true after `.to_lowercase()` (e.g. for
            // one-letter words), hence the `recurse` parameter.
            && is_title_case(word)
            && check_word(
                dictionary,
                &apply_to_first(word, |x| x.to_lowercase().collect()),
                false,
            ))
}

/// Whether the dictionary knows `word`. Title-case words count as known if
/// their lowercase variant is; words without any letters always count as
/// known.
pub fn is_known(dictionary: &Dictionary, word: &str) -> bool {
    check_word(dictionary, word, true)
}

/// Correction candidates for `word` within
/// [max_distance][SuggestOptions::max_distance], best first. Ranking mixes
/// edit distance with the candidate's frequency class.
pub fn suggestions(dictionary: &Dictionary, word: &str, options: &SuggestOptions) -> Vec<String> {
    let map = Map::new(dictionary.fst_bytes()).expect("dictionary fst was validated on open.");
    let query = OsaMatcher::new(word, options.max_distance, options.prefix_length);

    let mut out = BinaryHeap::with_capacity(options.top_n);

    let mut stream = map.search_with_state(query).into_stream();
    while let Some((k, _, s)) = stream.next() {
        let state = s.expect("matching automaton state is always `Some`.");

        let term = String::from_utf8(k.to_vec()).expect("fst keys must be valid utf-8.");
        let freq = dictionary.freq_class(&term).unwrap_or(0);
        out.push(Candidate {
            distance: state.dist(),
            score: (options.max_distance - state.dist()) as f32
                + freq as f32 / 25. * options.freq_weight,
            term,
        });
        if out.len() > options.top_n {
            out.pop();
        }
    }

    out.into_sorted_vec().into_iter().map(|x| x.term).collect()
}

/// A word the dictionary does not know, with correction candidates.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownWord {
    pub word: String,
    pub suggestions: Vec<String>,
}

/// Reads one word per line (`#` comments and blank lines are skipped) and
/// returns the words unknown to the dictionary in input order, each with
/// its correction candidates.
pub fn unknown_words<R: BufRead>(
    reader: R,
    dictionary: &Dictionary,
    options: &SuggestOptions,
) -> Result<Vec<UnknownWord>, Error> {
    let mut unknown = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let word = line.trim();
        if word.is_empty() || word.starts_with('#') {
            continue;
        }

        if !is_known(dictionary, word) {
            unknown.push(UnknownWord {
                word: word.to_string(),
                suggestions: suggestions(dictionary, word, options),
            });
        }
    }

    Ok(unknown)
}

/// Removes words that only differ in case, keeping the first occurrence.
pub fn dedup_case_insensitive(words: Vec<String>) -> Vec<String> {
    let mut seen: DefaultHashSet<UniCase<String>> = DefaultHashSet::default();
    words
        .into_iter()
        .filter(|word| seen.insert(UniCase::new(word.clone())))
        .collect()
}

/// Splits `words` into (frequent, infrequent) around `min_class`. Words the
/// dictionary has no frequency for count as infrequent.
pub fn split_by_freq_class(
    words: Vec<String>,
    dictionary: &Dictionary,
    min_class: u8,
) -> (Vec<String>, Vec<String>) {
    words
        .into_iter()
        .partition(|word| dictionary.freq_class(word).map_or(false, |c| c >= min_class))
}

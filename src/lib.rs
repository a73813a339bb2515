//! Corpus and dictionary tooling for a rule-based grammar checker.
//!
//! This crate bundles the recurring "dev tools" of a grammar checker into one
//! library with thin CLI front-ends (enable the `bin` feature):
//! - [`ngram`]: frequency indexes over large ngram corpora and a simple
//!   ngram language model on top of them.
//! - [`dict`]: binary word/tag dictionaries built from plain-text dumps,
//!   and export back to text.
//! - [`confusion`]: confusion-set files and precision/recall evaluation of
//!   confusion pairs against an ngram index.
//! - [`diff`]: parsing rule-match output (text and JSON lines) and diffing
//!   two checker runs.
//! - [`wordlist`]: speller-style word-list filters with fuzzy correction
//!   candidates.
//!
//! # Examples
//!
//! Look up ngram counts:
//!
//! ```no_run
//! use ltdev::ngram::NgramIndex;
//!
//! let index = NgramIndex::open("index/en/3grams")?;
//! println!("{}", index.count("out of the"));
//! # Ok::<(), ltdev::Error>(())
//! ```
//!
//! Diff two checker runs:
//!
//! ```no_run
//! use ltdev::diff::{find_diffs, ParseResult};
//!
//! let old = ParseResult::from_path("checks-old.txt")?;
//! let new = ParseResult::from_path("checks-new.txt")?;
//! for diff in find_diffs(&old.matches, &new.matches) {
//!     println!("{:?}", diff.kind());
//! }
//! # Ok::<(), ltdev::Error>(())
//! ```

use std::io;

use thiserror::Error;

pub mod confusion;
pub mod dict;
pub mod diff;
pub mod ngram;
pub mod types;
pub(crate) mod utils;
pub mod wordlist;

#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    /// (De)serialization error. Can have occured during deserialization or during serialization.
    #[error(transparent)]
    Serialization(#[from] bincode::Error),
    #[error(transparent)]
    Fst(#[from] fst::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("index at '{0}' exists but has no completion marker")]
    IncompleteIndex(String),
}

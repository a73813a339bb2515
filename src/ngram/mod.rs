//! Ngram frequency indexes built from large corpora, and a simple language
//! model on top of them.
//!
//! An index directory contains one `ngrams.bin` file (an FST mapping ngrams
//! to occurrence counts plus the total token count) and, once a build has
//! run to completion, a marker file. Incomplete directories are rebuilt by
//! the next run, so an aborted multi-hour indexing job can be resumed per
//! input file.

use fst::{IntoStreamer, Map, MapBuilder, Streamer};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::Error;

mod builder;
mod model;

pub use builder::{DumpFormat, FrequencyIndexer, TextIndexer, WriterMode};
pub use model::{LanguageModel, Probability};

/// Sentence start marker used in the Google ngram corpus.
pub const SENTENCE_START: &str = "_START_";
/// Sentence end marker used in the Google ngram corpus.
pub const SENTENCE_END: &str = "_END_";

/// Written into an index directory after a successful build.
pub const COMPLETE_MARKER: &str = "index_complete";

const INDEX_FILE: &str = "ngrams.bin";

/// Serialized form of an [NgramIndex].
#[derive(Serialize, Deserialize)]
struct IndexData {
    fst: Vec<u8>,
    total_count: u64,
}

/// An immutable map from ngrams (tokens joined by a single space) to their
/// occurrence counts.
pub struct NgramIndex {
    map: Map<Vec<u8>>,
    total_count: u64,
}

impl NgramIndex {
    /// Opens the index stored in `dir`. Fails if the directory has no
    /// completion marker, since a partially written index silently returning
    /// zero counts would skew every evaluation run on top of it.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, Error> {
        let dir = dir.as_ref();
        if !dir.join(COMPLETE_MARKER).exists() {
            return Err(Error::IncompleteIndex(dir.display().to_string()));
        }

        let reader = BufReader::new(fs::File::open(dir.join(INDEX_FILE))?);
        let data: IndexData = bincode::deserialize_from(reader)?;

        Ok(NgramIndex {
            map: Map::new(data.fst)?,
            total_count: data.total_count,
        })
    }

    /// The occurrence count of `ngram`, 0 if it is not in the index.
    pub fn count(&self, ngram: &str) -> u64 {
        self.map.get(ngram).unwrap_or(0)
    }

    /// Like [count][NgramIndex::count], but takes the ngram as tokens.
    pub fn count_of(&self, tokens: &[&str]) -> u64 {
        self.count(&tokens.join(" "))
    }

    /// The sum of all counts in this index.
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Number of distinct ngrams.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.len() == 0
    }

    /// Streams all `(ngram, count)` pairs in lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = (String, u64)> + '_ {
        let mut stream = self.map.stream();
        std::iter::from_fn(move || {
            stream.next().map(|(k, v)| {
                let key =
                    String::from_utf8(k.to_vec()).expect("fst keys must be valid utf-8.");
                (key, v)
            })
        })
    }
}

/// Writes one index directory. Ngrams must be added in lexicographic order
/// with no duplicates, which holds for the sorted Google dumps and for the
/// sorted in-memory maps the text indexer flushes.
pub struct IndexWriter {
    dir: PathBuf,
    builder: MapBuilder<Vec<u8>>,
    total_count: u64,
}

impl IndexWriter {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        Ok(IndexWriter {
            dir,
            builder: MapBuilder::memory(),
            total_count: 0,
        })
    }

    pub fn add(&mut self, ngram: &str, count: u64) -> Result<(), Error> {
        self.builder.insert(ngram, count).map_err(|_| {
            Error::MalformedInput(format!(
                "ngram '{}' out of order, input must be sorted and aggregated",
                ngram
            ))
        })?;
        self.total_count += count;
        Ok(())
    }

    /// Writes the index file and the completion marker.
    pub fn finish(self) -> Result<(), Error> {
        let data = IndexData {
            fst: self.builder.into_inner()?,
            total_count: self.total_count,
        };

        let writer = BufWriter::new(fs::File::create(self.dir.join(INDEX_FILE))?);
        bincode::serialize_into(writer, &data)?;
        mark_complete(&self.dir)
    }

    /// Merges already-written segment FSTs into the final index file. Counts
    /// of ngrams occurring in several segments are summed.
    pub(crate) fn merge_segments(dir: &Path, segments: &[PathBuf]) -> Result<(), Error> {
        let maps = segments
            .iter()
            .map(|path| Ok(Map::new(fs::read(path)?)?))
            .collect::<Result<Vec<_>, Error>>()?;

        let mut builder = MapBuilder::memory();
        let mut total_count = 0;

        let mut op = fst::map::OpBuilder::new();
        for map in &maps {
            op = op.add(map.stream());
        }
        let mut union = op.union();

        while let Some((key, values)) = union.next() {
            let count: u64 = values.iter().map(|x| x.value).sum();
            builder
                .insert(key, count)
                .expect("fst union streams keys in lexicographic order.");
            total_count += count;
        }

        let data = IndexData {
            fst: builder.into_inner()?,
            total_count,
        };
        let writer = BufWriter::new(fs::File::create(dir.join(INDEX_FILE))?);
        bincode::serialize_into(writer, &data)?;

        for path in segments {
            fs::remove_file(path)?;
        }
        mark_complete(dir)
    }
}

/// Whether a build for this index directory has run to completion.
pub fn is_complete(dir: &Path) -> bool {
    dir.join(COMPLETE_MARKER).exists()
}

fn mark_complete(dir: &Path) -> Result<(), Error> {
    let mut marker = fs::File::create(dir.join(COMPLETE_MARKER))?;
    // the content is informational only, existence is what counts
    writeln!(marker, "complete")?;
    Ok(())
}

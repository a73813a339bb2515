//! Builds ngram indexes from Google Books dump files or from raw text.

use flate2::read::GzDecoder;
use fs_err as fs;
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use unicode_segmentation::UnicodeSegmentation;

use super::{is_complete, IndexWriter, SENTENCE_END, SENTENCE_START};
use crate::Error;

/// Rows before this year in the Google Books dumps are too noisy to be useful.
const MIN_YEAR: u32 = 1910;
/// Longer "ngrams" are corpus noise (tables, URLs), not language.
const MAX_NGRAM_CHARS: usize = 1000;
/// Tokens longer than this are not counted when indexing raw text.
const MAX_TOKEN_CHARS: usize = 20;

lazy_static! {
    // e.g. googlebooks-eng-all-3gram-20120701-th.gz
    static ref GOOGLE_BOOKS_NAME: Regex =
        Regex::new(r"^googlebooks-[a-z]{3}-all-[1-5]gram-\d{8}-(.+?)\.gz$").unwrap();
    // Hive aggregation output, e.g. part-r-00000-ab12cd34-...-ef56_th.gz
    static ref AGGREGATED_NAME: Regex =
        Regex::new(r"^[a-z0-9]+-[a-z0-9]+-[a-z0-9]+-[a-z0-9]+-[a-z0-9]+[_-](.+?)\.gz$").unwrap();
    // files like eng-all-3gram-..._VERB_.gz only contain POS pseudo-ngrams
    static ref POS_FILE_NAME: Regex = Regex::new(r".*_[A-Z]+_.*").unwrap();
}

/// The two row layouts found in ngram dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFormat {
    /// `ngram\tyear\tcount`, sorted by ngram; counts for one ngram must be
    /// aggregated over its years.
    GoogleBooks,
    /// `ngram\tcount`, already aggregated.
    Aggregated,
}

impl DumpFormat {
    /// Detects the dump format from a file name and returns it together
    /// with the name of the per-file index directory (the distinguishing
    /// suffix of the dump name). Text-mode output files (`*-output.csv`)
    /// match neither pattern; they cannot be fed back in as dumps.
    pub fn detect(file_name: &str) -> Option<(DumpFormat, String)> {
        if let Some(captures) = GOOGLE_BOOKS_NAME.captures(file_name) {
            Some((DumpFormat::GoogleBooks, captures[1].to_string()))
        } else if let Some(captures) = AGGREGATED_NAME.captures(file_name) {
            Some((DumpFormat::Aggregated, captures[1].to_string()))
        } else {
            None
        }
    }
}

/// Output flavor, mirroring the original tool's text and index modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterMode {
    /// Aggregated `ngram\tcount` TSV files, mostly for eyeballing and
    /// re-aggregation.
    Text,
    /// Binary FST indexes usable by [NgramIndex][super::NgramIndex].
    Binary,
}

/// Where aggregated `(ngram, count)` pairs end up. One sink per index
/// directory.
trait DataSink {
    fn add(&mut self, ngram: &str, count: u64) -> Result<(), Error>;
    fn finish(self: Box<Self>) -> Result<(), Error>;
}

struct FstSink {
    writer: IndexWriter,
}

impl DataSink for FstSink {
    fn add(&mut self, ngram: &str, count: u64) -> Result<(), Error> {
        self.writer.add(ngram, count)
    }

    fn finish(self: Box<Self>) -> Result<(), Error> {
        self.writer.finish()
    }
}

/// Forwards to the sink unless the ngram is over-long corpus noise. Applies
/// to both output modes, so text-mode files stay re-aggregatable.
fn add_filtered(sink: &mut dyn DataSink, ngram: &str, count: u64) -> Result<(), Error> {
    if ngram.chars().count() > MAX_NGRAM_CHARS {
        let head: String = ngram.chars().take(50).collect();
        warn!(
            "ignoring ngram longer than {} chars: {}...",
            MAX_NGRAM_CHARS, head
        );
        return Ok(());
    }
    sink.add(ngram, count)
}

struct TextSink {
    dir: PathBuf,
    writer: BufWriter<fs::File>,
}

impl TextSink {
    fn new(dir: &Path) -> Result<Self, Error> {
        fs::create_dir_all(dir)?;
        let name = dir
            .file_name()
            .map(|x| x.to_string_lossy().to_string())
            .unwrap_or_else(|| "ngrams".to_string());
        let writer = BufWriter::new(fs::File::create(dir.join(format!("{}-output.csv", name)))?);

        Ok(TextSink {
            dir: dir.to_path_buf(),
            writer,
        })
    }
}

impl DataSink for TextSink {
    fn add(&mut self, ngram: &str, count: u64) -> Result<(), Error> {
        writeln!(self.writer, "{}\t{}", ngram, count)?;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<(), Error> {
        self.writer.flush()?;
        super::mark_complete(&self.dir)
    }
}

/// Converts a directory of sorted Google ngram dump files (`*.gz`) into one
/// index directory per input file.
pub struct FrequencyIndexer {
    mode: WriterMode,
    min_year: u32,
}

impl FrequencyIndexer {
    pub fn new(mode: WriterMode) -> Self {
        FrequencyIndexer {
            mode,
            min_year: MIN_YEAR,
        }
    }

    /// Indexes every recognized dump file in `input_dir` into a subdirectory
    /// of `index_base_dir`. Dumps whose index directory carries a completion
    /// marker are skipped, so an interrupted run picks up where it stopped.
    pub fn run(&self, input_dir: &Path, index_base_dir: &Path) -> Result<(), Error> {
        let mut files: Vec<PathBuf> = fs::read_dir(input_dir)?
            .filter_map(|entry| entry.ok().map(|x| x.path()))
            .filter(|path| path.is_file())
            .collect();
        files.sort();

        info!("{} input files in {}", files.len(), input_dir.display());

        for (i, file) in files.iter().enumerate() {
            let name = file
                .file_name()
                .map(|x| x.to_string_lossy().to_string())
                .unwrap_or_default();

            if POS_FILE_NAME.is_match(&name) {
                info!("skipping POS tag file {}", name);
                continue;
            }
            let (format, index_name) = match DumpFormat::detect(&name) {
                Some(detected) => detected,
                None => {
                    info!("skipping {} - file name matches no known dump format", name);
                    continue;
                }
            };

            let index_dir = index_base_dir.join(&index_name);
            if is_complete(&index_dir) {
                info!("skipping {} - index '{}' is complete", name, index_name);
                continue;
            }

            info!(
                "indexing {} ({} of {}) into {}",
                name,
                i + 1,
                files.len(),
                index_dir.display()
            );
            let mut sink: Box<dyn DataSink> = match self.mode {
                WriterMode::Binary => Box::new(FstSink {
                    writer: IndexWriter::new(&index_dir)?,
                }),
                WriterMode::Text => Box::new(TextSink::new(&index_dir)?),
            };

            let reader = BufReader::new(GzDecoder::new(fs::File::open(file)?));
            self.index_dump(reader, sink.as_mut(), format)?;
            sink.finish()?;
        }

        Ok(())
    }

    /// Aggregates one dump. Google Books rows are grouped by their (sorted)
    /// ngram key: counts accumulate while the key repeats and the aggregate
    /// is flushed when the key changes, and once more at the end of input.
    fn index_dump<R: BufRead>(
        &self,
        reader: R,
        sink: &mut dyn DataSink,
        format: DumpFormat,
    ) -> Result<(), Error> {
        let mut prev: Option<(String, u64)> = None;
        let mut line_count: u64 = 0;

        for line in reader.lines() {
            let line = line?;
            line_count += 1;
            if line_count % 1_000_000 == 0 {
                info!("line {}", line_count);
            }

            let mut parts = line.split('\t');
            let text = match parts.next() {
                Some(text) if !text.is_empty() => text,
                _ => continue,
            };
            if is_pos_tag_ngram(text) {
                continue;
            }

            match format {
                DumpFormat::Aggregated => {
                    let count = parts.next().and_then(|x| x.parse::<u64>().ok());
                    match count {
                        Some(count) => add_filtered(sink, text, count)?,
                        None => warn!("could not index row: {}", line),
                    }
                }
                DumpFormat::GoogleBooks => {
                    let (year, count) = match (parts.next(), parts.next()) {
                        (Some(year), Some(count)) => (
                            year.parse::<u32>().map_err(|_| {
                                Error::MalformedInput(format!("bad year in row: {}", line))
                            })?,
                            count.parse::<u64>().map_err(|_| {
                                Error::MalformedInput(format!("bad count in row: {}", line))
                            })?,
                        ),
                        _ => {
                            return Err(Error::MalformedInput(format!(
                                "expected 'ngram\\tyear\\tcount', got: {}",
                                line
                            )))
                        }
                    };
                    if year < self.min_year {
                        continue;
                    }

                    match prev.take() {
                        Some((prev_text, aggregate)) if prev_text == text => {
                            prev = Some((prev_text, aggregate + count));
                        }
                        Some((prev_text, aggregate)) => {
                            add_filtered(sink, &prev_text, aggregate)?;
                            prev = Some((text.to_string(), count));
                        }
                        None => prev = Some((text.to_string(), count)),
                    }
                }
            }
        }

        if let Some((text, aggregate)) = prev {
            add_filtered(sink, &text, aggregate)?;
        }

        Ok(())
    }
}

/// Filters pseudo-ngrams like `_VERB_` or `Italian_ADJ`. The `_START_` and
/// `_END_` sentinels look similar but are real data.
fn is_pos_tag_ngram(text: &str) -> bool {
    match text.find('_') {
        None => false,
        Some(idx) => {
            let rest = &text[idx..];
            !(rest.starts_with(SENTENCE_START) || rest.starts_with(SENTENCE_END))
        }
    }
}

/// Counts 1/2/3-grams from raw text and writes one index per ngram order
/// (`1grams/`, `2grams/`, `3grams/`).
///
/// Counts are kept in memory and flushed to sorted FST segments whenever the
/// trigram map exceeds the cache limit; [finish][TextIndexer::finish] merges
/// the segments of each order, summing counts.
pub struct TextIndexer {
    index_dir: PathBuf,
    cache_limit: usize,
    counts: Vec<BTreeMap<String, u64>>,
    segments: Vec<Vec<PathBuf>>,
    segment_id: usize,
    line_count: u64,
}

impl TextIndexer {
    pub fn new<P: AsRef<Path>>(index_dir: P) -> Result<Self, Error> {
        let index_dir = index_dir.as_ref().to_path_buf();
        for order in 1..=3 {
            fs::create_dir_all(index_dir.join(format!("{}grams", order)))?;
        }

        Ok(TextIndexer {
            index_dir,
            cache_limit: 1_000_000,
            counts: vec![BTreeMap::new(), BTreeMap::new(), BTreeMap::new()],
            segments: vec![Vec::new(), Vec::new(), Vec::new()],
            segment_id: 0,
            line_count: 0,
        })
    }

    /// Sets the number of distinct trigrams buffered before a flush.
    pub fn with_cache_limit(mut self, cache_limit: usize) -> Self {
        self.cache_limit = cache_limit.max(1);
        self
    }

    pub fn index_file(&mut self, path: &Path) -> Result<(), Error> {
        let reader = BufReader::new(fs::File::open(path)?);
        for line in reader.lines() {
            self.index_line(&line?)?;
        }
        Ok(())
    }

    pub fn index_line(&mut self, line: &str) -> Result<(), Error> {
        self.line_count += 1;
        if self.line_count % 50_000 == 0 {
            info!("indexing line {}", self.line_count);
        }

        for sentence in split_sentences(line) {
            self.index_sentence(sentence);
        }
        if self.counts[2].len() >= self.cache_limit {
            self.flush()?;
        }
        Ok(())
    }

    fn index_sentence(&mut self, sentence: &str) {
        let mut tokens: Vec<&str> = vec![SENTENCE_START];
        tokens.extend(sentence.unicode_words());
        tokens.push(SENTENCE_END);

        for order in 1..=3usize {
            for window in tokens.windows(order) {
                if window.iter().any(|x| x.chars().count() > MAX_TOKEN_CHARS) {
                    continue;
                }
                *self.counts[order - 1]
                    .entry(window.join(" "))
                    .or_insert(0) += 1;
            }
        }
    }

    fn flush(&mut self) -> Result<(), Error> {
        for order in 1..=3usize {
            let counts = std::mem::take(&mut self.counts[order - 1]);
            if counts.is_empty() {
                continue;
            }

            let mut builder = fst::MapBuilder::memory();
            for (ngram, count) in counts {
                builder
                    .insert(&ngram, count)
                    .expect("BTreeMap iterates keys in lexicographic order.");
            }

            let path = self
                .index_dir
                .join(format!("{}grams", order))
                .join(format!("segment-{}.fst", self.segment_id));
            fs::write(&path, builder.into_inner()?)?;
            self.segments[order - 1].push(path);
        }
        self.segment_id += 1;
        Ok(())
    }

    /// Flushes remaining counts and merges the segments of each order into
    /// its final index.
    pub fn finish(mut self) -> Result<(), Error> {
        self.flush()?;
        for order in 1..=3usize {
            let dir = self.index_dir.join(format!("{}grams", order));
            IndexWriter::merge_segments(&dir, &self.segments[order - 1])?;
        }
        Ok(())
    }
}

/// Splits a line into sentences at `.`, `!` or `?` followed by whitespace.
/// Deliberately much simpler than the checker's own sentence segmenter; for
/// frequency counting the occasional wrong split is noise.
fn split_sentences(line: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut split_next = false;

    for (idx, c) in line.char_indices() {
        if split_next && c.is_whitespace() {
            sentences.push(&line[start..idx]);
            start = idx;
        }
        split_next = matches!(c, '.' | '!' | '?');
    }
    if start < line.len() {
        sentences.push(&line[start..]);
    }
    sentences
        .into_iter()
        .map(|x| x.trim())
        .filter(|x| !x.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ngram::NgramIndex;
    use flate2::{write::GzEncoder, Compression};
    use tempfile::tempdir;

    fn write_gz_dump(path: &Path, rows: &str) {
        let mut encoder = GzEncoder::new(fs::File::create(path).unwrap(), Compression::default());
        encoder.write_all(rows.as_bytes()).unwrap();
        encoder.finish().unwrap();
    }

    #[test]
    fn run_skips_complete_and_rebuilds_unmarked_indexes() {
        let dir = tempdir().unwrap();
        let input_dir = dir.path().join("dumps");
        let index_dir = dir.path().join("index");
        fs::create_dir_all(&input_dir).unwrap();

        write_gz_dump(
            &input_dir.join("googlebooks-eng-all-1gram-20120701-aa.gz"),
            "alpha\t1950\t10\n",
        );
        write_gz_dump(
            &input_dir.join("googlebooks-eng-all-1gram-20120701-bb.gz"),
            "beta\t1950\t7\n",
        );

        // "aa" was built by an earlier run with different counts and is
        // marked complete
        let mut writer = IndexWriter::new(index_dir.join("aa")).unwrap();
        writer.add("alpha", 99).unwrap();
        writer.finish().unwrap();
        // "bb" was aborted mid-build: an index file exists but no marker
        fs::create_dir_all(index_dir.join("bb")).unwrap();
        fs::write(index_dir.join("bb").join("ngrams.bin"), b"partial").unwrap();

        FrequencyIndexer::new(WriterMode::Binary)
            .run(&input_dir, &index_dir)
            .unwrap();

        // the complete index was skipped, so its old count survives
        let aa = NgramIndex::open(index_dir.join("aa")).unwrap();
        assert_eq!(aa.count("alpha"), 99);

        // the unmarked index was rebuilt from its dump and marked
        let bb = NgramIndex::open(index_dir.join("bb")).unwrap();
        assert_eq!(bb.count("beta"), 7);
        assert!(is_complete(&index_dir.join("bb")));
    }

    #[test]
    fn over_long_ngrams_are_dropped_in_both_modes() {
        let dir = tempdir().unwrap();
        let input_dir = dir.path().join("dumps");
        fs::create_dir_all(&input_dir).unwrap();

        let long = "a".repeat(MAX_NGRAM_CHARS + 1);
        write_gz_dump(
            &input_dir.join("googlebooks-eng-all-1gram-20120701-zz.gz"),
            &format!("{}\t1950\t5\nshort\t1950\t3\n", long),
        );

        let index_dir = dir.path().join("index");
        FrequencyIndexer::new(WriterMode::Binary)
            .run(&input_dir, &index_dir)
            .unwrap();
        let index = NgramIndex::open(index_dir.join("zz")).unwrap();
        assert_eq!(index.count(&long), 0);
        assert_eq!(index.count("short"), 3);
        assert_eq!(index.len(), 1);

        let text_dir = dir.path().join("text");
        FrequencyIndexer::new(WriterMode::Text)
            .run(&input_dir, &text_dir)
            .unwrap();
        let csv = fs::read_to_string(text_dir.join("zz").join("zz-output.csv")).unwrap();
        assert_eq!(csv, "short\t3\n");
    }

    #[test]
    fn pos_tag_filter_keeps_sentence_markers() {
        assert!(is_pos_tag_ngram("_VERB_"));
        assert!(is_pos_tag_ngram("Italian_ADJ"));
        assert!(!is_pos_tag_ngram("_START_ the"));
        assert!(!is_pos_tag_ngram("house _END_"));
        assert!(!is_pos_tag_ngram("the house"));
    }

    #[test]
    fn dump_format_detection() {
        assert_eq!(
            DumpFormat::detect("googlebooks-eng-all-3gram-20120701-th.gz"),
            Some((DumpFormat::GoogleBooks, "th".to_string()))
        );
        assert_eq!(
            DumpFormat::detect("part1-r2-x3-y4-z5_th.gz"),
            Some((DumpFormat::Aggregated, "th".to_string()))
        );
        assert_eq!(DumpFormat::detect("notes.txt"), None);
    }

    #[test]
    fn google_books_rows_aggregate_consecutive_keys() {
        struct Collect(Vec<(String, u64)>);
        impl DataSink for Collect {
            fn add(&mut self, ngram: &str, count: u64) -> Result<(), Error> {
                self.0.push((ngram.to_string(), count));
                Ok(())
            }
            fn finish(self: Box<Self>) -> Result<(), Error> {
                Ok(())
            }
        }

        let dump = "in the end\t1950\t10\n\
                    in the end\t1960\t5\n\
                    in the end\t1900\t100\n\
                    in the estuary\t1950\t2\n\
                    in the _VERB_\t1950\t70\n\
                    on the end\t1999\t1\n";
        let mut sink = Collect(Vec::new());
        FrequencyIndexer::new(WriterMode::Binary)
            .index_dump(dump.as_bytes(), &mut sink, DumpFormat::GoogleBooks)
            .unwrap();

        // the 1900 row is below the year cutoff, the POS row is filtered,
        // the trailing aggregate is flushed at end of input
        assert_eq!(
            sink.0,
            vec![
                ("in the end".to_string(), 15),
                ("in the estuary".to_string(), 2),
                ("on the end".to_string(), 1),
            ]
        );
    }

    #[test]
    fn aggregated_rows_with_bad_counts_are_skipped() {
        struct Collect(Vec<(String, u64)>);
        impl DataSink for Collect {
            fn add(&mut self, ngram: &str, count: u64) -> Result<(), Error> {
                self.0.push((ngram.to_string(), count));
                Ok(())
            }
            fn finish(self: Box<Self>) -> Result<(), Error> {
                Ok(())
            }
        }

        let dump = "their house\t23\nbroken row\nalso broken\tNaN\nthere house\t2\n";
        let mut sink = Collect(Vec::new());
        FrequencyIndexer::new(WriterMode::Binary)
            .index_dump(dump.as_bytes(), &mut sink, DumpFormat::Aggregated)
            .unwrap();

        assert_eq!(
            sink.0,
            vec![
                ("their house".to_string(), 23),
                ("there house".to_string(), 2)
            ]
        );
    }

    #[test]
    fn corrupt_google_books_row_fails_the_build() {
        struct Ignore;
        impl DataSink for Ignore {
            fn add(&mut self, _: &str, _: u64) -> Result<(), Error> {
                Ok(())
            }
            fn finish(self: Box<Self>) -> Result<(), Error> {
                Ok(())
            }
        }

        let dump = "in the end\tnot-a-year\t10\n";
        let result = FrequencyIndexer::new(WriterMode::Binary).index_dump(
            dump.as_bytes(),
            &mut Ignore,
            DumpFormat::GoogleBooks,
        );
        assert!(matches!(result, Err(Error::MalformedInput(_))));
    }

    #[test]
    fn sentence_splitting() {
        assert_eq!(
            split_sentences("This is one. And two! And three"),
            vec!["This is one.", "And two!", "And three"]
        );
        assert_eq!(split_sentences(""), Vec::<&str>::new());
        assert_eq!(split_sentences("No terminator"), vec!["No terminator"]);
    }

    #[test]
    fn text_indexer_counts_ngrams_across_flushes() {
        let dir = tempdir().unwrap();

        let mut indexer = TextIndexer::new(dir.path()).unwrap().with_cache_limit(2);
        indexer.index_line("the cat sat").unwrap();
        indexer.index_line("the cat ran").unwrap();
        indexer.finish().unwrap();

        let unigrams = NgramIndex::open(dir.path().join("1grams")).unwrap();
        assert_eq!(unigrams.count("the"), 2);
        assert_eq!(unigrams.count("cat"), 2);
        assert_eq!(unigrams.count("sat"), 1);
        assert_eq!(unigrams.count(SENTENCE_START), 2);

        let bigrams = NgramIndex::open(dir.path().join("2grams")).unwrap();
        assert_eq!(bigrams.count("the cat"), 2);
        assert_eq!(bigrams.count("cat sat"), 1);

        let trigrams = NgramIndex::open(dir.path().join("3grams")).unwrap();
        assert_eq!(trigrams.count("the cat sat"), 1);
        assert_eq!(trigrams.count(&format!("{} the cat", SENTENCE_START)), 2);
    }

    #[test]
    fn long_tokens_are_not_counted() {
        let dir = tempdir().unwrap();

        let mut indexer = TextIndexer::new(dir.path()).unwrap();
        indexer
            .index_line("short aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa short")
            .unwrap();
        indexer.finish().unwrap();

        let unigrams = NgramIndex::open(dir.path().join("1grams")).unwrap();
        assert_eq!(unigrams.count("short"), 2);
        assert_eq!(unigrams.count("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"), 0);
    }
}

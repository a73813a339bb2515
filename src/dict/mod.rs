//! Binary word/tag dictionaries built from plain-text dumps, and export
//! back to text.
//!
//! Two dump flavors feed the same artifact:
//! - speller word lists: one word per line,
//! - tagger dumps: `word\tlemma\ttag` per line, several readings per word.
//!
//! A frequency list (lines like `<w f="230">word</w>`) can be merged in; the
//! raw 0..255 frequencies are folded into 26 classes `A`..`Z` the way the
//! original dictionary tooling does.

use fst::{Map, MapBuilder, Streamer};
use fs_err as fs;
use lazy_static::lazy_static;
use log::warn;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::Error;

mod info;

pub use info::DictInfo;

/// Raw frequencies span this many values...
const FREQ_RANGES_IN: u32 = 256;
/// ...and are folded into this many classes (the letters A-Z).
const FREQ_RANGES_OUT: u32 = 26;

lazy_static! {
    static ref FREQ_ENTRY: Regex =
        Regex::new(r#".*<w f="(\d+)"(?: flags=".*?")?>(.+)</w>.*"#).unwrap();
}

/// Folds a raw frequency into its class letter. `A` is least frequent.
pub fn freq_class_letter(class: u8) -> char {
    (b'A' + class.min(25)) as char
}

fn freq_class(freq: u32) -> u8 {
    (freq.min(FREQ_RANGES_IN - 1) * FREQ_RANGES_OUT / FREQ_RANGES_IN) as u8
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Entry {
    /// (lemma, tag) readings; empty for speller dictionaries.
    readings: Vec<(String, String)>,
    freq_class: Option<u8>,
}

/// Counters from merging a frequency list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FreqStats {
    pub applied: usize,
    /// Frequency entries whose word is not in the dictionary. Reported,
    /// not an error: frequency lists are usually built from a different
    /// corpus snapshot than the word list.
    pub unmatched: usize,
}

/// Accumulates words and readings, then builds the binary [Dictionary].
/// Input order does not matter; keys are sorted during the build.
#[derive(Default)]
pub struct DictionaryBuilder {
    words: BTreeMap<String, Entry>,
}

impl DictionaryBuilder {
    pub fn new() -> Self {
        DictionaryBuilder::default()
    }

    pub fn add_word(&mut self, word: &str) {
        self.words.entry(word.to_string()).or_default();
    }

    /// Adds one reading, collapsing exact duplicates.
    pub fn add_reading(&mut self, word: &str, lemma: &str, tag: &str) {
        let entry = self.words.entry(word.to_string()).or_default();
        let reading = (lemma.to_string(), tag.to_string());
        if !entry.readings.contains(&reading) {
            entry.readings.push(reading);
        }
    }

    /// Reads a dump where each line is either a bare word or
    /// `word\tlemma\ttag`. Lines starting with `#` are comments.
    pub fn read_dump<R: BufRead>(&mut self, reader: R) -> Result<(), Error> {
        for line in reader.lines() {
            let line = line?;
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }

            let mut parts = line.split('\t');
            let word = parts.next().expect("split always yields one part.");
            match (parts.next(), parts.next()) {
                (Some(lemma), Some(tag)) => self.add_reading(word, lemma, tag),
                (None, _) => self.add_word(word),
                (Some(_), None) => {
                    return Err(Error::MalformedInput(format!(
                        "expected 'word' or 'word\\tlemma\\ttag', got '{}'",
                        line
                    )))
                }
            }
        }
        Ok(())
    }

    /// Merges a frequency list with `<w f="123">word</w>` lines. Lines that
    /// don't match the entry pattern are ignored, like the original tool
    /// ignores surrounding XML.
    pub fn read_freq_list<R: BufRead>(&mut self, reader: R) -> Result<FreqStats, Error> {
        let mut stats = FreqStats::default();

        for line in reader.lines() {
            let line = line?;
            let captures = match FREQ_ENTRY.captures(&line) {
                Some(captures) => captures,
                None => continue,
            };
            let freq: u32 = captures[1]
                .parse()
                .map_err(|_| Error::MalformedInput(format!("bad frequency in '{}'", line)))?;
            let word = &captures[2];

            match self.words.get_mut(word) {
                Some(entry) => {
                    // keep the highest class when a word occurs repeatedly
                    let class = freq_class(freq);
                    entry.freq_class =
                        Some(entry.freq_class.map_or(class, |prev| prev.max(class)));
                    stats.applied += 1;
                }
                None => stats.unmatched += 1,
            }
        }

        if stats.unmatched > 0 {
            warn!(
                "{} frequency entries have no matching word in the dictionary",
                stats.unmatched
            );
        }
        Ok(stats)
    }

    pub fn build(self) -> Result<Dictionary, Error> {
        let mut builder = MapBuilder::memory();
        let mut entries = Vec::with_capacity(self.words.len());

        for (word, entry) in self.words {
            builder
                .insert(&word, entries.len() as u64)
                .expect("BTreeMap iterates keys in lexicographic order.");
            entries.push(entry);
        }

        Ok(Dictionary {
            fst: builder.into_inner()?,
            entries,
        })
    }
}

/// The binary dictionary artifact: an FST from words to entry ids plus the
/// entry table.
#[derive(Serialize, Deserialize)]
pub struct Dictionary {
    fst: Vec<u8>,
    entries: Vec<Entry>,
}

impl Dictionary {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let reader = BufReader::new(fs::File::open(path.as_ref())?);
        let dict: Dictionary = bincode::deserialize_from(reader)?;
        // validate early so lookups can expect a well-formed fst
        Map::new(dict.fst.as_slice())?;
        Ok(dict)
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let writer = BufWriter::new(fs::File::create(path.as_ref())?);
        bincode::serialize_into(writer, self)?;
        Ok(())
    }

    fn map(&self) -> Map<&[u8]> {
        Map::new(self.fst.as_slice()).expect("serialized fst must be valid.")
    }

    fn entry(&self, word: &str) -> Option<&Entry> {
        self.map()
            .get(word)
            .map(|id| &self.entries[id as usize])
    }

    pub fn contains(&self, word: &str) -> bool {
        self.map().contains_key(word)
    }

    /// The (lemma, tag) readings of `word`, empty when unknown or untagged.
    pub fn lookup(&self, word: &str) -> &[(String, String)] {
        self.entry(word).map(|e| e.readings.as_slice()).unwrap_or(&[])
    }

    pub fn freq_class(&self, word: &str) -> Option<u8> {
        self.entry(word).and_then(|e| e.freq_class)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All words in lexicographic order.
    pub fn words(&self) -> Vec<String> {
        let map = self.map();
        let mut stream = map.stream();
        let mut words = Vec::with_capacity(self.entries.len());
        while let Some((word, _)) = stream.next() {
            words.push(String::from_utf8(word.to_vec()).expect("fst keys must be valid utf-8."));
        }
        words
    }

    pub(crate) fn fst_bytes(&self) -> &[u8] {
        &self.fst
    }

    /// Streams the dictionary back to text, the inverse of
    /// [read_dump][DictionaryBuilder::read_dump]: one line per word for
    /// speller entries, one `word\tlemma\ttag` line per reading otherwise.
    /// With `with_freq`, bare words carry their frequency class letter in a
    /// second column.
    pub fn export<W: Write>(&self, mut writer: W, with_freq: bool) -> Result<(), Error> {
        let map = self.map();
        let mut stream = map.stream();

        while let Some((word, id)) = stream.next() {
            let word = std::str::from_utf8(word).expect("fst keys must be valid utf-8.");
            let entry = &self.entries[id as usize];

            if entry.readings.is_empty() {
                match (with_freq, entry.freq_class) {
                    (true, Some(class)) => {
                        writeln!(writer, "{}\t{}", word, freq_class_letter(class))?
                    }
                    _ => writeln!(writer, "{}", word)?,
                }
            } else {
                for (lemma, tag) in &entry.readings {
                    writeln!(writer, "{}\t{}\t{}", word, lemma, tag)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_tagger_dictionary_from_dump() {
        let dump = "# comment\n\
                    gone\tgo\tVBN\n\
                    went\tgo\tVBD\n\
                    gone\tgo\tVBN\n\
                    gone\tgone\tJJ\n";
        let mut builder = DictionaryBuilder::new();
        builder.read_dump(dump.as_bytes()).unwrap();
        let dict = builder.build().unwrap();

        assert_eq!(dict.len(), 2);
        assert_eq!(
            dict.lookup("gone"),
            &[
                ("go".to_string(), "VBN".to_string()),
                ("gone".to_string(), "JJ".to_string())
            ]
        );
        assert_eq!(dict.lookup("went").len(), 1);
        assert!(dict.lookup("unknown").is_empty());
    }

    #[test]
    fn unsorted_word_list_builds_fine() {
        let mut builder = DictionaryBuilder::new();
        builder.read_dump("zebra\napple\nmango\n".as_bytes()).unwrap();
        let dict = builder.build().unwrap();

        assert_eq!(dict.words(), vec!["apple", "mango", "zebra"]);
        assert!(dict.contains("mango"));
    }

    #[test]
    fn mixed_tabs_are_rejected() {
        let mut builder = DictionaryBuilder::new();
        assert!(builder.read_dump("word\tlemma\n".as_bytes()).is_err());
    }

    #[test]
    fn frequency_list_is_merged_and_folded() {
        let mut builder = DictionaryBuilder::new();
        builder.read_dump("common\nrare\n".as_bytes()).unwrap();

        let freq = "<preamble/>\n\
                    <w f=\"255\">common</w>\n\
                    <w f=\"0\" flags=\"x\">rare</w>\n\
                    <w f=\"100\">missing</w>\n";
        let stats = builder.read_freq_list(freq.as_bytes()).unwrap();
        assert_eq!(stats.applied, 2);
        assert_eq!(stats.unmatched, 1);

        let dict = builder.build().unwrap();
        assert_eq!(dict.freq_class("common"), Some(25));
        assert_eq!(dict.freq_class("rare"), Some(0));
        assert_eq!(dict.freq_class("unknown"), None);
        assert_eq!(freq_class_letter(25), 'Z');
        assert_eq!(freq_class_letter(0), 'A');
    }

    #[test]
    fn export_roundtrips_both_flavors() {
        let mut builder = DictionaryBuilder::new();
        builder.read_dump("apple\nwent\tgo\tVBD\n".as_bytes()).unwrap();
        builder
            .read_freq_list("<w f=\"128\">apple</w>\n".as_bytes())
            .unwrap();
        let dict = builder.build().unwrap();

        let mut plain = Vec::new();
        dict.export(&mut plain, false).unwrap();
        assert_eq!(String::from_utf8(plain).unwrap(), "apple\nwent\tgo\tVBD\n");

        let mut with_freq = Vec::new();
        dict.export(&mut with_freq, true).unwrap();
        assert_eq!(
            String::from_utf8(with_freq).unwrap(),
            format!("apple\t{}\nwent\tgo\tVBD\n", freq_class_letter(13))
        );
    }

    #[test]
    fn open_write_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("en.dict");

        let mut builder = DictionaryBuilder::new();
        builder.read_dump("house\nmouse\n".as_bytes()).unwrap();
        builder.build().unwrap().write_to(&path).unwrap();

        let dict = Dictionary::open(&path).unwrap();
        assert!(dict.contains("house"));
        assert!(!dict.contains("horse"));
    }
}

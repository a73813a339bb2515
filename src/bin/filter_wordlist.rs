use clap::Parser;
use fs_err as fs;
use ltdev::dict::Dictionary;
use ltdev::wordlist::{
    dedup_case_insensitive, split_by_freq_class, unknown_words, SuggestOptions,
};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

/// Filters a word list against a binary dictionary: reports unknown words
/// with correction candidates, deduplicates case variants, or drops
/// infrequent words.
#[derive(Parser)]
#[clap(version)]
struct Opts {
    /// Word list, one word per line.
    words: PathBuf,
    /// The binary dictionary to check against.
    #[clap(long, short)]
    dict: PathBuf,
    /// Deduplicate words that only differ in case instead of spellchecking.
    #[clap(long)]
    dedup: bool,
    /// Keep only words at or above this frequency class (0-25) instead of
    /// spellchecking.
    #[clap(long)]
    min_freq_class: Option<u8>,
    /// Maximum edit distance for correction candidates.
    #[clap(long, default_value = "2")]
    max_distance: usize,
}

fn main() -> Result<(), ltdev::Error> {
    env_logger::init();
    let opts = Opts::parse();

    let dict = Dictionary::open(&opts.dict)?;
    let reader = BufReader::new(fs::File::open(&opts.words)?);

    if opts.dedup || opts.min_freq_class.is_some() {
        let mut words = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let word = line.trim();
            if !word.is_empty() && !word.starts_with('#') {
                words.push(word.to_string());
            }
        }

        if opts.dedup {
            words = dedup_case_insensitive(words);
        }
        if let Some(min_class) = opts.min_freq_class {
            words = split_by_freq_class(words, &dict, min_class).0;
        }
        for word in words {
            println!("{}", word);
        }
        return Ok(());
    }

    let options = SuggestOptions {
        max_distance: opts.max_distance,
        ..SuggestOptions::default()
    };
    for unknown in unknown_words(reader, &dict, &options)? {
        println!("{}\t{}", unknown.word, unknown.suggestions.join(", "));
    }
    Ok(())
}
